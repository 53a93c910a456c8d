//! Web lifecycle
//!
//! Modules that serve HTTP implement [`WebModule`] next to [`Module`] and
//! return `Some(self)` from [`Module::as_web`]. Once the application is
//! finalized and a router is supplied, the three web phases run over the
//! same module sequence, skipping every module without the capability:
//!
//! ```text
//! Router ─→ PreApplication ─→ Application ─→ PostApplication ─→ Router
//!            (web modules, dependencies first)
//! ```
//!
//! [`Module`]: crate::module::Module
//! [`Module::as_web`]: crate::module::Module::as_web

use crate::config::Configuration;
use crate::di::Container;
use async_trait::async_trait;
use axum::Router;

/// Web phase hooks. Every hook defaults to a no-op.
///
/// # Example
///
/// ```rust,ignore
/// struct HealthModule;
///
/// #[async_trait]
/// impl Module for HealthModule {
///     fn as_web(&self) -> Option<&dyn WebModule> {
///         Some(self)
///     }
/// }
///
/// #[async_trait]
/// impl WebModule for HealthModule {
///     async fn on_application(&self, ctx: &mut ApplicationContext) -> anyhow::Result<()> {
///         ctx.map_router(|router| router.route("/health", get(|| async { "ok" })));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait WebModule: Send + Sync {
    async fn on_pre_application(&self, _ctx: &mut ApplicationContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_application(&self, _ctx: &mut ApplicationContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_post_application(&self, _ctx: &mut ApplicationContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// State handed to the web hooks: the finalized container and the router
/// being assembled.
pub struct ApplicationContext {
    container: Container,
    configuration: Configuration,
    router: Router,
}

impl ApplicationContext {
    pub fn new(container: Container, configuration: Configuration, router: Router) -> Self {
        Self {
            container,
            configuration,
            router,
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Replace the router with `f(router)`, for the consuming `Router` builders
    pub fn map_router(&mut self, f: impl FnOnce(Router) -> Router) {
        let router = std::mem::take(&mut self.router);
        self.router = f(router);
    }

    pub(crate) fn into_router(self) -> Router {
        self.router
    }
}

impl std::fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::ServiceCollection;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_map_router_keeps_previous_routes() {
        let mut ctx = ApplicationContext::new(
            Container::new(ServiceCollection::new()),
            Configuration::new(),
            Router::new().route("/ping", get(|| async { "pong" })),
        );
        ctx.map_router(|router| router.route("/health", get(|| async { "ok" })));
        let router = ctx.into_router();

        for path in ["/ping", "/health"] {
            let response = router
                .clone()
                .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
