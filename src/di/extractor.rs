use crate::di::Container;
use axum::{
    extract::FromRequestParts,
    http::{StatusCode as HttpStatusCode, request::Parts},
};
use std::sync::Arc;

/// Axum extractor for services registered by modules
///
/// Routes added during the web phases can pull services straight out of the
/// application container. Every extraction resolves through a fresh scope, so
/// scoped services never leak between requests.
///
/// # Example
/// ```
/// use modulith::{Container, Inject};
/// use axum::{Router, routing::get};
///
/// struct Greeting(&'static str);
///
/// async fn hello(Inject(greeting): Inject<Greeting>) -> &'static str {
///     greeting.0
/// }
///
/// fn routes(container: Container) -> Router {
///     Router::new().route("/", get(hello)).with_state(container)
/// }
/// ```
pub struct Inject<T: ?Sized>(pub Arc<T>);

/// Trait that router state must implement to provide the container
pub trait HasContainer {
    fn get_container(&self) -> &Container;
}

impl HasContainer for Container {
    fn get_container(&self) -> &Container {
        self
    }
}

impl<S, T> FromRequestParts<S> for Inject<T>
where
    S: Send + Sync + HasContainer,
    T: ?Sized + 'static + Send + Sync,
{
    type Rejection = (HttpStatusCode, String);

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let scope = state.get_container().create_scope();

        scope.resolve::<T>().map(Inject).map_err(|e| {
            tracing::error!("Dependency injection failed: {}", e);
            (
                HttpStatusCode::INTERNAL_SERVER_ERROR,
                format!("Dependency injection failed: {}", e),
            )
        })
    }
}

/// Deref implementation for convenient access to the inner service
impl<T: ?Sized> std::ops::Deref for Inject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Clone implementation to allow sharing the Arc
impl<T: ?Sized> Clone for Inject<T> {
    fn clone(&self) -> Self {
        Inject(Arc::clone(&self.0))
    }
}
