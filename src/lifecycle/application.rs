//! Application bootstrap
//!
//! Ties plugin loading, graph discovery, sequencing and the lifecycle
//! orchestrator together behind one builder.

use super::{CompositionContext, LifecycleOrchestrator, shutdown_signal};
use crate::config::Configuration;
use crate::di::{Container, ServiceCollection};
use crate::error::{ModulithError, Result};
use crate::module::{ModuleCatalog, ModuleDefinition, ModuleDescriptor, ModuleType, build_graph, sequence};
use crate::plugin::{PluginLoadReport, PluginLoader, PluginOptions};
use crate::web::ApplicationContext;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use uuid::Uuid;

/// Identity of one application run. Registered as a singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationInfo {
    pub instance_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub root_module: String,
}

/// A started application: every module has completed the baseline phases.
///
/// # Example
///
/// ```rust,ignore
/// use modulith::lifecycle::{Application, shutdown_signal};
///
/// #[tokio::main]
/// async fn main() -> modulith::Result<()> {
///     let mut app = Application::builder::<AppModule>()
///         .configuration(Configuration::from_env()?)
///         .build()
///         .await?;
///
///     let router = app.initialize_web(Router::new()).await?;
///     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
///     axum::serve(listener, router)
///         .with_graceful_shutdown(shutdown_signal())
///         .await?;
///
///     app.shutdown().await
/// }
/// ```
pub struct Application {
    info: ApplicationInfo,
    orchestrator: LifecycleOrchestrator,
    context: CompositionContext,
    container: Container,
    plugins: PluginLoadReport,
    web_initialized: bool,
    shut_down: bool,
}

impl Application {
    /// Start building an application rooted at module `M`
    pub fn builder<M: ModuleDefinition>() -> ApplicationBuilder {
        ApplicationBuilder::new(ModuleType::of::<M>())
    }

    pub fn info(&self) -> &ApplicationInfo {
        &self.info
    }

    /// Modules in dependency order
    pub fn modules(&self) -> &[ModuleDescriptor] {
        self.orchestrator.modules()
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn context(&self) -> &CompositionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut CompositionContext {
        &mut self.context
    }

    pub fn configuration(&self) -> &Configuration {
        self.context.configuration()
    }

    /// What the plugin scan found and skipped
    pub fn plugins(&self) -> &PluginLoadReport {
        &self.plugins
    }

    /// Run the web phases over `router` and return the assembled router.
    ///
    /// # Errors
    /// [`ModulithError::WebAlreadyInitialized`] on every call after the first,
    /// whether or not the first one succeeded.
    pub async fn initialize_web(&mut self, router: Router) -> Result<Router> {
        if self.web_initialized {
            return Err(ModulithError::WebAlreadyInitialized);
        }
        self.web_initialized = true;

        let mut ctx = ApplicationContext::new(
            self.container.clone(),
            self.context.configuration().clone(),
            router,
        );
        self.orchestrator.run_web(&mut ctx).await?;
        Ok(ctx.into_router())
    }

    pub fn is_web_initialized(&self) -> bool {
        self.web_initialized
    }

    /// Call every module's shutdown hook, in reverse order. Only the first
    /// call does anything.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        tracing::info!("Shutting down application {}...", self.info.instance_id);
        let result = self.orchestrator.shutdown(&mut self.context).await;
        tracing::info!("Application shutdown complete");
        result
    }

    /// Wait for Ctrl+C or SIGTERM, then shut down
    pub async fn run_until_shutdown(mut self) -> Result<()> {
        shutdown_signal().await;
        self.shutdown().await
    }

    /// Spawn a background task that waits for shutdown signals
    /// and performs graceful shutdown automatically.
    pub fn spawn_shutdown_handler(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(self.run_until_shutdown())
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("info", &self.info)
            .field("modules", &self.orchestrator)
            .field("web_initialized", &self.web_initialized)
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

/// Builder for [`Application`]
pub struct ApplicationBuilder {
    root: ModuleType,
    catalog: ModuleCatalog,
    extra: Vec<ModuleType>,
    configuration: Configuration,
    plugin_options: Option<PluginOptions>,
    services: ServiceCollection,
}

impl ApplicationBuilder {
    pub fn new(root: ModuleType) -> Self {
        Self {
            root,
            catalog: ModuleCatalog::new(),
            extra: Vec::new(),
            configuration: Configuration::new(),
            plugin_options: None,
            services: ServiceCollection::new(),
        }
    }

    /// Replace the catalog used for named dependencies and plugin manifests
    pub fn catalog(mut self, catalog: ModuleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Make `M` referable by name
    pub fn register<M: ModuleDefinition>(mut self) -> Self {
        self.catalog.register::<M>();
        self
    }

    /// Add a module that the root does not depend on
    pub fn add_module<M: ModuleDefinition>(mut self) -> Self {
        self.extra.push(ModuleType::of::<M>());
        self
    }

    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Plugin options; when unset they are read from the `PlugIns` section
    /// of the configuration
    pub fn plugin_options(mut self, options: PluginOptions) -> Self {
        self.plugin_options = Some(options);
        self
    }

    pub fn plugin_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        let options = self.plugin_options.take().unwrap_or_default();
        self.plugin_options = Some(options.directory(directory));
        self
    }

    /// Register services before any module hook runs
    pub fn configure_services(mut self, configure: impl FnOnce(&mut ServiceCollection)) -> Self {
        configure(&mut self.services);
        self
    }

    /// Load plugins, discover and order the module graph, then run the
    /// baseline phases.
    ///
    /// # Errors
    /// The first failure of any step. Nothing is rolled back.
    pub async fn build(self) -> Result<Application> {
        tracing::info!("Starting application from {}...", self.root);

        let plugin_options = match self.plugin_options {
            Some(options) => options,
            None => PluginOptions::from_configuration(&self.configuration)?,
        };
        let plugins = PluginLoader::new(plugin_options).load(&self.catalog)?;

        let graph = build_graph(self.root, &self.extra, &self.catalog, plugins.modules())?;
        let modules = sequence(graph)?;

        let mut assemblies: BTreeSet<String> = modules
            .iter()
            .flat_map(|descriptor| descriptor.assemblies().iter().cloned())
            .collect();
        assemblies.extend(plugins.assemblies().iter().cloned());

        let info = ApplicationInfo {
            instance_id: Uuid::new_v4(),
            started_at: Utc::now(),
            root_module: self.root.name().to_string(),
        };

        let mut services = ServiceCollection::new();
        services
            .add_instance(self.configuration.clone())
            .add_instance(info.clone());
        services.extend(self.services.into_descriptors());

        let mut context = CompositionContext::new(self.configuration, services, assemblies);
        let orchestrator = LifecycleOrchestrator::new(modules);
        orchestrator.run(&mut context).await?;
        let container = context.container()?.clone();

        tracing::info!(
            "Application started ({} modules, instance {})",
            orchestrator.modules().len(),
            info.instance_id
        );

        Ok(Application {
            info,
            orchestrator,
            context,
            container,
            plugins,
            web_initialized: false,
            shut_down: false,
        })
    }
}

impl std::fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("root", &self.root)
            .field("extra", &self.extra)
            .field("plugin_options", &self.plugin_options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Module, ModuleDeclaration};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ShutdownCounter(AtomicUsize);

    struct RootModule;

    #[async_trait]
    impl Module for RootModule {
        async fn on_initialize(&self, ctx: &mut CompositionContext) -> anyhow::Result<()> {
            // Framework singletons are resolvable once the registry is frozen.
            let info = ctx.container()?.resolve::<ApplicationInfo>()?;
            anyhow::ensure!(info.root_module == "RootModule");
            ctx.container()?.resolve::<Configuration>()?;
            Ok(())
        }

        async fn on_shutdown(&self, ctx: &mut CompositionContext) -> anyhow::Result<()> {
            if let Some(counter) = ctx.get_singleton_instance::<ShutdownCounter>()? {
                counter.0.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    impl ModuleDefinition for RootModule {
        fn create(_: &mut ModuleDeclaration) -> anyhow::Result<Self> {
            Ok(RootModule)
        }
    }

    #[tokio::test]
    async fn test_build_runs_the_baseline_phases() {
        let counter = Arc::new(ShutdownCounter::default());
        let shared = Arc::clone(&counter);
        let mut app = Application::builder::<RootModule>()
            .configure_services(move |services| {
                services.add_shared(shared);
            })
            .build()
            .await
            .unwrap();

        assert_eq!(app.info().root_module, "RootModule");
        assert_eq!(app.modules().len(), 1);
        assert!(app.context().is_finalized());
        assert!(app.context().assemblies().contains("modulith"));
        assert!(app.plugins().modules().is_empty());

        app.shutdown().await.unwrap();
        app.shutdown().await.unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_web_initialization_happens_once() {
        let mut app = Application::builder::<RootModule>().build().await.unwrap();

        app.initialize_web(Router::new()).await.unwrap();
        assert!(app.is_web_initialized());
        assert!(matches!(
            app.initialize_web(Router::new()).await,
            Err(ModulithError::WebAlreadyInitialized)
        ));
    }
}
