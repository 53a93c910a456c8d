use super::Phase;
use crate::config::Configuration;
use crate::di::{Container, ServiceCollection};
use crate::error::{ModulithError, Result};
use crate::options::{OptionsActions, PreConfigureActions};
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Shared state handed to every module hook during one application run.
///
/// There is exactly one context per run. Until the configure phases are
/// over it exposes the mutable service registry; afterwards the registry is
/// frozen into a [`Container`] and only resolution, configuration reads and
/// the pre-configure store remain available.
pub struct CompositionContext {
    services: ServiceCollection,
    options: OptionsActions,
    pre_configure: PreConfigureActions,
    configuration: Configuration,
    assemblies: BTreeSet<String>,
    container: Option<Container>,
    phase: Option<Phase>,
    finalized: bool,
}

impl CompositionContext {
    pub fn new(
        configuration: Configuration,
        services: ServiceCollection,
        assemblies: BTreeSet<String>,
    ) -> Self {
        Self {
            services,
            options: OptionsActions::new(),
            pre_configure: PreConfigureActions::new(),
            configuration,
            assemblies,
            container: None,
            phase: None,
            finalized: false,
        }
    }

    /// The service registry.
    ///
    /// # Errors
    /// [`ModulithError::RegistryFrozen`] once the container has been built.
    pub fn services(&mut self) -> Result<&mut ServiceCollection> {
        if self.container.is_some() {
            return Err(ModulithError::RegistryFrozen);
        }
        Ok(&mut self.services)
    }

    /// Add a configure action for options type `T`
    pub fn configure<T, F>(&mut self, action: F) -> Result<()>
    where
        T: Any,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        if self.container.is_some() {
            return Err(ModulithError::RegistryFrozen);
        }
        self.options.configure(action);
        Ok(())
    }

    /// Add an action that runs after every configure action for `T`
    pub fn post_configure<T, F>(&mut self, action: F) -> Result<()>
    where
        T: Any,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        if self.container.is_some() {
            return Err(ModulithError::RegistryFrozen);
        }
        self.options.post_configure(action);
        Ok(())
    }

    /// Queue an action for a configuration object that may not exist yet.
    /// Valid in every phase.
    pub fn pre_configure<T, F>(&self, action: F) -> Result<()>
    where
        T: Any,
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.pre_configure.pre_configure(action)
    }

    /// Apply every action queued for `T` to `instance`
    pub fn execute_pre_configured_actions<T: Any>(&self, instance: &mut T) -> Result<usize> {
        self.pre_configure.execute_pre_configured_actions(instance)
    }

    pub fn pre_configure_actions(&self) -> &PreConfigureActions {
        &self.pre_configure
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Assemblies contributed by every discovered module and plugin manifest
    pub fn assemblies(&self) -> &BTreeSet<String> {
        &self.assemblies
    }

    /// The service container, available from the `Initialize` phase on.
    ///
    /// # Errors
    /// [`ModulithError::ContainerNotBuilt`] during the configure phases.
    pub fn container(&self) -> Result<&Container> {
        self.container.as_ref().ok_or(ModulithError::ContainerNotBuilt)
    }

    /// A singleton already known to the application.
    ///
    /// Before the freeze this only sees pre-built instances; afterwards it
    /// also builds singleton factories. Scoped and transient registrations
    /// are never invoked.
    ///
    /// # Errors
    /// [`ModulithError::ServiceFactory`] when a singleton factory fails.
    pub fn get_singleton_instance<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        match &self.container {
            Some(container) => container.get_singleton::<T>(),
            None => Ok(self.services.get_singleton_instance::<T>()),
        }
    }

    /// The phase currently being run, if any
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    pub fn is_frozen(&self) -> bool {
        self.container.is_some()
    }

    /// Whether every baseline phase has completed
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn enter_phase(&mut self, phase: Option<Phase>) {
        self.phase = phase;
    }

    /// Freeze the registry and build the container. Idempotent.
    pub(crate) fn freeze(&mut self) -> &Container {
        let services = std::mem::take(&mut self.services);
        let options = std::mem::take(&mut self.options);
        let pre_configure = self.pre_configure.clone();
        self.container
            .get_or_insert_with(|| Container::build(services, options, pre_configure))
    }

    pub(crate) fn finalize(&mut self) {
        self.finalized = true;
    }
}

impl std::fmt::Debug for CompositionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionContext")
            .field("phase", &self.phase)
            .field("services", &self.services.len())
            .field("assemblies", &self.assemblies)
            .field("frozen", &self.is_frozen())
            .field("finalized", &self.finalized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct JwtOptions {
        min_length: usize,
        issuer: String,
    }

    fn context() -> CompositionContext {
        CompositionContext::new(
            Configuration::new(),
            ServiceCollection::new(),
            BTreeSet::new(),
        )
    }

    #[test]
    fn test_registry_freezes_into_container() {
        let mut ctx = context();
        ctx.services().unwrap().add_instance(42u32);
        assert_eq!(*ctx.get_singleton_instance::<u32>().unwrap().unwrap(), 42);
        assert!(matches!(ctx.container(), Err(ModulithError::ContainerNotBuilt)));

        ctx.freeze();
        assert!(ctx.is_frozen());
        assert!(matches!(ctx.services(), Err(ModulithError::RegistryFrozen)));
        assert!(matches!(
            ctx.configure::<JwtOptions, _>(|_| {}),
            Err(ModulithError::RegistryFrozen)
        ));
        assert_eq!(*ctx.container().unwrap().resolve::<u32>().unwrap(), 42);
        assert_eq!(*ctx.get_singleton_instance::<u32>().unwrap().unwrap(), 42);
    }

    #[test]
    fn test_singleton_lookup_never_builds_transients() {
        let mut ctx = context();
        ctx.services()
            .unwrap()
            .add_transient::<String, _>(|_| Ok(Arc::new("fresh".to_string())))
            .add_singleton::<u64, _>(|_| anyhow::bail!("clock unavailable"));
        assert!(ctx.get_singleton_instance::<String>().unwrap().is_none());

        ctx.freeze();
        assert!(ctx.get_singleton_instance::<String>().unwrap().is_none());
        assert!(matches!(
            ctx.get_singleton_instance::<u64>(),
            Err(ModulithError::ServiceFactory { .. })
        ));
    }

    #[test]
    fn test_pre_configure_survives_the_freeze() {
        let mut ctx = context();
        ctx.configure::<JwtOptions, _>(|o| o.issuer = "modulith".into())
            .unwrap();
        ctx.freeze();

        // Still accepted after the freeze, applied on first materialization.
        ctx.pre_configure::<JwtOptions, _>(|o| o.min_length = 16)
            .unwrap();
        let options = ctx.container().unwrap().options::<JwtOptions>().unwrap();
        assert_eq!(options.min_length, 16);
        assert_eq!(options.issuer, "modulith");
    }
}
