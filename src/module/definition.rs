use crate::di::{Injectable, ServiceDescriptor, ServiceLifetime};
use crate::lifecycle::CompositionContext;
use crate::web::WebModule;
use async_trait::async_trait;
use std::any::{TypeId, type_name};
use std::sync::Arc;

/// Lifecycle hooks of an application module
///
/// Every hook defaults to a no-op. Hooks of one phase run for every module (in
/// dependency order) before any module enters the next phase, so a module's
/// `configure_services` can rely on all of its dependencies having completed
/// their own `configure_services`.
///
/// The registry in [`CompositionContext::services`] accepts registrations only
/// during the three configure phases; from `on_initialize` on, services are
/// resolved through [`CompositionContext::container`].
#[async_trait]
pub trait Module: Send + Sync + 'static {
    async fn pre_configure_services(&self, _ctx: &mut CompositionContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn configure_services(&self, _ctx: &mut CompositionContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn post_configure_services(&self, _ctx: &mut CompositionContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_initialize(&self, _ctx: &mut CompositionContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_post_initialize(&self, _ctx: &mut CompositionContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called in reverse dependency order when the application stops
    async fn on_shutdown(&self, _ctx: &mut CompositionContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Capability query for the web lifecycle.
    ///
    /// Modules that implement [`WebModule`] return `Some(self)`.
    fn as_web(&self) -> Option<&dyn WebModule> {
        None
    }
}

/// Construction of a module instance.
///
/// `create` runs exactly once per application, when the module is first
/// discovered. It must not have side effects other than recording
/// declarations on `module`. Usually generated by `#[module(...)]`.
pub trait ModuleDefinition: Module + Sized {
    fn create(module: &mut ModuleDeclaration) -> anyhow::Result<Self>;
}

type Constructor = fn(&mut ModuleDeclaration) -> anyhow::Result<Arc<dyn Module>>;

fn construct<M: ModuleDefinition>(module: &mut ModuleDeclaration) -> anyhow::Result<Arc<dyn Module>> {
    Ok(Arc::new(M::create(module)?))
}

/// Identity of a module type. Equality and hashing only consider the `TypeId`.
#[derive(Clone, Copy)]
pub struct ModuleType {
    id: TypeId,
    full_name: &'static str,
    constructor: Constructor,
}

impl ModuleType {
    pub fn of<M: ModuleDefinition>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            full_name: type_name::<M>(),
            constructor: construct::<M>,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Short type name, e.g. `IdentityModule`
    pub fn name(&self) -> &'static str {
        let base = self.full_name.split('<').next().unwrap_or(self.full_name);
        base.rsplit("::").next().unwrap_or(base)
    }

    pub fn full_name(&self) -> &'static str {
        self.full_name
    }

    /// Name of the crate that defines the module
    pub fn assembly(&self) -> &'static str {
        self.full_name.split("::").next().unwrap_or(self.full_name)
    }

    pub(crate) fn construct(
        &self,
        module: &mut ModuleDeclaration,
    ) -> anyhow::Result<Arc<dyn Module>> {
        (self.constructor)(module)
    }
}

impl PartialEq for ModuleType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ModuleType {}

impl std::hash::Hash for ModuleType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.full_name)
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A declared dependency, either by type or by catalog name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    Type(ModuleType),
    Named(String),
}

/// Everything a module declares about itself while it is constructed.
///
/// # Example
/// ```
/// use modulith::module::{Module, ModuleDeclaration, ModuleDefinition};
///
/// struct CoreModule;
/// impl Module for CoreModule {}
/// impl ModuleDefinition for CoreModule {
///     fn create(_: &mut ModuleDeclaration) -> anyhow::Result<Self> {
///         Ok(CoreModule)
///     }
/// }
///
/// struct DataModule;
/// impl Module for DataModule {}
/// impl ModuleDefinition for DataModule {
///     fn create(module: &mut ModuleDeclaration) -> anyhow::Result<Self> {
///         module.depends_on::<CoreModule>();
///         Ok(DataModule)
///     }
/// }
/// ```
#[derive(Debug, Default)]
pub struct ModuleDeclaration {
    dependencies: Vec<Dependency>,
    additional_assemblies: Vec<String>,
    registrations: Vec<ServiceDescriptor>,
}

impl ModuleDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_dependency(&mut self, dependency: Dependency) -> &mut Self {
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    pub fn depends_on<M: ModuleDefinition>(&mut self) -> &mut Self {
        self.push_dependency(Dependency::Type(ModuleType::of::<M>()))
    }

    pub fn depends_on_type(&mut self, module_type: ModuleType) -> &mut Self {
        self.push_dependency(Dependency::Type(module_type))
    }

    /// Depend on a module known only by its catalog name, typically one
    /// contributed by a plugin
    pub fn depends_on_named(&mut self, name: impl Into<String>) -> &mut Self {
        self.push_dependency(Dependency::Named(name.into()))
    }

    pub fn additional_assembly(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if !self.additional_assemblies.contains(&name) {
            self.additional_assemblies.push(name);
        }
        self
    }

    /// Register `T` by type when the module configures its services
    pub fn provide<T: Injectable>(&mut self, lifetime: ServiceLifetime) -> &mut Self {
        self.register(ServiceDescriptor::injectable::<T>(lifetime))
    }

    pub fn register(&mut self, descriptor: ServiceDescriptor) -> &mut Self {
        self.registrations.push(descriptor);
        self
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub(crate) fn into_parts(self) -> (Vec<Dependency>, Vec<String>, Vec<ServiceDescriptor>) {
        (
            self.dependencies,
            self.additional_assemblies,
            self.registrations,
        )
    }
}
