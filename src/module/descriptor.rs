use crate::di::ServiceDescriptor;
use crate::error::{ModulithError, Result};
use crate::module::{Dependency, Module, ModuleCatalog, ModuleDeclaration, ModuleType};
use crate::web::WebModule;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A constructed module together with its declared metadata
#[derive(Clone)]
pub struct ModuleDescriptor {
    module_type: ModuleType,
    instance: Arc<dyn Module>,
    dependencies: Vec<ModuleType>,
    assemblies: BTreeSet<String>,
    registrations: Vec<ServiceDescriptor>,
    is_web_capable: bool,
    is_plugin: bool,
}

impl ModuleDescriptor {
    /// Construct `module_type` and record what it declares.
    ///
    /// # Errors
    /// - [`ModulithError::ModuleConstruction`] if the constructor fails or the
    ///   module depends on itself
    /// - [`ModulithError::MissingModule`] if a named dependency is not in `catalog`
    pub fn describe(module_type: ModuleType, catalog: &ModuleCatalog) -> Result<Self> {
        let mut declaration = ModuleDeclaration::new();
        let instance = module_type.construct(&mut declaration).map_err(|source| {
            tracing::error!("Failed to construct {}: {}", module_type, source);
            ModulithError::ModuleConstruction {
                module: module_type.name().to_string(),
                source,
            }
        })?;

        let (declared, additional_assemblies, registrations) = declaration.into_parts();

        let mut dependencies = Vec::with_capacity(declared.len());
        for dependency in declared {
            let resolved = match dependency {
                Dependency::Type(dependency) => dependency,
                Dependency::Named(name) => {
                    catalog
                        .resolve(&name)
                        .ok_or_else(|| ModulithError::MissingModule {
                            module: module_type.name().to_string(),
                            dependency: name.clone(),
                        })?
                }
            };
            if resolved == module_type {
                return Err(ModulithError::ModuleConstruction {
                    module: module_type.name().to_string(),
                    source: anyhow::anyhow!("a module cannot depend on itself"),
                });
            }
            if !dependencies.contains(&resolved) {
                dependencies.push(resolved);
            }
        }

        let mut assemblies = BTreeSet::new();
        assemblies.insert(module_type.assembly().to_string());
        assemblies.extend(additional_assemblies);

        let is_web_capable = instance.as_web().is_some();
        tracing::debug!(
            "Described {} ({} dependencies, web: {})",
            module_type,
            dependencies.len(),
            is_web_capable
        );

        Ok(Self {
            module_type,
            instance,
            dependencies,
            assemblies,
            registrations,
            is_web_capable,
            is_plugin: false,
        })
    }

    pub fn module_type(&self) -> ModuleType {
        self.module_type
    }

    pub fn name(&self) -> &'static str {
        self.module_type.name()
    }

    pub fn instance(&self) -> &Arc<dyn Module> {
        &self.instance
    }

    /// Direct dependencies, in declaration order
    pub fn dependencies(&self) -> &[ModuleType] {
        &self.dependencies
    }

    pub fn depends_on(&self, other: ModuleType) -> bool {
        self.dependencies.contains(&other)
    }

    pub fn assemblies(&self) -> &BTreeSet<String> {
        &self.assemblies
    }

    pub fn registrations(&self) -> &[ServiceDescriptor] {
        &self.registrations
    }

    pub fn is_web_capable(&self) -> bool {
        self.is_web_capable
    }

    pub fn web(&self) -> Option<&dyn WebModule> {
        if self.is_web_capable {
            self.instance.as_web()
        } else {
            None
        }
    }

    /// Whether the module was contributed by a plugin manifest
    pub fn is_plugin(&self) -> bool {
        self.is_plugin
    }

    pub(crate) fn mark_plugin(&mut self) {
        self.is_plugin = true;
    }
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("module_type", &self.module_type)
            .field("dependencies", &self.dependencies)
            .field("assemblies", &self.assemblies)
            .field("is_web_capable", &self.is_web_capable)
            .field("is_plugin", &self.is_plugin)
            .finish()
    }
}
