use crate::module::{ModuleDefinition, ModuleType};
use std::collections::HashMap;

/// Modules that can be referenced by name.
///
/// Plugin manifests and `depends_on_named` declarations only carry a module's
/// short name; the catalog maps those names back to constructible types.
/// Names are matched case-sensitively and the first registration of a name
/// wins.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    by_name: HashMap<&'static str, ModuleType>,
    order: Vec<ModuleType>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: ModuleDefinition>(&mut self) -> &mut Self {
        self.register_type(ModuleType::of::<M>())
    }

    pub fn register_type(&mut self, module_type: ModuleType) -> &mut Self {
        match self.by_name.get(module_type.name()) {
            Some(existing) if *existing == module_type => {}
            Some(existing) => {
                tracing::warn!(
                    "Module name '{}' already refers to {:?}; ignoring {:?}",
                    module_type.name(),
                    existing,
                    module_type
                );
            }
            None => {
                self.by_name.insert(module_type.name(), module_type);
                self.order.push(module_type);
            }
        }
        self
    }

    pub fn resolve(&self, name: &str) -> Option<ModuleType> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registered module types, in registration order
    pub fn iter(&self) -> impl Iterator<Item = &ModuleType> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Module, ModuleDeclaration};

    struct IdentityModule;
    impl Module for IdentityModule {}
    impl ModuleDefinition for IdentityModule {
        fn create(_: &mut ModuleDeclaration) -> anyhow::Result<Self> {
            Ok(IdentityModule)
        }
    }

    mod other {
        use super::*;

        pub struct IdentityModule;
        impl Module for IdentityModule {}
        impl ModuleDefinition for IdentityModule {
            fn create(_: &mut ModuleDeclaration) -> anyhow::Result<Self> {
                Ok(IdentityModule)
            }
        }
    }

    #[test]
    fn test_resolve_by_short_name() {
        let mut catalog = ModuleCatalog::new();
        catalog.register::<IdentityModule>().register::<IdentityModule>();

        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.resolve("IdentityModule"),
            Some(ModuleType::of::<IdentityModule>())
        );
        assert!(catalog.resolve("identitymodule").is_none());
    }

    #[test]
    fn test_first_registration_of_a_name_wins() {
        let mut catalog = ModuleCatalog::new();
        catalog.register::<IdentityModule>();
        catalog.register::<other::IdentityModule>();

        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.resolve("IdentityModule"),
            Some(ModuleType::of::<IdentityModule>())
        );
    }
}
