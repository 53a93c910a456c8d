use crate::error::Result;
use crate::module::{ModuleCatalog, ModuleDescriptor, ModuleType};
use std::any::TypeId;
use std::collections::HashMap;

/// The deduplicated set of modules reachable from a root module.
///
/// Descriptors are kept in first-discovery order (depth-first, pre-order).
/// The graph is not ordered by dependencies yet; see [`sequence`](super::sequence).
#[derive(Debug, Default)]
pub struct ModuleGraph {
    descriptors: Vec<ModuleDescriptor>,
    index: HashMap<TypeId, usize>,
}

impl ModuleGraph {
    /// Discover `root`, every extra module type, and all of their transitive
    /// dependencies. Each module type is constructed exactly once.
    pub fn build(root: ModuleType, extra: &[ModuleType], catalog: &ModuleCatalog) -> Result<Self> {
        let mut graph = Self::default();
        graph.visit(root, catalog)?;
        for module_type in extra {
            graph.visit(*module_type, catalog)?;
        }

        tracing::info!(
            "Discovered {} modules starting from {}",
            graph.descriptors.len(),
            root
        );
        Ok(graph)
    }

    fn visit(&mut self, module_type: ModuleType, catalog: &ModuleCatalog) -> Result<()> {
        if self.contains(module_type) {
            return Ok(());
        }

        let descriptor = ModuleDescriptor::describe(module_type, catalog)?;
        let dependencies = descriptor.dependencies().to_vec();
        self.index.insert(module_type.id(), self.descriptors.len());
        self.descriptors.push(descriptor);

        for dependency in dependencies {
            self.visit(dependency, catalog)?;
        }
        Ok(())
    }

    pub fn contains(&self, module_type: ModuleType) -> bool {
        self.index.contains_key(&module_type.id())
    }

    pub fn get(&self, module_type: ModuleType) -> Option<&ModuleDescriptor> {
        self.index
            .get(&module_type.id())
            .map(|&position| &self.descriptors[position])
    }

    pub(crate) fn position(&self, module_type: ModuleType) -> Option<usize> {
        self.index.get(&module_type.id()).copied()
    }

    pub(crate) fn mark_plugins(&mut self, plugin_types: &[ModuleType]) {
        for module_type in plugin_types {
            if let Some(&position) = self.index.get(&module_type.id()) {
                self.descriptors[position].mark_plugin();
            }
        }
    }

    /// Descriptors in first-discovery order
    pub fn descriptors(&self) -> &[ModuleDescriptor] {
        &self.descriptors
    }

    pub(crate) fn into_descriptors(self) -> Vec<ModuleDescriptor> {
        self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Discover the graph for `root`, explicitly added modules and modules
/// contributed by plugins. Plugin-contributed descriptors are flagged as such.
pub fn build_graph(
    root: ModuleType,
    extra: &[ModuleType],
    catalog: &ModuleCatalog,
    plugin_types: &[ModuleType],
) -> Result<ModuleGraph> {
    let mut all = extra.to_vec();
    all.extend_from_slice(plugin_types);
    let mut graph = ModuleGraph::build(root, &all, catalog)?;
    graph.mark_plugins(plugin_types);
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModulithError;
    use crate::module::{Module, ModuleDeclaration, ModuleDefinition};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static SHARED_CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

    struct Shared;
    impl Module for Shared {}
    impl ModuleDefinition for Shared {
        fn create(_: &mut ModuleDeclaration) -> anyhow::Result<Self> {
            SHARED_CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
            Ok(Shared)
        }
    }

    macro_rules! leaf_depending_on_shared {
        ($name:ident) => {
            struct $name;
            impl Module for $name {}
            impl ModuleDefinition for $name {
                fn create(module: &mut ModuleDeclaration) -> anyhow::Result<Self> {
                    module.depends_on::<Shared>();
                    Ok($name)
                }
            }
        };
    }

    leaf_depending_on_shared!(First);
    leaf_depending_on_shared!(Second);
    leaf_depending_on_shared!(Third);

    struct Root;
    impl Module for Root {}
    impl ModuleDefinition for Root {
        fn create(module: &mut ModuleDeclaration) -> anyhow::Result<Self> {
            module
                .depends_on::<First>()
                .depends_on::<Second>()
                .depends_on::<Third>();
            Ok(Root)
        }
    }

    macro_rules! standalone {
        ($name:ident) => {
            struct $name;
            impl Module for $name {}
            impl ModuleDefinition for $name {
                fn create(_: &mut ModuleDeclaration) -> anyhow::Result<Self> {
                    Ok($name)
                }
            }
        };
    }

    standalone!(Alpha);
    standalone!(Beta);

    struct Dangling;
    impl Module for Dangling {}
    impl ModuleDefinition for Dangling {
        fn create(module: &mut ModuleDeclaration) -> anyhow::Result<Self> {
            module.depends_on_named("NotRegistered");
            Ok(Dangling)
        }
    }

    #[test]
    fn test_shared_dependency_is_described_once() {
        let graph = ModuleGraph::build(ModuleType::of::<Root>(), &[], &ModuleCatalog::new()).unwrap();

        assert_eq!(graph.len(), 5);
        assert_eq!(SHARED_CONSTRUCTED.load(Ordering::SeqCst), 1);

        let names: Vec<&str> = graph.descriptors().iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Root", "First", "Shared", "Second", "Third"]);
    }

    #[test]
    fn test_extra_modules_join_the_graph() {
        let graph = ModuleGraph::build(
            ModuleType::of::<Alpha>(),
            &[ModuleType::of::<Beta>(), ModuleType::of::<Alpha>()],
            &ModuleCatalog::new(),
        )
        .unwrap();

        let names: Vec<&str> = graph.descriptors().iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
        assert!(graph.get(ModuleType::of::<Beta>()).is_some());
        assert!(!graph.contains(ModuleType::of::<Root>()));
    }

    #[test]
    fn test_plugin_modules_are_flagged() {
        let graph = build_graph(
            ModuleType::of::<Alpha>(),
            &[],
            &ModuleCatalog::new(),
            &[ModuleType::of::<Beta>()],
        )
        .unwrap();

        assert!(!graph.get(ModuleType::of::<Alpha>()).unwrap().is_plugin());
        assert!(graph.get(ModuleType::of::<Beta>()).unwrap().is_plugin());
    }

    #[test]
    fn test_unknown_named_dependency_is_fatal() {
        let err = ModuleGraph::build(ModuleType::of::<Dangling>(), &[], &ModuleCatalog::new())
            .unwrap_err();
        assert!(matches!(err, ModulithError::MissingModule { .. }));
    }
}
