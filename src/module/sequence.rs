use crate::error::{ModulithError, Result};
use crate::module::{ModuleDescriptor, ModuleGraph};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Sequencer<'a> {
    graph: &'a ModuleGraph,
    marks: Vec<Mark>,
    stack: Vec<usize>,
    order: Vec<usize>,
}

impl Sequencer<'_> {
    fn visit(&mut self, position: usize) -> Result<()> {
        match self.marks[position] {
            Mark::Done => return Ok(()),
            Mark::InProgress => return Err(self.cycle_from(position)),
            Mark::Unvisited => {}
        }

        self.marks[position] = Mark::InProgress;
        self.stack.push(position);

        let graph = self.graph;
        let descriptor = &graph.descriptors()[position];
        for dependency in descriptor.dependencies() {
            let target = graph.position(*dependency).ok_or_else(|| {
                ModulithError::Internal(format!(
                    "dependency {} of {} is missing from the module graph",
                    dependency,
                    descriptor.name()
                ))
            })?;
            self.visit(target)?;
        }

        self.stack.pop();
        self.marks[position] = Mark::Done;
        self.order.push(position);
        Ok(())
    }

    fn cycle_from(&self, position: usize) -> ModulithError {
        let start = self
            .stack
            .iter()
            .position(|&p| p == position)
            .unwrap_or_default();
        let cycle: Vec<String> = self.stack[start..]
            .iter()
            .map(|&p| self.graph.descriptors()[p].name().to_string())
            .collect();

        tracing::error!("Cyclic module dependency: {}", cycle.join(" -> "));
        ModulithError::CyclicModuleDependency { cycle }
    }
}

/// Order the graph so that every module comes after all of its dependencies.
///
/// Modules without a dependency relationship keep their first-discovery
/// order, so the same module set always produces the same sequence.
///
/// # Errors
/// [`ModulithError::CyclicModuleDependency`] naming the cycle members in the
/// order they were entered. No partial ordering is ever returned.
pub fn sequence(graph: ModuleGraph) -> Result<Vec<ModuleDescriptor>> {
    let mut sequencer = Sequencer {
        graph: &graph,
        marks: vec![Mark::Unvisited; graph.len()],
        stack: Vec::new(),
        order: Vec::with_capacity(graph.len()),
    };
    for position in 0..graph.len() {
        sequencer.visit(position)?;
    }
    let order = sequencer.order;

    let mut slots: Vec<Option<ModuleDescriptor>> =
        graph.into_descriptors().into_iter().map(Some).collect();
    let sequenced: Vec<ModuleDescriptor> = order
        .into_iter()
        .filter_map(|position| slots[position].take())
        .collect();

    tracing::debug!(
        "Module sequence: {}",
        sequenced
            .iter()
            .map(|d| d.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(sequenced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Module, ModuleCatalog, ModuleDeclaration, ModuleDefinition, ModuleType};

    macro_rules! module {
        ($name:ident $(=> $($dep:ident),+)?) => {
            struct $name;
            impl Module for $name {}
            impl ModuleDefinition for $name {
                fn create(_module: &mut ModuleDeclaration) -> anyhow::Result<Self> {
                    $($(_module.depends_on::<$dep>();)+)?
                    Ok($name)
                }
            }
        };
    }

    module!(Core);
    module!(Data => Core);
    module!(Api => Data);

    module!(X => Y);
    module!(Y => X);

    module!(A => B);
    module!(B => C);
    module!(C => A);
    module!(Entry => Core, A);

    module!(Logging);
    module!(Metrics);
    module!(Host => Metrics, Logging, Data);

    fn names(sequence: &[ModuleDescriptor]) -> Vec<&'static str> {
        sequence.iter().map(|d| d.name()).collect()
    }

    fn sequence_of(root: ModuleType) -> Result<Vec<ModuleDescriptor>> {
        sequence(ModuleGraph::build(root, &[], &ModuleCatalog::new())?)
    }

    #[test]
    fn test_linear_chain() {
        let sequence = sequence_of(ModuleType::of::<Api>()).unwrap();
        assert_eq!(names(&sequence), vec!["Core", "Data", "Api"]);
    }

    #[test]
    fn test_two_module_cycle() {
        let err = sequence_of(ModuleType::of::<X>()).unwrap_err();
        match err {
            ModulithError::CyclicModuleDependency { cycle } => assert_eq!(cycle, vec!["X", "Y"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_below_the_root_lists_only_members() {
        let err = sequence_of(ModuleType::of::<Entry>()).unwrap_err();
        match err {
            ModulithError::CyclicModuleDependency { cycle } => {
                assert_eq!(cycle, vec!["A", "B", "C"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dependencies_precede_dependents_and_ties_keep_discovery_order() {
        let sequence = sequence_of(ModuleType::of::<Host>()).unwrap();
        assert_eq!(
            names(&sequence),
            vec!["Metrics", "Logging", "Core", "Data", "Host"]
        );

        for (position, descriptor) in sequence.iter().enumerate() {
            for dependency in descriptor.dependencies() {
                let dependency_position = sequence
                    .iter()
                    .position(|d| d.module_type() == *dependency)
                    .unwrap();
                assert!(dependency_position < position);
            }
        }
    }

    #[test]
    fn test_sequence_is_deterministic() {
        let first = names(&sequence_of(ModuleType::of::<Host>()).unwrap());
        let second = names(&sequence_of(ModuleType::of::<Host>()).unwrap());
        assert_eq!(first, second);
    }
}
