//! Module graph
//!
//! ```text
//! root module ──┐
//! plugin types ─┼─→ build_graph       ─→ sequence ─→ [dependencies..., root]
//! extra types ──┘    (dedup, discovery     (topological, cycle
//!                     order)                detection)
//! ```

mod catalog;
mod definition;
mod descriptor;
mod graph;
mod sequence;

pub use catalog::ModuleCatalog;
pub use definition::{Dependency, Module, ModuleDeclaration, ModuleDefinition, ModuleType};
pub use descriptor::ModuleDescriptor;
pub use graph::{ModuleGraph, build_graph};
pub use sequence::sequence;
