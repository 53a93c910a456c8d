mod collection;
mod container;
mod extractor;
mod injectable;

pub use collection::{ServiceCollection, ServiceDescriptor, ServiceLifetime};
pub use container::Container;
pub use extractor::{HasContainer, Inject};
pub use injectable::Injectable;
