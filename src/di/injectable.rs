use crate::di::Container;
use crate::error::Result;

/// Trait for types that can be built from the service container
///
/// This trait is typically implemented automatically via the `#[derive(Injectable)]` macro.
/// Modules register injectable types by type, either directly through
/// [`ServiceCollection::add_injectable`](crate::di::ServiceCollection::add_injectable) or
/// declaratively with `provide::<T>(lifetime)` in their module declaration.
///
/// # Example
/// ```
/// use modulith::{DeriveInjectable, Injectable};
/// use std::sync::Arc;
///
/// pub struct UserRepository;
///
/// #[derive(DeriveInjectable)]
/// pub struct UserService {
///     // This field will be resolved from the container
///     repository: Arc<UserRepository>,
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Create an instance by resolving dependencies from the container
    ///
    /// # Errors
    /// Returns an error if any required dependency is not found in the container.
    fn inject(container: &Container) -> Result<Self>;
}
