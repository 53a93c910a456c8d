use proc_macro::TokenStream;

mod injectable;
mod module;

/// Derive macro for building a struct from the service container
///
/// `Arc<T>` fields are resolved with `container.resolve::<T>()`, which also
/// covers `Arc<dyn Trait>`. Fields marked `#[inject(options)]` receive the
/// materialized options value, `#[inject(default)]` fields are filled with
/// `Default::default()`.
///
/// # Example
/// ```ignore
/// use modulith::DeriveInjectable;
///
/// #[derive(DeriveInjectable)]
/// pub struct TokenService {
///     repository: Arc<dyn UserRepository>,
///     #[inject(options)]
///     jwt: Arc<JwtOptions>,
/// }
/// ```
#[proc_macro_derive(Injectable, attributes(inject))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    injectable::derive_injectable(input)
}

/// Attribute macro declaring a module's dependencies and conventional
/// service registrations
///
/// Generates the `ModuleDefinition` impl. The struct must be a unit struct or
/// implement `Default`; the `Module` hooks are implemented separately.
///
/// # Example
/// ```ignore
/// use modulith::module;
///
/// #[module(
///     depends_on = [CoreModule],
///     named = ["BillingModule"],
///     providers = [UserService],
///     scoped = [RequestAudit],
///     assemblies = ["identity-contracts"],
/// )]
/// pub struct IdentityModule;
/// ```
#[proc_macro_attribute]
pub fn module(attr: TokenStream, item: TokenStream) -> TokenStream {
    module::module_attribute(attr, item)
}
