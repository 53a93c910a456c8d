use crate::di::{Container, Injectable};
use std::any::{Any, TypeId, type_name};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Type-erased service value. The inner value is always an `Arc<T>`, which
/// lets unsized services (`dyn Trait`) be stored the same way as concrete ones.
pub(crate) type AnyService = Arc<dyn Any + Send + Sync>;

pub(crate) type FactoryFn =
    Arc<dyn Fn(&Container) -> anyhow::Result<AnyService> + Send + Sync>;

static NEXT_DESCRIPTOR_ID: AtomicUsize = AtomicUsize::new(0);

/// How long a resolved service lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum ServiceLifetime {
    /// One instance per container
    Singleton,
    /// One instance per scope created with [`Container::create_scope`]
    Scoped,
    /// A new instance on every resolution
    Transient,
}

#[derive(Clone)]
pub(crate) enum ServiceSource {
    Instance(AnyService),
    Factory(FactoryFn),
}

/// A single service registration
#[derive(Clone)]
pub struct ServiceDescriptor {
    pub(crate) id: usize,
    service_type: TypeId,
    type_name: &'static str,
    lifetime: ServiceLifetime,
    pub(crate) source: ServiceSource,
}

impl ServiceDescriptor {
    fn new<T: ?Sized + 'static>(lifetime: ServiceLifetime, source: ServiceSource) -> Self {
        Self {
            id: NEXT_DESCRIPTOR_ID.fetch_add(1, Ordering::Relaxed),
            service_type: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            lifetime,
            source,
        }
    }

    /// Register an already-built singleton
    pub fn instance<T: ?Sized + Send + Sync + 'static>(instance: Arc<T>) -> Self {
        Self::new::<T>(
            ServiceLifetime::Singleton,
            ServiceSource::Instance(Arc::new(instance)),
        )
    }

    /// Register a factory invoked according to `lifetime`
    pub fn factory<T, F>(lifetime: ServiceLifetime, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        let erased: FactoryFn = Arc::new(move |container: &Container| {
            let service = factory(container)?;
            Ok(Arc::new(service) as AnyService)
        });
        Self::new::<T>(lifetime, ServiceSource::Factory(erased))
    }

    /// Register a type whose dependencies are resolved through [`Injectable`]
    pub fn injectable<T: Injectable>(lifetime: ServiceLifetime) -> Self {
        Self::factory::<T, _>(lifetime, |container| Ok(Arc::new(T::inject(container)?)))
    }

    pub fn service_type(&self) -> TypeId {
        self.service_type
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn lifetime(&self) -> ServiceLifetime {
        self.lifetime
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("type_name", &self.type_name)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

/// Mutable registration surface used while modules configure services.
///
/// `add_*` appends (the last registration wins on resolve), `try_add_*` only
/// registers when the type has no registration yet (first writer wins), and
/// `replace_*` drops earlier registrations before adding.
///
/// # Example
/// ```
/// use modulith::di::{ServiceCollection, ServiceLifetime};
/// use std::sync::Arc;
///
/// struct Clock;
///
/// let mut services = ServiceCollection::new();
/// services.add_instance(Clock);
/// assert!(!services.try_add_singleton::<Clock, _>(|_| Ok(Arc::new(Clock))));
/// assert!(services.contains::<Clock>());
/// ```
#[derive(Clone, Default)]
pub struct ServiceCollection {
    descriptors: Vec<ServiceDescriptor>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, descriptor: ServiceDescriptor) -> &mut Self {
        tracing::debug!(
            "Registered {} ({})",
            descriptor.type_name,
            descriptor.lifetime
        );
        self.descriptors.push(descriptor);
        self
    }

    /// Returns `false` if the service type was already registered
    pub fn try_add(&mut self, descriptor: ServiceDescriptor) -> bool {
        if self.contains_type(descriptor.service_type) {
            return false;
        }
        self.add(descriptor);
        true
    }

    pub fn replace(&mut self, descriptor: ServiceDescriptor) -> &mut Self {
        let service_type = descriptor.service_type;
        self.descriptors.retain(|d| d.service_type != service_type);
        self.add(descriptor)
    }

    pub fn add_instance<T: Send + Sync + 'static>(&mut self, instance: T) -> &mut Self {
        self.add(ServiceDescriptor::instance(Arc::new(instance)))
    }

    pub fn add_shared<T: ?Sized + Send + Sync + 'static>(&mut self, instance: Arc<T>) -> &mut Self {
        self.add(ServiceDescriptor::instance(instance))
    }

    pub fn add_singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::factory(ServiceLifetime::Singleton, factory))
    }

    pub fn add_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::factory(ServiceLifetime::Scoped, factory))
    }

    pub fn add_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::factory(ServiceLifetime::Transient, factory))
    }

    pub fn add_injectable<T: Injectable>(&mut self, lifetime: ServiceLifetime) -> &mut Self {
        self.add(ServiceDescriptor::injectable::<T>(lifetime))
    }

    pub fn try_add_instance<T: Send + Sync + 'static>(&mut self, instance: T) -> bool {
        self.try_add(ServiceDescriptor::instance(Arc::new(instance)))
    }

    pub fn try_add_singleton<T, F>(&mut self, factory: F) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        self.try_add(ServiceDescriptor::factory(ServiceLifetime::Singleton, factory))
    }

    pub fn try_add_injectable<T: Injectable>(&mut self, lifetime: ServiceLifetime) -> bool {
        self.try_add(ServiceDescriptor::injectable::<T>(lifetime))
    }

    pub fn replace_instance<T: Send + Sync + 'static>(&mut self, instance: T) -> &mut Self {
        self.replace(ServiceDescriptor::instance(Arc::new(instance)))
    }

    pub fn replace_singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        self.replace(ServiceDescriptor::factory(ServiceLifetime::Singleton, factory))
    }

    fn contains_type(&self, service_type: TypeId) -> bool {
        self.descriptors
            .iter()
            .any(|d| d.service_type == service_type)
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.contains_type(TypeId::of::<T>())
    }

    /// The most recently registered pre-built instance of `T`, if any.
    ///
    /// Factories are never invoked; this only sees `add_instance`/`add_shared`.
    pub fn get_singleton_instance<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let service_type = TypeId::of::<T>();
        self.descriptors
            .iter()
            .rev()
            .filter(|d| d.service_type == service_type)
            .find_map(|d| match &d.source {
                ServiceSource::Instance(value) => value.downcast_ref::<Arc<T>>().cloned(),
                ServiceSource::Factory(_) => None,
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub(crate) fn into_descriptors(self) -> Vec<ServiceDescriptor> {
        self.descriptors
    }
}

impl Extend<ServiceDescriptor> for ServiceCollection {
    fn extend<I: IntoIterator<Item = ServiceDescriptor>>(&mut self, iter: I) {
        for descriptor in iter {
            self.add(descriptor);
        }
    }
}

impl std::fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.descriptors.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeting(&'static str);

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[test]
    fn test_try_add_is_first_writer_wins() {
        let mut services = ServiceCollection::new();
        assert!(services.try_add_instance(Greeting("first")));
        assert!(!services.try_add_instance(Greeting("second")));
        assert_eq!(services.len(), 1);
        assert_eq!(
            services.get_singleton_instance::<Greeting>().unwrap().0,
            "first"
        );
    }

    #[test]
    fn test_replace_drops_earlier_registrations() {
        let mut services = ServiceCollection::new();
        services.add_instance(Greeting("a"));
        services.add_instance(Greeting("b"));
        services.replace_instance(Greeting("c"));
        assert_eq!(services.len(), 1);
        assert_eq!(services.get_singleton_instance::<Greeting>().unwrap().0, "c");
    }

    #[test]
    fn test_unsized_services_are_supported() {
        let mut services = ServiceCollection::new();
        services.add_shared::<dyn Greeter>(Arc::new(English));
        let greeter = services.get_singleton_instance::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(!services.contains::<English>());
    }

    #[test]
    fn test_factories_are_not_visible_as_instances() {
        let mut services = ServiceCollection::new();
        services.add_singleton::<Greeting, _>(|_| Ok(Arc::new(Greeting("lazy"))));
        assert!(services.contains::<Greeting>());
        assert!(services.get_singleton_instance::<Greeting>().is_none());
    }
}
