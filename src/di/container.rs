use crate::di::collection::{AnyService, ServiceDescriptor, ServiceLifetime, ServiceSource};
use crate::di::ServiceCollection;
use crate::error::{ModulithError, Result};
use crate::options::{OptionsActions, PreConfigureActions};
use dashmap::DashMap;
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

/// Frozen, thread-safe service provider built from a [`ServiceCollection`].
///
/// Cloning is cheap: clones share registrations and the singleton cache.
/// A scope created with [`create_scope`](Self::create_scope) shares
/// singletons with its root but has its own cache for scoped services.
#[derive(Clone)]
pub struct Container {
    registrations: Arc<HashMap<TypeId, Vec<ServiceDescriptor>>>,
    singletons: Arc<DashMap<usize, AnyService>>,
    scoped: Option<Arc<DashMap<usize, AnyService>>>,
    options: Arc<OptionsActions>,
    materialized_options: Arc<DashMap<TypeId, AnyService>>,
    pre_configure: PreConfigureActions,
}

impl Container {
    /// Build a container with no options callbacks.
    pub fn new(services: ServiceCollection) -> Self {
        Self::build(services, OptionsActions::new(), PreConfigureActions::new())
    }

    pub(crate) fn build(
        services: ServiceCollection,
        options: OptionsActions,
        pre_configure: PreConfigureActions,
    ) -> Self {
        let mut registrations: HashMap<TypeId, Vec<ServiceDescriptor>> = HashMap::new();
        for descriptor in services.into_descriptors() {
            registrations
                .entry(descriptor.service_type())
                .or_default()
                .push(descriptor);
        }

        Self {
            registrations: Arc::new(registrations),
            singletons: Arc::new(DashMap::new()),
            scoped: None,
            options: Arc::new(options),
            materialized_options: Arc::new(DashMap::new()),
            pre_configure,
        }
    }

    /// Create a child scope with its own cache for scoped services
    pub fn create_scope(&self) -> Container {
        Self {
            scoped: Some(Arc::new(DashMap::new())),
            ..self.root()
        }
    }

    pub fn is_scope(&self) -> bool {
        self.scoped.is_some()
    }

    fn root(&self) -> Container {
        Self {
            registrations: Arc::clone(&self.registrations),
            singletons: Arc::clone(&self.singletons),
            scoped: None,
            options: Arc::clone(&self.options),
            materialized_options: Arc::clone(&self.materialized_options),
            pre_configure: self.pre_configure.clone(),
        }
    }

    /// Resolve the last registration of `T`
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let descriptor = self
            .registrations
            .get(&TypeId::of::<T>())
            .and_then(|all| all.last())
            .ok_or_else(|| ModulithError::DependencyNotFound {
                type_name: type_name::<T>().to_string(),
            })?;
        self.resolve_descriptor::<T>(descriptor)
    }

    /// Like [`resolve`](Self::resolve), but `None` when `T` is not registered.
    /// Factory failures are still errors.
    pub fn try_resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        match self.registrations.get(&TypeId::of::<T>()).and_then(|all| all.last()) {
            Some(descriptor) => self.resolve_descriptor::<T>(descriptor).map(Some),
            None => Ok(None),
        }
    }

    /// The last registration of `T` if it is a singleton. Scoped and transient
    /// registrations yield `None` and are never invoked; factory failures of
    /// a singleton are errors.
    pub fn get_singleton<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        match self.registrations.get(&TypeId::of::<T>()).and_then(|all| all.last()) {
            Some(descriptor) if descriptor.lifetime() == ServiceLifetime::Singleton => {
                self.resolve_descriptor::<T>(descriptor).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Resolve every registration of `T`, in registration order
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        self.registrations
            .get(&TypeId::of::<T>())
            .map(|all| all.iter().map(|d| self.resolve_descriptor::<T>(d)).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn resolve_descriptor<T: ?Sized + Send + Sync + 'static>(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<Arc<T>> {
        let value = match (&descriptor.source, descriptor.lifetime()) {
            (ServiceSource::Instance(value), _) => Arc::clone(value),
            (ServiceSource::Factory(factory), ServiceLifetime::Singleton) => {
                match self.singletons.get(&descriptor.id) {
                    Some(cached) => Arc::clone(cached.value()),
                    None => {
                        // Built without holding the shard lock: the factory may resolve
                        // other singletons.
                        let built = self.invoke(factory, descriptor, &self.root())?;
                        Arc::clone(self.singletons.entry(descriptor.id).or_insert(built).value())
                    }
                }
            }
            (ServiceSource::Factory(factory), ServiceLifetime::Scoped) => {
                let scope = self.scoped.as_ref().ok_or_else(|| ModulithError::ScopeMismatch {
                    message: format!(
                        "scoped service '{}' resolved from the root container",
                        descriptor.type_name()
                    ),
                })?;
                match scope.get(&descriptor.id) {
                    Some(cached) => Arc::clone(cached.value()),
                    None => {
                        let built = self.invoke(factory, descriptor, self)?;
                        Arc::clone(scope.entry(descriptor.id).or_insert(built).value())
                    }
                }
            }
            (ServiceSource::Factory(factory), ServiceLifetime::Transient) => {
                self.invoke(factory, descriptor, self)?
            }
        };

        value
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or_else(|| ModulithError::DowncastFailed {
                type_name: type_name::<T>().to_string(),
            })
    }

    fn invoke(
        &self,
        factory: &crate::di::collection::FactoryFn,
        descriptor: &ServiceDescriptor,
        resolver: &Container,
    ) -> Result<AnyService> {
        factory(resolver).map_err(|source| ModulithError::ServiceFactory {
            type_name: descriptor.type_name().to_string(),
            source,
        })
    }

    /// Get the options value of type `T`, materializing it on first request.
    ///
    /// Materialization runs pending pre-configure actions, then configure and
    /// post-configure actions. The result is cached for the container's life.
    pub fn options<T: Any + Default + Send + Sync>(&self) -> Result<Arc<T>> {
        let type_id = TypeId::of::<T>();
        let cached = match self.materialized_options.get(&type_id) {
            Some(cached) => Arc::clone(cached.value()),
            None => {
                let built: AnyService =
                    Arc::new(Arc::new(self.options.build::<T>(&self.pre_configure)?));
                Arc::clone(self.materialized_options.entry(type_id).or_insert(built).value())
            }
        };
        cached
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or_else(|| ModulithError::DowncastFailed {
                type_name: type_name::<T>().to_string(),
            })
    }

    pub fn pre_configure_actions(&self) -> &PreConfigureActions {
        &self.pre_configure
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.registrations.contains_key(&TypeId::of::<T>())
    }

    /// Number of distinct registered service types
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new(ServiceCollection::new())
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("services", &self.registrations.len())
            .field("scope", &self.is_scope())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestService {
        value: i32,
    }

    trait MyTrait: Send + Sync {
        fn get_value(&self) -> i32;
    }

    struct MyTraitImpl {
        value: i32,
    }

    impl MyTrait for MyTraitImpl {
        fn get_value(&self) -> i32 {
            self.value
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut services = ServiceCollection::new();
        services.add_instance(TestService { value: 42 });
        let container = Container::new(services);
        let service = container.resolve::<TestService>().unwrap();
        assert_eq!(service.value, 42);
    }

    #[test]
    fn test_register_and_resolve_trait() {
        let mut services = ServiceCollection::new();
        services.add_singleton::<dyn MyTrait, _>(|_| Ok(Arc::new(MyTraitImpl { value: 99 })));
        let container = Container::new(services);
        let trait_instance = container.resolve::<dyn MyTrait>().unwrap();
        assert_eq!(trait_instance.get_value(), 99);
    }

    #[test]
    fn test_last_registration_wins_and_all_are_listed() {
        let mut services = ServiceCollection::new();
        services.add_instance(TestService { value: 1 });
        services.add_instance(TestService { value: 2 });
        let container = Container::new(services);

        assert_eq!(container.resolve::<TestService>().unwrap().value, 2);
        let all: Vec<i32> = container
            .resolve_all::<TestService>()
            .unwrap()
            .iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(all, vec![1, 2]);
    }

    #[test]
    fn test_lifetimes() {
        let built = Arc::new(AtomicUsize::new(0));
        let mut services = ServiceCollection::new();

        let counter = Arc::clone(&built);
        services.add_singleton::<TestService, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(TestService { value: 1 }))
        });
        services.add_transient::<MyTraitImpl, _>(|_| Ok(Arc::new(MyTraitImpl { value: 2 })));
        services.add_scoped::<String, _>(|_| Ok(Arc::new("scoped".to_string())));
        let container = Container::new(services);

        let a = container.resolve::<TestService>().unwrap();
        let b = container.resolve::<TestService>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);

        let t1 = container.resolve::<MyTraitImpl>().unwrap();
        let t2 = container.resolve::<MyTraitImpl>().unwrap();
        assert!(!Arc::ptr_eq(&t1, &t2));

        let scope = container.create_scope();
        let s1 = scope.resolve::<String>().unwrap();
        let s2 = scope.resolve::<String>().unwrap();
        assert!(Arc::ptr_eq(&s1, &s2));
        let other = container.create_scope().resolve::<String>().unwrap();
        assert!(!Arc::ptr_eq(&s1, &other));

        // Singletons are shared between root and scopes.
        assert!(Arc::ptr_eq(&a, &scope.resolve::<TestService>().unwrap()));
    }

    #[test]
    fn test_get_singleton_skips_other_lifetimes() {
        let transient_calls = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&transient_calls);
        let mut services = ServiceCollection::new();
        services.add_instance(7u32);
        services.add_transient::<MyTraitImpl, _>(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MyTraitImpl { value: 3 }))
        });
        services.add_scoped::<String, _>(|_| Ok(Arc::new("scoped".to_string())));
        services.add_singleton::<TestService, _>(|_| anyhow::bail!("database offline"));
        let container = Container::new(services);

        assert_eq!(*container.get_singleton::<u32>().unwrap().unwrap(), 7);
        assert!(container.get_singleton::<MyTraitImpl>().unwrap().is_none());
        assert_eq!(transient_calls.load(Ordering::SeqCst), 0);
        assert!(container.get_singleton::<String>().unwrap().is_none());
        assert!(container.get_singleton::<u64>().unwrap().is_none());
        assert!(matches!(
            container.get_singleton::<TestService>(),
            Err(ModulithError::ServiceFactory { .. })
        ));
    }

    #[test]
    fn test_scoped_from_root_is_rejected() {
        let mut services = ServiceCollection::new();
        services.add_scoped::<String, _>(|_| Ok(Arc::new(String::new())));
        let container = Container::new(services);
        let err = container.resolve::<String>().unwrap_err();
        assert!(matches!(err, ModulithError::ScopeMismatch { .. }));
    }

    #[test]
    fn test_missing_and_failing_services() {
        let mut services = ServiceCollection::new();
        services.add_singleton::<TestService, _>(|_| anyhow::bail!("database offline"));
        let container = Container::new(services);

        assert!(matches!(
            container.resolve::<String>().unwrap_err(),
            ModulithError::DependencyNotFound { .. }
        ));
        assert!(container.try_resolve::<String>().unwrap().is_none());
        assert!(container.try_resolve::<TestService>().is_err());
        assert!(matches!(
            container.resolve::<TestService>().unwrap_err(),
            ModulithError::ServiceFactory { .. }
        ));
    }

    #[test]
    fn test_options_are_materialized_once() {
        #[derive(Default)]
        struct JwtOptions {
            min_length: usize,
        }

        let pre = PreConfigureActions::new();
        pre.pre_configure::<JwtOptions, _>(|o| o.min_length = 16).unwrap();
        let mut options = OptionsActions::new();
        options.post_configure::<JwtOptions, _>(|o| o.min_length *= 2);

        let container = Container::build(ServiceCollection::new(), options, pre);
        let first = container.options::<JwtOptions>().unwrap();
        let second = container.options::<JwtOptions>().unwrap();
        assert_eq!(first.min_length, 32);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
