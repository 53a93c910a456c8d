use crate::error::{ModulithError, Result};
use std::any::{Any, TypeId, type_name};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type DeferredAction = Box<dyn FnOnce(&mut dyn Any) + Send>;

#[derive(Default)]
struct Slots {
    actions: HashMap<TypeId, Vec<DeferredAction>>,
    draining: HashSet<TypeId>,
    rejected: HashSet<TypeId>,
}

/// Clears the draining mark for one type when dropped, so an action that
/// panics does not leave its type locked.
struct DrainGuard<'a> {
    actions: &'a PreConfigureActions,
    type_id: TypeId,
}

impl DrainGuard<'_> {
    /// Whether an action tried to queue another one for the same type
    fn rejected(&self) -> bool {
        self.actions.lock().rejected.contains(&self.type_id)
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.actions.lock();
        slots.draining.remove(&self.type_id);
        slots.rejected.remove(&self.type_id);
    }
}

/// Store of actions waiting for a configuration object that does not exist yet.
///
/// A module calls [`pre_configure`](Self::pre_configure) for an options type it
/// does not own; the owning module (or the container, when the options are
/// first requested) later calls
/// [`execute_pre_configured_actions`](Self::execute_pre_configured_actions)
/// on the materialized instance. Actions run in registration order, exactly
/// once, after which the slot for that type is empty again.
///
/// Handles are cheap to clone and share the same slots, so an action may
/// capture one. The internal lock is never held while an action runs.
///
/// # Example
/// ```
/// use modulith::options::PreConfigureActions;
///
/// #[derive(Default)]
/// struct JwtOptions {
///     min_length: usize,
/// }
///
/// let actions = PreConfigureActions::new();
/// actions.pre_configure::<JwtOptions, _>(|o| o.min_length = 16).unwrap();
///
/// let mut options = JwtOptions::default();
/// assert_eq!(actions.execute_pre_configured_actions(&mut options).unwrap(), 1);
/// assert_eq!(options.min_length, 16);
/// ```
#[derive(Clone, Default)]
pub struct PreConfigureActions {
    slots: Arc<Mutex<Slots>>,
}

impl PreConfigureActions {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `action` for the next materialization of `T`.
    ///
    /// # Errors
    /// Returns [`ModulithError::DeferredActionReentrancy`] when called from an
    /// action that is currently being applied for the same `T`.
    pub fn pre_configure<T, F>(&self, action: F) -> Result<()>
    where
        T: Any,
        F: FnOnce(&mut T) + Send + 'static,
    {
        let type_id = TypeId::of::<T>();
        let mut slots = self.lock();

        if slots.draining.contains(&type_id) {
            slots.rejected.insert(type_id);
            tracing::error!(
                "Rejected re-entrant pre-configure action for {}",
                type_name::<T>()
            );
            return Err(ModulithError::DeferredActionReentrancy {
                type_name: type_name::<T>(),
            });
        }

        let erased: DeferredAction = Box::new(move |target: &mut dyn Any| {
            if let Some(target) = target.downcast_mut::<T>() {
                action(target);
            }
        });
        slots.actions.entry(type_id).or_default().push(erased);
        tracing::debug!("Queued pre-configure action for {}", type_name::<T>());
        Ok(())
    }

    /// Apply and clear every action queued for `T`, returning how many ran.
    ///
    /// # Errors
    /// Returns [`ModulithError::DeferredActionReentrancy`] if `T` is already
    /// being drained, or if one of the applied actions tried to queue another
    /// action for `T`. In the latter case every queued action has still run.
    ///
    /// If an action panics, the actions queued after it are dropped and `T`
    /// can be configured again afterwards.
    pub fn execute_pre_configured_actions<T: Any>(&self, instance: &mut T) -> Result<usize> {
        let type_id = TypeId::of::<T>();

        let pending = {
            let mut slots = self.lock();
            if !slots.draining.insert(type_id) {
                return Err(ModulithError::DeferredActionReentrancy {
                    type_name: type_name::<T>(),
                });
            }
            slots.actions.remove(&type_id).unwrap_or_default()
        };
        let guard = DrainGuard {
            actions: self,
            type_id,
        };

        let applied = pending.len();
        for action in pending {
            action(&mut *instance);
        }

        let rejected = guard.rejected();
        drop(guard);
        if rejected {
            return Err(ModulithError::DeferredActionReentrancy {
                type_name: type_name::<T>(),
            });
        }

        if applied > 0 {
            tracing::debug!(
                "Applied {} pre-configure action(s) to {}",
                applied,
                type_name::<T>()
            );
        }
        Ok(applied)
    }

    /// Create a fresh `T` and apply every queued action to it.
    pub fn materialize<T: Any + Default>(&self) -> Result<T> {
        let mut instance = T::default();
        self.execute_pre_configured_actions(&mut instance)?;
        Ok(instance)
    }

    /// Number of actions currently queued for `T`.
    pub fn pending<T: Any>(&self) -> usize {
        self.lock()
            .actions
            .get(&TypeId::of::<T>())
            .map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for PreConfigureActions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.lock();
        f.debug_struct("PreConfigureActions")
            .field("types", &slots.actions.len())
            .field("draining", &slots.draining.len())
            .finish()
    }
}
