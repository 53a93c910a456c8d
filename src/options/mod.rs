//! Options pattern
//!
//! Configuration objects ("options") are plain `Default` types that are
//! materialized lazily, the first time something asks the container for them.
//! Building an options value runs three groups of callbacks in order:
//!
//! ```text
//! T::default()
//!    ↓
//! pre-configure actions   (PreConfigureActions, drained once)
//!    ↓
//! configure actions       (registered during the configure phases)
//!    ↓
//! post-configure actions
//! ```

mod pre_configure;

pub use pre_configure::PreConfigureActions;

use crate::error::Result;
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;

type ConfigureAction = Box<dyn Fn(&mut dyn Any) + Send + Sync>;

/// Configure and post-configure callbacks, keyed by options type.
#[derive(Default)]
pub struct OptionsActions {
    configure: HashMap<TypeId, Vec<ConfigureAction>>,
    post_configure: HashMap<TypeId, Vec<ConfigureAction>>,
}

fn erase<T, F>(action: F) -> ConfigureAction
where
    T: Any,
    F: Fn(&mut T) + Send + Sync + 'static,
{
    Box::new(move |target: &mut dyn Any| {
        if let Some(target) = target.downcast_mut::<T>() {
            action(target);
        }
    })
}

impl OptionsActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure<T, F>(&mut self, action: F)
    where
        T: Any,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.configure
            .entry(TypeId::of::<T>())
            .or_default()
            .push(erase(action));
    }

    pub fn post_configure<T, F>(&mut self, action: F)
    where
        T: Any,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.post_configure
            .entry(TypeId::of::<T>())
            .or_default()
            .push(erase(action));
    }

    pub fn is_configured<T: Any>(&self) -> bool {
        let type_id = TypeId::of::<T>();
        self.configure.contains_key(&type_id) || self.post_configure.contains_key(&type_id)
    }

    /// Build a `T` by running every stage of the options pipeline.
    pub fn build<T: Any + Default>(&self, pre_configure: &PreConfigureActions) -> Result<T> {
        let mut options = pre_configure.materialize::<T>()?;
        let type_id = TypeId::of::<T>();

        for stage in [&self.configure, &self.post_configure] {
            for action in stage.get(&type_id).into_iter().flatten() {
                action(&mut options);
            }
        }

        tracing::debug!("Materialized options {}", type_name::<T>());
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug)]
    struct CacheOptions {
        ttl: u64,
        steps: Vec<&'static str>,
    }

    #[test]
    fn test_stages_run_in_order() {
        let pre = PreConfigureActions::new();
        let mut actions = OptionsActions::new();

        actions.post_configure::<CacheOptions, _>(|o| o.steps.push("post"));
        actions.configure::<CacheOptions, _>(|o| {
            o.steps.push("configure");
            o.ttl = 30;
        });
        pre.pre_configure::<CacheOptions, _>(|o| o.steps.push("pre"))
            .unwrap();

        let options = actions.build::<CacheOptions>(&pre).unwrap();
        assert_eq!(options.steps, vec!["pre", "configure", "post"]);
        assert_eq!(options.ttl, 30);
        assert!(actions.is_configured::<CacheOptions>());
    }

    #[test]
    fn test_unconfigured_options_use_default() {
        let options = OptionsActions::new()
            .build::<CacheOptions>(&PreConfigureActions::new())
            .unwrap();
        assert_eq!(options.ttl, 0);
        assert!(options.steps.is_empty());
    }
}
