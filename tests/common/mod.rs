#![allow(dead_code)]

use modulith::{ApplicationContext, CompositionContext, Phase};
use std::sync::Mutex;

/// Records hook invocations as `Module.Phase`
#[derive(Default)]
pub struct CallLog(Mutex<Vec<String>>);

impl CallLog {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Entries of one phase, in call order
    pub fn phase(&self, phase: Phase) -> Vec<String> {
        let suffix = format!(".{phase}");
        self.entries()
            .into_iter()
            .filter(|entry| entry.ends_with(&suffix))
            .collect()
    }
}

pub fn record(ctx: &CompositionContext, module: &str) {
    if let (Ok(Some(log)), Some(phase)) = (ctx.get_singleton_instance::<CallLog>(), ctx.phase()) {
        log.push(format!("{module}.{phase}"));
    }
}

pub fn record_web(ctx: &ApplicationContext, module: &str, phase: Phase) {
    if let Ok(log) = ctx.container().resolve::<CallLog>() {
        log.push(format!("{module}.{phase}"));
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
