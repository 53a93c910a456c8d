//! Lifecycle
//!
//! Modules move through a fixed series of phases. Each phase runs for every
//! module, in dependency order, before the next phase starts.
//!
//! ```text
//! 1. Plugin manifests loaded
//!    ↓
//! 2. Module graph discovered and sequenced
//!    ↓
//! 3. PreConfigure / Configure / PostConfigure   ← registry open
//!    ↓
//! 4. Registry frozen, container built
//!    ↓
//! 5. Initialize / PostInitialize                ← services resolvable
//!    ↓
//! 6. Finalized
//!    ↓
//! 7. PreApplication / Application / PostApplication (web modules, optional)
//!    ↓
//! [Running...]
//!    ↓
//! 8. Shutdown (reverse order)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use modulith::prelude::*;
//!
//! #[module(depends_on = [CoreModule])]
//! #[derive(Default)]
//! pub struct DataModule;
//!
//! #[async_trait]
//! impl Module for DataModule {
//!     async fn configure_services(&self, ctx: &mut CompositionContext) -> anyhow::Result<()> {
//!         tracing::info!("Registering repositories");
//!         ctx.services()?.add_instance(Repositories::default());
//!         Ok(())
//!     }
//! }
//! ```

mod application;
mod context;
mod orchestrator;
mod phase;
mod shutdown;

pub use application::{Application, ApplicationBuilder, ApplicationInfo};
pub use context::CompositionContext;
pub use orchestrator::LifecycleOrchestrator;
pub use phase::Phase;
pub use shutdown::shutdown_signal;
