//! # Modulith
//!
//! Modular application composition for Rust.
//!
//! An application is a graph of modules. Each module declares the modules it
//! depends on and contributes services and configuration through lifecycle
//! hooks. Modulith discovers the graph from a root module (plus plugin
//! manifests), orders it so dependencies come first, and runs every hook of
//! one phase across all modules before starting the next phase.
//!
//! ## Features
//!
//! - **Module graph**: deduplicated discovery, deterministic topological order, cycle detection
//! - **Phased lifecycle**: PreConfigure → Configure → PostConfigure → Initialize → PostInitialize
//! - **Deferred configuration**: queue actions for options objects that do not exist yet
//! - **Web phases**: capability-gated hooks that assemble an `axum::Router`
//! - **Plugins**: JSON manifests contributing extra modules at startup
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use modulith::prelude::*;
//!
//! #[derive(Default)]
//! pub struct JwtOptions {
//!     pub min_length: usize,
//! }
//!
//! #[module]
//! pub struct CoreModule;
//!
//! #[async_trait]
//! impl Module for CoreModule {
//!     async fn pre_configure_services(&self, ctx: &mut CompositionContext) -> anyhow::Result<()> {
//!         ctx.pre_configure::<JwtOptions, _>(|o| o.min_length = 16)?;
//!         Ok(())
//!     }
//! }
//!
//! #[module(depends_on = [CoreModule], providers = [TokenService])]
//! pub struct IdentityModule;
//!
//! #[async_trait]
//! impl Module for IdentityModule {}
//!
//! #[tokio::main]
//! async fn main() -> modulith::Result<()> {
//!     let mut app = Application::builder::<IdentityModule>()
//!         .configuration(Configuration::from_env()?)
//!         .build()
//!         .await?;
//!
//!     let jwt = app.container().options::<JwtOptions>()?;
//!     assert_eq!(jwt.min_length, 16);
//!
//!     app.shutdown().await
//! }
//! ```

// Lets the derive and attribute macros refer to `::modulith` inside this crate too.
extern crate self as modulith;

pub mod config;
pub mod di;
pub mod error;
pub mod lifecycle;
pub mod module;
pub mod options;
pub mod plugin;
pub mod web;

// Re-export core types
pub use config::Configuration;
pub use di::{
    Container, HasContainer, Inject, Injectable, ServiceCollection, ServiceDescriptor,
    ServiceLifetime,
};
pub use error::{ModulithError, Result};
pub use lifecycle::{
    Application, ApplicationBuilder, ApplicationInfo, CompositionContext, LifecycleOrchestrator,
    Phase, shutdown_signal,
};
pub use module::{
    Module, ModuleCatalog, ModuleDeclaration, ModuleDefinition, ModuleDescriptor, ModuleType,
};
pub use options::PreConfigureActions;
pub use plugin::{PluginError, PluginLoader, PluginOptions};
pub use web::{ApplicationContext, WebModule};

// Re-export macros
pub use modulith_macro::{Injectable as DeriveInjectable, module};

// Re-export commonly used types from dependencies
pub use anyhow;
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use modulith::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::Configuration;
    pub use crate::di::{Container, HasContainer, Inject, Injectable, ServiceCollection, ServiceLifetime};
    pub use crate::error::{ModulithError, Result};
    pub use crate::lifecycle::{Application, CompositionContext, Phase, shutdown_signal};
    pub use crate::module::{Module, ModuleDeclaration, ModuleDefinition};
    pub use crate::web::{ApplicationContext, WebModule};
    pub use crate::{DeriveInjectable, module};
    pub use async_trait::async_trait;
    pub use axum::Router;
    pub use std::sync::Arc;
}
