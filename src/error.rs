use crate::lifecycle::Phase;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModulithError>;

#[derive(Debug, Error)]
pub enum ModulithError {
    #[error("Failed to construct module {module}: {source}")]
    ModuleConstruction {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Module {module} depends on {dependency}, which is not a known module")]
    MissingModule { module: String, dependency: String },

    #[error("Cyclic module dependency detected: {}", .cycle.join(" -> "))]
    CyclicModuleDependency { cycle: Vec<String> },

    #[error("Module {module} failed during {phase}: {source}")]
    ModuleLifecycle {
        phase: Phase,
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Pre-configure action registered for {type_name} while its actions are being executed")]
    DeferredActionReentrancy { type_name: &'static str },

    #[error("Failed to load plugin {}: {reason}", .path.display())]
    PluginLoad { path: PathBuf, reason: String },

    #[error("Service registry is frozen; registrations are only accepted during the configure phases")]
    RegistryFrozen,

    #[error("Service container has not been built yet")]
    ContainerNotBuilt,

    #[error("Dependency not found: {type_name}")]
    DependencyNotFound { type_name: String },

    #[error("Failed to downcast type: {type_name}")]
    DowncastFailed { type_name: String },

    #[error("Scope mismatch: {message}")]
    ScopeMismatch { message: String },

    #[error("Factory for {type_name} failed: {source}")]
    ServiceFactory {
        type_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid configuration value for {key}: {message}")]
    Configuration { key: String, message: String },

    #[error("Web phases have already been run for this application")]
    WebAlreadyInitialized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ModulithError {
    pub(crate) fn lifecycle(
        phase: Phase,
        module: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self::ModuleLifecycle {
            phase,
            module: module.into(),
            source,
        }
    }
}

impl axum::response::IntoResponse for ModulithError {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::INTERNAL_SERVER_ERROR;
        tracing::error!("Request failed: {}", self);
        (status, self.to_string()).into_response()
    }
}
