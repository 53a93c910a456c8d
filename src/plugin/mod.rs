//! Plugin loading
//!
//! A plugin is a JSON manifest dropped into one of the configured plugin
//! directories. It names the assembly it ships and the modules it contributes,
//! by their catalog names:
//!
//! ```json
//! {
//!   "assembly": "acme-billing",
//!   "modules": ["BillingModule", "InvoicingModule"],
//!   "enabled": true
//! }
//! ```
//!
//! Manifests are parsed in parallel on a bounded rayon pool. Loading finishes
//! completely before the module graph is built, and its result is ordered by
//! file path, so the same directory contents always yield the same modules.

use crate::config::Configuration;
use crate::error::{ModulithError, Result};
use crate::module::{ModuleCatalog, ModuleType};
use rayon::prelude::*;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File suffix of plugin manifests
pub const DEFAULT_EXTENSION: &str = ".plugin.json";

fn enabled_by_default() -> bool {
    true
}

/// Contents of a plugin manifest file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginManifest {
    pub assembly: String,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

/// Why a single manifest or directory entry was skipped
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("manifest has an empty assembly name")]
    EmptyAssembly,

    #[error("unknown module '{0}'")]
    UnknownModule(String),

    #[error("failed to scan plugin directory: {0}")]
    Scan(#[from] walkdir::Error),
}

impl PluginManifest {
    pub fn from_file(path: &Path) -> std::result::Result<Self, PluginError> {
        let raw = std::fs::read_to_string(path)?;
        let manifest: PluginManifest = serde_json::from_str(&raw)?;
        if manifest.assembly.trim().is_empty() {
            return Err(PluginError::EmptyAssembly);
        }
        Ok(manifest)
    }
}

/// Where and how to look for plugin manifests
#[derive(Debug, Clone)]
pub struct PluginOptions {
    pub directories: Vec<PathBuf>,
    /// Abort on the first failing manifest instead of skipping it
    pub strict: bool,
    pub recursive: bool,
    pub extension: String,
    /// Threads used to parse manifests
    pub parallelism: usize,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            strict: false,
            recursive: false,
            extension: DEFAULT_EXTENSION.to_string(),
            parallelism: num_cpus::get(),
        }
    }
}

impl PluginOptions {
    /// Read the `PlugIns` section; missing keys keep their defaults
    pub fn from_configuration(configuration: &Configuration) -> Result<Self> {
        let mut options = Self {
            directories: configuration
                .get_list("PlugIns:Directories")
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            ..Self::default()
        };
        if let Some(strict) = configuration.get_bool("PlugIns:Strict")? {
            options.strict = strict;
        }
        if let Some(recursive) = configuration.get_bool("PlugIns:Recursive")? {
            options.recursive = recursive;
        }
        if let Some(extension) = configuration.get("PlugIns:Extension") {
            options.extension = extension;
        }
        if let Some(parallelism) = configuration.get_parsed::<usize>("PlugIns:Parallelism")? {
            options.parallelism = parallelism;
        }
        Ok(options)
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directories.push(directory.into());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }
}

/// A manifest or directory that could not be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginLoadFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl PluginLoadFailure {
    fn new(path: PathBuf, error: &PluginError) -> Self {
        Self {
            path,
            reason: error.to_string(),
        }
    }
}

impl From<PluginLoadFailure> for ModulithError {
    fn from(failure: PluginLoadFailure) -> Self {
        ModulithError::PluginLoad {
            path: failure.path,
            reason: failure.reason,
        }
    }
}

/// Outcome of a plugin scan
#[derive(Debug, Clone, Default)]
pub struct PluginLoadReport {
    modules: Vec<ModuleType>,
    assemblies: BTreeSet<String>,
    failures: Vec<PluginLoadFailure>,
    manifests: usize,
}

impl PluginLoadReport {
    /// Contributed module types, deduplicated, in manifest path order
    pub fn modules(&self) -> &[ModuleType] {
        &self.modules
    }

    pub fn assemblies(&self) -> &BTreeSet<String> {
        &self.assemblies
    }

    /// Manifests and directories that were skipped
    pub fn failures(&self) -> &[PluginLoadFailure] {
        &self.failures
    }

    /// Number of enabled manifests that were loaded
    pub fn manifests(&self) -> usize {
        self.manifests
    }
}

pub struct PluginLoader {
    options: PluginOptions,
}

impl PluginLoader {
    pub fn new(options: PluginOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PluginOptions {
        &self.options
    }

    /// Scan every configured directory and resolve manifest entries against
    /// `catalog`.
    ///
    /// # Errors
    /// In strict mode, the first failure (in path order) as
    /// [`ModulithError::PluginLoad`]. Otherwise failures are only reported.
    pub fn load(&self, catalog: &ModuleCatalog) -> Result<PluginLoadReport> {
        let mut report = PluginLoadReport::default();
        if self.options.directories.is_empty() {
            return Ok(report);
        }

        let mut files = Vec::new();
        let mut failures = Vec::new();
        for directory in &self.options.directories {
            self.scan(directory, &mut files, &mut failures);
        }
        tracing::info!(
            "Found {} plugin manifests in {} directories",
            files.len(),
            self.options.directories.len()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.parallelism.max(1))
            .build()
            .map_err(|e| ModulithError::Internal(format!("plugin loader pool: {e}")))?;
        let parsed: Vec<(PathBuf, std::result::Result<PluginManifest, PluginError>)> =
            pool.install(|| {
                files
                    .par_iter()
                    .map(|path| (path.clone(), PluginManifest::from_file(path)))
                    .collect()
            });

        for (path, manifest) in parsed {
            let manifest = match manifest {
                Ok(manifest) => manifest,
                Err(error) => {
                    failures.push(PluginLoadFailure::new(path, &error));
                    continue;
                }
            };
            if !manifest.enabled {
                tracing::debug!("Skipping disabled plugin {}", path.display());
                continue;
            }

            match Self::resolve(&manifest, catalog) {
                Ok(modules) => {
                    tracing::debug!(
                        "Loaded plugin {} from {} ({} modules)",
                        manifest.assembly,
                        path.display(),
                        modules.len()
                    );
                    report.manifests += 1;
                    report.assemblies.insert(manifest.assembly);
                    for module_type in modules {
                        if !report.modules.contains(&module_type) {
                            report.modules.push(module_type);
                        }
                    }
                }
                Err(error) => failures.push(PluginLoadFailure::new(path, &error)),
            }
        }

        failures.sort_by(|a, b| a.path.cmp(&b.path));
        if self.options.strict {
            if let Some(failure) = failures.into_iter().next() {
                tracing::error!(
                    "Failed to load plugin {}: {}",
                    failure.path.display(),
                    failure.reason
                );
                return Err(failure.into());
            }
        } else {
            for failure in &failures {
                tracing::warn!(
                    "Skipping plugin {}: {}",
                    failure.path.display(),
                    failure.reason
                );
            }
            report.failures = failures;
        }

        tracing::info!(
            "Loaded {} plugin modules from {} manifests",
            report.modules.len(),
            report.manifests
        );
        Ok(report)
    }

    fn resolve(
        manifest: &PluginManifest,
        catalog: &ModuleCatalog,
    ) -> std::result::Result<Vec<ModuleType>, PluginError> {
        manifest
            .modules
            .iter()
            .map(|name| {
                catalog
                    .resolve(name)
                    .ok_or_else(|| PluginError::UnknownModule(name.clone()))
            })
            .collect()
    }

    /// Collect manifest files under `directory`. Symlinks are followed; a
    /// link back to one of its ancestors is reported instead of walked.
    fn scan(&self, directory: &Path, files: &mut Vec<PathBuf>, failures: &mut Vec<PluginLoadFailure>) {
        let max_depth = if self.options.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(directory)
            .follow_links(true)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name();

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file()
                        && entry
                            .file_name()
                            .to_str()
                            .is_some_and(|name| name.ends_with(&self.options.extension))
                    {
                        files.push(entry.into_path());
                    }
                }
                Err(e) => {
                    let path = e.path().map_or_else(|| directory.to_path_buf(), Path::to_path_buf);
                    failures.push(PluginLoadFailure::new(path, &PluginError::from(e)));
                }
            }
        }
    }
}
