use crate::error::{ModulithError, Result};
use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, Source, Value, ValueKind};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

/// Separator between configuration sections, e.g. `PlugIns:Directories`
pub const SECTION_SEPARATOR: &str = ":";

/// Application configuration shared with every module.
///
/// Layered on [`::config::Config`]: every JSON document, batch of environment
/// variables (`PlugIns__Strict` becomes `PlugIns:Strict`) or explicit
/// [`set`](Self::set) is merged on top of what is already there, so later
/// sources override earlier ones. A later value replaces an earlier one
/// wholesale, arrays included. Key lookups ignore ASCII case.
///
/// Clones share the same layers.
#[derive(Clone, Default)]
pub struct Configuration {
    layers: Arc<RwLock<Config>>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration populated from every environment variable
    pub fn from_env() -> Result<Self> {
        let configuration = Self::new();
        configuration.add_env_vars(env::vars())?;
        Ok(configuration)
    }

    /// Add variables, translating `__` into the section separator
    pub fn add_env_vars(&self, vars: impl IntoIterator<Item = (String, String)>) -> Result<()> {
        let vars: ::config::Map<String, String> = vars
            .into_iter()
            .filter(|(key, _)| {
                key.split("__").all(|part| {
                    !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                })
            })
            .map(|(key, value)| (Self::normalize(&key), value))
            .collect();
        if vars.is_empty() {
            return Ok(());
        }

        let count = vars.len();
        self.layer("environment", |builder| {
            Ok(builder.add_source(Environment::default().separator("__").source(Some(vars))))
        })?;
        tracing::debug!("Loaded {} environment variables into configuration", count);
        Ok(())
    }

    /// Load a JSON configuration file such as `appsettings.json`
    pub fn load_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ModulithError::Configuration {
            key: path.display().to_string(),
            message: e.to_string(),
        })?;
        self.load_json_str(&raw).map_err(|e| match e {
            ModulithError::Configuration { message, .. } => ModulithError::Configuration {
                key: path.display().to_string(),
                message,
            },
            other => other,
        })?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(())
    }

    pub fn load_json_str(&self, raw: &str) -> Result<()> {
        let document: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ModulithError::Configuration {
                key: "<json>".to_string(),
                message: e.to_string(),
            })?;
        let document = Self::normalize_json(document).to_string();
        self.layer("<json>", |builder| {
            Ok(builder.add_source(File::from_str(&document, FileFormat::Json)))
        })
    }

    /// Object keys lowercased so every source agrees on key case
    fn normalize_json(value: serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(key, child)| (Self::normalize(&key), Self::normalize_json(child)))
                .collect::<serde_json::Map<_, _>>()
                .into(),
            serde_json::Value::Array(items) => {
                items.into_iter().map(Self::normalize_json).collect::<Vec<_>>().into()
            }
            other => other,
        }
    }

    /// Merge one more layer on top of the current configuration
    fn layer<F>(&self, key: &str, add: F) -> Result<()>
    where
        F: FnOnce(ConfigBuilder<DefaultState>) -> std::result::Result<ConfigBuilder<DefaultState>, ConfigError>,
    {
        let mut current = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        let merged = add(Config::builder().add_source(current.clone()))
            .and_then(ConfigBuilder::<DefaultState>::build)
            .map_err(|e| ModulithError::Configuration {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        *current = merged;
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Config> {
        self.layers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn normalize(key: &str) -> String {
        key.to_ascii_lowercase()
    }

    fn segments(key: &str) -> impl Iterator<Item = String> + '_ {
        key.split(SECTION_SEPARATOR).map(Self::normalize)
    }

    /// The merged value under `key`, walking tables and array indices
    fn lookup(&self, key: &str) -> Option<Value> {
        let root = self.read().collect().ok()?;
        let mut segments = Self::segments(key);
        let mut current = root.get(&segments.next()?)?.clone();
        for segment in segments {
            current = match current.kind {
                ValueKind::Table(mut table) => table.remove(&segment)?,
                ValueKind::Array(mut items) => {
                    let index = segment.parse::<usize>().ok()?;
                    if index >= items.len() {
                        return None;
                    }
                    items.swap_remove(index)
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// A scalar value as a string; `None` for missing keys, tables and arrays
    pub fn get(&self, key: &str) -> Option<String> {
        let value = self.lookup(key)?;
        match value.kind {
            ValueKind::Table(_) | ValueKind::Array(_) => None,
            ValueKind::Nil => Some(String::new()),
            _ => value.into_string().ok(),
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = Self::segments(key).collect::<Vec<_>>().join(".");
        self.layer(key, |builder| builder.set_override(path, value))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Parse a value with [`FromStr`]; `Ok(None)` when the key is absent
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| ModulithError::Configuration {
                    key: key.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get_parsed::<bool>(key)
    }

    /// A list value: either an array (from JSON) or a single value separated
    /// by `,` or `;`. Whichever source wrote the key last decides the shape.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        let Some(value) = self.lookup(key) else {
            return Vec::new();
        };
        match value.kind {
            ValueKind::Array(items) => items
                .into_iter()
                .filter_map(|item| item.into_string().ok())
                .collect(),
            ValueKind::Table(_) => Vec::new(),
            _ => value
                .into_string()
                .map(|raw| {
                    raw.split([',', ';'])
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Copy of every entry under `prefix`, with the prefix stripped
    pub fn section(&self, prefix: &str) -> Result<Configuration> {
        let section = Configuration::new();
        let Some(Value { kind: ValueKind::Table(table), .. }) = self.lookup(prefix) else {
            return Ok(section);
        };
        section.layer(prefix, |mut builder| {
            for (key, value) in table {
                builder = builder.set_override(key, value)?;
            }
            Ok(builder)
        })?;
        Ok(section)
    }

    /// Number of leaf values; an array counts as one
    pub fn len(&self) -> usize {
        fn leaves(value: &Value) -> usize {
            match &value.kind {
                ValueKind::Table(table) => table.values().map(leaves).sum(),
                _ => 1,
            }
        }
        self.read()
            .collect()
            .map(|root| root.values().map(leaves).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_sections_are_addressable() {
        let configuration = Configuration::new();
        configuration
            .load_json_str(
                r#"{
                    "App": { "Name": "demo", "Port": 8080 },
                    "PlugIns": { "Directories": ["/opt/a", "/opt/b"], "Strict": true }
                }"#,
            )
            .unwrap();

        assert_eq!(configuration.get("App:Name").as_deref(), Some("demo"));
        assert_eq!(configuration.get_parsed::<u16>("app:port").unwrap(), Some(8080));
        assert_eq!(configuration.get_bool("PlugIns:Strict").unwrap(), Some(true));
        assert_eq!(
            configuration.get_list("PlugIns:Directories"),
            vec!["/opt/a", "/opt/b"]
        );
        assert_eq!(configuration.get("PlugIns:Directories:1").as_deref(), Some("/opt/b"));
        assert!(configuration.get("PlugIns").is_none());
        assert!(configuration.contains("plugins:strict"));
    }

    #[test]
    fn test_env_vars_use_double_underscore_sections() {
        let configuration = Configuration::new();
        configuration
            .add_env_vars([
                ("PlugIns__Directories".to_string(), "/a; /b ,/c".to_string()),
                ("PlugIns__Recursive".to_string(), "yes".to_string()),
            ])
            .unwrap();

        assert_eq!(configuration.get_list("PlugIns:Directories"), vec!["/a", "/b", "/c"]);
        assert!(matches!(
            configuration.get_bool("PlugIns:Recursive"),
            Err(ModulithError::Configuration { .. })
        ));
    }

    #[test]
    fn test_section_strips_prefix() {
        let configuration = Configuration::new();
        configuration.set("Jwt:MinLength", "16").unwrap();
        configuration.set("Jwt:Issuer", "me").unwrap();
        configuration.set("Other", "x").unwrap();

        let jwt = configuration.section("Jwt").unwrap();
        assert_eq!(jwt.len(), 2);
        assert_eq!(jwt.get_parsed::<usize>("MinLength").unwrap(), Some(16));
        assert!(jwt.get("Other").is_none());
        assert!(configuration.section("Missing").unwrap().is_empty());
    }

    #[test]
    fn test_later_sources_override() {
        let configuration = Configuration::new();
        configuration.load_json_str(r#"{"Mode":"file"}"#).unwrap();
        configuration
            .add_env_vars([("Mode".to_string(), "env".to_string())])
            .unwrap();
        assert_eq!(configuration.get("mode").as_deref(), Some("env"));

        configuration.set("MODE", "explicit").unwrap();
        configuration.load_json_str(r#"{"mode":"reloaded"}"#).unwrap();
        assert_eq!(configuration.get("Mode").as_deref(), Some("reloaded"));
    }

    #[test]
    fn test_flat_value_replaces_earlier_array() {
        let configuration = Configuration::new();
        configuration
            .load_json_str(r#"{"PlugIns":{"Directories":["/from/json"],"Strict":true}}"#)
            .unwrap();
        configuration
            .add_env_vars([("PlugIns__Directories".to_string(), "/from/env".to_string())])
            .unwrap();

        assert_eq!(configuration.get_list("PlugIns:Directories"), vec!["/from/env"]);
        // Sibling keys from the earlier layer survive the merge
        assert_eq!(configuration.get_bool("PlugIns:Strict").unwrap(), Some(true));

        configuration
            .load_json_str(r#"{"PlugIns":{"Directories":["/x","/y"]}}"#)
            .unwrap();
        assert_eq!(configuration.get_list("PlugIns:Directories"), vec!["/x", "/y"]);
    }

    #[test]
    fn test_clones_share_layers() {
        let configuration = Configuration::new();
        let shared = configuration.clone();
        shared.set("Feature:Enabled", "true").unwrap();
        assert_eq!(configuration.get_bool("Feature:Enabled").unwrap(), Some(true));
    }

    #[test]
    fn test_malformed_json_is_a_configuration_error() {
        let configuration = Configuration::new();
        assert!(matches!(
            configuration.load_json_str("{ nope"),
            Err(ModulithError::Configuration { .. })
        ));
        assert!(configuration.is_empty());
    }
}
