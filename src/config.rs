use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level prismctl configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrismConfig {
    pub backends: BackendsConfig,
    pub paths: PathsConfig,
    pub software_effects: SoftwareEffectsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Backend ids to load, in registration order.
    pub enabled: Vec<String>,
    /// How long a backend's init() may block before it is given up on.
    pub init_timeout_secs: u64,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            enabled: crate::backend::KNOWN_BACKENDS
                .iter()
                .map(|id| id.to_string())
                .collect(),
            init_timeout_secs: 10,
        }
    }
}

impl BackendsConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Saved settings and last-applied hardware state.
    pub data_dir: Option<PathBuf>,
    /// Software effect state and helper PID files.
    pub runtime_dir: Option<PathBuf>,
}

impl PathsConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("prismctl")
        })
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.runtime_dir.clone().unwrap_or_else(|| {
            dirs::runtime_dir()
                .or_else(dirs::cache_dir)
                .unwrap_or_else(std::env::temp_dir)
                .join("prismctl")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftwareEffectsConfig {
    /// Program that plays software effects. Started with
    /// `--run-fx <path> --device-serial <serial>`.
    pub helper: String,
}

impl Default for SoftwareEffectsConfig {
    fn default() -> Self {
        Self {
            helper: "prismctl-helper".to_string(),
        }
    }
}

const SYSTEM_CONFIG: &str = "/etc/prismctl/config.toml";

/// Config layers, lowest precedence first.
fn layer_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG)];
    paths.extend(dirs::config_dir().map(|d| d.join("prismctl").join("config.toml")));
    paths
}

/// A layer that is absent is skipped quietly; one that does not parse is
/// skipped with a warning.
fn read_layer(path: &Path) -> Option<toml::Value> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content)
        .inspect_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config")
        })
        .ok()
}

/// Overlay tables key by key; any other overlay value replaces the base.
fn merge_values(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut merged), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                let value = match merged.remove(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                merged.insert(key, value);
            }
            toml::Value::Table(merged)
        }
        (_, overlay) => overlay,
    }
}

fn into_config(value: toml::Value, origin: &str) -> PrismConfig {
    value.try_into().unwrap_or_else(|e| {
        tracing::warn!(origin, error = %e, "config has the wrong shape, using defaults");
        PrismConfig::default()
    })
}

fn load_from_path(path: &Path) -> PrismConfig {
    match read_layer(path) {
        Some(value) => into_config(value, &path.display().to_string()),
        None => {
            tracing::warn!(path = %path.display(), "config not usable, using defaults");
            PrismConfig::default()
        }
    }
}

/// The system file overlaid with the user's. `override_path` replaces both.
pub fn load(override_path: Option<&PathBuf>) -> PrismConfig {
    if let Some(path) = override_path {
        return load_from_path(path);
    }
    layer_paths()
        .iter()
        .filter_map(|p| read_layer(p))
        .reduce(merge_values)
        .map(|value| into_config(value, "merged layers"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PrismConfig::default();
        assert_eq!(config.backends.enabled, vec!["openrazer", "undervolt"]);
        assert_eq!(config.backends.init_timeout(), Duration::from_secs(10));
        assert_eq!(config.software_effects.helper, "prismctl-helper");
        assert!(config.paths.data_dir.is_none());
        assert!(config.paths.data_dir().ends_with("prismctl"));
    }

    #[test]
    fn test_merge_values_tables() {
        let base: toml::Value = toml::from_str(
            r#"
            [backends]
            enabled = ["openrazer", "undervolt"]
            init_timeout_secs = 10
            [software_effects]
            helper = "/usr/bin/prismctl-helper"
        "#,
        )
        .unwrap();

        let overlay: toml::Value = toml::from_str(
            r#"
            [backends]
            init_timeout_secs = 3
        "#,
        )
        .unwrap();

        let merged = merge_values(base, overlay);
        let table = merged.as_table().unwrap();

        let backends = table["backends"].as_table().unwrap();
        assert_eq!(backends["init_timeout_secs"].as_integer(), Some(3));
        assert_eq!(backends["enabled"].as_array().unwrap().len(), 2);

        let fx = table["software_effects"].as_table().unwrap();
        assert_eq!(fx["helper"].as_str(), Some("/usr/bin/prismctl-helper"));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: PrismConfig = toml::from_str(
            r#"
            [backends]
            enabled = ["undervolt"]
        "#,
        )
        .unwrap();
        assert_eq!(config.backends.enabled, vec!["undervolt"]);
        assert_eq!(config.backends.init_timeout_secs, 10);
        assert_eq!(config.software_effects.helper, "prismctl-helper");
    }

    #[test]
    fn test_paths_override() {
        let config: PrismConfig = toml::from_str(
            r#"
            [paths]
            data_dir = "/tmp/prism-data"
            runtime_dir = "/tmp/prism-run"
        "#,
        )
        .unwrap();
        assert_eq!(config.paths.data_dir(), PathBuf::from("/tmp/prism-data"));
        assert_eq!(config.paths.runtime_dir(), PathBuf::from("/tmp/prism-run"));
    }

    #[test]
    fn test_load_from_path_falls_back_on_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "backends = [[[").unwrap();
        let config = load_from_path(&path);
        assert_eq!(config.backends.init_timeout_secs, 10);

        let config = load_from_path(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.backends.enabled.len(), 2);
    }
}
