use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::scheduler::DEFAULT_CONCURRENCY;

/// Per-loader options (`[loaders.<id>]` in config.toml).
///
/// Keys also accept the camelCase spelling used by manifest servers and
/// older host configs (`serverRoot`, `cacheBuster`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Base URL files are fetched from. Empty means "use the host's server".
    #[serde(alias = "serverRoot")]
    pub server_root: String,
    /// Manifest filename relative to `server_root`.
    pub manifest: String,
    /// Explicit manifest URL; overrides `server_root` + `manifest`.
    #[serde(alias = "manifestUrl", skip_serializing_if = "Option::is_none")]
    pub manifest_url: Option<String>,
    /// Append a millisecond timestamp to manifest requests.
    #[serde(alias = "cacheBuster")]
    pub cache_buster: bool,
    /// Timeout for the manifest request, in milliseconds.
    #[serde(alias = "checkTimeout")]
    pub check_timeout_ms: u64,
    /// Maximum simultaneous file transfers.
    pub concurrency: usize,
    /// Retry delays in milliseconds; one entry per extra attempt.
    pub retry: Vec<u64>,
    /// Cache directory inside the storage root. Defaults to `<id>/`.
    #[serde(alias = "localRoot", skip_serializing_if = "Option::is_none")]
    pub local_root: Option<String>,
    /// Let a manifest's `serverRoot` retarget file downloads.
    #[serde(alias = "allowServerRootFromManifest")]
    pub allow_server_root_from_manifest: bool,
    /// Directory of files shipped with the host; same-version files are copied from here.
    #[serde(alias = "bundleRoot", skip_serializing_if = "Option::is_none")]
    pub bundle_root: Option<PathBuf>,
    /// Manifest describing `bundle_root`, relative to it.
    #[serde(alias = "bundleManifest", skip_serializing_if = "Option::is_none")]
    pub bundle_manifest: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            server_root: String::new(),
            manifest: "manifest.json".to_string(),
            manifest_url: None,
            cache_buster: false,
            check_timeout_ms: 60_000,
            concurrency: DEFAULT_CONCURRENCY,
            retry: Vec::new(),
            local_root: None,
            allow_server_root_from_manifest: false,
            bundle_root: None,
            bundle_manifest: None,
        }
    }
}

impl LoaderConfig {
    /// `server_root` with a trailing `/` (empty stays empty).
    pub fn normalized_server_root(&self) -> String {
        let root = self.server_root.trim();
        if root.is_empty() || root.ends_with('/') {
            root.to_string()
        } else {
            format!("{root}/")
        }
    }

    /// Where the remote manifest is fetched from.
    pub fn manifest_url(&self) -> String {
        match &self.manifest_url {
            Some(url) => url.clone(),
            None => format!("{}{}", self.normalized_server_root(), self.manifest),
        }
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry.iter().copied().map(Duration::from_millis).collect()
    }

    /// Concurrency, never below one.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    pub fn local_root(&self, id: &str) -> String {
        self.local_root.clone().unwrap_or_else(|| format!("{id}/"))
    }

    /// Check what a loader needs before it can run.
    pub fn validate(&self, id: &str) -> Result<(), ConfigError> {
        if id.trim().is_empty() {
            return Err(ConfigError::MissingId);
        }
        if self.server_root.trim().is_empty() {
            return Err(ConfigError::MissingServerRoot(id.to_string()));
        }
        Ok(())
    }
}

/// Global configuration loaded from `~/.config/freshen/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshenConfig {
    /// Server used when no override is set, and the one rolled back to after a failed cycle.
    pub default_server: String,
    /// Developer override of `default_server`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Storage root for loader caches. Defaults to the XDG data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Loaders in run order, keyed by identity.
    #[serde(default)]
    pub loaders: BTreeMap<String, LoaderConfig>,
}

impl Default for FreshenConfig {
    fn default() -> Self {
        let mut loaders = BTreeMap::new();
        loaders.insert(
            "source".to_string(),
            LoaderConfig {
                local_root: Some("source/".to_string()),
                cache_buster: true,
                ..LoaderConfig::default()
            },
        );
        loaders.insert(
            "ui".to_string(),
            LoaderConfig {
                local_root: Some("ui/".to_string()),
                cache_buster: true,
                manifest: "assetMap.json".to_string(),
                ..LoaderConfig::default()
            },
        );
        Self {
            default_server: "http://localhost:8080/".to_string(),
            server: None,
            cache_dir: None,
            loaders,
        }
    }
}

impl FreshenConfig {
    /// Options for loader `id` with an empty `server_root` filled in from `server`.
    pub fn loader(&self, id: &str, server: &str) -> Option<LoaderConfig> {
        let mut cfg = self.loaders.get(id)?.clone();
        if cfg.server_root.trim().is_empty() {
            cfg.server_root = server.to_string();
        }
        Some(cfg)
    }

    /// Cache storage root: `cache_dir` or `~/.local/share/freshen/cache`.
    pub fn cache_root(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("freshen")?;
        Ok(xdg_dirs.get_data_home().join("cache"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("freshen")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<FreshenConfig> {
    load_or_init_at(&config_path()?)
}

pub fn load_or_init_at(path: &Path) -> Result<FreshenConfig> {
    if !path.exists() {
        let default_cfg = FreshenConfig::default();
        save_at(path, &default_cfg)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FreshenConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

pub fn save_at(path: &Path, cfg: &FreshenConfig) -> Result<()> {
    let toml = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_loader_values() {
        let cfg = LoaderConfig::default();
        assert_eq!(cfg.manifest, "manifest.json");
        assert_eq!(cfg.check_timeout_ms, 60_000);
        assert_eq!(cfg.concurrency, 3);
        assert!(cfg.retry.is_empty());
        assert!(!cfg.cache_buster);
        assert_eq!(cfg.local_root("source"), "source/");
    }

    #[test]
    fn manifest_url_joins_server_root() {
        let cfg = LoaderConfig {
            server_root: "https://cdn.example.com/app".to_string(),
            ..LoaderConfig::default()
        };
        assert_eq!(cfg.manifest_url(), "https://cdn.example.com/app/manifest.json");

        let explicit = LoaderConfig {
            manifest_url: Some("https://other/m.json".to_string()),
            ..cfg
        };
        assert_eq!(explicit.manifest_url(), "https://other/m.json");
    }

    #[test]
    fn validate_requires_id_and_server_root() {
        let cfg = LoaderConfig::default();
        assert!(matches!(cfg.validate(""), Err(ConfigError::MissingId)));
        assert!(matches!(cfg.validate("ui"), Err(ConfigError::MissingServerRoot(_))));
        let ok = LoaderConfig {
            server_root: "http://x/".to_string(),
            ..cfg
        };
        assert!(ok.validate("ui").is_ok());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = FreshenConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: FreshenConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.loaders["ui"].manifest, "assetMap.json");
    }

    #[test]
    fn config_toml_camel_case_aliases() {
        let toml = r#"
            default_server = "https://prod.example.com/"

            [loaders.source]
            serverRoot = "https://cdn.example.com/src/"
            cacheBuster = true
            checkTimeout = 5000
            retry = [0, 100]
            localRoot = "js/"
            allowServerRootFromManifest = true
        "#;
        let cfg: FreshenConfig = toml::from_str(toml).unwrap();
        let src = &cfg.loaders["source"];
        assert_eq!(src.server_root, "https://cdn.example.com/src/");
        assert!(src.cache_buster);
        assert_eq!(src.check_timeout(), Duration::from_millis(5000));
        assert_eq!(src.retry_delays(), vec![Duration::ZERO, Duration::from_millis(100)]);
        assert_eq!(src.local_root("source"), "js/");
        assert!(src.allow_server_root_from_manifest);
        assert_eq!(src.manifest, "manifest.json");
    }

    #[test]
    fn loader_inherits_host_server() {
        let cfg = FreshenConfig::default();
        let ui = cfg.loader("ui", "https://dev.example.com").unwrap();
        assert_eq!(ui.manifest_url(), "https://dev.example.com/assetMap.json");
        assert!(cfg.loader("nope", "x").is_none());
    }

    #[test]
    fn load_or_init_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("freshen/config.toml");
        let cfg = load_or_init_at(&path).unwrap();
        assert!(path.exists());
        assert_eq!(load_or_init_at(&path).unwrap(), cfg);
    }
}
