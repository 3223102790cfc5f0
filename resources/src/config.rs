//! TOML configuration for the cache and its backends.
//!
//! ```toml
//! [cache]
//! sync_conflict = "wait"
//!
//! [[backend]]
//! prefix = "file"
//! type = "filesystem"
//! path = "./assets"
//! default = true
//!
//! [[backend]]
//! prefix = "bundle"
//! type = "archive"
//! path = "./bundles"
//! ```

use std::path::{Path, PathBuf};
use std::rc::Rc;

use redlilium_vfs::FileSystemProvider;
use serde::Deserialize;
use thiserror::Error;

use crate::Resources;
use crate::archive::{ArchiveBackend, DEFAULT_MANIFEST};
use crate::backend::Backend;
use crate::backends::{MemoryBackend, VfsBackend};
use crate::path::{DEFAULT_PREFIX, is_valid_prefix};
use crate::registry::ProviderRegistry;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse resource configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("backend `{prefix}`: {reason}")]
    Invalid { prefix: String, reason: String },
}

/// What a synchronous load does when the key is already loading
/// asynchronously.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncConflictPolicy {
    /// Drive the scheduler until the pending load resolves.
    #[default]
    Wait,
    /// Fail with `LoadError::Busy`.
    Busy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub sync_conflict: SyncConflictPolicy,
}

/// Top-level configuration, usually read from `resources.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourcesConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default, rename = "backend")]
    pub backends: Vec<BackendConfig>,
}

/// One `[[backend]]` entry.
///
/// `type` selects the backend: `"memory"` (default), `"filesystem"`,
/// `"http"` or `"archive"`. Filesystem and archive backends read from
/// `path`; HTTP reads from `url`.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub prefix: String,
    #[serde(default = "default_backend_type")]
    pub r#type: String,
    pub path: Option<String>,
    pub url: Option<String>,
    /// Manifest file of an archive backend, relative to `path`.
    pub manifest: Option<String>,
    /// HTTP request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Also serve paths without a prefix.
    #[serde(default)]
    pub default: bool,
}

fn default_backend_type() -> String {
    "memory".into()
}

impl ResourcesConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads `path`, falling back to a filesystem backend over `./assets`
    /// as the default when the file is missing or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => {
                log::info!(
                    "Loaded resource config {} ({} backends)",
                    path.display(),
                    config.backends.len()
                );
                config
            }
            Err(e) => {
                log::warn!("No resource config ({e}), using defaults");
                Self {
                    cache: CacheConfig::default(),
                    backends: vec![BackendConfig {
                        prefix: "file".into(),
                        r#type: "filesystem".into(),
                        path: Some("./assets".into()),
                        url: None,
                        manifest: None,
                        timeout_secs: None,
                        default: true,
                    }],
                }
            }
        }
    }

    /// Creates a backend for every entry and registers it under its prefix.
    ///
    /// Entries of unknown type are logged and skipped.
    pub fn build_registry(&self) -> Result<ProviderRegistry, ConfigError> {
        let mut registry = ProviderRegistry::new();

        for entry in &self.backends {
            if !is_valid_prefix(&entry.prefix) {
                return Err(entry.invalid("invalid prefix"));
            }
            let Some(backend) = entry.create()? else {
                continue;
            };
            registry.register_shared(&entry.prefix, backend.clone());
            if entry.default && entry.prefix != DEFAULT_PREFIX {
                registry.register_shared(DEFAULT_PREFIX, backend);
            }
        }

        Ok(registry)
    }

    pub fn build(&self) -> Result<Resources, ConfigError> {
        Ok(Resources::with_registry(
            self.build_registry()?,
            self.cache.clone(),
        ))
    }
}

impl BackendConfig {
    fn invalid(&self, reason: &str) -> ConfigError {
        ConfigError::Invalid {
            prefix: self.prefix.clone(),
            reason: reason.to_string(),
        }
    }

    fn require_path(&self) -> Result<&str, ConfigError> {
        self.path
            .as_deref()
            .ok_or_else(|| self.invalid(&format!("`{}` backend needs `path`", self.r#type)))
    }

    fn create(&self) -> Result<Option<Rc<dyn Backend>>, ConfigError> {
        let backend: Rc<dyn Backend> = match self.r#type.as_str() {
            "memory" => Rc::new(MemoryBackend::new()),
            "filesystem" => {
                let root = self.require_path()?;
                log::info!("Resource backend \"{}\" -> filesystem {root:?}", self.prefix);
                Rc::new(VfsBackend::new("filesystem", FileSystemProvider::new(root)))
            }
            "archive" => {
                let root = self.require_path()?;
                let manifest = self.manifest.as_deref().unwrap_or(DEFAULT_MANIFEST);
                log::info!(
                    "Resource backend \"{}\" -> archive {root:?} ({manifest})",
                    self.prefix
                );
                Rc::new(ArchiveBackend::new(FileSystemProvider::new(root), manifest))
            }
            "http" => return self.create_http(),
            other => {
                log::warn!("Unknown backend type \"{other}\" for \"{}\"", self.prefix);
                return Ok(None);
            }
        };
        Ok(Some(backend))
    }

    #[cfg(feature = "http")]
    fn create_http(&self) -> Result<Option<Rc<dyn Backend>>, ConfigError> {
        use redlilium_vfs::{HttpConfig, HttpProvider};

        let url = self
            .url
            .as_deref()
            .ok_or_else(|| self.invalid("`http` backend needs `url`"))?;
        let mut config = HttpConfig::new(url);
        if let Some(secs) = self.timeout_secs {
            config.timeout = std::time::Duration::from_secs(secs);
        }
        log::info!("Resource backend \"{}\" -> http {url}", self.prefix);
        match HttpProvider::new(config) {
            Ok(provider) => Ok(Some(Rc::new(VfsBackend::new("http", provider)))),
            Err(e) => {
                log::error!("Failed to start HTTP backend \"{}\": {e}", self.prefix);
                Ok(None)
            }
        }
    }

    #[cfg(not(feature = "http"))]
    fn create_http(&self) -> Result<Option<Rc<dyn Backend>>, ConfigError> {
        log::warn!(
            "Backend \"{}\" needs the `http` feature of redlilium-resources; skipping",
            self.prefix
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = ResourcesConfig::from_toml_str(
            r#"
            [cache]
            sync_conflict = "busy"

            [[backend]]
            prefix = "mem"

            [[backend]]
            prefix = "bundle"
            type = "archive"
            path = "./bundles"
            manifest = "index.toml"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.sync_conflict, SyncConflictPolicy::Busy);
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].r#type, "memory");
        assert_eq!(config.backends[1].manifest.as_deref(), Some("index.toml"));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = ResourcesConfig::from_toml_str("").unwrap();
        assert_eq!(config.cache.sync_conflict, SyncConflictPolicy::Wait);
        assert!(config.backends.is_empty());
    }

    #[test]
    fn bad_policy_is_parse_error() {
        let err = ResourcesConfig::from_toml_str("[cache]\nsync_conflict = \"later\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn filesystem_without_path_is_invalid() {
        let config = ResourcesConfig::from_toml_str(
            r#"
            [[backend]]
            prefix = "file"
            type = "filesystem"
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.build_registry(),
            Err(ConfigError::Invalid { prefix, .. }) if prefix == "file"
        ));
    }

    #[test]
    fn unknown_type_is_skipped() {
        let config = ResourcesConfig::from_toml_str(
            r#"
            [[backend]]
            prefix = "odd"
            type = "carrier-pigeon"
            "#,
        )
        .unwrap();
        let registry = config.build_registry().unwrap();
        assert!(!registry.contains("odd"));
    }

    #[test]
    fn default_flag_registers_under_default_prefix() {
        let config = ResourcesConfig::from_toml_str(
            r#"
            [[backend]]
            prefix = "file"
            type = "filesystem"
            path = "."
            default = true
            "#,
        )
        .unwrap();
        let registry = config.build_registry().unwrap();
        assert_eq!(registry.resolve("").unwrap().name(), "filesystem");
        assert_eq!(registry.backends().len(), 1);
    }

    #[test]
    fn missing_file_falls_back() {
        let config = ResourcesConfig::load_or_default(Path::new("/definitely/not/here.toml"));
        assert_eq!(config.backends.len(), 1);
        assert!(config.backends[0].default);
    }
}
