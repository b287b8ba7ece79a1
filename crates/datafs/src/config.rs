//! Store configuration.
//!
//! A store can be described in a small TOML file instead of being built in
//! code:
//!
//! ```toml
//! backend = "local"
//! root = "/srv/data"
//! strict = true
//! ```
//!
//! `backend` defaults to `"local"` and `strict` to `false`.  [`open_store`]
//! turns a parsed [`StoreConfig`] into a ready-to-use [`DataFs`].

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    datafs::DataFs,
    error::{DataFsError, Result},
    local::LocalFs,
};

fn default_backend() -> String {
    "local".to_string()
}

/// Configuration of a single store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Backend kind.  Only `"local"` is recognized.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Root of the store.
    pub root: PathBuf,

    /// Whether the store validates names and metadata keys.
    #[serde(default)]
    pub strict: bool,
}

impl StoreConfig {
    /// A local store configuration for `root`.
    pub fn local(root: impl Into<PathBuf>, strict: bool) -> Self {
        Self {
            backend: default_backend(),
            root: root.into(),
            strict,
        }
    }

    /// Parse a configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns [`DataFsError::Config`] if the TOML content is invalid.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DataFsError::Config(e.to_string()))
    }

    /// Read and parse a configuration file.
    ///
    /// A relative `root` is interpreted relative to the directory containing
    /// the file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DataFsError::Config(format!("reading {}: {e}", path.display())))?;
        let mut config = Self::from_toml(&content)?;

        if config.root.is_relative() {
            if let Some(dir) = path.parent() {
                config.root = dir.join(&config.root);
            }
        }
        Ok(config)
    }
}

/// Build the store described by `config`.
///
/// # Errors
///
/// Returns [`DataFsError::Config`] for an unknown backend, or whatever the
/// backend's constructor reports for a bad root.
pub fn open_store(config: &StoreConfig) -> Result<DataFs> {
    match config.backend.as_str() {
        "local" => LocalFs::open_store(&config.root, config.strict),
        other => Err(DataFsError::Config(format!("unknown backend {other:?}"))),
    }
}
