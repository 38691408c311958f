//! Configuration
//!
//! Reads `~/.spacedefs/spacedefs.json` (or an explicit file). Every field is
//! optional:
//!
//! ```json
//! {
//!   "root": "~/projects/space",
//!   "reserved_prefix": "_",
//!   "loader": "source",
//!   "load_defs": true,
//!   "watch_debounce_ms": 200
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::builtins::Builtins;
use crate::common::paths::{default_config_path, default_space_dir, resolve_path};
use crate::common::ConfigError;
use crate::space::{SpaceWalker, DEFAULT_RESERVED_PREFIX};
use crate::unit::{DylibLoader, SourceLoader, UnitLoader};

/// Which unit format the space uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    /// JSON unit sources
    #[default]
    Source,
    /// Compiled dynamic libraries
    Dylib,
}

impl FromStr for LoaderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(LoaderKind::Source),
            "dylib" => Ok(LoaderKind::Dylib),
            other => Err(format!("unknown loader: {} (expected source or dylib)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Space root; `~/` is expanded, relative paths are taken from the
    /// working directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    pub reserved_prefix: String,
    pub loader: LoaderKind,
    pub load_defs: bool,
    pub watch_debounce_ms: u64,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            reserved_prefix: DEFAULT_RESERVED_PREFIX.to_string(),
            loader: LoaderKind::Source,
            load_defs: true,
            watch_debounce_ms: 200,
        }
    }
}

impl SpaceConfig {
    /// Read a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read the default config file if it exists, otherwise use defaults
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) if path.exists() => {
                debug!("Loading config from {:?}", path);
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Resolved space root
    pub fn root(&self) -> Result<PathBuf, ConfigError> {
        match &self.root {
            Some(raw) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                Ok(resolve_path(raw, &cwd))
            }
            None => default_space_dir().ok_or(ConfigError::NoHomeDir),
        }
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    /// Loader for the configured unit format
    pub fn loader(&self, builtins: Builtins) -> Arc<dyn UnitLoader> {
        match self.loader {
            LoaderKind::Source => Arc::new(SourceLoader::new(builtins)),
            LoaderKind::Dylib => Arc::new(DylibLoader::new()),
        }
    }

    /// Walker for the configured loader and reserved prefix
    pub fn walker(&self, builtins: Builtins) -> SpaceWalker {
        SpaceWalker::new(self.loader(builtins)).with_reserved_prefix(self.reserved_prefix.clone())
    }
}
