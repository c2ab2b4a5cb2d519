//! Logbook configuration (`config.toml`).
//!
//! Lives in the logbook root directory. Every field has a default, and a
//! missing file means "all defaults". Relative paths are resolved against
//! the root directory.
//!
//! ```toml
//! [identity]
//! username = "b5"
//! key_file = "identity.key"
//!
//! [store]
//! kind = "fs"
//! path = "store"
//!
//! [cache]
//! path = "dscache.json"
//! persist = true
//! ```

use std::path::{Path, PathBuf};
use std::{fmt, fs, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::types::Username;

/// File name of the config inside a logbook root.
pub const CONFIG_FILE: &str = "config.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level logbook configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogbookConfig {
    /// Local identity settings.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Content store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// dscache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

// ---------------------------------------------------------------------------
// IdentityConfig
// ---------------------------------------------------------------------------

/// Who this logbook acts as.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// Username of the local identity. Required to open a book.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<Username>,

    /// File holding the hex-encoded private key (default: `identity.key`).
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            username: None,
            key_file: default_key_file(),
        }
    }
}

fn default_key_file() -> PathBuf {
    PathBuf::from("identity.key")
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

/// Where oplogs and the root index are stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend.
    #[serde(default)]
    pub kind: StoreKind,

    /// Directory for the filesystem store (default: `store`).
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("store")
}

/// The content store backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    /// sha256-addressed files on disk.
    #[default]
    Fs,
    /// In-process memory; nothing survives the process.
    Memory,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fs => write!(f, "fs"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

/// dscache persistence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Cache file (default: `dscache.json`).
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    /// Save the cache after every mutation and load it on open
    /// (default: `true`).
    #[serde(default = "default_persist")]
    pub persist: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            persist: default_persist(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("dscache.json")
}

const fn default_persist() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading or rendering a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The file is not valid TOML or has unknown or invalid fields.
    #[error("{}{reason}", origin(path.as_deref(), *line))]
    Parse {
        path: Option<PathBuf>,
        line: Option<usize>,
        reason: String,
    },
    /// The config could not be rendered.
    #[error("rendering config: {0}")]
    Render(#[from] toml::ser::Error),
}

fn origin(path: Option<&Path>, line: Option<usize>) -> String {
    match (path, line) {
        (Some(p), Some(l)) => format!("{}:{l}: ", p.display()),
        (Some(p), None) => format!("{}: ", p.display()),
        (None, Some(l)) => format!("line {l}: "),
        (None, None) => "config: ".to_owned(),
    }
}

impl LogbookConfig {
    /// Load `config.toml` from a logbook root directory.
    ///
    /// # Errors
    /// See [`LogbookConfig::load`].
    pub fn load_from_root(root: &Path) -> Result<Self, ConfigError> {
        Self::load(&root.join(CONFIG_FILE))
    }

    /// Load configuration from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    /// [`ConfigError::Read`] if the file exists but cannot be read,
    /// [`ConfigError::Parse`] (carrying `path`) if it does not parse.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        Self::parse(&text).map_err(|e| match e {
            ConfigError::Parse { line, reason, .. } => ConfigError::Parse {
                path: Some(path.to_owned()),
                line,
                reason,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] with the 1-based line of the offending span
    /// when the TOML parser reports one.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: None,
            line: e
                .span()
                .map(|span| text[..span.start].matches('\n').count() + 1),
            reason: e.message().to_owned(),
        })
    }

    /// Render as TOML, for writing a fresh config file.
    ///
    /// # Errors
    /// Returns `ConfigError` if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Absolute path of the key file under `root`.
    #[must_use]
    pub fn key_file(&self, root: &Path) -> PathBuf {
        root.join(&self.identity.key_file)
    }

    /// Absolute path of the filesystem store under `root`.
    #[must_use]
    pub fn store_path(&self, root: &Path) -> PathBuf {
        root.join(&self.store.path)
    }

    /// Absolute path of the cache file under `root`, if persistence is on.
    #[must_use]
    pub fn cache_path(&self, root: &Path) -> Option<PathBuf> {
        self.cache.persist.then(|| root.join(&self.cache.path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
