//! Configuration system for mixlink.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $MIXLINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/mixlink/config.toml
//!   3. ~/.config/mixlink/config.toml

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::crypto::{KeyError, Keypair};
use crate::payload::DEFAULT_MAX_PAYLOAD_LEN;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MixlinkConfig {
    pub account: AccountConfig,
    pub session: SessionSettings,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Local user name registered with the provider.
    pub user: String,
    /// Provider the account is registered with.
    pub provider: String,
    /// Session link key. Auto-generated on first run.
    pub link_key_path: PathBuf,
    /// Long-term identity key passed to `connect`. Auto-generated on first run.
    pub identity_key_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Inbound messages held before new arrivals are dropped.
    pub ingress_capacity: usize,
    /// Largest payload accepted by send/send_unreliable.
    pub max_payload_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Refuses every call with "not implemented".
    #[default]
    Stub,
    /// Content-addressed blocks on local disk.
    Disk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub block_dir: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            provider: String::new(),
            link_key_path: config_dir().join("link.key"),
            identity_key_path: config_dir().join("identity.key"),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ingress_capacity: 100,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Stub,
            block_dir: data_dir().join("blocks"),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("mixlink")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("mixlink")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("account.{0} is not set")]
    MissingAccount(&'static str),
    #[error("link key: {0}")]
    LinkKey(#[from] KeyError),
    #[error("invalid value for {var}: {value:?}")]
    InvalidOverride { var: &'static str, value: String },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MixlinkConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::file_path())
    }

    /// Load from an explicit path, still applying env overrides.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            MixlinkConfig::default()
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MIXLINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_at(&path)?;
        Ok(path)
    }

    /// Write the default config to `path` unless a file is already there.
    pub fn write_default_at(path: &Path) -> Result<(), ConfigError> {
        let path = path.to_path_buf();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = MixlinkConfig::default().to_toml()?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)
    }

    /// Build the runtime session config, loading (or creating) the link key.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        if self.account.user.is_empty() {
            return Err(ConfigError::MissingAccount("user"));
        }
        if self.account.provider.is_empty() {
            return Err(ConfigError::MissingAccount("provider"));
        }
        let link_key = Keypair::load_or_generate(&self.account.link_key_path)?;
        Ok(SessionConfig {
            user: self.account.user.clone(),
            provider: self.account.provider.clone(),
            link_key: Arc::new(link_key),
            ingress_capacity: self.session.ingress_capacity,
            max_payload_len: self.session.max_payload_len,
        })
    }

    /// Apply MIXLINK_* overrides, reading each variable through `var`.
    /// A value that does not parse is an error rather than silently skipped.
    fn apply_overrides(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = var("MIXLINK_ACCOUNT__USER") {
            self.account.user = v;
        }
        if let Some(v) = var("MIXLINK_ACCOUNT__PROVIDER") {
            self.account.provider = v;
        }
        if let Some(v) = var("MIXLINK_SESSION__INGRESS_CAPACITY") {
            self.session.ingress_capacity =
                v.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                    var: "MIXLINK_SESSION__INGRESS_CAPACITY",
                    value: v.clone(),
                })?;
        }
        if let Some(v) = var("MIXLINK_STORAGE__BACKEND") {
            self.storage.backend = match v.as_str() {
                "disk" => StorageBackend::Disk,
                "stub" => StorageBackend::Stub,
                _ => {
                    return Err(ConfigError::InvalidOverride {
                        var: "MIXLINK_STORAGE__BACKEND",
                        value: v,
                    })
                }
            };
        }
        if let Some(v) = var("MIXLINK_STORAGE__BLOCK_DIR") {
            self.storage.block_dir = PathBuf::from(v);
        }
        Ok(())
    }
}

// ── Runtime session config ────────────────────────────────────────────────────

/// Everything a session needs at construction time.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user: String,
    pub provider: String,
    /// Session-scoped link key. Opaque to the session; handed to the transport.
    pub link_key: Arc<Keypair>,
    pub ingress_capacity: usize,
    pub max_payload_len: usize,
}

impl SessionConfig {
    /// Config with default limits and a freshly generated link key.
    pub fn new(user: impl Into<String>, provider: impl Into<String>) -> Self {
        let defaults = SessionSettings::default();
        Self {
            user: user.into(),
            provider: provider.into(),
            link_key: Arc::new(Keypair::generate()),
            ingress_capacity: defaults.ingress_capacity,
            max_payload_len: defaults.max_payload_len,
        }
    }

    pub fn with_ingress_capacity(mut self, capacity: usize) -> Self {
        self.ingress_capacity = capacity;
        self
    }

    pub fn with_max_payload_len(mut self, max: usize) -> Self {
        self.max_payload_len = max;
        self
    }

    /// `user@provider`, the name sessions log under.
    pub fn label(&self) -> String {
        format!("{}@{}", self.user, self.provider)
    }
}
