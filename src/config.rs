//! Configuration management for Ferry Server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default upload ceiling: 2GB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub account: AccountConfig,
    pub transfer: TransferConfig,
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Identity the login code is dispatched to
    pub phone: String,
    /// Session artifact written by the platform client once authorized
    pub session_path: PathBuf,
    /// Base64 session artifact restored at startup when no session file exists
    pub session_base64: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    pub staging_dir: PathBuf,
    /// Destination used when an upload names none
    pub default_channel: Option<String>,
    /// Per-transfer deadline for the chunked primitives (None = no deadline)
    pub timeout_secs: Option<u64>,
    pub max_upload_bytes: usize,
}

impl TransferConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    /// Root directory of the local platform backend
    pub root: PathBuf,
    /// Second-factor secret; accounts without one sign in with the code alone
    pub password: Option<String>,
    /// Fixed login code instead of a generated one
    pub login_code: Option<String>,
    /// Containers created at startup
    pub containers: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8001,
            },
            account: AccountConfig {
                phone: String::new(),
                session_path: PathBuf::from("ferry.session"),
                session_base64: None,
            },
            transfer: TransferConfig {
                staging_dir: default_staging_dir(),
                default_channel: None,
                timeout_secs: None,
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            platform: PlatformConfig {
                root: PathBuf::from("./platform-data"),
                password: None,
                login_code: None,
                containers: Vec::new(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: get("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_or("SERVER_PORT", get("SERVER_PORT"), defaults.server.port)?,
            },
            account: AccountConfig {
                phone: get("ACCOUNT_PHONE").ok_or(ConfigError::Missing("ACCOUNT_PHONE"))?,
                session_path: get("SESSION_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.account.session_path),
                session_base64: get("SESSION_BASE64"),
            },
            transfer: TransferConfig {
                staging_dir: get("STAGING_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.transfer.staging_dir),
                default_channel: get("STORAGE_CHANNEL_ID"),
                timeout_secs: match get("TRANSFER_TIMEOUT_SECS") {
                    Some(raw) => Some(parse("TRANSFER_TIMEOUT_SECS", raw)?).filter(|secs| *secs > 0),
                    None => None,
                },
                max_upload_bytes: parse_or(
                    "MAX_UPLOAD_BYTES",
                    get("MAX_UPLOAD_BYTES"),
                    defaults.transfer.max_upload_bytes,
                )?,
            },
            platform: PlatformConfig {
                root: get("PLATFORM_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.platform.root),
                password: get("PLATFORM_PASSWORD"),
                login_code: get("PLATFORM_LOGIN_CODE"),
                containers: get("PLATFORM_CONTAINERS")
                    .map(|raw| {
                        raw.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
        })
    }
}

fn default_staging_dir() -> PathBuf {
    env::temp_dir().join("ferry-staging")
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(raw) => parse(key, raw),
        None => Ok(default),
    }
}
