//! Application configuration management.
//!
//! Handles loading, saving, and validating turnstile configuration including:
//! - HTTP server binding and CORS origins
//! - Storage location
//! - Access code lifetime and rotation window
//! - Sweeper cadences
//! - Timezone used to compute "today"
//! - The facilities served by this instance and their exit credentials
//!
//! Files are TOML. Loading layers `TURNSTILE__<SECTION>__<KEY>` environment
//! variables over the file, e.g. `TURNSTILE__SERVER__BIND_ADDRESS=0.0.0.0:8080`.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted code lifetime.
pub const MAX_CODE_TTL_SECS: u64 = 24 * 60 * 60;

/// Errors raised while loading, saving, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    ReadError {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration file could not be written.
    #[error("Failed to write {}: {source}", .path.display())]
    WriteError {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The layered sources could not be merged or deserialized.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] ::config::ConfigError),

    /// The configuration could not be serialized to TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field holds an invalid value.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} validation errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Storage settings.
    pub storage: StorageConfig,

    /// Access code lifetime settings.
    pub codes: CodesConfig,

    /// Background sweeper cadences.
    pub sweeper: SweeperConfig,

    /// System-wide settings.
    pub system: SystemConfig,

    /// Facilities served by this instance.
    pub facilities: Vec<FacilityConfig>,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_address: String,

    /// Origins allowed by CORS. Empty allows any origin.
    pub cors_origins: Vec<String>,

    /// Use production logging (JSON files + compact stdout).
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
            ],
            production: false,
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the data files. Platform default when unset.
    pub data_dir: Option<PathBuf>,
}

/// Access code lifetime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodesConfig {
    /// Lifetime of a code value, from issuance or rotation.
    pub ttl_secs: u64,

    /// Codes expiring within this window are rotated by the sweeper.
    pub rotation_window_secs: u64,
}

impl Default for CodesConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            rotation_window_secs: 600,
        }
    }
}

impl CodesConfig {
    /// Code lifetime as a duration.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        secs_to_duration(self.ttl_secs)
    }

    /// Auto-rotation window as a duration.
    #[must_use]
    pub fn rotation_window(&self) -> Duration {
        secs_to_duration(self.rotation_window_secs)
    }
}

/// Background sweeper cadences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Seconds between expiry sweeps.
    pub expire_interval_secs: u64,

    /// Seconds between auto-rotation sweeps.
    pub rotate_interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            expire_interval_secs: 3600,
            rotate_interval_secs: 1800,
        }
    }
}

/// System-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Default IANA timezone for facilities that do not set their own.
    pub timezone: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

/// A facility served by this instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityConfig {
    /// Facility identifier.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Static credential printed at the exit.
    pub exit_credential: String,

    /// IANA timezone overriding `system.timezone`.
    #[serde(default)]
    pub timezone: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file, layering environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or fails validation.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let config: Self = ::config::Config::builder()
            .add_source(::config::File::from(path).format(::config::FileFormat::Toml))
            .add_source(::config::Environment::with_prefix("TURNSTILE").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, falling back to defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be parsed or fails validation.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        match Self::load(path) {
            Err(ConfigError::NotFound(path)) => {
                tracing::warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Save configuration to `path` as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized or written.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Default configuration file location.
    ///
    /// On Linux servers: `/etc/turnstile/config.toml`
    /// Elsewhere: the platform config directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/turnstile/config.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "turnstile").map_or_else(
                || PathBuf::from("turnstile.toml"),
                |dirs| dirs.config_dir().join("config.toml"),
            )
        }
    }

    /// Check every field, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns the single error, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(invalid(
                "server.bind_address",
                format!("'{}' is not a socket address", self.server.bind_address),
            ));
        }

        if self.codes.ttl_secs == 0 || self.codes.ttl_secs > MAX_CODE_TTL_SECS {
            errors.push(invalid(
                "codes.ttl_secs",
                format!("must be between 1 and {MAX_CODE_TTL_SECS}"),
            ));
        }
        if self.codes.rotation_window_secs >= self.codes.ttl_secs {
            errors.push(invalid(
                "codes.rotation_window_secs",
                "must be shorter than codes.ttl_secs".to_string(),
            ));
        }

        if self.sweeper.expire_interval_secs == 0 {
            errors.push(invalid("sweeper.expire_interval_secs", "must be positive".into()));
        }
        if self.sweeper.rotate_interval_secs == 0 {
            errors.push(invalid("sweeper.rotate_interval_secs", "must be positive".into()));
        }

        if !is_valid_timezone_format(&self.system.timezone) {
            errors.push(invalid(
                "system.timezone",
                format!("unknown timezone '{}'", self.system.timezone),
            ));
        }

        let mut ids = HashSet::new();
        let mut credentials = HashSet::new();
        for (index, facility) in self.facilities.iter().enumerate() {
            let field = |name: &str| format!("facilities[{index}].{name}");

            if facility.id.trim().is_empty() {
                errors.push(invalid(&field("id"), "must not be empty".into()));
            } else if !ids.insert(facility.id.as_str()) {
                errors.push(invalid(&field("id"), format!("duplicate id '{}'", facility.id)));
            }

            if facility.exit_credential.trim().is_empty() {
                errors.push(invalid(&field("exit_credential"), "must not be empty".into()));
            } else if !credentials.insert(facility.exit_credential.as_str()) {
                errors.push(invalid(
                    &field("exit_credential"),
                    "shared with another facility".into(),
                ));
            }

            if let Some(tz) = &facility.timezone {
                if !is_valid_timezone_format(tz) {
                    errors.push(invalid(&field("timezone"), format!("unknown timezone '{tz}'")));
                }
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Returns `true` if `tz` names an IANA timezone known to `chrono-tz`.
#[must_use]
pub fn is_valid_timezone_format(tz: &str) -> bool {
    tz.parse::<chrono_tz::Tz>().is_ok()
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message,
    }
}

fn secs_to_duration(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs.min(MAX_CODE_TTL_SECS)).unwrap_or(0))
}
