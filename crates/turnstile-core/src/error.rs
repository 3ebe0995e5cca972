//! Unified error types for the turnstile core library.
//!
//! This module provides a unified error type [`TurnstileError`] that covers all failure
//! modes across the access code and check-in workflow. Configuration has its own
//! module-specific error ([`ConfigError`](crate::config::ConfigError)) which converts
//! into the unified type.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Stable kinds**: Every variant belongs to one [`ErrorKind`] callers can branch on
//! - **Actionable messages**: Error messages tell the operator what to do next
//! - **HTTP-ready**: Error types include HTTP status codes and error codes
//!
//! # Example
//!
//! ```rust
//! use turnstile_core::error::{ErrorKind, Result, TurnstileError};
//!
//! fn require_facility(id: &str) -> Result<()> {
//!     if id.trim().is_empty() {
//!         return Err(TurnstileError::InvalidInput("facility_id is required".into()));
//!     }
//!     Ok(())
//! }
//!
//! let err = require_facility("").unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::InvalidInput);
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification surfaced to callers alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No code, facility, or share token matched.
    NotFound,
    /// The code exists but is past its expiry.
    Expired,
    /// The entitlement behind the code lapsed or targets another facility.
    EntitlementInvalid,
    /// The requested transition conflicts with the recorded presence state.
    Conflict,
    /// Required identifiers were missing or malformed.
    InvalidInput,
    /// Storage, configuration, or other server-side failures.
    Internal,
}

impl ErrorKind {
    /// Returns the lowercase name used in API responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::EntitlementInvalid => "entitlement_invalid",
            Self::Conflict => "conflict",
            Self::InvalidInput => "invalid_input",
            Self::Internal => "internal",
        }
    }
}

/// The unified error type for all turnstile operations.
///
/// Each variant is designed to be:
///
/// 1. **Self-descriptive**: The variant name indicates the failure mode
/// 2. **Contextual**: Variants include relevant data for debugging
/// 3. **Actionable**: Error messages suggest how to resolve the issue
#[derive(Debug, Error)]
pub enum TurnstileError {
    // =========================================================================
    // LOOKUP ERRORS
    // =========================================================================
    /// No access code currently carries the scanned value.
    #[error("Access code not recognised. Ask the member to refresh the code on their device.")]
    CodeNotFound,

    /// No access code with the given identifier exists.
    #[error("Access code '{0}' does not exist")]
    CodeIdNotFound(uuid::Uuid),

    /// The share token does not belong to any access code.
    #[error("Share token is not valid")]
    ShareTokenNotFound,

    /// The owner has no non-expired access code to display.
    #[error("No valid access code for owner '{0}'. Renew the membership or pass to get a new one.")]
    NoDisplayableCode(String),

    /// The facility identifier is unknown.
    #[error("Facility not found: '{0}'")]
    FacilityNotFound(String),

    /// The exit credential does not match the facility.
    #[error("Exit code is not valid for this facility")]
    ExitCredentialInvalid,

    // =========================================================================
    // VALIDATION OUTCOMES
    // =========================================================================
    /// The access code is past its expiry.
    #[error("Access code expired. Ask the member to refresh the code on their device.")]
    CodeExpired,

    /// The entitlement referenced by the code does not allow entry here and now.
    #[error("Entitlement not valid for this facility: {reason}")]
    EntitlementInvalid {
        /// Why the entitlement was refused.
        reason: String,
    },

    /// The holder already has an entry without a matching exit at this facility.
    #[error("Access refused: already inside this facility")]
    AlreadyInside,

    /// No open entry exists today that an exit could close.
    #[error("No active entry detected for this facility today")]
    NoActiveEntry,

    /// A required identifier was missing or malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// A freshly generated code value or share token already exists.
    #[error("Generated credential collided with an existing one")]
    CredentialCollision,

    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Stored data could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// A specialized [`Result`] type for turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;

/// Short alias for [`TurnstileError`].
pub type Error = TurnstileError;

impl TurnstileError {
    /// Returns the stable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CodeNotFound
            | Self::CodeIdNotFound(_)
            | Self::ShareTokenNotFound
            | Self::NoDisplayableCode(_)
            | Self::FacilityNotFound(_)
            | Self::ExitCredentialInvalid => ErrorKind::NotFound,
            Self::CodeExpired => ErrorKind::Expired,
            Self::EntitlementInvalid { .. } => ErrorKind::EntitlementInvalid,
            Self::AlreadyInside | Self::NoActiveEntry => ErrorKind::Conflict,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::ConfigNotFound(_)
            | Self::ConfigParseError(_)
            | Self::ConfigValidationError(_)
            | Self::CredentialCollision
            | Self::PersistenceError(_)
            | Self::IoError(_)
            | Self::SerializationError(_) => ErrorKind::Internal,
        }
    }

    /// Returns `true` if this error reports a presence conflict.
    #[inline]
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict)
    }

    /// Returns `true` if the caller, not the server, must change something.
    #[inline]
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Internal)
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(
            self,
            Self::PersistenceError(_)
                | Self::IoError(_)
                | Self::SerializationError(_)
                | Self::CredentialCollision
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input or nothing to close
            Self::InvalidInput(_) | Self::NoActiveEntry => 400,

            // 403 Forbidden - understood but refused
            Self::EntitlementInvalid { .. } => 403,

            // 404 Not Found
            Self::CodeNotFound
            | Self::CodeIdNotFound(_)
            | Self::ShareTokenNotFound
            | Self::NoDisplayableCode(_)
            | Self::FacilityNotFound(_)
            | Self::ExitCredentialInvalid => 404,

            // 409 Conflict - duplicate entry
            Self::AlreadyInside => 409,

            // 410 Gone - the code existed but is no longer usable
            Self::CodeExpired => 410,

            // 422 Unprocessable Entity - semantic configuration errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::ConfigNotFound(_)
            | Self::CredentialCollision
            | Self::PersistenceError(_)
            | Self::IoError(_)
            | Self::SerializationError(_) => 500,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::CodeNotFound => "CODE_NOT_FOUND",
            Self::CodeIdNotFound(_) => "CODE_ID_NOT_FOUND",
            Self::ShareTokenNotFound => "SHARE_TOKEN_NOT_FOUND",
            Self::NoDisplayableCode(_) => "NO_DISPLAYABLE_CODE",
            Self::FacilityNotFound(_) => "FACILITY_NOT_FOUND",
            Self::ExitCredentialInvalid => "EXIT_CREDENTIAL_INVALID",
            Self::CodeExpired => "CODE_EXPIRED",
            Self::EntitlementInvalid { .. } => "ENTITLEMENT_INVALID",
            Self::AlreadyInside => "ALREADY_INSIDE",
            Self::NoActiveEntry => "NO_ACTIVE_ENTRY",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::CredentialCollision => "CREDENTIAL_COLLISION",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
            Self::SerializationError(_) => "SERIALIZATION_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for TurnstileError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {}: {}", path.display(), source))
            }
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {}", path.display(), source))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
