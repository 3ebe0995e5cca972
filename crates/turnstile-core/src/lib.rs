//! # turnstile-core
//!
//! Core business logic for the turnstile facility access system.
//!
//! This crate provides:
//! - Issuance and rotation of short-lived access codes
//! - Entry validation with duplicate-entry prevention
//! - Exit validation through a facility's static exit credential
//! - Live presence and daily counters derived from the check-in log
//! - A background sweeper that expires and pre-emptively rotates codes
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`storage`] - Keyed storage for access codes and check-in events
//! - [`issuer`] - Access code creation
//! - [`rotator`] - Replacing a code's scanner-facing value
//! - [`sweeper`] - Periodic expiry and auto-rotation
//! - [`entry`] - Entry admission with the duplicate-entry check
//! - [`exit`] - Exit validation
//! - [`presence`] - Presence folding and daily statistics
//! - [`directory`] - Owner and entitlement collaborators
//! - [`facility`] - Facility registry and local-day boundaries
//! - [`service`] - The [`AccessService`] facade wiring everything together
//! - [`config`] - Configuration loading, saving, and validation
//! - [`clock`] - Time source abstraction
//! - [`tokens`] - Random code value and share token generation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared domain types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod directory;
pub mod entry;
pub mod error;
pub mod exit;
pub mod facility;
pub mod issuer;
pub mod presence;
pub mod rotator;
pub mod service;
pub mod storage;
pub mod sweeper;
pub mod tokens;
pub mod types;

// Re-export primary types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    is_valid_timezone_format, CodesConfig, Config, ConfigError, ConfigResult, FacilityConfig,
    ServerConfig, StorageConfig, SweeperConfig, SystemConfig,
};
pub use directory::{Directory, EntitlementChecker, OwnerDirectory};
pub use entry::EntryValidator;
pub use error::{Error, ErrorKind, Result, TurnstileError};
pub use exit::ExitValidator;
pub use facility::{Facility, FacilityRegistry};
pub use issuer::CodeIssuer;
pub use presence::PresenceTracker;
pub use rotator::Rotator;
pub use service::AccessService;
pub use storage::{
    default_data_dir, CodeStore, NewCheckIn, ReplaceOutcome, Storage, ValueReplacement,
};
pub use sweeper::{RotateReport, SweepSchedule, Sweeper};
pub use tokens::{is_valid_code_value, is_valid_share_token};
pub use types::{
    AccessCode, CheckInEvent, CheckInKind, CheckInOutcome, DailyStats, DisplayCode, Entitlement,
    EntitlementKind, EntitlementRef, EntitlementState, EntitlementStatus, InsideEntry,
    OwnerSummary, PresenceState, PresenceStatus,
};
