//! Application state shared across handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use turnstile_core::AccessService;

/// State handed to every handler.
pub type SharedState = Arc<AppState>;

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// The access service every endpoint delegates to.
    pub service: AccessService,

    /// When this process started serving.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wrap `service` for sharing across handlers.
    #[must_use]
    pub fn shared(service: AccessService) -> SharedState {
        Arc::new(Self {
            service,
            started_at: Utc::now(),
        })
    }
}
