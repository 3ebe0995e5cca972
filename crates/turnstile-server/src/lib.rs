//! # turnstile-server
//!
//! HTTP server library for the turnstile facility access system.
//!
//! This library provides the API handlers, logging setup, and state shared by
//! the `turnstile-server` binary and the integration tests.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
