//! Tracing setup for the server binary.
//!
//! Production writes JSON lines to a daily file under the log directory plus a
//! compact uncolored copy on stdout for the journal. Development prints pretty
//! events to stdout, including span open and close.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding filter directives when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "TURNSTILE_LOG_LEVEL";

const DEFAULT_DIRECTIVES: &str = "info";
const LOG_FILE_PREFIX: &str = "turnstile";

/// Flush guards for the non-blocking file and stdout writers.
static WRITER_GUARDS: OnceLock<(WorkerGuard, WorkerGuard)> = OnceLock::new();

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter directives are invalid, the log directory
/// cannot be created, or a subscriber is already installed.
pub fn init(production: bool) -> anyhow::Result<()> {
    let filter = filter_from_env()?;

    if !production {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE),
            )
            .try_init()?;
        return Ok(());
    }

    let dir = log_directory();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(file_writer),
        )
        .with(fmt::layer().compact().with_ansi(false).with_writer(stdout_writer))
        .try_init()?;

    let _ = WRITER_GUARDS.set((file_guard, stdout_guard));
    Ok(())
}

fn filter_from_env() -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives =
        std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| DEFAULT_DIRECTIVES.to_string());
    EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid {LOG_LEVEL_ENV} directives '{directives}'"))
}

/// `/var/log/turnstile` on Linux hosts, the platform data directory elsewhere.
fn log_directory() -> PathBuf {
    if cfg!(target_os = "linux") {
        return PathBuf::from("/var/log/turnstile");
    }
    directories::ProjectDirs::from("", "", "turnstile")
        .map_or_else(|| PathBuf::from("logs"), |dirs| dirs.data_local_dir().join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        assert!(EnvFilter::try_new(DEFAULT_DIRECTIVES).is_ok());
    }

    #[test]
    fn test_log_directory_names_the_service() {
        let dir = log_directory();
        assert!(dir.ends_with("turnstile") || dir.ends_with("logs"));
    }
}
