//! Logging setup
//!
//! Test mode writes human-readable logs to the console. Production mode
//! writes to a daily-rolling file per stage through a non-blocking writer;
//! the returned guard must be held until the process exits or buffered lines
//! are lost.

use crate::ResourceClass;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Builds the log filter for a verbosity level
///
/// `RUST_LOG` takes precedence when set.
pub fn build_filter(verbose: u8, quiet: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    if quiet {
        return EnvFilter::new("error");
    }

    match verbose {
        0 => EnvFilter::new("hotel_harvest=info,warn"),
        1 => EnvFilter::new("hotel_harvest=debug,info"),
        2 => EnvFilter::new("hotel_harvest=trace,debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// File name prefix for a stage's rolling log
pub fn log_file_name(stage: Option<ResourceClass>) -> String {
    match stage {
        Some(class) => format!("{}.log", class.to_db_string()),
        None => "hotel-harvest.log".to_string(),
    }
}

/// Installs the console subscriber used in test mode and for one-shot commands
pub fn init_console(verbose: u8, quiet: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbose, quiet))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Installs a daily-rolling file subscriber under `log_dir`
///
/// # Returns
///
/// * `Ok(WorkerGuard)` - Keep alive for the lifetime of the process
/// * `Err(std::io::Error)` - The log directory could not be created
pub fn init_file(
    log_dir: &Path,
    stage: Option<ResourceClass>,
    verbose: u8,
    quiet: bool,
) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let appender = tracing_appender::rolling::daily(log_dir, log_file_name(stage));
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbose, quiet))
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .init();

    Ok(guard)
}
