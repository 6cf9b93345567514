pub mod token_counter;

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let Some(level) = tracing_level_for(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Tracing filter directive for a configured log level, `None` when logging
/// is disabled.
#[must_use]
pub fn tracing_level_for(log_level: &str) -> Option<String> {
    let level = log_level.to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}
