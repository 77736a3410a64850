/// Initialize tracing/logging for the application.
///
/// Log lines go to stderr; stdout is reserved for consumed messages.
pub fn init(default_level: &str) {
    // try_init so tests can call this repeatedly without panicking
    let _ = tracing_subscriber::fmt()
        .with_max_level(parse_level(default_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" | "warning" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}
