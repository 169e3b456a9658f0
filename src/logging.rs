use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging for the dfs-node binary.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("dfs_node=debug")
        } else {
            EnvFilter::new("dfs_node=info")
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)?;

    info!("dfs-node logging initialized");
    Ok(())
}

/// Initialize logging with fallback behavior if setup fails.
pub fn init_logging_safe() {
    if let Err(e) = init_logging() {
        eprintln!("Warning: failed to set up structured logging: {e}. Using basic logging.");
    }
}

/// Log peer lifecycle events: connect, register, disconnect.
pub fn log_peer_event(event: &str, peer_id: u8, details: &str) {
    info!(target: "dfs::peer", peer_id, "{}: {}", event, details);
}

/// Log store/get/remove operations against the content-addressed store.
pub fn log_file_operation(operation: &str, filename: &str, details: &str) {
    info!(target: "dfs::file", "{} {}: {}", operation, filename, details);
}

/// Log frame-level events: serialize, deserialize, drop.
pub fn log_frame_event(event: &str, source_id: u32, details: &str) {
    info!(target: "dfs::frame", source_id, "{}: {}", event, details);
}

/// Log an error alongside the context in which it occurred.
pub fn log_error_with_context(context: &str, error: &dyn std::error::Error) {
    error!(target: "dfs::error", "{}: {}", context, error);
}
