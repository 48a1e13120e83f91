//! Logging setup shared by the inekf binaries and benchmarks
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to executables, which call one of the functions below.

use tracing::Level;

/// Initialize the tracing subscriber with the default INFO level
///
/// The level can be overridden through `RUST_LOG`.
///
/// # Example
/// ```no_run
/// use inekf::init_logger;
///
/// fn main() {
///     init_logger();
///     tracing::info!("filter started");
/// }
/// ```
///
/// # Environment Variables
/// ```bash
/// RUST_LOG=debug cargo run --bin simulate_planar_slam
/// RUST_LOG=inekf::filter=trace cargo run --bin simulate_planar_slam
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Initialize the tracing subscriber with a custom default level
///
/// # Arguments
/// * `default_level` - The default log level (overrideable via RUST_LOG)
///
/// Calling this more than once is harmless; later calls keep the first subscriber.
pub fn init_logger_with_level(default_level: Level) {
    use tracing_subscriber::fmt::time::SystemTime;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_timer(SystemTime)
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}
