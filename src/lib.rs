pub mod api;
pub mod config;
pub mod feed;
pub mod post;
pub mod session;
pub mod store;

use tracing_subscriber::EnvFilter;

/// Installs a stderr tracing subscriber honouring `RUST_LOG`. Later calls
/// are no-ops.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feedview=info"));
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
