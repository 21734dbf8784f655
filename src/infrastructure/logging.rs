use tracing_subscriber::EnvFilter;

pub fn init_logging(level: &str) -> bool {
    let filter = EnvFilter::try_new(level.trim()).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
