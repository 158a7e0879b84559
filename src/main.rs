use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shadowgate=warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    std::process::exit(shadowgate::run());
}
