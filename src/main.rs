use hello_ports::config::Config;
use hello_ports::listener::ListenerSet;
use tracing_subscriber::EnvFilter;

fn main() {
    let config = Config::from_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = ListenerSet::start(config.listener_config()) {
        tracing::error!(error = %err, "Server failed");
        std::process::exit(1);
    }
}
