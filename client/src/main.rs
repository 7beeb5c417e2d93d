use clap::Parser;
use client::config::ClientConfig;
use client::http::HttpBackend;
use client::network::Client;
use client::rendering::Renderer;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the dashboard backend
    #[arg(short = 'u', long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Player name of the session
    #[arg(short = 'p', long, env = "MCM_PLAYER")]
    player: Option<String>,

    /// Session token
    #[arg(short = 't', long, env = "MCM_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Hostname shown for servers that do not report one
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Snapshot poll interval in milliseconds
    #[arg(long, default_value = "5000", value_parser = clap::value_parser!(u64).range(1..))]
    poll_ms: u64,

    /// Release catalog refresh interval in seconds
    #[arg(long, default_value = "900", value_parser = clap::value_parser!(u64).range(1..))]
    releases_secs: u64,

    /// Seconds to wait for an action before reporting a failure
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    action_timeout_secs: u64,

    /// Consecutive failed polls before the error is shown
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..))]
    failure_threshold: u32,
}

impl Args {
    fn into_config(self) -> ClientConfig {
        let mut config = ClientConfig::default().with_base_url(&self.url);
        config.player = self.player;
        config.token = self.token;
        config.hostname = self.hostname;
        config.poll_interval = Duration::from_millis(self.poll_ms);
        config.release_refresh_interval = Duration::from_secs(self.releases_secs);
        config.action_timeout = Duration::from_secs(self.action_timeout_secs);
        config.failure_threshold = self.failure_threshold;
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config();

    info!("Starting dashboard client...");
    info!("Backend: {}", config.base_url);
    if config.session_cookie().is_none() {
        info!("No session given, the backend will treat this client as signed out");
    }

    let backend = HttpBackend::new(&config)?;
    let mut client = Client::new(backend, config, Renderer::new(true));

    client.run().await?;

    Ok(())
}
