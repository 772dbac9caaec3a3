use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Deck order; must be prime
    #[clap(long, default_value = "7")]
    deck_order: u32,
    /// How long a round stays open after its first valid click
    #[clap(long, default_value = "200")]
    click_window_ms: u64,
    /// Extra discards when winning on one's own avatar symbol
    #[clap(long, default_value = "3")]
    bonus_discards: usize,
    /// Interval between latency probes
    #[clap(long, default_value = "1000")]
    ping_interval_ms: u64,
    /// Without a pong for this long a client counts as maximally lagged
    #[clap(long, default_value = "3000")]
    stale_after_ms: u64,
    /// Without a pong for this long a client is disconnected
    #[clap(long, default_value = "10000")]
    pong_timeout_ms: u64,
    /// Cap on any one-way latency estimate
    #[clap(long, default_value = "100")]
    max_latency_ms: u64,
    /// Weight of the newest sample in the latency moving average
    #[clap(long, default_value = "0.25")]
    latency_smoothing: f64,
    /// Outbound messages queued per client before it is dropped
    #[clap(long, default_value = "64")]
    outbound_capacity: usize,
}

impl Args {
    fn config(&self) -> ServerConfig {
        ServerConfig {
            deck_order: self.deck_order,
            click_window: Duration::from_millis(self.click_window_ms),
            bonus_discards: self.bonus_discards,
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            stale_after: Duration::from_millis(self.stale_after_ms),
            pong_timeout: Duration::from_millis(self.pong_timeout_ms),
            max_latency: Duration::from_millis(self.max_latency_ms),
            latency_smoothing: self.latency_smoothing,
            outbound_capacity: self.outbound_capacity,
        }
    }
}

/// Parses command-line arguments, binds the listener and serves until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, args.config()).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    server.shutdown().await;
    // Give writer tasks a moment to deliver the shutdown notice.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}
