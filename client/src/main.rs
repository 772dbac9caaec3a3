use clap::Parser;
use client::bot::{Bot, BotConfig};
use log::info;
use shared::PlayerInfo;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server WebSocket URL to connect to
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Table to join (created if it does not exist)
    #[arg(short = 't', long, default_value = "lobby")]
    table: String,

    /// Player id; defaults to one derived from the process id
    #[arg(long)]
    id: Option<String>,

    /// Display name
    #[arg(short = 'n', long, default_value = "Bot")]
    name: String,

    /// Avatar symbol
    #[arg(long, default_value = "0")]
    symbol: u32,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Milliseconds between seeing a round and clicking
    #[arg(short = 'r', long, default_value = "500")]
    reaction_ms: u64,

    /// Start the game once this many players are seated (creator only)
    #[arg(long)]
    start_when: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let id = args
        .id
        .unwrap_or_else(|| format!("bot-{}", std::process::id()));

    info!("Starting client...");
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let bot = Bot::connect(BotConfig {
        server_url: args.server,
        table_id: args.table,
        player: PlayerInfo::new(id, args.name, args.symbol),
        fake_ping: Duration::from_millis(args.fake_ping),
        reaction_delay: Duration::from_millis(args.reaction_ms),
        start_when: args.start_when,
    })
    .await?;

    let outcome = bot.run().await?;
    info!("Game over: {:?}", outcome);

    Ok(())
}
