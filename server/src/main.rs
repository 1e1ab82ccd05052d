use std::sync::Arc;

use clap::Parser;
use log::info;

use server::config::ServerConfig;
use server::network::Server;
use server::store::MemoryStore;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// WebSocket port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (simulation updates per second)
    #[clap(short, long, default_value = "240")]
    tick_rate: u32,

    /// Goals needed to win
    #[clap(long, default_value = "5")]
    score_limit: u16,

    /// Game length limit in seconds
    #[clap(long, default_value = "600")]
    time_limit: u32,

    /// Connection inactivity timeout in milliseconds
    #[clap(long, default_value = "30000")]
    connection_timeout: u64,

    /// Shared secret enabling admin game-end requests
    #[clap(long)]
    admin_code: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::init();

    // Print a message about setting RUST_LOG if not set
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Warning: RUST_LOG environment variable not set. Set it to display logs!");
        eprintln!("Recommended: RUST_LOG=info cargo run");
    }

    let args = Args::parse();
    let mut config = ServerConfig {
        host: args.host,
        port: args.port,
        connection_timeout_ms: args.connection_timeout,
        admin_code: args.admin_code,
        ..ServerConfig::default()
    };
    config.game.tick_hz = args.tick_rate;
    config.game.score_limit = args.score_limit;
    config.game.time_limit_sec = args.time_limit;

    info!(
        "starting head-soccer server on {} at {} Hz (first to {}, {} s limit)",
        config.bind_addr(),
        config.game.tick_hz,
        config.game.score_limit,
        config.game.time_limit_sec
    );

    let store = Arc::new(MemoryStore::new());
    let mut server = Server::new(config, store);
    server.run().await
}
