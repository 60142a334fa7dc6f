use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value = "10000")]
    port: u16,

    /// Maximum number of open connections
    #[arg(short, long, default_value = "64", value_parser = clap::value_parser!(u32).range(1..))]
    max_connections: u32,

    /// Frames queued per connection before it is dropped as too slow
    #[arg(long, default_value = "256", value_parser = clap::value_parser!(u32).range(1..))]
    outbound_buffer: u32,

    /// Display name that grants moderation rights
    #[arg(long, env = "MODERATOR_NAME", default_value = server::config::DEFAULT_MODERATOR_NAME)]
    moderator_name: String,

    /// Seconds between status log lines
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    stats_interval: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            bind_addr: format!("{}:{}", args.host, args.port),
            max_connections: args.max_connections as usize,
            outbound_buffer: args.outbound_buffer as usize,
            moderator_name: args.moderator_name,
            stats_interval: Duration::from_secs(args.stats_interval),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting server...");
    info!(
        "Max connections: {}, moderator name: '{}'",
        args.max_connections, args.moderator_name
    );

    let server = Server::new(ServerConfig::from(args)).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
