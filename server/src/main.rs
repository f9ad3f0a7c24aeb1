use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Battleship session server")]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Maximum number of concurrent games
    #[arg(short, long, default_value_t = server::matchmaking::DEFAULT_MAX_GAMES)]
    max_games: usize,
    /// Seconds a new connection has to send its username
    #[arg(long, default_value_t = shared::USERNAME_TIMEOUT_SECS)]
    username_timeout: u64,
    /// Milliseconds between matchmaking attempts
    #[arg(long, default_value_t = 250)]
    matchmaking_interval_ms: u64,
    /// Pending-connection backlog of the listening socket
    #[arg(long, default_value_t = shared::LISTEN_BACKLOG)]
    backlog: u32,
}

/// Parses command-line arguments, binds the acceptor and serves until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        backlog: args.backlog,
        max_games: args.max_games,
        username_timeout: Duration::from_secs(args.username_timeout),
        matchmaking_interval: Duration::from_millis(args.matchmaking_interval_ms),
    };
    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
