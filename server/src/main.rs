use clap::Parser;
use log::{error, info};
use server::config::{ArenaConfig, BoundaryRule, ServerConfig};
use server::network::Server;
use shared::{DEFAULT_PORT, MIN_ARENA_RADIUS};
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Disconnect a session after this many seconds without a packet
    #[arg(long, default_value = "30")]
    read_timeout_secs: u64,

    /// Give up on a client that cannot take a frame within this many milliseconds
    #[arg(long, default_value = "1000")]
    write_timeout_ms: u64,

    /// Outbound packets buffered per session before new ones are dropped
    #[arg(long, default_value = "32")]
    send_queue: usize,

    /// Arena radius lost per second of match time (0 keeps it fixed)
    #[arg(long, default_value = "0")]
    shrink_rate: f32,

    /// Smallest radius a shrinking arena reaches
    #[arg(long, default_value_t = MIN_ARENA_RADIUS)]
    min_radius: f32,

    /// Whether the robot's own size counts when testing the arena edge
    #[arg(long, value_enum, default_value_t = BoundaryRule::Center)]
    boundary: BoundaryRule,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            send_queue: self.send_queue,
            arena: ArenaConfig {
                shrink_rate: self.shrink_rate,
                min_radius: self.min_radius,
                boundary: self.boundary,
                ..ArenaConfig::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    info!(
        "Arena radius {} (shrink {}/s, min {}), boundary rule {:?}",
        config.arena.radius, config.arena.shrink_rate, config.arena.min_radius, config.arena.boundary
    );

    let server = match Server::new(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {}", e);
            return Err(e);
        }
    };

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            match result? {
                Some(outcome) => info!("Robot {} is the winner", outcome.winner),
                None => info!("Match ended without a winner"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
