//! Headless client that plays one side of a match.
//!
//! The bot walks toward the opponent with a little random jitter, printing
//! every snapshot it gets back, until the server announces a winner or the
//! step budget runs out.

use clap::Parser;
use log::{info, warn};
use rand::Rng;
use shared::framing::{read_packet, write_packet};
use shared::{Packet, RobotId, RobotPosition};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::interval;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Maximum number of position updates to send
    #[arg(long, default_value = "600")]
    steps: u32,

    /// Delay between updates in milliseconds
    #[arg(long, default_value = "33")]
    interval_ms: u64,
}

const STEP: f32 = 5.0;

/// Next position: one step toward the opponent plus jitter.
fn next_position(me: RobotPosition, opponent: RobotPosition, rng: &mut impl Rng) -> (f32, f32) {
    let dx = opponent.x - me.x;
    let dy = opponent.y - me.y;
    let distance = (dx * dx + dy * dy).sqrt().max(1.0);
    let jitter_x: f32 = rng.gen_range(-1.0..=1.0);
    let jitter_y: f32 = rng.gen_range(-1.0..=1.0);
    (
        me.x + dx / distance * STEP + jitter_x,
        me.y + dy / distance * STEP + jitter_y,
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();
    info!("Connected to {}", args.server);

    let robot_id = match read_packet(&mut reader).await? {
        Some(Packet::AssignIdentity { robot_id }) => RobotId::try_from(robot_id)?,
        Some(other) => return Err(format!("expected AssignIdentity, got {:?}", other).into()),
        None => return Err("server closed the connection before assigning an identity".into()),
    };
    info!("Playing as robot {}", robot_id);

    // Snapshots arrive for both robots' updates, so reading runs on its own
    // task and the main loop sends on a fixed cadence.
    let (packet_tx, mut packet_rx) = mpsc::channel::<Packet>(64);
    tokio::spawn(async move {
        loop {
            match read_packet(&mut reader).await {
                Ok(Some(packet)) => {
                    if packet_tx.send(packet).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read from server: {}", e);
                    break;
                }
            }
        }
    });

    let (x, y) = robot_id.start_position();
    let mut me = RobotPosition { x, y, alive: true };
    let (x, y) = robot_id.opponent().start_position();
    let mut opponent = RobotPosition { x, y, alive: true };
    let mut rng = rand::thread_rng();
    let mut ticker = interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut sent = 0;

    while sent < args.steps {
        tokio::select! {
            _ = ticker.tick() => {
                let (x, y) = next_position(me, opponent, &mut rng);
                let update = Packet::PositionUpdate {
                    robot_id: robot_id.as_u8(),
                    x,
                    y,
                };
                write_packet(&mut writer, &update).await?;
                sent += 1;
            }
            packet = packet_rx.recv() => match packet {
                Some(Packet::WorldSnapshot {
                    robot1,
                    robot2,
                    arena_radius,
                }) => {
                    let (mine, theirs) = match robot_id {
                        RobotId::One => (robot1, robot2),
                        RobotId::Two => (robot2, robot1),
                    };
                    me = mine;
                    opponent = theirs;
                    info!(
                        "me=({:.1}, {:.1}) opponent=({:.1}, {:.1}) radius={:.1}",
                        me.x, me.y, opponent.x, opponent.y, arena_radius
                    );
                }
                Some(Packet::GameOver {
                    winner_id,
                    elapsed_ms,
                }) => {
                    let verdict = if winner_id == robot_id.as_u8() { "won" } else { "lost" };
                    info!("Robot {} won after {} ms, we {}", winner_id, elapsed_ms, verdict);
                    return Ok(());
                }
                Some(other) => warn!("Unexpected {} packet", other.kind()),
                None => {
                    info!("Server closed the connection");
                    return Ok(());
                }
            },
        }
    }

    info!("Step budget used up, disconnecting");
    Ok(())
}
