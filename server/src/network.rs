//! Server network layer: connection acceptor, per-session handlers and
//! outbound writers over TCP

use crate::client_manager::{ClientManager, SessionPhase};
use crate::config::ServerConfig;
use crate::game::{GameState, MatchOutcome, MoveResult};
use log::{debug, error, info, warn};
use shared::framing::{read_packet, write_packet};
use shared::{Packet, ProtocolError, RobotId};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Why a session handler stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed the connection
    Closed,
    /// Nothing arrived within the read timeout
    TimedOut,
    /// The client sent something that is not a valid frame
    Malformed,
    /// The match was decided
    MatchOver,
}

/// State shared by the acceptor and every session
#[derive(Clone)]
struct Shared {
    game_state: Arc<RwLock<GameState>>,
    clients: Arc<RwLock<ClientManager>>,
    outcome_tx: Arc<watch::Sender<Option<MatchOutcome>>>,
    read_timeout: Duration,
}

/// Authoritative arena server for one two-player match
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    shared: Shared,
}

impl Server {
    /// Binds the listener. A bind failure is fatal to startup.
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (outcome_tx, _) = watch::channel(None);
        let shared = Shared {
            game_state: Arc::new(RwLock::new(GameState::new(config.arena))),
            clients: Arc::new(RwLock::new(ClientManager::new())),
            outcome_tx: Arc::new(outcome_tx),
            read_timeout: config.read_timeout,
        };

        Ok(Server {
            listener,
            config,
            shared,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the authoritative world state
    pub fn game_state(&self) -> Arc<RwLock<GameState>> {
        Arc::clone(&self.shared.game_state)
    }

    /// Accepts the two players and runs the match until every session has
    /// ended. Returns the outcome, if the match was decided.
    pub async fn run(self) -> Result<Option<MatchOutcome>, Box<dyn Error + Send + Sync>> {
        let Server {
            listener,
            config,
            shared,
        } = self;

        let mut outcome_rx = shared.outcome_tx.subscribe();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        loop {
            let full = shared.clients.read().await.is_full();
            let decided = outcome_rx.borrow().is_some();
            if full || decided {
                break;
            }

            let (stream, addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = outcome_rx.changed() => continue,
            };

            match accept_session(&shared, &config, stream, addr).await {
                Some((handler, writer)) => {
                    tasks.push(handler);
                    tasks.push(writer);
                }
                None => continue,
            }
        }

        // Both slots are taken or the match is over; refuse anyone else.
        drop(listener);
        info!("No longer accepting connections");

        for task in tasks {
            if let Err(e) = task.await {
                error!("Session task panicked: {}", e);
            }
        }

        let outcome = *shared.outcome_tx.borrow();
        match outcome {
            Some(outcome) => info!(
                "Match finished: robot {} won after {:.1}s",
                outcome.winner,
                outcome.elapsed.as_secs_f32()
            ),
            None => info!("All sessions ended without a winner"),
        }
        Ok(outcome)
    }
}

/// Registers a fresh connection, delivers its identity and spawns its
/// handler and writer. Returns None if the connection could not be set up.
async fn accept_session(
    shared: &Shared,
    config: &ServerConfig,
    stream: TcpStream,
    addr: SocketAddr,
) -> Option<(JoinHandle<()>, JoinHandle<()>)> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", addr, e);
    }
    let (reader, mut writer) = stream.into_split();
    let (packet_tx, packet_rx) = mpsc::channel(config.send_queue.max(1));

    let robot_id = shared.clients.write().await.add_client(addr, packet_tx)?;

    // The identity goes out before the writer task exists, so it is always
    // the first frame; broadcasts queued meanwhile wait in the channel.
    let assign = Packet::AssignIdentity {
        robot_id: robot_id.as_u8(),
    };
    match timeout(config.write_timeout, write_packet(&mut writer, &assign)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!("Failed to send identity to {}: {}", addr, e);
            shared.clients.write().await.release_client(robot_id);
            return None;
        }
        Err(_) => {
            warn!("Timed out sending identity to {}", addr);
            shared.clients.write().await.release_client(robot_id);
            return None;
        }
    }

    {
        let mut game_state = shared.game_state.write().await;
        let mut clients = shared.clients.write().await;
        clients.set_phase(robot_id, SessionPhase::Assigned);
        if clients.is_full() {
            game_state.start_match();
        }
    }

    let writer_task = tokio::spawn(run_writer(
        robot_id,
        writer,
        packet_rx,
        shared.outcome_tx.subscribe(),
        config.write_timeout,
    ));
    let handler_task = tokio::spawn(run_session(shared.clone(), robot_id, addr, reader));

    Some((handler_task, writer_task))
}

/// Drains one session's outbound queue onto its socket.
///
/// Ends when the registry drops the session's sender, or on the first failed
/// or stalled write. Either way the write half is shut down. `GameOver` is
/// never queued: once the queue is drained the writer sends it itself, so a
/// full queue cannot lose it.
async fn run_writer<W>(
    robot_id: RobotId,
    mut writer: W,
    mut packet_rx: mpsc::Receiver<Packet>,
    outcome_rx: watch::Receiver<Option<MatchOutcome>>,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    let mut healthy = true;
    while let Some(packet) = packet_rx.recv().await {
        if !send_with_timeout(robot_id, &mut writer, &packet, write_timeout).await {
            healthy = false;
            break;
        }
    }

    let outcome = *outcome_rx.borrow();
    if let Some(outcome) = outcome.filter(|_| healthy) {
        send_with_timeout(robot_id, &mut writer, &outcome.to_packet(), write_timeout).await;
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Failed to shut down stream for robot {}: {}", robot_id, e);
    }
}

/// Writes one packet, bounded by `write_timeout`. Returns false on failure.
async fn send_with_timeout<W>(
    robot_id: RobotId,
    writer: &mut W,
    packet: &Packet,
    write_timeout: Duration,
) -> bool
where
    W: AsyncWrite + Unpin,
{
    match timeout(write_timeout, write_packet(writer, packet)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!("Failed to send {} to robot {}: {}", packet.kind(), robot_id, e);
            false
        }
        Err(_) => {
            warn!("Robot {} stalled on write, dropping its outbound stream", robot_id);
            false
        }
    }
}

/// Session handler loop for one connection
async fn run_session(shared: Shared, robot_id: RobotId, addr: SocketAddr, mut reader: OwnedReadHalf) {
    let mut outcome_rx = shared.outcome_tx.subscribe();
    let end = loop {
        if outcome_rx.borrow().is_some() {
            break SessionEnd::MatchOver;
        }

        let received = tokio::select! {
            _ = outcome_rx.changed() => continue,
            received = timeout(shared.read_timeout, read_packet(&mut reader)) => received,
        };

        let packet = match received {
            Err(_) => {
                info!("Robot {} ({}) timed out", robot_id, addr);
                break SessionEnd::TimedOut;
            }
            Ok(Ok(None)) => break SessionEnd::Closed,
            Ok(Err(ProtocolError::Io(e))) => {
                info!("Robot {} ({}) connection error: {}", robot_id, addr, e);
                break SessionEnd::Closed;
            }
            Ok(Err(e)) => {
                warn!("Robot {} ({}) sent a malformed frame: {}", robot_id, addr, e);
                break SessionEnd::Malformed;
            }
            Ok(Ok(Some(packet))) => packet,
        };

        if handle_packet(&shared, robot_id, packet).await {
            break SessionEnd::MatchOver;
        }
    };

    debug!("Robot {} session ended: {:?}", robot_id, end);
    let mut clients = shared.clients.write().await;
    clients.set_phase(robot_id, SessionPhase::Terminated);
    clients.remove_client(robot_id);
}

/// Applies one received packet. Returns true if it decided the match.
async fn handle_packet(shared: &Shared, robot_id: RobotId, packet: Packet) -> bool {
    // World first, then registry: the only lock order used anywhere.
    let mut game_state = shared.game_state.write().await;
    let mut clients = shared.clients.write().await;
    clients.set_phase(robot_id, SessionPhase::Active);

    let (x, y, claimed) = match packet {
        Packet::PositionUpdate { robot_id: claimed, x, y } => (x, y, claimed),
        other => {
            warn!("Unexpected {} packet from robot {}", other.kind(), robot_id);
            return false;
        }
    };

    let report = if claimed == robot_id.as_u8() {
        Some(game_state.apply_update(robot_id, x, y))
    } else {
        warn!(
            "Robot {} sent an update claiming to be robot {}, ignoring it",
            robot_id, claimed
        );
        None
    };

    if let Some(report) = report {
        if report.result == MoveResult::MatchOver {
            return false;
        }
    }

    // Every processed update is answered with the state it produced.
    clients.broadcast(&game_state.snapshot());

    // Writers deliver GameOver after the final snapshot, once their
    // sessions are removed.
    match report.and_then(|report| report.outcome) {
        Some(outcome) => {
            shared.outcome_tx.send_replace(Some(outcome));
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArenaConfig;
    use shared::framing::write_frame;
    use shared::RobotPosition;
    use tokio::io::duplex;
    use tokio::net::tcp::OwnedWriteHalf;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            read_timeout: Duration::from_secs(5),
            ..ServerConfig::default()
        }
    }

    async fn connect(addr: SocketAddr) -> (OwnedReadHalf, OwnedWriteHalf, u8) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut reader, writer) = stream.into_split();
        match read_packet(&mut reader).await.unwrap() {
            Some(Packet::AssignIdentity { robot_id }) => (reader, writer, robot_id),
            other => panic!("expected AssignIdentity, got {:?}", other),
        }
    }

    async fn next_packet(reader: &mut OwnedReadHalf) -> Option<Packet> {
        timeout(Duration::from_secs(5), read_packet(reader))
            .await
            .expect("timed out waiting for a packet")
            .unwrap()
    }

    fn shared_for_test() -> Shared {
        let (outcome_tx, _) = watch::channel(None);
        Shared {
            game_state: Arc::new(RwLock::new(GameState::new(ArenaConfig::default()))),
            clients: Arc::new(RwLock::new(ClientManager::new())),
            outcome_tx: Arc::new(outcome_tx),
            read_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let first = Server::new(test_config()).await.unwrap();
        let taken = first.local_addr().unwrap();

        let config = ServerConfig {
            port: taken.port(),
            ..test_config()
        };
        assert!(Server::new(config).await.is_err());
    }

    #[tokio::test]
    async fn test_handle_packet_broadcasts_snapshot() {
        let shared = shared_for_test();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        {
            let mut clients = shared.clients.write().await;
            clients.add_client(addr, tx1);
            clients.add_client(addr, tx2);
        }

        let decided = handle_packet(
            &shared,
            RobotId::One,
            Packet::PositionUpdate {
                robot_id: 1,
                x: 205.0,
                y: 300.0,
            },
        )
        .await;

        assert!(!decided);
        let expected = Packet::WorldSnapshot {
            robot1: RobotPosition {
                x: 205.0,
                y: 300.0,
                alive: true,
            },
            robot2: RobotPosition {
                x: 600.0,
                y: 300.0,
                alive: true,
            },
            arena_radius: 250.0,
        };
        assert_eq!(rx1.try_recv().unwrap(), expected);
        assert_eq!(rx2.try_recv().unwrap(), expected);
        assert_eq!(
            shared.clients.read().await.phase(RobotId::One),
            Some(SessionPhase::Active)
        );
    }

    #[tokio::test]
    async fn test_handle_packet_ignores_mismatched_identity() {
        let shared = shared_for_test();
        let (tx, mut rx) = mpsc::channel(8);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        shared.clients.write().await.add_client(addr, tx);

        handle_packet(
            &shared,
            RobotId::One,
            Packet::PositionUpdate {
                robot_id: 2,
                x: 300.0,
                y: 300.0,
            },
        )
        .await;

        let state = shared.game_state.read().await;
        assert_eq!(state.robot(RobotId::One).position.x, 200.0);
        assert_eq!(state.robot(RobotId::Two).position.x, 600.0);
        assert_eq!(state.updates_processed(), 0);
        // The client still gets a reply.
        assert!(matches!(rx.try_recv(), Ok(Packet::WorldSnapshot { .. })));
    }

    #[tokio::test]
    async fn test_handle_packet_announces_winner() {
        let shared = shared_for_test();
        let (tx, mut rx) = mpsc::channel(8);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        shared.clients.write().await.add_client(addr, tx);
        let outcome_rx = shared.outcome_tx.subscribe();

        let decided = handle_packet(
            &shared,
            RobotId::One,
            Packet::PositionUpdate {
                robot_id: 1,
                x: 140.0,
                y: 300.0,
            },
        )
        .await;

        assert!(decided);
        assert!(matches!(rx.try_recv(), Ok(Packet::WorldSnapshot { .. })));
        // GameOver is left to the writer, not queued.
        assert!(rx.try_recv().is_err());
        assert_eq!(outcome_rx.borrow().map(|o| o.winner), Some(RobotId::Two));
    }

    #[tokio::test]
    async fn test_game_over_survives_full_queue() {
        let shared = shared_for_test();
        let (tx1, rx1) = mpsc::channel(1);
        let (tx2, rx2) = mpsc::channel(1);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let snapshot = shared.game_state.read().await.snapshot();
        {
            let mut clients = shared.clients.write().await;
            clients.add_client(addr, tx1);
            clients.add_client(addr, tx2);
            // Both queues are full before the deciding update arrives.
            assert_eq!(clients.broadcast(&snapshot), 2);
        }

        let decided = handle_packet(
            &shared,
            RobotId::One,
            Packet::PositionUpdate {
                robot_id: 1,
                x: 140.0,
                y: 300.0,
            },
        )
        .await;
        assert!(decided);
        assert_eq!(shared.clients.read().await.dropped_packets(RobotId::One), Some(1));

        let mut streams = Vec::new();
        for (id, rx) in [(RobotId::One, rx1), (RobotId::Two, rx2)] {
            let (mut client_side, server_side) = duplex(1024);
            let writer = tokio::spawn(run_writer(
                id,
                server_side,
                rx,
                shared.outcome_tx.subscribe(),
                Duration::from_secs(1),
            ));
            shared.clients.write().await.remove_client(id);
            writer.await.unwrap();

            let mut received = Vec::new();
            while let Some(packet) = read_packet(&mut client_side).await.unwrap() {
                received.push(packet);
            }
            streams.push(received);
        }

        for received in streams {
            assert_eq!(received.len(), 2);
            assert!(matches!(received[0], Packet::WorldSnapshot { .. }));
            assert!(matches!(
                received[1],
                Packet::GameOver { winner_id: 2, .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_writer_without_outcome_sends_no_game_over() {
        let (tx, rx) = mpsc::channel(4);
        let (_outcome_tx, outcome_rx) = watch::channel(None);
        let (mut client_side, server_side) = duplex(1024);

        tx.send(Packet::AssignIdentity { robot_id: 1 }).await.unwrap();
        drop(tx);
        run_writer(RobotId::One, server_side, rx, outcome_rx, Duration::from_secs(1)).await;

        assert_eq!(
            read_packet(&mut client_side).await.unwrap(),
            Some(Packet::AssignIdentity { robot_id: 1 })
        );
        assert!(read_packet(&mut client_side).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unexpected_packet_is_ignored() {
        let shared = shared_for_test();
        let (tx, mut rx) = mpsc::channel(8);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        shared.clients.write().await.add_client(addr, tx);

        let decided = handle_packet(&shared, RobotId::One, Packet::AssignIdentity { robot_id: 1 }).await;

        assert!(!decided);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_identity_is_first_frame() {
        let server = Server::new(test_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let server_task = tokio::spawn(server.run());

        let (_r1, _w1, id1) = connect(addr).await;
        let (_r2, _w2, id2) = connect(addr).await;
        assert_eq!((id1, id2), (1, 2));

        drop((_r1, _w1, _r2, _w2));
        let outcome = server_task.await.unwrap().unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_malformed_frame_ends_only_that_session() {
        let server = Server::new(test_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let game_state = server.game_state();
        let server_task = tokio::spawn(server.run());

        let (mut r1, mut w1, _) = connect(addr).await;
        let (mut r2, mut w2, _) = connect(addr).await;

        write_frame(&mut w2, &[0xde, 0xad, 0xbe, 0xef]).await.unwrap();
        assert!(next_packet(&mut r2).await.is_none());

        write_packet(
            &mut w1,
            &Packet::PositionUpdate {
                robot_id: 1,
                x: 210.0,
                y: 300.0,
            },
        )
        .await
        .unwrap();
        match next_packet(&mut r1).await {
            Some(Packet::WorldSnapshot { robot1, .. }) => assert_eq!(robot1.x, 210.0),
            other => panic!("expected snapshot, got {:?}", other),
        }
        assert_eq!(game_state.read().await.robot(RobotId::One).position.x, 210.0);

        drop(w1);
        assert!(next_packet(&mut r1).await.is_none());
        assert!(server_task.await.unwrap().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_idle_session_times_out() {
        let config = ServerConfig {
            read_timeout: Duration::from_millis(200),
            ..test_config()
        };
        let server = Server::new(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let server_task = tokio::spawn(server.run());

        let (mut r1, _w1, _) = connect(addr).await;
        let (mut r2, _w2, _) = connect(addr).await;

        assert!(next_packet(&mut r1).await.is_none());
        assert!(next_packet(&mut r2).await.is_none());
        assert!(server_task.await.unwrap().unwrap().is_none());
    }
}
