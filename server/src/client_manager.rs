//! Session registry and broadcast fan-out for the arena server
//!
//! This module tracks the (at most two) connected sessions:
//! - Identity assignment in accept order (robot 1, then robot 2)
//! - Per-session lifecycle phase
//! - Bounded outbound queues that the fan-out fills without blocking
//!
//! Each queue is drained by that session's writer task, so a slow client can
//! only ever lose its own packets.

use log::{debug, info};
use shared::{Packet, RobotId};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Lifecycle of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Accepted, identity frame not yet delivered
    Connecting,
    /// Identity delivered, nothing received yet
    Assigned,
    /// At least one frame received
    Active,
    /// Disconnected, timed out, failed to decode, or the match ended
    Terminated,
}

/// A connected client bound to one robot
#[derive(Debug)]
pub struct Client {
    pub robot_id: RobotId,
    pub addr: SocketAddr,
    pub phase: SessionPhase,
    /// Packets dropped because the outbound queue was full
    pub dropped_packets: u64,
    sender: mpsc::Sender<Packet>,
}

impl Client {
    pub fn new(robot_id: RobotId, addr: SocketAddr, sender: mpsc::Sender<Packet>) -> Self {
        Self {
            robot_id,
            addr,
            phase: SessionPhase::Connecting,
            dropped_packets: 0,
            sender,
        }
    }

    /// Queues a packet without waiting. Returns false if it was not queued.
    ///
    /// A full queue drops the new packet; snapshots are complete states, so
    /// the next one supersedes whatever was lost. `GameOver` never comes
    /// through here: the session's writer sends it after draining the queue.
    fn enqueue(&mut self, packet: &Packet) -> bool {
        match self.sender.try_send(packet.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped_packets += 1;
                debug!(
                    "Outbound queue for robot {} full, dropped {} ({} dropped so far)",
                    self.robot_id,
                    packet.kind(),
                    self.dropped_packets
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    "Writer for robot {} has stopped, skipping {}",
                    self.robot_id,
                    packet.kind()
                );
                false
            }
        }
    }
}

/// Registry of live sessions
pub struct ClientManager {
    clients: HashMap<RobotId, Client>,
    /// Identity handed to the next accepted connection
    next_robot: Option<RobotId>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            next_robot: Some(RobotId::One),
        }
    }

    /// Registers a newly accepted connection.
    ///
    /// Returns the assigned identity, or None once both slots have been handed
    /// out. Slots are never reused, even after a disconnect.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::Sender<Packet>,
    ) -> Option<RobotId> {
        let robot_id = self.next_robot?;
        self.next_robot = match robot_id {
            RobotId::One => Some(RobotId::Two),
            RobotId::Two => None,
        };

        info!("Client {} connected as robot {}", addr, robot_id);
        self.clients
            .insert(robot_id, Client::new(robot_id, addr, sender));
        Some(robot_id)
    }

    /// Returns true once both identities have been assigned
    pub fn is_full(&self) -> bool {
        self.next_robot.is_none()
    }

    pub fn set_phase(&mut self, robot_id: RobotId, phase: SessionPhase) {
        if let Some(client) = self.clients.get_mut(&robot_id) {
            if client.phase != phase {
                debug!("Robot {} session {:?} -> {:?}", robot_id, client.phase, phase);
                client.phase = phase;
            }
        }
    }

    pub fn phase(&self, robot_id: RobotId) -> Option<SessionPhase> {
        self.clients.get(&robot_id).map(|client| client.phase)
    }

    /// Removes a session and drops its outbound sender, which lets the
    /// session's writer flush what is queued and close the connection.
    pub fn remove_client(&mut self, robot_id: RobotId) -> bool {
        if let Some(client) = self.clients.remove(&robot_id) {
            info!("Robot {} ({}) disconnected", robot_id, client.addr);
            true
        } else {
            false
        }
    }

    /// Removes a session that never received its identity and hands its
    /// slot to the next connection. Only the most recently assigned slot can
    /// be released; anything else is an ordinary removal.
    pub fn release_client(&mut self, robot_id: RobotId) -> bool {
        if !self.remove_client(robot_id) {
            return false;
        }
        let latest = match self.next_robot {
            Some(RobotId::One) => false,
            Some(RobotId::Two) => robot_id == RobotId::One,
            None => robot_id == RobotId::Two,
        };
        if latest {
            debug!("Slot for robot {} is open again", robot_id);
            self.next_robot = Some(robot_id);
        }
        true
    }

    /// Queues a packet for one session
    pub fn send_to(&mut self, robot_id: RobotId, packet: &Packet) -> bool {
        self.clients
            .get_mut(&robot_id)
            .map(|client| client.enqueue(packet))
            .unwrap_or(false)
    }

    /// Queues a packet for every registered session. Returns how many
    /// sessions accepted it.
    pub fn broadcast(&mut self, packet: &Packet) -> usize {
        self.clients
            .values_mut()
            .map(|client| client.enqueue(packet))
            .filter(|queued| *queued)
            .count()
    }

    pub fn dropped_packets(&self, robot_id: RobotId) -> Option<u64> {
        self.clients.get(&robot_id).map(|client| client.dropped_packets)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
