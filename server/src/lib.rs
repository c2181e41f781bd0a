//! # Arena Server Library
//!
//! This library provides the authoritative server for the two-player sumo
//! arena. It owns the canonical positions of both robots, resolves pushes
//! between them, decides when a robot has been driven out of the arena, and
//! fans every resulting world snapshot out to both clients.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! Clients propose positions; the server decides what actually happens. A
//! proposal is committed, ignored (outside the field), or turned into a push
//! against the opponent. Clients conform to the snapshots they receive.
//!
//! ### Session Management
//! Handles the lifecycle of exactly two TCP sessions:
//! - Identity assignment in accept order (robot 1, then robot 2)
//! - Read timeouts so a silent peer cannot hold a slot forever
//! - Clean removal on disconnect, malformed input, or end of match
//!
//! ### Match Resolution
//! When a robot leaves the arena the other one wins. Both clients receive a
//! final snapshot followed by a `GameOver` packet, and every session ends.
//!
//! ## Architecture Design
//!
//! ### Task Per Session
//! Each session has a reader task (the session handler) and a writer task
//! draining a bounded outbound queue. The acceptor is a single loop that
//! stops once both slots are handed out.
//!
//! ### Locking Discipline
//! The world state and the session registry each sit behind a tokio
//! `RwLock`. Whenever both are needed the world is locked first. An update is
//! validated, applied and broadcast while the world lock is held, so every
//! client sees snapshots in commit order.
//!
//! ### Framed Protocol
//! Packets travel as length-prefixed, versioned bincode frames (see the
//! `shared` crate). The protocol version is checked on every frame.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! Arena geometry, tuning constants and network settings, defaulting to the
//! protocol contract values.
//!
//! ### Physics Module (`physics`)
//! Pure collision, push and boundary functions.
//!
//! ### Game Module (`game`)
//! The authoritative world state and the update pipeline built on `physics`.
//!
//! ### Client Manager Module (`client_manager`)
//! Session registry, lifecycle phases and non-blocking broadcast fan-out.
//!
//! ### Network Module (`network`)
//! TCP acceptor, session handlers and outbound writers.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let server = Server::new(ServerConfig::default()).await?;
//!
//!     // Runs until both sessions have ended.
//!     if let Some(outcome) = server.run().await? {
//!         println!("Robot {} won", outcome.winner);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;
pub mod physics;
