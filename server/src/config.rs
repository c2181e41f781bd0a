//! Server and arena configuration.
//!
//! Defaults reproduce the protocol contract values, so a server started with
//! no flags is compatible with existing clients.

use clap::ValueEnum;
use shared::{
    ARENA_CENTER_X, ARENA_CENTER_Y, ARENA_RADIUS, DEFAULT_PORT, FIELD_HEIGHT, FIELD_WIDTH,
    MIN_ARENA_RADIUS, PUSH_FORCE, PUSH_THRESHOLD, ROBOT_SIZE,
};
use std::time::Duration;

use crate::physics::Vector2;

/// Radius of a robot's round body, used by [`BoundaryRule::Body`]
pub const BODY_RADIUS: f32 = 35.0;

/// How the elimination test treats the robot's own size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BoundaryRule {
    /// Only the robot's reference point must stay inside the radius
    #[default]
    Center,
    /// The robot's body radius is added to its distance from the center
    Body,
}

/// Geometry and tuning of the play field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArenaConfig {
    pub field_width: f32,
    pub field_height: f32,
    pub robot_size: f32,
    pub body_radius: f32,
    pub center: Vector2,
    pub radius: f32,
    /// Radius lost per second of match time; zero keeps the arena fixed
    pub shrink_rate: f32,
    pub min_radius: f32,
    pub push_force: f32,
    pub push_threshold: f32,
    pub boundary: BoundaryRule,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            field_width: FIELD_WIDTH,
            field_height: FIELD_HEIGHT,
            robot_size: ROBOT_SIZE,
            body_radius: BODY_RADIUS,
            center: Vector2 {
                x: ARENA_CENTER_X,
                y: ARENA_CENTER_Y,
            },
            radius: ARENA_RADIUS,
            shrink_rate: 0.0,
            min_radius: MIN_ARENA_RADIUS,
            push_force: PUSH_FORCE,
            push_threshold: PUSH_THRESHOLD,
            boundary: BoundaryRule::Center,
        }
    }
}

impl ArenaConfig {
    /// Largest admissible x for a robot's own move
    pub fn max_x(&self) -> f32 {
        self.field_width - self.robot_size
    }

    /// Largest admissible y for a robot's own move
    pub fn max_y(&self) -> f32 {
        self.field_height - self.robot_size
    }

    /// Arena radius after `elapsed` match time, never below `min_radius`
    pub fn radius_after(&self, elapsed: Duration) -> f32 {
        if self.shrink_rate <= 0.0 {
            return self.radius;
        }
        let shrunk = self.radius - self.shrink_rate * elapsed.as_secs_f32();
        shrunk.max(self.min_radius.min(self.radius))
    }
}

/// Runtime settings for the network layer
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// A session that sends nothing for this long is disconnected
    pub read_timeout: Duration,
    /// Upper bound on a single outbound frame write
    pub write_timeout: Duration,
    /// Outbound packets buffered per session before new ones are dropped
    pub send_queue: usize,
    pub arena: ArenaConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(1),
            send_queue: 32,
            arena: ArenaConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
