use log::{debug, info};
use shared::{Packet, RobotId, RobotPosition};
use std::time::{Duration, Instant};

use crate::config::ArenaConfig;
use crate::physics::{self, PushedAxes, Vector2};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Robot {
    pub id: RobotId,
    pub position: Vector2,
    pub alive: bool,
}

impl Robot {
    pub fn new(id: RobotId) -> Self {
        let (x, y) = id.start_position();
        Self {
            id,
            position: Vector2::new(x, y),
            alive: true,
        }
    }

    pub fn to_wire(&self) -> RobotPosition {
        RobotPosition {
            x: self.position.x,
            y: self.position.y,
            alive: self.alive,
        }
    }
}

/// How a single position update was resolved
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveResult {
    /// The proposed position became the robot's new position
    Committed,
    /// The mover ran into the opponent and stayed put; the opponent was pushed
    Pushed { axes: PushedAxes },
    /// The proposed position was outside the field and was ignored
    OutOfField,
    /// The match is already decided
    MatchOver,
}

/// Final result of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    pub winner: RobotId,
    pub loser: RobotId,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateReport {
    pub result: MoveResult,
    /// Set on the update that decided the match
    pub outcome: Option<MatchOutcome>,
}

/// Authoritative state of both robots and the match
#[derive(Debug, Clone)]
pub struct GameState {
    robots: [Robot; 2],
    arena: ArenaConfig,
    started_at: Option<Instant>,
    outcome: Option<MatchOutcome>,
    updates_processed: u64,
}

impl GameState {
    pub fn new(arena: ArenaConfig) -> Self {
        Self {
            robots: [Robot::new(RobotId::One), Robot::new(RobotId::Two)],
            arena,
            started_at: None,
            outcome: None,
            updates_processed: 0,
        }
    }

    pub fn robot(&self, id: RobotId) -> &Robot {
        &self.robots[id.index()]
    }

    fn robot_mut(&mut self, id: RobotId) -> &mut Robot {
        &mut self.robots[id.index()]
    }

    pub fn arena(&self) -> &ArenaConfig {
        &self.arena
    }

    pub fn outcome(&self) -> Option<MatchOutcome> {
        self.outcome
    }

    pub fn updates_processed(&self) -> u64 {
        self.updates_processed
    }

    /// Starts the match clock. Later calls keep the first start time.
    pub fn start_match(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
            info!("Match started");
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at
            .map(|start| start.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Arena radius at this moment of the match
    pub fn current_radius(&self) -> f32 {
        self.arena.radius_after(self.elapsed())
    }

    /// Applies one position update proposed by `mover`'s client.
    ///
    /// The whole read-modify-write happens on `&mut self`, so callers holding
    /// the state behind a lock get serializable updates.
    pub fn apply_update(&mut self, mover: RobotId, x: f32, y: f32) -> UpdateReport {
        if self.outcome.is_some() {
            return UpdateReport {
                result: MoveResult::MatchOver,
                outcome: None,
            };
        }
        self.updates_processed += 1;

        let proposed = Vector2::new(x, y);
        let opponent = mover.opponent();
        let result = if !physics::in_field(&self.arena, proposed) {
            debug!("Robot {} proposed ({}, {}) outside the field", mover, x, y);
            MoveResult::OutOfField
        } else if physics::check_collision(&self.arena, proposed, self.robot(opponent).position) {
            let axes = self.push(mover, opponent);
            MoveResult::Pushed { axes }
        } else {
            self.robot_mut(mover).position = proposed;
            MoveResult::Committed
        };

        let mut outcome = self.check_boundary(mover);
        if outcome.is_none() {
            if let MoveResult::Pushed { axes } = result {
                if axes.any() {
                    outcome = self.check_boundary(opponent);
                }
            }
        }

        UpdateReport { result, outcome }
    }

    /// Collision Resolver: moves `pushee` away from `pusher`'s current position.
    fn push(&mut self, pusher: RobotId, pushee: RobotId) -> PushedAxes {
        let from = self.robot(pusher).position;
        let target = self.robot(pushee).position;
        let delta = physics::push_delta(&self.arena, from, target);
        let (pushed, axes) = physics::apply_push(&self.arena, target, delta);
        self.robot_mut(pushee).position = pushed;
        debug!(
            "Robot {} pushed robot {} by ({:.2}, {:.2}) to ({:.2}, {:.2})",
            pusher, pushee, delta.x, delta.y, pushed.x, pushed.y
        );
        axes
    }

    /// Boundary Monitor: eliminates `id` if it has left the arena.
    fn check_boundary(&mut self, id: RobotId) -> Option<MatchOutcome> {
        let radius = self.current_radius();
        if !physics::is_outside_arena(&self.arena, self.robot(id).position, radius) {
            return None;
        }

        self.robot_mut(id).alive = false;
        let outcome = MatchOutcome {
            winner: id.opponent(),
            loser: id,
            elapsed: self.elapsed(),
        };
        self.outcome = Some(outcome);
        info!(
            "Robot {} left the arena (radius {:.1}), robot {} wins",
            id, radius, outcome.winner
        );
        Some(outcome)
    }

    pub fn snapshot(&self) -> Packet {
        Packet::WorldSnapshot {
            robot1: self.robot(RobotId::One).to_wire(),
            robot2: self.robot(RobotId::Two).to_wire(),
            arena_radius: self.current_radius(),
        }
    }
}

impl MatchOutcome {
    pub fn to_packet(&self) -> Packet {
        Packet::GameOver {
            winner_id: self.winner.as_u8(),
            elapsed_ms: self.elapsed.as_millis().min(u64::MAX as u128) as u64,
        }
    }
}
