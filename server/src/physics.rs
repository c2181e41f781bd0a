//! Collision and boundary rules for the arena.
//!
//! Robots are treated as axis-aligned boxes anchored at their position for
//! collision purposes, and as points (optionally inflated by half their size)
//! for the arena boundary test. All functions here are pure; `GameState`
//! decides when to call them.

use crate::config::{ArenaConfig, BoundaryRule};

///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector2 {
    ///Value along the x-axis.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down, matching screen coordinates.
    pub y: f32,
}

impl Vector2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Returns the difference `self - other`.
    pub fn sub(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    ///Returns the distance between two points.
    pub fn distance(&self, other: &Vector2) -> f32 {
        self.sub(other).magnitude()
    }
}

/// Which axes of a pushed robot actually moved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushedAxes {
    pub x: bool,
    pub y: bool,
}

impl PushedAxes {
    pub fn any(&self) -> bool {
        self.x || self.y
    }
}

/// Returns true if `position` lies inside the rectangle a robot's own moves
/// are allowed to reach. Non-finite coordinates are never inside.
pub fn in_field(arena: &ArenaConfig, position: Vector2) -> bool {
    (0.0..=arena.max_x()).contains(&position.x) && (0.0..=arena.max_y()).contains(&position.y)
}

/// Bounding-box proximity test between a proposed position and the
/// opponent's current one.
pub fn check_collision(arena: &ArenaConfig, proposed: Vector2, opponent: Vector2) -> bool {
    (proposed.x - opponent.x).abs() < arena.robot_size
        && (proposed.y - opponent.y).abs() < arena.robot_size
}

/// Displacement to apply to `pushee` when `pusher` runs into it.
///
/// The direction is pusher → pushee; the length is `push_force` scaled down
/// when the two are closer than one unit, so it never exceeds `push_force`.
pub fn push_delta(arena: &ArenaConfig, pusher: Vector2, pushee: Vector2) -> Vector2 {
    let offset = pushee.sub(&pusher);
    let distance = offset.magnitude().max(1.0);
    offset.scale(arena.push_force / distance)
}

/// Applies `delta` to `pushee` axis by axis.
///
/// An axis moves only when its component exceeds `push_threshold` and the
/// resulting coordinate stays inside the field on that axis. Returns the new
/// position together with the axes that moved.
pub fn apply_push(arena: &ArenaConfig, pushee: Vector2, delta: Vector2) -> (Vector2, PushedAxes) {
    let mut result = pushee;
    let mut moved = PushedAxes::default();

    if delta.x.abs() > arena.push_threshold {
        let x = pushee.x + delta.x;
        if (0.0..=arena.max_x()).contains(&x) {
            result.x = x;
            moved.x = true;
        }
    }
    if delta.y.abs() > arena.push_threshold {
        let y = pushee.y + delta.y;
        if (0.0..=arena.max_y()).contains(&y) {
            result.y = y;
            moved.y = true;
        }
    }

    (result, moved)
}

/// Returns true if a robot at `position` has left an arena of `radius`.
///
/// The test is strict: a robot exactly on the rim is still inside.
pub fn is_outside_arena(arena: &ArenaConfig, position: Vector2, radius: f32) -> bool {
    let margin = match arena.boundary {
        BoundaryRule::Center => 0.0,
        BoundaryRule::Body => arena.body_radius,
    };
    position.distance(&arena.center) + margin > radius
}
