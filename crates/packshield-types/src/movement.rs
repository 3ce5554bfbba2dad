//! Player positions and move notifications.

use serde::{Deserialize, Serialize};

use crate::PlayerId;

/// A point in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Where the player is looking, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub yaw: f32,
    pub pitch: f32,
}

/// Position plus orientation, as carried by an engine move event.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub position: Position,
    pub orientation: Orientation,
}

impl Location {
    /// A location at `(x, y, z)` looking straight ahead.
    pub const fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Position::new(x, y, z),
            orientation: Orientation { yaw: 0.0, pitch: 0.0 },
        }
    }

    /// The same position with a different view direction.
    pub const fn looking(self, yaw: f32, pitch: f32) -> Self {
        Self {
            position: self.position,
            orientation: Orientation { yaw, pitch },
        }
    }
}

/// A move notification from the engine.
///
/// `to` is `None` when the engine could not resolve a destination; such
/// events never count as movement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveEvent {
    pub player: PlayerId,
    pub from: Location,
    pub to: Option<Location>,
}

impl MoveEvent {
    pub fn new(player: PlayerId, from: Location, to: Location) -> Self {
        Self {
            player,
            from,
            to: Some(to),
        }
    }

    /// Returns `true` if any of x, y or z changed.
    ///
    /// Looking around sends move events too; those only change the
    /// orientation and say nothing about whether the client is responsive
    /// to input, so they are ignored here.
    pub fn changes_position(&self) -> bool {
        let Some(to) = self.to else {
            return false;
        };
        let (a, b) = (self.from.position, to.position);
        a.x != b.x || a.y != b.y || a.z != b.z
    }
}
