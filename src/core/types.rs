//! Core type definitions used throughout the codebase

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Logical simulation frame (the unit of determinism)
pub type Frame = u64;

/// Identifier of a simulated member, supplied by the INIT templates
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of a controller (player seat, AI seat, spectator...)
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerId(pub String);

impl ControllerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ControllerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of a queued cross-frame event
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

/// Handle of an outstanding asynchronous frame task
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

/// Identifier of a live behavior-tree instance
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeInstanceId(pub u64);

/// 2D position
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0001 {
            Self { x: self.x / len, y: self.y / len }
        } else {
            Self::default()
        }
    }

    /// Step towards `target` by at most `max_step`; returns the new position
    /// and whether the target was reached
    pub fn step_towards(&self, target: Vec2, max_step: f32) -> (Vec2, bool) {
        let remaining = self.distance(&target);
        if remaining <= max_step || remaining <= 0.0001 {
            return (target, true);
        }
        let dir = (target - *self).normalize();
        (*self + dir * max_step, false)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self { x: self.x + rhs.x, y: self.y + rhs.y }
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self { x: self.x - rhs.x, y: self.y - rhs.y }
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self { x: self.x * rhs, y: self.y * rhs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_display_and_serde() {
        let id = EntityId::from("m-1");
        assert_eq!(format!("{}", id), "m-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"m-1\"");
    }

    #[test]
    fn test_step_towards_reaches_target() {
        let start = Vec2::new(0.0, 0.0);
        let (pos, arrived) = start.step_towards(Vec2::new(3.0, 4.0), 2.5);
        assert!(!arrived);
        assert!((pos.distance(&Vec2::new(1.5, 2.0))) < 0.001);

        let (pos, arrived) = pos.step_towards(Vec2::new(3.0, 4.0), 10.0);
        assert!(arrived);
        assert_eq!(pos, Vec2::new(3.0, 4.0));
    }
}
