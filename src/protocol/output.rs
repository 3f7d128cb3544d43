//! Presentation-facing outputs: frame snapshots, render commands, domain events

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::types::{ControllerId, EntityId, Frame, Vec2};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub current: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSnapshot {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub member_type: String,
    pub name: String,
    pub position: Vec2,
    pub camp_id: String,
    pub team_id: String,
    pub hp: Pool,
    pub mp: Pool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillSnapshot {
    pub id: String,
    pub name: String,
    pub ready: bool,
    pub remaining_frames: Frame,
}

/// Extra detail only sent to the controller bound to the member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDetail {
    #[serde(flatten)]
    pub summary: MemberSnapshot,
    pub state: String,
    pub target_id: Option<EntityId>,
    pub alive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerView {
    pub bound_entity_id: EntityId,
    pub bound_entity_detail: Option<MemberDetail>,
    pub bound_entity_skills: Vec<SkillSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub frame_number: Frame,
    /// Milliseconds spent running (paused time excluded)
    pub run_time: u64,
    pub fps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSnapshot {
    pub frame_number: Frame,
    /// Logical time of the frame in milliseconds
    pub timestamp: u64,
    pub engine: EngineStats,
    pub members: Vec<MemberSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_controller: Option<BTreeMap<ControllerId, ControllerView>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    Action,
}

/// Fire-and-forget visual cue emitted by a capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderCommand {
    #[serde(rename = "type")]
    pub kind: RenderKind,
    pub entity_id: EntityId,
    pub name: String,
    pub seq: u64,
    pub ts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Gameplay-level notification about one member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEventKind {
    MoveStart { x: f32, y: f32 },
    MoveStop,
    #[serde(rename_all = "camelCase")]
    CastStart { skill_id: String },
    #[serde(rename_all = "camelCase")]
    CastProgress { skill_id: String, elapsed_frames: Frame },
    #[serde(rename_all = "camelCase")]
    CastComplete { skill_id: String, succeeded: bool },
    Hit { amount: f64, source: Option<EntityId> },
    Death,
    #[serde(rename_all = "camelCase")]
    SkillAvailable { skill_id: String, available: bool },
    CameraFollow,
    Custom { name: String },
}

impl DomainEventKind {
    pub fn name(&self) -> &str {
        match self {
            DomainEventKind::MoveStart { .. } => "move_start",
            DomainEventKind::MoveStop => "move_stop",
            DomainEventKind::CastStart { .. } => "cast_start",
            DomainEventKind::CastProgress { .. } => "cast_progress",
            DomainEventKind::CastComplete { .. } => "cast_complete",
            DomainEventKind::Hit { .. } => "hit",
            DomainEventKind::Death => "death",
            DomainEventKind::SkillAvailable { .. } => "skill_available",
            DomainEventKind::CameraFollow => "camera_follow",
            DomainEventKind::Custom { name } => name,
        }
    }
}

/// A domain event as produced inside the simulation, before projection
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDomainEvent {
    pub entity_id: EntityId,
    pub frame: Frame,
    pub kind: DomainEventKind,
}

/// A domain event addressed to the controller bound to its member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerEvent {
    pub controller_id: ControllerId,
    pub entity_id: EntityId,
    #[serde(flatten)]
    pub kind: DomainEventKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainEventBatch {
    pub frame: Frame,
    pub events: Vec<ControllerEvent>,
}

impl DomainEventBatch {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            events: Vec::new(),
        }
    }

    /// Add unless an identical event is already in the batch
    pub fn push_unique(&mut self, event: ControllerEvent) -> bool {
        if self.events.contains(&event) {
            return false;
        }
        self.events.push(event);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
