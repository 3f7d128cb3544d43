//! Per-member finite state machine
//!
//! State is a plain enum and transitions are a single match over
//! `(state, event)`. Effects that concern behavior trees are returned as
//! [`FsmDirective`]s for the harness to apply; everything else (movement
//! targets, stats, domain events) is applied directly.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::behavior::context::TickEnv;
use crate::behavior::tree::BehaviorTreeDef;
use crate::core::types::{EntityId, Frame};
use crate::entity::member::MemberCore;
use crate::protocol::output::DomainEventKind;
use crate::stats::{adjust_resource, resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberState {
    Idle,
    Moving,
    Casting,
    Dead,
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemberState::Idle => "idle",
            MemberState::Moving => "moving",
            MemberState::Casting => "casting",
            MemberState::Dead => "dead",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberEvent {
    MoveTo { x: f32, y: f32 },
    Stop,
    CastSkill { skill_id: String, target: Option<EntityId> },
    SelectTarget { target: Option<EntityId> },
    PrimaryBehaviorComplete { succeeded: bool },
    /// Movement reached its destination
    Arrived,
    Damage { amount: f64, source: Option<EntityId> },
    Heal { amount: f64 },
    Die,
    /// Named event with no built-in meaning; recorded only
    Custom { name: String },
}

impl MemberEvent {
    pub fn name(&self) -> &str {
        match self {
            MemberEvent::MoveTo { .. } => "move_to",
            MemberEvent::Stop => "stop",
            MemberEvent::CastSkill { .. } => "cast_skill",
            MemberEvent::SelectTarget { .. } => "select_target",
            MemberEvent::PrimaryBehaviorComplete { .. } => "primary_behavior_complete",
            MemberEvent::Arrived => "arrived",
            MemberEvent::Damage { .. } => "damage",
            MemberEvent::Heal { .. } => "heal",
            MemberEvent::Die => "die",
            MemberEvent::Custom { name } => name,
        }
    }

    /// Build from a queue `fsm_event` name and its JSON payload
    pub fn from_named(name: &str, payload: &serde_json::Value) -> Self {
        let f = |key: &str| payload.get(key).and_then(|v| v.as_f64());
        let s = |key: &str| payload.get(key).and_then(|v| v.as_str()).map(EntityId::from);
        match name {
            "move_to" => match (f("x"), f("y")) {
                (Some(x), Some(y)) => MemberEvent::MoveTo {
                    x: x as f32,
                    y: y as f32,
                },
                _ => MemberEvent::Custom { name: name.into() },
            },
            "stop" => MemberEvent::Stop,
            "cast_skill" => match payload.get("skillId").and_then(|v| v.as_str()) {
                Some(skill) => MemberEvent::CastSkill {
                    skill_id: skill.to_string(),
                    target: s("targetId"),
                },
                None => MemberEvent::Custom { name: name.into() },
            },
            "select_target" => MemberEvent::SelectTarget {
                target: s("targetId"),
            },
            "damage" => MemberEvent::Damage {
                amount: f("amount").unwrap_or(0.0),
                source: s("source"),
            },
            "heal" => MemberEvent::Heal {
                amount: f("amount").unwrap_or(0.0),
            },
            "die" => MemberEvent::Die,
            other => MemberEvent::Custom { name: other.into() },
        }
    }
}

/// Behavior-tree work requested by a transition
#[derive(Debug, Clone)]
pub enum FsmDirective {
    StartPrimary(Arc<BehaviorTreeDef>),
    CancelPrimary,
    /// Go back to the member's spawn-time behavior, if it has one
    ResumeBehavior,
    /// Drop the primary tree and every buff
    ClearAll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsmRecord {
    pub frame: Frame,
    pub event: String,
    pub from: MemberState,
    pub to: MemberState,
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveCast {
    skill_id: String,
    started: Frame,
}

#[derive(Debug)]
pub struct MemberFsm {
    state: MemberState,
    history: VecDeque<FsmRecord>,
    history_len: usize,
    casting: Option<ActiveCast>,
}

impl MemberFsm {
    pub fn new(history_len: usize) -> Self {
        Self {
            state: MemberState::Idle,
            history: VecDeque::with_capacity(history_len.min(256)),
            history_len,
            casting: None,
        }
    }

    pub fn state(&self) -> MemberState {
        self.state
    }

    /// Most recent events last
    pub fn history(&self) -> impl Iterator<Item = &FsmRecord> {
        self.history.iter()
    }

    pub fn casting_skill(&self) -> Option<&str> {
        self.casting.as_ref().map(|c| c.skill_id.as_str())
    }

    /// Apply one event. Dead members record it and ignore it.
    pub fn handle(&mut self, event: MemberEvent, core: &mut MemberCore, env: &mut TickEnv<'_>) -> Vec<FsmDirective> {
        let from = self.state;
        let name = event.name().to_string();
        let directives = if from == MemberState::Dead {
            Vec::new()
        } else {
            self.transition(event, core, env)
        };
        self.record(env.frame, name, from);
        directives
    }

    fn transition(&mut self, event: MemberEvent, core: &mut MemberCore, env: &mut TickEnv<'_>) -> Vec<FsmDirective> {
        let frame = env.frame;
        match (self.state, event) {
            (MemberState::Idle | MemberState::Moving, MemberEvent::MoveTo { x, y }) => {
                let dest = crate::core::types::Vec2::new(x, y);
                core.move_target = Some(dest);
                self.state = MemberState::Moving;
                env.effects
                    .emit_domain(&core.id, frame, DomainEventKind::MoveStart { x, y });
                Vec::new()
            }
            (MemberState::Moving, MemberEvent::Stop | MemberEvent::Arrived) => {
                core.move_target = None;
                self.state = MemberState::Idle;
                env.effects
                    .emit_domain(&core.id, frame, DomainEventKind::MoveStop);
                Vec::new()
            }
            (MemberState::Casting, MemberEvent::Stop) => {
                let skill_id = self.finish_cast();
                core.move_target = None;
                env.effects.emit_domain(
                    &core.id,
                    frame,
                    DomainEventKind::CastComplete {
                        skill_id,
                        succeeded: false,
                    },
                );
                vec![FsmDirective::CancelPrimary, FsmDirective::ResumeBehavior]
            }
            (MemberState::Idle | MemberState::Moving, MemberEvent::CastSkill { skill_id, target }) => {
                self.begin_cast(&skill_id, target, core, env)
            }
            (MemberState::Casting, MemberEvent::PrimaryBehaviorComplete { succeeded }) => {
                let skill_id = self.finish_cast();
                env.effects.emit_domain(
                    &core.id,
                    frame,
                    DomainEventKind::CastComplete {
                        skill_id,
                        succeeded,
                    },
                );
                vec![FsmDirective::ResumeBehavior]
            }
            (_, MemberEvent::SelectTarget { target }) => {
                core.target_id = target;
                Vec::new()
            }
            (_, MemberEvent::Damage { amount, source }) => {
                let hp = adjust_resource(core.stats.as_mut(), "hp", -amount.max(0.0));
                env.effects.emit_domain(
                    &core.id,
                    frame,
                    DomainEventKind::Hit {
                        amount,
                        source,
                    },
                );
                if hp <= 0.0 {
                    self.die(core, env)
                } else {
                    Vec::new()
                }
            }
            (_, MemberEvent::Heal { amount }) => {
                adjust_resource(core.stats.as_mut(), "hp", amount.max(0.0));
                Vec::new()
            }
            (_, MemberEvent::Die) => self.die(core, env),
            (state, event) => {
                tracing::debug!("{} ignores {} while {}", core.id, event.name(), state);
                Vec::new()
            }
        }
    }

    fn begin_cast(
        &mut self,
        skill_id: &str,
        target: Option<EntityId>,
        core: &mut MemberCore,
        env: &mut TickEnv<'_>,
    ) -> Vec<FsmDirective> {
        let frame = env.frame;
        let Some(skill) = core.skill(skill_id).cloned() else {
            tracing::warn!("{} has no skill '{}'", core.id, skill_id);
            return Vec::new();
        };
        if !skill.is_ready(frame) {
            tracing::debug!(
                "{} skill '{}' on cooldown for {} more frames",
                core.id,
                skill_id,
                skill.remaining(frame)
            );
            return Vec::new();
        }
        if target.is_some() {
            core.target_id = target;
        }
        if let Some(range) = skill.range {
            let in_range = core
                .target_id
                .as_ref()
                .and_then(|t| env.world.get(t))
                .map_or(false, |t| t.alive && t.position.distance(&core.position) <= range);
            if !in_range {
                tracing::debug!("{} skill '{}' has no target in range", core.id, skill_id);
                return Vec::new();
            }
        }
        let (mp, _) = resource(core.stats.as_ref(), "mp");
        if skill.mp_cost > mp {
            tracing::debug!("{} lacks mp for '{}'", core.id, skill_id);
            return Vec::new();
        }
        let Some(tree) = env.trees.get(&skill.tree) else {
            tracing::warn!("Skill '{}' references unknown tree '{}'", skill_id, skill.tree);
            return Vec::new();
        };

        if skill.mp_cost > 0.0 {
            adjust_resource(core.stats.as_mut(), "mp", -skill.mp_cost);
        }
        if let Some(slot) = core.skill_mut(skill_id) {
            slot.ready_at = frame + slot.cooldown_frames;
        }
        if core.move_target.take().is_some() {
            env.effects
                .emit_domain(&core.id, frame, DomainEventKind::MoveStop);
        }
        self.state = MemberState::Casting;
        self.casting = Some(ActiveCast {
            skill_id: skill_id.to_string(),
            started: frame,
        });
        env.effects.emit_domain(
            &core.id,
            frame,
            DomainEventKind::CastStart {
                skill_id: skill_id.to_string(),
            },
        );
        vec![FsmDirective::StartPrimary(tree)]
    }

    fn finish_cast(&mut self) -> String {
        self.state = MemberState::Idle;
        self.casting
            .take()
            .map(|c| c.skill_id)
            .unwrap_or_default()
    }

    fn die(&mut self, core: &mut MemberCore, env: &mut TickEnv<'_>) -> Vec<FsmDirective> {
        self.state = MemberState::Dead;
        self.casting = None;
        core.alive = false;
        core.move_target = None;
        env.effects
            .emit_domain(&core.id, env.frame, DomainEventKind::Death);
        vec![FsmDirective::ClearAll]
    }

    /// Per-tick notifications: cast progress and skill availability changes
    pub fn on_tick(&mut self, core: &mut MemberCore, env: &mut TickEnv<'_>) {
        let frame = env.frame;
        if let Some(cast) = &self.casting {
            env.effects.emit_domain(
                &core.id,
                frame,
                DomainEventKind::CastProgress {
                    skill_id: cast.skill_id.clone(),
                    elapsed_frames: frame.saturating_sub(cast.started),
                },
            );
        }
        for slot in core.skills.iter_mut() {
            let ready = slot.is_ready(frame);
            if ready != slot.announced_ready {
                slot.announced_ready = ready;
                env.effects.emit_domain(
                    &core.id,
                    frame,
                    DomainEventKind::SkillAvailable {
                        skill_id: slot.id.clone(),
                        available: ready,
                    },
                );
            }
        }
    }

    fn record(&mut self, frame: Frame, event: String, from: MemberState) {
        if self.history_len == 0 {
            return;
        }
        if self.history.len() >= self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(FsmRecord {
            frame,
            event,
            from,
            to: self.state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_named_events() {
        assert_eq!(
            MemberEvent::from_named("move_to", &json!({"x": 1.0, "y": 2.0})),
            MemberEvent::MoveTo { x: 1.0, y: 2.0 }
        );
        assert_eq!(
            MemberEvent::from_named("cast_skill", &json!({"skillId": "bolt", "targetId": "m2"})),
            MemberEvent::CastSkill {
                skill_id: "bolt".into(),
                target: Some(EntityId::from("m2"))
            }
        );
        assert_eq!(
            MemberEvent::from_named("taunt", &serde_json::Value::Null),
            MemberEvent::Custom {
                name: "taunt".into()
            }
        );
        // malformed known names degrade to custom rather than guessing
        assert_eq!(
            MemberEvent::from_named("move_to", &json!({"x": 1.0})).name(),
            "move_to"
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(MemberState::Casting.to_string(), "casting");
    }
}
