//! Controller intents: requests to drive a bound entity

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SimError};
use crate::core::types::{ControllerId, EntityId};
use crate::entity::fsm::MemberEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IntentType {
    Bind,
    Unbind,
    Move,
    CastSkill,
    SelectTarget,
    Stop,
    #[serde(other)]
    Unknown,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::Bind => "bind",
            IntentType::Unbind => "unbind",
            IntentType::Move => "move",
            IntentType::CastSkill => "castSkill",
            IntentType::SelectTarget => "selectTarget",
            IntentType::Stop => "stop",
            IntentType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentMessage {
    pub id: String,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub intent_type: IntentType,
    pub controller_id: ControllerId,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// A validated intent
#[derive(Debug, Clone, PartialEq)]
pub enum IntentCommand {
    Bind { entity: EntityId },
    Unbind,
    Deliver(MemberEvent),
}

impl IntentMessage {
    pub fn new(
        id: impl Into<String>,
        controller_id: impl Into<ControllerId>,
        intent_type: IntentType,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp: 0,
            intent_type,
            controller_id: controller_id.into(),
            data,
        }
    }

    fn field_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    fn field_f32(&self, key: &str) -> Result<f32> {
        self.data
            .get(key)
            .and_then(|v| v.as_f64())
            .filter(|v| v.is_finite())
            .map(|v| v as f32)
            .ok_or_else(|| SimError::Validation(format!("{} intent needs numeric '{}'", self.intent_type.as_str(), key)))
    }

    /// Check the shape and translate into what the router acts on
    pub fn parse(&self) -> Result<IntentCommand> {
        if self.id.trim().is_empty() {
            return Err(SimError::Validation("intent without id".into()));
        }
        if self.controller_id.as_str().trim().is_empty() {
            return Err(SimError::Validation(format!("intent {} without controllerId", self.id)));
        }

        match self.intent_type {
            IntentType::Bind => match self.field_str("entityId") {
                Some(entity) if !entity.is_empty() => Ok(IntentCommand::Bind {
                    entity: EntityId::from(entity),
                }),
                _ => Err(SimError::Validation("bind intent needs 'entityId'".into())),
            },
            IntentType::Unbind => Ok(IntentCommand::Unbind),
            IntentType::Move => Ok(IntentCommand::Deliver(MemberEvent::MoveTo {
                x: self.field_f32("x")?,
                y: self.field_f32("y")?,
            })),
            IntentType::CastSkill => match self.field_str("skillId") {
                Some(skill) if !skill.is_empty() => Ok(IntentCommand::Deliver(MemberEvent::CastSkill {
                    skill_id: skill.to_string(),
                    target: self.field_str("targetId").map(EntityId::from),
                })),
                _ => Err(SimError::Validation("castSkill intent needs 'skillId'".into())),
            },
            IntentType::SelectTarget => match self.data.get("targetId") {
                None | Some(serde_json::Value::Null) => {
                    Ok(IntentCommand::Deliver(MemberEvent::SelectTarget { target: None }))
                }
                Some(serde_json::Value::String(t)) => Ok(IntentCommand::Deliver(MemberEvent::SelectTarget {
                    target: Some(EntityId::from(t.as_str())),
                })),
                Some(_) => Err(SimError::Validation("selectTarget 'targetId' must be a string or null".into())),
            },
            IntentType::Stop => Ok(IntentCommand::Deliver(MemberEvent::Stop)),
            IntentType::Unknown => Err(SimError::UnknownType(format!("intent {}", self.id))),
        }
    }
}
