//! Cross-frame queue event records

use serde::{Deserialize, Serialize};

use crate::core::types::{EntityId, EventId, Frame};

/// Kinds of cross-frame events the engine knows how to deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventType {
    /// Deliver `fsm_event_type` to the target member's FSM
    FsmEvent,
    /// Apply `payload.amount` damage to the target
    Damage,
    /// Restore `payload.amount` hp on the target
    Heal,
    /// Attach buff tree `payload.tree` to the target
    ApplyBuff,
    /// Anything else; logged and skipped at delivery
    #[serde(other)]
    Unknown,
}

/// An event scheduled for a future frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEvent {
    pub id: EventId,
    pub insert_frame: Frame,
    pub execute_frame: Frame,
    #[serde(rename = "type")]
    pub event_type: QueueEventType,
    pub processed: bool,
    pub target_entity_id: Option<EntityId>,
    pub fsm_event_type: Option<String>,
    /// Who scheduled it (member id, "router", "engine"...)
    pub source: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl QueueEvent {
    pub fn new(id: EventId, insert_frame: Frame, execute_frame: Frame, event_type: QueueEventType) -> Self {
        Self {
            id,
            insert_frame,
            execute_frame,
            event_type,
            processed: false,
            target_entity_id: None,
            fsm_event_type: None,
            source: String::new(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_target(mut self, target: EntityId) -> Self {
        self.target_entity_id = Some(target);
        self
    }

    pub fn with_fsm_event(mut self, name: impl Into<String>) -> Self {
        self.fsm_event_type = Some(name.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Numeric payload field, if present
    pub fn payload_f64(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(|v| v.as_f64())
    }

    /// String payload field, if present
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// An event requested during a frame, before the engine assigns id and frames
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    /// Frames after the current one (0 = later in this same frame)
    pub delay: Frame,
    pub event_type: QueueEventType,
    pub target: Option<EntityId>,
    pub fsm_event_type: Option<String>,
    pub source: String,
    pub payload: serde_json::Value,
}

impl EventDraft {
    pub fn new(event_type: QueueEventType, delay: Frame) -> Self {
        Self {
            delay,
            event_type,
            target: None,
            fsm_event_type: None,
            source: String::new(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn target(mut self, target: EntityId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn fsm_event(mut self, name: impl Into<String>) -> Self {
        self.fsm_event_type = Some(name.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Materialize at `current` frame with the given id
    pub fn into_event(self, id: EventId, current: Frame) -> QueueEvent {
        QueueEvent {
            id,
            insert_frame: current,
            execute_frame: current + self.delay,
            event_type: self.event_type,
            processed: false,
            target_entity_id: self.target,
            fsm_event_type: self.fsm_event_type,
            source: self.source,
            payload: self.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_type_decodes() {
        let ty: QueueEventType = serde_json::from_str("\"teleport\"").unwrap();
        assert_eq!(ty, QueueEventType::Unknown);
    }

    #[test]
    fn test_draft_materializes_frames() {
        let event = EventDraft::new(QueueEventType::Damage, 3)
            .target(EntityId::from("m2"))
            .source("m1")
            .payload(json!({"amount": 12.0}))
            .into_event(EventId(7), 10);
        assert_eq!(event.insert_frame, 10);
        assert_eq!(event.execute_frame, 13);
        assert_eq!(event.payload_f64("amount"), Some(12.0));
        assert!(!event.processed);
    }
}
