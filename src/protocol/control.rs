//! Life-cycle control messages exchanged between controller and executor
//!
//! The typed form ([`EngineControlMessage`]) is what the state machines work
//! with. On the wire it is a single flat JSON object whose `type` field is
//! `CMD_<KIND>` or `RESULT_<KIND>`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::{Result, SimError};
use crate::protocol::payload::InitPayload;

/// Which context sent a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Controller,
    Executor,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Controller => write!(f, "controller"),
            Side::Executor => write!(f, "executor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Init,
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
    Step,
}

impl CommandKind {
    pub const ALL: [CommandKind; 7] = [
        CommandKind::Init,
        CommandKind::Start,
        CommandKind::Pause,
        CommandKind::Resume,
        CommandKind::Stop,
        CommandKind::Reset,
        CommandKind::Step,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Init => "INIT",
            CommandKind::Start => "START",
            CommandKind::Pause => "PAUSE",
            CommandKind::Resume => "RESUME",
            CommandKind::Stop => "STOP",
            CommandKind::Reset => "RESET",
            CommandKind::Step => "STEP",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    pub fn command_type(&self) -> String {
        format!("CMD_{}", self.as_str())
    }

    pub fn result_type(&self) -> String {
        format!("RESULT_{}", self.as_str())
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlBody {
    Command {
        kind: CommandKind,
        operator_id: String,
        /// Only CMD_INIT carries one
        payload: Option<InitPayload>,
    },
    Result {
        kind: CommandKind,
        success: bool,
        error: Option<String>,
    },
}

/// A command or its result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireControlMessage", into = "WireControlMessage")]
pub struct EngineControlMessage {
    pub source_side: Side,
    pub seq: u64,
    pub correlation_id: String,
    pub body: ControlBody,
}

impl EngineControlMessage {
    pub fn command(
        kind: CommandKind,
        seq: u64,
        correlation_id: impl Into<String>,
        operator_id: impl Into<String>,
        payload: Option<InitPayload>,
    ) -> Self {
        Self {
            source_side: Side::Controller,
            seq,
            correlation_id: correlation_id.into(),
            body: ControlBody::Command {
                kind,
                operator_id: operator_id.into(),
                payload,
            },
        }
    }

    pub fn result(
        kind: CommandKind,
        seq: u64,
        correlation_id: impl Into<String>,
        outcome: std::result::Result<(), String>,
    ) -> Self {
        let (success, error) = match outcome {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e)),
        };
        Self {
            source_side: Side::Executor,
            seq,
            correlation_id: correlation_id.into(),
            body: ControlBody::Result {
                kind,
                success,
                error,
            },
        }
    }

    pub fn kind(&self) -> CommandKind {
        match &self.body {
            ControlBody::Command { kind, .. } | ControlBody::Result { kind, .. } => *kind,
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(self.body, ControlBody::Command { .. })
    }

    /// Wire `type` string, e.g. `CMD_START`
    pub fn message_type(&self) -> String {
        match &self.body {
            ControlBody::Command { kind, .. } => kind.command_type(),
            ControlBody::Result { kind, .. } => kind.result_type(),
        }
    }

    /// Shape checks beyond what decoding guarantees
    pub fn validate(&self) -> Result<()> {
        if self.correlation_id.trim().is_empty() {
            return Err(SimError::Validation("empty correlationId".into()));
        }
        match &self.body {
            ControlBody::Command { operator_id, .. } => {
                if self.source_side != Side::Controller {
                    return Err(SimError::Validation(format!(
                        "{} sent by {}",
                        self.message_type(),
                        self.source_side
                    )));
                }
                if operator_id.trim().is_empty() {
                    return Err(SimError::Validation("empty operatorId".into()));
                }
            }
            ControlBody::Result { .. } => {
                if self.source_side != Side::Executor {
                    return Err(SimError::Validation(format!(
                        "{} sent by {}",
                        self.message_type(),
                        self.source_side
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON; malformed input is a protocol error
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SimError::Protocol(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireControlMessage {
    #[serde(rename = "type")]
    message_type: String,
    source_side: Side,
    seq: u64,
    correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    operator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<InitPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TryFrom<WireControlMessage> for EngineControlMessage {
    type Error = String;

    fn try_from(wire: WireControlMessage) -> std::result::Result<Self, Self::Error> {
        let body = if let Some(name) = wire.message_type.strip_prefix("CMD_") {
            let kind = CommandKind::parse(name)
                .ok_or_else(|| format!("unknown command type {}", wire.message_type))?;
            let operator_id = wire
                .operator_id
                .ok_or_else(|| format!("{} without operatorId", wire.message_type))?;
            if kind == CommandKind::Init && wire.payload.is_none() {
                return Err("CMD_INIT without payload".to_string());
            }
            ControlBody::Command {
                kind,
                operator_id,
                payload: wire.payload,
            }
        } else if let Some(name) = wire.message_type.strip_prefix("RESULT_") {
            let kind = CommandKind::parse(name)
                .ok_or_else(|| format!("unknown result type {}", wire.message_type))?;
            let success = wire
                .success
                .ok_or_else(|| format!("{} without success", wire.message_type))?;
            ControlBody::Result {
                kind,
                success,
                error: wire.error,
            }
        } else {
            return Err(format!("unknown message type {}", wire.message_type));
        };

        Ok(Self {
            source_side: wire.source_side,
            seq: wire.seq,
            correlation_id: wire.correlation_id,
            body,
        })
    }
}

impl From<EngineControlMessage> for WireControlMessage {
    fn from(msg: EngineControlMessage) -> Self {
        let message_type = msg.message_type();
        let mut wire = WireControlMessage {
            message_type,
            source_side: msg.source_side,
            seq: msg.seq,
            correlation_id: msg.correlation_id,
            operator_id: None,
            payload: None,
            success: None,
            error: None,
        };
        match msg.body {
            ControlBody::Command {
                operator_id,
                payload,
                ..
            } => {
                wire.operator_id = Some(operator_id);
                wire.payload = payload;
            }
            ControlBody::Result { success, error, .. } => {
                wire.success = Some(success);
                wire.error = error;
            }
        }
        wire
    }
}
