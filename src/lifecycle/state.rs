//! Life-cycle states and the transition tables of both roles

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::protocol::control::CommandKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Idle,
    Initializing,
    Ready,
    Starting,
    Running,
    Pausing,
    Paused,
    Resuming,
    Stopping,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Ready => "ready",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Pausing => "pausing",
            LifecycleState::Paused => "paused",
            LifecycleState::Resuming => "resuming",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        }
    }

    /// Waiting for the peer to confirm a command
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            LifecycleState::Initializing
                | LifecycleState::Starting
                | LifecycleState::Pausing
                | LifecycleState::Resuming
                | LifecycleState::Stopping
        )
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Controller side: the pending state entered when `kind` is dispatched,
/// or None if the command is not allowed from `state`.
///
/// STEP keeps the state as is; RESET outside `stopped` goes straight to idle.
pub fn controller_pending(state: LifecycleState, kind: CommandKind) -> Option<LifecycleState> {
    use LifecycleState::*;
    match (state, kind) {
        (Idle, CommandKind::Init) => Some(Initializing),
        (Ready, CommandKind::Start) => Some(Starting),
        (Running | Starting | Resuming, CommandKind::Pause) => Some(Pausing),
        (Paused, CommandKind::Resume) => Some(Resuming),
        (Paused, CommandKind::Step) => Some(Paused),
        (
            Ready | Starting | Running | Pausing | Paused | Resuming,
            CommandKind::Stop,
        ) => Some(Stopping),
        (
            Ready | Starting | Running | Pausing | Paused | Resuming | Stopping,
            CommandKind::Reset,
        ) => Some(Idle),
        (Stopped, CommandKind::Reset) => Some(Initializing),
        _ => None,
    }
}

/// Controller side: where a pending state settles on a successful result
pub fn controller_settled(pending: LifecycleState) -> LifecycleState {
    use LifecycleState::*;
    match pending {
        Initializing => Ready,
        Starting => Running,
        Pausing => Paused,
        Resuming => Running,
        Stopping => Stopped,
        settled => settled,
    }
}

/// Executor side: `(transit, settled)` for `kind` from `state`, or None if
/// not allowed. The executor only rests in settled states.
pub fn executor_transition(state: LifecycleState, kind: CommandKind) -> Option<(LifecycleState, LifecycleState)> {
    use LifecycleState::*;
    match (state, kind) {
        (Idle, CommandKind::Init) => Some((Initializing, Ready)),
        (Ready, CommandKind::Start) => Some((Starting, Running)),
        (Running, CommandKind::Pause) => Some((Pausing, Paused)),
        (Paused, CommandKind::Resume) => Some((Resuming, Running)),
        (Paused, CommandKind::Step) => Some((Paused, Paused)),
        (Ready | Running | Paused, CommandKind::Stop) => Some((Stopping, Stopped)),
        (Ready | Running | Paused, CommandKind::Reset) => Some((Idle, Idle)),
        (Stopped, CommandKind::Reset) => Some((Initializing, Ready)),
        _ => None,
    }
}
