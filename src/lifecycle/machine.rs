//! Dual-role life-cycle state machine
//!
//! The same type runs on both sides of the boundary. The controller role
//! dispatches commands and settles on the matching results; the executor
//! role runs each command against an [`EngineHost`] and answers with exactly
//! one correlated result.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::core::config::LifecycleConfig;
use crate::core::error::{Result, SimError};
use crate::lifecycle::state::{controller_pending, controller_settled, executor_transition, LifecycleState};
use crate::protocol::control::{CommandKind, ControlBody, EngineControlMessage};
use crate::protocol::payload::InitPayload;

/// Sends control messages to the peer context
pub trait PeerTransport {
    fn send(&self, message: EngineControlMessage) -> Result<()>;
}

impl<F> PeerTransport for F
where
    F: Fn(EngineControlMessage) -> Result<()>,
{
    fn send(&self, message: EngineControlMessage) -> Result<()> {
        self(message)
    }
}

/// The engine operations the executor role drives
pub trait EngineHost {
    fn init(&mut self, payload: &InitPayload) -> Result<()>;
    fn start(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    /// Tear down to an uninitialized engine
    fn reset(&mut self) -> Result<()>;
    /// Advance exactly one frame while paused
    fn step(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Controller,
    Executor,
}

#[derive(Debug, Clone)]
struct Outstanding {
    correlation_id: String,
    kind: CommandKind,
    pending: LifecycleState,
    revert_to: LifecycleState,
    sent_at: Instant,
}

pub struct LifecycleMachine<T: PeerTransport> {
    role: Role,
    state: LifecycleState,
    transport: T,
    seq: u64,
    init_timeout: Duration,
    // controller role
    outstanding: Option<Outstanding>,
    // executor role
    host_operator: Option<String>,
    init_payload: Option<InitPayload>,
}

impl<T: PeerTransport> LifecycleMachine<T> {
    fn with_role(role: Role, transport: T, config: &LifecycleConfig) -> Self {
        Self {
            role,
            state: LifecycleState::Idle,
            transport,
            seq: 0,
            init_timeout: Duration::from_millis(config.init_timeout_ms),
            outstanding: None,
            host_operator: None,
            init_payload: None,
        }
    }

    pub fn controller(transport: T, config: &LifecycleConfig) -> Self {
        Self::with_role(Role::Controller, transport, config)
    }

    pub fn executor(transport: T) -> Self {
        Self::with_role(Role::Executor, transport, &LifecycleConfig::default())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Operator that established the session (executor role)
    pub fn host_operator(&self) -> Option<&str> {
        self.host_operator.as_deref()
    }

    /// Command awaiting its result (controller role)
    pub fn outstanding(&self) -> Option<(CommandKind, &str)> {
        self.outstanding
            .as_ref()
            .map(|o| (o.kind, o.correlation_id.as_str()))
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    // ------------------------------------------------------------------
    // Controller role
    // ------------------------------------------------------------------

    /// Send a command and enter its pending state; returns the correlation id
    pub fn dispatch(
        &mut self,
        kind: CommandKind,
        operator_id: &str,
        payload: Option<InitPayload>,
        now: Instant,
    ) -> Result<String> {
        if self.role != Role::Controller {
            return Err(SimError::Validation("dispatch on an executor-role machine".into()));
        }
        let pending = controller_pending(self.state, kind).ok_or_else(|| SimError::InvalidTransition {
            state: self.state.to_string(),
            command: kind.to_string(),
        })?;
        if kind == CommandKind::Init && payload.is_none() {
            return Err(SimError::Validation("init requires a payload".into()));
        }

        let revert_to = match (&self.outstanding, self.state.is_settled()) {
            (_, true) => self.state,
            (Some(prev), false) => prev.revert_to,
            (None, false) => LifecycleState::Idle,
        };
        let correlation_id = Uuid::new_v4().to_string();
        let seq = self.next_seq();
        self.transport.send(EngineControlMessage::command(
            kind,
            seq,
            correlation_id.clone(),
            operator_id,
            payload,
        ))?;

        if let Some(prev) = &self.outstanding {
            tracing::debug!("{} supersedes outstanding {}", kind, prev.kind);
        }
        tracing::info!("Controller: {} -> {} ({})", self.state, pending, kind);
        self.state = pending;
        self.outstanding = Some(Outstanding {
            correlation_id: correlation_id.clone(),
            kind,
            pending,
            revert_to,
            sent_at: now,
        });
        Ok(correlation_id)
    }

    /// Apply a result from the executor; returns the new state if it matched
    pub fn on_result(&mut self, msg: &EngineControlMessage) -> Option<LifecycleState> {
        if self.role != Role::Controller {
            tracing::warn!("Executor-role machine received {}", msg.message_type());
            return None;
        }
        if let Err(e) = msg.validate() {
            tracing::warn!("Dropping invalid control message: {}", e);
            return None;
        }
        let ControlBody::Result { success, error, .. } = &msg.body else {
            tracing::warn!("Controller received command {}", msg.message_type());
            return None;
        };
        let matches = self
            .outstanding
            .as_ref()
            .map_or(false, |o| o.correlation_id == msg.correlation_id);
        if !matches {
            tracing::debug!(
                "Ignoring stale {} (correlation {})",
                msg.message_type(),
                msg.correlation_id
            );
            return None;
        }
        let outstanding = self.outstanding.take()?;

        if *success {
            self.state = controller_settled(outstanding.pending);
            tracing::info!("Controller: {} confirmed, now {}", outstanding.kind, self.state);
        } else {
            // a failed reset-from-stopped leaves the executor torn down in idle
            self.state = if outstanding.kind == CommandKind::Reset && outstanding.pending == LifecycleState::Initializing {
                LifecycleState::Idle
            } else {
                outstanding.revert_to
            };
            tracing::warn!(
                "Controller: {} failed ({}), back to {}",
                outstanding.kind,
                error.as_deref().unwrap_or("no reason given"),
                self.state
            );
        }
        Some(self.state)
    }

    /// Give up on an INIT (or reset-from-stopped) that took too long
    pub fn check_timeout(&mut self, now: Instant) -> Result<()> {
        if self.state != LifecycleState::Initializing {
            return Ok(());
        }
        let Some(outstanding) = &self.outstanding else {
            return Ok(());
        };
        if now.saturating_duration_since(outstanding.sent_at) < self.init_timeout {
            return Ok(());
        }
        let kind = outstanding.kind;
        self.outstanding = None;
        self.state = LifecycleState::Idle;
        tracing::warn!("Controller: {} timed out after {:?}, back to idle", kind, self.init_timeout);
        Err(SimError::Timeout(format!("{} not confirmed within {:?}", kind, self.init_timeout)))
    }

    /// When the pending INIT times out, if one is outstanding
    pub fn init_deadline(&self) -> Option<Instant> {
        if self.state != LifecycleState::Initializing {
            return None;
        }
        self.outstanding.as_ref().map(|o| o.sent_at + self.init_timeout)
    }

    // ------------------------------------------------------------------
    // Executor role
    // ------------------------------------------------------------------

    /// Execute a command and send its result. Returns None if the message
    /// was dropped without a result, otherwise whether it succeeded.
    pub fn on_command(&mut self, msg: &EngineControlMessage, host: &mut dyn EngineHost) -> Option<bool> {
        if self.role != Role::Executor {
            tracing::warn!("Controller-role machine received {}", msg.message_type());
            return None;
        }
        if let Err(e) = msg.validate() {
            tracing::warn!("Dropping invalid control message: {}", e);
            return None;
        }
        let ControlBody::Command {
            kind,
            operator_id,
            payload,
        } = &msg.body
        else {
            tracing::warn!("Executor received result {}", msg.message_type());
            return None;
        };
        let kind = *kind;

        let outcome = self.execute(kind, operator_id, payload.as_ref(), host);
        let success = outcome.is_ok();
        if let Err(e) = &outcome {
            tracing::warn!("Executor: {} from {} failed: {}", kind, operator_id, e);
        }

        let seq = self.next_seq();
        let result = EngineControlMessage::result(
            kind,
            seq,
            msg.correlation_id.clone(),
            outcome.map_err(|e| e.to_string()),
        );
        if let Err(e) = self.transport.send(result) {
            tracing::error!("Executor: could not deliver result for {}: {}", kind, e);
        }
        Some(success)
    }

    fn execute(
        &mut self,
        kind: CommandKind,
        operator_id: &str,
        payload: Option<&InitPayload>,
        host: &mut dyn EngineHost,
    ) -> Result<()> {
        if let Some(host_operator) = &self.host_operator {
            if host_operator != operator_id {
                return Err(SimError::PermissionDenied {
                    operator: operator_id.to_string(),
                });
            }
        }
        let prior = self.state;
        let (transit, settled) = executor_transition(prior, kind).ok_or_else(|| SimError::InvalidTransition {
            state: prior.to_string(),
            command: kind.to_string(),
        })?;

        self.state = transit;
        let stored = self.init_payload.as_ref();
        let mut torn_down = false;
        let run = catch_unwind(AssertUnwindSafe(|| -> Result<()> {
            match kind {
                CommandKind::Init => {
                    host.init(payload.ok_or_else(|| SimError::Validation("init without payload".into()))?)
                }
                CommandKind::Start => host.start(),
                CommandKind::Pause => host.pause(),
                CommandKind::Resume => host.resume(),
                CommandKind::Stop => host.stop(),
                CommandKind::Step => host.step(),
                CommandKind::Reset => {
                    host.reset()?;
                    torn_down = true;
                    if prior == LifecycleState::Stopped {
                        host.init(stored.ok_or(SimError::NotInitialized)?)?;
                    }
                    Ok(())
                }
            }
        }));
        let outcome = match run {
            Ok(outcome) => outcome,
            Err(_) => Err(SimError::Validation(format!("engine panicked during {}", kind))),
        };

        match outcome {
            Ok(()) => {
                self.state = settled;
                match kind {
                    CommandKind::Init => {
                        self.host_operator = Some(operator_id.to_string());
                        self.init_payload = payload.cloned();
                        tracing::info!("Executor: session hosted by {}", operator_id);
                    }
                    CommandKind::Reset if settled == LifecycleState::Idle => {
                        self.host_operator = None;
                        self.init_payload = None;
                    }
                    _ => {}
                }
                tracing::info!("Executor: {} -> {} ({})", prior, self.state, kind);
                Ok(())
            }
            Err(e) if torn_down => {
                // the engine is already uninitialized; only a new INIT can follow
                self.state = LifecycleState::Idle;
                self.host_operator = None;
                self.init_payload = None;
                tracing::error!("Executor: re-init after reset failed, now idle: {}", e);
                Err(e)
            }
            Err(e) => {
                self.state = prior;
                Err(e)
            }
        }
    }
}
