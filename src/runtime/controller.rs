//! Async controller session
//!
//! Owns the controller-role machine and the executor thread. Results are
//! applied as they arrive; a pending INIT is given up on once its deadline
//! passes.

use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::core::config::EngineConfig;
use crate::core::error::{Result, SimError};
use crate::lifecycle::machine::{LifecycleMachine, PeerTransport};
use crate::lifecycle::state::LifecycleState;
use crate::protocol::control::{CommandKind, ControlBody, EngineControlMessage};
use crate::protocol::output::{DomainEventBatch, FrameSnapshot, RenderCommand};
use crate::protocol::payload::InitPayload;
use crate::routing::intent::IntentMessage;
use crate::runtime::executor::{spawn_executor, ExecutorHandle, Inbound, Outbound};

/// Sends commands into the executor's inbox
struct InboundTransport(UnboundedSender<Inbound>);

impl PeerTransport for InboundTransport {
    fn send(&self, message: EngineControlMessage) -> Result<()> {
        self.0
            .send(Inbound::Control(message))
            .map_err(|_| SimError::Protocol("executor thread has exited".into()))
    }
}

/// A settled (or reverted) life-cycle command
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleUpdate {
    pub kind: CommandKind,
    pub state: LifecycleState,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Lifecycle(LifecycleUpdate),
    /// The pending INIT was never confirmed
    TimedOut { kind: CommandKind },
    Snapshot(FrameSnapshot),
    Render(Vec<RenderCommand>),
    Domain(DomainEventBatch),
}

pub struct ControllerSession {
    operator_id: String,
    machine: LifecycleMachine<InboundTransport>,
    executor: ExecutorHandle,
    outbound: UnboundedReceiver<Outbound>,
    backlog: VecDeque<SessionEvent>,
}

impl ControllerSession {
    /// Spawn an executor and attach a controller to it
    pub fn start(config: EngineConfig, operator_id: impl Into<String>) -> Result<Self> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let executor = spawn_executor(config.clone(), out_tx)?;
        let machine = LifecycleMachine::controller(InboundTransport(executor.sender()), &config.lifecycle);
        Ok(Self {
            operator_id: operator_id.into(),
            machine,
            executor,
            outbound: out_rx,
            backlog: VecDeque::new(),
        })
    }

    pub fn operator_id(&self) -> &str {
        &self.operator_id
    }

    pub fn state(&self) -> LifecycleState {
        self.machine.state()
    }

    /// Dispatch a life-cycle command as this session's operator
    pub fn send(&mut self, kind: CommandKind, payload: Option<InitPayload>) -> Result<String> {
        let operator = self.operator_id.clone();
        self.send_as(kind, &operator, payload)
    }

    /// Dispatch on behalf of another operator
    pub fn send_as(&mut self, kind: CommandKind, operator_id: &str, payload: Option<InitPayload>) -> Result<String> {
        self.machine.dispatch(kind, operator_id, payload, Instant::now())
    }

    pub fn send_intent(&self, intent: IntentMessage) -> Result<()> {
        self.executor.send(Inbound::Intent(intent))
    }

    /// Next thing that happened on the executor side; None once it is gone
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        loop {
            let message = match self.machine.init_deadline() {
                Some(deadline) => {
                    let deadline = tokio::time::Instant::from_std(deadline);
                    match tokio::time::timeout_at(deadline, self.outbound.recv()).await {
                        Ok(message) => message,
                        Err(_) => {
                            let kind = self.machine.outstanding().map(|(kind, _)| kind);
                            if let (Err(e), Some(kind)) = (self.machine.check_timeout(Instant::now()), kind) {
                                tracing::warn!("{}", e);
                                return Some(SessionEvent::TimedOut { kind });
                            }
                            continue;
                        }
                    }
                }
                None => self.outbound.recv().await,
            };

            match message? {
                Outbound::Control(result) => {
                    if let Some(update) = self.apply_result(&result) {
                        return Some(SessionEvent::Lifecycle(update));
                    }
                }
                Outbound::Snapshot(snapshot) => return Some(SessionEvent::Snapshot(snapshot)),
                Outbound::Render(commands) => return Some(SessionEvent::Render(commands)),
                Outbound::Domain(batch) => return Some(SessionEvent::Domain(batch)),
            }
        }
    }

    fn apply_result(&mut self, result: &EngineControlMessage) -> Option<LifecycleUpdate> {
        let state = self.machine.on_result(result)?;
        let ControlBody::Result { kind, success, error } = &result.body else {
            return None;
        };
        Some(LifecycleUpdate {
            kind: *kind,
            state,
            success: *success,
            error: error.clone(),
        })
    }

    /// Wait for the outstanding command to settle
    ///
    /// Other events seen meanwhile are kept for `next_event`.
    pub async fn await_result(&mut self) -> Result<LifecycleUpdate> {
        let mut held = VecDeque::new();
        let outcome = loop {
            let Some(event) = self.next_event().await else {
                break Err(SimError::Protocol("executor closed before answering".into()));
            };
            match event {
                SessionEvent::Lifecycle(update) => break Ok(update),
                SessionEvent::TimedOut { kind } => {
                    break Err(SimError::Timeout(format!("{} was not confirmed", kind)));
                }
                other => held.push_back(other),
            }
        };
        held.append(&mut self.backlog);
        self.backlog = held;
        outcome
    }

    /// Dispatch and wait for the result in one go
    pub async fn command(&mut self, kind: CommandKind, payload: Option<InitPayload>) -> Result<LifecycleUpdate> {
        self.send(kind, payload)?;
        self.await_result().await
    }

    /// Stop the executor thread
    pub async fn shutdown(self) -> Result<()> {
        let executor = self.executor;
        tokio::task::spawn_blocking(move || executor.shutdown())
            .await
            .map_err(|e| SimError::Protocol(format!("shutdown task failed: {}", e)))?
    }
}
