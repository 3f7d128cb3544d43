//! Executor thread: the engine and the executor-role machine
//!
//! The engine lives on a dedicated OS thread marked as an executor context.
//! Everything crossing the boundary is an owned, serializable value sent
//! over tokio unbounded channels.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::core::config::EngineConfig;
use crate::core::error::{Result, SimError};
use crate::core::types::Frame;
use crate::engine::{Engine, RunState};
use crate::lifecycle::machine::{LifecycleMachine, PeerTransport};
use crate::protocol::control::EngineControlMessage;
use crate::protocol::output::{DomainEventBatch, FrameSnapshot, RenderCommand};
use crate::routing::intent::IntentMessage;
use crate::runtime::isolation;

/// Longest the running loop sleeps before checking its inbox again
const MAX_IDLE_WAIT: Duration = Duration::from_millis(50);

/// Controller → executor
#[derive(Debug, Clone)]
pub enum Inbound {
    Control(EngineControlMessage),
    Intent(IntentMessage),
    Shutdown,
}

/// Executor → controller
#[derive(Debug, Clone)]
pub enum Outbound {
    Control(EngineControlMessage),
    Snapshot(FrameSnapshot),
    Render(Vec<RenderCommand>),
    Domain(DomainEventBatch),
}

/// Sends results back to the controller
struct OutboundTransport(UnboundedSender<Outbound>);

impl PeerTransport for OutboundTransport {
    fn send(&self, message: EngineControlMessage) -> Result<()> {
        self.0
            .send(Outbound::Control(message))
            .map_err(|_| SimError::Protocol("controller side closed".into()))
    }
}

pub struct ExecutorHandle {
    inbound: UnboundedSender<Inbound>,
    thread: JoinHandle<()>,
}

impl ExecutorHandle {
    pub fn send(&self, message: Inbound) -> Result<()> {
        self.inbound
            .send(message)
            .map_err(|_| SimError::Protocol("executor thread has exited".into()))
    }

    /// A sender for the executor's inbox
    pub fn sender(&self) -> UnboundedSender<Inbound> {
        self.inbound.clone()
    }

    /// Ask the thread to exit and wait for it
    pub fn shutdown(self) -> Result<()> {
        // the thread may already be gone
        let _ = self.inbound.send(Inbound::Shutdown);
        self.thread
            .join()
            .map_err(|_| SimError::Protocol("executor thread panicked".into()))
    }
}

/// Start the executor thread
pub fn spawn_executor(config: EngineConfig, outbound: UnboundedSender<Outbound>) -> Result<ExecutorHandle> {
    config.validate()?;
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let thread = thread::Builder::new()
        .name("arena-executor".to_string())
        .spawn(move || {
            isolation::mark_current_thread();
            match ExecutorLoop::new(config, inbound_rx, outbound) {
                Ok(executor) => executor.run(),
                Err(e) => tracing::error!("Executor could not start: {}", e),
            }
        })?;
    Ok(ExecutorHandle {
        inbound: inbound_tx,
        thread,
    })
}

struct ExecutorLoop {
    engine: Engine,
    machine: LifecycleMachine<OutboundTransport>,
    inbound: UnboundedReceiver<Inbound>,
    outbound: UnboundedSender<Outbound>,
    snapshot_every: u64,
    last_snapshot: Option<Frame>,
}

impl ExecutorLoop {
    fn new(config: EngineConfig, inbound: UnboundedReceiver<Inbound>, outbound: UnboundedSender<Outbound>) -> Result<Self> {
        let snapshot_every = config.output.snapshot_every_n_frames;
        Ok(Self {
            engine: Engine::new(config)?,
            machine: LifecycleMachine::executor(OutboundTransport(outbound.clone())),
            inbound,
            outbound,
            snapshot_every,
            last_snapshot: None,
        })
    }

    fn run(mut self) {
        tracing::info!("Executor thread started");
        loop {
            // drain without blocking
            loop {
                match self.inbound.try_recv() {
                    Ok(message) => {
                        if !self.handle(message) {
                            return self.finish();
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return self.finish(),
                }
            }

            if self.engine.state() == RunState::Running {
                self.engine.pump(Instant::now());
                if !self.emit() {
                    return self.finish();
                }
                let wait = self.engine.frame_loop().time_until_next().min(MAX_IDLE_WAIT);
                self.engine.frame_loop().wait(wait);
            } else {
                // nothing advances until the next message
                match self.inbound.blocking_recv() {
                    Some(message) => {
                        if !self.handle(message) {
                            return self.finish();
                        }
                    }
                    None => return self.finish(),
                }
            }
        }
    }

    /// Apply one inbound message; false means exit
    fn handle(&mut self, message: Inbound) -> bool {
        match message {
            Inbound::Control(msg) => {
                self.machine.on_command(&msg, &mut self.engine);
                if self.engine.state() == RunState::Uninitialized {
                    self.last_snapshot = None;
                }
                self.emit()
            }
            Inbound::Intent(intent) => {
                let outcome = self.engine.route_intent(&intent);
                tracing::debug!("Intent {} -> {:?}", intent.id, outcome);
                self.emit()
            }
            Inbound::Shutdown => false,
        }
    }

    /// Push collected outputs to the controller; false if it is gone
    fn emit(&mut self) -> bool {
        let renders = self.engine.drain_render_commands();
        if !renders.is_empty() && self.outbound.send(Outbound::Render(renders)).is_err() {
            return false;
        }
        let batch = self.engine.drain_domain_batch();
        if !batch.is_empty() && self.outbound.send(Outbound::Domain(batch)).is_err() {
            return false;
        }

        let frame = self.engine.frame();
        let due = self.snapshot_every > 0
            && self.engine.state() != RunState::Uninitialized
            && frame % self.snapshot_every == 0
            && self.last_snapshot != Some(frame);
        if due {
            self.last_snapshot = Some(frame);
            if self.outbound.send(Outbound::Snapshot(self.engine.snapshot())).is_err() {
                return false;
            }
        }
        true
    }

    fn finish(self) {
        tracing::info!(
            "Executor thread exiting at frame {} ({:?})",
            self.engine.frame(),
            self.machine.state()
        );
    }
}
