//! Engine - composition root of one simulation
//!
//! Owns the world, the event queue, the capability registry and everything
//! else a frame needs. `step_frame` is the only mutator of simulation state
//! and never re-enters itself; capabilities run synchronously inside it.

pub mod frame_loop;

pub use frame_loop::{ClockKind, FrameLoop, PerformanceStats};

use ahash::AHashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::behavior::capability::CapabilityRegistry;
use crate::behavior::context::{EffectSink, TickEnv};
use crate::behavior::tree::TreeLibrary;
use crate::core::config::{EngineConfig, OverflowPolicy};
use crate::core::error::{Result, SimError};
use crate::core::types::{EntityId, EventId, Frame, TaskId};
use crate::entity::fsm::MemberEvent;
use crate::events::queue::EventQueue;
use crate::events::types::{EventDraft, QueueEvent, QueueEventType};
use crate::expression::ExpressionEvaluator;
use crate::lifecycle::machine::EngineHost;
use crate::protocol::output::{
    ControllerEvent, ControllerView, DomainEventBatch, DomainEventKind, EngineStats, FrameSnapshot, MemberDomainEvent,
    MemberSnapshot, RenderCommand, RenderKind,
};
use crate::protocol::payload::InitPayload;
use crate::routing::intent::IntentMessage;
use crate::routing::router::{MessageRouter, RouteOutcome};
use crate::runtime::isolation;
use crate::world::{World, WorldView};

/// Coarse run state of the engine itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Uninitialized,
    Ready,
    Running,
    Paused,
    Stopped,
}

/// What one `step_frame` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    /// The frame that was processed
    pub frame: Frame,
    pub advanced: bool,
    pub processed_events: usize,
    /// Unprocessed events still due at `frame`
    pub pending_events: usize,
    pub pending_tasks: usize,
}

impl StepReport {
    pub fn has_pending(&self) -> bool {
        self.pending_events > 0 || self.pending_tasks > 0
    }
}

/// An outstanding frame task; the frame it was opened on cannot advance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    pub id: TaskId,
    pub frame: Frame,
}

#[derive(Debug)]
struct OpenTask {
    label: String,
    frame: Frame,
}

pub struct Engine {
    config: EngineConfig,
    state: RunState,
    frame: Frame,
    /// Whether the world has been ticked for `frame`
    world_ticked: bool,
    /// Set while a paused engine runs a single requested step
    stepping: bool,
    frame_loop: FrameLoop,
    queue: EventQueue,
    world: World,
    trees: TreeLibrary,
    registry: CapabilityRegistry,
    evaluator: ExpressionEvaluator,
    effects: EffectSink,
    rng: ChaCha8Rng,
    router: MessageRouter,
    tasks: AHashMap<TaskId, OpenTask>,
    next_event_id: u64,
    next_task_id: u64,
    render_seq: u64,
    renders: Vec<RenderCommand>,
    domain_batch: DomainEventBatch,
    run_time: Duration,
    running_since: Option<Instant>,
}

impl Engine {
    /// Build an engine; only allowed inside an executor context
    pub fn new(config: EngineConfig) -> Result<Self> {
        if !isolation::is_isolated() {
            return Err(SimError::ContextViolation);
        }
        config.validate()?;
        Ok(Self {
            frame_loop: FrameLoop::new(config.frame_loop.clone()),
            queue: EventQueue::new(&config.queue),
            config,
            state: RunState::Uninitialized,
            frame: 0,
            world_ticked: false,
            stepping: false,
            world: World::new(),
            trees: TreeLibrary::new(),
            registry: CapabilityRegistry::with_builtins(),
            evaluator: ExpressionEvaluator::new(),
            effects: EffectSink::default(),
            rng: ChaCha8Rng::seed_from_u64(0),
            router: MessageRouter::new(),
            tasks: AHashMap::new(),
            next_event_id: 1,
            next_task_id: 1,
            render_seq: 0,
            renders: Vec::new(),
            domain_batch: DomainEventBatch::new(0),
            run_time: Duration::ZERO,
            running_since: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn evaluator(&self) -> &ExpressionEvaluator {
        &self.evaluator
    }

    pub fn frame_loop(&self) -> &FrameLoop {
        &self.frame_loop
    }

    pub fn frame_loop_mut(&mut self) -> &mut FrameLoop {
        &mut self.frame_loop
    }

    /// Current world picture, for callers outside a frame
    pub fn view(&self) -> WorldView {
        self.world.view()
    }

    pub fn performance(&self) -> PerformanceStats {
        self.frame_loop.performance()
    }

    /// Logical time of the current frame in milliseconds
    pub fn logical_time_ms(&self) -> u64 {
        (self.frame as f64 * self.frame_loop.interval_ms()) as u64
    }

    /// Wall-clock time spent running, paused time excluded
    pub fn run_time(&self) -> Duration {
        match self.running_since {
            Some(since) => self.run_time + since.elapsed(),
            None => self.run_time,
        }
    }

    fn require(&self, allowed: &[RunState], command: &str) -> Result<()> {
        if self.state == RunState::Uninitialized && !allowed.contains(&RunState::Uninitialized) {
            return Err(SimError::NotInitialized);
        }
        if !allowed.contains(&self.state) {
            return Err(SimError::InvalidTransition {
                state: format!("{:?}", self.state).to_lowercase(),
                command: command.to_string(),
            });
        }
        Ok(())
    }

    fn stop_clock(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.run_time += since.elapsed();
        }
    }

    // ------------------------------------------------------------------
    // Queue and tasks
    // ------------------------------------------------------------------

    /// Queue an event relative to the current frame
    pub fn schedule(&mut self, draft: EventDraft) -> Option<EventId> {
        let id = EventId(self.next_event_id);
        self.next_event_id += 1;
        let event = draft.into_event(id, self.frame);
        self.queue.insert(event).then_some(id)
    }

    /// Like [`schedule`](Self::schedule), but hands the rejection back when
    /// the queue is configured with `reject_with_error`
    pub fn try_schedule(&mut self, draft: EventDraft) -> Result<Option<EventId>> {
        let id = EventId(self.next_event_id);
        self.next_event_id += 1;
        let event = draft.into_event(id, self.frame);
        match self.queue.try_insert(event) {
            Ok(()) => Ok(Some(id)),
            Err(SimError::QueueOverflow { .. }) if self.queue.overflow_policy() == OverflowPolicy::DropNewest => {
                tracing::warn!("Event queue full, dropping event {}", id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Open a task that holds the current frame until it ends
    pub fn begin_task(&mut self, label: impl Into<String>) -> TaskHandle {
        let id = TaskId(self.next_task_id);
        self.next_task_id += 1;
        let label = label.into();
        tracing::debug!("Task {} '{}' opened on frame {}", id, label, self.frame);
        self.tasks.insert(
            id,
            OpenTask {
                label,
                frame: self.frame,
            },
        );
        TaskHandle { id, frame: self.frame }
    }

    /// Close a task; false if it was unknown or already closed
    pub fn end_task(&mut self, handle: TaskHandle) -> bool {
        match self.tasks.remove(&handle.id) {
            Some(task) => {
                tracing::debug!("Task {} '{}' closed (opened on frame {})", handle.id, task.label, task.frame);
                true
            }
            None => false,
        }
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.values().filter(|t| t.frame <= self.frame).count()
    }

    // ------------------------------------------------------------------
    // Frame stepping
    // ------------------------------------------------------------------

    /// Process the current frame once
    ///
    /// Due events are delivered (up to the per-frame budget), the world is
    /// ticked once when none remain, collected effects are flushed, and the
    /// frame advances only if nothing is left pending.
    pub fn step_frame(&mut self) -> StepReport {
        let frame = self.frame;
        let active = self.state == RunState::Running || (self.state == RunState::Paused && self.stepping);
        if !active {
            return StepReport {
                frame,
                advanced: false,
                processed_events: 0,
                pending_events: self.queue.pending_for(frame).len(),
                pending_tasks: self.pending_tasks(),
            };
        }

        let view = self.world.view();
        let due = self.queue.pending_for(frame);
        let budget = self.config.frame_loop.max_events_per_frame;
        let mut processed_events = 0;
        for id in due.into_iter().take(budget) {
            let Some(event) = self.queue.get(id).cloned() else {
                continue;
            };
            let mut env = TickEnv {
                frame,
                registry: &self.registry,
                trees: &self.trees,
                world: &view,
                evaluator: &mut self.evaluator,
                effects: &mut self.effects,
                rng: &mut self.rng,
            };
            deliver_queue_event(&mut self.world, &event, &mut env);
            self.queue.mark_as_processed(id);
            processed_events += 1;
        }

        if !self.world_ticked && !self.queue.has_pending(frame) {
            let mut env = TickEnv {
                frame,
                registry: &self.registry,
                trees: &self.trees,
                world: &view,
                evaluator: &mut self.evaluator,
                effects: &mut self.effects,
                rng: &mut self.rng,
            };
            self.world.tick(&mut env);
            self.world_ticked = true;
        }

        self.flush_effects();

        let pending_events = self.queue.pending_for(frame).len();
        let pending_tasks = self.pending_tasks();
        let advanced = self.world_ticked && pending_events == 0 && pending_tasks == 0;
        if advanced {
            self.frame += 1;
            self.world_ticked = false;
            let interval = self.config.queue.snapshot_interval;
            if interval > 0 && self.frame % interval == 0 {
                self.queue.snapshot(self.frame);
            }
        } else {
            tracing::trace!(
                "Frame {} held: {} events, {} tasks pending",
                frame,
                pending_events,
                pending_tasks
            );
        }

        StepReport {
            frame,
            advanced,
            processed_events,
            pending_events,
            pending_tasks,
        }
    }

    /// Drive `step_frame` from wall-clock time; returns the number of steps
    pub fn pump(&mut self, now: Instant) -> usize {
        if self.state != RunState::Running {
            return 0;
        }
        self.frame_loop.accumulate(now);
        let mut steps = 0;
        while self.frame_loop.try_consume_interval() {
            let report = self.step_frame();
            self.frame_loop.record_frame(Instant::now());
            steps += 1;
            if !self.frame_loop.continue_after(&report) {
                break;
            }
        }
        steps
    }

    /// Apply everything capabilities and deliveries asked for this step
    fn flush_effects(&mut self) {
        let effects = self.effects.take();
        if effects.is_empty() {
            return;
        }

        for draft in effects.drafts {
            self.schedule(draft);
        }

        if !effects.damage_areas.is_empty() {
            let view = self.world.view();
            for request in effects.damage_areas {
                let hits: Vec<EntityId> = view
                    .within_radius(request.center, request.radius)
                    .into_iter()
                    .filter(|m| m.alive && m.id != request.source)
                    .filter(|m| request.include_allies || m.camp_id != request.source_camp)
                    .map(|m| m.id.clone())
                    .collect();
                tracing::debug!(
                    "{} area damage {:.1} at ({:.1}, {:.1}) r={:.1} hits {}",
                    request.source,
                    request.amount,
                    request.center.x,
                    request.center.y,
                    request.radius,
                    hits.len()
                );
                for target in hits {
                    self.schedule(
                        EventDraft::new(QueueEventType::Damage, request.delay)
                            .target(target)
                            .source(request.source.as_str())
                            .payload(json!({ "amount": request.amount, "source": request.source })),
                    );
                }
            }
        }

        let ts = self.logical_time_ms();
        for render in effects.renders {
            self.render_seq += 1;
            self.renders.push(RenderCommand {
                kind: RenderKind::Action,
                entity_id: render.entity_id,
                name: render.name,
                seq: self.render_seq,
                ts,
                params: render.params,
            });
        }

        for event in effects.domain {
            self.project_domain(event);
        }
    }

    /// Address a member's domain event to the controller bound to it
    fn project_domain(&mut self, event: MemberDomainEvent) {
        let Some(controller) = self.router.bindings().controller_for(&event.entity_id).cloned() else {
            return;
        };
        if self.domain_batch.is_empty() {
            self.domain_batch.frame = event.frame;
        }
        self.domain_batch.push_unique(ControllerEvent {
            controller_id: controller,
            entity_id: event.entity_id,
            kind: event.kind,
        });
    }

    // ------------------------------------------------------------------
    // Intents and outputs
    // ------------------------------------------------------------------

    pub fn route_intent(&mut self, intent: &IntentMessage) -> RouteOutcome {
        let view = self.world.view();
        let mut env = TickEnv {
            frame: self.frame,
            registry: &self.registry,
            trees: &self.trees,
            world: &view,
            evaluator: &mut self.evaluator,
            effects: &mut self.effects,
            rng: &mut self.rng,
        };
        let outcome = self.router.process_message(intent, &mut self.world, &mut env);

        for (controller, entity) in self.router.take_camera_follows() {
            if self.domain_batch.is_empty() {
                self.domain_batch.frame = self.frame;
            }
            self.domain_batch.push_unique(ControllerEvent {
                controller_id: controller,
                entity_id: entity,
                kind: DomainEventKind::CameraFollow,
            });
        }
        outcome
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        let members: Vec<MemberSnapshot> = self.world.members().par_iter().map(|m| m.core.snapshot()).collect();

        let pairs = self.router.bindings().pairs();
        let by_controller = (!pairs.is_empty()).then(|| {
            pairs
                .into_iter()
                .map(|(controller, entity)| {
                    let member = self.world.get(entity);
                    let view = ControllerView {
                        bound_entity_id: entity.clone(),
                        bound_entity_detail: member.map(|m| m.detail()),
                        bound_entity_skills: member
                            .map(|m| m.core.skills.iter().map(|s| s.snapshot(self.frame)).collect())
                            .unwrap_or_default(),
                    };
                    (controller.clone(), view)
                })
                .collect::<BTreeMap<_, _>>()
        });

        FrameSnapshot {
            frame_number: self.frame,
            timestamp: self.logical_time_ms(),
            engine: EngineStats {
                frame_number: self.frame,
                run_time: self.run_time().as_millis() as u64,
                fps: self.frame_loop.average_fps(),
            },
            members,
            by_controller,
        }
    }

    pub fn drain_render_commands(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.renders)
    }

    /// Take the projected domain events collected so far
    pub fn drain_domain_batch(&mut self) -> DomainEventBatch {
        std::mem::replace(&mut self.domain_batch, DomainEventBatch::new(self.frame))
    }

    fn teardown(&mut self) {
        self.world.clear();
        self.queue.clear();
        self.router.clear_bindings();
        self.tasks.clear();
        self.evaluator.clear();
        self.effects.take();
        self.renders.clear();
        self.domain_batch = DomainEventBatch::new(0);
        self.trees = TreeLibrary::new();
        self.frame_loop.stop();
        self.frame = 0;
        self.world_ticked = false;
        self.stepping = false;
        self.run_time = Duration::ZERO;
        self.running_since = None;
    }
}

/// Turn one due queue event into whatever its type means
fn deliver_queue_event(world: &mut World, event: &QueueEvent, env: &mut TickEnv<'_>) {
    let Some(target) = event.target_entity_id.as_ref() else {
        tracing::warn!("Queue event {} ({:?}) has no target, skipped", event.id, event.event_type);
        return;
    };

    let member_event = match event.event_type {
        QueueEventType::FsmEvent => match &event.fsm_event_type {
            Some(name) => MemberEvent::from_named(name, &event.payload),
            None => {
                tracing::warn!("fsm_event {} without an event name, skipped", event.id);
                return;
            }
        },
        QueueEventType::Damage => MemberEvent::Damage {
            amount: event.payload_f64("amount").unwrap_or(0.0),
            source: event.payload_str("source").map(EntityId::from),
        },
        QueueEventType::Heal => MemberEvent::Heal {
            amount: event.payload_f64("amount").unwrap_or(0.0),
        },
        QueueEventType::ApplyBuff => {
            let Some(tree_id) = event.payload_str("tree") else {
                tracing::warn!("apply_buff {} without a tree, skipped", event.id);
                return;
            };
            match env.trees.get(tree_id) {
                Some(def) => {
                    if let Err(e) = world.attach_buff(target, def, env.registry) {
                        tracing::warn!("apply_buff {} on {}: {}", tree_id, target, e);
                    }
                }
                None => tracing::warn!("apply_buff {}: unknown tree '{}'", event.id, tree_id),
            }
            return;
        }
        QueueEventType::Unknown => {
            tracing::warn!("Queue event {} has an unknown type, skipped", event.id);
            return;
        }
    };

    if !world.deliver(target, member_event, env) {
        tracing::debug!("Queue event {} target {} no longer exists", event.id, target);
    }
}

impl EngineHost for Engine {
    fn init(&mut self, payload: &InitPayload) -> Result<()> {
        self.require(&[RunState::Uninitialized], "init")?;
        self.trees = TreeLibrary::from_defs(payload.behavior_trees.iter().cloned());
        self.rng = ChaCha8Rng::seed_from_u64(payload.seed);
        let history_len = self.config.output.fsm_history_len;
        if let Err(e) = self
            .world
            .populate(payload, &self.trees, &self.registry, history_len)
        {
            self.teardown();
            return Err(e);
        }
        self.frame = 0;
        self.state = RunState::Ready;
        tracing::info!(
            "Engine initialized: {} members, {} trees, seed {}",
            self.world.len(),
            self.trees.len(),
            payload.seed
        );
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.require(&[RunState::Ready], "start")?;
        let now = Instant::now();
        self.frame_loop.start(now);
        self.running_since = Some(now);
        self.state = RunState::Running;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.require(&[RunState::Running], "pause")?;
        self.frame_loop.pause();
        self.stop_clock();
        self.state = RunState::Paused;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.require(&[RunState::Paused], "resume")?;
        let now = Instant::now();
        self.frame_loop.resume(now);
        self.running_since = Some(now);
        self.state = RunState::Running;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.require(&[RunState::Ready, RunState::Running, RunState::Paused], "stop")?;
        self.frame_loop.stop();
        self.stop_clock();
        self.state = RunState::Stopped;
        tracing::info!("Engine stopped at frame {}", self.frame);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.teardown();
        self.state = RunState::Uninitialized;
        tracing::info!("Engine reset");
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        self.require(&[RunState::Paused], "step")?;
        self.frame_loop.step();
        while self.frame_loop.take_step() {
            self.stepping = true;
            let report = self.step_frame();
            self.stepping = false;
            tracing::debug!("Single step processed frame {} (advanced: {})", report.frame, report.advanced);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::isolation::run_isolated;

    fn payload() -> InitPayload {
        serde_json::from_value(json!({
            "seed": 7,
            "sides": [
                {"campId": "red", "teams": [{"teamId": "r1", "members": [
                    {"id": "a", "name": "A", "position": {"x": 0.0, "y": 0.0},
                     "stats": {"hp.current": 100.0, "hp.max": 100.0}}
                ]}]},
                {"campId": "blue", "teams": [{"teamId": "b1", "members": [
                    {"id": "b", "name": "B", "position": {"x": 1.0, "y": 0.0},
                     "stats": {"hp.current": 50.0, "hp.max": 50.0}}
                ]}]}
            ]
        }))
        .unwrap()
    }

    fn running_engine() -> Engine {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        engine.init(&payload()).unwrap();
        engine.start().unwrap();
        engine
    }

    #[test]
    fn test_new_requires_isolation() {
        let err = Engine::new(EngineConfig::default()).err().unwrap();
        assert!(matches!(err, SimError::ContextViolation));
        assert!(run_isolated("engine-test", || Engine::new(EngineConfig::default()).is_ok()).unwrap());
    }

    #[test]
    fn test_frame_advances_once_per_step() {
        run_isolated("engine-test", || {
            let mut engine = running_engine();
            for expected in 0..5 {
                let report = engine.step_frame();
                assert_eq!(report.frame, expected);
                assert!(report.advanced);
            }
            assert_eq!(engine.frame(), 5);
        })
        .unwrap();
    }

    #[test]
    fn test_step_is_noop_unless_running() {
        run_isolated("engine-test", || {
            let mut engine = Engine::new(EngineConfig::default()).unwrap();
            engine.init(&payload()).unwrap();
            let report = engine.step_frame();
            assert!(!report.advanced);
            assert_eq!(engine.frame(), 0);
        })
        .unwrap();
    }

    #[test]
    fn test_queue_damage_delivered_on_its_frame() {
        run_isolated("engine-test", || {
            let mut engine = running_engine();
            engine
                .schedule(
                    EventDraft::new(QueueEventType::Damage, 2)
                        .target(EntityId::from("b"))
                        .payload(json!({"amount": 20.0, "source": "a"})),
                )
                .unwrap();
            engine.step_frame();
            engine.step_frame();
            let hp = |e: &Engine| e.world().get(&EntityId::from("b")).unwrap().core.snapshot().hp.current;
            assert_eq!(hp(&engine), 50.0);
            let report = engine.step_frame();
            assert_eq!(report.processed_events, 1);
            assert_eq!(hp(&engine), 30.0);
        })
        .unwrap();
    }

    #[test]
    fn test_open_task_holds_frame() {
        run_isolated("engine-test", || {
            let mut engine = running_engine();
            let task = engine.begin_task("load");
            let report = engine.step_frame();
            assert!(!report.advanced);
            assert_eq!(report.pending_tasks, 1);
            // the world was still ticked exactly once
            let report = engine.step_frame();
            assert!(!report.advanced);
            assert!(engine.end_task(task));
            assert!(!engine.end_task(task));
            assert!(engine.step_frame().advanced);
            assert_eq!(engine.frame(), 1);
        })
        .unwrap();
    }

    #[test]
    fn test_event_budget_holds_frame() {
        run_isolated("engine-test", || {
            let mut config = EngineConfig::default();
            config.frame_loop.max_events_per_frame = 1;
            let mut engine = Engine::new(config).unwrap();
            engine.init(&payload()).unwrap();
            engine.start().unwrap();
            for _ in 0..3 {
                engine.schedule(EventDraft::new(QueueEventType::Heal, 0).target(EntityId::from("a")));
            }
            let reports: Vec<StepReport> = (0..3).map(|_| engine.step_frame()).collect();
            assert_eq!(reports[0].pending_events, 2);
            assert!(!reports[0].advanced);
            assert!(!reports[1].advanced);
            assert!(reports[2].advanced);
            assert!(reports.iter().all(|r| r.frame == 0));
        })
        .unwrap();
    }

    #[test]
    fn test_unknown_queue_type_never_blocks() {
        run_isolated("engine-test", || {
            let mut engine = running_engine();
            engine.schedule(EventDraft::new(QueueEventType::Unknown, 0).target(EntityId::from("a")));
            let report = engine.step_frame();
            assert!(report.advanced);
            assert_eq!(report.processed_events, 1);
        })
        .unwrap();
    }

    #[test]
    fn test_reset_tears_down() {
        run_isolated("engine-test", || {
            let mut engine = running_engine();
            engine.step_frame();
            engine.stop().unwrap();
            engine.reset().unwrap();
            assert_eq!(engine.state(), RunState::Uninitialized);
            assert!(engine.world().is_empty());
            assert_eq!(engine.frame(), 0);
            assert!(matches!(engine.start(), Err(SimError::NotInitialized)));
        })
        .unwrap();
    }

    #[test]
    fn test_paused_step_runs_one_frame() {
        run_isolated("engine-test", || {
            let mut engine = running_engine();
            engine.pause().unwrap();
            assert!(!engine.step_frame().advanced);
            engine.step().unwrap();
            assert_eq!(engine.frame(), 1);
            assert_eq!(engine.state(), RunState::Paused);
        })
        .unwrap();
    }

    #[test]
    fn test_snapshot_lists_members() {
        run_isolated("engine-test", || {
            let engine = running_engine();
            let snapshot = engine.snapshot();
            assert_eq!(snapshot.members.len(), 2);
            assert!(snapshot.by_controller.is_none());
            let value = serde_json::to_value(&snapshot).unwrap();
            assert_eq!(value["members"][1]["hp"]["max"], json!(50.0));
        })
        .unwrap();
    }

    #[test]
    fn test_long_run_keeps_queue_capacity() {
        run_isolated("engine-test", || {
            let mut config = EngineConfig::default();
            config.queue.capacity = 4;
            config.queue.max_snapshots = 2;
            config.queue.snapshot_interval = 5;
            let mut engine = Engine::new(config).unwrap();
            engine.init(&payload()).unwrap();
            engine.start().unwrap();
            let hp = |e: &Engine| e.world().get(&EntityId::from("b")).unwrap().core.snapshot().hp.current;

            // one hit per frame, many times the queue capacity
            for _ in 0..40 {
                let scheduled = engine.schedule(
                    EventDraft::new(QueueEventType::Damage, 0)
                        .target(EntityId::from("b"))
                        .payload(json!({"amount": 1.0, "source": "a"})),
                );
                assert!(scheduled.is_some());
                assert!(engine.step_frame().advanced);
            }
            assert_eq!(hp(&engine), 10.0);
            assert_eq!(engine.queue().dropped_count(), 0);
            // rotation pruned old processed events
            assert!(engine.queue().len() < 40);
        })
        .unwrap();
    }

    #[test]
    fn test_try_schedule_follows_overflow_policy() {
        run_isolated("engine-test", || {
            let mut config = EngineConfig::default();
            config.queue.capacity = 1;
            config.queue.overflow = OverflowPolicy::RejectWithError;
            let mut engine = Engine::new(config).unwrap();
            engine.init(&payload()).unwrap();
            let draft = || EventDraft::new(QueueEventType::Heal, 1).target(EntityId::from("a"));
            assert!(engine.try_schedule(draft()).unwrap().is_some());
            assert!(matches!(
                engine.try_schedule(draft()),
                Err(SimError::QueueOverflow { capacity: 1 })
            ));
            // the lenient path still just drops
            assert!(engine.schedule(draft()).is_none());
            assert_eq!(engine.queue().len(), 1);
        })
        .unwrap();
    }
}
