//! Frame stepping integration tests
//!
//! Drive an engine directly, frame by frame, on an executor-context thread.

use arena_sim::core::config::EngineConfig;
use arena_sim::core::types::EntityId;
use arena_sim::engine::{Engine, StepReport};
use arena_sim::events::{EventDraft, QueueEventType};
use arena_sim::lifecycle::EngineHost;
use arena_sim::protocol::payload::InitPayload;
use arena_sim::runtime::run_isolated;
use serde_json::json;

fn arena() -> InitPayload {
    serde_json::from_value(json!({
        "seed": 11,
        "sides": [
            {"campId": "red", "teams": [{"teamId": "r", "members": [
                {"id": "a", "position": {"x": 0.0, "y": 0.0}, "stats": {"hp": 100}, "behavior": "nova"},
                {"id": "d", "position": {"x": 0.5, "y": 0.0}, "stats": {"hp": 100}}
            ]}]},
            {"campId": "blue", "teams": [{"teamId": "b", "members": [
                {"id": "b", "position": {"x": 1.0, "y": 0.0}, "stats": {"hp": 100}},
                {"id": "c", "position": {"x": 10.0, "y": 0.0}, "stats": {"hp": 100}}
            ]}]}
        ],
        "behaviorTrees": [
            {"id": "nova", "root": {"type": "sequence", "children": [
                {"type": "action", "name": "damage_area", "params": {"radius": 2, "amount": 10}}
            ]}}
        ]
    }))
    .unwrap()
}

fn skirmish() -> InitPayload {
    serde_json::from_str(include_str!("../data/scenarios/skirmish.json")).unwrap()
}

fn running(payload: &InitPayload) -> Engine {
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    engine.init(payload).unwrap();
    engine.start().unwrap();
    engine
}

fn hp(engine: &Engine, id: &str) -> f64 {
    engine
        .world()
        .get(&EntityId::from(id))
        .unwrap()
        .core
        .snapshot()
        .hp
        .current
}

#[test]
fn test_frame_counter_only_moves_forward_by_one() {
    run_isolated("frames", || {
        let mut engine = running(&skirmish());
        for (delay, kind) in [
            (0, QueueEventType::Heal),
            (3, QueueEventType::Damage),
            (3, QueueEventType::Unknown),
            (7, QueueEventType::FsmEvent),
        ] {
            engine.schedule(
                EventDraft::new(kind, delay)
                    .target(EntityId::from("blue-guard-1"))
                    .fsm_event("taunt")
                    .payload(json!({"amount": 1.0})),
            );
        }

        let mut last = engine.frame();
        let reports: Vec<StepReport> = (0..120).map(|_| engine.step_frame()).collect();
        for report in &reports {
            assert_eq!(report.frame, last);
            if report.advanced {
                assert_eq!(report.pending_events, 0);
                assert_eq!(report.pending_tasks, 0);
                last += 1;
            }
        }
        assert_eq!(engine.frame(), last);
        assert!(engine.frame() > 60);
    })
    .unwrap();
}

#[test]
fn test_events_wait_for_their_frame() {
    run_isolated("frames", || {
        let mut engine = running(&skirmish());
        let id = engine
            .schedule(
                EventDraft::new(QueueEventType::FsmEvent, 4)
                    .target(EntityId::from("blue-mage-1"))
                    .fsm_event("die"),
            )
            .unwrap();
        assert_eq!(engine.queue().get(id).unwrap().execute_frame, 4);

        while engine.frame() < 4 {
            engine.step_frame();
            assert!(!engine.queue().get(id).unwrap().processed);
            assert!(engine.world().get(&EntityId::from("blue-mage-1")).unwrap().core.alive);
        }

        let report = engine.step_frame();
        assert_eq!(report.frame, 4);
        assert!(report.processed_events >= 1);
        assert!(engine.queue().get(id).unwrap().processed);
        assert!(!engine.world().get(&EntityId::from("blue-mage-1")).unwrap().core.alive);
    })
    .unwrap();
}

#[test]
fn test_damage_area_hits_enemies_in_radius_only() {
    run_isolated("frames", || {
        let mut engine = running(&arena());

        // the area resolves into damage events due this very frame
        let first = engine.step_frame();
        assert_eq!(first.frame, 0);
        assert!(!first.advanced);
        assert_eq!(first.pending_events, 1);

        let second = engine.step_frame();
        assert!(second.advanced);
        assert_eq!(second.processed_events, 1);

        assert_eq!(hp(&engine, "b"), 90.0);
        assert_eq!(hp(&engine, "c"), 100.0);
        assert_eq!(hp(&engine, "d"), 100.0);
        assert_eq!(hp(&engine, "a"), 100.0);
    })
    .unwrap();
}

#[test]
fn test_same_seed_replays_identically() {
    let run = || {
        run_isolated("replay", || {
            let mut engine = running(&skirmish());
            for _ in 0..400 {
                engine.step_frame();
            }
            let snapshot = engine.snapshot();
            (snapshot.frame_number, serde_json::to_value(&snapshot.members).unwrap())
        })
        .unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_render_commands_are_sequenced() {
    run_isolated("frames", || {
        let mut engine = running(&skirmish());
        let mut renders = Vec::new();
        for _ in 0..300 {
            engine.step_frame();
            renders.extend(engine.drain_render_commands());
        }
        assert!(!renders.is_empty());
        for pair in renders.windows(2) {
            assert!(pair[1].seq > pair[0].seq);
            assert!(pair[1].ts >= pair[0].ts);
        }
    })
    .unwrap();
}
