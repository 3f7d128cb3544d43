use arena_sim::core::config::EngineConfig;
use arena_sim::engine::Engine;
use arena_sim::lifecycle::EngineHost;
use arena_sim::protocol::payload::InitPayload;
use arena_sim::runtime::mark_current_thread;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

/// Two camps of `per_side` brawlers facing each other in columns
fn melee(per_side: usize) -> InitPayload {
    let column = |camp: &str, x: f32| {
        let members: Vec<_> = (0..per_side)
            .map(|i| {
                json!({
                    "id": format!("{}-{}", camp, i),
                    "position": {"x": x, "y": i as f32 * 1.5},
                    "stats": {"hp": 10_000, "speed": 0.2, "attack": 4},
                    "behavior": "brawler"
                })
            })
            .collect();
        json!({"campId": camp, "teams": [{"teamId": camp, "members": members}]})
    };
    serde_json::from_value(json!({
        "seed": 1,
        "sides": [column("red", 0.0), column("blue", 20.0)],
        "behaviorTrees": [{
            "id": "brawler",
            "root": {"type": "repeat", "child": {"type": "selector", "children": [
                {"type": "sequence", "children": [
                    {"type": "condition", "name": "target_alive"},
                    {"type": "action", "name": "move_to_target", "params": {"range": 1.2}},
                    {"type": "action", "name": "damage_target", "params": {"amount": "self.attack"}},
                    {"type": "wait", "frames": 10}
                ]},
                {"type": "action", "name": "select_nearest_enemy"}
            ]}}
        }]
    }))
    .expect("bench payload")
}

fn running(payload: &InitPayload) -> Engine {
    let mut engine = Engine::new(EngineConfig::default()).expect("engine");
    engine.init(payload).expect("init");
    engine.start().expect("start");
    engine
}

fn bench_step_frame(c: &mut Criterion) {
    mark_current_thread();

    let skirmish: InitPayload =
        serde_json::from_str(include_str!("../data/scenarios/skirmish.json")).expect("scenario");

    let mut group = c.benchmark_group("step_frame");

    let mut engine = running(&skirmish);
    group.bench_function("skirmish (4 members)", |b| {
        b.iter(|| {
            black_box(engine.step_frame());
            engine.drain_render_commands();
        });
    });

    for per_side in [50, 200] {
        let mut engine = running(&melee(per_side));
        group.bench_function(format!("melee ({} members)", per_side * 2), |b| {
            b.iter(|| {
                black_box(engine.step_frame());
                engine.drain_render_commands();
            });
        });
    }

    let engine = running(&melee(200));
    group.bench_function("snapshot (400 members)", |b| {
        b.iter(|| black_box(engine.snapshot()));
    });

    group.finish();
}

criterion_group!(benches, bench_step_frame);
criterion_main!(benches);
