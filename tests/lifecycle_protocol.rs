//! Life-cycle protocol integration tests: controller session against a real
//! executor thread

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use arena_sim::core::config::{EngineConfig, LifecycleConfig};
use arena_sim::core::error::{Result, SimError};
use arena_sim::engine::Engine;
use arena_sim::lifecycle::{LifecycleMachine, LifecycleState};
use arena_sim::protocol::control::{CommandKind, ControlBody, EngineControlMessage};
use arena_sim::protocol::payload::InitPayload;
use arena_sim::runtime::{run_isolated, ControllerSession};
use serde_json::json;

fn payload() -> InitPayload {
    serde_json::from_value(json!({
        "seed": 3,
        "sides": [
            {"campId": "red", "teams": [{"teamId": "r", "members": [{"id": "a", "stats": {"hp": 10}}]}]},
            {"campId": "blue", "teams": [{"teamId": "b", "members": [{"id": "b", "stats": {"hp": 10}}]}]}
        ]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_non_host_start_is_refused() {
    let mut session = ControllerSession::start(EngineConfig::default(), "X").unwrap();

    let init = session.command(CommandKind::Init, Some(payload())).await.unwrap();
    assert!(init.success);
    assert_eq!(init.state, LifecycleState::Ready);

    session.send_as(CommandKind::Start, "Y", None).unwrap();
    let refused = session.await_result().await.unwrap();
    assert_eq!(refused.kind, CommandKind::Start);
    assert!(!refused.success);
    let error = refused.error.unwrap();
    assert!(error.contains("permission"));
    assert!(error.contains("权限"));
    assert_eq!(session.state(), LifecycleState::Ready);

    // the engine was never started, so the host can still start it
    let start = session.command(CommandKind::Start, None).await.unwrap();
    assert!(start.success);
    assert_eq!(start.state, LifecycleState::Running);

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reset_from_stopped_returns_to_ready() {
    let mut session = ControllerSession::start(EngineConfig::default(), "host").unwrap();
    for (kind, payload) in [
        (CommandKind::Init, Some(payload())),
        (CommandKind::Start, None),
        (CommandKind::Stop, None),
    ] {
        assert!(session.command(kind, payload).await.unwrap().success);
    }
    assert_eq!(session.state(), LifecycleState::Stopped);

    let reset = session.command(CommandKind::Reset, None).await.unwrap();
    assert!(reset.success);
    assert_eq!(reset.state, LifecycleState::Ready);

    // no new INIT needed
    let start = session.command(CommandKind::Start, None).await.unwrap();
    assert!(start.success);

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reset_to_idle_hands_off_host() {
    let mut session = ControllerSession::start(EngineConfig::default(), "X").unwrap();
    assert!(session.command(CommandKind::Init, Some(payload())).await.unwrap().success);

    let reset = session.command(CommandKind::Reset, None).await.unwrap();
    assert!(reset.success);
    assert_eq!(reset.state, LifecycleState::Idle);

    session.send_as(CommandKind::Init, "Z", Some(payload())).unwrap();
    assert!(session.await_result().await.unwrap().success);

    session.send_as(CommandKind::Start, "X", None).unwrap();
    let refused = session.await_result().await.unwrap();
    assert!(!refused.success);

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_step_only_while_paused() {
    let mut session = ControllerSession::start(EngineConfig::default(), "host").unwrap();
    assert!(session.command(CommandKind::Init, Some(payload())).await.unwrap().success);

    let err = session.send(CommandKind::Step, None).unwrap_err();
    assert!(matches!(err, SimError::InvalidTransition { .. }));

    assert!(session.command(CommandKind::Start, None).await.unwrap().success);
    assert!(session.command(CommandKind::Pause, None).await.unwrap().success);
    let step = session.command(CommandKind::Step, None).await.unwrap();
    assert!(step.success);
    assert_eq!(step.state, LifecycleState::Paused);

    session.shutdown().await.unwrap();
}

#[test]
fn test_results_echo_correlation_ids() {
    run_isolated("correlation-test", || {
        let outbox: Rc<RefCell<Vec<EngineControlMessage>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = outbox.clone();
        let transport = move |m: EngineControlMessage| -> Result<()> {
            sink.borrow_mut().push(m);
            Ok(())
        };
        let mut machine = LifecycleMachine::executor(transport);
        let mut engine = Engine::new(EngineConfig::default()).unwrap();

        let commands = vec![
            EngineControlMessage::command(CommandKind::Init, 1, "corr-init", "host", Some(payload())),
            EngineControlMessage::command(CommandKind::Resume, 2, "corr-bad", "host", None),
            EngineControlMessage::command(CommandKind::Start, 3, "corr-start", "host", None),
            EngineControlMessage::command(CommandKind::Stop, 4, "corr-stop", "intruder", None),
        ];
        for command in &commands {
            assert!(machine.on_command(command, &mut engine).is_some());
        }

        let results = outbox.borrow();
        assert_eq!(results.len(), commands.len());
        for (command, result) in commands.iter().zip(results.iter()) {
            assert_eq!(result.correlation_id, command.correlation_id);
            assert_eq!(result.message_type(), command.kind().result_type());
        }
        let successes: Vec<bool> = results
            .iter()
            .map(|r| matches!(r.body, ControlBody::Result { success: true, .. }))
            .collect();
        assert_eq!(successes, vec![true, false, true, false]);
        assert_eq!(machine.state(), LifecycleState::Running);
    })
    .unwrap();
}

#[test]
fn test_init_timeout_reverts_to_idle() {
    let sent = Rc::new(RefCell::new(0));
    let counter = sent.clone();
    let transport = move |_m: EngineControlMessage| -> Result<()> {
        *counter.borrow_mut() += 1;
        Ok(())
    };
    let mut machine = LifecycleMachine::controller(transport, &LifecycleConfig { init_timeout_ms: 25 });

    let t0 = Instant::now();
    let correlation = machine
        .dispatch(CommandKind::Init, "host", Some(payload()), t0)
        .unwrap();
    assert_eq!(*sent.borrow(), 1);
    assert!(machine.check_timeout(t0 + Duration::from_millis(5)).is_ok());

    let err = machine.check_timeout(t0 + Duration::from_millis(30)).unwrap_err();
    assert!(matches!(err, SimError::Timeout(_)));
    assert_eq!(machine.state(), LifecycleState::Idle);

    // a late answer no longer applies
    let late = EngineControlMessage::result(CommandKind::Init, 1, correlation, Ok(()));
    assert_eq!(machine.on_result(&late), None);
    assert_eq!(machine.state(), LifecycleState::Idle);
}
