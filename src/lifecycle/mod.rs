//! Life-cycle protocol between the controller and the isolated executor

pub mod machine;
pub mod state;

pub use machine::{EngineHost, LifecycleMachine, PeerTransport, Role};
pub use state::{controller_pending, controller_settled, executor_transition, LifecycleState};
