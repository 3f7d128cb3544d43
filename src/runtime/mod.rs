//! Thread boundary between the controller and the executor

pub mod controller;
pub mod executor;
pub mod isolation;

pub use controller::{ControllerSession, LifecycleUpdate, SessionEvent};
pub use executor::{spawn_executor, ExecutorHandle, Inbound, Outbound};
pub use isolation::{is_isolated, mark_current_thread, run_isolated};
