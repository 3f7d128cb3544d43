pub mod config;
pub mod error;
pub mod types;

pub use config::EngineConfig;
pub use error::{Result, SimError};
pub use types::{ControllerId, EntityId, EventId, Frame, TaskId, TreeInstanceId, Vec2};
