//! Cross-frame event scheduling
//!
//! Events are not applied when created. They wait in the queue until the
//! engine reaches their execute frame.

pub mod queue;
pub mod types;

pub use queue::EventQueue;
pub use types::{EventDraft, QueueEvent, QueueEventType};
