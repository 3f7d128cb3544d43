//! Controller intents and controller/entity bindings

pub mod binding;
pub mod intent;
pub mod router;

pub use binding::{BindOutcome, ControlBindingManager};
pub use intent::{IntentCommand, IntentMessage, IntentType};
pub use router::{MessageRouter, RouteOutcome, RouterStats};
