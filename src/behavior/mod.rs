//! Behavior trees, the capabilities their leaves call, and the per-member
//! harness that runs them

pub mod capability;
pub mod context;
pub mod harness;
pub mod library;
pub mod tree;

pub use capability::{
    CapabilityBody, CapabilityDef, CapabilityKind, CapabilityLifetime, CapabilityRegistry,
    UserCapabilities,
};
pub use context::{CapabilityContext, DamageAreaRequest, EffectSink, TickEnv};
pub use harness::{BehaviorHarness, HarnessReport};
pub use tree::{BehaviorTree, BehaviorTreeDef, NodeDef, TreeLibrary, TreeStatus};
