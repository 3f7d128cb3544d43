//! Everything that crosses the controller/executor boundary

pub mod control;
pub mod output;
pub mod payload;

pub use control::{CommandKind, ControlBody, EngineControlMessage, Side};
pub use output::{
    ControllerEvent, DomainEventBatch, DomainEventKind, FrameSnapshot, MemberDomainEvent,
    RenderCommand,
};
pub use payload::{InitPayload, MemberTemplate, SideTemplate, SkillTemplate, TeamTemplate};
