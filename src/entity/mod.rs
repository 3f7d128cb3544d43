//! Simulated members and their state machines

pub mod fsm;
pub mod member;

pub use fsm::{FsmDirective, FsmRecord, MemberEvent, MemberFsm, MemberState};
pub use member::{Member, MemberCore, SkillSlot};
