//! Arena Sim - deterministic frame-stepped combat simulation core

pub mod behavior;
pub mod core;
pub mod engine;
pub mod entity;
pub mod events;
pub mod expression;
pub mod lifecycle;
pub mod protocol;
pub mod routing;
pub mod runtime;
pub mod stats;
pub mod world;
