//! Intent routing: controller → binding → member FSM
//!
//! Intents never touch the life-cycle machine. A controller without a
//! binding gets a `NoBinding` outcome, which is counted but not an error.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::behavior::context::TickEnv;
use crate::core::types::{ControllerId, EntityId};
use crate::routing::binding::ControlBindingManager;
use crate::routing::intent::{IntentCommand, IntentMessage};
use crate::world::World;

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Bound {
        controller: ControllerId,
        entity: EntityId,
        evicted_entity: Option<EntityId>,
        evicted_controller: Option<ControllerId>,
    },
    Unbound {
        controller: ControllerId,
        entity: Option<EntityId>,
    },
    Delivered {
        entity: EntityId,
    },
    NoBinding {
        controller: ControllerId,
    },
    Rejected {
        reason: String,
    },
}

impl RouteOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, RouteOutcome::Rejected { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouterStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub no_binding: u64,
    pub by_type: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct MessageRouter {
    bindings: ControlBindingManager,
    stats: RouterStats,
    /// Rebinds since the last drain, projected as camera_follow events
    camera_follows: Vec<(ControllerId, EntityId)>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bindings(&self) -> &ControlBindingManager {
        &self.bindings
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    pub fn take_camera_follows(&mut self) -> Vec<(ControllerId, EntityId)> {
        std::mem::take(&mut self.camera_follows)
    }

    pub fn process_message(&mut self, intent: &IntentMessage, world: &mut World, env: &mut TickEnv<'_>) -> RouteOutcome {
        self.stats.processed += 1;
        *self
            .stats
            .by_type
            .entry(intent.intent_type.as_str().to_string())
            .or_insert(0) += 1;

        let outcome = self.route(intent, world, env);
        match &outcome {
            RouteOutcome::Rejected { reason } => {
                self.stats.failed += 1;
                tracing::warn!(
                    "Intent {} from {} rejected: {}",
                    intent.id,
                    intent.controller_id,
                    reason
                );
            }
            RouteOutcome::NoBinding { controller } => {
                self.stats.no_binding += 1;
                tracing::debug!("Intent {} ignored, {} has no binding", intent.id, controller);
            }
            _ => self.stats.succeeded += 1,
        }
        outcome
    }

    pub fn process_messages(
        &mut self,
        intents: &[IntentMessage],
        world: &mut World,
        env: &mut TickEnv<'_>,
    ) -> Vec<RouteOutcome> {
        intents
            .iter()
            .map(|intent| self.process_message(intent, world, env))
            .collect()
    }

    fn route(&mut self, intent: &IntentMessage, world: &mut World, env: &mut TickEnv<'_>) -> RouteOutcome {
        let command = match intent.parse() {
            Ok(command) => command,
            Err(e) => {
                return RouteOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        };
        let controller = intent.controller_id.clone();

        match command {
            IntentCommand::Bind { entity } => {
                if !world.contains(&entity) {
                    return RouteOutcome::Rejected {
                        reason: format!("unknown entity {}", entity),
                    };
                }
                let outcome = self.bindings.bind(controller.clone(), entity.clone());
                if outcome.changed {
                    self.camera_follows.push((controller.clone(), entity.clone()));
                }
                RouteOutcome::Bound {
                    controller,
                    entity,
                    evicted_entity: outcome.evicted_entity,
                    evicted_controller: outcome.evicted_controller,
                }
            }
            IntentCommand::Unbind => {
                let entity = self.bindings.unbind_controller(&controller);
                RouteOutcome::Unbound { controller, entity }
            }
            IntentCommand::Deliver(event) => {
                let Some(entity) = self.bindings.entity_for(&controller).cloned() else {
                    return RouteOutcome::NoBinding { controller };
                };
                if world.deliver(&entity, event, env) {
                    RouteOutcome::Delivered { entity }
                } else {
                    RouteOutcome::Rejected {
                        reason: format!("bound entity {} no longer exists", entity),
                    }
                }
            }
        }
    }

    /// Forget every binding; statistics are kept
    pub fn clear_bindings(&mut self) {
        self.bindings.clear();
        self.camera_follows.clear();
    }
}
