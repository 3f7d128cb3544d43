//! One-to-one controller/entity bindings
//!
//! A controller drives at most one entity and an entity answers to at most
//! one controller. Binding either side to something new evicts the old pair.

use ahash::AHashMap;

use crate::core::types::{ControllerId, EntityId};

/// What a `bind` call displaced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindOutcome {
    /// Entity the controller was driving before
    pub evicted_entity: Option<EntityId>,
    /// Controller that was driving the entity before
    pub evicted_controller: Option<ControllerId>,
    /// False when the exact pair already existed
    pub changed: bool,
}

#[derive(Debug, Default)]
pub struct ControlBindingManager {
    by_controller: AHashMap<ControllerId, EntityId>,
    by_entity: AHashMap<EntityId, ControllerId>,
}

impl ControlBindingManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, controller: ControllerId, entity: EntityId) -> BindOutcome {
        if self.by_controller.get(&controller) == Some(&entity) {
            return BindOutcome::default();
        }

        let evicted_entity = self.by_controller.remove(&controller);
        if let Some(old) = &evicted_entity {
            self.by_entity.remove(old);
        }
        let evicted_controller = self.by_entity.remove(&entity);
        if let Some(old) = &evicted_controller {
            self.by_controller.remove(old);
        }

        tracing::debug!("Bound controller {} to {}", controller, entity);
        self.by_controller.insert(controller.clone(), entity.clone());
        self.by_entity.insert(entity, controller);

        BindOutcome {
            evicted_entity,
            evicted_controller,
            changed: true,
        }
    }

    pub fn unbind_controller(&mut self, controller: &ControllerId) -> Option<EntityId> {
        let entity = self.by_controller.remove(controller)?;
        self.by_entity.remove(&entity);
        Some(entity)
    }

    pub fn unbind_entity(&mut self, entity: &EntityId) -> Option<ControllerId> {
        let controller = self.by_entity.remove(entity)?;
        self.by_controller.remove(&controller);
        Some(controller)
    }

    pub fn entity_for(&self, controller: &ControllerId) -> Option<&EntityId> {
        self.by_controller.get(controller)
    }

    pub fn controller_for(&self, entity: &EntityId) -> Option<&ControllerId> {
        self.by_entity.get(entity)
    }

    /// All pairs ordered by controller id
    pub fn pairs(&self) -> Vec<(&ControllerId, &EntityId)> {
        let mut pairs: Vec<_> = self.by_controller.iter().collect();
        pairs.sort();
        pairs
    }

    pub fn len(&self) -> usize {
        self.by_controller.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_controller.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_controller.clear();
        self.by_entity.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(id: &str) -> ControllerId {
        ControllerId::from(id)
    }

    fn e(id: &str) -> EntityId {
        EntityId::from(id)
    }

    #[test]
    fn test_rebind_controller_evicts_old_entity() {
        let mut bindings = ControlBindingManager::new();
        bindings.bind(c("A"), e("M1"));
        let outcome = bindings.bind(c("A"), e("M2"));

        assert_eq!(outcome.evicted_entity, Some(e("M1")));
        assert_eq!(bindings.entity_for(&c("A")), Some(&e("M2")));
        assert_eq!(bindings.controller_for(&e("M1")), None);
        assert_eq!(bindings.len(), 1);
    }

    #[test]
    fn test_rebind_entity_evicts_old_controller() {
        let mut bindings = ControlBindingManager::new();
        bindings.bind(c("A"), e("M1"));
        let outcome = bindings.bind(c("B"), e("M1"));

        assert_eq!(outcome.evicted_controller, Some(c("A")));
        assert_eq!(bindings.entity_for(&c("A")), None);
        assert_eq!(bindings.controller_for(&e("M1")), Some(&c("B")));
    }

    #[test]
    fn test_same_pair_is_noop() {
        let mut bindings = ControlBindingManager::new();
        assert!(bindings.bind(c("A"), e("M1")).changed);
        assert_eq!(bindings.bind(c("A"), e("M1")), BindOutcome::default());
    }

    #[test]
    fn test_unbind_both_ways() {
        let mut bindings = ControlBindingManager::new();
        bindings.bind(c("A"), e("M1"));
        bindings.bind(c("B"), e("M2"));
        assert_eq!(bindings.unbind_controller(&c("A")), Some(e("M1")));
        assert_eq!(bindings.unbind_controller(&c("A")), None);
        assert_eq!(bindings.unbind_entity(&e("M2")), Some(c("B")));
        assert!(bindings.is_empty());
    }
}
