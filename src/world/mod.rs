//! World - owns every member and ticks them once per frame

pub mod view;

pub use view::{MemberSummary, WorldView};

use ahash::AHashMap;
use std::sync::Arc;

use crate::behavior::capability::CapabilityRegistry;
use crate::behavior::context::TickEnv;
use crate::behavior::tree::{BehaviorTreeDef, TreeLibrary};
use crate::core::error::{Result, SimError};
use crate::core::types::{EntityId, TreeInstanceId};
use crate::entity::fsm::MemberEvent;
use crate::entity::member::Member;
use crate::protocol::payload::InitPayload;

/// All members, in spawn order
#[derive(Debug, Default)]
pub struct World {
    members: Vec<Member>,
    index: AHashMap<EntityId, usize>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn every member of the payload; ids must be unique
    pub fn populate(
        &mut self,
        payload: &InitPayload,
        trees: &TreeLibrary,
        registry: &CapabilityRegistry,
        history_len: usize,
    ) -> Result<usize> {
        for (camp_id, team_id, template) in payload.members() {
            let member = Member::spawn(camp_id, team_id, template, history_len, trees, registry);
            self.insert(member)?;
        }
        tracing::info!(
            "World populated with {} members across {} sides",
            self.members.len(),
            payload.sides.len()
        );
        Ok(self.members.len())
    }

    pub fn insert(&mut self, member: Member) -> Result<()> {
        if self.index.contains_key(member.id()) {
            return Err(SimError::Validation(format!("duplicate member id {}", member.id())));
        }
        self.index.insert(member.id().clone(), self.members.len());
        self.members.push(member);
        Ok(())
    }

    pub fn get(&self, id: &EntityId) -> Option<&Member> {
        self.index.get(id).map(|&i| &self.members[i])
    }

    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut Member> {
        self.index.get(id).map(|&i| &mut self.members[i])
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn living_count(&self) -> usize {
        self.members.iter().filter(|m| m.core.alive).count()
    }

    /// Start-of-frame picture handed to capabilities
    pub fn view(&self) -> WorldView {
        WorldView::new(self.members.iter().map(|m| m.core.summary()).collect())
    }

    /// Hand an event to one member's FSM; false if no such member
    pub fn deliver(&mut self, id: &EntityId, event: MemberEvent, env: &mut TickEnv<'_>) -> bool {
        match self.get_mut(id) {
            Some(member) => {
                member.deliver(event, env);
                true
            }
            None => false,
        }
    }

    pub fn attach_buff(
        &mut self,
        id: &EntityId,
        def: Arc<BehaviorTreeDef>,
        registry: &CapabilityRegistry,
    ) -> Result<TreeInstanceId> {
        let member = self
            .get_mut(id)
            .ok_or_else(|| SimError::EntityNotFound(id.clone()))?;
        if !member.core.alive {
            return Err(SimError::Validation(format!("{} is dead", id)));
        }
        member.harness.add_buff(def, registry)
    }

    /// Tick every member once, in spawn order
    pub fn tick(&mut self, env: &mut TickEnv<'_>) {
        for member in self.members.iter_mut() {
            member.tick(env);
        }
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> InitPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_populate_and_lookup() {
        let mut world = World::new();
        let p = payload(
            r#"{"sides": [
                {"campId": "red", "teams": [{"teamId": "r", "members": [{"id": "a", "stats": {"hp": 10}}]}]},
                {"campId": "blue", "teams": [{"teamId": "b", "members": [{"id": "b"}]}]}
            ]}"#,
        );
        let count = world
            .populate(&p, &TreeLibrary::new(), &CapabilityRegistry::with_builtins(), 8)
            .unwrap();
        assert_eq!(count, 2);
        assert!(world.contains(&EntityId::from("a")));
        assert_eq!(world.get(&EntityId::from("b")).unwrap().core.camp_id, "blue");

        let view = world.view();
        assert_eq!(view.len(), 2);
        assert_eq!(view.get(&EntityId::from("a")).unwrap().hp, 10.0);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut world = World::new();
        let p = payload(
            r#"{"sides": [{"campId": "red", "teams": [{"teamId": "r", "members": [{"id": "a"}, {"id": "a"}]}]}]}"#,
        );
        let result = world.populate(&p, &TreeLibrary::new(), &CapabilityRegistry::with_builtins(), 8);
        assert!(matches!(result, Err(SimError::Validation(_))));
    }
}
