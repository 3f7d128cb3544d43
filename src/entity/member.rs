//! Simulated members
//!
//! A [`Member`] splits into the data capabilities may touch
//! ([`MemberCore`]), its state machine, and its behavior harness, so each
//! part can be borrowed independently during a tick.

use ahash::AHashMap;

use crate::behavior::capability::CapabilityRegistry;
use crate::behavior::context::TickEnv;
use crate::behavior::harness::BehaviorHarness;
use crate::behavior::tree::TreeLibrary;
use crate::core::types::{EntityId, Frame, Vec2};
use crate::entity::fsm::{MemberEvent, MemberFsm, MemberState};
use crate::expression::Value;
use crate::protocol::output::{MemberDetail, MemberSnapshot, Pool, SkillSnapshot};
use crate::protocol::payload::{MemberTemplate, SkillTemplate};
use crate::stats::{resource, BasicStats, StatView};
use crate::world::view::MemberSummary;

#[derive(Debug, Clone, PartialEq)]
pub struct SkillSlot {
    pub id: String,
    pub name: String,
    pub tree: String,
    pub cooldown_frames: Frame,
    pub mp_cost: f64,
    pub range: Option<f32>,
    /// First frame the skill can be cast again
    pub ready_at: Frame,
    /// Last availability reported to controllers
    pub announced_ready: bool,
}

impl SkillSlot {
    pub fn from_template(template: &SkillTemplate) -> Self {
        Self {
            id: template.id.clone(),
            name: if template.name.is_empty() {
                template.id.clone()
            } else {
                template.name.clone()
            },
            tree: template.tree.clone(),
            cooldown_frames: template.cooldown_frames,
            mp_cost: template.mp_cost,
            range: template.range,
            ready_at: 0,
            announced_ready: true,
        }
    }

    pub fn is_ready(&self, frame: Frame) -> bool {
        frame >= self.ready_at
    }

    pub fn remaining(&self, frame: Frame) -> Frame {
        self.ready_at.saturating_sub(frame)
    }

    pub fn snapshot(&self, frame: Frame) -> SkillSnapshot {
        SkillSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            ready: self.is_ready(frame),
            remaining_frames: self.remaining(frame),
        }
    }
}

/// Everything about a member that capabilities may read or write
#[derive(Debug)]
pub struct MemberCore {
    pub id: EntityId,
    pub member_type: String,
    pub name: String,
    pub camp_id: String,
    pub team_id: String,
    pub position: Vec2,
    /// Destination of the current movement, if any
    pub move_target: Option<Vec2>,
    pub target_id: Option<EntityId>,
    pub stats: Box<dyn StatView>,
    /// Free-form values written by `set_var` and expression actions
    pub blackboard: AHashMap<String, Value>,
    pub skills: Vec<SkillSlot>,
    pub alive: bool,
}

impl MemberCore {
    pub fn from_template(camp_id: &str, team_id: &str, template: &MemberTemplate) -> Self {
        Self {
            id: template.id.clone(),
            member_type: template.member_type.clone(),
            name: if template.name.is_empty() {
                template.id.to_string()
            } else {
                template.name.clone()
            },
            camp_id: camp_id.to_string(),
            team_id: team_id.to_string(),
            position: template.position,
            move_target: None,
            target_id: None,
            stats: Box::new(BasicStats::from_values(
                template.stats.iter().map(|(k, v)| (k.clone(), *v)),
            )),
            blackboard: AHashMap::new(),
            skills: template.skills.iter().map(SkillSlot::from_template).collect(),
            alive: true,
        }
    }

    pub fn skill(&self, id: &str) -> Option<&SkillSlot> {
        self.skills.iter().find(|s| s.id == id)
    }

    pub fn skill_mut(&mut self, id: &str) -> Option<&mut SkillSlot> {
        self.skills.iter_mut().find(|s| s.id == id)
    }

    pub fn speed(&self) -> f32 {
        self.stats.get_value("speed").map(|s| s as f32).unwrap_or(1.0)
    }

    pub fn summary(&self) -> MemberSummary {
        let (hp, hp_max) = resource(self.stats.as_ref(), "hp");
        MemberSummary {
            id: self.id.clone(),
            camp_id: self.camp_id.clone(),
            position: self.position,
            alive: self.alive,
            hp,
            hp_max,
        }
    }

    pub fn snapshot(&self) -> MemberSnapshot {
        let (hp, hp_max) = resource(self.stats.as_ref(), "hp");
        let (mp, mp_max) = resource(self.stats.as_ref(), "mp");
        MemberSnapshot {
            id: self.id.clone(),
            member_type: self.member_type.clone(),
            name: self.name.clone(),
            position: self.position,
            camp_id: self.camp_id.clone(),
            team_id: self.team_id.clone(),
            hp: Pool {
                current: hp,
                max: hp_max,
            },
            mp: Pool {
                current: mp,
                max: mp_max,
            },
        }
    }
}

#[derive(Debug)]
pub struct Member {
    pub core: MemberCore,
    pub fsm: MemberFsm,
    pub harness: BehaviorHarness,
}

impl Member {
    pub fn new(core: MemberCore, history_len: usize) -> Self {
        Self {
            core,
            fsm: MemberFsm::new(history_len),
            harness: BehaviorHarness::new(),
        }
    }

    /// Build from a template, attaching its spawn buffs and behavior
    pub fn spawn(
        camp_id: &str,
        team_id: &str,
        template: &MemberTemplate,
        history_len: usize,
        trees: &TreeLibrary,
        registry: &CapabilityRegistry,
    ) -> Self {
        let mut member = Self::new(MemberCore::from_template(camp_id, team_id, template), history_len);
        for tree_id in &template.buffs {
            match trees.get(tree_id) {
                Some(def) => {
                    if let Err(e) = member.harness.add_buff(def, registry) {
                        tracing::warn!("{}: {}", member.core.id, e);
                    }
                }
                None => tracing::warn!("{}: unknown buff tree '{}'", member.core.id, tree_id),
            }
        }
        if let Some(tree_id) = &template.behavior {
            match trees.get(tree_id) {
                Some(def) => {
                    if let Err(e) = member.harness.set_resting(def, &mut member.core, registry) {
                        tracing::warn!("{}: {}", member.core.id, e);
                    }
                }
                None => tracing::warn!("{}: unknown behavior tree '{}'", member.core.id, tree_id),
            }
        }
        member
    }

    pub fn id(&self) -> &EntityId {
        &self.core.id
    }

    pub fn state(&self) -> MemberState {
        self.fsm.state()
    }

    /// Feed one event to the FSM and apply whatever it asks of the harness
    pub fn deliver(&mut self, event: MemberEvent, env: &mut TickEnv<'_>) {
        let directives = self.fsm.handle(event, &mut self.core, env);
        for directive in directives {
            self.harness.apply(directive, &mut self.core, env.registry);
        }
    }

    /// Advance this member by one frame
    pub fn tick(&mut self, env: &mut TickEnv<'_>) {
        if !self.core.alive {
            return;
        }

        if self.fsm.state() == MemberState::Moving {
            if let Some(dest) = self.core.move_target {
                let (pos, arrived) = self.core.position.step_towards(dest, self.core.speed());
                self.core.position = pos;
                if arrived {
                    self.deliver(MemberEvent::Arrived, env);
                }
            }
        }

        self.harness.tick(&mut self.core, &mut self.fsm, env);
        self.fsm.on_tick(&mut self.core, env);
    }

    pub fn detail(&self) -> MemberDetail {
        MemberDetail {
            summary: self.core.snapshot(),
            state: self.fsm.state().to_string(),
            target_id: self.core.target_id.clone(),
            alive: self.core.alive,
        }
    }
}
