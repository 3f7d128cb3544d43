//! Per-member behavior harness: one primary tree plus any number of buffs
//!
//! The primary tree is what the member is actively doing (usually a skill
//! cast). When it finishes, the harness detaches it and tells the member's
//! FSM in the same tick. A cast displaces the member's resting (spawn-time)
//! behavior, which is restarted once the cast ends. Buff trees run
//! alongside and vanish silently when they finish.

use std::sync::Arc;

use crate::behavior::capability::{CapabilityKind, CapabilityRegistry, UserCapabilities};
use crate::behavior::context::{CapabilityContext, TickEnv};
use crate::behavior::tree::{BehaviorTree, BehaviorTreeDef, LeafRunner, Params, TreeStatus};
use crate::core::error::Result;
use crate::core::types::TreeInstanceId;
use crate::entity::fsm::{FsmDirective, MemberEvent, MemberFsm};
use crate::entity::member::MemberCore;

/// What happened during one harness tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarnessReport {
    /// Final status of the primary tree if it finished this tick
    pub primary_completed: Option<TreeStatus>,
    pub buffs_completed: usize,
}

#[derive(Debug, Default)]
pub struct BehaviorHarness {
    primary: Option<BehaviorTree>,
    /// Spawn-time behavior to return to after a cast
    resting: Option<Arc<BehaviorTreeDef>>,
    buffs: Vec<BehaviorTree>,
    capabilities: UserCapabilities,
    next_instance: u64,
}

impl BehaviorHarness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primary(&self) -> Option<&BehaviorTree> {
        self.primary.as_ref()
    }

    pub fn buffs(&self) -> &[BehaviorTree] {
        &self.buffs
    }

    pub fn capabilities(&self) -> &UserCapabilities {
        &self.capabilities
    }

    fn attach(&mut self, def: Arc<BehaviorTreeDef>, registry: &CapabilityRegistry) -> Result<BehaviorTree> {
        self.next_instance += 1;
        let instance = TreeInstanceId(self.next_instance);
        self.capabilities.register_tree(&def, instance, registry)?;

        for (is_action, name) in def.root.leaves() {
            let known = match registry.kind_of(name) {
                Some(kind) => (kind == CapabilityKind::Action) == is_action,
                None => self
                    .capabilities
                    .get(name)
                    .map_or(false, |c| (c.def.kind == CapabilityKind::Action) == is_action),
            };
            if !known {
                tracing::warn!(
                    "Tree '{}' uses unresolved {} '{}', it will fail when reached",
                    def.id,
                    if is_action { "action" } else { "condition" },
                    name
                );
            }
        }
        Ok(BehaviorTree::new(instance, def))
    }

    /// Release what a tree owned: its tree-lifetime capabilities and modifiers
    fn detach(&mut self, tree: BehaviorTree, core: &mut MemberCore) {
        self.capabilities.release_owner(tree.instance());
        core.stats.remove_modifiers_from(tree.source_tag());
    }

    /// Replace the primary tree; a replaced tree ends without notification
    pub fn set_primary(
        &mut self,
        def: Arc<BehaviorTreeDef>,
        core: &mut MemberCore,
        registry: &CapabilityRegistry,
    ) -> Result<TreeInstanceId> {
        if let Some(old) = self.primary.take() {
            tracing::debug!("{} replaces primary tree '{}'", core.id, old.def_id());
            self.detach(old, core);
        }
        let tree = self.attach(def, registry)?;
        let instance = tree.instance();
        self.primary = Some(tree);
        Ok(instance)
    }

    /// Install the resting behavior and start it as the primary tree
    pub fn set_resting(
        &mut self,
        def: Arc<BehaviorTreeDef>,
        core: &mut MemberCore,
        registry: &CapabilityRegistry,
    ) -> Result<TreeInstanceId> {
        let instance = self.set_primary(def.clone(), core, registry)?;
        self.resting = Some(def);
        Ok(instance)
    }

    pub fn resting(&self) -> Option<&Arc<BehaviorTreeDef>> {
        self.resting.as_ref()
    }

    pub fn add_buff(&mut self, def: Arc<BehaviorTreeDef>, registry: &CapabilityRegistry) -> Result<TreeInstanceId> {
        let tree = self.attach(def, registry)?;
        let instance = tree.instance();
        self.buffs.push(tree);
        Ok(instance)
    }

    pub fn cancel_primary(&mut self, core: &mut MemberCore) -> bool {
        match self.primary.take() {
            Some(tree) => {
                self.detach(tree, core);
                true
            }
            None => false,
        }
    }

    /// Drop every tree; member-lifetime capabilities go too
    pub fn clear(&mut self, core: &mut MemberCore) {
        self.cancel_primary(core);
        for tree in std::mem::take(&mut self.buffs) {
            self.detach(tree, core);
        }
        self.resting = None;
        self.capabilities.clear();
    }

    pub fn apply(&mut self, directive: FsmDirective, core: &mut MemberCore, registry: &CapabilityRegistry) {
        match directive {
            FsmDirective::StartPrimary(def) => {
                if let Err(e) = self.set_primary(def, core, registry) {
                    tracing::warn!("{}: {}", core.id, e);
                }
            }
            FsmDirective::CancelPrimary => {
                self.cancel_primary(core);
            }
            FsmDirective::ResumeBehavior => {
                if self.primary.is_some() {
                    return;
                }
                if let Some(def) = self.resting.clone() {
                    tracing::debug!("{} resumes behavior '{}'", core.id, def.id);
                    if let Err(e) = self.set_primary(def, core, registry) {
                        tracing::warn!("{}: {}", core.id, e);
                    }
                }
            }
            FsmDirective::ClearAll => self.clear(core),
        }
    }

    /// Advance the primary tree, then every buff, once
    pub fn tick(&mut self, core: &mut MemberCore, fsm: &mut MemberFsm, env: &mut TickEnv<'_>) -> HarnessReport {
        let mut report = HarnessReport::default();

        let primary_status = match self.primary.as_mut() {
            Some(tree) => {
                let tag = tree.source_tag().to_string();
                let mut leaves = Leaves {
                    capabilities: &self.capabilities,
                    member: &mut *core,
                    env: &mut *env,
                    tag: &tag,
                };
                Some(tree.tick(&mut leaves))
            }
            None => None,
        };

        if let Some(status) = primary_status.filter(TreeStatus::is_terminal) {
            if let Some(tree) = self.primary.take() {
                tracing::debug!("{} primary tree '{}' finished: {:?}", core.id, tree.def_id(), status);
                self.detach(tree, core);
            }
            report.primary_completed = Some(status);
            let event = MemberEvent::PrimaryBehaviorComplete {
                succeeded: status == TreeStatus::Succeeded,
            };
            for directive in fsm.handle(event, core, env) {
                self.apply(directive, core, env.registry);
            }
        }

        let mut i = 0;
        while i < self.buffs.len() {
            let tag = self.buffs[i].source_tag().to_string();
            let mut leaves = Leaves {
                capabilities: &self.capabilities,
                member: &mut *core,
                env: &mut *env,
                tag: &tag,
            };
            let status = self.buffs[i].tick(&mut leaves);
            if status.is_terminal() {
                let tree = self.buffs.remove(i);
                self.detach(tree, core);
                report.buffs_completed += 1;
            } else {
                i += 1;
            }
        }

        report
    }
}

/// Resolves leaves against built-ins first, then the member's capabilities
struct Leaves<'r, 'a> {
    capabilities: &'r UserCapabilities,
    member: &'r mut MemberCore,
    env: &'r mut TickEnv<'a>,
    tag: &'r str,
}

impl LeafRunner for Leaves<'_, '_> {
    fn run_action(&mut self, name: &str, params: &Params) -> TreeStatus {
        let mut ctx = CapabilityContext::new(self.member, self.env, self.tag);
        if let Some(f) = ctx.env.registry.action(name) {
            return f(&mut ctx, params);
        }
        match self.capabilities.get(name) {
            Some(cap) if cap.def.kind == CapabilityKind::Action => cap.run_action(&mut ctx),
            _ => TreeStatus::Failed,
        }
    }

    fn check_condition(&mut self, name: &str, params: &Params) -> bool {
        let mut ctx = CapabilityContext::new(self.member, self.env, self.tag);
        if let Some(f) = ctx.env.registry.condition(name) {
            return f(&mut ctx, params);
        }
        match self.capabilities.get(name) {
            Some(cap) if cap.def.kind == CapabilityKind::Condition => cap.check_condition(&mut ctx),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::capability::{CapabilityBody, CapabilityDef, CapabilityLifetime};
    use crate::behavior::context::EffectSink;
    use crate::behavior::tree::{NodeDef, TreeLibrary};
    use crate::core::types::EntityId;
    use crate::entity::fsm::MemberState;
    use crate::expression::ExpressionEvaluator;
    use crate::protocol::payload::MemberTemplate;
    use crate::world::view::WorldView;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeMap;

    fn core() -> MemberCore {
        MemberCore::from_template(
            "red",
            "r1",
            &MemberTemplate {
                id: EntityId::from("m1"),
                member_type: "unit".into(),
                name: "M1".into(),
                position: Default::default(),
                stats: BTreeMap::from([("hp".to_string(), 100.0)]),
                skills: Vec::new(),
                buffs: Vec::new(),
                behavior: None,
            },
        )
    }

    fn def(id: &str, root: NodeDef) -> Arc<BehaviorTreeDef> {
        Arc::new(BehaviorTreeDef {
            id: id.into(),
            root,
            capabilities: Vec::new(),
        })
    }

    struct Fixture {
        registry: CapabilityRegistry,
        trees: TreeLibrary,
        world: WorldView,
        evaluator: ExpressionEvaluator,
        effects: EffectSink,
        rng: ChaCha8Rng,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: CapabilityRegistry::with_builtins(),
                trees: TreeLibrary::new(),
                world: WorldView::default(),
                evaluator: ExpressionEvaluator::new(),
                effects: EffectSink::default(),
                rng: ChaCha8Rng::seed_from_u64(1),
            }
        }

        fn env(&mut self, frame: u64) -> TickEnv<'_> {
            TickEnv {
                frame,
                registry: &self.registry,
                trees: &self.trees,
                world: &self.world,
                evaluator: &mut self.evaluator,
                effects: &mut self.effects,
                rng: &mut self.rng,
            }
        }
    }

    #[test]
    fn test_primary_completion_notifies_fsm_once() {
        let mut fx = Fixture::new();
        let mut core = core();
        let mut fsm = MemberFsm::new(64);
        let mut harness = BehaviorHarness::new();
        harness
            .set_primary(def("short", NodeDef::Wait { frames: 2 }), &mut core, &fx.registry)
            .unwrap();

        let report = harness.tick(&mut core, &mut fsm, &mut fx.env(1));
        assert_eq!(report.primary_completed, None);
        assert!(harness.primary().is_some());

        let report = harness.tick(&mut core, &mut fsm, &mut fx.env(2));
        assert_eq!(report.primary_completed, Some(TreeStatus::Succeeded));
        assert!(harness.primary().is_none());
        let completions: Vec<_> = fsm
            .history()
            .filter(|r| r.event == "primary_behavior_complete")
            .collect();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].frame, 2);

        // nothing more once detached
        let report = harness.tick(&mut core, &mut fsm, &mut fx.env(3));
        assert_eq!(report, HarnessReport::default());
        assert_eq!(fsm.history().count(), 1);
    }

    #[test]
    fn test_buffs_detach_silently() {
        let mut fx = Fixture::new();
        let mut core = core();
        let mut fsm = MemberFsm::new(64);
        let mut harness = BehaviorHarness::new();
        harness
            .add_buff(def("blink", NodeDef::Wait { frames: 1 }), &fx.registry)
            .unwrap();
        harness
            .add_buff(def("long", NodeDef::Wait { frames: 5 }), &fx.registry)
            .unwrap();

        let report = harness.tick(&mut core, &mut fsm, &mut fx.env(1));
        assert_eq!(report.buffs_completed, 1);
        assert_eq!(harness.buffs().len(), 1);
        assert_eq!(fsm.history().count(), 0);
        assert_eq!(fsm.state(), MemberState::Idle);
    }

    #[test]
    fn test_user_capabilities_resolve_and_release() {
        let mut fx = Fixture::new();
        let mut core = core();
        let mut fsm = MemberFsm::new(64);
        let mut harness = BehaviorHarness::new();
        let tree = Arc::new(BehaviorTreeDef {
            id: "rage".into(),
            root: NodeDef::Sequence {
                children: vec![
                    NodeDef::Condition {
                        name: "healthy".into(),
                        params: Params::new(),
                    },
                    NodeDef::Action {
                        name: "remember_hp".into(),
                        params: Params::new(),
                    },
                ],
            },
            capabilities: vec![
                CapabilityDef {
                    name: "healthy".into(),
                    kind: CapabilityKind::Condition,
                    body: CapabilityBody::Expression {
                        expr: "self.hp.current > 50".into(),
                        store_as: None,
                    },
                    lifetime: CapabilityLifetime::Tree,
                },
                CapabilityDef {
                    name: "remember_hp".into(),
                    kind: CapabilityKind::Action,
                    body: CapabilityBody::Expression {
                        expr: "self.hp.current * 2".into(),
                        store_as: Some("doubled".into()),
                    },
                    lifetime: CapabilityLifetime::Tree,
                },
            ],
        });
        harness.set_primary(tree, &mut core, &fx.registry).unwrap();
        assert_eq!(harness.capabilities().len(), 2);

        let report = harness.tick(&mut core, &mut fsm, &mut fx.env(1));
        assert_eq!(report.primary_completed, Some(TreeStatus::Succeeded));
        assert_eq!(
            core.blackboard.get("doubled").map(|v| v.as_number()),
            Some(200.0)
        );
        assert!(harness.capabilities().is_empty());
    }

    #[test]
    fn test_shared_capability_outlives_first_tree() {
        let mut fx = Fixture::new();
        let mut core = core();
        let mut fsm = MemberFsm::new(64);
        let mut harness = BehaviorHarness::new();
        let mark = |value: &str| CapabilityDef {
            name: "mark".into(),
            kind: CapabilityKind::Action,
            body: CapabilityBody::Expression {
                expr: value.into(),
                store_as: Some("hit".into()),
            },
            lifetime: CapabilityLifetime::Tree,
        };
        let short = Arc::new(BehaviorTreeDef {
            id: "short".into(),
            root: NodeDef::Wait { frames: 1 },
            capabilities: vec![mark("1")],
        });
        let long = Arc::new(BehaviorTreeDef {
            id: "long".into(),
            root: NodeDef::Sequence {
                children: vec![
                    NodeDef::Wait { frames: 2 },
                    NodeDef::Action {
                        name: "mark".into(),
                        params: Params::new(),
                    },
                ],
            },
            capabilities: vec![mark("2")],
        });
        harness.add_buff(short, &fx.registry).unwrap();
        harness.add_buff(long, &fx.registry).unwrap();

        let report = harness.tick(&mut core, &mut fsm, &mut fx.env(1));
        assert_eq!(report.buffs_completed, 1);
        assert!(harness.capabilities().contains("mark"));

        let report = harness.tick(&mut core, &mut fsm, &mut fx.env(2));
        assert_eq!(report.buffs_completed, 1);
        assert_eq!(core.blackboard.get("hit").map(|v| v.as_number()), Some(2.0));
        assert!(harness.capabilities().is_empty());
    }

    #[test]
    fn test_failed_registration_leaves_harness_empty() {
        let fx = Fixture::new();
        let mut core = core();
        let mut harness = BehaviorHarness::new();
        let tree = Arc::new(BehaviorTreeDef {
            id: "broken".into(),
            root: NodeDef::Wait { frames: 1 },
            capabilities: vec![CapabilityDef {
                name: "bad".into(),
                kind: CapabilityKind::Condition,
                body: CapabilityBody::Expression {
                    expr: "((".into(),
                    store_as: None,
                },
                lifetime: CapabilityLifetime::Member,
            }],
        });
        assert!(harness.set_primary(tree, &mut core, &fx.registry).is_err());
        assert!(harness.primary().is_none());
        assert!(harness.capabilities().is_empty());
    }

    #[test]
    fn test_modifiers_removed_with_tree() {
        let mut fx = Fixture::new();
        let mut core = core();
        core.stats.set_base("attack", 10.0);
        let mut fsm = MemberFsm::new(64);
        let mut harness = BehaviorHarness::new();
        let mut params = Params::new();
        params.insert("path".into(), "attack".into());
        params.insert("value".into(), 5.into());
        harness
            .add_buff(
                def(
                    "sharpen",
                    NodeDef::Sequence {
                        children: vec![
                            NodeDef::Action {
                                name: "apply_modifier".into(),
                                params,
                            },
                            NodeDef::Wait { frames: 2 },
                        ],
                    },
                ),
                &fx.registry,
            )
            .unwrap();

        harness.tick(&mut core, &mut fsm, &mut fx.env(1));
        assert_eq!(core.stats.get_value("attack"), Some(15.0));
        harness.tick(&mut core, &mut fsm, &mut fx.env(2));
        assert_eq!(core.stats.get_value("attack"), Some(10.0));
    }
}
