//! What a capability can see and do while it runs
//!
//! A [`CapabilityContext`] only lives for one capability call. Side effects
//! that reach beyond the owning member (damage on others, render cues,
//! domain events, new queue events) are collected in the [`EffectSink`] and
//! applied by the engine after the world tick.

use rand_chacha::ChaCha8Rng;

use crate::behavior::capability::CapabilityRegistry;
use crate::behavior::tree::TreeLibrary;
use crate::core::types::{EntityId, Frame, Vec2};
use crate::entity::member::MemberCore;
use crate::events::types::EventDraft;
use crate::expression::{ExpressionEvaluator, Value, ValueLookup};
use crate::protocol::output::{DomainEventKind, MemberDomainEvent};
use crate::world::view::WorldView;

/// Area damage resolved by the engine against post-tick positions
#[derive(Debug, Clone, PartialEq)]
pub struct DamageAreaRequest {
    pub source: EntityId,
    pub source_camp: String,
    pub center: Vec2,
    pub radius: f32,
    pub amount: f64,
    pub delay: Frame,
    /// Also hit members of the source's own camp
    pub include_allies: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderDraft {
    pub entity_id: EntityId,
    pub name: String,
    pub params: Option<serde_json::Value>,
}

/// Effects requested during a frame, flushed by the engine
#[derive(Debug, Default)]
pub struct EffectSink {
    pub drafts: Vec<EventDraft>,
    pub damage_areas: Vec<DamageAreaRequest>,
    pub renders: Vec<RenderDraft>,
    pub domain: Vec<MemberDomainEvent>,
}

impl EffectSink {
    pub fn schedule(&mut self, draft: EventDraft) {
        self.drafts.push(draft);
    }

    pub fn request_damage_area(&mut self, request: DamageAreaRequest) {
        self.damage_areas.push(request);
    }

    pub fn emit_render(&mut self, entity_id: &EntityId, name: impl Into<String>, params: Option<serde_json::Value>) {
        self.renders.push(RenderDraft {
            entity_id: entity_id.clone(),
            name: name.into(),
            params,
        });
    }

    pub fn emit_domain(&mut self, entity_id: &EntityId, frame: Frame, kind: DomainEventKind) {
        self.domain.push(MemberDomainEvent {
            entity_id: entity_id.clone(),
            frame,
            kind,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
            && self.damage_areas.is_empty()
            && self.renders.is_empty()
            && self.domain.is_empty()
    }

    /// Move everything out, leaving the sink empty
    pub fn take(&mut self) -> EffectSink {
        std::mem::take(self)
    }
}

/// Engine services borrowed for one delivery or tick
pub struct TickEnv<'a> {
    pub frame: Frame,
    pub registry: &'a CapabilityRegistry,
    pub trees: &'a TreeLibrary,
    pub world: &'a WorldView,
    pub evaluator: &'a mut ExpressionEvaluator,
    pub effects: &'a mut EffectSink,
    pub rng: &'a mut ChaCha8Rng,
}

/// Variable resolution for expressions evaluated on behalf of a member
///
/// - `frame`
/// - `self.x`, `self.y`, `self.alive`, `self.<stat path>`
/// - `target.x`, `target.y`, `target.alive`, `target.hp.current`,
///   `target.hp.max`, `target.distance`
/// - `has_target`
/// - `var.<key>`, or a bare blackboard key
pub struct MemberScope<'s> {
    pub core: &'s MemberCore,
    pub world: &'s WorldView,
    pub frame: Frame,
}

/// Names resolved by [`MemberScope`] that user capabilities may not take
pub const ENGINE_PROPERTIES: &[&str] = &["frame", "self", "target", "var", "has_target"];

impl ValueLookup for MemberScope<'_> {
    fn lookup(&self, path: &str) -> Option<Value> {
        if path == "frame" {
            return Some(Value::Number(self.frame as f64));
        }
        if path == "has_target" {
            return Some(Value::Bool(self.core.target_id.is_some()));
        }
        if let Some(rest) = path.strip_prefix("self.") {
            return match rest {
                "x" => Some(Value::Number(self.core.position.x as f64)),
                "y" => Some(Value::Number(self.core.position.y as f64)),
                "alive" => Some(Value::Bool(self.core.alive)),
                _ => self.core.stats.get_value(rest).map(Value::Number),
            };
        }
        if let Some(rest) = path.strip_prefix("target.") {
            let target = self.world.get(self.core.target_id.as_ref()?)?;
            return match rest {
                "x" => Some(Value::Number(target.position.x as f64)),
                "y" => Some(Value::Number(target.position.y as f64)),
                "alive" => Some(Value::Bool(target.alive)),
                "hp.current" | "hp" => Some(Value::Number(target.hp)),
                "hp.max" => Some(Value::Number(target.hp_max)),
                "distance" => Some(Value::Number(
                    target.position.distance(&self.core.position) as f64,
                )),
                _ => None,
            };
        }
        if let Some(key) = path.strip_prefix("var.") {
            return self.core.blackboard.get(key).copied();
        }
        self.core.blackboard.get(path).copied()
    }
}

/// Borrowed view handed to one capability call
pub struct CapabilityContext<'c, 'a> {
    pub member: &'c mut MemberCore,
    pub env: &'c mut TickEnv<'a>,
    /// Source tag (`"{def}#{instance}"`) of the tree running the capability;
    /// modifiers it applies are removed with that tree
    pub source_tag: &'c str,
}

impl<'c, 'a> CapabilityContext<'c, 'a> {
    pub fn new(member: &'c mut MemberCore, env: &'c mut TickEnv<'a>, source_tag: &'c str) -> Self {
        Self {
            member,
            env,
            source_tag,
        }
    }

    pub fn frame(&self) -> Frame {
        self.env.frame
    }

    pub fn id(&self) -> &EntityId {
        &self.member.id
    }

    pub fn position(&self) -> Vec2 {
        self.member.position
    }

    pub fn target_id(&self) -> Option<&EntityId> {
        self.member.target_id.as_ref()
    }

    pub fn world(&self) -> &WorldView {
        self.env.world
    }

    pub fn evaluate(&mut self, expression: &str) -> Value {
        let scope = MemberScope {
            core: self.member,
            world: self.env.world,
            frame: self.env.frame,
        };
        self.env
            .evaluator
            .evaluate(expression, self.member.id.as_str(), &scope)
    }

    pub fn evaluate_bool(&mut self, expression: &str) -> bool {
        self.evaluate(expression).truthy()
    }

    pub fn request_damage_area(&mut self, center: Vec2, radius: f32, amount: f64, delay: Frame) {
        let request = DamageAreaRequest {
            source: self.member.id.clone(),
            source_camp: self.member.camp_id.clone(),
            center,
            radius,
            amount,
            delay,
            include_allies: false,
        };
        self.env.effects.request_damage_area(request);
    }

    pub fn emit_render(&mut self, name: &str, params: Option<serde_json::Value>) {
        self.env.effects.emit_render(&self.member.id, name, params);
    }

    pub fn emit_domain(&mut self, kind: DomainEventKind) {
        self.env
            .effects
            .emit_domain(&self.member.id, self.env.frame, kind);
    }

    /// Schedule a queue event; the source defaults to this member
    pub fn schedule(&mut self, mut draft: EventDraft) {
        if draft.source.is_empty() {
            draft.source = self.member.id.to_string();
        }
        self.env.effects.schedule(draft);
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut *self.env.rng
    }
}
