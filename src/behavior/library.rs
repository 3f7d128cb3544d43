//! Built-in capabilities
//!
//! Every name registered here is reserved: user capabilities cannot shadow
//! them. Numeric parameters accept either a number or an expression string
//! evaluated against the running member.

use rand::Rng;
use serde_json::json;

use crate::behavior::capability::CapabilityRegistry;
use crate::behavior::context::CapabilityContext;
use crate::behavior::tree::{Params, TreeStatus};
use crate::core::types::{EntityId, Vec2};
use crate::events::types::{EventDraft, QueueEventType};
use crate::protocol::output::DomainEventKind;
use crate::stats::{adjust_resource, resource, StatModifier};

const DEFAULT_SPEED: f32 = 1.0;
const DEFAULT_MELEE_RANGE: f32 = 1.0;

pub fn register_all(registry: &mut CapabilityRegistry) {
    registry.register_action("move_to", move_to);
    registry.register_action("move_to_target", move_to_target);
    registry.register_action("stop_moving", stop_moving);
    registry.register_action("select_nearest_enemy", select_nearest_enemy);
    registry.register_action("select_random_enemy", select_random_enemy);
    registry.register_action("clear_target", clear_target);
    registry.register_action("damage_target", damage_target);
    registry.register_action("damage_area", damage_area);
    registry.register_action("heal_self", heal_self);
    registry.register_action("apply_modifier", apply_modifier);
    registry.register_action("apply_buff", apply_buff);
    registry.register_action("set_var", set_var);
    registry.register_action("emit_render", emit_render);
    registry.register_action("emit_event", emit_event);
    registry.register_action("consume_mp", consume_mp);

    registry.register_condition("has_target", has_target);
    registry.register_condition("target_in_range", target_in_range);
    registry.register_condition("target_alive", target_alive);
    registry.register_condition("hp_below", hp_below);
    registry.register_condition("mp_at_least", mp_at_least);
    registry.register_condition("expr", expr);
    registry.register_condition("var_truthy", var_truthy);
}

/// Number or expression parameter
fn number(ctx: &mut CapabilityContext<'_, '_>, params: &Params, key: &str) -> Option<f64> {
    match params.get(key)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(e) => Some(ctx.evaluate(e).as_number()),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn text<'p>(params: &'p Params, key: &str) -> Option<&'p str> {
    params.get(key).and_then(|v| v.as_str())
}

fn speed(ctx: &CapabilityContext<'_, '_>) -> f32 {
    ctx.member
        .stats
        .get_value("speed")
        .map(|s| s as f32)
        .unwrap_or(DEFAULT_SPEED)
}

/// Living target from the start-of-frame view
fn living_target(ctx: &CapabilityContext<'_, '_>) -> Option<(EntityId, Vec2)> {
    let target = ctx.world().get(ctx.target_id()?)?;
    target.alive.then(|| (target.id.clone(), target.position))
}

/// One movement step towards `dest`; Succeeded on arrival
fn step_towards(ctx: &mut CapabilityContext<'_, '_>, dest: Vec2) -> TreeStatus {
    if ctx.member.move_target.replace(dest).is_none() {
        ctx.emit_domain(DomainEventKind::MoveStart {
            x: dest.x,
            y: dest.y,
        });
    }
    let (pos, arrived) = ctx.member.position.step_towards(dest, speed(ctx));
    ctx.member.position = pos;
    if arrived {
        ctx.member.move_target = None;
        ctx.emit_domain(DomainEventKind::MoveStop);
        TreeStatus::Succeeded
    } else {
        TreeStatus::Running
    }
}

fn move_to(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> TreeStatus {
    match (number(ctx, params, "x"), number(ctx, params, "y")) {
        (Some(x), Some(y)) => step_towards(ctx, Vec2::new(x as f32, y as f32)),
        _ => {
            tracing::warn!("move_to on {} without x/y", ctx.id());
            TreeStatus::Failed
        }
    }
}

fn move_to_target(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> TreeStatus {
    let Some((_, target_pos)) = living_target(ctx) else {
        return TreeStatus::Failed;
    };
    let range = number(ctx, params, "range")
        .map(|r| r as f32)
        .unwrap_or(DEFAULT_MELEE_RANGE);
    if ctx.position().distance(&target_pos) <= range {
        if ctx.member.move_target.take().is_some() {
            ctx.emit_domain(DomainEventKind::MoveStop);
        }
        return TreeStatus::Succeeded;
    }
    // stop at the edge of the range rather than on top of the target
    let offset = (ctx.position() - target_pos).normalize() * range;
    step_towards(ctx, target_pos + offset)
}

fn stop_moving(ctx: &mut CapabilityContext<'_, '_>, _params: &Params) -> TreeStatus {
    if ctx.member.move_target.take().is_some() {
        ctx.emit_domain(DomainEventKind::MoveStop);
    }
    TreeStatus::Succeeded
}

fn select_nearest_enemy(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> TreeStatus {
    let range = number(ctx, params, "range").map(|r| r as f32);
    let found = ctx
        .world()
        .nearest_enemy(ctx.position(), &ctx.member.camp_id, range)
        .map(|m| m.id.clone());
    match found {
        Some(id) => {
            ctx.member.target_id = Some(id);
            TreeStatus::Succeeded
        }
        None => TreeStatus::Failed,
    }
}

fn select_random_enemy(ctx: &mut CapabilityContext<'_, '_>, _params: &Params) -> TreeStatus {
    let world = ctx.env.world;
    let candidates: Vec<EntityId> = world
        .living_enemies(&ctx.member.camp_id)
        .map(|m| m.id.clone())
        .collect();
    if candidates.is_empty() {
        return TreeStatus::Failed;
    }
    let pick = ctx.rng().gen_range(0..candidates.len());
    ctx.member.target_id = Some(candidates[pick].clone());
    TreeStatus::Succeeded
}

fn clear_target(ctx: &mut CapabilityContext<'_, '_>, _params: &Params) -> TreeStatus {
    ctx.member.target_id = None;
    TreeStatus::Succeeded
}

fn damage_target(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> TreeStatus {
    let Some((target, _)) = living_target(ctx) else {
        return TreeStatus::Failed;
    };
    let Some(amount) = number(ctx, params, "amount") else {
        tracing::warn!("damage_target on {} without amount", ctx.id());
        return TreeStatus::Failed;
    };
    let delay = number(ctx, params, "delay").unwrap_or(0.0).max(0.0) as u64;
    let source = ctx.id().clone();
    ctx.schedule(
        EventDraft::new(QueueEventType::Damage, delay)
            .target(target)
            .payload(json!({ "amount": amount, "source": source })),
    );
    TreeStatus::Succeeded
}

fn damage_area(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> TreeStatus {
    let (Some(radius), Some(amount)) = (number(ctx, params, "radius"), number(ctx, params, "amount"))
    else {
        tracing::warn!("damage_area on {} without radius/amount", ctx.id());
        return TreeStatus::Failed;
    };
    let center = match (number(ctx, params, "x"), number(ctx, params, "y")) {
        (Some(x), Some(y)) => Vec2::new(x as f32, y as f32),
        _ => ctx.position(),
    };
    let delay = number(ctx, params, "delay").unwrap_or(0.0).max(0.0) as u64;
    ctx.request_damage_area(center, radius as f32, amount, delay);
    TreeStatus::Succeeded
}

fn heal_self(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> TreeStatus {
    let Some(amount) = number(ctx, params, "amount") else {
        return TreeStatus::Failed;
    };
    adjust_resource(ctx.member.stats.as_mut(), "hp", amount.max(0.0));
    TreeStatus::Succeeded
}

fn apply_modifier(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> TreeStatus {
    let (Some(path), Some(value)) = (text(params, "path"), number(ctx, params, "value")) else {
        return TreeStatus::Failed;
    };
    let source = ctx.source_tag.to_string();
    let modifier = match text(params, "kind") {
        Some("percent") => StatModifier::percent(path, value, source),
        _ => StatModifier::flat(path, value, source),
    };
    ctx.member.stats.add_modifier(modifier);
    TreeStatus::Succeeded
}

fn apply_buff(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> TreeStatus {
    let Some(tree) = text(params, "tree") else {
        return TreeStatus::Failed;
    };
    if ctx.env.trees.get(tree).is_none() {
        tracing::warn!("apply_buff on {}: unknown tree '{}'", ctx.id(), tree);
        return TreeStatus::Failed;
    }
    let target = match text(params, "target") {
        Some("target") => match living_target(ctx) {
            Some((id, _)) => id,
            None => return TreeStatus::Failed,
        },
        _ => ctx.id().clone(),
    };
    ctx.schedule(
        EventDraft::new(QueueEventType::ApplyBuff, 0)
            .target(target)
            .payload(json!({ "tree": tree })),
    );
    TreeStatus::Succeeded
}

fn set_var(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> TreeStatus {
    let Some(key) = text(params, "key") else {
        return TreeStatus::Failed;
    };
    let value = match params.get("expr").or_else(|| params.get("value")) {
        Some(serde_json::Value::String(e)) => ctx.evaluate(e),
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0).into(),
        Some(serde_json::Value::Bool(b)) => (*b).into(),
        _ => return TreeStatus::Failed,
    };
    ctx.member.blackboard.insert(key.to_string(), value);
    TreeStatus::Succeeded
}

fn emit_render(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> TreeStatus {
    let Some(name) = text(params, "name") else {
        return TreeStatus::Failed;
    };
    let extra = params.get("params").cloned();
    ctx.emit_render(name, extra);
    TreeStatus::Succeeded
}

fn emit_event(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> TreeStatus {
    let Some(kind) = text(params, "kind") else {
        return TreeStatus::Failed;
    };
    ctx.emit_domain(DomainEventKind::Custom {
        name: kind.to_string(),
    });
    TreeStatus::Succeeded
}

fn consume_mp(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> TreeStatus {
    let Some(amount) = number(ctx, params, "amount") else {
        return TreeStatus::Failed;
    };
    let (current, _) = resource(ctx.member.stats.as_ref(), "mp");
    if current < amount {
        return TreeStatus::Failed;
    }
    adjust_resource(ctx.member.stats.as_mut(), "mp", -amount);
    TreeStatus::Succeeded
}

fn has_target(ctx: &mut CapabilityContext<'_, '_>, _params: &Params) -> bool {
    ctx.target_id().is_some()
}

fn target_alive(ctx: &mut CapabilityContext<'_, '_>, _params: &Params) -> bool {
    living_target(ctx).is_some()
}

fn target_in_range(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> bool {
    let Some((_, pos)) = living_target(ctx) else {
        return false;
    };
    let range = number(ctx, params, "range")
        .map(|r| r as f32)
        .unwrap_or(DEFAULT_MELEE_RANGE);
    ctx.position().distance(&pos) <= range
}

fn hp_below(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> bool {
    let ratio = number(ctx, params, "ratio").unwrap_or(0.5);
    let (current, max) = resource(ctx.member.stats.as_ref(), "hp");
    max > 0.0 && current / max < ratio
}

fn mp_at_least(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> bool {
    let amount = number(ctx, params, "amount").unwrap_or(0.0);
    resource(ctx.member.stats.as_ref(), "mp").0 >= amount
}

fn expr(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> bool {
    match text(params, "expr") {
        Some(e) => ctx.evaluate_bool(e),
        None => false,
    }
}

fn var_truthy(ctx: &mut CapabilityContext<'_, '_>, params: &Params) -> bool {
    text(params, "key")
        .and_then(|k| ctx.member.blackboard.get(k))
        .map_or(false, |v| v.truthy())
}
