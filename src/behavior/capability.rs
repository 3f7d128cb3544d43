//! Capability namespaces: engine built-ins and per-member user capabilities
//!
//! Built-ins are native functions owned by the engine's
//! [`CapabilityRegistry`]; their names are reserved. A tree definition may
//! bring its own capabilities, written as an expression or as a script of
//! built-in calls. Those land in the member's [`UserCapabilities`].
//!
//! Precedence when names collide: built-in, then engine-provided runtime
//! properties, then whichever user registration came first. Later
//! registrations of a taken name from other trees are held behind the
//! active one and take over when its owner releases it.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::behavior::context::{CapabilityContext, ENGINE_PROPERTIES};
use crate::behavior::library;
use crate::behavior::tree::{BehaviorTreeDef, Params, TreeStatus};
use crate::core::error::{Result, SimError};
use crate::core::types::TreeInstanceId;
use crate::expression::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Action,
    Condition,
}

/// How long a user capability stays registered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityLifetime {
    /// Removed when the tree that registered it detaches
    #[default]
    Tree,
    /// Kept until the member is torn down
    Member,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub name: String,
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CapabilityBody {
    /// Conditions test truthiness; actions store the value in `store_as`
    Expression {
        expr: String,
        #[serde(default)]
        store_as: Option<String>,
    },
    /// Built-in actions run in order; the first non-success result wins
    Script { steps: Vec<ScriptStep> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDef {
    pub name: String,
    pub kind: CapabilityKind,
    pub body: CapabilityBody,
    #[serde(default)]
    pub lifetime: CapabilityLifetime,
}

pub type ActionFn = fn(&mut CapabilityContext<'_, '_>, &Params) -> TreeStatus;
pub type ConditionFn = fn(&mut CapabilityContext<'_, '_>, &Params) -> bool;

#[derive(Clone, Copy)]
pub enum Builtin {
    Action(ActionFn),
    Condition(ConditionFn),
}

impl Builtin {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Builtin::Action(_) => CapabilityKind::Action,
            Builtin::Condition(_) => CapabilityKind::Condition,
        }
    }
}

/// Engine-owned table of built-in capabilities
pub struct CapabilityRegistry {
    builtins: AHashMap<&'static str, Builtin>,
}

impl CapabilityRegistry {
    /// An empty registry (no reserved names)
    pub fn new() -> Self {
        Self {
            builtins: AHashMap::new(),
        }
    }

    /// Registry preloaded with the standard library
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        library::register_all(&mut registry);
        registry
    }

    pub fn register_action(&mut self, name: &'static str, f: ActionFn) {
        self.builtins.insert(name, Builtin::Action(f));
    }

    pub fn register_condition(&mut self, name: &'static str, f: ConditionFn) {
        self.builtins.insert(name, Builtin::Condition(f));
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    pub fn action(&self, name: &str) -> Option<ActionFn> {
        match self.builtins.get(name) {
            Some(Builtin::Action(f)) => Some(*f),
            _ => None,
        }
    }

    pub fn condition(&self, name: &str) -> Option<ConditionFn> {
        match self.builtins.get(name) {
            Some(Builtin::Condition(f)) => Some(*f),
            _ => None,
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<CapabilityKind> {
        self.builtins.get(name).map(Builtin::kind)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.builtins.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.builtins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builtins.is_empty()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("builtins", &self.names())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct UserCapability {
    pub def: CapabilityDef,
    pub owner: TreeInstanceId,
}

impl UserCapability {
    pub fn run_action(&self, ctx: &mut CapabilityContext<'_, '_>) -> TreeStatus {
        match &self.def.body {
            CapabilityBody::Expression { expr, store_as } => {
                let value = ctx.evaluate(expr);
                if let Some(key) = store_as {
                    ctx.member.blackboard.insert(key.clone(), value);
                }
                TreeStatus::Succeeded
            }
            CapabilityBody::Script { steps } => {
                let registry = ctx.env.registry;
                for step in steps {
                    let Some(f) = registry.action(&step.name) else {
                        return TreeStatus::Failed;
                    };
                    match f(ctx, &step.params) {
                        TreeStatus::Succeeded => {}
                        other => return other,
                    }
                }
                TreeStatus::Succeeded
            }
        }
    }

    pub fn check_condition(&self, ctx: &mut CapabilityContext<'_, '_>) -> bool {
        match &self.def.body {
            CapabilityBody::Expression { expr, .. } => ctx.evaluate_bool(expr),
            CapabilityBody::Script { .. } => false,
        }
    }
}

/// One member's user capability namespace
#[derive(Debug, Default)]
pub struct UserCapabilities {
    /// name -> registrations in arrival order; the first one is active
    entries: AHashMap<String, Vec<UserCapability>>,
}

impl UserCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every capability a tree brings, owned by `owner`
    ///
    /// Returns how many were added, including ones queued behind an
    /// existing owner. A malformed body aborts the whole set before anything
    /// is registered.
    pub fn register_tree(
        &mut self,
        tree: &BehaviorTreeDef,
        owner: TreeInstanceId,
        registry: &CapabilityRegistry,
    ) -> Result<usize> {
        for def in &tree.capabilities {
            validate(def, registry).map_err(|reason| SimError::CapabilityRegistration {
                tree: tree.id.clone(),
                reason,
            })?;
        }

        let mut added = 0;
        for def in &tree.capabilities {
            if registry.is_reserved(&def.name) {
                tracing::warn!(
                    "Tree '{}' tried to register reserved capability '{}', rejected",
                    tree.id,
                    def.name
                );
                continue;
            }
            if ENGINE_PROPERTIES.contains(&def.name.as_str()) {
                tracing::debug!(
                    "Capability '{}' shadows an engine property, engine value kept",
                    def.name
                );
                continue;
            }
            let holders = self.entries.entry(def.name.clone()).or_default();
            if holders.iter().any(|cap| cap.owner == owner) {
                tracing::debug!("Capability '{}' declared twice by tree '{}', skipping", def.name, tree.id);
                continue;
            }
            if !holders.is_empty() {
                tracing::debug!("Capability '{}' already registered, queued as fallback", def.name);
            }
            holders.push(UserCapability {
                def: def.clone(),
                owner,
            });
            added += 1;
        }
        Ok(added)
    }

    /// Drop tree-lifetime capabilities registered by `owner`
    ///
    /// A name another tree also registered stays available through that
    /// tree's copy.
    pub fn release_owner(&mut self, owner: TreeInstanceId) -> usize {
        let mut released = 0;
        self.entries.retain(|_, holders| {
            let before = holders.len();
            holders.retain(|cap| !(cap.owner == owner && cap.def.lifetime == CapabilityLifetime::Tree));
            released += before - holders.len();
            !holders.is_empty()
        });
        released
    }

    /// The active registration for `name`
    pub fn get(&self, name: &str) -> Option<&UserCapability> {
        self.entries.get(name).and_then(|holders| holders.first())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn validate(def: &CapabilityDef, registry: &CapabilityRegistry) -> std::result::Result<(), String> {
    if def.name.trim().is_empty() {
        return Err("capability with empty name".into());
    }
    match &def.body {
        CapabilityBody::Expression { expr, .. } => {
            Expr::parse(expr).map_err(|e| format!("'{}': {}", def.name, e))?;
        }
        CapabilityBody::Script { steps } => {
            if def.kind != CapabilityKind::Action {
                return Err(format!("'{}': scripts can only back actions", def.name));
            }
            if let Some(step) = steps.iter().find(|s| registry.action(&s.name).is_none()) {
                return Err(format!(
                    "'{}': script calls unknown action '{}'",
                    def.name, step.name
                ));
            }
        }
    }
    Ok(())
}
