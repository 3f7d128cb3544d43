//! Data-only behavior tree definitions and their runtime instances
//!
//! Definitions are plain serde data. A [`BehaviorTree`] compiles one into a
//! node graph that keeps its own cursor state between ticks, so a `Running`
//! child resumes where it left off on the next frame.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::behavior::capability::CapabilityDef;
use crate::core::types::{Frame, TreeInstanceId};

/// Free-form parameters handed to a leaf's capability
pub type Params = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeDef {
    Sequence {
        children: Vec<NodeDef>,
    },
    Selector {
        children: Vec<NodeDef>,
    },
    /// Ticks every child each frame; succeeds once `success_threshold`
    /// children have succeeded (all of them by default)
    Parallel {
        children: Vec<NodeDef>,
        #[serde(default)]
        success_threshold: Option<usize>,
    },
    Inverter {
        child: Box<NodeDef>,
    },
    Succeeder {
        child: Box<NodeDef>,
    },
    /// Runs the child `times` times (0 = until it fails), one pass per tick
    Repeat {
        child: Box<NodeDef>,
        #[serde(default)]
        times: u32,
    },
    Wait {
        frames: Frame,
    },
    Action {
        name: String,
        #[serde(default)]
        params: Params,
    },
    Condition {
        name: String,
        #[serde(default)]
        params: Params,
    },
}

impl NodeDef {
    /// Visit every leaf `(is_action, name)` in the subtree
    pub fn leaves(&self) -> Vec<(bool, &str)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<(bool, &'a str)>) {
        match self {
            NodeDef::Sequence { children }
            | NodeDef::Selector { children }
            | NodeDef::Parallel { children, .. } => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
            NodeDef::Inverter { child }
            | NodeDef::Succeeder { child }
            | NodeDef::Repeat { child, .. } => child.collect_leaves(out),
            NodeDef::Wait { .. } => {}
            NodeDef::Action { name, .. } => out.push((true, name)),
            NodeDef::Condition { name, .. } => out.push((false, name)),
        }
    }
}

/// A named tree plus the capabilities it brings along
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorTreeDef {
    pub id: String,
    pub root: NodeDef,
    #[serde(default)]
    pub capabilities: Vec<CapabilityDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeStatus {
    Running,
    Succeeded,
    Failed,
}

impl TreeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TreeStatus::Running)
    }

    pub fn from_bool(ok: bool) -> Self {
        if ok {
            TreeStatus::Succeeded
        } else {
            TreeStatus::Failed
        }
    }
}

/// Resolves leaf names to behavior; implemented by the harness
pub trait LeafRunner {
    fn run_action(&mut self, name: &str, params: &Params) -> TreeStatus;
    fn check_condition(&mut self, name: &str, params: &Params) -> bool;
}

#[derive(Debug)]
enum Node {
    Sequence {
        children: Vec<Node>,
        current: usize,
    },
    Selector {
        children: Vec<Node>,
        current: usize,
    },
    Parallel {
        children: Vec<Node>,
        results: Vec<Option<TreeStatus>>,
        threshold: usize,
    },
    Inverter(Box<Node>),
    Succeeder(Box<Node>),
    Repeat {
        child: Box<Node>,
        times: u32,
        count: u32,
    },
    Wait {
        frames: Frame,
        remaining: Option<Frame>,
    },
    Action {
        name: String,
        params: Params,
    },
    Condition {
        name: String,
        params: Params,
    },
}

impl Node {
    fn compile(def: &NodeDef) -> Self {
        match def {
            NodeDef::Sequence { children } => Node::Sequence {
                children: children.iter().map(Node::compile).collect(),
                current: 0,
            },
            NodeDef::Selector { children } => Node::Selector {
                children: children.iter().map(Node::compile).collect(),
                current: 0,
            },
            NodeDef::Parallel {
                children,
                success_threshold,
            } => Node::Parallel {
                results: vec![None; children.len()],
                threshold: success_threshold
                    .unwrap_or(children.len())
                    .min(children.len()),
                children: children.iter().map(Node::compile).collect(),
            },
            NodeDef::Inverter { child } => Node::Inverter(Box::new(Node::compile(child))),
            NodeDef::Succeeder { child } => Node::Succeeder(Box::new(Node::compile(child))),
            NodeDef::Repeat { child, times } => Node::Repeat {
                child: Box::new(Node::compile(child)),
                times: *times,
                count: 0,
            },
            NodeDef::Wait { frames } => Node::Wait {
                frames: *frames,
                remaining: None,
            },
            NodeDef::Action { name, params } => Node::Action {
                name: name.clone(),
                params: params.clone(),
            },
            NodeDef::Condition { name, params } => Node::Condition {
                name: name.clone(),
                params: params.clone(),
            },
        }
    }

    fn reset(&mut self) {
        match self {
            Node::Sequence { children, current } | Node::Selector { children, current } => {
                *current = 0;
                children.iter_mut().for_each(Node::reset);
            }
            Node::Parallel {
                children, results, ..
            } => {
                results.iter_mut().for_each(|r| *r = None);
                children.iter_mut().for_each(Node::reset);
            }
            Node::Inverter(child) | Node::Succeeder(child) => child.reset(),
            Node::Repeat { child, count, .. } => {
                *count = 0;
                child.reset();
            }
            Node::Wait { remaining, .. } => *remaining = None,
            Node::Action { .. } | Node::Condition { .. } => {}
        }
    }

    fn tick(&mut self, runner: &mut dyn LeafRunner) -> TreeStatus {
        let status = match self {
            Node::Sequence { children, current } => {
                let mut status = TreeStatus::Succeeded;
                while *current < children.len() {
                    match children[*current].tick(runner) {
                        TreeStatus::Succeeded => *current += 1,
                        other => {
                            status = other;
                            break;
                        }
                    }
                }
                status
            }
            Node::Selector { children, current } => {
                let mut status = TreeStatus::Failed;
                while *current < children.len() {
                    match children[*current].tick(runner) {
                        TreeStatus::Failed => *current += 1,
                        other => {
                            status = other;
                            break;
                        }
                    }
                }
                status
            }
            Node::Parallel {
                children,
                results,
                threshold,
            } => {
                for (child, result) in children.iter_mut().zip(results.iter_mut()) {
                    if result.is_none() {
                        let status = child.tick(runner);
                        if status.is_terminal() {
                            *result = Some(status);
                        }
                    }
                }
                let succeeded = results
                    .iter()
                    .filter(|r| **r == Some(TreeStatus::Succeeded))
                    .count();
                let failed = results
                    .iter()
                    .filter(|r| **r == Some(TreeStatus::Failed))
                    .count();
                if succeeded >= *threshold {
                    TreeStatus::Succeeded
                } else if failed > children.len() - *threshold {
                    TreeStatus::Failed
                } else {
                    TreeStatus::Running
                }
            }
            Node::Inverter(child) => match child.tick(runner) {
                TreeStatus::Succeeded => TreeStatus::Failed,
                TreeStatus::Failed => TreeStatus::Succeeded,
                TreeStatus::Running => TreeStatus::Running,
            },
            Node::Succeeder(child) => match child.tick(runner) {
                TreeStatus::Running => TreeStatus::Running,
                _ => TreeStatus::Succeeded,
            },
            Node::Repeat {
                child,
                times,
                count,
            } => match child.tick(runner) {
                TreeStatus::Running => TreeStatus::Running,
                TreeStatus::Failed => TreeStatus::Failed,
                TreeStatus::Succeeded => {
                    *count += 1;
                    child.reset();
                    if *times > 0 && *count >= *times {
                        TreeStatus::Succeeded
                    } else {
                        TreeStatus::Running
                    }
                }
            },
            Node::Wait { frames, remaining } => {
                let left = remaining.get_or_insert(*frames);
                if *left <= 1 {
                    TreeStatus::Succeeded
                } else {
                    *left -= 1;
                    TreeStatus::Running
                }
            }
            Node::Action { name, params } => runner.run_action(name, params),
            Node::Condition { name, params } => {
                TreeStatus::from_bool(runner.check_condition(name, params))
            }
        };

        if status.is_terminal() {
            self.reset();
        }
        status
    }
}

/// A live instance of a tree definition
#[derive(Debug)]
pub struct BehaviorTree {
    instance: TreeInstanceId,
    def: Arc<BehaviorTreeDef>,
    root: Node,
    status: TreeStatus,
    ticks: u64,
    source_tag: String,
}

impl BehaviorTree {
    pub fn new(instance: TreeInstanceId, def: Arc<BehaviorTreeDef>) -> Self {
        let root = Node::compile(&def.root);
        let source_tag = format!("{}#{}", def.id, instance);
        Self {
            instance,
            def,
            root,
            status: TreeStatus::Running,
            ticks: 0,
            source_tag,
        }
    }

    /// Tag stamped on stat modifiers this instance applies
    pub fn source_tag(&self) -> &str {
        &self.source_tag
    }

    pub fn instance(&self) -> TreeInstanceId {
        self.instance
    }

    pub fn def_id(&self) -> &str {
        &self.def.id
    }

    pub fn def(&self) -> &Arc<BehaviorTreeDef> {
        &self.def
    }

    pub fn status(&self) -> TreeStatus {
        self.status
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance one step. Ticking a finished tree returns its final status.
    pub fn tick(&mut self, runner: &mut dyn LeafRunner) -> TreeStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        self.ticks += 1;
        self.status = self.root.tick(runner);
        self.status
    }
}

/// Tree definitions from the INIT payload, by id
#[derive(Debug, Default)]
pub struct TreeLibrary {
    defs: AHashMap<String, Arc<BehaviorTreeDef>>,
}

impl TreeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later definitions with a repeated id replace earlier ones
    pub fn from_defs(defs: impl IntoIterator<Item = BehaviorTreeDef>) -> Self {
        let mut library = Self::new();
        for def in defs {
            library.insert(def);
        }
        library
    }

    pub fn insert(&mut self, def: BehaviorTreeDef) {
        if self.defs.contains_key(&def.id) {
            tracing::warn!("Behavior tree '{}' defined twice, keeping the last one", def.id);
        }
        self.defs.insert(def.id.clone(), Arc::new(def));
    }

    pub fn get(&self, id: &str) -> Option<Arc<BehaviorTreeDef>> {
        self.defs.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}
