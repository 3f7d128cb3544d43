//! Narrow read/write interface to a member's statistics
//!
//! The attribute formula subsystem lives outside this crate; the core only
//! reads values by path and pushes modifiers. [`BasicStats`] is the in-core
//! implementation used when no external store is plugged in.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// How a modifier combines with the base value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKind {
    /// Added to the base value
    Flat,
    /// Fraction added to the multiplier (0.1 = +10%)
    Percent,
}

/// A modifier pushed onto a stat path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatModifier {
    pub path: String,
    pub value: f64,
    pub kind: ModifierKind,
    /// Who applied it (buff tree id, skill id...), used for removal
    pub source: String,
}

impl StatModifier {
    pub fn flat(path: impl Into<String>, value: f64, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value,
            kind: ModifierKind::Flat,
            source: source.into(),
        }
    }

    pub fn percent(path: impl Into<String>, value: f64, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value,
            kind: ModifierKind::Percent,
            source: source.into(),
        }
    }
}

/// Runtime access to a member's statistics by path
pub trait StatView: Send + Sync + std::fmt::Debug {
    /// Get the effective value at `path`, None if the path doesn't exist
    fn get_value(&self, path: &str) -> Option<f64>;

    /// Overwrite the base value at `path`
    fn set_base(&mut self, path: &str, value: f64);

    fn add_modifier(&mut self, modifier: StatModifier);

    /// Remove all modifiers applied by `source`, returning how many went
    fn remove_modifiers_from(&mut self, source: &str) -> usize;

    /// List all known paths
    fn paths(&self) -> Vec<String>;
}

/// `(current, max)` of a resource pool such as `hp` or `mp`
pub fn resource(stats: &dyn StatView, pool: &str) -> (f64, f64) {
    let current = stats.get_value(&format!("{}.current", pool)).unwrap_or(0.0);
    let max = stats.get_value(&format!("{}.max", pool)).unwrap_or(current);
    (current, max)
}

/// Add `delta` to a resource pool, clamped to `[0, max]`; returns the new current
pub fn adjust_resource(stats: &mut dyn StatView, pool: &str, delta: f64) -> f64 {
    let (current, max) = resource(stats, pool);
    let next = (current + delta).clamp(0.0, max.max(0.0));
    stats.set_base(&format!("{}.current", pool), next);
    next
}

/// Base values plus modifier stacks, keyed by path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicStats {
    base: AHashMap<String, f64>,
    modifiers: Vec<StatModifier>,
}

impl BasicStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from template base values
    pub fn from_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut stats = Self::new();
        for (path, value) in values {
            stats.base.insert(path.into(), value);
        }
        stats.normalize_pools();
        stats
    }

    /// A pool given only as `hp` (no `.current/.max`) is expanded to full
    fn normalize_pools(&mut self) {
        for pool in ["hp", "mp"] {
            if let Some(value) = self.base.remove(pool) {
                self.base.entry(format!("{}.max", pool)).or_insert(value);
                self.base.entry(format!("{}.current", pool)).or_insert(value);
            }
        }
    }

    pub fn modifier_count(&self) -> usize {
        self.modifiers.len()
    }
}

impl StatView for BasicStats {
    fn get_value(&self, path: &str) -> Option<f64> {
        let base = *self.base.get(path)?;
        let mut flat = 0.0;
        let mut percent = 0.0;
        for m in self.modifiers.iter().filter(|m| m.path == path) {
            match m.kind {
                ModifierKind::Flat => flat += m.value,
                ModifierKind::Percent => percent += m.value,
            }
        }
        Some((base + flat) * (1.0 + percent))
    }

    fn set_base(&mut self, path: &str, value: f64) {
        self.base.insert(path.to_string(), value);
    }

    fn add_modifier(&mut self, modifier: StatModifier) {
        self.modifiers.push(modifier);
    }

    fn remove_modifiers_from(&mut self, source: &str) -> usize {
        let before = self.modifiers.len();
        self.modifiers.retain(|m| m.source != source);
        before - self.modifiers.len()
    }

    fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.base.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_value_with_modifiers() {
        let mut stats = BasicStats::from_values([("attack", 10.0)]);
        stats.add_modifier(StatModifier::flat("attack", 5.0, "buff-a"));
        stats.add_modifier(StatModifier::percent("attack", 0.5, "buff-b"));
        assert_eq!(stats.get_value("attack"), Some(22.5));
        assert_eq!(stats.get_value("nonexistent"), None);

        assert_eq!(stats.remove_modifiers_from("buff-b"), 1);
        assert_eq!(stats.get_value("attack"), Some(15.0));
    }

    #[test]
    fn test_pool_shorthand_expands() {
        let stats = BasicStats::from_values([("hp", 100.0), ("mp", 40.0)]);
        assert_eq!(resource(&stats, "hp"), (100.0, 100.0));
        assert_eq!(resource(&stats, "mp"), (40.0, 40.0));
        assert!(stats.paths().contains(&"hp.current".to_string()));
    }

    #[test]
    fn test_adjust_resource_clamps() {
        let mut stats = BasicStats::from_values([("hp", 50.0)]);
        assert_eq!(adjust_resource(&mut stats, "hp", -80.0), 0.0);
        assert_eq!(adjust_resource(&mut stats, "hp", 500.0), 50.0);
    }
}
