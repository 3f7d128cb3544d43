//! Cached expression evaluation with safe defaults

use ahash::AHashMap;
use std::sync::Arc;

use crate::core::error::SimError;
use crate::expression::ast::{Expr, Value, ValueLookup};

/// Compiled form cached for one (scope, expression) pair
#[derive(Debug, Clone)]
enum CacheEntry {
    Compiled(Arc<Expr>),
    /// Parse failures are remembered so they are reported once
    Invalid(String),
}

/// Cache counters for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub failures: u64,
}

/// Compiles and caches small expressions; every evaluation failure is
/// contained here and turned into a default value.
#[derive(Debug, Default)]
pub struct ExpressionEvaluator {
    cache: AHashMap<String, AHashMap<String, CacheEntry>>,
    hits: u64,
    misses: u64,
    failures: u64,
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile (or fetch from cache) an expression for `scope`
    pub fn compile(&mut self, expression: &str, scope: &str) -> Result<Arc<Expr>, SimError> {
        if let Some(entry) = self.cache.get(scope).and_then(|s| s.get(expression)) {
            self.hits += 1;
            return match entry {
                CacheEntry::Compiled(expr) => Ok(Arc::clone(expr)),
                CacheEntry::Invalid(msg) => Err(SimError::Expression(msg.clone())),
            };
        }

        self.misses += 1;
        let entry = match Expr::parse(expression) {
            Ok(expr) => CacheEntry::Compiled(Arc::new(expr)),
            Err(e) => CacheEntry::Invalid(format!("'{}': {}", expression, e)),
        };
        let result = match &entry {
            CacheEntry::Compiled(expr) => Ok(Arc::clone(expr)),
            CacheEntry::Invalid(msg) => Err(SimError::Expression(msg.clone())),
        };
        self.cache
            .entry(scope.to_string())
            .or_default()
            .insert(expression.to_string(), entry);
        result
    }

    /// Evaluate, surfacing the error to the caller
    pub fn try_evaluate(
        &mut self,
        expression: &str,
        scope: &str,
        lookup: &dyn ValueLookup,
    ) -> Result<Value, SimError> {
        let expr = self.compile(expression, scope)?;
        expr.evaluate(lookup)
            .map_err(|e| SimError::Expression(format!("'{}': {}", expression, e)))
    }

    /// Evaluate; any failure is logged and yields `Number(0.0)`
    pub fn evaluate(&mut self, expression: &str, scope: &str, lookup: &dyn ValueLookup) -> Value {
        match self.try_evaluate(expression, scope, lookup) {
            Ok(value) => value,
            Err(e) => {
                self.failures += 1;
                tracing::warn!("Expression failed in scope {}: {}", scope, e);
                Value::default()
            }
        }
    }

    /// Numeric evaluation, 0.0 on failure
    pub fn evaluate_number(&mut self, expression: &str, scope: &str, lookup: &dyn ValueLookup) -> f64 {
        self.evaluate(expression, scope, lookup).as_number()
    }

    /// Boolean evaluation, false on failure
    pub fn evaluate_bool(&mut self, expression: &str, scope: &str, lookup: &dyn ValueLookup) -> bool {
        match self.try_evaluate(expression, scope, lookup) {
            Ok(value) => value.truthy(),
            Err(e) => {
                self.failures += 1;
                tracing::warn!("Condition failed in scope {}: {}", scope, e);
                false
            }
        }
    }

    /// Drop every cached expression for one scope
    pub fn invalidate_scope(&mut self, scope: &str) {
        self.cache.remove(scope);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.values().map(|s| s.len()).sum(),
            hits: self.hits,
            misses: self.misses,
            failures: self.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_cache_hit_on_second_call() {
        let mut eval = ExpressionEvaluator::new();
        let v = vars(&[("a", 2.0)]);
        assert_eq!(eval.evaluate("a * 3", "m1", &v), Value::Number(6.0));
        assert_eq!(eval.evaluate("a * 3", "m1", &v), Value::Number(6.0));
        let stats = eval.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_values_are_looked_up_live() {
        let mut eval = ExpressionEvaluator::new();
        let mut v = vars(&[("a", 2.0)]);
        assert_eq!(eval.evaluate_number("a + 1", "s", &v), 3.0);
        v.insert("a".into(), 10.0);
        assert_eq!(eval.evaluate_number("a + 1", "s", &v), 11.0);
    }

    #[test]
    fn test_bad_expression_returns_default() {
        let mut eval = ExpressionEvaluator::new();
        let v = vars(&[]);
        assert_eq!(eval.evaluate("1 +", "s", &v), Value::Number(0.0));
        assert!(!eval.evaluate_bool("1 +", "s", &v));
        assert_eq!(eval.evaluate_number("missing * 2", "s", &v), 0.0);
        assert_eq!(eval.stats().failures, 3);
        // parse failure cached: only one miss for "1 +"
        assert_eq!(eval.stats().misses, 2);
    }

    #[test]
    fn test_scope_invalidation() {
        let mut eval = ExpressionEvaluator::new();
        let v = vars(&[("a", 1.0)]);
        eval.evaluate("a", "s1", &v);
        eval.evaluate("a", "s2", &v);
        assert_eq!(eval.stats().entries, 2);
        eval.invalidate_scope("s1");
        assert_eq!(eval.stats().entries, 1);
        eval.clear();
        assert_eq!(eval.stats().entries, 0);
    }
}
