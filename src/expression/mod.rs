//! Embedded expression language used by behavior trees and capabilities.
//!
//! Expressions reference entity state only through [`ValueLookup`], so a
//! compiled expression can be cached and re-evaluated against live values.

pub mod ast;
pub mod evaluator;

pub use ast::{BinOp, EvalError, Expr, ParseError, UnaryOp, Value, ValueLookup};
pub use evaluator::{CacheStats, ExpressionEvaluator};
