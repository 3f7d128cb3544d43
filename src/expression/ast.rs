//! Expression AST, parser and tree-walking evaluation.
//!
//! The language is deliberately tiny: numeric and boolean literals, dotted
//! variable paths resolved live through a [`ValueLookup`], arithmetic,
//! comparison and logical operators, `if .. then .. else ..`, and a fixed
//! whitelist of pure functions. There is no assignment and no way to call
//! anything outside the whitelist.

use serde::{Deserialize, Serialize};

/// Result of evaluating an expression
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Bool(bool),
}

impl Value {
    /// Numeric view; booleans coerce to 1.0 / 0.0
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(true) => 1.0,
            Value::Bool(false) => 0.0,
        }
    }

    /// Truthiness; numbers are true when non-zero
    pub fn truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Bool(b) => *b,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Number(0.0)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Runtime access to the free variables of an expression
pub trait ValueLookup {
    /// Resolve a dotted path such as `self.hp.current`; None if unknown
    fn lookup(&self, path: &str) -> Option<Value>;
}

impl ValueLookup for std::collections::HashMap<String, f64> {
    fn lookup(&self, path: &str) -> Option<Value> {
        self.get(path).copied().map(Value::Number)
    }
}

impl ValueLookup for ahash::AHashMap<String, Value> {
    fn lookup(&self, path: &str) -> Option<Value> {
        self.get(path).copied()
    }
}

/// Binary operators supported in expressions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Neq,
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Expression AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric literal (e.g., 42.5)
    Number(f64),
    /// `true` / `false`
    Bool(bool),
    /// A variable path (e.g., "self.hp.current")
    Var(String),
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// if condition then true_expr else false_expr
    Conditional {
        condition: Box<Expr>,
        true_expr: Box<Expr>,
        false_expr: Box<Expr>,
    },
    /// A whitelisted function call (e.g., min(a, b))
    Function { name: String, args: Vec<Expr> },
}

/// Error type for expression evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Referenced a variable the lookup does not know
    UnknownVariable(String),
    /// Called a function outside the whitelist
    UnknownFunction(String),
    DivisionByZero,
    InvalidArgCount {
        func: String,
        expected: usize,
        got: usize,
    },
    /// Result was NaN or infinite
    NonFinite,
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::UnknownVariable(name) => write!(f, "Unknown variable: {}", name),
            EvalError::UnknownFunction(name) => write!(f, "Unknown function: {}", name),
            EvalError::DivisionByZero => write!(f, "Division by zero"),
            EvalError::InvalidArgCount {
                func,
                expected,
                got,
            } => {
                write!(
                    f,
                    "Function {} expected {} args, got {}",
                    func, expected, got
                )
            }
            EvalError::NonFinite => write!(f, "Result is not a finite number"),
        }
    }
}

impl std::error::Error for EvalError {}

/// Error type for expression parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Functions callable from expressions, with their arity (None = 2 or more)
const FUNCTIONS: &[(&str, Option<usize>)] = &[
    ("min", None),
    ("max", None),
    ("abs", Some(1)),
    ("floor", Some(1)),
    ("ceil", Some(1)),
    ("round", Some(1)),
    ("sqrt", Some(1)),
    ("pow", Some(2)),
    ("clamp", Some(3)),
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Op(&'static str),
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ParseError::new(format!("invalid number '{}'", text)))?;
            tokens.push(Token::Number(value));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if text.ends_with('.') || text.contains("..") {
                return Err(ParseError::new(format!("malformed path '{}'", text)));
            }
            tokens.push(Token::Ident(text));
            continue;
        }

        let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
        let op = match two.as_str() {
            "&&" => Some("&&"),
            "||" => Some("||"),
            "==" => Some("=="),
            "!=" => Some("!="),
            ">=" => Some(">="),
            "<=" => Some("<="),
            _ => None,
        };
        if let Some(op) = op {
            tokens.push(Token::Op(op));
            i += 2;
            continue;
        }

        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '+' => Token::Op("+"),
            '-' => Token::Op("-"),
            '*' => Token::Op("*"),
            '/' => Token::Op("/"),
            '%' => Token::Op("%"),
            '>' => Token::Op(">"),
            '<' => Token::Op("<"),
            '!' => Token::Op("!"),
            other => {
                return Err(ParseError::new(format!("unexpected character '{}'", other)));
            }
        };
        tokens.push(token);
        i += 1;
    }

    Ok(tokens)
}

/// Deepest nesting of parentheses, conditionals and prefix operators
pub const MAX_DEPTH: usize = 128;

/// Longest accepted token stream; bounds the depth of operator chains too
pub const MAX_TOKENS: usize = 2048;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Run `f` one nesting level deeper, failing past [`MAX_DEPTH`]
    fn nested(&mut self, f: fn(&mut Self) -> Result<Expr, ParseError>) -> Result<Expr, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::new(format!("nesting deeper than {}", MAX_DEPTH)));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        match self.next() {
            Some(ref token) if *token == expected => Ok(()),
            Some(other) => Err(ParseError::new(format!(
                "expected {:?}, found {:?}",
                expected, other
            ))),
            None => Err(ParseError::new(format!(
                "expected {:?}, found end of input",
                expected
            ))),
        }
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, ParseError> {
        if self.eat_keyword("if") {
            let condition = self.expression()?;
            if !self.eat_keyword("then") {
                return Err(ParseError::new("expected 'then'"));
            }
            let true_expr = self.expression()?;
            if !self.eat_keyword("else") {
                return Err(ParseError::new("expected 'else'"));
            }
            let false_expr = self.expression()?;
            return Ok(Expr::Conditional {
                condition: Box::new(condition),
                true_expr: Box::new(true_expr),
                false_expr: Box::new(false_expr),
            });
        }
        self.or()
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinOp)],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;
        'outer: loop {
            for (symbol, op) in ops {
                if self.eat_op(symbol) {
                    let right = next(self)?;
                    left = Expr::BinOp {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("||", BinOp::Or)], Self::and)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("&&", BinOp::And)], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("==", BinOp::Eq), ("!=", BinOp::Neq)], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[
                (">=", BinOp::Gte),
                ("<=", BinOp::Lte),
                (">", BinOp::Gt),
                ("<", BinOp::Lt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[("*", BinOp::Mul), ("/", BinOp::Div), ("%", BinOp::Mod)],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat_op("-") {
            let operand = self.nested(Self::unary)?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.eat_op("!") {
            let operand = self.nested(Self::unary)?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if name == "true" {
                    return Ok(Expr::Bool(true));
                }
                if name == "false" {
                    return Ok(Expr::Bool(false));
                }
                if name == "if" || name == "then" || name == "else" {
                    return Err(ParseError::new(format!("unexpected keyword '{}'", name)));
                }
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.pos += 1;
                    let args = self.arguments()?;
                    Ok(Expr::Function { name, args })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(other) => Err(ParseError::new(format!("unexpected token {:?}", other))),
            None => Err(ParseError::new("unexpected end of input")),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                Some(other) => {
                    return Err(ParseError::new(format!(
                        "expected ',' or ')', found {:?}",
                        other
                    )))
                }
                None => return Err(ParseError::new("unterminated argument list")),
            }
        }
    }
}

impl Expr {
    /// Parse an expression string
    pub fn parse(input: &str) -> Result<Expr, ParseError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(ParseError::new("empty expression"));
        }
        if tokens.len() > MAX_TOKENS {
            return Err(ParseError::new(format!(
                "expression has {} tokens, limit is {}",
                tokens.len(),
                MAX_TOKENS
            )));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.expression()?;
        if let Some(extra) = parser.peek() {
            return Err(ParseError::new(format!("unexpected trailing token {:?}", extra)));
        }
        expr.check_functions()?;
        Ok(expr)
    }

    /// Reject calls outside the whitelist at compile time
    fn check_functions(&self) -> Result<(), ParseError> {
        match self {
            Expr::Number(_) | Expr::Bool(_) | Expr::Var(_) => Ok(()),
            Expr::BinOp { left, right, .. } => {
                left.check_functions()?;
                right.check_functions()
            }
            Expr::UnaryOp { operand, .. } => operand.check_functions(),
            Expr::Conditional {
                condition,
                true_expr,
                false_expr,
            } => {
                condition.check_functions()?;
                true_expr.check_functions()?;
                false_expr.check_functions()
            }
            Expr::Function { name, args } => {
                if !FUNCTIONS.iter().any(|(f, _)| f == name) {
                    return Err(ParseError::new(format!("unknown function '{}'", name)));
                }
                args.iter().try_for_each(|a| a.check_functions())
            }
        }
    }

    /// Collect every variable path referenced by this expression
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Var(name) => out.push(name),
            Expr::Number(_) | Expr::Bool(_) => {}
            Expr::BinOp { left, right, .. } => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
            Expr::UnaryOp { operand, .. } => operand.collect_variables(out),
            Expr::Conditional {
                condition,
                true_expr,
                false_expr,
            } => {
                condition.collect_variables(out);
                true_expr.collect_variables(out);
                false_expr.collect_variables(out);
            }
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
        }
    }

    /// Evaluate against live values
    pub fn evaluate(&self, lookup: &dyn ValueLookup) -> Result<Value, EvalError> {
        let value = match self {
            Expr::Number(n) => Value::Number(*n),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Var(name) => lookup
                .lookup(name)
                .ok_or_else(|| EvalError::UnknownVariable(name.clone()))?,
            Expr::UnaryOp { op, operand } => {
                let v = operand.evaluate(lookup)?;
                match op {
                    UnaryOp::Neg => Value::Number(-v.as_number()),
                    UnaryOp::Not => Value::Bool(!v.truthy()),
                }
            }
            Expr::BinOp { op, left, right } => match op {
                BinOp::And => {
                    let l = left.evaluate(lookup)?;
                    if !l.truthy() {
                        Value::Bool(false)
                    } else {
                        Value::Bool(right.evaluate(lookup)?.truthy())
                    }
                }
                BinOp::Or => {
                    let l = left.evaluate(lookup)?;
                    if l.truthy() {
                        Value::Bool(true)
                    } else {
                        Value::Bool(right.evaluate(lookup)?.truthy())
                    }
                }
                _ => {
                    let l = left.evaluate(lookup)?.as_number();
                    let r = right.evaluate(lookup)?.as_number();
                    apply_binary(*op, l, r)?
                }
            },
            Expr::Conditional {
                condition,
                true_expr,
                false_expr,
            } => {
                if condition.evaluate(lookup)?.truthy() {
                    true_expr.evaluate(lookup)?
                } else {
                    false_expr.evaluate(lookup)?
                }
            }
            Expr::Function { name, args } => {
                let values = args
                    .iter()
                    .map(|a| a.evaluate(lookup).map(|v| v.as_number()))
                    .collect::<Result<Vec<f64>, EvalError>>()?;
                Value::Number(call_function(name, &values)?)
            }
        };

        if let Value::Number(n) = value {
            if !n.is_finite() {
                return Err(EvalError::NonFinite);
            }
        }
        Ok(value)
    }
}

fn apply_binary(op: BinOp, l: f64, r: f64) -> Result<Value, EvalError> {
    Ok(match op {
        BinOp::Add => Value::Number(l + r),
        BinOp::Sub => Value::Number(l - r),
        BinOp::Mul => Value::Number(l * r),
        BinOp::Div => {
            if r == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Value::Number(l / r)
        }
        BinOp::Mod => {
            if r == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Value::Number(l % r)
        }
        BinOp::Gt => Value::Bool(l > r),
        BinOp::Lt => Value::Bool(l < r),
        BinOp::Gte => Value::Bool(l >= r),
        BinOp::Lte => Value::Bool(l <= r),
        BinOp::Eq => Value::Bool(l == r),
        BinOp::Neq => Value::Bool(l != r),
        BinOp::And | BinOp::Or => unreachable!("logical operators short-circuit above"),
    })
}

fn call_function(name: &str, args: &[f64]) -> Result<f64, EvalError> {
    let arity = FUNCTIONS
        .iter()
        .find(|(f, _)| *f == name)
        .map(|(_, arity)| *arity)
        .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;

    match arity {
        Some(expected) if args.len() != expected => {
            return Err(EvalError::InvalidArgCount {
                func: name.to_string(),
                expected,
                got: args.len(),
            })
        }
        None if args.len() < 2 => {
            return Err(EvalError::InvalidArgCount {
                func: name.to_string(),
                expected: 2,
                got: args.len(),
            })
        }
        _ => {}
    }

    Ok(match name {
        "min" => args.iter().copied().fold(f64::INFINITY, f64::min),
        "max" => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        "abs" => args[0].abs(),
        "floor" => args[0].floor(),
        "ceil" => args[0].ceil(),
        "round" => args[0].round(),
        "sqrt" => args[0].sqrt(),
        "pow" => args[0].powf(args[1]),
        "clamp" => args[0].max(args[1]).min(args[2]),
        other => return Err(EvalError::UnknownFunction(other.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_literal_parsing() {
        assert_eq!(Expr::parse("42.5").unwrap(), Expr::Number(42.5));
        assert_eq!(Expr::parse("42").unwrap(), Expr::Number(42.0));
        assert_eq!(Expr::parse("true").unwrap(), Expr::Bool(true));
    }

    #[test]
    fn test_dotted_path_parsing() {
        assert_eq!(
            Expr::parse("self.hp.current").unwrap(),
            Expr::Var("self.hp.current".to_string())
        );
    }

    #[test]
    fn test_operator_precedence_mul_over_add() {
        // a + b * c should parse as a + (b * c)
        match Expr::parse("a + b * c").unwrap() {
            Expr::BinOp {
                op: BinOp::Add,
                left,
                right,
            } => {
                assert_eq!(*left, Expr::Var("a".to_string()));
                assert!(matches!(*right, Expr::BinOp { op: BinOp::Mul, .. }));
            }
            other => panic!("Expected BinOp Add, got {:?}", other),
        }
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let v = vars(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let expr = Expr::parse("(a + b) * c").unwrap();
        assert_eq!(expr.evaluate(&v).unwrap(), Value::Number(9.0));
    }

    #[test]
    fn test_comparison_and_logic() {
        let v = vars(&[("hp", 30.0), ("max", 100.0)]);
        let expr = Expr::parse("hp / max < 0.5 && !(hp <= 0)").unwrap();
        assert_eq!(expr.evaluate(&v).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_logical_short_circuit_skips_unknown() {
        let v = vars(&[]);
        let expr = Expr::parse("false && missing > 1").unwrap();
        assert_eq!(expr.evaluate(&v).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_conditional_expression() {
        let v = vars(&[("x", -4.0)]);
        let expr = Expr::parse("if x > 0 then x else -x").unwrap();
        assert_eq!(expr.evaluate(&v).unwrap(), Value::Number(4.0));
    }

    #[test]
    fn test_functions() {
        let v = vars(&[("a", 3.0), ("b", 7.0)]);
        let expr = Expr::parse("max(min(a, b), 5) + clamp(b, 0, 6) + pow(2, 3)").unwrap();
        assert_eq!(expr.evaluate(&v).unwrap(), Value::Number(5.0 + 6.0 + 8.0));
    }

    #[test]
    fn test_unknown_function_rejected_at_parse() {
        let err = Expr::parse("system(1)").unwrap_err();
        assert!(err.message.contains("unknown function"));
    }

    #[test]
    fn test_division_by_zero() {
        let v = vars(&[("a", 1.0)]);
        let expr = Expr::parse("a / 0").unwrap();
        assert_eq!(expr.evaluate(&v).unwrap_err(), EvalError::DivisionByZero);
    }

    #[test]
    fn test_unknown_variable() {
        let v = vars(&[]);
        let expr = Expr::parse("ghost + 1").unwrap();
        assert_eq!(
            expr.evaluate(&v).unwrap_err(),
            EvalError::UnknownVariable("ghost".to_string())
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Expr::parse("").is_err());
        assert!(Expr::parse("1 +").is_err());
        assert!(Expr::parse("(1 + 2").is_err());
        assert!(Expr::parse("1 2").is_err());
        assert!(Expr::parse("a $ b").is_err());
        assert!(Expr::parse("if a then b").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |n: usize| format!("{}1{}", "(".repeat(n), ")".repeat(n));
        assert!(Expr::parse(&nested(MAX_DEPTH - 1)).is_ok());
        let err = Expr::parse(&nested(MAX_DEPTH + 1)).unwrap_err();
        assert!(err.to_string().contains("nesting"));

        // unbalanced input far past the limit fails cleanly
        assert!(Expr::parse(&"(".repeat(200_000)).is_err());
        assert!(Expr::parse(&"-".repeat(10_000)).is_err());
        assert!(Expr::parse(&vec!["1"; 5_000].join(" + ")).is_err());
    }

    #[test]
    fn test_invalid_arg_count() {
        let v = vars(&[]);
        let expr = Expr::parse("abs(1, 2)").unwrap();
        assert_eq!(
            expr.evaluate(&v).unwrap_err(),
            EvalError::InvalidArgCount {
                func: "abs".to_string(),
                expected: 1,
                got: 2
            }
        );
    }

    #[test]
    fn test_variables_collected() {
        let expr = Expr::parse("self.hp.current / self.hp.max > threshold").unwrap();
        assert_eq!(
            expr.variables(),
            vec!["self.hp.current", "self.hp.max", "threshold"]
        );
    }

    #[test]
    fn test_eval_error_display() {
        assert_eq!(
            EvalError::UnknownVariable("foo".to_string()).to_string(),
            "Unknown variable: foo"
        );
        assert_eq!(EvalError::DivisionByZero.to_string(), "Division by zero");
    }
}
