//! Symbolic expression engine.
//!
//! This module provides the scalar expression AST that the NLP and DAE layers
//! are built on: parsing, numeric evaluation, differentiation, substitution
//! and constant folding. Every symbolic operator is a case of a closed enum,
//! so all dispatch is exhaustive.

mod calculus;
mod parse;
pub mod sparsity;

pub use calculus::{jac_sparsity, jacobian, substitute_all, substitute_folded};

use std::collections::HashMap;
use std::fmt;

use crate::error::{DaeOptError, Result};

/// Unary operators and elementary functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Negation (-)
    Neg,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Exp,
    /// Natural logarithm
    Log,
    Sqrt,
}

impl UnaryOp {
    /// Apply the operator to a numeric value.
    pub fn apply(self, x: f64) -> f64 {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Tan => x.tan(),
            UnaryOp::Asin => x.asin(),
            UnaryOp::Acos => x.acos(),
            UnaryOp::Atan => x.atan(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Sqrt => x.sqrt(),
        }
    }

    /// The function name as it appears in expression text.
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Asin => "asin",
            UnaryOp::Acos => "acos",
            UnaryOp::Atan => "atan",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sqrt => "sqrt",
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    /// Apply the operator to two numeric values.
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
            BinaryOp::Pow => lhs.powf(rhs),
        }
    }
}

/// A symbolic leaf: either a variable or the time derivative of a variable.
///
/// Differentiation, substitution and evaluation are keyed by `Symbol`, so a
/// variable and its derivative are independent unknowns; `der(x)` does not
/// follow from `x` by any chain rule at this level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Var(String),
    Der(String),
}

impl Symbol {
    pub fn var(name: &str) -> Self {
        Symbol::Var(name.to_string())
    }

    pub fn der(name: &str) -> Self {
        Symbol::Der(name.to_string())
    }

    /// The underlying variable name.
    pub fn base_name(&self) -> &str {
        match self {
            Symbol::Var(n) | Symbol::Der(n) => n,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Var(n) => write!(f, "{}", n),
            Symbol::Der(n) => write!(f, "der({})", n),
        }
    }
}

/// Symbolic expression AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant number
    Const(f64),

    /// Variable reference
    Var(String),

    /// Time derivative of a variable
    Der(String),

    /// Unary operation or elementary function
    Unary(UnaryOp, Box<Expr>),

    /// Binary operation
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// Context providing numeric values for symbols during evaluation.
pub trait EvalContext {
    /// The value bound to a symbol, or `None` if unbound.
    fn value_of(&self, sym: &Symbol) -> Option<f64>;
}

impl EvalContext for HashMap<Symbol, f64> {
    fn value_of(&self, sym: &Symbol) -> Option<f64> {
        self.get(sym).copied()
    }
}

/// Convenience context binding plain variables only; `der(x)` stays unbound.
impl EvalContext for HashMap<String, f64> {
    fn value_of(&self, sym: &Symbol) -> Option<f64> {
        match sym {
            Symbol::Var(name) => self.get(name).copied(),
            Symbol::Der(_) => None,
        }
    }
}

impl Expr {
    /// A variable reference.
    pub fn var(name: &str) -> Self {
        Expr::Var(name.to_string())
    }

    /// A derivative reference.
    pub fn der(name: &str) -> Self {
        Expr::Der(name.to_string())
    }

    /// The zero constant.
    pub fn zero() -> Self {
        Expr::Const(0.0)
    }

    /// The one constant.
    pub fn one() -> Self {
        Expr::Const(1.0)
    }

    /// Parse an expression from text.
    pub fn parse(input: &str) -> Result<Self> {
        parse::parse_expr(input)
    }

    /// The constant value, if this expression is a constant leaf.
    pub fn as_const(&self) -> Option<f64> {
        match self {
            Expr::Const(c) => Some(*c),
            _ => None,
        }
    }

    /// Evaluate the expression with the given context.
    pub fn evaluate<C: EvalContext>(&self, context: &C) -> Result<f64> {
        match self {
            Expr::Const(c) => Ok(*c),

            Expr::Var(name) => context
                .value_of(&Symbol::Var(name.clone()))
                .ok_or_else(|| DaeOptError::Evaluation(format!("Undefined variable: {}", name))),

            Expr::Der(name) => context.value_of(&Symbol::Der(name.clone())).ok_or_else(|| {
                DaeOptError::Evaluation(format!("Undefined derivative: der({})", name))
            }),

            Expr::Unary(op, inner) => Ok(op.apply(inner.evaluate(context)?)),

            Expr::Binary(op, left, right) => {
                let lhs = left.evaluate(context)?;
                let rhs = right.evaluate(context)?;
                if *op == BinaryOp::Div && rhs == 0.0 {
                    return Err(DaeOptError::Evaluation("Division by zero".to_string()));
                }
                Ok(op.apply(lhs, rhs))
            }
        }
    }

    /// All symbols referenced by the expression, sorted and deduplicated.
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut syms = Vec::new();
        self.collect_symbols(&mut syms);
        syms.sort();
        syms.dedup();
        syms
    }

    fn collect_symbols(&self, syms: &mut Vec<Symbol>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(name) => syms.push(Symbol::Var(name.clone())),
            Expr::Der(name) => syms.push(Symbol::Der(name.clone())),
            Expr::Unary(_, inner) => inner.collect_symbols(syms),
            Expr::Binary(_, left, right) => {
                left.collect_symbols(syms);
                right.collect_symbols(syms);
            }
        }
    }

    /// Whether the expression references the given symbol.
    pub fn depends_on(&self, sym: &Symbol) -> bool {
        match self {
            Expr::Const(_) => false,
            Expr::Var(name) => matches!(sym, Symbol::Var(n) if n == name),
            Expr::Der(name) => matches!(sym, Symbol::Der(n) if n == name),
            Expr::Unary(_, inner) => inner.depends_on(sym),
            Expr::Binary(_, left, right) => left.depends_on(sym) || right.depends_on(sym),
        }
    }

    /// Whether the expression references any of the given symbols.
    pub fn depends_on_any(&self, syms: &[Symbol]) -> bool {
        syms.iter().any(|s| self.depends_on(s))
    }
}

// Operator overloads build raw nodes; use `fold_constants` to simplify.

impl std::ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Binary(BinaryOp::Add, Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Binary(BinaryOp::Sub, Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Binary(BinaryOp::Mul, Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::Binary(BinaryOp::Div, Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Unary(UnaryOp::Neg, Box::new(self))
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

// Precedence levels for display: additive 1, multiplicative 2, power 3,
// atoms 4. Negation renders at multiplicative level.
fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Const(c) if *c < 0.0 => 2,
        Expr::Const(_) | Expr::Var(_) | Expr::Der(_) => 4,
        Expr::Unary(UnaryOp::Neg, _) => 2,
        Expr::Unary(_, _) => 4,
        Expr::Binary(BinaryOp::Add | BinaryOp::Sub, _, _) => 1,
        Expr::Binary(BinaryOp::Mul | BinaryOp::Div, _, _) => 2,
        Expr::Binary(BinaryOp::Pow, _, _) => 3,
    }
}

fn fmt_child(f: &mut fmt::Formatter<'_>, child: &Expr, min_prec: u8) -> fmt::Result {
    if precedence(child) < min_prec {
        write!(f, "({})", child)
    } else {
        write!(f, "{}", child)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Der(name) => write!(f, "der({})", name),
            Expr::Unary(UnaryOp::Neg, inner) => {
                write!(f, "-")?;
                fmt_child(f, inner, 3)
            }
            Expr::Unary(op, inner) => write!(f, "{}({})", op.name(), inner),
            Expr::Binary(op, left, right) => match op {
                BinaryOp::Add => {
                    fmt_child(f, left, 1)?;
                    write!(f, " + ")?;
                    fmt_child(f, right, 1)
                }
                BinaryOp::Sub => {
                    fmt_child(f, left, 1)?;
                    write!(f, " - ")?;
                    fmt_child(f, right, 2)
                }
                BinaryOp::Mul => {
                    fmt_child(f, left, 2)?;
                    write!(f, "*")?;
                    fmt_child(f, right, 2)
                }
                BinaryOp::Div => {
                    fmt_child(f, left, 2)?;
                    write!(f, "/")?;
                    fmt_child(f, right, 3)
                }
                BinaryOp::Pow => {
                    fmt_child(f, left, 4)?;
                    write!(f, "^")?;
                    fmt_child(f, right, 3)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(n, v)| (n.to_string(), *v)).collect()
    }

    #[test]
    fn test_evaluate_simple() {
        let context = ctx(&[("x", 2.0), ("y", 3.0)]);

        assert_eq!(
            Expr::parse("x + y").unwrap().evaluate(&context).unwrap(),
            5.0
        );
        assert_eq!(
            Expr::parse("x * y").unwrap().evaluate(&context).unwrap(),
            6.0
        );
        assert_eq!(
            Expr::parse("y / x").unwrap().evaluate(&context).unwrap(),
            1.5
        );
        assert_eq!(
            Expr::parse("x ^ y").unwrap().evaluate(&context).unwrap(),
            8.0
        );
        assert_eq!(Expr::parse("-y").unwrap().evaluate(&context).unwrap(), -3.0);
    }

    #[test]
    fn test_evaluate_functions() {
        let context = ctx(&[("x", 2.0)]);

        assert_eq!(
            Expr::parse("sin(x)").unwrap().evaluate(&context).unwrap(),
            2.0_f64.sin()
        );
        assert_eq!(
            Expr::parse("sqrt(x)").unwrap().evaluate(&context).unwrap(),
            2.0_f64.sqrt()
        );
    }

    #[test]
    fn test_evaluation_errors() {
        let context: HashMap<String, f64> = HashMap::new();

        match Expr::parse("x").unwrap().evaluate(&context) {
            Err(DaeOptError::Evaluation(msg)) => assert!(msg.contains("x")),
            _ => panic!("Expected Evaluation error"),
        }

        match Expr::parse("1 / 0").unwrap().evaluate(&context) {
            Err(DaeOptError::Evaluation(msg)) => assert!(msg.contains("zero")),
            _ => panic!("Expected DivisionByZero error"),
        }
    }

    #[test]
    fn test_der_is_independent_symbol() {
        let expr = Expr::parse("der(x) + x").unwrap();
        assert!(expr.depends_on(&Symbol::var("x")));
        assert!(expr.depends_on(&Symbol::der("x")));

        let mut values: HashMap<Symbol, f64> = HashMap::new();
        values.insert(Symbol::var("x"), 1.0);
        values.insert(Symbol::der("x"), 10.0);
        assert_eq!(expr.evaluate(&values).unwrap(), 11.0);
    }

    #[test]
    fn test_symbols() {
        let expr = Expr::parse("der(x) + y * x").unwrap();
        assert_eq!(
            expr.symbols(),
            vec![Symbol::var("x"), Symbol::var("y"), Symbol::der("x")]
        );
    }

    #[test]
    fn test_display_reparses() {
        for text in [
            "x + 2*y",
            "x - (y - 1)",
            "2*(x + 1)/(4 - y)",
            "sin(x)^2 + cos(x)^2",
            "der(x) - x/tau",
            "-x + 3",
        ] {
            let expr = Expr::parse(text).unwrap();
            let rendered = format!("{}", expr);
            let reparsed = Expr::parse(&rendered).unwrap();
            assert_eq!(expr, reparsed, "display of '{}' was '{}'", text, rendered);
        }
    }
}
