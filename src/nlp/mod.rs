//! Nonlinear-program sensitivity layer.
//!
//! A nonlinear program is given as a single symbolic mapping
//! `(x, p) -> (f, g)`: decision variables and parameters in, scalar objective
//! and constraint residuals out. This module synthesizes, validates and
//! caches the sensitivity functions a numeric solver consumes, and checks
//! the well-posedness of the bound arrays.

pub mod bounds;
pub mod cache;
pub mod config;
pub mod function;
pub mod linsol;

pub use bounds::NlpBounds;
pub use cache::{DerivativeCache, FunctionRole};
pub use config::{FunctionOverrides, NlpConfig};
pub use function::{FunctionInput, FunctionOutput, NlpFunction, NumericValue, OutputValue};
pub use linsol::{GaussianElimination, LinearSolve, LinsolRegistry};

use std::collections::HashSet;

use crate::error::{DaeOptError, Result};
use crate::expr::{Expr, Symbol};

/// A nonlinear program in symbolic form.
#[derive(Debug, Clone)]
pub struct SymbolicNlp {
    x: Vec<String>,
    p: Vec<String>,
    f: Expr,
    g: Vec<Expr>,
}

impl SymbolicNlp {
    /// Create an NLP from its parts. Decision variable and parameter names
    /// must be distinct.
    pub fn new(x: Vec<String>, p: Vec<String>, f: Expr, g: Vec<Expr>) -> Result<Self> {
        let mut seen = HashSet::new();
        for name in x.iter().chain(p.iter()) {
            if !seen.insert(name.clone()) {
                return Err(DaeOptError::Modeling(format!(
                    "Variable \"{}\" has already been added",
                    name
                )));
            }
        }
        Ok(Self { x, p, f, g })
    }

    /// Number of decision variables.
    pub fn nx(&self) -> usize {
        self.x.len()
    }

    /// Number of parameters.
    pub fn np(&self) -> usize {
        self.p.len()
    }

    /// Number of constraint residuals.
    pub fn ng(&self) -> usize {
        self.g.len()
    }

    pub fn x_names(&self) -> &[String] {
        &self.x
    }

    pub fn p_names(&self) -> &[String] {
        &self.p
    }

    pub fn objective(&self) -> &Expr {
        &self.f
    }

    pub fn constraints(&self) -> &[Expr] {
        &self.g
    }

    /// Decision variables as symbols.
    pub fn x_symbols(&self) -> Vec<Symbol> {
        self.x.iter().map(|n| Symbol::Var(n.clone())).collect()
    }

    /// Parameters as symbols.
    pub fn p_symbols(&self) -> Vec<Symbol> {
        self.p.iter().map(|n| Symbol::Var(n.clone())).collect()
    }

    /// Check that every free symbol of f and g is a declared decision
    /// variable or parameter, and that no derivative leaves appear.
    pub fn validate(&self) -> Result<()> {
        let declared: HashSet<&str> = self
            .x
            .iter()
            .chain(self.p.iter())
            .map(|s| s.as_str())
            .collect();

        let check = |expr: &Expr, what: &str| -> Result<()> {
            for sym in expr.symbols() {
                match sym {
                    Symbol::Var(name) => {
                        if !declared.contains(name.as_str()) {
                            return Err(DaeOptError::Modeling(format!(
                                "No such variable: \"{}\" (referenced by {})",
                                name, what
                            )));
                        }
                    }
                    Symbol::Der(name) => {
                        return Err(DaeOptError::Modeling(format!(
                            "Derivative leaf der({}) is not allowed in an NLP ({})",
                            name, what
                        )));
                    }
                }
            }
            Ok(())
        };

        check(&self.f, "the objective")?;
        for (i, gi) in self.g.iter().enumerate() {
            check(gi, &format!("constraint {}", i))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_nlp_construction() {
        let nlp = SymbolicNlp::new(
            names(&["x0", "x1"]),
            names(&["p0"]),
            Expr::parse("x0^2 + x1^2").unwrap(),
            vec![Expr::parse("x0 + x1 - p0").unwrap()],
        )
        .unwrap();

        assert_eq!(nlp.nx(), 2);
        assert_eq!(nlp.np(), 1);
        assert_eq!(nlp.ng(), 1);
        assert!(nlp.validate().is_ok());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let result = SymbolicNlp::new(
            names(&["x0"]),
            names(&["x0"]),
            Expr::zero(),
            vec![],
        );
        assert!(matches!(result, Err(DaeOptError::Modeling(_))));
    }

    #[test]
    fn test_undeclared_symbol_rejected() {
        let nlp = SymbolicNlp::new(
            names(&["x0"]),
            names(&[]),
            Expr::parse("x0 + q").unwrap(),
            vec![],
        )
        .unwrap();
        match nlp.validate() {
            Err(DaeOptError::Modeling(msg)) => assert!(msg.contains("\"q\"")),
            other => panic!("Expected Modeling error, got {:?}", other),
        }
    }
}
