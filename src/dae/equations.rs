//! Per-category residual lists of a flat DAE.

use std::collections::HashMap;

use crate::expr::{substitute_folded, Expr, Symbol};

/// Ordered residual lists, one per equation category.
///
/// The per-category counts correspond to the variable lists of the owning
/// [`FlatDae`](super::FlatDae): implicit residuals to implicit states,
/// explicit ODE right-hand sides to explicit states, algebraic right-hand
/// sides to algebraic states, quadrature right-hand sides to quadrature
/// states.
#[derive(Debug, Clone, Default)]
pub struct EquationSet {
    /// Implicit dynamic residuals (0 == dae[i])
    pub dae: Vec<Expr>,

    /// Explicit differential equations (der(xd[i]) == ode[i])
    pub ode: Vec<Expr>,

    /// Algebraic equations (xa[i] == alg[i])
    pub alg: Vec<Expr>,

    /// Quadrature equations (der(q[i]) == quad[i])
    pub quad: Vec<Expr>,

    /// Initial equations (0 == initial[i])
    pub initial: Vec<Expr>,

    /// Path constraint residuals with their bound intervals
    pub path: Vec<Expr>,
    pub path_min: Vec<f64>,
    pub path_max: Vec<f64>,

    /// Mayer objective terms
    pub mterm: Vec<Expr>,

    /// Lagrange objective terms
    pub lterm: Vec<Expr>,
}

impl EquationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a path constraint residual with its interval.
    pub fn add_path(&mut self, residual: Expr, min: f64, max: f64) {
        self.path.push(residual);
        self.path_min.push(min);
        self.path_max.push(max);
    }

    /// Substitute symbols in every category, folding constants.
    pub fn substitute_categories(&mut self, map: &HashMap<Symbol, Expr>) {
        self.dae = substitute_folded(&self.dae, map);
        self.ode = substitute_folded(&self.ode, map);
        self.alg = substitute_folded(&self.alg, map);
        self.quad = substitute_folded(&self.quad, map);
        self.initial = substitute_folded(&self.initial, map);
        self.path = substitute_folded(&self.path, map);
        self.mterm = substitute_folded(&self.mterm, map);
        self.lterm = substitute_folded(&self.lterm, map);
    }

    /// Whether any equation in any category references one of the symbols.
    pub fn depends_on_any(&self, syms: &[Symbol]) -> bool {
        self.dae
            .iter()
            .chain(self.ode.iter())
            .chain(self.alg.iter())
            .chain(self.quad.iter())
            .chain(self.initial.iter())
            .chain(self.path.iter())
            .chain(self.mterm.iter())
            .chain(self.lterm.iter())
            .any(|e| e.depends_on_any(syms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_categories() {
        let mut eqs = EquationSet::new();
        eqs.dae.push(Expr::parse("der(x) - y").unwrap());
        eqs.add_path(Expr::parse("y - 5").unwrap(), f64::NEG_INFINITY, 0.0);

        let mut map = HashMap::new();
        map.insert(Symbol::var("y"), Expr::parse("2 * x").unwrap());
        eqs.substitute_categories(&map);

        assert_eq!(eqs.dae[0], Expr::parse("der(x) - 2*x").unwrap());
        assert_eq!(eqs.path[0], Expr::parse("2*x - 5").unwrap());
        assert!(!eqs.depends_on_any(&[Symbol::var("y")]));
    }
}
