//! Linear-solve capability for square symbolic systems.
//!
//! The explicit extractor delegates blocks larger than 3x3 to a
//! `LinearSolve` implementation looked up by name in a `LinsolRegistry`.
//! The bundled implementation performs symbolic Gaussian elimination with
//! structural pivoting.

use std::collections::HashMap;

use ndarray::Array2;

use crate::error::{DaeOptError, Result};
use crate::expr::Expr;

/// Solve capability for square symbolic systems `A * x = b`.
pub trait LinearSolve {
    /// Identifier the capability was registered under.
    fn name(&self) -> &'static str;

    /// Solve the system, returning one expression per unknown.
    fn solve(&self, a: &Array2<Expr>, b: &[Expr]) -> Result<Vec<Expr>>;
}

/// Symbolic Gaussian elimination with structural pivoting.
///
/// Pivots prefer constant entries over general expressions so the
/// elimination introduces as few symbolic divisions as possible.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianElimination;

impl LinearSolve for GaussianElimination {
    fn name(&self) -> &'static str {
        "gaussian-elimination"
    }

    fn solve(&self, a: &Array2<Expr>, b: &[Expr]) -> Result<Vec<Expr>> {
        let (nr, nc) = a.dim();
        if nr != nc {
            return Err(DaeOptError::Shape(format!(
                "linear solve requires a square matrix, got {}x{}",
                nr, nc
            )));
        }
        if b.len() != nr {
            return Err(DaeOptError::Shape(format!(
                "right-hand side has length {}, expected {}",
                b.len(),
                nr
            )));
        }
        let n = nr;

        // Working copies; all updates are folded to keep expressions small.
        let mut m: Vec<Vec<Expr>> = (0..n)
            .map(|i| (0..n).map(|j| a[[i, j]].fold_constants()).collect())
            .collect();
        let mut rhs: Vec<Expr> = b.iter().map(|e| e.fold_constants()).collect();

        for k in 0..n {
            let pivot_row = select_pivot(&m, k, n)?;
            if pivot_row != k {
                m.swap(k, pivot_row);
                rhs.swap(k, pivot_row);
            }

            for i in (k + 1)..n {
                if m[i][k].as_const() == Some(0.0) {
                    continue;
                }
                let factor =
                    (m[i][k].clone() / m[k][k].clone()).fold_constants();
                for j in k..n {
                    m[i][j] = (m[i][j].clone()
                        - factor.clone() * m[k][j].clone())
                    .fold_constants();
                }
                rhs[i] =
                    (rhs[i].clone() - factor * rhs[k].clone()).fold_constants();
            }
        }

        // Back substitution.
        let mut x = vec![Expr::zero(); n];
        for i in (0..n).rev() {
            let mut acc = rhs[i].clone();
            for j in (i + 1)..n {
                acc = (acc - m[i][j].clone() * x[j].clone()).fold_constants();
            }
            x[i] = (acc / m[i][i].clone()).fold_constants();
        }
        Ok(x)
    }
}

/// Pick a pivot row for column k: a constant nonzero entry if one exists,
/// otherwise any structurally nonzero entry.
fn select_pivot(m: &[Vec<Expr>], k: usize, n: usize) -> Result<usize> {
    let mut structural: Option<usize> = None;
    for (i, row) in m.iter().enumerate().take(n).skip(k) {
        match row[k].as_const() {
            Some(0.0) => continue,
            Some(_) => return Ok(i),
            None => {
                if structural.is_none() {
                    structural = Some(i);
                }
            }
        }
    }
    structural.ok_or_else(|| {
        DaeOptError::Evaluation(format!(
            "linear system is structurally singular at column {}",
            k
        ))
    })
}

/// Factory producing a boxed solve capability.
pub type LinsolFactory = fn() -> Box<dyn LinearSolve>;

/// Explicit name-to-factory mapping for linear solver plugins.
///
/// Populated at construction and queried by name; an unknown name is a
/// distinct error kind.
pub struct LinsolRegistry {
    factories: HashMap<String, LinsolFactory>,
}

impl LinsolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory under a name, replacing any previous entry.
    pub fn register(&mut self, name: &str, factory: LinsolFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// Instantiate the capability registered under `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn LinearSolve>> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory()),
            None => Err(DaeOptError::PluginNotFound(name.to_string())),
        }
    }

    /// Registered plugin names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for LinsolRegistry {
    /// Registry with the bundled solvers registered.
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register("gaussian-elimination", || Box::new(GaussianElimination));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::collections::HashMap as Map;

    #[test]
    fn test_solve_constant_system() {
        // [2 1; 1 3] x = [5; 10] -> x = [1; 3]
        let a = array![
            [Expr::Const(2.0), Expr::Const(1.0)],
            [Expr::Const(1.0), Expr::Const(3.0)]
        ];
        let b = vec![Expr::Const(5.0), Expr::Const(10.0)];
        let x = GaussianElimination.solve(&a, &b).unwrap();
        assert_eq!(x[0], Expr::Const(1.0));
        assert_eq!(x[1], Expr::Const(3.0));
    }

    #[test]
    fn test_solve_symbolic_system() {
        // [a 0; 0 1] x = [a*c; d] -> x = [c; d] after evaluation
        let a = array![
            [Expr::var("a"), Expr::Const(0.0)],
            [Expr::Const(0.0), Expr::Const(1.0)]
        ];
        let b = vec![Expr::parse("a * c").unwrap(), Expr::var("d")];
        let x = GaussianElimination.solve(&a, &b).unwrap();

        let ctx: Map<String, f64> = [("a", 2.0), ("c", 7.0), ("d", -1.0)]
            .iter()
            .map(|(n, v)| (n.to_string(), *v))
            .collect();
        assert_eq!(x[0].evaluate(&ctx).unwrap(), 7.0);
        assert_eq!(x[1].evaluate(&ctx).unwrap(), -1.0);
    }

    #[test]
    fn test_structurally_singular() {
        let a = array![
            [Expr::Const(0.0), Expr::Const(1.0)],
            [Expr::Const(0.0), Expr::Const(2.0)]
        ];
        let b = vec![Expr::Const(1.0), Expr::Const(2.0)];
        assert!(matches!(
            GaussianElimination.solve(&a, &b),
            Err(DaeOptError::Evaluation(_))
        ));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = LinsolRegistry::default();
        let solver = registry.create("gaussian-elimination").unwrap();
        assert_eq!(solver.name(), "gaussian-elimination");

        match registry.create("symbolic_qr") {
            Err(DaeOptError::PluginNotFound(name)) => assert_eq!(name, "symbolic_qr"),
            other => panic!("Expected PluginNotFound, got {:?}", other.map(|s| s.name())),
        }
    }
}
