//! Block-wise rewriting of solvable implicit blocks into explicit form.

use std::collections::HashMap;

use ndarray::Array2;
use tracing::{debug, warn};

use super::variable::VariableRole;
use super::FlatDae;
use crate::error::{DaeOptError, Result};
use crate::expr::{jacobian, Expr, Symbol};
use crate::nlp::linsol::LinearSolve;

/// Jacobian handling inside the Newton iteration for nonlinear blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewtonPolicy {
    /// Re-evaluate the block Jacobian in every iteration
    Exact,
    /// Freeze the Jacobian at the initial guess
    Frozen,
}

/// Options of the explicit extractor.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub policy: NewtonPolicy,

    /// Iteration budget for nonlinear blocks. Default: 3
    pub max_newton_iter: usize,

    /// Residual tolerance for the early exit of the Newton iteration.
    /// Default: 1e-10
    pub tol: f64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            policy: NewtonPolicy::Exact,
            max_newton_iter: 3,
            tol: 1e-10,
        }
    }
}

impl FlatDae {
    /// Rewrite the BLT blocks as explicit assignments.
    ///
    /// Blocks are processed in dependency order, consuming the decomposition
    /// of the preceding [`sort_blt`](FlatDae::sort_blt) call. Affine blocks
    /// are solved exactly (direct inversion up to 3x3, the linear-solve
    /// capability beyond); blocks with nonlinear self-dependence get a
    /// bounded Newton iteration from the declared start values, producing a
    /// best-effort explicit expression. Solved variables leave the implicit
    /// lists: derivatives become explicit ODEs, plain variables become
    /// dependents, and an algebraic variable with finite bounds keeps them
    /// as a path constraint.
    pub fn make_explicit(
        &mut self,
        opts: &ExtractOptions,
        linsol: &dyn LinearSolve,
    ) -> Result<()> {
        if !self.sorted {
            return Err(DaeOptError::InvalidState(
                "BLT sorting must run before explicit extraction".to_string(),
            ));
        }
        let blt = self.blt.take().ok_or_else(|| {
            DaeOptError::InvalidState(
                "BLT decomposition already consumed; call sort_blt again".to_string(),
            )
        })?;

        let syms = self.solve_symbols();
        let mut cum: HashMap<Symbol, Expr> = HashMap::new();
        let mut solved: Vec<(String, Symbol, Expr)> = Vec::new();

        for b in 0..blt.nb {
            let rows = blt.rowblock[b]..blt.rowblock[b + 1];
            let cols = blt.colblock[b]..blt.colblock[b + 1];

            let vb_syms: Vec<Symbol> = cols.clone().map(|j| syms[j].clone()).collect();
            // Definitions from earlier blocks are substituted up front, so
            // the block only involves its own unknowns.
            let fb: Vec<Expr> = rows
                .clone()
                .map(|i| self.equations.dae[i].substitute(&cum).fold_constants())
                .collect();
            let jb = jacobian(&fb, &vb_syms);

            let nonlinear = jb.iter().any(|e| e.depends_on_any(&vb_syms));
            let sol = if nonlinear {
                debug!(
                    "block {}: nonlinear self-dependence, using a {:?} Newton iteration",
                    b, opts.policy
                );
                self.newton_block(b, &vb_syms, &fb, &jb, cols.clone(), opts, linsol)?
            } else {
                self.affine_block(&vb_syms, &fb, &jb, linsol)?
            };

            for (local, col) in cols.enumerate() {
                let name = self.x[col].clone();
                cum.insert(vb_syms[local].clone(), sol[local].clone());
                solved.push((name, vb_syms[local].clone(), sol[local].clone()));
            }
        }

        // Every block was solved; the implicit lists are consumed.
        self.equations.dae.clear();
        self.x.clear();

        for (name, sym, expr) in solved {
            match sym {
                Symbol::Der(_) => {
                    self.xd.push(name);
                    self.equations.ode.push(expr);
                }
                Symbol::Var(_) => {
                    let (role, min, max, nominal) = {
                        let var = self.variable(&name)?;
                        (var.role(), var.min(), var.max(), var.nominal())
                    };
                    self.y.push(name.clone());
                    self.dep.push(expr);
                    self.variable_mut(&name)?.set_role(VariableRole::Dependent);

                    // Explicit substitution would silently lose finite
                    // bounds of an algebraic variable; keep them as a path
                    // constraint on the defining expression.
                    if role == VariableRole::Algebraic
                        && (min.is_finite() || max.is_finite())
                    {
                        let (lo, hi) = if self.scaled_variables {
                            (min / nominal, max / nominal)
                        } else {
                            (min, max)
                        };
                        self.equations.add_path(Expr::Var(name), lo, hi);
                    }
                }
            }
        }

        self.eliminate_dependent()?;
        Ok(())
    }

    fn affine_block(
        &self,
        vb_syms: &[Symbol],
        fb: &[Expr],
        jb: &Array2<Expr>,
        linsol: &dyn LinearSolve,
    ) -> Result<Vec<Expr>> {
        // fb == Jb*vb + fb(0): solve Jb*vb = -fb(0).
        let zeros: HashMap<Symbol, Expr> = vb_syms
            .iter()
            .map(|s| (s.clone(), Expr::zero()))
            .collect();
        let rhs: Vec<Expr> = fb
            .iter()
            .map(|e| (-e.substitute(&zeros)).fold_constants())
            .collect();
        solve_block(jb, &rhs, linsol)
    }

    #[allow(clippy::too_many_arguments)]
    fn newton_block(
        &self,
        block: usize,
        vb_syms: &[Symbol],
        fb: &[Expr],
        jb: &Array2<Expr>,
        cols: std::ops::Range<usize>,
        opts: &ExtractOptions,
        linsol: &dyn LinearSolve,
    ) -> Result<Vec<Expr>> {
        // Initial guess from the declared start values.
        let mut xk: Vec<Expr> = Vec::with_capacity(vb_syms.len());
        for col in cols {
            let var = self.variable(&self.x[col])?;
            let guess = if self.scaled_variables {
                var.start_scaled()
            } else {
                var.start()
            };
            xk.push(Expr::Const(guess));
        }

        let jb_used = match opts.policy {
            NewtonPolicy::Exact => jb.clone(),
            NewtonPolicy::Frozen => {
                let at_guess: HashMap<Symbol, Expr> = vb_syms
                    .iter()
                    .zip(xk.iter())
                    .map(|(s, g)| (s.clone(), g.clone()))
                    .collect();
                jb.map(|e| e.substitute(&at_guess).fold_constants())
            }
        };

        // One Newton update as a symbolic map vb -> vb - Jb\fb.
        let delta = solve_block(&jb_used, fb, linsol)?;
        let step: Vec<Expr> = vb_syms
            .iter()
            .zip(delta)
            .map(|(sym, d)| {
                let leaf = match sym {
                    Symbol::Var(n) => Expr::Var(n.clone()),
                    Symbol::Der(n) => Expr::Der(n.clone()),
                };
                (leaf - d).fold_constants()
            })
            .collect();

        let mut converged = false;
        for _ in 0..opts.max_newton_iter {
            let at_k: HashMap<Symbol, Expr> = vb_syms
                .iter()
                .zip(xk.iter())
                .map(|(s, x)| (s.clone(), x.clone()))
                .collect();
            xk = step
                .iter()
                .map(|e| e.substitute(&at_k).fold_constants())
                .collect();

            // The residual folds to constants whenever the block closes over
            // earlier definitions; use it for the early exit when it does.
            let at_new: HashMap<Symbol, Expr> = vb_syms
                .iter()
                .zip(xk.iter())
                .map(|(s, x)| (s.clone(), x.clone()))
                .collect();
            let residual: Vec<Expr> = fb
                .iter()
                .map(|e| e.substitute(&at_new).fold_constants())
                .collect();
            if let Some(max_abs) = max_const_abs(&residual) {
                if max_abs < opts.tol {
                    converged = true;
                    break;
                }
            }
        }

        if !converged {
            warn!(
                "Newton extraction for block {} did not verify convergence within {} \
                 iterations; keeping the best-effort expression",
                block, opts.max_newton_iter
            );
        }
        Ok(xk)
    }
}

/// Max absolute value over the entries, when all of them fold to constants.
fn max_const_abs(exprs: &[Expr]) -> Option<f64> {
    let mut max_abs = 0.0_f64;
    for e in exprs {
        match e.as_const() {
            Some(c) => max_abs = max_abs.max(c.abs()),
            None => return None,
        }
    }
    Some(max_abs)
}

/// Solve `a * x = b`: direct inversion for blocks up to 3x3, the delegated
/// linear-solve capability beyond.
fn solve_block(a: &Array2<Expr>, b: &[Expr], linsol: &dyn LinearSolve) -> Result<Vec<Expr>> {
    let n = b.len();
    if n <= 3 {
        let inv = invert_small(a)?;
        let mut x = Vec::with_capacity(n);
        for i in 0..n {
            let mut acc = Expr::zero();
            for j in 0..n {
                acc = acc + inv[[i, j]].clone() * b[j].clone();
            }
            x.push(acc.fold_constants());
        }
        Ok(x)
    } else {
        linsol.solve(a, b)
    }
}

/// Symbolic inverse by the adjugate formula, for matrices up to 3x3.
fn invert_small(a: &Array2<Expr>) -> Result<Array2<Expr>> {
    let (nr, nc) = a.dim();
    if nr != nc || nr == 0 || nr > 3 {
        return Err(DaeOptError::Shape(format!(
            "direct inversion supports square blocks up to 3x3, got {}x{}",
            nr, nc
        )));
    }
    let e = |i: usize, j: usize| a[[i, j]].clone();

    let (det, adj) = match nr {
        1 => (e(0, 0), Array2::from_elem((1, 1), Expr::one())),
        2 => {
            let det = e(0, 0) * e(1, 1) - e(0, 1) * e(1, 0);
            let mut adj = Array2::from_elem((2, 2), Expr::zero());
            adj[[0, 0]] = e(1, 1);
            adj[[0, 1]] = -e(0, 1);
            adj[[1, 0]] = -e(1, 0);
            adj[[1, 1]] = e(0, 0);
            (det, adj)
        }
        _ => {
            let minor = |r0: usize, c0: usize, r1: usize, c1: usize| {
                e(r0, c0) * e(r1, c1) - e(r0, c1) * e(r1, c0)
            };
            let det = e(0, 0) * minor(1, 1, 2, 2) - e(0, 1) * minor(1, 0, 2, 2)
                + e(0, 2) * minor(1, 0, 2, 1);
            let mut adj = Array2::from_elem((3, 3), Expr::zero());
            // Adjugate: transposed cofactors.
            adj[[0, 0]] = minor(1, 1, 2, 2);
            adj[[0, 1]] = -minor(0, 1, 2, 2);
            adj[[0, 2]] = minor(0, 1, 1, 2);
            adj[[1, 0]] = -minor(1, 0, 2, 2);
            adj[[1, 1]] = minor(0, 0, 2, 2);
            adj[[1, 2]] = -minor(0, 0, 1, 2);
            adj[[2, 0]] = minor(1, 0, 2, 1);
            adj[[2, 1]] = -minor(0, 0, 2, 1);
            adj[[2, 2]] = minor(0, 0, 1, 1);
            (det, adj)
        }
    };

    let det = det.fold_constants();
    if det.as_const() == Some(0.0) {
        return Err(DaeOptError::Evaluation(
            "block Jacobian is singular".to_string(),
        ));
    }

    Ok(adj.map(|entry| (entry.clone() / det.clone()).fold_constants()))
}
