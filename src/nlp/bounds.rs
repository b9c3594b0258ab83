//! Bound arrays and well-posedness checks.

use ndarray::Array1;
use tracing::{info, warn};

use crate::error::{DaeOptError, Result};

/// Bound and initial-guess arrays of an NLP instance.
///
/// Lengths are fixed at construction: lbx/ubx/x0/lam_x0 match the decision
/// vector, lbg/ubg/lam_g0 the constraint vector, p the parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct NlpBounds {
    pub lbx: Array1<f64>,
    pub ubx: Array1<f64>,
    pub lbg: Array1<f64>,
    pub ubg: Array1<f64>,
    pub x0: Array1<f64>,
    pub lam_x0: Array1<f64>,
    pub lam_g0: Array1<f64>,
    pub p: Array1<f64>,
}

impl NlpBounds {
    /// Default-initialized arrays: zero guesses, infinite box bounds.
    pub fn new(nx: usize, ng: usize, np: usize) -> Self {
        Self {
            lbx: Array1::from_elem(nx, f64::NEG_INFINITY),
            ubx: Array1::from_elem(nx, f64::INFINITY),
            lbg: Array1::from_elem(ng, f64::NEG_INFINITY),
            ubg: Array1::from_elem(ng, f64::INFINITY),
            x0: Array1::zeros(nx),
            lam_x0: Array1::zeros(nx),
            lam_g0: Array1::zeros(ng),
            p: Array1::zeros(np),
        }
    }

    /// Check the arrays against the problem dimensions.
    pub fn check_shapes(&self, nx: usize, ng: usize, np: usize) -> Result<()> {
        let checks = [
            ("lbx", self.lbx.len(), nx),
            ("ubx", self.ubx.len(), nx),
            ("x0", self.x0.len(), nx),
            ("lam_x0", self.lam_x0.len(), nx),
            ("lbg", self.lbg.len(), ng),
            ("ubg", self.ubg.len(), ng),
            ("lam_g0", self.lam_g0.len(), ng),
            ("p", self.p.len(), np),
        ];
        for (name, actual, expected) in checks {
            if actual != expected {
                return Err(DaeOptError::Shape(format!(
                    "{} has length {}, expected {}",
                    name, actual, expected
                )));
            }
        }
        Ok(())
    }

    /// Detect ill-posed bound arrays before solving.
    ///
    /// A lower bound of +inf, an upper bound of -inf or a crossed pair makes
    /// the problem infeasible by construction. Both arrays are scanned before
    /// the verdict is reported. With `warn_initial_bounds`, an initial guess
    /// outside [lbx, ubx] additionally produces a non-fatal warning.
    pub fn check_initial_bounds(&self, warn_initial_bounds: bool) -> Result<()> {
        let x_violation = first_ill_posed(&self.lbx, &self.ubx, "LBX", "UBX");
        let g_violation = first_ill_posed(&self.lbg, &self.ubg, "LBG", "UBG");

        let verdict = match (x_violation, g_violation) {
            (Some(x), Some(g)) => Some(format!("{}; {}", x, g)),
            (Some(x), None) => Some(x),
            (None, Some(g)) => Some(g),
            (None, None) => None,
        };
        if let Some(msg) = verdict {
            return Err(DaeOptError::IllPosedProblem(msg));
        }

        if warn_initial_bounds {
            let outside = self
                .x0
                .iter()
                .zip(self.lbx.iter().zip(self.ubx.iter()))
                .any(|(x, (lb, ub))| x < lb || x > ub);
            if outside {
                warn!(
                    "the initial guess does not satisfy LBX and UBX; \
                     option 'warn_initial_bounds' controls this warning"
                );
            }
        }
        Ok(())
    }

    /// Assert elementwise bound ordering. The x and g arrays are checked
    /// independently; if both are violated, both violations are reported.
    pub fn check_inputs(&self) -> Result<()> {
        let x_violation = first_crossed(&self.lbx, &self.ubx, "LBX", "UBX");
        let g_violation = first_crossed(&self.lbg, &self.ubg, "LBG", "UBG");

        match (x_violation, g_violation) {
            (None, None) => Ok(()),
            (Some(x), Some(g)) => Err(DaeOptError::IllPosedProblem(format!("{}; {}", x, g))),
            (Some(msg), None) | (None, Some(msg)) => Err(DaeOptError::IllPosedProblem(msg)),
        }
    }

    /// Log, per index, where the solution sits inside its bound interval.
    pub fn report_constraints(&self, x: &Array1<f64>, g: &Array1<f64>, tol: f64) {
        report_interval(x, &self.lbx, &self.ubx, "decision bounds", tol);
        report_interval(g, &self.lbg, &self.ubg, "constraints", tol);
    }
}

fn first_ill_posed(
    lb: &Array1<f64>,
    ub: &Array1<f64>,
    lb_name: &str,
    ub_name: &str,
) -> Option<String> {
    for (i, (l, u)) in lb.iter().zip(ub.iter()).enumerate() {
        if *l == f64::INFINITY {
            return Some(format!("{} is +inf at index {}", lb_name, i));
        }
        if *u == f64::NEG_INFINITY {
            return Some(format!("{} is -inf at index {}", ub_name, i));
        }
        if l > u {
            return Some(format!(
                "{}<={} violated at index {}: got {}[{}]={} and {}[{}]={}",
                lb_name, ub_name, i, lb_name, i, l, ub_name, i, u
            ));
        }
    }
    None
}

fn first_crossed(
    lb: &Array1<f64>,
    ub: &Array1<f64>,
    lb_name: &str,
    ub_name: &str,
) -> Option<String> {
    for (i, (l, u)) in lb.iter().zip(ub.iter()).enumerate() {
        if l > u {
            return Some(format!(
                "{}<={} violated at index {}: got {}[{}]={} and {}[{}]={}",
                lb_name, ub_name, i, lb_name, i, l, ub_name, i, u
            ));
        }
    }
    None
}

fn report_interval(v: &Array1<f64>, lb: &Array1<f64>, ub: &Array1<f64>, label: &str, tol: f64) {
    for (i, ((val, l), u)) in v.iter().zip(lb.iter()).zip(ub.iter()).enumerate() {
        let state = if *val < l - tol || *val > u + tol {
            "violated"
        } else if (val - l).abs() <= tol || (val - u).abs() <= tol {
            "active"
        } else {
            "inactive"
        };
        info!(
            "{}[{}]: {} <= {} <= {} ({})",
            label, i, l, val, u, state
        );
    }
}
