//! Nondimensionalization of variables and implicit equations.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::FlatDae;
use crate::error::{DaeOptError, Result};
use crate::expr::{jacobian, substitute_folded, Expr, Symbol};

impl FlatDae {
    /// Replace every variable `v` by `nominal(v) * v` so the scaled
    /// variables are expected to be of unit order of magnitude.
    ///
    /// One-shot: scaling twice would square the nominal factors.
    pub fn scale_variables(&mut self) -> Result<()> {
        if self.scaled_variables {
            return Err(DaeOptError::InvalidState(
                "Variables have already been scaled".to_string(),
            ));
        }
        debug!("scaling variables");

        let mut map: HashMap<Symbol, Expr> = HashMap::new();
        let state_names: Vec<String> = self.x.iter().chain(self.xd.iter()).cloned().collect();
        for name in state_names
            .iter()
            .chain(self.xa.iter())
            .chain(self.q.iter())
            .chain(self.p.iter())
            .chain(self.u.iter())
        {
            let nominal = self.variable(name)?.nominal();
            if nominal == 1.0 {
                continue;
            }
            map.insert(
                Symbol::Var(name.clone()),
                Expr::Const(nominal) * Expr::Var(name.clone()),
            );
        }
        // State derivatives carry the state's nominal value.
        for name in state_names.iter().chain(self.q.iter()) {
            let nominal = self.variable(name)?.nominal();
            if nominal == 1.0 {
                continue;
            }
            map.insert(
                Symbol::Der(name.clone()),
                Expr::Const(nominal) * Expr::Der(name.clone()),
            );
        }

        self.equations.dae = substitute_folded(&self.equations.dae, &map);
        self.equations.initial = substitute_folded(&self.equations.initial, &map);
        self.equations.path = substitute_folded(&self.equations.path, &map);
        self.equations.mterm = substitute_folded(&self.equations.mterm, &map);
        self.equations.lterm = substitute_folded(&self.equations.lterm, &map);

        self.scaled_variables = true;
        Ok(())
    }

    /// Scale the implicit residuals so each is of unit order of magnitude at
    /// the declared start values.
    ///
    /// Per residual row, the scale factor is the largest absolute value over
    /// the structurally nonzero Jacobian entries with respect to
    /// [state, derivative, algebraic, parameter, control], evaluated at the
    /// start point with derivatives at zero. Not-a-number entries are
    /// ignored; a row without a finite nonzero entry falls back to 1.0 with
    /// a diagnostic.
    ///
    /// Requires `scale_variables` to have run first; one-shot.
    pub fn scale_equations(&mut self) -> Result<()> {
        if self.scaled_equations {
            return Err(DaeOptError::InvalidState(
                "Equations have already been scaled".to_string(),
            ));
        }
        if !self.scaled_variables {
            return Err(DaeOptError::InvalidState(
                "Variables must be scaled before the equations".to_string(),
            ));
        }
        if self.equations.dae.is_empty() {
            self.scaled_equations = true;
            return Ok(());
        }
        debug!("scaling {} implicit equations", self.equations.dae.len());

        // Differentiation targets: states and their derivatives, algebraic
        // states, parameters, controls.
        let mut syms: Vec<Symbol> = Vec::new();
        for name in &self.x {
            syms.push(Symbol::Var(name.clone()));
            syms.push(Symbol::Der(name.clone()));
        }
        for name in self.xa.iter().chain(self.p.iter()).chain(self.u.iter()) {
            syms.push(Symbol::Var(name.clone()));
        }

        // Start point in scaled units, derivatives at zero.
        let mut point: HashMap<Symbol, f64> = HashMap::new();
        point.insert(Symbol::var("time"), 0.0);
        for sym in &syms {
            let value = match sym {
                Symbol::Var(name) => self.variable(name)?.start_scaled(),
                Symbol::Der(_) => 0.0,
            };
            point.insert(sym.clone(), value);
        }

        let jac = jacobian(&self.equations.dae, &syms);
        for (i, residual) in self.equations.dae.iter_mut().enumerate() {
            let mut scale = 0.0_f64;
            for j in 0..syms.len() {
                let entry = &jac[[i, j]];
                if entry.as_const() == Some(0.0) {
                    continue;
                }
                let value = entry.evaluate(&point).unwrap_or(f64::NAN);
                if !value.is_nan() {
                    scale = scale.max(value.abs());
                }
            }

            if scale == 0.0 || !scale.is_finite() {
                warn!(
                    "could not generate a scaling factor for equation {} (0 == {}), selecting 1",
                    i, residual
                );
                continue;
            }
            if scale != 1.0 {
                *residual = (residual.clone() / Expr::Const(scale)).fold_constants();
            }
        }

        self.scaled_equations = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::classify::{ModelSource, RawVariable};
    use super::*;

    fn scaled_source() -> ModelSource {
        let mut source = ModelSource::default();
        let mut x = RawVariable::new("x", "continuous", "internal", "noAlias");
        x.nominal = Some(100.0);
        x.start = Some(200.0);
        source.variables.push(x);
        let mut u = RawVariable::new("u", "continuous", "input", "noAlias");
        u.start = Some(1.0);
        source.variables.push(u);
        // 0 == der(x) - 4*x - u
        source
            .dynamic
            .push(Expr::parse("der(x) - 4*x - u").unwrap());
        source
    }

    #[test]
    fn test_scale_variables_substitutes_nominals() {
        let mut dae = FlatDae::from_source(scaled_source()).unwrap();
        dae.scale_variables().unwrap();
        assert_eq!(
            dae.equations.dae[0],
            Expr::parse("100*der(x) - 4*(100*x) - u").unwrap()
        );
    }

    #[test]
    fn test_scale_variables_is_one_shot() {
        let mut dae = FlatDae::from_source(scaled_source()).unwrap();
        dae.scale_variables().unwrap();
        assert!(matches!(
            dae.scale_variables(),
            Err(DaeOptError::InvalidState(_))
        ));
    }

    #[test]
    fn test_scale_equations_requires_scaled_variables() {
        let mut dae = FlatDae::from_source(scaled_source()).unwrap();
        assert!(matches!(
            dae.scale_equations(),
            Err(DaeOptError::InvalidState(_))
        ));
    }

    #[test]
    fn test_scale_equations_divides_by_row_max() {
        let mut dae = FlatDae::from_source(scaled_source()).unwrap();
        dae.scale_variables().unwrap();
        dae.scale_equations().unwrap();

        // Jacobian at start: d/d der(x) = 100, d/dx = -400, d/du = -1;
        // row max = 400, so the residual is divided by 400.
        let mut point: HashMap<Symbol, f64> = HashMap::new();
        point.insert(Symbol::var("x"), 2.0);
        point.insert(Symbol::der("x"), 0.0);
        point.insert(Symbol::var("u"), 0.0);
        let value = dae.equations.dae[0].evaluate(&point).unwrap();
        // Unscaled residual at this point: -4*100*2 = -800; scaled: -2.
        approx::assert_relative_eq!(value, -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_row_falls_back_to_one() {
        let mut source = ModelSource::default();
        let mut x = RawVariable::new("x", "continuous", "internal", "noAlias");
        x.start = Some(0.0);
        source.variables.push(x);
        // Jacobian entry 2*x vanishes at the start point.
        source.dynamic.push(Expr::parse("x^2").unwrap());

        let mut dae = FlatDae::from_source(source).unwrap();
        dae.scale_variables().unwrap();
        let before = dae.equations.dae[0].clone();
        dae.scale_equations().unwrap();
        assert_eq!(dae.equations.dae[0], before);
        assert!(dae.equations_scaled());
    }
}
