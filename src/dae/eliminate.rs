//! Resolution and elimination of dependent variables.

use std::collections::HashMap;

use tracing::debug;

use super::FlatDae;
use crate::error::{DaeOptError, Result};
use crate::expr::{substitute_folded, Expr, Symbol};

impl FlatDae {
    /// Resolve dependent definitions that reference other dependent
    /// variables.
    ///
    /// Definitions are substituted into each other, with constant folding,
    /// until no dependent variable appears in any right-hand side. Acyclic
    /// definitions of depth d resolve within d passes, so definitions that
    /// still reference dependents after as many passes as there are
    /// dependent variables form a cycle and are rejected.
    pub fn eliminate_interdependencies(&mut self) -> Result<()> {
        let y_syms: Vec<Symbol> = self.y.iter().map(|n| Symbol::Var(n.clone())).collect();
        let n = self.y.len();

        for _pass in 0..=n {
            if !self.dep.iter().any(|d| d.depends_on_any(&y_syms)) {
                return Ok(());
            }
            let map: HashMap<Symbol, Expr> = self
                .y
                .iter()
                .zip(self.dep.iter())
                .map(|(name, def)| (Symbol::Var(name.clone()), def.clone()))
                .collect();
            self.dep = substitute_folded(&self.dep, &map);
        }

        // Still unresolved after n passes: name a variable on the cycle.
        let culprit = self
            .y
            .iter()
            .zip(self.dep.iter())
            .find(|(_, def)| def.depends_on_any(&y_syms))
            .map(|(name, _)| name.clone())
            .unwrap_or_default();
        Err(DaeOptError::Modeling(format!(
            "Cyclic dependent-variable definitions detected involving \"{}\"",
            culprit
        )))
    }

    /// Substitute the resolved dependent definitions into every equation
    /// category. A no-op on an equation set already free of dependent
    /// variables.
    pub fn eliminate_dependent(&mut self) -> Result<()> {
        debug!("eliminating {} dependent variables", self.y.len());
        let map: HashMap<Symbol, Expr> = self
            .y
            .iter()
            .zip(self.dep.iter())
            .map(|(name, def)| (Symbol::Var(name.clone()), def.clone()))
            .collect();
        self.equations.substitute_categories(&map);
        Ok(())
    }
}
