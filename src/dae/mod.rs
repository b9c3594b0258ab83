//! Flat DAE representation and structural-decomposition pipeline.
//!
//! A [`FlatDae`] owns the classified variables and the per-category equation
//! lists and threads them through the pipeline stages in a fixed order:
//! classification, interdependency resolution, dependent elimination,
//! variable scaling, equation scaling, BLT sorting and explicit extraction.
//! Each stage mutates the shared lists in place and is guarded against
//! out-of-order or repeated invocation.

pub mod blt;
pub mod classify;
pub mod eliminate;
pub mod equations;
pub mod explicit;
pub mod scale;
pub mod variable;

pub use blt::{dulmage_mendelsohn, BltResult, CoarseDecomposition};
pub use classify::{ModelSource, PathConstraint, RawVariable};
pub use equations::EquationSet;
pub use explicit::{ExtractOptions, NewtonPolicy};
pub use variable::{Alias, Causality, Variability, Variable, VariableRole};

use std::collections::HashMap;
use std::fmt;

use crate::error::{DaeOptError, Result};
use crate::expr::{Expr, Symbol};

/// A flattened DAE system with classified variables.
#[derive(Debug, Clone)]
pub struct FlatDae {
    variables: HashMap<String, Variable>,

    /// Implicit (differential) states, matched to `equations.dae`
    x: Vec<String>,
    /// Explicit states, matched to `equations.ode`
    xd: Vec<String>,
    /// Algebraic states, matched to `equations.alg`
    xa: Vec<String>,
    /// Quadrature states, matched to `equations.quad`
    q: Vec<String>,
    /// Dependent variables, matched to `dep`
    y: Vec<String>,
    /// Controls
    u: Vec<String>,
    /// Free parameters
    p: Vec<String>,

    /// Dependent-variable defining expressions, parallel to `y`
    dep: Vec<Expr>,

    pub equations: EquationSet,

    /// Time horizon, when the source supplies one
    t0: Option<f64>,
    tf: Option<f64>,

    scaled_variables: bool,
    scaled_equations: bool,
    sorted: bool,
    blt: Option<BltResult>,
}

impl FlatDae {
    pub(crate) fn empty() -> Self {
        Self {
            variables: HashMap::new(),
            x: Vec::new(),
            xd: Vec::new(),
            xa: Vec::new(),
            q: Vec::new(),
            y: Vec::new(),
            u: Vec::new(),
            p: Vec::new(),
            dep: Vec::new(),
            equations: EquationSet::new(),
            t0: None,
            tf: None,
            scaled_variables: false,
            scaled_equations: false,
            sorted: false,
            blt: None,
        }
    }

    /// Look up a variable by qualified name.
    pub fn variable(&self, name: &str) -> Result<&Variable> {
        self.variables
            .get(name)
            .ok_or_else(|| DaeOptError::Modeling(format!("No such variable: \"{}\"", name)))
    }

    pub(crate) fn variable_mut(&mut self, name: &str) -> Result<&mut Variable> {
        self.variables
            .get_mut(name)
            .ok_or_else(|| DaeOptError::Modeling(format!("No such variable: \"{}\"", name)))
    }

    /// Register a variable; duplicate names are a modeling error.
    pub(crate) fn add_variable(&mut self, var: Variable) -> Result<()> {
        let name = var.name().to_string();
        if self.variables.contains_key(&name) {
            return Err(DaeOptError::Modeling(format!(
                "Variable \"{}\" has already been added",
                name
            )));
        }
        self.variables.insert(name, var);
        Ok(())
    }

    pub fn implicit_states(&self) -> &[String] {
        &self.x
    }

    pub fn explicit_states(&self) -> &[String] {
        &self.xd
    }

    pub fn algebraic_states(&self) -> &[String] {
        &self.xa
    }

    pub fn quadrature_states(&self) -> &[String] {
        &self.q
    }

    pub fn dependent_names(&self) -> &[String] {
        &self.y
    }

    /// Dependent defining expressions, parallel to `dependent_names`.
    pub fn dependent_definitions(&self) -> &[Expr] {
        &self.dep
    }

    pub fn controls(&self) -> &[String] {
        &self.u
    }

    pub fn parameters(&self) -> &[String] {
        &self.p
    }

    pub fn time_horizon(&self) -> (Option<f64>, Option<f64>) {
        (self.t0, self.tf)
    }

    pub fn variables_scaled(&self) -> bool {
        self.scaled_variables
    }

    pub fn equations_scaled(&self) -> bool {
        self.scaled_equations
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// The BLT decomposition computed by the last `sort_blt` call, until the
    /// extractor consumes it.
    pub fn blt_result(&self) -> Option<&BltResult> {
        self.blt.as_ref()
    }

    /// Check the per-category count correspondence between variable and
    /// equation lists.
    pub fn check_dimensions(&self) -> Result<()> {
        let pairs = [
            ("implicit states", self.x.len(), self.equations.dae.len()),
            ("explicit states", self.xd.len(), self.equations.ode.len()),
            ("algebraic states", self.xa.len(), self.equations.alg.len()),
            ("quadrature states", self.q.len(), self.equations.quad.len()),
            ("dependent variables", self.y.len(), self.dep.len()),
        ];
        for (what, nvars, neqs) in pairs {
            if nvars != neqs {
                return Err(DaeOptError::Modeling(format!(
                    "Count mismatch for {}: {} variables but {} equations",
                    what, nvars, neqs
                )));
            }
        }
        Ok(())
    }

    /// Reclassify a differential state as algebraic.
    ///
    /// An explicit state moves to the algebraic list together with its
    /// right-hand side; an implicit state has its derivative zeroed out of
    /// the implicit residuals instead.
    pub fn make_algebraic(&mut self, name: &str) -> Result<()> {
        if let Some(k) = self.xd.iter().position(|n| n == name) {
            let var_name = self.xd.remove(k);
            let rhs = self.equations.ode.remove(k);
            self.xa.push(var_name);
            self.equations.alg.push(rhs);
            self.variable_mut(name)?.set_role(VariableRole::Algebraic);
            return Ok(());
        }

        if self.x.iter().any(|n| n == name) {
            let mut map = HashMap::new();
            map.insert(Symbol::der(name), Expr::zero());
            self.equations.dae = crate::expr::substitute_folded(&self.equations.dae, &map);
            self.variable_mut(name)?.set_role(VariableRole::Algebraic);
            return Ok(());
        }

        Err(DaeOptError::Modeling(format!(
            "\"{}\" is not a differential state",
            name
        )))
    }
}

impl fmt::Display for FlatDae {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Dimensions: #x = {}, #xd = {}, #xa = {}, #q = {}, #y = {}, #p = {}, #u = {}",
            self.x.len(),
            self.xd.len(),
            self.xa.len(),
            self.q.len(),
            self.y.len(),
            self.p.len(),
            self.u.len()
        )?;

        writeln!(f, "Implicit dynamic equations")?;
        for eq in &self.equations.dae {
            writeln!(f, "0 == {}", eq)?;
        }

        writeln!(f, "Explicit differential equations")?;
        for (name, rhs) in self.xd.iter().zip(self.equations.ode.iter()) {
            writeln!(f, "der({}) == {}", name, rhs)?;
        }

        writeln!(f, "Algebraic equations")?;
        for (name, rhs) in self.xa.iter().zip(self.equations.alg.iter()) {
            writeln!(f, "{} == {}", name, rhs)?;
        }

        writeln!(f, "Quadrature equations")?;
        for (name, rhs) in self.q.iter().zip(self.equations.quad.iter()) {
            writeln!(f, "der({}) == {}", name, rhs)?;
        }

        writeln!(f, "Initial equations")?;
        for eq in &self.equations.initial {
            writeln!(f, "0 == {}", eq)?;
        }

        writeln!(f, "Dependent equations")?;
        for (name, def) in self.y.iter().zip(self.dep.iter()) {
            writeln!(f, "{} == {}", name, def)?;
        }

        writeln!(f, "Mayer objective terms")?;
        for term in &self.equations.mterm {
            writeln!(f, "{}", term)?;
        }

        writeln!(f, "Lagrange objective terms")?;
        for term in &self.equations.lterm {
            writeln!(f, "{}", term)?;
        }

        writeln!(f, "Path constraints")?;
        for ((eq, lo), hi) in self
            .equations
            .path
            .iter()
            .zip(self.equations.path_min.iter())
            .zip(self.equations.path_max.iter())
        {
            writeln!(f, "{} <= {} <= {}", lo, eq, hi)?;
        }

        if let (Some(t0), Some(tf)) = (self.t0, self.tf) {
            writeln!(f, "Time horizon: t0 = {}, tf = {}", t0, tf)?;
        }
        Ok(())
    }
}
