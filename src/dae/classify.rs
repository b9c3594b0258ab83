//! Ingestion records and variable classification.
//!
//! The ingestion adapter supplies raw variable records (tag strings and
//! optional attributes) plus equation lists per category. Classification
//! assigns every non-aliased variable a role, translates sign-tagged path
//! constraints into residual-plus-interval form and checks the per-category
//! dimension invariants.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::variable::{Alias, Causality, Variability, Variable, VariableRole};
use super::FlatDae;
use crate::error::{DaeOptError, Result};
use crate::expr::{Expr, Symbol};

/// Raw variable record as delivered by the ingestion adapter.
///
/// The three tags are strings from the source model; unknown spellings are a
/// configuration error at classification time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVariable {
    pub name: String,
    pub value_reference: u32,
    pub variability: String,
    pub causality: String,
    pub alias: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub display_unit: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub nominal: Option<f64>,
    #[serde(default)]
    pub free: Option<bool>,
}

impl RawVariable {
    /// A record with the given tags and no optional attributes.
    pub fn new(name: &str, variability: &str, causality: &str, alias: &str) -> Self {
        Self {
            name: name.to_string(),
            value_reference: 0,
            variability: variability.to_string(),
            causality: causality.to_string(),
            alias: alias.to_string(),
            unit: None,
            display_unit: None,
            min: None,
            max: None,
            start: None,
            nominal: None,
            free: None,
        }
    }
}

/// A sign-tagged path constraint from the source model.
#[derive(Debug, Clone, PartialEq)]
pub enum PathConstraint {
    /// expr <= bound
    Leq(Expr, Expr),
    /// expr >= bound
    Geq(Expr, Expr),
    /// expr == bound
    Eq(Expr, Expr),
}

/// Categorized model description delivered by the ingestion adapter.
#[derive(Debug, Clone, Default)]
pub struct ModelSource {
    pub variables: Vec<RawVariable>,

    /// Dependent-variable defining equations: (variable, expression)
    pub binding: Vec<(String, Expr)>,

    /// Implicit dynamic residuals
    pub dynamic: Vec<Expr>,

    /// Quadrature states with their right-hand sides
    pub quadrature: Vec<(String, Expr)>,

    /// Initial residuals
    pub initial: Vec<Expr>,

    /// Sign-tagged path constraints
    pub constraints: Vec<PathConstraint>,

    /// Mayer objective terms
    pub mayer: Vec<Expr>,

    /// Lagrange objective terms
    pub lagrange: Vec<Expr>,

    /// Optional time horizon
    pub t0: Option<f64>,
    pub tf: Option<f64>,
}

fn parse_variability(tag: &str) -> Result<Variability> {
    match tag {
        "constant" => Ok(Variability::Constant),
        "parameter" => Ok(Variability::Parameter),
        "discrete" => Ok(Variability::Discrete),
        "continuous" => Ok(Variability::Continuous),
        other => Err(DaeOptError::Configuration(format!(
            "Unknown variability: \"{}\"",
            other
        ))),
    }
}

fn parse_causality(tag: &str) -> Result<Causality> {
    match tag {
        "input" => Ok(Causality::Input),
        "output" => Ok(Causality::Output),
        "internal" => Ok(Causality::Internal),
        other => Err(DaeOptError::Configuration(format!(
            "Unknown causality: \"{}\"",
            other
        ))),
    }
}

fn parse_alias(tag: &str) -> Result<Alias> {
    match tag {
        "noAlias" => Ok(Alias::NoAlias),
        "alias" => Ok(Alias::Alias),
        "negatedAlias" => Ok(Alias::NegatedAlias),
        other => Err(DaeOptError::Configuration(format!(
            "Unknown alias: \"{}\"",
            other
        ))),
    }
}

impl FlatDae {
    /// Classify a model source into a flat DAE.
    pub fn from_source(source: ModelSource) -> Result<Self> {
        let mut dae = FlatDae::empty();
        dae.t0 = source.t0;
        dae.tf = source.tf;

        // Pass 1: create variables, skipping aliases entirely.
        let mut order = Vec::new();
        for raw in &source.variables {
            let variability = parse_variability(&raw.variability)?;
            let causality = parse_causality(&raw.causality)?;
            let alias = parse_alias(&raw.alias)?;

            if alias != Alias::NoAlias {
                continue;
            }

            // The role is provisional until the classification pass below.
            let mut var =
                Variable::new(&raw.name, VariableRole::Dependent, causality, variability);
            var.set_value_reference(raw.value_reference);
            var.set_unit(raw.unit.as_deref());
            var.set_display_unit(raw.display_unit.as_deref());
            if let Some(nominal) = raw.nominal {
                var.set_nominal(nominal)?;
            }
            let min = raw.min.unwrap_or(f64::NEG_INFINITY);
            let max = raw.max.unwrap_or(f64::INFINITY);
            var.set_bounds(min, max)?;
            if let Some(start) = raw.start {
                var.set_start(start);
            }
            if let Some(free) = raw.free {
                var.set_free(free);
            }

            dae.add_variable(var)?;
            order.push(raw.name.clone());
        }

        // Pass 2: binding equations define dependent variables.
        for (name, expr) in &source.binding {
            if dae.y.contains(name) {
                return Err(DaeOptError::Modeling(format!(
                    "Variable \"{}\" has more than one binding equation",
                    name
                )));
            }
            dae.variable_mut(name)?.set_role(VariableRole::Dependent);
            dae.y.push(name.clone());
            dae.dep.push(expr.clone());
        }

        // Pass 3: quadrature states.
        for (name, rhs) in &source.quadrature {
            dae.variable_mut(name)?.set_role(VariableRole::Quadrature);
            dae.q.push(name.clone());
            dae.equations.quad.push(rhs.clone());
        }

        // Pass 4: classify everything else by variability and causality.
        for name in &order {
            if dae.y.contains(name) || dae.q.contains(name) {
                continue;
            }
            let (variability, causality, nominal, free) = {
                let var = dae.variable(name)?;
                (var.variability(), var.causality(), var.nominal(), var.free())
            };

            let role = match (variability, causality) {
                (Variability::Parameter, _) => {
                    if !free {
                        return Err(DaeOptError::Modeling(format!(
                            "Parameter \"{}\" is not free",
                            name
                        )));
                    }
                    VariableRole::Parameter
                }
                (Variability::Continuous, Causality::Internal) => VariableRole::Differential,
                (Variability::Continuous, Causality::Input) => VariableRole::Control,
                (Variability::Constant, _) => {
                    // Constants become dependents bound to their nominal value.
                    dae.y.push(name.clone());
                    dae.dep.push(Expr::Const(nominal));
                    VariableRole::Dependent
                }
                (variability, causality) => {
                    return Err(DaeOptError::Configuration(format!(
                        "Variable \"{}\" has unsupported variability/causality \
                         combination {:?}/{:?}",
                        name, variability, causality
                    )));
                }
            };

            dae.variable_mut(name)?.set_role(role);
            match role {
                VariableRole::Parameter => dae.p.push(name.clone()),
                VariableRole::Differential => dae.x.push(name.clone()),
                VariableRole::Control => dae.u.push(name.clone()),
                _ => {}
            }
        }

        // Equations: implicit residuals pair with the differential states.
        dae.equations.dae = source.dynamic.clone();
        dae.equations.initial = source.initial.clone();
        dae.equations.mterm = source.mayer.clone();
        dae.equations.lterm = source.lagrange.clone();

        // Path constraints translate to residual + interval.
        for constraint in &source.constraints {
            match constraint {
                PathConstraint::Leq(expr, bound) => {
                    let residual = (expr.clone() - bound.clone()).fold_constants();
                    dae.equations.add_path(residual, f64::NEG_INFINITY, 0.0);
                }
                PathConstraint::Geq(expr, bound) => {
                    let residual = (expr.clone() - bound.clone()).fold_constants();
                    dae.equations.add_path(residual, 0.0, f64::INFINITY);
                }
                PathConstraint::Eq(expr, bound) => {
                    let residual = (expr.clone() - bound.clone()).fold_constants();
                    dae.equations.add_path(residual, 0.0, 0.0);
                }
            }
        }

        dae.check_symbols()?;
        dae.check_dimensions()?;

        debug!(
            "classification complete: #x = {}, #u = {}, #p = {}, #y = {}",
            dae.x.len(),
            dae.u.len(),
            dae.p.len(),
            dae.y.len()
        );
        Ok(dae)
    }

    /// Every symbol referenced by an equation must name a known variable;
    /// `time` is implicitly known.
    fn check_symbols(&self) -> Result<()> {
        let check = |exprs: &[Expr]| -> Result<()> {
            for expr in exprs {
                for sym in expr.symbols() {
                    let name = match &sym {
                        Symbol::Var(n) | Symbol::Der(n) => n.as_str(),
                    };
                    if name != "time" && !self.variables.contains_key(name) {
                        return Err(DaeOptError::Modeling(format!(
                            "No such variable: \"{}\"",
                            name
                        )));
                    }
                }
            }
            Ok(())
        };

        check(&self.equations.dae)?;
        check(&self.equations.initial)?;
        check(&self.equations.path)?;
        check(&self.equations.quad)?;
        check(&self.equations.mterm)?;
        check(&self.equations.lterm)?;
        check(&self.dep)?;
        Ok(())
    }
}
