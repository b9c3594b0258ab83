//! Variable records of a flat DAE.

use serde::{Deserialize, Serialize};

use crate::error::{DaeOptError, Result};
use crate::expr::Expr;

/// Role a variable plays in the flattened system.
///
/// Assigned during classification; scaling and explicit extraction may
/// reclassify a variable (e.g. algebraic to dependent), but variables are
/// never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableRole {
    /// Free parameter, constant over the horizon
    Parameter,
    /// Control input
    Control,
    /// Differential state
    Differential,
    /// Algebraic state
    Algebraic,
    /// Quadrature state
    Quadrature,
    /// Defined by an explicit binding expression
    Dependent,
}

/// Causality tag from the source model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Causality {
    Input,
    Output,
    Internal,
}

/// Variability tag from the source model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variability {
    Constant,
    Parameter,
    Discrete,
    Continuous,
}

/// Alias tag from the source model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alias {
    NoAlias,
    Alias,
    NegatedAlias,
}

/// A classified variable with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    name: String,
    role: VariableRole,
    causality: Causality,
    variability: Variability,
    alias: Alias,
    value_reference: u32,
    nominal: f64,
    min: f64,
    max: f64,
    start: f64,
    derivative_start: f64,
    free: bool,
    unit: Option<String>,
    display_unit: Option<String>,
}

impl Variable {
    pub fn new(
        name: &str,
        role: VariableRole,
        causality: Causality,
        variability: Variability,
    ) -> Self {
        Self {
            name: name.to_string(),
            role,
            causality,
            variability,
            alias: Alias::NoAlias,
            value_reference: 0,
            nominal: 1.0,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            start: 0.0,
            derivative_start: 0.0,
            free: true,
            unit: None,
            display_unit: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> VariableRole {
        self.role
    }

    pub fn set_role(&mut self, role: VariableRole) {
        self.role = role;
    }

    pub fn causality(&self) -> Causality {
        self.causality
    }

    pub fn variability(&self) -> Variability {
        self.variability
    }

    pub fn alias(&self) -> Alias {
        self.alias
    }

    pub fn set_alias(&mut self, alias: Alias) {
        self.alias = alias;
    }

    pub fn value_reference(&self) -> u32 {
        self.value_reference
    }

    pub fn set_value_reference(&mut self, value_reference: u32) {
        self.value_reference = value_reference;
    }

    pub fn nominal(&self) -> f64 {
        self.nominal
    }

    /// Set the nominal value used for scaling. Must be finite and nonzero.
    pub fn set_nominal(&mut self, nominal: f64) -> Result<()> {
        if nominal == 0.0 || !nominal.is_finite() {
            return Err(DaeOptError::Modeling(format!(
                "Nominal value of \"{}\" must be finite and nonzero, got {}",
                self.name, nominal
            )));
        }
        self.nominal = nominal;
        Ok(())
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn set_bounds(&mut self, min: f64, max: f64) -> Result<()> {
        if min > max {
            return Err(DaeOptError::Modeling(format!(
                "Invalid bounds for \"{}\": min={} > max={}",
                self.name, min, max
            )));
        }
        self.min = min;
        self.max = max;
        Ok(())
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn set_start(&mut self, start: f64) {
        self.start = start;
    }

    /// Start value in scaled units.
    pub fn start_scaled(&self) -> f64 {
        self.start / self.nominal
    }

    pub fn derivative_start(&self) -> f64 {
        self.derivative_start
    }

    pub fn set_derivative_start(&mut self, derivative_start: f64) {
        self.derivative_start = derivative_start;
    }

    pub fn free(&self) -> bool {
        self.free
    }

    pub fn set_free(&mut self, free: bool) {
        self.free = free;
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn set_unit(&mut self, unit: Option<&str>) {
        self.unit = unit.map(|s| s.to_string());
    }

    pub fn display_unit(&self) -> Option<&str> {
        self.display_unit.as_deref()
    }

    pub fn set_display_unit(&mut self, display_unit: Option<&str>) {
        self.display_unit = display_unit.map(|s| s.to_string());
    }

    /// Symbolic reference to the variable itself.
    pub fn var(&self) -> Expr {
        Expr::Var(self.name.clone())
    }

    /// Symbolic reference to the time derivative of the variable.
    pub fn der(&self) -> Expr {
        Expr::Der(self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_defaults() {
        let var = Variable::new(
            "plant.T",
            VariableRole::Differential,
            Causality::Internal,
            Variability::Continuous,
        );
        assert_eq!(var.name(), "plant.T");
        assert_eq!(var.nominal(), 1.0);
        assert_eq!(var.min(), f64::NEG_INFINITY);
        assert_eq!(var.max(), f64::INFINITY);
        assert!(var.free());
    }

    #[test]
    fn test_nominal_rejects_zero() {
        let mut var = Variable::new(
            "x",
            VariableRole::Algebraic,
            Causality::Internal,
            Variability::Continuous,
        );
        assert!(var.set_nominal(0.0).is_err());
        assert!(var.set_nominal(f64::INFINITY).is_err());
        var.set_nominal(100.0).unwrap();
        var.set_start(250.0);
        assert_eq!(var.start_scaled(), 2.5);
    }

    #[test]
    fn test_bounds_validation() {
        let mut var = Variable::new(
            "u",
            VariableRole::Control,
            Causality::Input,
            Variability::Continuous,
        );
        assert!(var.set_bounds(1.0, -1.0).is_err());
        var.set_bounds(-1.0, 1.0).unwrap();
        assert_eq!(var.min(), -1.0);
        assert_eq!(var.max(), 1.0);
    }

    #[test]
    fn test_json_round_trip() {
        let mut var = Variable::new(
            "tank.level",
            VariableRole::Algebraic,
            Causality::Internal,
            Variability::Continuous,
        );
        var.set_bounds(0.0, 10.0).unwrap();
        var.set_nominal(5.0).unwrap();
        var.set_unit(Some("m"));

        let json = serde_json::to_string(&var).unwrap();
        let back: Variable = serde_json::from_str(&json).unwrap();
        assert_eq!(var, back);
    }
}
