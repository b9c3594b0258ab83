//! Configuration options recognized by the derivative cache and the bounds
//! validator.

use super::function::NlpFunction;

/// User-supplied override functions for individual derivative roles.
///
/// A supplied function skips auto-differentiation for its role but is still
/// arity-validated and renamed to the canonical scheme.
#[derive(Debug, Clone, Default)]
pub struct FunctionOverrides {
    /// Function for calculating the gradient of the objective
    pub grad_f: Option<NlpFunction>,

    /// Function for calculating the Jacobian of the objective
    pub jac_f: Option<NlpFunction>,

    /// Function for calculating the Jacobian of the constraints
    pub jac_g: Option<NlpFunction>,

    /// Function for calculating the gradient of the Lagrangian
    pub grad_lag: Option<NlpFunction>,

    /// Function for calculating the Hessian of the Lagrangian
    pub hess_lag: Option<NlpFunction>,
}

/// Options recognized by the NLP sensitivity layer.
#[derive(Debug, Clone)]
pub struct NlpConfig {
    /// Re-express the NLP with constants folded before derivative synthesis.
    /// Default: false
    pub expand: bool,

    /// Warn if the initial guess does not satisfy LBX and UBX. Default: false
    pub warn_initial_bounds: bool,

    /// When errors occur during evaluation of the built functions, propagate
    /// them instead of downgrading to NaN outputs. Default: false
    pub eval_errors_fatal: bool,

    /// Skip the check that every free symbol of f and g is a declared
    /// decision variable or parameter. Default: false
    pub ignore_check_vec: bool,

    /// Per-role override functions (autogenerated by default).
    pub overrides: FunctionOverrides,
}

impl Default for NlpConfig {
    fn default() -> Self {
        Self {
            expand: false,
            warn_initial_bounds: false,
            eval_errors_fatal: false,
            ignore_check_vec: false,
            overrides: FunctionOverrides::default(),
        }
    }
}
