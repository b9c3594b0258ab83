//! Lazy synthesis and caching of NLP sensitivity functions.
//!
//! Each derivative role is built at most once per cache instance: the first
//! access either adopts a user override or auto-differentiates the NLP
//! expressions, validates the result against the fixed arity for the role,
//! assigns the canonical name and io scheme, and stores it. Later accesses
//! return the stored function unchanged.

use ndarray::{Array1, Array2};
use tracing::{debug, warn};

use super::config::NlpConfig;
use super::function::{
    FunctionInput, FunctionOutput, NlpFunction, NumericValue, OutputValue,
};
use super::SymbolicNlp;
use crate::error::{DaeOptError, Result};
use crate::expr::sparsity::SparsityPattern;
use crate::expr::{Expr, Symbol};

/// The derivative roles managed by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionRole {
    GradF,
    JacF,
    JacG,
    GradLag,
    HessLag,
}

impl FunctionRole {
    /// Canonical function name for the role.
    pub fn canonical_name(self) -> &'static str {
        match self {
            FunctionRole::GradF => "grad_f",
            FunctionRole::JacF => "jac_f",
            FunctionRole::JacG => "jac_g",
            FunctionRole::GradLag => "grad_lag",
            FunctionRole::HessLag => "hess_lag",
        }
    }

    /// Expected (inputs, outputs) counts for the role.
    pub fn arity(self) -> (usize, usize) {
        match self {
            FunctionRole::GradF => (2, 2),
            FunctionRole::JacF => (2, 2),
            FunctionRole::JacG => (2, 2),
            FunctionRole::GradLag => (4, 1),
            FunctionRole::HessLag => (4, 1),
        }
    }

    fn input_scheme(self) -> &'static [&'static str] {
        match self {
            FunctionRole::GradF | FunctionRole::JacF | FunctionRole::JacG => &["x", "p"],
            FunctionRole::GradLag | FunctionRole::HessLag => &["x", "p", "lam_f", "lam_g"],
        }
    }

    fn output_scheme(self) -> &'static [&'static str] {
        match self {
            FunctionRole::GradF => &["grad_f", "f"],
            FunctionRole::JacF => &["jac_f", "f"],
            FunctionRole::JacG => &["jac_g", "g"],
            FunctionRole::GradLag => &["grad_lag_x"],
            FunctionRole::HessLag => &["hess_lag"],
        }
    }
}

/// How many times each build routine has run; every entry stays at 0 or 1
/// for the lifetime of the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildCounts {
    pub grad_f: usize,
    pub jac_f: usize,
    pub jac_g: usize,
    pub grad_lag: usize,
    pub hess_lag: usize,
    pub sp_hess_lag: usize,
}

/// Derivative function cache over a borrowed NLP.
///
/// The cache never owns the problem; collaborators receive a plain borrow
/// of the `SymbolicNlp` they were constructed around.
pub struct DerivativeCache<'a> {
    nlp: &'a SymbolicNlp,
    config: NlpConfig,
    // Objective/constraints after the optional `expand` normalization.
    f: Expr,
    g: Vec<Expr>,
    grad_f: Option<NlpFunction>,
    jac_f: Option<NlpFunction>,
    jac_g: Option<NlpFunction>,
    grad_lag: Option<NlpFunction>,
    hess_lag: Option<NlpFunction>,
    sp_hess_lag: Option<SparsityPattern>,
    builds: BuildCounts,
}

impl<'a> DerivativeCache<'a> {
    /// Create a cache for the given NLP. Validates the NLP signature unless
    /// `ignore_check_vec` is set.
    pub fn new(nlp: &'a SymbolicNlp, config: NlpConfig) -> Result<Self> {
        if !config.ignore_check_vec {
            nlp.validate()?;
        }

        let (f, g) = if config.expand {
            debug!("expanding NLP before derivative synthesis");
            (
                nlp.objective().fold_constants(),
                nlp.constraints()
                    .iter()
                    .map(|e| e.fold_constants())
                    .collect(),
            )
        } else {
            (nlp.objective().clone(), nlp.constraints().to_vec())
        };

        Ok(Self {
            nlp,
            config,
            f,
            g,
            grad_f: None,
            jac_f: None,
            jac_g: None,
            grad_lag: None,
            hess_lag: None,
            sp_hess_lag: None,
            builds: BuildCounts::default(),
        })
    }

    /// The NLP this cache was built around.
    pub fn nlp(&self) -> &SymbolicNlp {
        self.nlp
    }

    /// Build counters, for observing the at-most-once property.
    pub fn build_counts(&self) -> BuildCounts {
        self.builds
    }

    /// Gradient of the objective.
    pub fn grad_f(&mut self) -> Result<&NlpFunction> {
        if self.grad_f.is_none() {
            self.builds.grad_f += 1;
            let adopted = self.config.overrides.grad_f.take();
            let fun = match adopted {
                Some(fun) => fun,
                None => {
                    debug!("generating objective gradient");
                    self.synthesize_grad_f()
                }
            };
            self.grad_f = Some(finalize(FunctionRole::GradF, fun)?);
        }
        slot_ref(&self.grad_f, FunctionRole::GradF)
    }

    /// Jacobian of the objective.
    pub fn jac_f(&mut self) -> Result<&NlpFunction> {
        if self.jac_f.is_none() {
            self.builds.jac_f += 1;
            let adopted = self.config.overrides.jac_f.take();
            let fun = match adopted {
                Some(fun) => fun,
                None => {
                    debug!("generating objective Jacobian");
                    self.synthesize_jac_f()
                }
            };
            self.jac_f = Some(finalize(FunctionRole::JacF, fun)?);
        }
        slot_ref(&self.jac_f, FunctionRole::JacF)
    }

    /// Jacobian of the constraints, or `None` on a problem without
    /// constraints: no synthesis or validation is attempted then.
    pub fn jac_g(&mut self) -> Result<Option<&NlpFunction>> {
        if self.nlp.ng() == 0 {
            return Ok(None);
        }
        if self.jac_g.is_none() {
            self.builds.jac_g += 1;
            let adopted = self.config.overrides.jac_g.take();
            let fun = match adopted {
                Some(fun) => fun,
                None => {
                    debug!("generating constraint Jacobian");
                    self.synthesize_jac_g()
                }
            };
            self.jac_g = Some(finalize(FunctionRole::JacG, fun)?);
        }
        Ok(self.jac_g.as_ref())
    }

    /// Gradient of the Lagrangian `lam_f*f + lam_g.g` with respect to x.
    pub fn grad_lag(&mut self) -> Result<&NlpFunction> {
        if self.grad_lag.is_none() {
            self.builds.grad_lag += 1;
            let adopted = self.config.overrides.grad_lag.take();
            let fun = match adopted {
                Some(fun) => fun,
                None => {
                    debug!("generating Lagrangian gradient");
                    self.synthesize_grad_lag()
                }
            };
            self.grad_lag = Some(finalize(FunctionRole::GradLag, fun)?);
        }
        slot_ref(&self.grad_lag, FunctionRole::GradLag)
    }

    /// Hessian of the Lagrangian, the symmetric Jacobian of `grad_lag`.
    pub fn hess_lag(&mut self) -> Result<&NlpFunction> {
        if self.hess_lag.is_none() {
            self.builds.hess_lag += 1;
            let adopted = self.config.overrides.hess_lag.take();
            let fun = match adopted {
                Some(fun) => fun,
                None => {
                    debug!("generating Hessian of the Lagrangian");
                    self.grad_lag()?;
                    let gl = self.grad_lag_exprs()?;
                    self.synthesize_hess_lag(&gl)
                }
            };
            self.hess_lag = Some(finalize(FunctionRole::HessLag, fun)?);
        }
        slot_ref(&self.hess_lag, FunctionRole::HessLag)
    }

    /// Nonzero structure of the Lagrangian Hessian; values are never
    /// computed. Reuses `grad_lag`.
    pub fn sp_hess_lag(&mut self) -> Result<&SparsityPattern> {
        if self.sp_hess_lag.is_none() {
            self.builds.sp_hess_lag += 1;
            debug!("generating Hessian of the Lagrangian sparsity pattern");
            self.grad_lag()?;
            let gl = self.grad_lag_exprs()?;
            let x_syms = self.nlp.x_symbols();
            let mut nz = Vec::new();
            for (i, entry) in gl.iter().enumerate() {
                for (j, sym) in x_syms.iter().enumerate() {
                    if entry.depends_on(sym) {
                        nz.push((i, j));
                    }
                }
            }
            let pattern =
                SparsityPattern::new(x_syms.len(), x_syms.len(), nz).symmetrized();
            self.sp_hess_lag = Some(pattern);
        }
        match &self.sp_hess_lag {
            Some(sp) => Ok(sp),
            None => Err(DaeOptError::InvalidState(
                "Hessian sparsity slot empty after build".to_string(),
            )),
        }
    }

    /// Evaluate a built function, honoring `eval_errors_fatal`: on a numeric
    /// failure with the option unset, the outputs are returned NaN-filled
    /// with a warning instead of an error.
    pub fn eval_checked(
        &self,
        fun: &NlpFunction,
        args: &[Array1<f64>],
    ) -> Result<Vec<NumericValue>> {
        match fun.eval(args) {
            Ok(values) => Ok(values),
            Err(err) => {
                if self.config.eval_errors_fatal {
                    return Err(err);
                }
                warn!("evaluation of '{}' failed ({}); returning NaN", fun.name(), err);
                let mut values = Vec::with_capacity(fun.n_out());
                for out in fun.outputs() {
                    values.push(match &out.value {
                        OutputValue::Vector(exprs) => {
                            NumericValue::Vector(Array1::from_elem(exprs.len(), f64::NAN))
                        }
                        OutputValue::Matrix(exprs) => {
                            NumericValue::Matrix(Array2::from_elem(exprs.dim(), f64::NAN))
                        }
                    });
                }
                Ok(values)
            }
        }
    }

    // ---- synthesis ----

    fn xp_inputs(&self) -> Vec<FunctionInput> {
        vec![
            FunctionInput::new("x", self.nlp.x_symbols()),
            FunctionInput::new("p", self.nlp.p_symbols()),
        ]
    }

    fn lagrangian_inputs(&self) -> Vec<FunctionInput> {
        let lam_g: Vec<Symbol> = (0..self.nlp.ng())
            .map(|i| Symbol::Var(format!("lam_g_{}", i)))
            .collect();
        vec![
            FunctionInput::new("x", self.nlp.x_symbols()),
            FunctionInput::new("p", self.nlp.p_symbols()),
            FunctionInput::new("lam_f", vec![Symbol::var("lam_f")]),
            FunctionInput::new("lam_g", lam_g),
        ]
    }

    fn synthesize_grad_f(&self) -> NlpFunction {
        let grad: Vec<Expr> = self
            .nlp
            .x_symbols()
            .iter()
            .map(|s| self.f.diff(s).fold_constants())
            .collect();
        NlpFunction::new(
            "grad_f",
            self.xp_inputs(),
            vec![
                FunctionOutput::vector("grad_f", grad),
                FunctionOutput::vector("f", vec![self.f.clone()]),
            ],
        )
    }

    fn synthesize_jac_f(&self) -> NlpFunction {
        let x_syms = self.nlp.x_symbols();
        let mut jac = Array2::from_elem((1, x_syms.len()), Expr::zero());
        for (j, sym) in x_syms.iter().enumerate() {
            jac[[0, j]] = self.f.diff(sym).fold_constants();
        }
        NlpFunction::new(
            "jac_f",
            self.xp_inputs(),
            vec![
                FunctionOutput::matrix("jac_f", jac),
                FunctionOutput::vector("f", vec![self.f.clone()]),
            ],
        )
    }

    fn synthesize_jac_g(&self) -> NlpFunction {
        let x_syms = self.nlp.x_symbols();
        let jac = crate::expr::jacobian(&self.g, &x_syms);
        NlpFunction::new(
            "jac_g",
            self.xp_inputs(),
            vec![
                FunctionOutput::matrix("jac_g", jac),
                FunctionOutput::vector("g", self.g.clone()),
            ],
        )
    }

    fn lagrangian(&self) -> Expr {
        let mut lag = Expr::var("lam_f") * self.f.clone();
        for (i, gi) in self.g.iter().enumerate() {
            lag = lag + Expr::Var(format!("lam_g_{}", i)) * gi.clone();
        }
        lag
    }

    fn synthesize_grad_lag(&self) -> NlpFunction {
        let lag = self.lagrangian();
        let grad: Vec<Expr> = self
            .nlp
            .x_symbols()
            .iter()
            .map(|s| lag.diff(s).fold_constants())
            .collect();
        NlpFunction::new(
            "grad_lag",
            self.lagrangian_inputs(),
            vec![FunctionOutput::vector("grad_lag_x", grad)],
        )
    }

    fn synthesize_hess_lag(&self, grad_lag: &[Expr]) -> NlpFunction {
        let x_syms = self.nlp.x_symbols();
        let nx = x_syms.len();
        let mut hess = Array2::from_elem((nx, nx), Expr::zero());
        // The Hessian is symmetric; differentiate the upper triangle and
        // mirror it.
        for i in 0..nx {
            for j in i..nx {
                let entry = grad_lag[i].diff(&x_syms[j]).fold_constants();
                hess[[j, i]] = entry.clone();
                hess[[i, j]] = entry;
            }
        }
        NlpFunction::new(
            "hess_lag",
            self.lagrangian_inputs(),
            vec![FunctionOutput::matrix("hess_lag", hess)],
        )
    }

    fn grad_lag_exprs(&self) -> Result<Vec<Expr>> {
        let fun = slot_ref(&self.grad_lag, FunctionRole::GradLag)?;
        match fun.output("grad_lag_x").map(|o| &o.value) {
            Some(OutputValue::Vector(exprs)) => Ok(exprs.clone()),
            _ => Err(DaeOptError::Shape(
                "grad_lag must produce a vector output named 'grad_lag_x'".to_string(),
            )),
        }
    }
}

fn slot_ref<'s>(
    slot: &'s Option<NlpFunction>,
    role: FunctionRole,
) -> Result<&'s NlpFunction> {
    match slot {
        Some(fun) => Ok(fun),
        None => Err(DaeOptError::InvalidState(format!(
            "derivative slot '{}' empty after build",
            role.canonical_name()
        ))),
    }
}

/// Validate the arity of a built or adopted function and apply the canonical
/// name and io scheme for the role.
fn finalize(role: FunctionRole, mut fun: NlpFunction) -> Result<NlpFunction> {
    let (expected_in, expected_out) = role.arity();
    if fun.n_in() != expected_in || fun.n_out() != expected_out {
        return Err(DaeOptError::SignatureMismatch {
            role: role.canonical_name(),
            expected_in,
            actual_in: fun.n_in(),
            expected_out,
            actual_out: fun.n_out(),
        });
    }
    fun.set_name(role.canonical_name());
    fun.rename_inputs(role.input_scheme());
    fun.rename_outputs(role.output_scheme());
    Ok(fun)
}
