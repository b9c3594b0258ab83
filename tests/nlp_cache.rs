//! Integration tests for the NLP sensitivity layer.

use approx::assert_relative_eq;
use daeopt_rs::expr::Expr;
use daeopt_rs::nlp::{
    DerivativeCache, FunctionInput, FunctionOutput, LinsolRegistry, NlpBounds, NlpConfig,
    NlpFunction, NumericValue, SymbolicNlp,
};
use daeopt_rs::DaeOptError;
use ndarray::array;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// min (x0 - 1)^2 + 2*x1^2  s.t.  g0 = x0 + x1 - p0, g1 = x0*x1
fn constrained_nlp() -> SymbolicNlp {
    SymbolicNlp::new(
        names(&["x0", "x1"]),
        names(&["p0"]),
        Expr::parse("(x0 - 1)^2 + 2*x1^2").unwrap(),
        vec![
            Expr::parse("x0 + x1 - p0").unwrap(),
            Expr::parse("x0 * x1").unwrap(),
        ],
    )
    .unwrap()
}

#[test]
fn derivative_functions_evaluate_consistently() {
    let nlp = constrained_nlp();
    let mut cache = DerivativeCache::new(&nlp, NlpConfig::default()).unwrap();

    let x = array![2.0, -1.0];
    let p = array![3.0];

    // grad_f = [2*(x0 - 1), 4*x1]
    let out = cache.grad_f().unwrap().eval(&[x.clone(), p.clone()]).unwrap();
    match &out[0] {
        NumericValue::Vector(grad) => {
            assert_relative_eq!(grad[0], 2.0, epsilon = 1e-12);
            assert_relative_eq!(grad[1], -4.0, epsilon = 1e-12);
        }
        _ => panic!("Expected a vector gradient"),
    }

    // jac_f agrees with grad_f, laid out as a 1 x nx matrix.
    let out = cache.jac_f().unwrap().eval(&[x.clone(), p.clone()]).unwrap();
    match &out[0] {
        NumericValue::Matrix(jac) => {
            assert_eq!(jac.dim(), (1, 2));
            assert_relative_eq!(jac[[0, 0]], 2.0, epsilon = 1e-12);
            assert_relative_eq!(jac[[0, 1]], -4.0, epsilon = 1e-12);
        }
        _ => panic!("Expected a matrix Jacobian"),
    }

    // jac_g = [[1, 1], [x1, x0]]
    let jac_g = cache.jac_g().unwrap().expect("problem has constraints");
    let out = jac_g.eval(&[x.clone(), p.clone()]).unwrap();
    match &out[0] {
        NumericValue::Matrix(jac) => {
            assert_eq!(jac.dim(), (2, 2));
            assert_relative_eq!(jac[[0, 0]], 1.0, epsilon = 1e-12);
            assert_relative_eq!(jac[[1, 0]], -1.0, epsilon = 1e-12);
            assert_relative_eq!(jac[[1, 1]], 2.0, epsilon = 1e-12);
        }
        _ => panic!("Expected a matrix Jacobian"),
    }

    // grad_lag at lam_f = 1, lam_g = [1, 0]:
    // d/dx0 (f + g0) = 2*(x0 - 1) + 1
    let out = cache
        .grad_lag()
        .unwrap()
        .eval(&[x.clone(), p.clone(), array![1.0], array![1.0, 0.0]])
        .unwrap();
    match &out[0] {
        NumericValue::Vector(grad) => {
            assert_relative_eq!(grad[0], 3.0, epsilon = 1e-12);
            assert_relative_eq!(grad[1], -3.0, epsilon = 1e-12);
        }
        _ => panic!("Expected a vector gradient"),
    }

    // hess_lag at lam_f = 1, lam_g = [0, 1]: [[2, 1], [1, 4]]
    let out = cache
        .hess_lag()
        .unwrap()
        .eval(&[x, p, array![1.0], array![0.0, 1.0]])
        .unwrap();
    match &out[0] {
        NumericValue::Matrix(hess) => {
            assert_relative_eq!(hess[[0, 0]], 2.0, epsilon = 1e-12);
            assert_relative_eq!(hess[[0, 1]], 1.0, epsilon = 1e-12);
            assert_relative_eq!(hess[[1, 0]], 1.0, epsilon = 1e-12);
            assert_relative_eq!(hess[[1, 1]], 4.0, epsilon = 1e-12);
        }
        _ => panic!("Expected a matrix Hessian"),
    }

    // Hessian sparsity covers the dense 2x2 coupling here.
    let sp = cache.sp_hess_lag().unwrap();
    assert_eq!(sp.nnz(), 4);
}

#[test]
fn repeated_access_returns_the_cached_function() {
    let nlp = constrained_nlp();
    let mut cache = DerivativeCache::new(&nlp, NlpConfig::default()).unwrap();

    for _ in 0..5 {
        cache.grad_f().unwrap();
        cache.jac_f().unwrap();
        cache.jac_g().unwrap();
        cache.grad_lag().unwrap();
        cache.hess_lag().unwrap();
        cache.sp_hess_lag().unwrap();
    }

    let counts = cache.build_counts();
    assert_eq!(counts.grad_f, 1);
    assert_eq!(counts.jac_f, 1);
    assert_eq!(counts.jac_g, 1);
    assert_eq!(counts.grad_lag, 1);
    assert_eq!(counts.hess_lag, 1);
    assert_eq!(counts.sp_hess_lag, 1);
}

#[test]
fn unconstrained_problem_has_no_constraint_jacobian() {
    let nlp = SymbolicNlp::new(
        names(&["x0"]),
        names(&[]),
        Expr::parse("x0^4").unwrap(),
        vec![],
    )
    .unwrap();
    let mut cache = DerivativeCache::new(&nlp, NlpConfig::default()).unwrap();
    assert!(cache.jac_g().unwrap().is_none());
    assert!(cache.jac_g().unwrap().is_none());
    assert_eq!(cache.build_counts().jac_g, 0);
}

#[test]
fn wrong_arity_overrides_are_rejected_per_role() {
    let nlp = constrained_nlp();

    // Too many outputs for hess_lag (expects 1).
    let bad_hess = NlpFunction::new(
        "user_hess",
        vec![
            FunctionInput::new("x", nlp.x_symbols()),
            FunctionInput::new("p", nlp.p_symbols()),
            FunctionInput::new("lam_f", vec![]),
            FunctionInput::new("lam_g", vec![]),
        ],
        vec![
            FunctionOutput::vector("a", vec![]),
            FunctionOutput::vector("b", vec![]),
        ],
    );
    let mut config = NlpConfig::default();
    config.overrides.hess_lag = Some(bad_hess);
    let mut cache = DerivativeCache::new(&nlp, config).unwrap();
    match cache.hess_lag() {
        Err(DaeOptError::SignatureMismatch {
            role,
            expected_out,
            actual_out,
            ..
        }) => {
            assert_eq!(role, "hess_lag");
            assert_eq!(expected_out, 1);
            assert_eq!(actual_out, 2);
        }
        other => panic!("Expected SignatureMismatch, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn valid_override_is_adopted_and_renamed() {
    let nlp = constrained_nlp();
    let custom = NlpFunction::new(
        "my_gradient",
        vec![
            FunctionInput::new("a", nlp.x_symbols()),
            FunctionInput::new("b", nlp.p_symbols()),
        ],
        vec![
            FunctionOutput::vector("dg", vec![Expr::Const(7.0), Expr::Const(8.0)]),
            FunctionOutput::vector("val", vec![Expr::Const(9.0)]),
        ],
    );
    let mut config = NlpConfig::default();
    config.overrides.grad_f = Some(custom);
    let mut cache = DerivativeCache::new(&nlp, config).unwrap();

    let grad_f = cache.grad_f().unwrap();
    assert_eq!(grad_f.name(), "grad_f");
    assert_eq!(grad_f.inputs()[0].name, "x");
    let out = grad_f.eval(&[array![0.0, 0.0], array![0.0]]).unwrap();
    match &out[0] {
        NumericValue::Vector(v) => assert_eq!(v[0], 7.0),
        _ => panic!("Expected vector"),
    }
}

#[test]
fn bounds_scenario_from_ill_posed_problem() {
    let mut bounds = NlpBounds::new(1, 0, 0);
    bounds.lbx = array![0.0];
    bounds.ubx = array![-1.0];
    match bounds.check_inputs() {
        Err(DaeOptError::IllPosedProblem(msg)) => {
            assert!(msg.contains("LBX<=UBX violated"));
            assert!(msg.contains("index 0"));
        }
        other => panic!("Expected IllPosedProblem, got {:?}", other),
    }
}

#[test]
fn initial_bounds_accept_iff_ordered_and_finite_sided() {
    // Well-posed: lbx <= ubx, lbg <= ubg, no +inf lower / -inf upper.
    let mut bounds = NlpBounds::new(2, 1, 0);
    bounds.lbx = array![0.0, f64::NEG_INFINITY];
    bounds.ubx = array![1.0, f64::INFINITY];
    bounds.lbg = array![-2.0];
    bounds.ubg = array![2.0];
    assert!(bounds.check_initial_bounds(false).is_ok());

    // +inf lower bound on g is ill-posed even though ordering holds.
    bounds.lbg = array![f64::INFINITY];
    bounds.ubg = array![f64::INFINITY];
    assert!(matches!(
        bounds.check_initial_bounds(false),
        Err(DaeOptError::IllPosedProblem(_))
    ));
}

#[test]
fn linsol_registry_reports_unknown_plugins() {
    let registry = LinsolRegistry::default();
    assert!(registry.create("gaussian-elimination").is_ok());
    match registry.create("does-not-exist") {
        Err(DaeOptError::PluginNotFound(name)) => assert_eq!(name, "does-not-exist"),
        _ => panic!("Expected PluginNotFound"),
    }
}

#[test]
fn expand_folds_before_synthesis() {
    let nlp = SymbolicNlp::new(
        names(&["x0"]),
        names(&[]),
        Expr::parse("x0 * (2 + 3)").unwrap(),
        vec![],
    )
    .unwrap();
    let mut config = NlpConfig::default();
    config.expand = true;
    let mut cache = DerivativeCache::new(&nlp, config).unwrap();
    let out = cache
        .grad_f()
        .unwrap()
        .eval(&[array![1.0], array![]])
        .unwrap();
    match &out[0] {
        NumericValue::Vector(grad) => assert_relative_eq!(grad[0], 5.0, epsilon = 1e-12),
        _ => panic!("Expected vector"),
    }
}
