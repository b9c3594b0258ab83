//! Symbolic calculus on expressions: differentiation, substitution, constant
//! folding and Jacobian assembly.

use std::collections::HashMap;

use ndarray::Array2;

use super::sparsity::SparsityPattern;
use super::{BinaryOp, Expr, Symbol, UnaryOp};

// Smart constructors used by the derivative rules so trivial factors fold
// away during construction instead of in a separate pass.

fn add(a: Expr, b: Expr) -> Expr {
    match (a.as_const(), b.as_const()) {
        (Some(0.0), _) => b,
        (_, Some(0.0)) => a,
        (Some(x), Some(y)) => Expr::Const(x + y),
        _ => Expr::Binary(BinaryOp::Add, Box::new(a), Box::new(b)),
    }
}

fn sub(a: Expr, b: Expr) -> Expr {
    match (a.as_const(), b.as_const()) {
        (_, Some(0.0)) => a,
        (Some(0.0), _) => neg(b),
        (Some(x), Some(y)) => Expr::Const(x - y),
        _ => Expr::Binary(BinaryOp::Sub, Box::new(a), Box::new(b)),
    }
}

fn mul(a: Expr, b: Expr) -> Expr {
    match (a.as_const(), b.as_const()) {
        (Some(0.0), _) | (_, Some(0.0)) => Expr::zero(),
        (Some(1.0), _) => b,
        (_, Some(1.0)) => a,
        (Some(x), Some(y)) => Expr::Const(x * y),
        _ => Expr::Binary(BinaryOp::Mul, Box::new(a), Box::new(b)),
    }
}

fn div(a: Expr, b: Expr) -> Expr {
    match (a.as_const(), b.as_const()) {
        (Some(0.0), _) => Expr::zero(),
        (_, Some(1.0)) => a,
        _ => Expr::Binary(BinaryOp::Div, Box::new(a), Box::new(b)),
    }
}

fn neg(a: Expr) -> Expr {
    match a {
        Expr::Const(x) => Expr::Const(-x),
        Expr::Unary(UnaryOp::Neg, inner) => *inner,
        other => Expr::Unary(UnaryOp::Neg, Box::new(other)),
    }
}

fn pow(a: Expr, b: Expr) -> Expr {
    match b.as_const() {
        Some(0.0) => Expr::one(),
        Some(1.0) => a,
        _ => Expr::Binary(BinaryOp::Pow, Box::new(a), Box::new(b)),
    }
}

fn unary(op: UnaryOp, a: Expr) -> Expr {
    Expr::Unary(op, Box::new(a))
}

impl Expr {
    /// Partial derivative with respect to a symbol.
    ///
    /// `Var` and `Der` leaves are independent unknowns: d der(x) / d x = 0.
    pub fn diff(&self, wrt: &Symbol) -> Expr {
        match self {
            Expr::Const(_) => Expr::zero(),

            Expr::Var(name) => match wrt {
                Symbol::Var(n) if n == name => Expr::one(),
                _ => Expr::zero(),
            },

            Expr::Der(name) => match wrt {
                Symbol::Der(n) if n == name => Expr::one(),
                _ => Expr::zero(),
            },

            Expr::Unary(op, inner) => {
                let u = inner.as_ref().clone();
                let du = inner.diff(wrt);
                if du.as_const() == Some(0.0) {
                    return Expr::zero();
                }
                match op {
                    UnaryOp::Neg => neg(du),
                    UnaryOp::Sin => mul(unary(UnaryOp::Cos, u), du),
                    UnaryOp::Cos => neg(mul(unary(UnaryOp::Sin, u), du)),
                    UnaryOp::Tan => div(du, pow(unary(UnaryOp::Cos, u), Expr::Const(2.0))),
                    UnaryOp::Asin => div(
                        du,
                        unary(
                            UnaryOp::Sqrt,
                            sub(Expr::one(), pow(u, Expr::Const(2.0))),
                        ),
                    ),
                    UnaryOp::Acos => neg(div(
                        du,
                        unary(
                            UnaryOp::Sqrt,
                            sub(Expr::one(), pow(u, Expr::Const(2.0))),
                        ),
                    )),
                    UnaryOp::Atan => div(du, add(Expr::one(), pow(u, Expr::Const(2.0)))),
                    UnaryOp::Exp => mul(unary(UnaryOp::Exp, u), du),
                    UnaryOp::Log => div(du, u),
                    UnaryOp::Sqrt => div(du, mul(Expr::Const(2.0), unary(UnaryOp::Sqrt, u))),
                }
            }

            Expr::Binary(op, left, right) => {
                let u = left.as_ref().clone();
                let v = right.as_ref().clone();
                let du = left.diff(wrt);
                let dv = right.diff(wrt);
                match op {
                    BinaryOp::Add => add(du, dv),
                    BinaryOp::Sub => sub(du, dv),
                    BinaryOp::Mul => add(mul(du, v), mul(u, dv)),
                    BinaryOp::Div => {
                        // (du*v - u*dv) / v^2
                        div(
                            sub(mul(du, v.clone()), mul(u, dv)),
                            pow(v, Expr::Const(2.0)),
                        )
                    }
                    BinaryOp::Pow => {
                        if let Some(n) = v.as_const() {
                            // d(u^n) = n*u^(n-1)*du
                            mul(mul(Expr::Const(n), pow(u, Expr::Const(n - 1.0))), du)
                        } else {
                            // d(u^v) = u^v * (dv*log(u) + v*du/u)
                            mul(
                                pow(u.clone(), v.clone()),
                                add(
                                    mul(dv, unary(UnaryOp::Log, u.clone())),
                                    div(mul(v, du), u),
                                ),
                            )
                        }
                    }
                }
            }
        }
    }

    /// Replace symbol occurrences by expressions.
    pub fn substitute(&self, map: &HashMap<Symbol, Expr>) -> Expr {
        match self {
            Expr::Const(_) => self.clone(),

            Expr::Var(name) => match map.get(&Symbol::Var(name.clone())) {
                Some(repl) => repl.clone(),
                None => self.clone(),
            },

            Expr::Der(name) => match map.get(&Symbol::Der(name.clone())) {
                Some(repl) => repl.clone(),
                None => self.clone(),
            },

            Expr::Unary(op, inner) => Expr::Unary(*op, Box::new(inner.substitute(map))),

            Expr::Binary(op, left, right) => Expr::Binary(
                *op,
                Box::new(left.substitute(map)),
                Box::new(right.substitute(map)),
            ),
        }
    }

    /// Fold constant subexpressions and strip trivial factors.
    pub fn fold_constants(&self) -> Expr {
        match self {
            Expr::Const(_) | Expr::Var(_) | Expr::Der(_) => self.clone(),

            Expr::Unary(op, inner) => {
                let inner = inner.fold_constants();
                match inner.as_const() {
                    Some(c) => Expr::Const(op.apply(c)),
                    None => match op {
                        UnaryOp::Neg => neg(inner),
                        _ => Expr::Unary(*op, Box::new(inner)),
                    },
                }
            }

            Expr::Binary(op, left, right) => {
                let l = left.fold_constants();
                let r = right.fold_constants();
                if let (Some(a), Some(b)) = (l.as_const(), r.as_const()) {
                    return Expr::Const(op.apply(a, b));
                }
                match op {
                    BinaryOp::Add => add(l, r),
                    BinaryOp::Sub => sub(l, r),
                    BinaryOp::Mul => mul(l, r),
                    BinaryOp::Div => div(l, r),
                    BinaryOp::Pow => pow(l, r),
                }
            }
        }
    }
}

/// Substitute into a slice of expressions.
pub fn substitute_all(exprs: &[Expr], map: &HashMap<Symbol, Expr>) -> Vec<Expr> {
    exprs.iter().map(|e| e.substitute(map)).collect()
}

/// Substitute and constant-fold a slice of expressions.
pub fn substitute_folded(exprs: &[Expr], map: &HashMap<Symbol, Expr>) -> Vec<Expr> {
    exprs
        .iter()
        .map(|e| e.substitute(map).fold_constants())
        .collect()
}

/// The symbolic Jacobian of a residual vector with respect to a symbol list:
/// `J[i, j] = d residuals[i] / d wrt[j]`.
pub fn jacobian(residuals: &[Expr], wrt: &[Symbol]) -> Array2<Expr> {
    let mut jac = Array2::from_elem((residuals.len(), wrt.len()), Expr::zero());
    for (i, res) in residuals.iter().enumerate() {
        for (j, sym) in wrt.iter().enumerate() {
            if res.depends_on(sym) {
                jac[[i, j]] = res.diff(sym).fold_constants();
            }
        }
    }
    jac
}

/// The structural nonzero pattern of the Jacobian, without differentiating.
pub fn jac_sparsity(residuals: &[Expr], wrt: &[Symbol]) -> SparsityPattern {
    let mut nz = Vec::new();
    for (i, res) in residuals.iter().enumerate() {
        for (j, sym) in wrt.iter().enumerate() {
            if res.depends_on(sym) {
                nz.push((i, j));
            }
        }
    }
    SparsityPattern::new(residuals.len(), wrt.len(), nz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval_at(expr: &Expr, pairs: &[(&str, f64)]) -> f64 {
        let ctx: HashMap<String, f64> =
            pairs.iter().map(|(n, v)| (n.to_string(), *v)).collect();
        expr.evaluate(&ctx).unwrap()
    }

    #[test]
    fn test_diff_polynomial() {
        // d(x^3 + 2x)/dx = 3x^2 + 2
        let expr = Expr::parse("x^3 + 2*x").unwrap();
        let d = expr.diff(&Symbol::var("x"));
        assert_relative_eq!(eval_at(&d, &[("x", 2.0)]), 14.0, epsilon = 1e-12);
    }

    #[test]
    fn test_diff_product_rule() {
        // d(x*sin(x))/dx = sin(x) + x*cos(x)
        let expr = Expr::parse("x * sin(x)").unwrap();
        let d = expr.diff(&Symbol::var("x"));
        let x = 1.3;
        assert_relative_eq!(
            eval_at(&d, &[("x", x)]),
            x.sin() + x * x.cos(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_diff_quotient_and_chain() {
        // d(exp(2x)/x)/dx = (2x*exp(2x) - exp(2x)) / x^2
        let expr = Expr::parse("exp(2*x) / x").unwrap();
        let d = expr.diff(&Symbol::var("x"));
        let x: f64 = 0.7;
        let expected = (2.0 * x * (2.0 * x).exp() - (2.0 * x).exp()) / (x * x);
        assert_relative_eq!(eval_at(&d, &[("x", x)]), expected, epsilon = 1e-10);
    }

    #[test]
    fn test_diff_wrt_der() {
        // d(der(x) - x/tau)/d der(x) = 1, d(der(x) - x/tau)/dx = -1/tau
        let expr = Expr::parse("der(x) - x/tau").unwrap();
        let d_der = expr.diff(&Symbol::der("x")).fold_constants();
        assert_eq!(d_der, Expr::one());

        let d_x = expr.diff(&Symbol::var("x"));
        assert_relative_eq!(eval_at(&d_x, &[("tau", 4.0)]), -0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_substitute_with_folding() {
        let expr = Expr::parse("a + b * 2").unwrap();
        let mut map = HashMap::new();
        map.insert(Symbol::var("b"), Expr::Const(3.0));
        let result = expr.substitute(&map).fold_constants();
        assert_eq!(result, Expr::parse("a + 6").unwrap());
    }

    #[test]
    fn test_fold_constants() {
        assert_eq!(
            Expr::parse("2 * 3 + 1").unwrap().fold_constants(),
            Expr::Const(7.0)
        );
        assert_eq!(
            Expr::parse("0 * x + y * 1").unwrap().fold_constants(),
            Expr::var("y")
        );
        assert_eq!(
            Expr::parse("sin(0)").unwrap().fold_constants(),
            Expr::Const(0.0)
        );
    }

    #[test]
    fn test_jacobian_structure() {
        let residuals = vec![
            Expr::parse("x0 - 2").unwrap(),
            Expr::parse("x1 - x0 - 3").unwrap(),
        ];
        let syms = vec![Symbol::var("x0"), Symbol::var("x1")];
        let jac = jacobian(&residuals, &syms);
        assert_eq!(jac[[0, 0]], Expr::one());
        assert_eq!(jac[[0, 1]], Expr::zero());
        assert_eq!(jac[[1, 1]], Expr::one());

        let sp = jac_sparsity(&residuals, &syms);
        assert_eq!(sp.nnz(), 3);
        assert!(sp.contains(1, 0));
        assert!(!sp.contains(0, 1));
    }
}
