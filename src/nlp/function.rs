//! Symbolic multi-input/multi-output functions.
//!
//! An `NlpFunction` is what the derivative cache hands to a solver: a named
//! function with a fixed list of named inputs (each binding a list of symbols)
//! and named outputs (each a symbolic vector or matrix), evaluable at numeric
//! points.

use std::collections::HashMap;

use ndarray::{Array1, Array2};

use crate::error::{DaeOptError, Result};
use crate::expr::{Expr, Symbol};

/// A named function input binding a list of symbols.
#[derive(Debug, Clone)]
pub struct FunctionInput {
    pub name: String,
    pub symbols: Vec<Symbol>,
}

impl FunctionInput {
    pub fn new(name: &str, symbols: Vec<Symbol>) -> Self {
        Self {
            name: name.to_string(),
            symbols,
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Symbolic payload of a function output.
#[derive(Debug, Clone)]
pub enum OutputValue {
    Vector(Vec<Expr>),
    Matrix(Array2<Expr>),
}

/// A named function output.
#[derive(Debug, Clone)]
pub struct FunctionOutput {
    pub name: String,
    pub value: OutputValue,
}

impl FunctionOutput {
    pub fn vector(name: &str, exprs: Vec<Expr>) -> Self {
        Self {
            name: name.to_string(),
            value: OutputValue::Vector(exprs),
        }
    }

    pub fn matrix(name: &str, exprs: Array2<Expr>) -> Self {
        Self {
            name: name.to_string(),
            value: OutputValue::Matrix(exprs),
        }
    }
}

/// Numeric result of evaluating one function output.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericValue {
    Vector(Array1<f64>),
    Matrix(Array2<f64>),
}

/// A named symbolic function with fixed input/output arity.
#[derive(Debug, Clone)]
pub struct NlpFunction {
    name: String,
    inputs: Vec<FunctionInput>,
    outputs: Vec<FunctionOutput>,
}

impl NlpFunction {
    pub fn new(name: &str, inputs: Vec<FunctionInput>, outputs: Vec<FunctionOutput>) -> Self {
        Self {
            name: name.to_string(),
            inputs,
            outputs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn n_in(&self) -> usize {
        self.inputs.len()
    }

    pub fn n_out(&self) -> usize {
        self.outputs.len()
    }

    pub fn inputs(&self) -> &[FunctionInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[FunctionOutput] {
        &self.outputs
    }

    /// Rename the input ports; lengths are untouched. Extra names are
    /// ignored, missing names leave ports unchanged.
    pub fn rename_inputs(&mut self, names: &[&str]) {
        for (port, name) in self.inputs.iter_mut().zip(names) {
            port.name = name.to_string();
        }
    }

    /// Rename the output ports, as `rename_inputs`.
    pub fn rename_outputs(&mut self, names: &[&str]) {
        for (port, name) in self.outputs.iter_mut().zip(names) {
            port.name = name.to_string();
        }
    }

    /// Look up an output by name.
    pub fn output(&self, name: &str) -> Option<&FunctionOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Evaluate all outputs at a numeric point, one argument vector per
    /// input port.
    pub fn eval(&self, args: &[Array1<f64>]) -> Result<Vec<NumericValue>> {
        if args.len() != self.inputs.len() {
            return Err(DaeOptError::Shape(format!(
                "Function '{}' expects {} input vectors, got {}",
                self.name,
                self.inputs.len(),
                args.len()
            )));
        }

        let mut values: HashMap<Symbol, f64> = HashMap::new();
        for (port, arg) in self.inputs.iter().zip(args) {
            if arg.len() != port.symbols.len() {
                return Err(DaeOptError::Shape(format!(
                    "Function '{}' input '{}' expects length {}, got {}",
                    self.name,
                    port.name,
                    port.symbols.len(),
                    arg.len()
                )));
            }
            for (sym, value) in port.symbols.iter().zip(arg.iter()) {
                values.insert(sym.clone(), *value);
            }
        }

        let mut results = Vec::with_capacity(self.outputs.len());
        for out in &self.outputs {
            match &out.value {
                OutputValue::Vector(exprs) => {
                    let mut data = Array1::zeros(exprs.len());
                    for (i, e) in exprs.iter().enumerate() {
                        data[i] = e.evaluate(&values)?;
                    }
                    results.push(NumericValue::Vector(data));
                }
                OutputValue::Matrix(exprs) => {
                    let (nr, nc) = exprs.dim();
                    let mut data = Array2::zeros((nr, nc));
                    for ((i, j), e) in exprs.indexed_iter() {
                        data[[i, j]] = e.evaluate(&values)?;
                    }
                    results.push(NumericValue::Matrix(data));
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn simple_function() -> NlpFunction {
        // f(x) = [x0 + x1, x0 * x1]
        NlpFunction::new(
            "pair",
            vec![FunctionInput::new(
                "x",
                vec![Symbol::var("x0"), Symbol::var("x1")],
            )],
            vec![FunctionOutput::vector(
                "y",
                vec![
                    Expr::parse("x0 + x1").unwrap(),
                    Expr::parse("x0 * x1").unwrap(),
                ],
            )],
        )
    }

    #[test]
    fn test_eval_vector_output() {
        let fun = simple_function();
        let out = fun.eval(&[array![2.0, 3.0]]).unwrap();
        assert_eq!(out.len(), 1);
        match &out[0] {
            NumericValue::Vector(v) => {
                assert_eq!(v, &array![5.0, 6.0]);
            }
            _ => panic!("Expected vector output"),
        }
    }

    #[test]
    fn test_eval_shape_errors() {
        let fun = simple_function();

        // Wrong number of argument vectors
        assert!(matches!(
            fun.eval(&[]),
            Err(DaeOptError::Shape(_))
        ));

        // Wrong argument length
        assert!(matches!(
            fun.eval(&[array![1.0]]),
            Err(DaeOptError::Shape(_))
        ));
    }

    #[test]
    fn test_rename_ports() {
        let mut fun = simple_function();
        fun.rename_inputs(&["x_in"]);
        fun.rename_outputs(&["y_out"]);
        assert_eq!(fun.inputs()[0].name, "x_in");
        assert_eq!(fun.output("y_out").map(|o| o.name.as_str()), Some("y_out"));
    }
}
