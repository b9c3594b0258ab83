//! # daeopt-rs
//!
//! `daeopt-rs` is the symbolic core of a dynamic-optimization toolchain:
//! it synthesizes and caches the sensitivity functions of a nonlinear
//! program, and structurally decomposes flat differential-algebraic
//! equation systems.
//!
//! The library provides:
//! - A symbolic expression engine with differentiation, substitution and
//!   sparsity queries
//! - A derivative cache building gradient/Jacobian/Hessian functions of an
//!   NLP lazily and at most once, with arity validation
//! - Bound-array validation for well-posedness before solving
//! - A flat-DAE pipeline: variable classification, dependent-variable
//!   elimination, scaling, BLT sorting and explicit extraction
//!
//! ## Basic Usage
//!
//! ```
//! use daeopt_rs::expr::Expr;
//! use daeopt_rs::nlp::{DerivativeCache, NlpConfig, SymbolicNlp};
//!
//! let nlp = SymbolicNlp::new(
//!     vec!["x0".to_string(), "x1".to_string()],
//!     vec![],
//!     Expr::parse("x0^2 + x1^2").unwrap(),
//!     vec![Expr::parse("x0 + x1 - 1").unwrap()],
//! )
//! .unwrap();
//! let mut cache = DerivativeCache::new(&nlp, NlpConfig::default()).unwrap();
//! let grad_f = cache.grad_f().unwrap();
//! assert_eq!(grad_f.name(), "grad_f");
//! ```

// Public modules
pub mod error;

// Symbolic expression engine
pub mod expr;

// NLP sensitivity layer
pub mod nlp;

// Flat DAE pipeline
pub mod dae;

// Re-exports for convenience
pub use error::{DaeOptError, Result};

pub use dae::FlatDae;
pub use nlp::{DerivativeCache, NlpBounds, SymbolicNlp};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn it_works() {
        assert_eq!(2 + 2, 4);
    }
}
