use thiserror::Error;

/// Error types for the daeopt-rs library.
#[derive(Error, Debug)]
pub enum DaeOptError {
    /// Unknown or contradictory variable tag at the ingestion boundary.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A synthesized or user-supplied derivative function has the wrong arity.
    #[error(
        "Signature mismatch for '{role}': expected {expected_in} inputs and \
         {expected_out} outputs, got {actual_in} inputs and {actual_out} outputs"
    )]
    SignatureMismatch {
        role: &'static str,
        expected_in: usize,
        actual_in: usize,
        expected_out: usize,
        actual_out: usize,
    },

    /// Bound arrays describe a problem that cannot have a solution.
    #[error("Ill-posed problem detected: {0}")]
    IllPosedProblem(String),

    /// Duplicate variable, undefined variable, fixed parameter or cyclic
    /// dependent definition.
    #[error("Modeling error: {0}")]
    Modeling(String),

    /// A pipeline stage was invoked out of order or more than once.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Numeric evaluation failure.
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Expression text that could not be parsed.
    #[error("Failed to parse expression: {0}")]
    Parse(String),

    /// Unknown linear solver plugin name.
    #[error("No such plugin: {0}")]
    PluginNotFound(String),

    /// Vector length mismatch at a function or bounds seam.
    #[error("Shape mismatch: {0}")]
    Shape(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for daeopt-rs operations.
pub type Result<T> = std::result::Result<T, DaeOptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DaeOptError::IllPosedProblem("LBX<=UBX violated at index 0".to_string());
        assert!(format!("{}", err).contains("LBX<=UBX violated"));

        let err = DaeOptError::SignatureMismatch {
            role: "jac_g",
            expected_in: 2,
            actual_in: 3,
            expected_out: 2,
            actual_out: 1,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("jac_g"));
        assert!(msg.contains("expected 2 inputs"));
        assert!(msg.contains("got 3 inputs"));
    }

    #[test]
    fn test_plugin_not_found_display() {
        let err = DaeOptError::PluginNotFound("symbolic_qr".to_string());
        assert_eq!(format!("{}", err), "No such plugin: symbolic_qr");
    }
}
