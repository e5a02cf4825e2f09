//! Error types for the EM control loop.

use thiserror::Error;

/// Result type alias for EM loop operations.
pub type Result<T> = std::result::Result<T, EmError>;

/// Errors that can occur while driving expectation-maximization.
#[derive(Debug, Error)]
pub enum EmError {
    /// Invalid configuration parameter.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The factor graph cannot support an EM run (no variables, no weights).
    #[error("invalid factor graph: {0}")]
    InvalidGraph(String),

    /// A variable's domain kind has no pseudo-likelihood rule.
    ///
    /// Terminal: the estimator never skips a variable, so a total that
    /// cannot include every evidenced variable is never produced.
    #[error("unsupported {domain} domain for variable {variable}")]
    UnsupportedDomain {
        /// Index of the offending variable.
        variable: usize,
        /// Domain kind name, e.g. `"real"`.
        domain: &'static str,
    },

    /// The external sampler failed inside a blocking call.
    #[error("sampler failed during {operation}: {message}")]
    Sampler {
        /// Which sampler entry point failed.
        operation: &'static str,
        /// Implementation-provided failure detail.
        message: String,
    },

    /// Config file I/O error.
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file parse error.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config serialization error.
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl EmError {
    /// Convenience constructor for sampler failures.
    pub fn sampler(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Sampler {
            operation,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EmError::InvalidConfig("window_length must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "invalid configuration: window_length must be at least 1"
        );

        let err = EmError::UnsupportedDomain {
            variable: 7,
            domain: "real",
        };
        assert_eq!(err.to_string(), "unsupported real domain for variable 7");

        let err = EmError::sampler("learn", "epoch 3 worker panicked");
        assert_eq!(
            err.to_string(),
            "sampler failed during learn: epoch 3 worker panicked"
        );
    }
}
