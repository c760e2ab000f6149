//! Error types.
//!
//! Two layers:
//!
//! - [`AppError`]: fatal errors that abort a run (bad configuration, missing
//!   library file, ...). Carries the process exit code.
//! - [`FitFailure`]: recoverable failure of a single candidate fit or polish
//!   segment. The engines record these next to the affected row/segment and
//!   keep going.

use thiserror::Error;

/// Exit code for configuration errors (bad flags, malformed inputs).
pub const EXIT_CONFIG: u8 = 2;
/// Exit code for resource errors (unreadable library or input files).
pub const EXIT_RESOURCE: u8 = 3;
/// Exit code for pipeline errors that leave nothing to report.
pub const EXIT_PIPELINE: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, message)
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(EXIT_RESOURCE, message)
    }

    pub fn pipeline(message: impl Into<String>) -> Self {
        Self::new(EXIT_PIPELINE, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Why a single fit did not produce a usable result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitFailure {
    /// The residual or objective evaluated to NaN/inf at the starting point
    /// or at every trial step.
    #[error("non-finite residuals ({context})")]
    NonFinite { context: &'static str },

    /// The linearized step could not be solved.
    #[error("singular normal equations")]
    Singular,

    /// The evaluation budget ran out before the convergence test passed.
    #[error("did not converge within {nfev} evaluations")]
    NotConverged { nfev: usize },

    /// The per-fit wall-clock budget ran out.
    #[error("deadline exceeded after {nfev} evaluations")]
    DeadlineExceeded { nfev: usize },

    /// The run was cancelled before this fit started.
    #[error("cancelled")]
    Cancelled,

    /// The match could not evaluate the model for these parameters.
    #[error("model evaluation failed: {0}")]
    Model(String),
}

impl FitFailure {
    /// Short tag used in exports (`status` column).
    pub fn tag(&self) -> &'static str {
        match self {
            FitFailure::NonFinite { .. } => "non-finite",
            FitFailure::Singular => "singular",
            FitFailure::NotConverged { .. } => "no-convergence",
            FitFailure::DeadlineExceeded { .. } => "deadline",
            FitFailure::Cancelled => "cancelled",
            FitFailure::Model(_) => "model",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_exit_codes() {
        assert_eq!(AppError::config("x").exit_code(), EXIT_CONFIG);
        assert_eq!(AppError::resource("x").exit_code(), EXIT_RESOURCE);
        assert_eq!(AppError::pipeline("x").exit_code(), EXIT_PIPELINE);
        assert_eq!(AppError::config("bad flag").to_string(), "bad flag");
    }

    #[test]
    fn failure_display_and_tag() {
        let f = FitFailure::DeadlineExceeded { nfev: 12 };
        assert_eq!(f.to_string(), "deadline exceeded after 12 evaluations");
        assert_eq!(f.tag(), "deadline");
        assert_eq!(FitFailure::Cancelled.tag(), "cancelled");
    }
}
