//! Domain error types.
//!
//! Only conditions that make a run impossible are errors. Data-level gaps are
//! recovered where they occur and reported as [`Diagnostic`](super::diagnostics::Diagnostic)s.

use chrono::NaiveDate;

/// Top-level error type for factorwalk.
#[derive(Debug, thiserror::Error)]
pub enum FactorwalkError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(
        "no walk-forward periods fit between {start} and {end} with train window {train} and test window {test}"
    )]
    NoPeriods {
        start: NaiveDate,
        end: NaiveDate,
        train: String,
        test: String,
    },

    #[error("signal store error: {reason}")]
    Store { reason: String },

    #[error("signal store query error: {reason}")]
    StoreQuery { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FactorwalkError {
    /// Shorthand for an `[engine]` range violation.
    pub fn invalid(key: &str, reason: impl Into<String>) -> Self {
        FactorwalkError::ConfigInvalid {
            section: "engine".to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FactorwalkError::ConfigParse { .. }
                | FactorwalkError::ConfigMissing { .. }
                | FactorwalkError::ConfigInvalid { .. }
                | FactorwalkError::NoPeriods { .. }
        )
    }
}

impl From<&FactorwalkError> for std::process::ExitCode {
    fn from(err: &FactorwalkError) -> Self {
        let code: u8 = match err {
            FactorwalkError::Io(_) => 1,
            FactorwalkError::ConfigParse { .. }
            | FactorwalkError::ConfigMissing { .. }
            | FactorwalkError::ConfigInvalid { .. }
            | FactorwalkError::NoPeriods { .. } => 2,
            FactorwalkError::Store { .. } | FactorwalkError::StoreQuery { .. } => 3,
        };
        std::process::ExitCode::from(code)
    }
}
