//! Domain error types.

/// Top-level error type for samquant.
///
/// Every variant carries the offending ticker, indicator or parameter so a
/// caller can report what went wrong without re-running the computation.
#[derive(Debug, thiserror::Error)]
pub enum SamquantError {
    #[error("insufficient data for {context}: have {have} points, need {need}")]
    InsufficientData {
        context: String,
        have: usize,
        need: usize,
    },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("data unavailable for {ticker}: {reason}")]
    DataUnavailable { ticker: String, reason: String },

    #[error("numeric degeneracy in {context}: {reason}")]
    NumericDegeneracy { context: String, reason: String },

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

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SamquantError {
    pub(crate) fn insufficient(context: impl Into<String>, have: usize, need: usize) -> Self {
        SamquantError::InsufficientData {
            context: context.into(),
            have,
            need,
        }
    }

    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        SamquantError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn degenerate(context: impl Into<String>, reason: impl Into<String>) -> Self {
        SamquantError::NumericDegeneracy {
            context: context.into(),
            reason: reason.into(),
        }
    }
}

impl From<&SamquantError> for std::process::ExitCode {
    fn from(err: &SamquantError) -> Self {
        let code: u8 = match err {
            SamquantError::Io(_) => 1,
            SamquantError::ConfigParse { .. }
            | SamquantError::ConfigMissing { .. }
            | SamquantError::ConfigInvalid { .. } => 2,
            SamquantError::DataUnavailable { .. } => 3,
            SamquantError::InvalidParameter { .. } => 4,
            SamquantError::InsufficientData { .. } | SamquantError::NumericDegeneracy { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
