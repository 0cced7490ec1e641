//! Domain error types.

/// Top-level error type for foldtrader.
///
/// Only configuration and structurally invalid input are fatal. Recoverable
/// conditions (missing prices, failed trials, thin folds, drawdown freezes)
/// never surface through this type.
#[derive(Debug, thiserror::Error)]
pub enum FoldtraderError {
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

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FoldtraderError {
    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        FoldtraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn config_missing(section: &str, key: &str) -> Self {
        FoldtraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        FoldtraderError::InvalidInput {
            reason: reason.into(),
        }
    }
}

impl From<&FoldtraderError> for std::process::ExitCode {
    fn from(err: &FoldtraderError) -> Self {
        let code: u8 = match err {
            FoldtraderError::Io(_) => 1,
            FoldtraderError::ConfigParse { .. }
            | FoldtraderError::ConfigMissing { .. }
            | FoldtraderError::ConfigInvalid { .. } => 2,
            FoldtraderError::Data { .. } => 3,
            FoldtraderError::InvalidInput { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}

/// Why a single optimization trial produced no score.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrialFailure {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("backtest produced fewer than two portfolio states")]
    EmptyEquityCurve,

    #[error("objective evaluated to a non-finite value")]
    NonFiniteScore,
}
