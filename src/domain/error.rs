//! Domain error types.

/// Top-level error type for swingtrader.
#[derive(Debug, thiserror::Error)]
pub enum SwingtraderError {
    #[error("data source error: {reason}")]
    DataSource { reason: String },

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

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("export failed: {reason}")]
    Export { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SwingtraderError {
    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        SwingtraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing(section: &str, key: &str) -> Self {
        SwingtraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<csv::Error> for SwingtraderError {
    fn from(err: csv::Error) -> Self {
        SwingtraderError::Export {
            reason: err.to_string(),
        }
    }
}

impl From<&SwingtraderError> for std::process::ExitCode {
    fn from(err: &SwingtraderError) -> Self {
        let code: u8 = match err {
            SwingtraderError::Io(_) | SwingtraderError::Export { .. } => 1,
            SwingtraderError::ConfigParse { .. }
            | SwingtraderError::ConfigMissing { .. }
            | SwingtraderError::ConfigInvalid { .. } => 2,
            SwingtraderError::DataSource { .. } => 3,
            SwingtraderError::NoData { .. } | SwingtraderError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
