/// Result alias that carries the custom [`MeditationError`] type.
pub type Result<T> = std::result::Result<T, MeditationError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum MeditationError {
    /// Free-form failure reported by a sink or helper.
    #[error("{0}")]
    Message(String),
    /// A session or settings value fell outside its accepted range.
    #[error("invalid `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
    /// A synthesis routine was asked for something it cannot produce.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// WAV decoding or encoding failure.
    #[error("wav: {0}")]
    Wav(#[from] hound::Error),
    /// Settings snapshot could not be parsed or written.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl MeditationError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid_config<T: Into<String>>(field: &'static str, reason: T) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending field for configuration errors.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidConfig { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<&str> for MeditationError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for MeditationError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
