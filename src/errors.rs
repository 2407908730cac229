use thiserror::Error;

/// Structural misuse of the simulation. None of these are recoverable mid-episode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    #[error("observation out of range: step {step_index} needs {window_size} bars of history in a series of {len} bars")]
    OutOfRange {
        step_index: usize,
        window_size: usize,
        len: usize,
    },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type EnvResult<T> = std::result::Result<T, EnvError>;

impl EnvError {
    pub fn configuration(message: impl Into<String>) -> Self {
        EnvError::Configuration(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        EnvError::InvalidState(message.into())
    }
}
