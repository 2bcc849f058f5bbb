use thiserror::Error;

use crate::controller::RunState;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid block size {actual} (run block size is {expected})")]
    InvalidBlockSize { expected: usize, actual: usize },

    #[error("acquisition failure: {0}")]
    Acquisition(String),

    #[error("persistence failure: {0}")]
    Persistence(#[source] std::io::Error),

    #[error("render failure: {0}")]
    Render(String),

    #[error("cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: RunState,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GateError {
    /// Fatal errors end the current run; the rest are reported and the
    /// stream keeps going.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GateError::InvalidBlockSize { .. } | GateError::Acquisition(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
