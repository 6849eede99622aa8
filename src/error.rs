use thiserror::Error;

use crate::session::SessionState;

pub type KrResult<T> = Result<T, KrError>;

#[derive(Debug, Error)]
pub enum KrError {
    /// Anything other than a single ASCII digit. Hosts ignore this one.
    #[error("invalid input {0:?}: expected a single digit 0-9")]
    InvalidInput(String),

    #[error("cannot {operation} while the session is {state}")]
    InvalidStateTransition {
        operation: &'static str,
        state: SessionState,
    },

    #[error("session already finished")]
    AlreadyFinished,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv failure: {0}")]
    Csv(#[from] csv::Error),
}

impl KrError {
    /// True for the engine-level conditions that leave the session untouched
    /// and can be retried once the caller fixes its state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            KrError::InvalidInput(_)
                | KrError::InvalidStateTransition { .. }
                | KrError::AlreadyFinished
        )
    }
}
