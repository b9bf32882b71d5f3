use thiserror::Error;

/// Typed exchange-layer errors.
///
/// The retry wrapper in the agent binary retries a fixed number of times
/// regardless of kind; the distinction matters for logging and for the
/// startup precondition check (a missing credential is fatal, not retried).
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("venue rejected request: {0}")]
    Rejected(String),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}

impl ExchangeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Transport(_))
    }
}
