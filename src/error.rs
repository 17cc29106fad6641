/// Error types for the two fallible concerns: session persistence and
/// the taunt fetch. Everything else degrades to defaults.

use std::io;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("session I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TauntError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {code}")]
    Status { code: u16 },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("taunt service disabled")]
    Disabled,
}

impl TauntError {
    /// Rate limiting, server errors and transport failures are worth a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TauntError::Transport(_) => true,
            TauntError::Status { code } => *code == 429 || (500..600).contains(code),
            TauntError::Malformed(_) | TauntError::Disabled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(TauntError::Transport("reset".into()).is_retryable());
        assert!(TauntError::Status { code: 429 }.is_retryable());
        assert!(TauntError::Status { code: 503 }.is_retryable());
        assert!(!TauntError::Status { code: 400 }.is_retryable());
        assert!(!TauntError::Status { code: 403 }.is_retryable());
        assert!(!TauntError::Malformed("no candidates".into()).is_retryable());
        assert!(!TauntError::Disabled.is_retryable());
    }
}
