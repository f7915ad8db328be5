use super::retry::{RetryError, Transient};
use crate::asserter::AssertError;
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("validation: {0}")]
    Validation(#[from] AssertError),
    #[error("retries exhausted after {attempts} attempts: {source}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
    #[error("cancelled")]
    Cancelled,
    #[error("configuration: {0}")]
    Config(String),
    #[error("invalid block range [{low}, {high}]")]
    InvalidRange { low: i64, high: i64 },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("asserter not initialized")]
    AsserterNotInitialized,
}

/// Coarse classification callers can match on instead of variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Validation,
    ExhaustedRetries,
    Cancelled,
    Configuration,
    Range,
    InvalidResponse,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Transport(e) if e.is_transient() => ErrorKind::Transient,
            // Non-retriable transport failures mean the server sent something unusable.
            FetchError::Transport(_) | FetchError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            FetchError::Validation(_) => ErrorKind::Validation,
            FetchError::ExhaustedRetries { .. } => ErrorKind::ExhaustedRetries,
            FetchError::Cancelled => ErrorKind::Cancelled,
            FetchError::Config(_) | FetchError::AsserterNotInitialized => {
                ErrorKind::Configuration
            }
            FetchError::InvalidRange { .. } => ErrorKind::Range,
        }
    }
}

impl Transient for FetchError {
    fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<RetryError<FetchError>> for FetchError {
    fn from(err: RetryError<FetchError>) -> Self {
        match err {
            RetryError::Terminal(e) => e,
            RetryError::Exhausted { attempts, last } => FetchError::ExhaustedRetries {
                attempts,
                source: Box::new(last),
            },
            RetryError::Cancelled => FetchError::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let transient = FetchError::Transport(TransportError::Status {
            status: 503,
            body: String::new(),
        });
        assert_eq!(transient.kind(), ErrorKind::Transient);
        assert!(transient.is_transient());

        let terminal = FetchError::Transport(TransportError::Status {
            status: 400,
            body: String::new(),
        });
        assert_eq!(terminal.kind(), ErrorKind::InvalidResponse);
        assert!(!terminal.is_transient());

        assert_eq!(
            FetchError::InvalidRange { low: 10, high: 5 }.kind(),
            ErrorKind::Range
        );
        assert_eq!(FetchError::AsserterNotInitialized.kind(), ErrorKind::Configuration);
        assert!(!FetchError::Cancelled.is_transient());
    }

    #[test]
    fn exhausted_keeps_last_failure_as_source() {
        let err: FetchError = RetryError::Exhausted {
            attempts: 3,
            last: FetchError::Transport(TransportError::Status {
                status: 429,
                body: "slow down".into(),
            }),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::ExhaustedRetries);
        let FetchError::ExhaustedRetries { source, .. } = &err else {
            panic!("unexpected {err:?}");
        };
        assert_eq!(source.kind(), ErrorKind::Transient);
        assert!(err.to_string().contains("3 attempts"));
    }
}
