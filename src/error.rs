use thiserror::Error;

use crate::workflow::Stage;

/// Failure of a single completion call, classified for the retry policy.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    /// Timeouts, connection resets, rate limits and 5xx responses.
    #[error("transient completion failure: {0}")]
    Transient(String),

    /// Auth failures, malformed requests and undecodable provider payloads.
    #[error("completion failed: {0}")]
    Fatal(String),

    #[error("completion gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl CompletionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CompletionError::Transient(_))
    }
}

/// Hard failures while turning model output into structured records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("response is missing the {0} section")]
    MissingSection(&'static str),

    #[error("response has the wrong shape: {0}")]
    MalformedShape(String),
}

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("discovery returned no usable startups")]
    NoCandidatesFound,

    #[error("cannot do that in the {stage} stage: {reason}")]
    PreconditionNotMet { stage: Stage, reason: String },

    #[error("{0}")]
    InvalidSelection(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl ScoutError {
    pub fn precondition(stage: Stage, reason: impl Into<String>) -> Self {
        ScoutError::PreconditionNotMet {
            stage,
            reason: reason.into(),
        }
    }

    /// Whether re-issuing the same action may succeed (model output or network flakiness).
    pub fn is_retryable(&self) -> bool {
        match self {
            ScoutError::Completion(e) => !matches!(e, CompletionError::Fatal(_)),
            ScoutError::Parse(_) | ScoutError::NoCandidatesFound => true,
            _ => false,
        }
    }
}

impl From<anyhow::Error> for ScoutError {
    fn from(err: anyhow::Error) -> Self {
        ScoutError::Persistence(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ScoutError::NoCandidatesFound.is_retryable());
        assert!(ScoutError::from(ParseError::MalformedShape("x".into())).is_retryable());
        assert!(ScoutError::from(CompletionError::Exhausted {
            attempts: 3,
            last: "timeout".into()
        })
        .is_retryable());
        assert!(!ScoutError::from(CompletionError::Fatal("401".into())).is_retryable());
        assert!(!ScoutError::precondition(Stage::SectorSelection, "no sector").is_retryable());
    }
}
