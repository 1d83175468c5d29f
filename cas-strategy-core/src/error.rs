use thiserror::Error;

use crate::protocol::FailureReason;

/// Errors produced while building or running the strategy.
///
/// `Configuration` can only occur while the strategy is being built; once a
/// [`crate::CasStrategy`] exists, only the request-scoped variants are
/// reachable and none of them outlives the request that triggered them.
#[derive(Debug, Error)]
pub enum CasError {
    #[error("invalid CAS configuration: {0}")]
    Configuration(String),

    /// The CAS server could not be resolved or connected to. Hosts usually
    /// map this to a "service unavailable"-class status.
    #[error("CAS server unreachable: {0}")]
    Unreachable(#[source] curl::Error),

    #[error("error while requesting ticket validation: {0}")]
    Transport(#[source] curl::Error),

    #[error("the response from the server was bad")]
    BadResponse,

    #[error("authentication failed{}", code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Rejected { code: Option<String> },

    #[error("verify callback failed: {0}")]
    Callback(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<FailureReason> for CasError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::Rejected { code } => CasError::Rejected { code },
            FailureReason::BadResponse => CasError::BadResponse,
        }
    }
}
