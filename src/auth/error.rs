use crate::transport::TransportError;

/// Why no token could be produced.
///
/// `Rejected` means the provider refused the credentials, `MalformedResponse`
/// means it answered 2xx with something unusable. Callers can tell the two
/// apart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("token endpoint unreachable: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to generate access token: status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("access token not found in response: {0}")]
    MalformedResponse(String),

    #[error("token acquisition ended without a result")]
    FlightAborted,
}

impl AuthError {
    /// Downstream HTTP status, when the provider answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Transport(TransportError::Timeout { .. }) => "timeout",
            AuthError::Transport(_) => "transport",
            AuthError::Rejected { .. } => "rejected",
            AuthError::MalformedResponse(_) => "malformed",
            AuthError::FlightAborted => "aborted",
        }
    }
}
