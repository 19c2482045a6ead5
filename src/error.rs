use crate::Response;

/// Failure value produced by a [`Transport`](crate::Transport) when no status
/// code is available (connection refused, timeout, malformed request, ...).
pub type TransportFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The host request primitive took its failure path.
    #[error("transport error: {0}")]
    Transport(TransportFailure),
    /// Status outside the accepted range, or a response the retry predicate
    /// flagged as failed.
    #[error("http error {status}")]
    Http {
        status: u16,
        /// The final attempt's response.
        response: Box<Response>,
    },
    /// Programmer error at the chain API boundary.
    #[error("usage error: {0}")]
    Usage(String),
    /// JSON decoding or encoding of a settled value failed.
    #[error("decode error: {0}")]
    Decode(String),
    /// Failure returned by a caller-supplied chain handler.
    #[error("handler error: {0}")]
    Handler(String),
}

impl NetworkError {
    pub(crate) fn http(response: Response) -> Self {
        Self::Http {
            status: response.status,
            response: Box::new(response),
        }
    }

    /// Builds a [`NetworkError::Handler`] from any displayable value.
    pub fn handler(message: impl std::fmt::Display) -> Self {
        Self::Handler(message.to_string())
    }

    /// Returns the response carried by an application failure.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Http { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Returns the HTTP status carried by an application failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
