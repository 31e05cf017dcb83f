use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    /// The request never completed: connect error, timeout or non-2xx status.
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the auth token as a query parameter.
        let err = err.without_url();
        if err.is_decode() {
            RelayError::MalformedResponse(err.to_string())
        } else {
            RelayError::NetworkFailure(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::MalformedResponse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
