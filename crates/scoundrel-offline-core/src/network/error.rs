use thiserror::Error;

/// A fetch that produced no response at all.
///
/// HTTP error statuses are not network errors: a 404 is a response.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl NetworkError {
    /// Classify a reqwest failure for `url`.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout(url.to_string())
        } else if err.is_connect() {
            NetworkError::Unreachable(format!("{}: {}", url, err))
        } else {
            NetworkError::Transport(err)
        }
    }
}
