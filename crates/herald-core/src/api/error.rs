use thiserror::Error;

/// Failure talking to the remote API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ApiError {
    /// Worth retrying later: network trouble, timeouts, overloaded server
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let overloaded = ApiError::Status {
            status: 503,
            body: String::new(),
        };
        let forbidden = ApiError::Status {
            status: 403,
            body: String::new(),
        };
        assert!(overloaded.is_transient());
        assert!(!forbidden.is_transient());
        assert!(!ApiError::Rejected("INVALID_SECRET".into()).is_transient());
    }
}
