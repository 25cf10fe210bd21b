//! Error types for custody adapters

use thiserror::Error;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Adapter errors
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Custody API answered with a non-success status
    #[error("Custody API error {status_code}: {message}")]
    CustodyApi {
        /// HTTP status code
        status_code: u16,
        /// Response body
        message: String,
    },

    /// Response parsed but violates the API contract
    #[error("Malformed custody response: {0}")]
    MalformedResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 4xx answers that will not change on retry. 408 and 429 ask the client to
/// come back later.
fn is_refusal(status_code: u16) -> bool {
    (400..500).contains(&status_code) && !matches!(status_code, 408 | 429)
}

impl From<Error> for staking_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::CustodyApi {
                status_code,
                message,
            } if is_refusal(status_code) => staking_core::Error::CustodyApi {
                status_code,
                message,
            },
            Error::MalformedResponse(msg) => staking_core::Error::RemoteSigningIntegrity(msg),
            Error::Config(msg) => staking_core::Error::Config(msg),
            Error::Json(e) => staking_core::Error::RemoteSigningIntegrity(format!(
                "custody response is not valid JSON: {e}"
            )),
            transport @ (Error::Connection(_) | Error::CustodyApi { .. } | Error::Http(_)) => {
                staking_core::Error::Transport(transport.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_errors_are_retryable_transport() {
        let err: staking_core::Error = Error::CustodyApi {
            status_code: 503,
            message: "maintenance".into(),
        }
        .into();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        for status_code in [400, 401, 403, 404, 422] {
            let err: staking_core::Error = Error::CustodyApi {
                status_code,
                message: "refused".into(),
            }
            .into();
            assert!(!err.is_retryable(), "{status_code}");
            assert!(
                matches!(err, staking_core::Error::CustodyApi { status_code: s, .. } if s == status_code)
            );
        }
    }

    #[test]
    fn test_throttling_stays_retryable() {
        for status_code in [408, 429, 500, 502] {
            let err: staking_core::Error = Error::CustodyApi {
                status_code,
                message: "later".into(),
            }
            .into();
            assert!(err.is_retryable(), "{status_code}");
        }
    }

    #[test]
    fn test_malformed_response_is_fatal() {
        let err: staking_core::Error = Error::MalformedResponse("bad key".into()).into();
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }
}
