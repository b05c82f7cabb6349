use std::borrow::Cow;

use junction_wallet_domain::psbt::MalformedPsbtError;
use reqwest::StatusCode;

use crate::request::RequestError;

pub type Result<T, E = BackendClientError> = core::result::Result<T, E>;

/// Represents errors that can occur while talking to the wallet backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendClientError {
    /// The request did not complete: the backend is unreachable, the connection
    /// dropped or the body could not be read.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The backend did not answer within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The backend answered with a non-success status.
    ///
    /// The message is the backend's `error` field when the body carries one, and
    /// `"<status>: <reason>"` otherwise. It is displayed verbatim.
    #[error("{message}")]
    Backend {
        /// The HTTP status.
        status: StatusCode,
        /// The message to surface.
        message: String,
    },

    /// The backend answered with a success status but a body of unexpected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(Cow<'static, str>),

    /// A PSBT in the response is missing required fields.
    #[error("malformed psbt: {0}")]
    MalformedPsbt(#[from] MalformedPsbtError),

    /// The request was rejected before being sent.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// Any other client failure, e.g. building the HTTP client.
    #[error("other error: {0}")]
    Other(Cow<'static, str>),
}

impl BackendClientError {
    /// Creates a `MalformedResponse` error from any type that can be converted to a string.
    pub fn malformed_response<E>(err: E) -> Self
    where
        Cow<'static, str>: From<E>,
    {
        Self::MalformedResponse(err.into())
    }

    /// Creates an `Other` error from any type that can be converted to a string.
    pub fn other<E>(err: E) -> Self
    where
        Cow<'static, str>: From<E>,
    {
        Self::Other(err.into())
    }

    /// Maps a transport error, singling out timeouts.
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        if err.is_timeout() { Self::Timeout } else { Self::Network(err) }
    }

    /// Builds the error for a non-success response from its status and raw body.
    pub(crate) fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .as_ref()
            .and_then(|body| body.get("error"))
            .and_then(serde_json::Value::as_str)
            .filter(|message| !message.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| {
                format!("{}: {}", status.as_u16(), status.canonical_reason().unwrap_or_default())
            });

        Self::Backend { status, message }
    }
}

impl From<serde_json::Error> for BackendClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_error_body_is_surfaced_verbatim() {
        let err = BackendClientError::from_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            br#"{"error": "Wallet \"vault\" already exists"}"#,
        );

        assert_eq!(err.to_string(), "Wallet \"vault\" already exists");
    }

    #[test]
    fn unstructured_error_body_falls_back_to_status_line() {
        let html = BackendClientError::from_status(StatusCode::BAD_GATEWAY, b"<html></html>");
        let empty = BackendClientError::from_status(StatusCode::NOT_FOUND, br#"{"error": ""}"#);
        let foreign = BackendClientError::from_status(StatusCode::BAD_REQUEST, br#"{"errors": []}"#);

        assert_eq!(html.to_string(), "502: Bad Gateway");
        assert_eq!(empty.to_string(), "404: Not Found");
        assert_eq!(foreign.to_string(), "400: Bad Request");
    }
}
