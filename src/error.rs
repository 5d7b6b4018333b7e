//! Failure taxonomy for a single polling cycle.

use std::time::Duration;

use thiserror::Error;

/// Everything that can stop a cycle from producing a snapshot.
///
/// None of these are fatal: the poller classifies the error, logs it when the
/// classification changed, and schedules the next cycle as usual.
#[derive(Debug, Error)]
pub enum GrabError {
    /// Connection-level failure before a response arrived.
    #[error("request failed: {0}")]
    Request(String),

    /// The request was aborted because it outlived the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The response started but the body could not be read or decompressed.
    #[error("response failed: {0}")]
    Response(String),

    /// The server answered with something other than 200.
    #[error("server responded with status {0}")]
    HttpStatus(u16),

    /// The body is not the tabular document we expect.
    #[error("invalid json: {0}")]
    Parse(String),

    /// Well-formed payload that only carries a service message.
    #[error("service message only: {0}")]
    Sentinel(String),
}

impl From<serde_json::Error> for GrabError {
    fn from(err: serde_json::Error) -> Self {
        GrabError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for GrabError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_body() || err.is_decode() || is_connection_reset(&err) {
            GrabError::Response(err.to_string())
        } else {
            GrabError::Request(err.to_string())
        }
    }
}

/// Walks the source chain looking for a peer reset.
fn is_connection_reset(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionReset {
                return true;
            }
        }
        source = e.source();
    }
    false
}
