//! Cycle outcome classification and change-gated logging.

use serde::{Serialize, Serializer};
use std::fmt;
use tracing::{info, warn};

use crate::error::GrabError;
use crate::types::ParsedSnapshot;

/// What happened in a cycle, collapsed to one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    BadJson,
    OnlyMessage,
    ResponseError,
    RequestError,
    HttpError(u16),
    Timeout,
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

impl From<&GrabError> for Status {
    fn from(err: &GrabError) -> Self {
        match err {
            GrabError::Request(_) => Status::RequestError,
            GrabError::Timeout(_) => Status::Timeout,
            GrabError::Response(_) => Status::ResponseError,
            GrabError::HttpStatus(code) => Status::HttpError(*code),
            GrabError::Parse(_) => Status::BadJson,
            GrabError::Sentinel(_) => Status::OnlyMessage,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::BadJson => write!(f, "bad json"),
            Status::OnlyMessage => write!(f, "only message"),
            Status::ResponseError => write!(f, "response error"),
            Status::RequestError => write!(f, "request error"),
            Status::HttpError(code) => write!(f, "{code}"),
            Status::Timeout => write!(f, "timeout"),
        }
    }
}

/// HTTP failures serialize as the bare status code, everything else as its
/// label.
impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Status::HttpError(code) => serializer.serialize_u16(*code),
            other => serializer.collect_str(other),
        }
    }
}

/// Result of feeding one outcome to a [`StatusTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: Status,
    /// False when the status equals the previous cycle's.
    pub changed: bool,
}

/// Remembers the previous cycle's status so repeated outcomes log once.
///
/// Owned by the polling task; it is never shared.
#[derive(Debug, Default)]
pub struct StatusTracker {
    last: Option<Status>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Status> {
        self.last
    }

    /// Classifies `outcome`, logs it if the status changed and stores it.
    pub fn observe(&mut self, outcome: Result<&ParsedSnapshot, &GrabError>) -> Transition {
        let status = match outcome {
            Ok(_) => Status::Success,
            Err(e) => Status::from(e),
        };
        let changed = self.last != Some(status);

        if changed {
            log_transition(status, outcome);
        }

        self.last = Some(status);
        Transition { status, changed }
    }
}

fn log_transition(status: Status, outcome: Result<&ParsedSnapshot, &GrabError>) {
    let err = match outcome {
        Ok(parsed) => {
            info!(rows = parsed.rows.len(), "Endpoint is fine, we have just got some data");
            return;
        }
        Err(err) => err,
    };

    match (status, err) {
        (Status::OnlyMessage, GrabError::Sentinel(message)) => {
            warn!(%message, "Endpoint answered with a message only");
        }
        (Status::BadJson, _) => {
            warn!(error = %err, "Could not parse the response body, no data this cycle");
        }
        (Status::Timeout, _) => warn!(error = %err, "Our request has timed out"),
        (Status::RequestError, _) => warn!(error = %err, "Our request has had an error"),
        (Status::ResponseError, _) => warn!(error = %err, "The response has had an error"),
        (Status::HttpError(503), _) => warn!(code = 503, "Server was unavailable"),
        (Status::HttpError(404), _) => {
            warn!(code = 404, "Server could not find anything matching the url")
        }
        (Status::HttpError(302), _) => {
            warn!(code = 302, "Server wants us to redirect our request to a new url")
        }
        (Status::HttpError(code), _) => warn!(code, "Server responded with an error status"),
        (status, _) => warn!(%status, error = %err, "Cycle failed"),
    }
}
