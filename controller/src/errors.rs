//! Error types for the field network controller

use std::error::Error as StdError;
use std::fmt;
use std::io;

use thiserror::Error;

/// Coarse classification of a failed network operation.
///
/// Reboot and launch paths consult this to decide whether a dropped
/// connection means "the remote side went down as requested".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Reset, aborted, broken pipe or an unexpected EOF mid-exchange
    ConnectionDropped,
    /// Deadline exceeded before the remote side answered
    Timeout,
    /// Nothing accepted the connection
    Refused,
    Other,
}

impl TransportKind {
    /// True for the failure shapes a rebooting or re-addressed host produces.
    pub fn is_drop_or_timeout(self) -> bool {
        matches!(self, TransportKind::ConnectionDropped | TransportKind::Timeout)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportKind::ConnectionDropped => "connection dropped",
            TransportKind::Timeout => "timeout",
            TransportKind::Refused => "connection refused",
            TransportKind::Other => "network failure",
        };
        f.write_str(s)
    }
}

/// Main error type for the controller
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Transport error ({kind}): {message}")]
    Transport { kind: TransportKind, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Feature disabled: {0}")]
    FeatureDisabled(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Shutdown error: {0}")]
    Shutdown(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FleetError {
    pub fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
        FleetError::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Transport classification, if this is a transport error.
    pub fn transport_kind(&self) -> Option<TransportKind> {
        match self {
            FleetError::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Classify an HTTP client failure.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportKind::Timeout
        } else if let Some(kind) = io_kind_in_chain(&err) {
            kind
        } else if err.is_connect() {
            TransportKind::Refused
        } else {
            kind_from_message(&chain_to_string(&err))
        };
        FleetError::transport(kind, chain_to_string(&err))
    }

    /// Classify a raw socket failure.
    pub fn from_io(err: io::Error) -> Self {
        let kind = classify_io_kind(err.kind()).unwrap_or_else(|| kind_from_message(&err.to_string()));
        FleetError::transport(kind, err.to_string())
    }
}

fn classify_io_kind(kind: io::ErrorKind) -> Option<TransportKind> {
    match kind {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::NotConnected => Some(TransportKind::ConnectionDropped),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Some(TransportKind::Timeout),
        io::ErrorKind::ConnectionRefused => Some(TransportKind::Refused),
        _ => None,
    }
}

fn io_kind_in_chain(err: &(dyn StdError + 'static)) -> Option<TransportKind> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if let Some(kind) = classify_io_kind(io_err.kind()) {
                return Some(kind);
            }
        }
        current = e.source();
    }
    None
}

fn chain_to_string(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        let msg = e.to_string();
        if !out.contains(&msg) {
            out.push_str(": ");
            out.push_str(&msg);
        }
        current = e.source();
    }
    out
}

/// Last-resort classification from error text; firmware stacks and hyper
/// do not always surface a typed io::Error.
pub(crate) fn kind_from_message(message: &str) -> TransportKind {
    let msg = message.to_lowercase();
    if msg.contains("connection reset")
        || msg.contains("connection aborted")
        || msg.contains("broken pipe")
        || msg.contains("connection closed")
        || msg.contains("closed network connection")
        || msg.contains("unexpected eof")
        || msg.contains("end of file")
    {
        TransportKind::ConnectionDropped
    } else if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline") {
        TransportKind::Timeout
    } else if msg.contains("connection refused") {
        TransportKind::Refused
    } else {
        TransportKind::Other
    }
}
