//! Error types shared across the codec, the compute gateway, and sessions.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::{SessionEvent, SessionState};

/// Errors produced while encoding or decoding PLY documents.
#[derive(Debug, Error)]
pub enum PlyError {
    /// Zero-vertex documents are refused on export.
    #[error("No points provided for export")]
    EmptyInput,

    /// Writing to the underlying sink failed.
    #[error("PLY I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The header is missing, truncated, or declares an unsupported layout.
    #[error("Invalid PLY header: {0}")]
    InvalidHeader(String),

    /// The body does not match the header.
    #[error("Invalid PLY body: {0}")]
    InvalidBody(String),
}

/// Failure reported by a reconstruction backend.
///
/// Backends are opaque, so the cause is carried as human-readable text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    /// Wraps a cause.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The cause as reported by the backend.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors surfaced by the compute gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Initialization has not completed yet.
    #[error("Reconstruction service is not ready yet, please retry shortly")]
    NotReady,

    /// Fewer images than the backend needs.
    #[error("Insufficient images: {provided} provided, minimum {required} required")]
    InsufficientInput {
        /// Images supplied
        provided: usize,
        /// Minimum accepted
        required: usize,
    },

    /// The backend ran and failed on valid input.
    #[error("Reconstruction failed: {0}")]
    ComputeFailed(String),

    /// One-time initialization failed. Fatal at startup.
    #[error("Reconstruction backend failed to initialize: {0}")]
    InitFailed(String),

    /// The worker running the invocation panicked or was cancelled.
    #[error("Reconstruction worker terminated unexpectedly: {0}")]
    WorkerPanicked(String),
}

/// An event that the state machine does not accept in the current state.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Event {event:?} is not valid while session is {state:?}")]
pub struct TransitionError {
    /// State the session was in
    pub state: SessionState,
    /// Rejected event
    pub event: SessionEvent,
}

/// Errors raised while a session handles client messages.
///
/// Only [`SessionError::Disconnected`] ends a session; every other variant is
/// reported to the client in-band and the connection stays usable.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An uploaded image payload could not be decoded.
    #[error("Failed to decode image '{filename}': {reason}")]
    DecodeFailed {
        /// Name supplied by the client
        filename: String,
        /// Decoder message
        reason: String,
    },

    /// The inbound frame was not a recognised message.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Session-scoped storage could not be written.
    #[error("Failed to store image at {path}: {source}")]
    Storage {
        /// Target path
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// State machine rejected the event.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The outbound side of the connection is gone.
    #[error("Client disconnected")]
    Disconnected,
}

impl SessionError {
    /// Whether the session must stop processing messages.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}
