//! Session lifecycle and its transition table.
//!
//! ```text
//! Idle ─image_data─▶ Uploading ─upload_complete─▶ Reconstructing ─▶ Streaming ─▶ Idle
//!
//! any state ─disconnect─▶ Closed
//! ```
//!
//! `upload_complete` is also accepted from `Idle`, and a failed
//! reconstruction goes straight back to `Idle`.

use serde::Serialize;

use crate::error::TransitionError;

/// Protocol state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    /// Waiting for the first image of a cycle
    Idle = 0,
    /// At least one image stored this cycle
    Uploading = 1,
    /// Waiting on the compute gateway
    Reconstructing = 2,
    /// Sending point chunks
    Streaming = 3,
    /// Transport is gone
    Closed = 4,
}

impl From<u8> for SessionState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Uploading,
            2 => Self::Reconstructing,
            3 => Self::Streaming,
            4 => Self::Closed,
            _ => Self::Idle,
        }
    }
}

/// Inputs that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Liveness probe
    Ping,
    /// An image was stored
    ImageStored,
    /// Client finished the batch
    UploadComplete,
    /// Points are available and streaming starts
    ResultReady,
    /// Cycle ended, successfully or not
    CycleFinished,
    /// Transport closed
    Disconnect,
}

/// Applies `event` to `state`.
///
/// # Errors
///
/// Returns [`TransitionError`] for events the state does not accept. Nothing
/// leaves `Closed`.
pub const fn transition(
    state: SessionState,
    event: SessionEvent,
) -> Result<SessionState, TransitionError> {
    use SessionEvent as E;
    use SessionState as S;

    let next = match (state, event) {
        (S::Closed, _) => None,
        (_, E::Disconnect) => Some(S::Closed),
        (s, E::Ping) => Some(s),
        (S::Idle | S::Uploading, E::ImageStored) => Some(S::Uploading),
        (S::Idle | S::Uploading, E::UploadComplete) => Some(S::Reconstructing),
        (S::Reconstructing, E::ResultReady) => Some(S::Streaming),
        (S::Reconstructing | S::Streaming, E::CycleFinished) => Some(S::Idle),
        _ => None,
    };

    match next {
        Some(next) => Ok(next),
        None => Err(TransitionError { state, event }),
    }
}
