//! Aether core: point cloud codec, compute gateway, and the per-connection
//! reconstruction session state machine.
//!
//! The crate is transport-agnostic. A session consumes parsed client messages
//! and emits [`session::ServerMessage`]s into a bounded channel; the server
//! crate is responsible for moving those over a WebSocket.

#![warn(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::todo
)]
#![deny(clippy::unwrap_in_result, clippy::panic_in_result_fn)]

pub mod compute;
pub mod error;
pub mod ply;
pub mod point;
pub mod session;

pub use compute::{
    Accelerator, AcceleratorPreference, CommandReconstructor, ComputeGateway, DemoReconstructor,
    MIN_IMAGES, Reconstructor,
};
pub use error::{BackendError, GatewayError, PlyError, SessionError, TransitionError};
pub use ply::PlyFormat;
pub use point::{Point, RawPoint};
pub use session::{
    ClientMessage, ServerMessage, Session, SessionConfig, SessionHandle, SessionManager,
    SessionState,
};
