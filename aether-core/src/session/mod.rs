//! Per-connection reconstruction sessions.
//!
//! A session ingests base64 images into its own scratch directory, hands the
//! batch to the [`ComputeGateway`](crate::compute::ComputeGateway) on
//! `upload_complete`, and streams the resulting points back in fixed-size
//! chunks. Errors inside a cycle are reported in-band and the session
//! returns to [`SessionState::Idle`]; only a disconnect ends it.

mod driver;
mod manager;
mod protocol;
mod state;
mod synthetic;
mod workspace;

pub use driver::{Session, SessionConfig};
pub use manager::{SessionHandle, SessionManager};
pub use protocol::{
    ClientMessage, DEFAULT_FILENAME, ImageStatus, ServerMessage, decode_image_payload,
};
pub use state::{SessionEvent, SessionState, transition};
pub use synthetic::placeholder_cloud;
pub use workspace::{SessionWorkspace, StoredImage, sanitize_filename};
