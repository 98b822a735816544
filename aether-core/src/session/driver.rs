//! Per-connection protocol driver.
//!
//! A [`Session`] consumes client messages strictly in arrival order and
//! writes replies into a bounded channel. The transport owns the receiving
//! end; dropping it is how a disconnect reaches the session, and any await
//! on the outbound side then fails with [`SessionError::Disconnected`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::manager::{SessionHandle, SessionManager};
use super::protocol::{ClientMessage, ImageStatus, ServerMessage, decode_image_payload};
use super::state::{SessionEvent, SessionState, transition};
use super::synthetic::placeholder_cloud;
use super::workspace::SessionWorkspace;
use crate::compute::ComputeGateway;
use crate::error::{SessionError, TransitionError};
use crate::point::Point;

/// Streaming and ingestion limits for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Points per `points` message
    pub chunk_size: usize,
    /// Pause between consecutive chunks
    pub chunk_delay: Duration,
    /// Size of the placeholder cloud for image-less cycles
    pub synthetic_points: usize,
    /// Image count above which a warning is logged
    pub max_recommended_images: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            chunk_delay: Duration::from_millis(10),
            synthetic_points: 1000,
            max_recommended_images: 20,
        }
    }
}

/// State machine for one connection.
pub struct Session {
    handle: Arc<SessionHandle>,
    manager: Arc<SessionManager>,
    gateway: Arc<ComputeGateway>,
    config: SessionConfig,
    workspace: SessionWorkspace,
    outbound: mpsc::Sender<ServerMessage>,
}

impl Session {
    /// Registers a new session with `manager`. Replies go to `outbound`.
    #[must_use]
    pub fn new(
        manager: Arc<SessionManager>,
        gateway: Arc<ComputeGateway>,
        config: SessionConfig,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Self {
        let handle = manager.register();
        info!(session_id = %handle.id(), "Session opened");
        Self {
            handle,
            manager,
            gateway,
            config,
            workspace: SessionWorkspace::new(),
            outbound,
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.handle.id()
    }

    /// Current protocol state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    /// Images stored in the current cycle.
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.workspace.len()
    }

    /// Scratch directory of the current cycle, if one exists.
    #[must_use]
    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace.root()
    }

    /// Parses and handles one text frame.
    ///
    /// Unparseable frames are logged and reported to the client; the session
    /// carries on.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Disconnected`] once the client is gone.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), SessionError> {
        match ClientMessage::parse(text) {
            Ok(message) => self.handle(message).await,
            Err(e) => {
                warn!(session_id = %self.id(), "{e}");
                self.send(ServerMessage::error(&e)).await
            }
        }
    }

    /// Handles one client message.
    ///
    /// Recoverable failures are sent to the client as `error` messages and
    /// swallowed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Disconnected`] once the client is gone. No
    /// other error escapes.
    pub async fn handle(&mut self, message: ClientMessage) -> Result<(), SessionError> {
        let result = match message {
            ClientMessage::Ping => self.on_ping().await,
            ClientMessage::ImageData { data, filename } => self.on_image(&data, filename).await,
            ClientMessage::UploadComplete { count } => self.on_upload_complete(count).await,
        };

        match result {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(session_id = %self.id(), "{e}");
                self.send(ServerMessage::error(&e)).await
            }
            Ok(()) => Ok(()),
        }
    }

    /// Marks the session closed and releases its storage. Idempotent.
    pub fn close(&mut self) {
        if self.apply(SessionEvent::Disconnect).is_ok() {
            info!(
                session_id = %self.id(),
                age_ms = self.handle.age().as_millis(),
                "Session closed"
            );
        }
        self.workspace.release();
    }

    fn apply(&self, event: SessionEvent) -> Result<SessionState, TransitionError> {
        let next = transition(self.state(), event)?;
        self.handle.set_state(next);
        Ok(next)
    }

    async fn send(&self, message: ServerMessage) -> Result<(), SessionError> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| SessionError::Disconnected)
    }

    async fn on_ping(&self) -> Result<(), SessionError> {
        self.apply(SessionEvent::Ping)?;
        self.send(ServerMessage::Pong).await
    }

    async fn on_image(&mut self, data: &str, filename: String) -> Result<(), SessionError> {
        // Reject before touching storage.
        transition(self.state(), SessionEvent::ImageStored)?;

        let bytes = decode_image_payload(data).map_err(|reason| SessionError::DecodeFailed {
            filename: filename.clone(),
            reason,
        })?;
        let path = self.workspace.store(&filename, &bytes).await?;
        self.apply(SessionEvent::ImageStored)?;

        let stored = self.workspace.len();
        info!(
            session_id = %self.id(),
            filename = %filename,
            bytes = bytes.len(),
            images = stored,
            "Image saved"
        );
        debug!(path = %path.display(), "Image path");
        if stored > self.config.max_recommended_images {
            warn!(
                session_id = %self.id(),
                images = stored,
                recommended = self.config.max_recommended_images,
                "More images than recommended, reconstruction may be slow"
            );
        }

        self.send(ServerMessage::ImageReceived {
            status: ImageStatus::Saved,
            filename,
        })
        .await
    }

    async fn on_upload_complete(&mut self, advisory: Option<i64>) -> Result<(), SessionError> {
        self.apply(SessionEvent::UploadComplete)?;
        let images = self.workspace.image_paths();
        info!(
            session_id = %self.id(),
            advisory_count = ?advisory,
            images = images.len(),
            "Upload complete"
        );

        let outcome = self.run_cycle(images).await;
        self.workspace.release();
        if !matches!(outcome, Err(SessionError::Disconnected)) {
            self.apply(SessionEvent::CycleFinished)?;
        }
        outcome
    }

    async fn run_cycle(&self, images: Vec<PathBuf>) -> Result<(), SessionError> {
        if images.is_empty() {
            let points = placeholder_cloud(self.config.synthetic_points);
            self.apply(SessionEvent::ResultReady)?;
            return self.stream(points, true).await;
        }

        let result = tokio::select! {
            result = self.gateway.invoke_offloaded(images) => result,
            () = self.outbound.closed() => {
                info!(
                    session_id = %self.id(),
                    "Client left during reconstruction, result will be discarded"
                );
                return Err(SessionError::Disconnected);
            }
        };

        match result {
            Ok(points) => {
                self.apply(SessionEvent::ResultReady)?;
                self.stream(points, false).await
            }
            Err(e) => {
                warn!(session_id = %self.id(), "Reconstruction cycle failed: {e}");
                self.send(ServerMessage::error(&e)).await
            }
        }
    }

    /// Sends `points` in order, `chunk_size` at a time, then the completion
    /// message.
    async fn stream(&self, points: Vec<Point>, synthetic: bool) -> Result<(), SessionError> {
        let total_points = points.len();
        let chunk_size = self.config.chunk_size.max(1);
        let mut chunks = points.chunks(chunk_size).peekable();
        let mut sent = 0usize;

        while let Some(chunk) = chunks.next() {
            self.send(ServerMessage::Points {
                data: chunk.to_vec(),
            })
            .await?;
            sent += 1;

            if chunks.peek().is_some() && !self.config.chunk_delay.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(self.config.chunk_delay) => {}
                    () = self.outbound.closed() => return Err(SessionError::Disconnected),
                }
            }
        }

        self.send(ServerMessage::ReconstructionComplete {
            total_points,
            synthetic,
        })
        .await?;
        info!(
            session_id = %self.id(),
            total_points,
            chunks = sent,
            synthetic,
            "Point cloud streamed"
        );
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
        self.manager.remove(&self.id());
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("images", &self.workspace.len())
            .finish_non_exhaustive()
    }
}
