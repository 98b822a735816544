//! End-to-end session cycles against scripted reconstruction backends.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aether_core::{
    BackendError, ClientMessage, ComputeGateway, Point, Reconstructor, ServerMessage, Session,
    SessionConfig, SessionError, SessionManager, SessionState,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::mpsc;

/// Returns a fixed number of points, or fails, after an optional delay.
struct ScriptedBackend {
    points: usize,
    fail_with: Option<&'static str>,
    delay: Duration,
    calls: AtomicUsize,
    seen_images: parking_lot::Mutex<Vec<PathBuf>>,
}

impl ScriptedBackend {
    fn returning(points: usize) -> Self {
        Self {
            points,
            fail_with: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            seen_images: parking_lot::Mutex::new(Vec::new()),
        }
    }

    fn failing(cause: &'static str) -> Self {
        Self {
            fail_with: Some(cause),
            ..Self::returning(0)
        }
    }

    fn slow(points: usize, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::returning(points)
        }
    }
}

impl Reconstructor for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn initialize(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn reconstruct(&self, images: &[PathBuf]) -> Result<Vec<Point>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_images.lock() = images.to_vec();
        std::thread::sleep(self.delay);
        if let Some(cause) = self.fail_with {
            return Err(BackendError::new(cause));
        }
        #[allow(clippy::cast_precision_loss)]
        Ok((0..self.points)
            .map(|i| Point::new(i as f64, 0.0, 0.0, 1, 2, 3))
            .collect())
    }
}

struct Harness {
    session: Session,
    rx: mpsc::Receiver<ServerMessage>,
    backend: Arc<ScriptedBackend>,
    gateway: Arc<ComputeGateway>,
    manager: Arc<SessionManager>,
}

fn config() -> SessionConfig {
    SessionConfig {
        chunk_size: 100,
        chunk_delay: Duration::from_millis(1),
        synthetic_points: 1000,
        max_recommended_images: 20,
    }
}

fn harness_with(backend: ScriptedBackend, config: SessionConfig, ready: bool) -> Harness {
    let backend = Arc::new(backend);
    let gateway = Arc::new(ComputeGateway::new(Arc::clone(&backend) as Arc<dyn Reconstructor>));
    if ready {
        gateway.initialize().unwrap();
    }
    let manager = Arc::new(SessionManager::new());
    let (tx, rx) = mpsc::channel(64);
    let session = Session::new(Arc::clone(&manager), Arc::clone(&gateway), config, tx);
    Harness {
        session,
        rx,
        backend,
        gateway,
        manager,
    }
}

fn harness(backend: ScriptedBackend) -> Harness {
    harness_with(backend, config(), true)
}

fn image(name: &str, bytes: &[u8]) -> ClientMessage {
    ClientMessage::ImageData {
        data: format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes)),
        filename: name.to_string(),
    }
}

fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

fn chunk_sizes(messages: &[ServerMessage]) -> Vec<usize> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Points { data } => Some(data.len()),
            _ => None,
        })
        .collect()
}

async fn upload(h: &mut Harness, count: usize) {
    for i in 0..count {
        h.session
            .handle(image(&format!("view{i}.jpg"), &[i as u8; 16]))
            .await
            .unwrap();
    }
    let acks = drain(&mut h.rx);
    assert_eq!(acks.len(), count);
    assert!(
        acks.iter()
            .all(|m| matches!(m, ServerMessage::ImageReceived { .. }))
    );
}

#[tokio::test]
async fn test_result_is_streamed_in_chunks_then_completed() {
    let mut h = harness(ScriptedBackend::returning(250));
    upload(&mut h, 2).await;
    assert_eq!(h.session.state(), SessionState::Uploading);

    h.session
        .handle(ClientMessage::UploadComplete { count: Some(2) })
        .await
        .unwrap();

    let messages = drain(&mut h.rx);
    assert_eq!(messages.len(), 4);
    assert_eq!(chunk_sizes(&messages), vec![100, 100, 50]);
    assert_eq!(
        messages[3],
        ServerMessage::ReconstructionComplete {
            total_points: 250,
            synthetic: false
        }
    );

    // Chunks concatenate to the original order.
    let xs: Vec<f64> = messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Points { data } => Some(data.iter().map(|p| p.x)),
            _ => None,
        })
        .flatten()
        .collect();
    #[allow(clippy::cast_precision_loss)]
    let expected: Vec<f64> = (0..250).map(|i| i as f64).collect();
    assert_eq!(xs, expected);

    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_images_reach_backend_in_upload_order() {
    let mut h = harness(ScriptedBackend::returning(1));
    for name in ["b.jpg", "a.jpg", "b.jpg"] {
        h.session.handle(image(name, b"bytes")).await.unwrap();
    }
    h.session
        .handle(ClientMessage::UploadComplete { count: None })
        .await
        .unwrap();

    let seen = h.backend.seen_images.lock().clone();
    let names: Vec<String> = seen
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["0_b.jpg", "1_a.jpg", "2_b.jpg"]);
}

#[tokio::test]
async fn test_compute_failure_is_reported_once_without_points() {
    let mut h = harness(ScriptedBackend::failing("CUDA out of memory"));
    upload(&mut h, 3).await;
    assert_eq!(h.session.image_count(), 3);
    let root = h.session.workspace_root().unwrap().to_path_buf();

    h.session
        .handle(ClientMessage::UploadComplete { count: Some(3) })
        .await
        .unwrap();

    let messages = drain(&mut h.rx);
    assert_eq!(messages.len(), 1);
    let ServerMessage::Error { message } = &messages[0] else {
        panic!("expected error, got {messages:?}");
    };
    assert!(message.contains("CUDA out of memory"), "{message}");
    assert!(chunk_sizes(&messages).is_empty());
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.session.image_count(), 0);
    assert!(!root.exists());
}

#[tokio::test]
async fn test_single_image_is_insufficient() {
    let mut h = harness(ScriptedBackend::returning(10));
    upload(&mut h, 1).await;

    h.session
        .handle(ClientMessage::UploadComplete { count: Some(1) })
        .await
        .unwrap();

    let messages = drain(&mut h.rx);
    assert_eq!(messages.len(), 1);
    assert!(
        matches!(&messages[0], ServerMessage::Error { message } if message.contains("Insufficient images"))
    );
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_not_ready_gateway_does_no_work() {
    let mut h = harness_with(ScriptedBackend::returning(10), config(), false);
    upload(&mut h, 2).await;

    h.session
        .handle(ClientMessage::UploadComplete { count: Some(2) })
        .await
        .unwrap();

    let messages = drain(&mut h.rx);
    assert_eq!(messages.len(), 1);
    assert!(
        matches!(&messages[0], ServerMessage::Error { message } if message.contains("not ready"))
    );
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_empty_upload_streams_tagged_placeholder() {
    let mut h = harness(ScriptedBackend::failing("must not be called"));

    h.session
        .handle(ClientMessage::UploadComplete { count: Some(0) })
        .await
        .unwrap();

    let messages = drain(&mut h.rx);
    assert_eq!(chunk_sizes(&messages), vec![100; 10]);
    assert_eq!(
        messages.last(),
        Some(&ServerMessage::ReconstructionComplete {
            total_points: 1000,
            synthetic: true
        })
    );
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_decode_failure_is_isolated() {
    let mut h = harness(ScriptedBackend::returning(5));

    h.session
        .handle(ClientMessage::ImageData {
            data: "data:image/jpeg;base64,@@not-base64@@".to_string(),
            filename: "broken.jpg".to_string(),
        })
        .await
        .unwrap();

    let messages = drain(&mut h.rx);
    assert!(
        matches!(&messages[..], [ServerMessage::Error { message }] if message.contains("broken.jpg"))
    );
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.session.image_count(), 0);

    upload(&mut h, 2).await;
    assert_eq!(h.session.image_count(), 2);
}

#[tokio::test]
async fn test_malformed_frames_keep_session_alive() {
    let mut h = harness(ScriptedBackend::returning(5));

    h.session.handle_text("{not json").await.unwrap();
    h.session.handle_text(r#"{"type":"teleport"}"#).await.unwrap();
    h.session.handle_text(r#"{"type":"ping"}"#).await.unwrap();

    let messages = drain(&mut h.rx);
    assert_eq!(messages.len(), 3);
    assert!(matches!(messages[0], ServerMessage::Error { .. }));
    assert!(matches!(messages[1], ServerMessage::Error { .. }));
    assert_eq!(messages[2], ServerMessage::Pong);
}

#[tokio::test]
async fn test_workspace_is_released_after_every_cycle() {
    let mut h = harness(ScriptedBackend::returning(3));

    upload(&mut h, 2).await;
    let first_root = h.session.workspace_root().unwrap().to_path_buf();
    assert!(first_root.is_dir());
    h.session
        .handle(ClientMessage::UploadComplete { count: Some(2) })
        .await
        .unwrap();
    assert!(h.session.workspace_root().is_none());
    assert!(!first_root.exists());
    assert_eq!(h.session.image_count(), 0);
    drain(&mut h.rx);

    // The same connection accepts a fresh batch.
    upload(&mut h, 2).await;
    h.session
        .handle(ClientMessage::UploadComplete { count: Some(2) })
        .await
        .unwrap();
    assert_eq!(
        drain(&mut h.rx).last(),
        Some(&ServerMessage::ReconstructionComplete {
            total_points: 3,
            synthetic: false
        })
    );
}

#[tokio::test]
async fn test_disconnect_during_reconstruction_discards_result() {
    let mut h = harness(ScriptedBackend::slow(500, Duration::from_secs(1)));
    upload(&mut h, 2).await;
    let root = h.session.workspace_root().unwrap().to_path_buf();

    let Harness {
        mut session,
        rx,
        manager,
        ..
    } = h;
    let id = session.id();
    let task = tokio::spawn(async move {
        let result = session
            .handle(ClientMessage::UploadComplete { count: Some(2) })
            .await;
        (result, session)
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(rx);

    let (result, mut session) = tokio::time::timeout(Duration::from_millis(500), task)
        .await
        .expect("session did not notice the disconnect")
        .unwrap();
    assert!(matches!(result, Err(SessionError::Disconnected)));
    assert!(!root.exists());

    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    drop(session);
    assert!(manager.get(&id).is_none());
}

#[tokio::test]
async fn test_disconnect_halts_paced_streaming() {
    let slow_pacing = SessionConfig {
        chunk_delay: Duration::from_millis(200),
        ..config()
    };
    let mut h = harness_with(ScriptedBackend::returning(1000), slow_pacing, true);
    upload(&mut h, 2).await;

    let Harness {
        mut session,
        mut rx,
        ..
    } = h;
    let task = tokio::spawn(async move {
        session
            .handle(ClientMessage::UploadComplete { count: Some(2) })
            .await
    });

    let first = rx.recv().await.unwrap();
    assert!(matches!(first, ServerMessage::Points { .. }));
    drop(rx);

    let result = tokio::time::timeout(Duration::from_millis(500), task)
        .await
        .expect("streaming continued after disconnect")
        .unwrap();
    assert!(matches!(result, Err(SessionError::Disconnected)));
}

#[tokio::test]
async fn test_reconstruction_does_not_stall_other_sessions() {
    let mut h = harness(ScriptedBackend::slow(150, Duration::from_secs(2)));
    upload(&mut h, 2).await;

    let (tx_b, mut rx_b) = mpsc::channel(16);
    let mut other = Session::new(
        Arc::clone(&h.manager),
        Arc::clone(&h.gateway),
        config(),
        tx_b,
    );

    let Harness {
        mut session,
        mut rx,
        ..
    } = h;
    let busy = tokio::spawn(async move {
        session
            .handle(ClientMessage::UploadComplete { count: Some(2) })
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_millis(200), async {
        other.handle(ClientMessage::Ping).await.unwrap();
        assert_eq!(rx_b.recv().await.unwrap(), ServerMessage::Pong);

        other.handle(image("side.jpg", b"bytes")).await.unwrap();
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerMessage::ImageReceived { .. }
        ));
    })
    .await
    .expect("second session stalled behind a running reconstruction");
    assert_eq!(other.state(), SessionState::Uploading);

    busy.await.unwrap().unwrap();
    let messages = drain(&mut rx);
    assert_eq!(chunk_sizes(&messages), vec![100, 50]);
}
