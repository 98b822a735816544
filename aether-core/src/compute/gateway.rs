//! Readiness-gated access to a [`Reconstructor`].

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::{Accelerator, MIN_IMAGES, Reconstructor};
use crate::error::GatewayError;
use crate::point::Point;

/// Outcome of the one-time initialization.
#[derive(Debug, Clone)]
enum InitState {
    Pending,
    Ready,
    Failed(String),
}

/// Process-wide handle to the reconstruction resource.
///
/// Construct once at startup and share through an `Arc`. Lifecycle:
///
/// ```text
/// new() ──initialize()──▶ ready  (never reverts)
///          └─────────────▶ failed (process aborts startup)
/// ```
///
/// Concurrent `initialize` calls collapse into one execution: the first
/// caller runs the backend setup while holding the init lock and later
/// callers observe its outcome. `is_ready` never takes that lock.
pub struct ComputeGateway {
    backend: Arc<dyn Reconstructor>,
    init: Mutex<InitState>,
    ready: AtomicBool,
    invoke_lock: Mutex<()>,
}

impl ComputeGateway {
    /// Wraps a backend. Nothing runs until [`initialize`](Self::initialize).
    #[must_use]
    pub fn new(backend: Arc<dyn Reconstructor>) -> Self {
        Self {
            backend,
            init: Mutex::new(InitState::Pending),
            ready: AtomicBool::new(false),
            invoke_lock: Mutex::new(()),
        }
    }

    /// Backend name.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Accelerator reported by the backend.
    #[must_use]
    pub fn accelerator(&self) -> Accelerator {
        self.backend.accelerator()
    }

    /// True once initialization has completed successfully. Non-blocking.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Runs the backend's one-time setup, or reports the outcome of a
    /// previous run.
    ///
    /// Blocks for as long as the backend takes; call it from a blocking
    /// context such as [`initialize_offloaded`](Self::initialize_offloaded).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InitFailed`] if the setup failed, now or on the
    /// run that won the race.
    pub fn initialize(&self) -> Result<(), GatewayError> {
        let mut state = self.init.lock();
        match &*state {
            InitState::Ready => return Ok(()),
            InitState::Failed(cause) => return Err(GatewayError::InitFailed(cause.clone())),
            InitState::Pending => {}
        }

        let started = Instant::now();
        info!(backend = self.backend.name(), "Initializing reconstruction backend");
        match self.backend.initialize() {
            Ok(()) => {
                *state = InitState::Ready;
                self.ready.store(true, Ordering::Release);
                info!(
                    backend = self.backend.name(),
                    elapsed_ms = started.elapsed().as_millis(),
                    accelerator = self.backend.accelerator().kind(),
                    "Reconstruction backend ready"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    backend = self.backend.name(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "Reconstruction backend failed to initialize: {e}"
                );
                *state = InitState::Failed(e.to_string());
                Err(GatewayError::InitFailed(e.to_string()))
            }
        }
    }

    /// Runs [`initialize`](Self::initialize) on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InitFailed`] on setup failure, or
    /// [`GatewayError::WorkerPanicked`] if the worker died.
    pub async fn initialize_offloaded(self: &Arc<Self>) -> Result<(), GatewayError> {
        let gateway = Arc::clone(self);
        tokio::task::spawn_blocking(move || gateway.initialize())
            .await
            .map_err(|e| GatewayError::WorkerPanicked(e.to_string()))?
    }

    /// Checks the invocation preconditions without doing any work.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotReady`] before initialization completes and
    /// [`GatewayError::InsufficientInput`] for fewer than [`MIN_IMAGES`] images.
    pub fn check_preconditions(&self, image_count: usize) -> Result<(), GatewayError> {
        if !self.is_ready() {
            return Err(GatewayError::NotReady);
        }
        if image_count < MIN_IMAGES {
            return Err(GatewayError::InsufficientInput {
                provided: image_count,
                required: MIN_IMAGES,
            });
        }
        Ok(())
    }

    /// Reconstructs a point cloud. Blocks for the duration of the computation.
    ///
    /// Never retries and never substitutes a fallback result.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotReady`] or [`GatewayError::InsufficientInput`]
    /// when preconditions fail (the backend is not touched), or
    /// [`GatewayError::ComputeFailed`] with the backend's cause.
    pub fn invoke(&self, images: &[PathBuf]) -> Result<Vec<Point>, GatewayError> {
        self.check_preconditions(images.len())?;

        let _serialized = if self.backend.supports_concurrent_invocation() {
            None
        } else {
            Some(self.invoke_lock.lock())
        };

        let started = Instant::now();
        info!(
            backend = self.backend.name(),
            images = images.len(),
            "Running reconstruction"
        );
        match self.backend.reconstruct(images) {
            Ok(points) => {
                info!(
                    points = points.len(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "Reconstruction finished"
                );
                Ok(points)
            }
            Err(e) => {
                warn!(
                    elapsed_ms = started.elapsed().as_millis(),
                    "Reconstruction failed: {e}"
                );
                Err(GatewayError::ComputeFailed(e.to_string()))
            }
        }
    }

    /// Runs [`invoke`](Self::invoke) on the blocking thread pool so the
    /// calling task's runtime thread stays free.
    ///
    /// Precondition failures are returned without a thread hop. If the
    /// returned future is dropped, the computation still runs to completion
    /// and its result is discarded.
    ///
    /// # Errors
    ///
    /// Same as [`invoke`](Self::invoke), plus [`GatewayError::WorkerPanicked`].
    pub async fn invoke_offloaded(
        self: &Arc<Self>,
        images: Vec<PathBuf>,
    ) -> Result<Vec<Point>, GatewayError> {
        self.check_preconditions(images.len())?;
        let gateway = Arc::clone(self);
        tokio::task::spawn_blocking(move || gateway.invoke(&images))
            .await
            .map_err(|e| GatewayError::WorkerPanicked(e.to_string()))?
    }
}

impl std::fmt::Debug for ComputeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeGateway")
            .field("backend", &self.backend.name())
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingBackend {
        init_calls: AtomicUsize,
        reconstruct_calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_init: bool,
        fail_reconstruct: bool,
        concurrent: bool,
    }

    impl Reconstructor for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn initialize(&self) -> Result<(), BackendError> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            if self.fail_init {
                Err(BackendError::new("weights unavailable"))
            } else {
                Ok(())
            }
        }

        fn reconstruct(&self, images: &[PathBuf]) -> Result<Vec<Point>, BackendError> {
            self.reconstruct_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail_reconstruct {
                return Err(BackendError::new("out of memory"));
            }
            Ok(vec![Point::new(0.0, 0.0, 0.0, 1, 2, 3); images.len()])
        }

        fn supports_concurrent_invocation(&self) -> bool {
            self.concurrent
        }
    }

    fn images(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("{i}.jpg"))).collect()
    }

    #[test]
    fn test_invoke_before_init_is_not_ready() {
        let backend = Arc::new(CountingBackend::default());
        let gateway = ComputeGateway::new(backend.clone());

        assert!(!gateway.is_ready());
        assert_eq!(gateway.invoke(&images(3)), Err(GatewayError::NotReady));
        assert_eq!(backend.reconstruct_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_insufficient_input_does_no_work() {
        let backend = Arc::new(CountingBackend::default());
        let gateway = ComputeGateway::new(backend.clone());
        gateway.initialize().unwrap();

        assert_eq!(
            gateway.invoke(&images(1)),
            Err(GatewayError::InsufficientInput {
                provided: 1,
                required: 2
            })
        );
        assert_eq!(backend.reconstruct_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_compute_failure_is_surfaced() {
        let backend = Arc::new(CountingBackend {
            fail_reconstruct: true,
            ..CountingBackend::default()
        });
        let gateway = ComputeGateway::new(backend);
        gateway.initialize().unwrap();

        match gateway.invoke(&images(2)) {
            Err(GatewayError::ComputeFailed(cause)) => assert_eq!(cause, "out of memory"),
            other => panic!("expected ComputeFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_concurrent_initialize_runs_once() {
        let backend = Arc::new(CountingBackend::default());
        let gateway = Arc::new(ComputeGateway::new(backend.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gateway = Arc::clone(&gateway);
                thread::spawn(move || gateway.initialize())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }

        assert_eq!(backend.init_calls.load(Ordering::SeqCst), 1);
        assert!(gateway.is_ready());
    }

    #[test]
    fn test_failed_initialize_is_sticky() {
        let backend = Arc::new(CountingBackend {
            fail_init: true,
            ..CountingBackend::default()
        });
        let gateway = ComputeGateway::new(backend.clone());

        assert!(matches!(gateway.initialize(), Err(GatewayError::InitFailed(_))));
        assert!(matches!(gateway.initialize(), Err(GatewayError::InitFailed(_))));
        assert_eq!(backend.init_calls.load(Ordering::SeqCst), 1);
        assert!(!gateway.is_ready());
    }

    #[test]
    fn test_non_concurrent_backend_is_serialized() {
        let backend = Arc::new(CountingBackend::default());
        let gateway = Arc::new(ComputeGateway::new(backend.clone()));
        gateway.initialize().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gateway = Arc::clone(&gateway);
                thread::spawn(move || gateway.invoke(&images(2)))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap().len(), 2);
        }

        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_offloaded_invoke_returns_points() {
        let backend = Arc::new(CountingBackend {
            concurrent: true,
            ..CountingBackend::default()
        });
        let gateway = Arc::new(ComputeGateway::new(backend));
        gateway.initialize_offloaded().await.unwrap();

        let points = gateway.invoke_offloaded(images(4)).await.unwrap();
        assert_eq!(points.len(), 4);
    }
}
