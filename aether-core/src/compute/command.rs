//! Backend that delegates reconstruction to an external program.
//!
//! Contract with the program:
//! - `program <init_args...>` prepares the model (download, load, warm up)
//!   and exits 0.
//! - `program <args...> <image paths...>` writes a PLY document (ASCII or
//!   binary little-endian, x/y/z float + red/green/blue uchar) to stdout and
//!   exits 0. Anything else is a failed computation.
//!
//! `AETHER_ACCELERATOR` is set to `cuda` or `cpu` in the program's
//! environment.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Command, Output};

use tracing::debug;

use super::{Accelerator, Reconstructor};
use crate::error::BackendError;
use crate::ply;
use crate::point::Point;

/// Lines of stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 5;

/// Runs an external reconstruction program per invocation.
#[derive(Debug, Clone)]
pub struct CommandReconstructor {
    program: PathBuf,
    args: Vec<String>,
    init_args: Vec<String>,
    concurrent: bool,
    accelerator: Accelerator,
}

impl CommandReconstructor {
    /// Creates a backend for `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            init_args: Vec::new(),
            concurrent: false,
            accelerator: Accelerator::Cpu,
        }
    }

    /// Arguments placed before the image paths on every invocation.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Arguments for the one-time initialization run.
    #[must_use]
    pub fn with_init_args(mut self, init_args: Vec<String>) -> Self {
        self.init_args = init_args;
        self
    }

    /// Allow several invocations to run at once.
    #[must_use]
    pub const fn with_concurrency(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Accelerator advertised to the program and the health probe.
    #[must_use]
    pub const fn with_accelerator(mut self, accelerator: Accelerator) -> Self {
        self.accelerator = accelerator;
        self
    }

    fn run(&self, args: impl IntoIterator<Item = OsString>) -> Result<Output, BackendError> {
        Command::new(&self.program)
            .args(args)
            .env("AETHER_ACCELERATOR", self.accelerator.kind())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => BackendError::new(format!(
                    "reconstruction program '{}' not found",
                    self.program.display()
                )),
                _ => BackendError::new(format!(
                    "failed to run '{}': {e}",
                    self.program.display()
                )),
            })
    }
}

impl Reconstructor for CommandReconstructor {
    fn name(&self) -> &'static str {
        "command"
    }

    fn initialize(&self) -> Result<(), BackendError> {
        let output = self.run(self.init_args.iter().map(OsString::from))?;
        if !output.status.success() {
            return Err(BackendError::new(format!(
                "initialization exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }
        Ok(())
    }

    fn reconstruct(&self, images: &[PathBuf]) -> Result<Vec<Point>, BackendError> {
        let args = self
            .args
            .iter()
            .map(OsString::from)
            .chain(images.iter().map(|p| p.as_os_str().to_owned()));
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(BackendError::new(format!(
                "reconstruction exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        debug!(stdout_bytes = output.stdout.len(), "Parsing reconstruction output");
        ply::decode(&output.stdout)
            .map_err(|e| BackendError::new(format!("unreadable reconstruction output: {e}")))
    }

    fn supports_concurrent_invocation(&self) -> bool {
        self.concurrent
    }

    fn accelerator(&self) -> Accelerator {
        self.accelerator
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return "no error output".to_string();
    }
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join(" | ")
}
