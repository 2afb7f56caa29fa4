//! Patch application
//!
//! A diff is written to a uniquely named temporary file and handed to the
//! external `patch` tool. Each strip level is dry-run first; the first level
//! whose dry run succeeds is applied for real and no further levels are tried.
//! The whole sequence for a service directory runs under its [`ServiceLocks`]
//! entry, and the temporary file is removed on every exit path.

use crate::locks::ServiceLocks;
use async_trait::async_trait;
use mender_core::{MenderError, PatchResult, Result};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Strip levels tried, in order
pub const STRIP_LEVELS: [u8; 2] = [1, 2];

/// Output from one `patch` invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl PatchOutput {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            ..Self::default()
        }
    }
}

impl From<Output> for PatchOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        }
    }
}

/// Trait for running the patch tool (allows mocking in tests)
#[async_trait]
pub trait PatchTool: Send + Sync {
    /// Run `patch -p<strip> [--dry-run] -i <patch_file>` inside `work_dir`
    async fn run(
        &self,
        work_dir: &Path,
        patch_file: &Path,
        strip: u8,
        dry_run: bool,
    ) -> Result<PatchOutput>;
}

#[async_trait]
impl<T: PatchTool + ?Sized> PatchTool for Arc<T> {
    async fn run(
        &self,
        work_dir: &Path,
        patch_file: &Path,
        strip: u8,
        dry_run: bool,
    ) -> Result<PatchOutput> {
        (**self).run(work_dir, patch_file, strip, dry_run).await
    }
}

/// Real `patch` executor
#[derive(Debug, Clone)]
pub struct PatchCommand {
    binary: String,
}

impl PatchCommand {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(patch_file: &Path, strip: u8, dry_run: bool) -> Vec<String> {
        let mut args = vec![format!("-p{}", strip), "--batch".to_string()];
        if dry_run {
            args.push("--dry-run".to_string());
        }
        args.push("-i".to_string());
        args.push(patch_file.to_string_lossy().into_owned());
        args
    }
}

impl Default for PatchCommand {
    fn default() -> Self {
        Self::new("patch")
    }
}

#[async_trait]
impl PatchTool for PatchCommand {
    #[instrument(skip(self, patch_file), fields(binary = %self.binary))]
    async fn run(
        &self,
        work_dir: &Path,
        patch_file: &Path,
        strip: u8,
        dry_run: bool,
    ) -> Result<PatchOutput> {
        let args = Self::args(patch_file, strip, dry_run);
        debug!("Executing {} {:?} in {}", self.binary, args, work_dir.display());

        let output = Command::new(&self.binary)
            .args(&args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MenderError::Patch(format!("Failed to execute {}: {}", self.binary, e)))?;

        Ok(PatchOutput::from(output))
    }
}

/// One recorded [`MockPatchTool`] invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchCall {
    pub work_dir: PathBuf,
    pub patch_file: PathBuf,
    pub strip: u8,
    pub dry_run: bool,
    /// Patch file content at call time, `None` if it was missing
    pub patch_content: Option<String>,
}

/// Scripted patch tool for testing
///
/// Responses are keyed by `(strip, dry_run)`; unscripted calls fail.
#[derive(Clone, Default)]
pub struct MockPatchTool {
    responses: HashMap<(u8, bool), PatchOutput>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<PatchCall>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockPatchTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, strip: u8, dry_run: bool, output: PatchOutput) -> Self {
        self.responses.insert((strip, dry_run), output);
        self
    }

    /// Make every call take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<PatchCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Highest number of calls that were ever running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PatchTool for MockPatchTool {
    async fn run(
        &self,
        work_dir: &Path,
        patch_file: &Path,
        strip: u8,
        dry_run: bool,
    ) -> Result<PatchOutput> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(PatchCall {
                work_dir: work_dir.to_path_buf(),
                patch_file: patch_file.to_path_buf(),
                strip,
                dry_run,
                patch_content: std::fs::read_to_string(patch_file).ok(),
            });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(self
            .responses
            .get(&(strip, dry_run))
            .cloned()
            .unwrap_or_else(|| PatchOutput::failed("no mock response")))
    }
}

/// Applies unified diffs to service directories
pub struct PatchApplier {
    tool: Arc<dyn PatchTool>,
    locks: ServiceLocks,
}

impl PatchApplier {
    pub fn new(tool: Arc<dyn PatchTool>) -> Self {
        Self {
            tool,
            locks: ServiceLocks::new(),
        }
    }

    /// Apply `diff` inside `service_dir`
    ///
    /// Tool spawn failures and temp file errors are returned as errors; a
    /// diff the tool refuses is a non-applied [`PatchResult`].
    pub async fn apply(&self, service_dir: &Path, diff: &str) -> Result<PatchResult> {
        let mut file = tempfile::Builder::new()
            .prefix("mender-")
            .suffix(".diff")
            .tempfile()?;
        file.write_all(diff.as_bytes())?;
        file.flush()?;

        let _guard = self.locks.lock(service_dir).await;
        let mut last_stderr = None;

        for strip in STRIP_LEVELS {
            let dry = self.tool.run(service_dir, file.path(), strip, true).await?;
            if !dry.success {
                debug!("Dry run -p{} failed: {}", strip, dry.stderr.trim());
                last_stderr = Some(dry.stderr);
                continue;
            }

            let real = self.tool.run(service_dir, file.path(), strip, false).await?;
            if real.success {
                info!("Patch applied with -p{} in {}", strip, service_dir.display());
                return Ok(PatchResult::applied(strip));
            }

            warn!(
                "Patch -p{} passed dry run but failed in {}: {}",
                strip,
                service_dir.display(),
                real.stderr.trim()
            );
            return Ok(PatchResult {
                applied: false,
                strip_level_used: Some(strip),
                stderr: Some(real.stderr),
            });
        }

        warn!(
            "Patch failed with -p1/-p2 in {} => manual review needed",
            service_dir.display()
        );
        Ok(PatchResult::rejected(last_stderr))
    }
}
