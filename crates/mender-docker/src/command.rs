//! Docker command execution abstraction

use async_trait::async_trait;
use mender_core::{MenderError, Result};
use std::collections::HashMap;
use std::process::Output;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Output from a Docker command
#[derive(Debug, Clone, Default)]
pub struct DockerOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl DockerOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
        }
    }

    /// Failed output with the given stderr
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
        }
    }
}

impl From<Output> for DockerOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        }
    }
}

/// Trait for executing Docker commands (allows mocking in tests)
#[async_trait]
pub trait DockerExecutor: Send + Sync {
    /// Execute a Docker command with the given arguments
    async fn exec(&self, args: &[&str]) -> Result<DockerOutput>;
}

#[async_trait]
impl<T: DockerExecutor + ?Sized> DockerExecutor for Arc<T> {
    async fn exec(&self, args: &[&str]) -> Result<DockerOutput> {
        (**self).exec(args).await
    }
}

/// Real Docker CLI executor
#[derive(Debug, Clone)]
pub struct DockerCommand {
    binary: String,
}

impl DockerCommand {
    /// Create an executor that invokes `binary` (usually `docker`)
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for DockerCommand {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl DockerExecutor for DockerCommand {
    #[instrument(skip(self), fields(binary = %self.binary))]
    async fn exec(&self, args: &[&str]) -> Result<DockerOutput> {
        debug!("Executing {} {:?}", self.binary, args);

        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MenderError::Docker(format!("Failed to execute {}: {}", self.binary, e)))?;

        let docker_output = DockerOutput::from(output);

        if !docker_output.success {
            debug!("Docker command failed: {}", docker_output.stderr);
        }

        Ok(docker_output)
    }
}

/// Mock Docker executor for testing
#[derive(Clone, Default)]
pub struct MockDockerExecutor {
    responses: HashMap<String, DockerOutput>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockDockerExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, command: &str, output: DockerOutput) -> Self {
        self.responses.insert(command.to_string(), output);
        self
    }

    /// Commands executed so far, space-joined
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DockerExecutor for MockDockerExecutor {
    async fn exec(&self, args: &[&str]) -> Result<DockerOutput> {
        let key = args.join(" ");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(key.clone());
        }
        self.responses
            .get(&key)
            .cloned()
            .ok_or_else(|| MenderError::Docker(format!("No mock response for: {}", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_executor() {
        let executor = MockDockerExecutor::new().with_response("ps", DockerOutput::ok("web-1 Up"));

        let output = executor.exec(&["ps"]).await.unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "web-1 Up");
        assert_eq!(executor.calls(), vec!["ps".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_executor_unknown_command() {
        let executor = MockDockerExecutor::new();
        assert!(executor.exec(&["info"]).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_is_docker_error() {
        let executor = DockerCommand::new("definitely-not-a-docker-binary");
        let err = executor.exec(&["ps"]).await.unwrap_err();
        assert!(matches!(err, MenderError::Docker(_)));
    }
}
