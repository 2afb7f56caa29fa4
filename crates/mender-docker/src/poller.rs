//! Container health poller

use crate::classifier::is_actionable_status;
use crate::command::DockerExecutor;
use mender_core::{ContainerStatus, MenderError, Result};
use tracing::debug;

/// `docker ps` format producing one `"<name> <status>"` line per container
pub const PS_FORMAT: &str = "{{.Names}} {{.Status}}";

/// Parse `"<name> <status>"` lines
///
/// Each line is split on its first whitespace run. Blank lines and lines
/// without a status token are skipped.
pub fn parse_status_lines(stdout: &str) -> Vec<ContainerStatus> {
    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (name, rest) = line.split_once(char::is_whitespace)?;
            let raw_status = rest.trim_start();
            if name.is_empty() || raw_status.is_empty() {
                debug!("Skipping malformed status line: {:?}", line);
                return None;
            }
            Some(ContainerStatus {
                name: name.to_string(),
                raw_status: raw_status.to_string(),
                is_actionable: is_actionable_status(raw_status),
            })
        })
        .collect()
}

/// Lists running containers through a [`DockerExecutor`]
pub struct HealthPoller<E: DockerExecutor> {
    executor: E,
}

impl<E: DockerExecutor> HealthPoller<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    /// Query the runtime once
    ///
    /// A non-zero exit or an unreachable daemon is returned as
    /// `MenderError::Docker`; callers log it and retry on their next tick.
    pub async fn poll_containers(&self) -> Result<Vec<ContainerStatus>> {
        let output = self.executor.exec(&["ps", "--format", PS_FORMAT]).await?;

        if !output.success {
            return Err(MenderError::Docker(format!(
                "docker ps failed: {}",
                output.stderr.trim()
            )));
        }

        let statuses = parse_status_lines(&output.stdout);
        debug!("Polled {} containers", statuses.len());
        Ok(statuses)
    }

    /// Query the runtime and keep only actionable containers
    pub async fn actionable(&self) -> Result<Vec<ContainerStatus>> {
        Ok(self
            .poll_containers()
            .await?
            .into_iter()
            .filter(|s| s.is_actionable)
            .collect())
    }
}
