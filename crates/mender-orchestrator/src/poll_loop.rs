//! Periodic health polling

use crate::pipeline::Pipeline;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Runs the health cycle on a fixed interval
///
/// Shutdown is checked between cycles: a running cycle always finishes.
pub struct PollLoop {
    pipeline: Arc<Pipeline>,
    poll_interval: Duration,
}

impl PollLoop {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let poll_interval = Duration::from_secs(pipeline.config().monitor.interval_secs);
        Self {
            pipeline,
            poll_interval,
        }
    }

    pub fn with_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Tick until `shutdown` turns true or its sender is dropped
    ///
    /// Returns the number of completed cycles.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> usize {
        if self.pipeline.config().docker.compose_on_start {
            self.pipeline.bootstrap().await;
        }

        info!(
            "Monitoring containers every {}s",
            self.poll_interval.as_secs()
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if let Some(report) = self.pipeline.check_finance().await {
                info!("[Finance] => {}", report.outcome);
            }

            let outcomes = self.pipeline.run_health_cycle().await;
            cycles += 1;
            for outcome in &outcomes {
                info!("Cycle {} => {}", cycles, outcome);
            }
        }

        info!("Poll loop stopped after {} cycles", cycles);
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mender_agent::BackendRegistry;
    use mender_core::MenderConfig;
    use mender_docker::{DockerOutput, MockDockerExecutor, PS_FORMAT};
    use mender_patch::MockPatchTool;

    fn pipeline(docker: &MockDockerExecutor, config: MenderConfig) -> Arc<Pipeline> {
        Arc::new(
            Pipeline::new(
                Arc::new(config),
                Arc::new(docker.clone()),
                BackendRegistry::new(),
                Arc::new(MockPatchTool::new()),
            )
            .unwrap(),
        )
    }

    fn healthy_docker() -> MockDockerExecutor {
        MockDockerExecutor::new().with_response(
            &format!("ps --format {}", PS_FORMAT),
            DockerOutput::ok("web-1 Up 3 minutes (healthy)\n"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_shutdown() {
        let docker = healthy_docker();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(
            PollLoop::new(pipeline(&docker, MenderConfig::default()))
                .with_interval(Duration::from_secs(60))
                .run(rx),
        );

        tokio::time::sleep(Duration::from_secs(125)).await;
        tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), 3);
        assert_eq!(docker.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let docker = healthy_docker();
        let (_tx, rx) = watch::channel(true);
        let cycles = PollLoop::new(pipeline(&docker, MenderConfig::default()))
            .run(rx)
            .await;
        assert_eq!(cycles, 0);
        assert!(docker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_compose_bootstrap_runs_first() {
        let mut config = MenderConfig::default();
        config.docker.compose_on_start = true;
        let docker = healthy_docker();
        let (tx, rx) = watch::channel(false);
        drop(tx);

        PollLoop::new(pipeline(&docker, config)).run(rx).await;

        let calls = docker.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].ends_with("build"));
        assert!(calls[1].ends_with("up -d"));
    }
}
