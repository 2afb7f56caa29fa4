//! Compose bootstrap run once before polling starts

use crate::command::DockerExecutor;
use mender_core::{MenderError, Result};
use std::path::Path;
use tracing::{error, info};

/// Run `docker compose -f <file> build` then `up -d`
///
/// Both steps are attempted and failures are logged. Returns `true` only
/// when both succeeded.
pub async fn compose_bootstrap<E: DockerExecutor + ?Sized>(
    executor: &E,
    compose_file: &Path,
) -> bool {
    let file = compose_file.to_string_lossy().into_owned();
    let mut all_ok = true;

    for (step, args) in [
        ("build", vec!["compose", "-f", file.as_str(), "build"]),
        ("up", vec!["compose", "-f", file.as_str(), "up", "-d"]),
    ] {
        match run_step(executor, &args).await {
            Ok(()) => info!("Docker Compose {} complete", step),
            Err(e) => {
                error!("Docker Compose {} failed: {}", step, e);
                all_ok = false;
            }
        }
    }

    all_ok
}

async fn run_step<E: DockerExecutor + ?Sized>(executor: &E, args: &[&str]) -> Result<()> {
    let output = executor.exec(args).await?;
    if output.success {
        Ok(())
    } else {
        Err(MenderError::Docker(output.stderr.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{DockerOutput, MockDockerExecutor};

    #[tokio::test]
    async fn test_bootstrap_runs_build_then_up() {
        let executor = MockDockerExecutor::new()
            .with_response("compose -f dc.yml build", DockerOutput::ok(""))
            .with_response("compose -f dc.yml up -d", DockerOutput::ok(""));

        let ok = compose_bootstrap(&executor, Path::new("dc.yml")).await;
        assert!(ok);
        assert_eq!(
            executor.calls(),
            vec!["compose -f dc.yml build", "compose -f dc.yml up -d"]
        );
    }

    #[tokio::test]
    async fn test_bootstrap_failed_build_still_attempts_up() {
        let executor = MockDockerExecutor::new()
            .with_response("compose -f dc.yml build", DockerOutput::failed("no such file"))
            .with_response("compose -f dc.yml up -d", DockerOutput::ok(""));

        let ok = compose_bootstrap(&executor, Path::new("dc.yml")).await;
        assert!(!ok);
        assert_eq!(executor.calls().len(), 2);
    }
}
