//! # mender-docker
//!
//! Container runtime integration for Mender.
//!
//! - [`HealthPoller`] lists running containers through a [`DockerExecutor`]
//! - [`classify`] flags containers whose status needs attention
//! - [`compose_bootstrap`] runs the optional `compose build` / `up -d` at startup

mod classifier;
mod command;
mod compose;
mod poller;

pub use classifier::{classify, is_actionable_status, ISSUE_KEYWORDS};
pub use command::{DockerCommand, DockerExecutor, DockerOutput, MockDockerExecutor};
pub use compose::compose_bootstrap;
pub use poller::{parse_status_lines, HealthPoller, PS_FORMAT};
