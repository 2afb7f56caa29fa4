//! # mender-core
//!
//! Core types for the Mender health-triggered patch pipeline.
//!
//! The pipeline runs in six stages, each owned by a sibling crate:
//!
//! - Health poller and issue classifier (`mender-docker`)
//! - Advisory requester and directive parser (`mender-agent`)
//! - Patch generator and patch applier (`mender-patch`)
//!
//! This crate holds what they share: the data model, the immutable
//! process configuration, the unified error type, and fail-open helpers.

pub mod config;
mod error;
pub mod fail_open;
mod types;

pub use config::MenderConfig;
pub use error::{MenderError, Result};
pub use types::*;
