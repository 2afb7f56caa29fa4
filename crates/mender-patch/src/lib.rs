//! # mender-patch
//!
//! The write half of the pipeline.
//!
//! - [`ServiceCatalog`] validates untrusted service names and gathers their
//!   source files into a [`mender_core::ServiceCodeBundle`]
//! - [`PatchGenerator`] asks the code backend for a unified diff
//! - [`PatchApplier`] applies a diff with the external patch tool, dry run
//!   first, trying strip levels 1 then 2
//! - [`ServiceLocks`] serializes patch application per service directory

mod applier;
mod catalog;
mod generator;
mod locks;

pub use applier::{
    MockPatchTool, PatchApplier, PatchCall, PatchCommand, PatchOutput, PatchTool, STRIP_LEVELS,
};
pub use catalog::{validate_service_name, ServiceCatalog};
pub use generator::{PatchCandidate, PatchGenerator};
pub use locks::ServiceLocks;
