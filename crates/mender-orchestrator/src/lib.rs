//! # mender-orchestrator
//!
//! Runs the Mender pipeline.
//!
//! - [`transition`] is the pure cycle state machine
//! - [`Pipeline`] drives poller, requester, generator and applier through it
//! - [`PollLoop`] ticks the health cycle until shutdown is signalled
//! - [`WalletProbe`] backs the optional low-balance advisory trigger

mod finance;
mod pipeline;
mod poll_loop;
mod state_machine;

pub use finance::{is_hex_address, wei_hex_to_eth, WalletProbe};
pub use pipeline::{patched_results, AdviceReport, Pipeline};
pub use poll_loop::PollLoop;
pub use state_machine::{transition, CycleAction, CycleEvent, CycleState};
