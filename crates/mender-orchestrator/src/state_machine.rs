//! Pure state machine for one pipeline cycle
//!
//! This module has NO I/O. The [`Pipeline`](crate::Pipeline) feeds it an event
//! after each stage and only proceeds when the returned actions ask for the
//! next stage.
//!
//! - Pure function: transition(state, event) -> (state, actions)
//! - Every terminal edge returns to Idle
//! - Invalid transitions return to Idle with a warning (never panic)

/// Where a cycle currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Polling,
    Classifying { containers: usize },
    RequestingAdvisory { context: String },
    ParsingDirective,
    GeneratingPatch { service_name: String },
    ApplyingPatch { service_name: String },
}

/// What just happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEvent {
    /// Timer tick; start listing containers
    PollStarted,
    ContainersListed { count: usize },
    ClassificationDone { actionable: usize },
    /// Advisory wanted for a context (from a container or an external trigger)
    AdvisoryRequested { context: String },
    AdvisoryReceived,
    NoDirective,
    DirectiveFound { service_name: String },
    /// Operator asked for a refactor directly, skipping advisory
    RefactorRequested { service_name: String },
    /// Refactor stopped before patching
    RefactorSkipped { reason: String },
    PatchGenerated,
    PatchApplied { strip_level: u8 },
    PatchRejected,
    /// An external tool failed; abort this cycle
    StageFailed { error: String },
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleAction {
    Log { message: String },
    Warn { message: String },
    ListContainers,
    RequestAdvisory { context: String },
    ParseDirective,
    GeneratePatch { service_name: String },
    ApplyPatch { service_name: String },
}

fn log(message: impl Into<String>) -> CycleAction {
    CycleAction::Log {
        message: message.into(),
    }
}

fn warn(message: impl Into<String>) -> CycleAction {
    CycleAction::Warn {
        message: message.into(),
    }
}

/// Pure state transition function
///
/// Deterministic and side-effect free. Any invalid transition lands in
/// `Idle` with a single `Warn` action.
pub fn transition(state: CycleState, event: CycleEvent) -> (CycleState, Vec<CycleAction>) {
    match (state, event) {
        (CycleState::Idle, CycleEvent::PollStarted) => {
            (CycleState::Polling, vec![CycleAction::ListContainers])
        }

        (CycleState::Polling, CycleEvent::ContainersListed { count }) => (
            CycleState::Classifying { containers: count },
            vec![log(format!("Polled {} containers", count))],
        ),

        (CycleState::Classifying { containers }, CycleEvent::ClassificationDone { actionable }) => {
            let message = if actionable == 0 {
                format!("All {} containers healthy", containers)
            } else {
                format!("{} of {} containers need attention", actionable, containers)
            };
            (CycleState::Idle, vec![log(message)])
        }

        (CycleState::Idle, CycleEvent::AdvisoryRequested { context }) => (
            CycleState::RequestingAdvisory {
                context: context.clone(),
            },
            vec![CycleAction::RequestAdvisory { context }],
        ),

        (CycleState::RequestingAdvisory { .. }, CycleEvent::AdvisoryReceived) => {
            (CycleState::ParsingDirective, vec![CycleAction::ParseDirective])
        }

        (CycleState::ParsingDirective, CycleEvent::NoDirective) => {
            (CycleState::Idle, vec![log("No refactor directive in advisory")])
        }

        (CycleState::ParsingDirective, CycleEvent::DirectiveFound { service_name })
        | (CycleState::Idle, CycleEvent::RefactorRequested { service_name }) => (
            CycleState::GeneratingPatch {
                service_name: service_name.clone(),
            },
            vec![
                log(format!("Refactor requested for {}", service_name)),
                CycleAction::GeneratePatch { service_name },
            ],
        ),

        (CycleState::ParsingDirective, CycleEvent::RefactorSkipped { reason })
        | (CycleState::GeneratingPatch { .. }, CycleEvent::RefactorSkipped { reason }) => {
            (CycleState::Idle, vec![warn(format!("Refactor skipped: {}", reason))])
        }

        (CycleState::GeneratingPatch { service_name }, CycleEvent::PatchGenerated) => (
            CycleState::ApplyingPatch {
                service_name: service_name.clone(),
            },
            vec![CycleAction::ApplyPatch { service_name }],
        ),

        (CycleState::ApplyingPatch { service_name }, CycleEvent::PatchApplied { strip_level }) => (
            CycleState::Idle,
            vec![log(format!(
                "Patch applied to {} with -p{}",
                service_name, strip_level
            ))],
        ),

        (CycleState::ApplyingPatch { service_name }, CycleEvent::PatchRejected) => (
            CycleState::Idle,
            vec![warn(format!(
                "Patch for {} rejected => manual review needed",
                service_name
            ))],
        ),

        (CycleState::Idle, CycleEvent::StageFailed { error }) => {
            (CycleState::Idle, vec![warn(format!("Cycle failed: {}", error))])
        }

        (state, CycleEvent::StageFailed { error }) => (
            CycleState::Idle,
            vec![warn(format!("Cycle aborted in {:?}: {}", state, error))],
        ),

        (state, event) => (
            CycleState::Idle,
            vec![warn(format!(
                "Invalid cycle transition: {:?} cannot handle {:?}",
                state, event
            ))],
        ),
    }
}
