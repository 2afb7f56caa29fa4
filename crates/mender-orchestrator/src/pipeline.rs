//! Pipeline runner
//!
//! Drives the real components through the cycle state machine. A cycle only
//! moves to the next stage when the state machine asks for it; every stage
//! failure ends the cycle with a [`CycleOutcome`] instead of an error.

use crate::finance::WalletProbe;
use crate::state_machine::{transition, CycleAction, CycleEvent, CycleState};
use mender_agent::{
    mentions_refactor, parse_directive, AdvisoryRequester, BackendRegistry, Debate, DebateOutcome,
};
use mender_core::fail_open::fail_open;
use mender_core::{
    Advisory, AdvisoryRequest, CycleOutcome, MenderConfig, PatchResult, RefactorDirective, Result,
};
use mender_docker::{classify, compose_bootstrap, DockerCommand, DockerExecutor, HealthPoller};
use mender_patch::{
    PatchApplier, PatchCandidate, PatchCommand, PatchGenerator, PatchTool, ServiceCatalog,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Advisory text plus what the pipeline did with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdviceReport {
    pub advisory: Advisory,
    pub outcome: CycleOutcome,
}

impl AdviceReport {
    pub fn answer(&self) -> String {
        self.advisory.combined()
    }
}

/// One run through the state machine
///
/// The short id ties together log lines of cycles that run concurrently
/// (poll loop and control surface).
#[derive(Debug)]
struct Cycle {
    id: String,
    state: CycleState,
}

impl Default for Cycle {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
            state: CycleState::Idle,
        }
    }
}

impl Cycle {
    /// Apply `event`, log what the transition says, return the stage actions
    fn fire(&mut self, event: CycleEvent) -> Vec<CycleAction> {
        let state = std::mem::replace(&mut self.state, CycleState::Idle);
        let (next, actions) = transition(state, event);
        self.state = next;

        actions
            .into_iter()
            .filter(|action| match action {
                CycleAction::Log { message } => {
                    info!(cycle = %self.id, "{}", message);
                    false
                }
                CycleAction::Warn { message } => {
                    warn!(cycle = %self.id, "{}", message);
                    false
                }
                _ => true,
            })
            .collect()
    }

    /// Fire `event` and report whether the machine asked for `wanted`
    fn advance(&mut self, event: CycleEvent, wanted: fn(&CycleAction) -> bool) -> bool {
        self.fire(event).iter().any(wanted)
    }
}

fn out_of_order() -> CycleOutcome {
    CycleOutcome::Aborted {
        reason: "invalid cycle transition".to_string(),
    }
}

/// The full poll → advise → patch chain
pub struct Pipeline {
    config: Arc<MenderConfig>,
    docker: Arc<dyn DockerExecutor>,
    poller: HealthPoller<Arc<dyn DockerExecutor>>,
    requester: Arc<AdvisoryRequester>,
    generator: PatchGenerator,
    applier: PatchApplier,
    wallet: Option<WalletProbe>,
}

impl Pipeline {
    pub fn new(
        config: Arc<MenderConfig>,
        docker: Arc<dyn DockerExecutor>,
        registry: BackendRegistry,
        patch_tool: Arc<dyn PatchTool>,
    ) -> Result<Self> {
        let requester = Arc::new(AdvisoryRequester::from_config(&config, registry)?);
        let generator = PatchGenerator::new(
            ServiceCatalog::new(&config.services),
            requester.clone(),
            config.backends.code_backend,
        );

        let wallet = if config.finance.enabled {
            match WalletProbe::new(&config.finance, config.backend_timeout()) {
                Ok(probe) => Some(probe),
                Err(e) => {
                    warn!("Finance check disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            poller: HealthPoller::new(docker.clone()),
            docker,
            requester,
            generator,
            applier: PatchApplier::new(patch_tool),
            wallet,
            config,
        })
    }

    /// Wire up the real Docker CLI, HTTP backends and `patch` binary
    pub fn from_config(config: Arc<MenderConfig>) -> Result<Self> {
        let docker = Arc::new(DockerCommand::new(config.docker.binary.clone()));
        let registry = BackendRegistry::from_config(&config)?;
        let patch_tool = Arc::new(PatchCommand::new(config.patch.binary.clone()));
        Self::new(config, docker, registry, patch_tool)
    }

    pub fn config(&self) -> &MenderConfig {
        &self.config
    }

    /// `docker compose build` + `up -d`; failures are logged only
    pub async fn bootstrap(&self) -> bool {
        compose_bootstrap(self.docker.as_ref(), &self.config.docker.compose_file).await
    }

    /// Poll, classify and handle every actionable container in turn
    pub async fn run_health_cycle(&self) -> Vec<CycleOutcome> {
        let mut cycle = Cycle::default();
        if !cycle.advance(CycleEvent::PollStarted, |a| {
            matches!(a, CycleAction::ListContainers)
        }) {
            return vec![out_of_order()];
        }

        let statuses = match self.poller.poll_containers().await {
            Ok(statuses) => statuses,
            Err(e) => {
                cycle.fire(CycleEvent::StageFailed {
                    error: e.to_string(),
                });
                return vec![CycleOutcome::Aborted {
                    reason: e.to_string(),
                }];
            }
        };

        cycle.fire(CycleEvent::ContainersListed {
            count: statuses.len(),
        });
        let actionable: Vec<_> = statuses.into_iter().filter(|s| classify(s)).collect();
        cycle.fire(CycleEvent::ClassificationDone {
            actionable: actionable.len(),
        });

        if actionable.is_empty() {
            return vec![CycleOutcome::NoIssue];
        }

        let mut outcomes = Vec::with_capacity(actionable.len());
        for status in &actionable {
            warn!("Issue => {} ({})", status.name, status.raw_status);
            let request = AdvisoryRequest::for_container(status);
            outcomes.push(self.advise_and_refactor(&request.context).await.outcome);
        }
        outcomes
    }

    /// Ask the configured backends about `context`
    ///
    /// With debate mode on, the debate's final answer is the advisory.
    pub async fn advise(&self, context: &str) -> Advisory {
        if self.config.debate.enabled {
            return self.debate(context).await.into_advisory();
        }
        self.requester.request(&AdvisoryRequest::new(context)).await
    }

    /// Advisory, then (when enabled and mentioned) directive and patch
    pub async fn advise_and_refactor(&self, context: &str) -> AdviceReport {
        let mut cycle = Cycle::default();
        if !cycle.advance(
            CycleEvent::AdvisoryRequested {
                context: context.to_string(),
            },
            |a| matches!(a, CycleAction::RequestAdvisory { .. }),
        ) {
            return AdviceReport {
                advisory: Advisory::default(),
                outcome: out_of_order(),
            };
        }

        let advisory = self.advise(context).await;
        let combined = advisory.combined();
        cycle.fire(CycleEvent::AdvisoryReceived);

        let directive = if mentions_refactor(&combined) {
            parse_directive(&combined)
        } else {
            None
        };

        let Some(directive) = directive else {
            cycle.fire(CycleEvent::NoDirective);
            return AdviceReport {
                advisory,
                outcome: CycleOutcome::NoDirective { advisory: combined },
            };
        };

        if !self.config.monitor.autonomous_refactor {
            cycle.fire(CycleEvent::RefactorSkipped {
                reason: "autonomous refactor is off".to_string(),
            });
            return AdviceReport {
                advisory,
                outcome: CycleOutcome::RefactorDisabled {
                    service_name: directive.service_name,
                },
            };
        }

        let directive = directive.with_instructions(combined);
        let outcome = if cycle.advance(
            CycleEvent::DirectiveFound {
                service_name: directive.service_name.clone(),
            },
            |a| matches!(a, CycleAction::GeneratePatch { .. }),
        ) {
            self.generate_and_apply(&mut cycle, &directive).await
        } else {
            out_of_order()
        };

        AdviceReport { advisory, outcome }
    }

    /// Generate and apply a patch for `service_name` without asking for advice
    pub async fn refactor_service(
        &self,
        service_name: &str,
        instructions: Option<&str>,
    ) -> CycleOutcome {
        let mut cycle = Cycle::default();
        if !cycle.advance(
            CycleEvent::RefactorRequested {
                service_name: service_name.to_string(),
            },
            |a| matches!(a, CycleAction::GeneratePatch { .. }),
        ) {
            return out_of_order();
        }

        let mut directive = RefactorDirective::new(service_name);
        if let Some(instructions) = instructions {
            directive = directive.with_instructions(instructions);
        }
        self.generate_and_apply(&mut cycle, &directive).await
    }

    async fn generate_and_apply(
        &self,
        cycle: &mut Cycle,
        directive: &RefactorDirective,
    ) -> CycleOutcome {
        let service_name = directive.service_name.clone();

        let (service_dir, diff) = match self.generator.generate(directive).await {
            PatchCandidate::Diff { service_dir, diff } => (service_dir, diff),
            PatchCandidate::Rejected { reason } => {
                cycle.fire(CycleEvent::RefactorSkipped {
                    reason: reason.clone(),
                });
                return CycleOutcome::ServiceRejected {
                    service_name,
                    reason,
                };
            }
            PatchCandidate::EmptyBundle => {
                cycle.fire(CycleEvent::RefactorSkipped {
                    reason: "no recognized code".to_string(),
                });
                return CycleOutcome::EmptyBundle { service_name };
            }
            PatchCandidate::NoPatch => {
                cycle.fire(CycleEvent::RefactorSkipped {
                    reason: "no patch generated".to_string(),
                });
                return CycleOutcome::NoPatch { service_name };
            }
        };

        if !cycle.advance(CycleEvent::PatchGenerated, |a| {
            matches!(a, CycleAction::ApplyPatch { .. })
        }) {
            return out_of_order();
        }

        match self.applier.apply(&service_dir, &diff).await {
            Ok(result) if result.applied => {
                cycle.fire(CycleEvent::PatchApplied {
                    strip_level: result.strip_level_used.unwrap_or_default(),
                });
                CycleOutcome::Patched {
                    service_name,
                    result,
                }
            }
            Ok(result) => {
                cycle.fire(CycleEvent::PatchRejected);
                CycleOutcome::PatchRejected {
                    service_name,
                    result,
                }
            }
            Err(e) => {
                cycle.fire(CycleEvent::StageFailed {
                    error: e.to_string(),
                });
                CycleOutcome::Aborted {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Two-round generation/critic debate over `context`
    pub async fn debate(&self, context: &str) -> DebateOutcome {
        Debate::new(&self.requester, &self.config.debate.agents)
            .run(context)
            .await
    }

    /// Check the wallet and ask for advice when the balance is low
    ///
    /// Returns `None` when the check is off, failed, or found nothing to do.
    pub async fn check_finance(&self) -> Option<AdviceReport> {
        let wallet = self.wallet.as_ref()?;
        let balance = fail_open("finance", wallet.balance_eth()).await?;
        info!("Wallet {} => {} ETH", wallet.address(), balance);

        if !self.config.finance.trigger_advisory || balance >= self.config.finance.threshold_eth {
            return None;
        }

        warn!(
            "Balance {} ETH below threshold {} ETH",
            balance, self.config.finance.threshold_eth
        );
        Some(
            self.advise_and_refactor(&format!("Low ETH => {}, synergy needed.", balance))
                .await,
        )
    }
}

/// Convenience for callers that only care whether anything was patched
pub fn patched_results(outcomes: &[CycleOutcome]) -> Vec<&PatchResult> {
    outcomes
        .iter()
        .filter_map(|o| match o {
            CycleOutcome::Patched { result, .. } => Some(result),
            _ => None,
        })
        .collect()
}
