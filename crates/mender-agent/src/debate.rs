//! Two-round generation/critic debate
//!
//! Round one: every generation agent answers the context. Round two: every
//! critic agent sees the context plus all round-one answers and refines them.
//! The final answer is the last non-empty critique, falling back to the
//! first non-empty generation answer. Free-text answers are never compared
//! for equality.

use crate::backend::GenerationRequest;
use crate::requester::AdvisoryRequester;
use futures::future::join_all;
use mender_core::config::{DebateAgentConfig, DebateRole};
use mender_core::{Advisory, AdvisoryResponse, BackendId};
use serde::{Deserialize, Serialize};
use tracing::info;

const DEBATE_SYSTEM_PROMPT: &str = "Multiagent synergy.";

/// Everything said during one debate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateOutcome {
    /// `(agent id, answer)` for each generation agent, in configuration order
    pub generation: Vec<(String, String)>,
    /// `(agent id, critique)` for each critic agent, in configuration order
    pub critiques: Vec<(String, String)>,
    pub final_answer: String,
    /// Backend of the agent whose answer won, `None` when nobody answered
    pub final_backend: Option<BackendId>,
}

impl DebateOutcome {
    /// The final answer as a single-response advisory
    pub fn into_advisory(self) -> Advisory {
        let responses = self
            .final_backend
            .map(|source| {
                vec![AdvisoryResponse {
                    source,
                    text: self.final_answer,
                }]
            })
            .unwrap_or_default();
        Advisory::new(responses)
    }
}

/// Debate runner over the requester's backends
pub struct Debate<'a> {
    requester: &'a AdvisoryRequester,
    agents: &'a [DebateAgentConfig],
}

impl<'a> Debate<'a> {
    pub fn new(requester: &'a AdvisoryRequester, agents: &'a [DebateAgentConfig]) -> Self {
        Self { requester, agents }
    }

    pub async fn run(&self, context: &str) -> DebateOutcome {
        let generation = self
            .round(DebateRole::Generation, context.to_string())
            .await;

        let summary = generation
            .iter()
            .map(|(id, answer)| format!("{}: {}", id, answer))
            .collect::<Vec<_>>()
            .join("\n");

        let critic_prompt = format!(
            "Context => {}\nGeneration Round =>\n{}\nPlease critique & refine the final answer.",
            context, summary
        );
        let critiques = self.round(DebateRole::Critic, critic_prompt).await;

        let winner = resolve_entry(&generation, &critiques);
        let final_answer = winner.map(|(_, answer)| answer.clone()).unwrap_or_default();
        let final_backend = winner.and_then(|(id, _)| {
            self.agents
                .iter()
                .find(|a| &a.id == id)
                .map(|a| a.backend)
        });
        info!(
            "[Debate] {} generation / {} critic answers => {} chars",
            generation.len(),
            critiques.len(),
            final_answer.len()
        );

        DebateOutcome {
            generation,
            critiques,
            final_answer,
            final_backend,
        }
    }

    async fn round(&self, role: DebateRole, prompt: String) -> Vec<(String, String)> {
        let agents: Vec<&DebateAgentConfig> =
            self.agents.iter().filter(|a| a.role == role).collect();

        let calls = agents.iter().map(|agent| {
            let request =
                GenerationRequest::new(prompt.clone()).with_system(DEBATE_SYSTEM_PROMPT);
            self.requester.ask(agent.backend, request)
        });
        let answers = join_all(calls).await;

        agents
            .into_iter()
            .map(|a| a.id.clone())
            .zip(answers)
            .collect()
    }
}

fn resolve_entry<'a>(
    generation: &'a [(String, String)],
    critiques: &'a [(String, String)],
) -> Option<&'a (String, String)> {
    critiques
        .iter()
        .rev()
        .chain(generation.iter())
        .find(|(_, answer)| !answer.trim().is_empty())
}

/// Pick the final answer from the two rounds
pub(crate) fn resolve(generation: &[(String, String)], critiques: &[(String, String)]) -> String {
    resolve_entry(generation, critiques)
        .map(|(_, answer)| answer.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendRegistry, StaticBackend};
    use mender_core::BackendId;
    use std::sync::Arc;
    use std::time::Duration;

    fn agent(id: &str, role: DebateRole, backend: BackendId) -> DebateAgentConfig {
        DebateAgentConfig {
            id: id.to_string(),
            role,
            backend,
        }
    }

    fn pair(id: &str, text: &str) -> (String, String) {
        (id.to_string(), text.to_string())
    }

    #[test]
    fn test_resolve_prefers_last_critic() {
        let gen = vec![pair("g1", "a"), pair("g2", "b")];
        let crit = vec![pair("c1", "refined"), pair("c2", "final")];
        assert_eq!(resolve(&gen, &crit), "final");
    }

    #[test]
    fn test_resolve_falls_back_to_first_generation() {
        let gen = vec![pair("g1", ""), pair("g2", "b"), pair("g3", "c")];
        let crit = vec![pair("c1", "  ")];
        assert_eq!(resolve(&gen, &crit), "b");
        assert_eq!(resolve(&[], &[]), "");
    }

    #[tokio::test]
    async fn test_debate_rounds() {
        let gpt = StaticBackend::new(BackendId::Gpt, "restart it");
        let gemini = StaticBackend::new(BackendId::Gemini, "refactor service 'web'");
        let registry = BackendRegistry::new()
            .with_backend(Arc::new(gpt.clone()))
            .with_backend(Arc::new(gemini.clone()));
        let requester = AdvisoryRequester::new(
            registry,
            vec![BackendId::Gpt, BackendId::Gemini],
            Duration::from_secs(5),
        );
        let agents = vec![
            agent("GenAgent1", DebateRole::Generation, BackendId::Gpt),
            agent("CritAgent1", DebateRole::Critic, BackendId::Gemini),
        ];

        let outcome = Debate::new(&requester, &agents).run("web-1 dead").await;

        assert_eq!(outcome.generation, vec![pair("GenAgent1", "restart it")]);
        assert_eq!(outcome.critiques.len(), 1);
        assert_eq!(outcome.final_answer, "refactor service 'web'");
        assert_eq!(outcome.final_backend, Some(BackendId::Gemini));

        let critic_prompt = &gemini.prompts()[0];
        assert!(critic_prompt
            .starts_with("Context => web-1 dead\nGeneration Round =>\nGenAgent1: restart it"));
        assert_eq!(gpt.prompts(), vec!["web-1 dead".to_string()]);
    }

    #[test]
    fn test_into_advisory() {
        let outcome = DebateOutcome {
            generation: vec![pair("GenAgent1", "restart it")],
            critiques: vec![],
            final_answer: "restart it".to_string(),
            final_backend: Some(BackendId::Gpt),
        };
        let advisory = outcome.into_advisory();
        assert_eq!(advisory.text_from(BackendId::Gpt), Some("restart it"));
        assert!(advisory.text_from(BackendId::Gemini).is_none());

        assert!(DebateOutcome::default().into_advisory().is_empty());
    }
}
