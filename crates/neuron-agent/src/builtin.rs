//! Deterministic builtin agents.
//!
//! They need no model provider: each one derives its answer from the task
//! description and shared context, then streams it word by word with a
//! configurable delay. This keeps the gateway runnable end to end and gives
//! the orchestrator realistic multi-fragment streams to relay.

use crate::agent::{Agent, AgentInput};
use crate::config::AgentsConfig;
use crate::stream::{AgentEvent, AgentStream};
use async_trait::async_trait;
use neuron_core::{AgentType, MessageType, NeuronResult};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Shared-context key each builtin agent publishes its output under.
pub fn output_key(agent_type: AgentType) -> &'static str {
    match agent_type {
        AgentType::Orchestrator => "plan",
        AgentType::Researcher => "research",
        AgentType::Writer => "answer",
        AgentType::Code => "code",
        AgentType::Image => "image",
        AgentType::Video => "video",
    }
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "what", "why", "how", "are", "was", "can",
    "you", "your", "please", "about", "into", "from", "does", "which", "when", "who",
];

const CODE_VERBS: &[&str] = &["write", "function", "create", "implement", "code", "make"];

/// One builtin agent of a given type.
pub struct BuiltinAgent {
    agent_type: AgentType,
    chunk_delay: Duration,
}

impl BuiltinAgent {
    /// A builtin agent for `agent_type` that waits `chunk_delay` between fragments.
    pub fn new(agent_type: AgentType, chunk_delay: Duration) -> Self {
        Self {
            agent_type,
            chunk_delay,
        }
    }

    /// Every dispatchable builtin agent. The orchestrator role is not an
    /// agent and is left out.
    pub fn all(config: &AgentsConfig) -> Vec<Self> {
        AgentType::ALL
            .into_iter()
            .filter(|t| *t != AgentType::Orchestrator)
            .map(|t| Self::new(t, config.chunk_delay()))
            .collect()
    }
}

#[async_trait]
impl Agent for BuiltinAgent {
    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    fn depends_on(&self) -> Vec<AgentType> {
        match self.agent_type {
            AgentType::Writer => vec![
                AgentType::Researcher,
                AgentType::Code,
                AgentType::Image,
                AgentType::Video,
            ],
            _ => Vec::new(),
        }
    }

    async fn run(&self, input: AgentInput) -> NeuronResult<AgentStream> {
        let (tx, rx) = mpsc::channel(32);
        let (content, message_type) = compose(self.agent_type, &input);
        let key = output_key(self.agent_type);
        let agent = self.agent_type;
        let delay = self.chunk_delay;

        tokio::spawn(async move {
            debug!(agent = %agent, task_id = %input.task_id, "Builtin agent started");
            for chunk in content.split_inclusive(char::is_whitespace) {
                if delay.is_zero() {
                    if input.cancel.is_cancelled() {
                        return;
                    }
                } else {
                    tokio::select! {
                        _ = input.cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                let event = AgentEvent::Delta {
                    content: chunk.to_string(),
                    message_type,
                };
                if tx.send(event).await.is_err() {
                    // Receiver dropped: the task ended without us.
                    return;
                }
            }
            let _ = tx.send(AgentEvent::done_with(key, content)).await;
        });

        Ok(rx)
    }
}

fn compose(agent_type: AgentType, input: &AgentInput) -> (String, MessageType) {
    let topic = input.description.trim();
    let keywords = significant_words(topic);

    match agent_type {
        AgentType::Orchestrator => (format!("Plan for \"{topic}\"."), MessageType::Text),
        AgentType::Researcher => {
            let focus = if keywords.is_empty() {
                "the question as asked".to_string()
            } else {
                keywords.join(", ")
            };
            (
                format!(
                    "Research notes on \"{topic}\": the main themes are {focus}. \
                     Start from a precise definition, then look at practical usage and known pitfalls.\n\n"
                ),
                MessageType::Text,
            )
        }
        AgentType::Code => {
            let lang = input
                .metadata
                .get("language")
                .map(String::as_str)
                .unwrap_or("rust");
            let ident = identifier(&keywords);
            (
                format!(
                    "```{lang}\n// {topic}\nfn {ident}(input: &str) -> String {{\n    input.to_string()\n}}\n```\n\n"
                ),
                MessageType::Code,
            )
        }
        AgentType::Image => (
            format!("Image prompt: {topic}, clear composition, natural lighting, high detail.\n\n"),
            MessageType::Image,
        ),
        AgentType::Video => (
            format!(
                "Storyboard for {topic}: opening wide shot, a closer look at the subject, \
                 then a closing shot that ties it together.\n\n"
            ),
            MessageType::Video,
        ),
        AgentType::Writer => (synthesize(topic, input), MessageType::Text),
    }
}

/// The writer's answer: a summary that references every upstream output
/// present in the shared context.
fn synthesize(topic: &str, input: &AgentInput) -> String {
    let mut answer = format!("Here is my answer to \"{topic}\".");
    let sources = [
        (AgentType::Researcher, "the research notes"),
        (AgentType::Code, "the code above"),
        (AgentType::Image, "the image prompt"),
        (AgentType::Video, "the storyboard"),
    ];
    let mut used = Vec::new();
    for (agent, label) in sources {
        if let Some(value) = input.shared_context.get(output_key(agent)) {
            let words = value.split_whitespace().count();
            used.push(format!("{label} ({words} words)"));
        }
    }
    if used.is_empty() {
        answer.push_str(" No other agent contributed, so this is a direct reply.");
    } else {
        answer.push_str(" It builds on ");
        answer.push_str(&used.join(" and "));
        answer.push('.');
    }
    answer
}

fn significant_words(text: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
    {
        if word.len() > 2 && !STOPWORDS.contains(&word.as_str()) && !words.contains(&word) {
            words.push(word);
        }
    }
    words
}

fn identifier(keywords: &[String]) -> String {
    let parts: Vec<&str> = keywords
        .iter()
        .map(String::as_str)
        .filter(|w| !CODE_VERBS.contains(w) && w.chars().all(|c| c.is_ascii_alphanumeric()))
        .take(3)
        .collect();
    match parts.first() {
        Some(first) if !first.starts_with(|c: char| c.is_ascii_digit()) => parts.join("_"),
        _ => "solution".to_string(),
    }
}
