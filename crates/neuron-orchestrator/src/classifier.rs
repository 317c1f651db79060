use neuron_core::{AgentType, MessageType, NeuronError, NeuronResult};
use regex::Regex;
use std::collections::HashMap;

/// Metadata key a client can use to request extra agents explicitly,
/// as a comma-separated list of agent names.
pub const AGENTS_HINT: &str = "agents";

/// Decides which supplementary agents a message needs.
///
/// Implementations must be pure: the same content, type and metadata always
/// yield the same agents in the same order.
pub trait Classifier: Send + Sync {
    /// The supplementary agents `content` calls for, in dispatch order.
    fn classify(
        &self,
        content: &str,
        message_type: MessageType,
        metadata: &HashMap<String, String>,
    ) -> Vec<AgentType>;
}

/// The full ordered agent list for a message: the coordinating role first,
/// then the classified agents, then the writer.
pub fn required_agents(
    classifier: &dyn Classifier,
    content: &str,
    message_type: MessageType,
    metadata: &HashMap<String, String>,
) -> Vec<AgentType> {
    let mut agents = vec![AgentType::Orchestrator];
    for agent in classifier.classify(content, message_type, metadata) {
        if !matches!(agent, AgentType::Orchestrator | AgentType::Writer) && !agents.contains(&agent)
        {
            agents.push(agent);
        }
    }
    agents.push(AgentType::Writer);
    agents
}

const CODE_PATTERN: &str = r"(?i)(```|\bfn\s+\w+|\bdef\s+\w+|\bfunctions?\b|\bclass\b|\bstruct\b|\bimplement\w*\b|\bcode\b|\bscript\b|\bbug\b|\bcompil\w+\b|\brefactor\w*\b|\balgorithm\b|\bsnippet\b|\bsql\b|\bregex\b)";
const IMAGE_PATTERN: &str =
    r"(?i)\b(draw|image|picture|photo|illustration|illustrate|logo|icon|painting|paint)\b";
const VIDEO_PATTERN: &str =
    r"(?i)\b(video|animation|animate|clip|movie|film|storyboard|timelapse)\b";
const QUESTION_PATTERN: &str = r"(?i)^\s*(what|why|how|who|when|where|which|explain|describe|compare|research|summari[sz]e|tell me)\b";

/// Regex-based content classifier.
pub struct KeywordClassifier {
    code: Regex,
    image: Regex,
    video: Regex,
    question: Regex,
}

impl KeywordClassifier {
    /// Compiles the keyword patterns.
    pub fn new() -> NeuronResult<Self> {
        Ok(Self {
            code: compile(CODE_PATTERN)?,
            image: compile(IMAGE_PATTERN)?,
            video: compile(VIDEO_PATTERN)?,
            question: compile(QUESTION_PATTERN)?,
        })
    }

    fn is_open_question(&self, content: &str) -> bool {
        content.trim_end().ends_with('?') || self.question.is_match(content)
    }
}

fn compile(pattern: &str) -> NeuronResult<Regex> {
    Regex::new(pattern).map_err(|e| NeuronError::Config(format!("invalid classifier pattern: {e}")))
}

impl Classifier for KeywordClassifier {
    fn classify(
        &self,
        content: &str,
        message_type: MessageType,
        metadata: &HashMap<String, String>,
    ) -> Vec<AgentType> {
        let hinted: Vec<AgentType> = metadata
            .get(AGENTS_HINT)
            .map(|list| {
                list.split(',')
                    .filter_map(|name| {
                        let name = name.trim();
                        AgentType::ALL.into_iter().find(|a| a.as_str() == name)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let wants = |agent: AgentType, kind: MessageType, re: &Regex| {
            hinted.contains(&agent) || message_type == kind || re.is_match(content)
        };

        let mut agents = Vec::new();
        if hinted.contains(&AgentType::Researcher) || self.is_open_question(content) {
            agents.push(AgentType::Researcher);
        }
        if wants(AgentType::Code, MessageType::Code, &self.code) {
            agents.push(AgentType::Code);
        }
        if wants(AgentType::Image, MessageType::Image, &self.image) {
            agents.push(AgentType::Image);
        }
        if wants(AgentType::Video, MessageType::Video, &self.video) {
            agents.push(AgentType::Video);
        }
        agents
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn plan(content: &str) -> Vec<AgentType> {
        let classifier = KeywordClassifier::new().unwrap();
        required_agents(&classifier, content, MessageType::Text, &HashMap::new())
    }

    #[test]
    fn test_code_request() {
        assert_eq!(
            plan("write a function to reverse a string"),
            vec![AgentType::Orchestrator, AgentType::Code, AgentType::Writer]
        );
    }

    #[test]
    fn test_open_question_gets_research() {
        assert_eq!(
            plan("Why is the sky blue?"),
            vec![
                AgentType::Orchestrator,
                AgentType::Researcher,
                AgentType::Writer
            ]
        );
        assert_eq!(plan("explain ownership")[1], AgentType::Researcher);
    }

    #[test]
    fn test_plain_chat_only_writer() {
        assert_eq!(
            plan("thanks, that helps"),
            vec![AgentType::Orchestrator, AgentType::Writer]
        );
    }

    #[test]
    fn test_media_intents() {
        assert_eq!(
            plan("draw a logo and make a short video of it"),
            vec![
                AgentType::Orchestrator,
                AgentType::Image,
                AgentType::Video,
                AgentType::Writer
            ]
        );
    }

    #[test]
    fn test_message_type_and_hints() {
        let classifier = KeywordClassifier::new().unwrap();
        let agents = required_agents(&classifier, "hello", MessageType::Image, &HashMap::new());
        assert_eq!(
            agents,
            vec![AgentType::Orchestrator, AgentType::Image, AgentType::Writer]
        );

        let mut metadata = HashMap::new();
        metadata.insert(AGENTS_HINT.to_string(), "researcher, writer, bogus".to_string());
        let agents = required_agents(&classifier, "hello", MessageType::Text, &metadata);
        assert_eq!(
            agents,
            vec![
                AgentType::Orchestrator,
                AgentType::Researcher,
                AgentType::Writer
            ]
        );
    }

    #[test]
    fn test_classification_is_deterministic() {
        let input = "how do I implement a struct that draws an image?";
        let first = plan(input);
        for _ in 0..10 {
            assert_eq!(plan(input), first);
        }
    }
}
