//! System prompt assembly.

use std::path::Path;
use switchboard_core::ToolSchema;
use tracing::{debug, info, warn};

pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful support agent for server infrastructure.";

const TOOL_CALL_FORMAT: &str = r#"When you need to use a tool, respond with a JSON object:
{"tool": "tool_name", "args": {"arg1": "value1"}}

Otherwise, respond naturally to the user's query. Be concise and professional."#;

/// Instructions, the tool list and optional knowledge base text.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    instructions: String,
    tools: Vec<ToolSchema>,
    knowledge: Option<String>,
}

impl SystemPrompt {
    pub fn new(tools: Vec<ToolSchema>) -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            tools,
            knowledge: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Attach knowledge base text. Blank text is ignored.
    pub fn with_knowledge(mut self, knowledge: impl Into<String>) -> Self {
        let knowledge = knowledge.into();
        self.knowledge = (!knowledge.trim().is_empty()).then_some(knowledge);
        self
    }

    pub fn render(&self) -> String {
        let tools = if self.tools.is_empty() {
            "(none)".to_string()
        } else {
            self.tools
                .iter()
                .map(|t| format!("- {}: {}", t.name, t.description))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let mut prompt = format!(
            "{}\n\nAvailable tools:\n{tools}\n\n{TOOL_CALL_FORMAT}",
            self.instructions.trim_end()
        );
        if let Some(knowledge) = &self.knowledge {
            prompt.push_str("\n\n# Knowledge Base\n\n");
            prompt.push_str(knowledge.trim());
        }
        prompt
    }
}

/// Read the knowledge base file. Missing or unreadable files yield "".
pub fn load_knowledge(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            info!(path = %path.display(), bytes = text.len(), "Loaded knowledge base");
            text
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No knowledge base file");
            String::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read knowledge base");
            String::new()
        }
    }
}
