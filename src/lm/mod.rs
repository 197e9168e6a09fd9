//! Text-generation collaborators.
//!
//! Stages talk to a [`TextGenerator`] and never to a concrete backend. Two
//! backends ship: a local command that reads the prompt on stdin (any CLI
//! such as `claude -p`, `llm`, or `ollama run`), and an OpenAI-compatible
//! chat-completions endpoint.
//!
//! # Retry policy
//!
//! A stage gets exactly one local retry, after a fixed backoff, when the
//! backend reports a transient failure or answers with something that cannot
//! be parsed. The retry carries the previous answer and the parse error so
//! the model can correct itself. Timeouts and fatal errors are never retried.
mod command;
mod http;
pub mod response;

pub use command::{CommandGenerator, DEFAULT_LM_COMMAND};
pub use http::HttpGenerator;

use crate::error::{GenerationError, StageError};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

/// Attempts per generation: the first call plus one retry.
pub const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Opaque text-generation capability.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, system_prompt: &str, history: &[Message]) -> Result<String, GenerationError>;
}

/// A parsed generation plus what it took to get it.
#[derive(Debug)]
pub struct Generated<T> {
    pub value: T,
    pub attempts: u32,
    pub duration: Duration,
}

/// Generate and parse, retrying once on transient or unparsable output.
///
/// `parse` failures other than [`GenerationError::Unparsable`] are returned
/// immediately.
pub fn generate_validated<T, F>(
    generator: &dyn TextGenerator,
    system_prompt: &str,
    history: &[Message],
    backoff: Duration,
    parse: F,
) -> Result<Generated<T>, StageError>
where
    F: Fn(&str) -> Result<T, StageError>,
{
    let start = Instant::now();
    let mut conversation = history.to_vec();

    for attempt in 1..=MAX_ATTEMPTS {
        let last_attempt = attempt == MAX_ATTEMPTS;
        let response = match generator.generate(system_prompt, &conversation) {
            Ok(text) => text,
            Err(err) if err.is_transient() && !last_attempt => {
                tracing::warn!(attempt, error = %err, "text generation failed, retrying");
                thread::sleep(backoff);
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        match parse(&response) {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "text generation retry succeeded");
                }
                return Ok(Generated {
                    value,
                    attempts: attempt,
                    duration: start.elapsed(),
                });
            }
            Err(StageError::Generation(err @ GenerationError::Unparsable(_))) if !last_attempt => {
                tracing::warn!(attempt, error = %err, "response unusable, retrying");
                conversation.push(Message::assistant(response));
                conversation.push(Message::user(retry_note(&err)));
                thread::sleep(backoff);
            }
            Err(err) => return Err(err),
        }
    }

    // Unreachable when MAX_ATTEMPTS >= 1; keeps the loop free of an unwrap.
    Err(GenerationError::Fatal("no generation attempts were made".to_string()).into())
}

fn retry_note(err: &GenerationError) -> String {
    format!(
        "Your previous response could not be used.\n\n**Error:** {err}\n\n\
         Respond again following the required format exactly, with no other text."
    )
}

/// Flatten a system prompt and history into one document for backends that
/// only take a single text input.
pub fn flatten_prompt(system_prompt: &str, history: &[Message]) -> String {
    let mut out = String::new();
    out.push_str("# System\n\n");
    out.push_str(system_prompt.trim_end());
    out.push('\n');
    for message in history {
        let heading = match message.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        out.push_str(&format!("\n# {heading}\n\n{}\n", message.content.trim_end()));
    }
    out
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted generator for tests.
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses in order and records every request.
    #[derive(Default)]
    pub struct ScriptedGenerator {
        responses: Mutex<VecDeque<Result<String, GenerationError>>>,
        calls: Mutex<Vec<(String, Vec<Message>)>>,
    }

    impl ScriptedGenerator {
        pub fn new<I>(responses: I) -> Self
        where
            I: IntoIterator<Item = Result<String, GenerationError>>,
        {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn push(&self, response: Result<String, GenerationError>) {
            self.responses.lock().unwrap().push_back(response);
        }

        pub fn calls(&self) -> Vec<(String, Vec<Message>)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn remaining(&self) -> usize {
            self.responses.lock().unwrap().len()
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn generate(&self, system_prompt: &str, history: &[Message]) -> Result<String, GenerationError> {
            self.calls
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), history.to_vec()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::Fatal("script exhausted".to_string())))
        }
    }
}
