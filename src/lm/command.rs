//! Local LM command backend.
//!
//! Invokes a user-configured command with the flattened prompt on stdin and
//! takes stdout as the response.
use super::{flatten_prompt, Message, TextGenerator};
use crate::error::GenerationError;
use crate::process::run_with_timeout;
use crate::util::tail_excerpt;
use anyhow::{anyhow, Context, Result};
use std::process::Command;
use std::time::Duration;

/// Command used when nothing else is configured.
pub const DEFAULT_LM_COMMAND: &str = "claude -p";

const STDERR_EXCERPT_BYTES: usize = 2000;

#[derive(Debug, Clone)]
pub struct CommandGenerator {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    /// Parse `command` with shell quoting rules.
    pub fn from_command(command: &str, timeout: Duration) -> Result<Self> {
        let argv = shell_words::split(command).with_context(|| format!("parse LM command: {command}"))?;
        if argv.is_empty() {
            return Err(anyhow!("LM command is empty"));
        }
        Ok(Self { argv, timeout })
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }
}

impl TextGenerator for CommandGenerator {
    fn generate(&self, system_prompt: &str, history: &[Message]) -> Result<String, GenerationError> {
        let prompt = flatten_prompt(system_prompt, history);
        let mut command = Command::new(&self.argv[0]);
        command.args(&self.argv[1..]);

        let output = run_with_timeout(command, Some(prompt.as_bytes()), self.timeout)
            .map_err(|err| GenerationError::Fatal(format!("spawn LM command {}: {err}", self.argv[0])))?;

        tracing::info!(
            elapsed_ms = output.elapsed.as_millis() as u64,
            prompt_bytes = prompt.len(),
            response_bytes = output.stdout.len(),
            timed_out = output.timed_out,
            "lm invoke complete"
        );

        if output.timed_out {
            return Err(GenerationError::Timeout(self.timeout));
        }
        if !output.status.success() {
            let stderr = tail_excerpt(output.stderr_lossy().trim(), STDERR_EXCERPT_BYTES);
            return Err(GenerationError::Transient(format!(
                "LM command failed with {}: {stderr}",
                output.status
            )));
        }
        let text = String::from_utf8(output.stdout)
            .map_err(|_| GenerationError::Unparsable("LM stdout is not valid UTF-8".to_string()))?;
        if text.trim().is_empty() {
            return Err(GenerationError::Unparsable("LM returned an empty response".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_command() {
        assert!(CommandGenerator::from_command("   ", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn splits_quoted_arguments() {
        let generator =
            CommandGenerator::from_command("llm -m 'gpt 4' --no-stream", Duration::from_secs(1)).unwrap();
        assert_eq!(generator.argv, ["llm", "-m", "gpt 4", "--no-stream"]);
        assert_eq!(generator.program(), "llm");
    }

    #[cfg(unix)]
    #[test]
    fn echoes_prompt_through_stdin() {
        let generator = CommandGenerator::from_command("cat", Duration::from_secs(10)).unwrap();
        let text = generator.generate("system rules", &[Message::user("a foggy pier")]).unwrap();
        assert!(text.contains("system rules"));
        assert!(text.contains("a foggy pier"));
    }

    #[cfg(unix)]
    #[test]
    fn classifies_failures() {
        let failing = CommandGenerator::from_command("sh -c 'echo boom >&2; exit 2'", Duration::from_secs(10))
            .unwrap();
        match failing.generate("s", &[]) {
            Err(GenerationError::Transient(message)) => assert!(message.contains("boom")),
            other => panic!("unexpected: {other:?}"),
        }

        let silent = CommandGenerator::from_command("true", Duration::from_secs(10)).unwrap();
        assert!(matches!(silent.generate("s", &[]), Err(GenerationError::Unparsable(_))));

        let slow = CommandGenerator::from_command("sleep 5", Duration::from_millis(100)).unwrap();
        assert_eq!(
            slow.generate("s", &[]),
            Err(GenerationError::Timeout(Duration::from_millis(100)))
        );

        let missing =
            CommandGenerator::from_command("/nonexistent/sforge-lm", Duration::from_secs(1)).unwrap();
        assert!(matches!(missing.generate("s", &[]), Err(GenerationError::Fatal(_))));
    }
}
