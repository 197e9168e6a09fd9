//! OpenAI-compatible chat-completions backend.
use super::{Message, Role, TextGenerator};
use crate::error::GenerationError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const COMPLETIONS_PATH: &str = "/v1/chat/completions";
const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone)]
pub struct HttpGenerator {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpGenerator {
    /// `base_url` is the server root, e.g. `http://localhost:11434`; a URL that
    /// already ends in the completions path is used as is.
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            endpoint: completions_endpoint(base_url),
            model: model.to_string(),
            api_key,
            timeout,
            agent: config.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TextGenerator for HttpGenerator {
    fn generate(&self, system_prompt: &str, history: &[Message]) -> Result<String, GenerationError> {
        let request = build_request(&self.model, system_prompt, history);
        let start = Instant::now();

        let mut call = self.agent.post(&self.endpoint);
        if let Some(key) = &self.api_key {
            call = call.header("Authorization", format!("Bearer {key}"));
        }
        let mut response = call.send_json(&request).map_err(|err| self.classify_error(err))?;
        let status = response.status().as_u16();
        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            status,
            model = %self.model,
            "lm http call complete"
        );

        if !(200..300).contains(&status) {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        let parsed: ChatResponse = response
            .body_mut()
            .read_json()
            .map_err(|err| GenerationError::Unparsable(format!("decode chat response: {err}")))?;
        response_text(parsed)
    }
}

impl HttpGenerator {
    fn classify_error(&self, err: ureq::Error) -> GenerationError {
        match err {
            ureq::Error::Timeout(_) => GenerationError::Timeout(self.timeout),
            ureq::Error::StatusCode(code) => classify_status(code, ""),
            ureq::Error::Io(_) | ureq::Error::ConnectionFailed => {
                GenerationError::Transient(format!("{}: {err}", self.endpoint))
            }
            other => GenerationError::Fatal(format!("{}: {other}", self.endpoint)),
        }
    }
}

fn completions_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with(COMPLETIONS_PATH) {
        base.to_string()
    } else {
        format!("{base}{COMPLETIONS_PATH}")
    }
}

fn build_request<'a>(model: &'a str, system_prompt: &'a str, history: &'a [Message]) -> ChatRequest<'a> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage {
        role: Role::System.as_str(),
        content: system_prompt,
    });
    messages.extend(history.iter().map(|message| ChatMessage {
        role: message.role.as_str(),
        content: &message.content,
    }));
    ChatRequest {
        model,
        messages,
        temperature: DEFAULT_TEMPERATURE,
        stream: false,
    }
}

/// 429 and 5xx may clear up on their own; other statuses will not.
fn classify_status(status: u16, body: &str) -> GenerationError {
    let detail = format!("HTTP {status}: {}", body.trim());
    if status == 429 || (500..600).contains(&status) {
        GenerationError::Transient(detail)
    } else {
        GenerationError::Fatal(detail)
    }
}

fn response_text(response: ChatResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| GenerationError::Unparsable("chat response has no content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_completions_path_once() {
        assert_eq!(
            completions_endpoint("http://localhost:11434/"),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            completions_endpoint("http://host/v1/chat/completions"),
            "http://host/v1/chat/completions"
        );
    }

    #[test]
    fn request_puts_system_prompt_first() {
        let history = [Message::user("a cabin"), Message::assistant("ok")];
        let request = build_request("llama3", "be brief", &history);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "llama3");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][0]["content"], "be brief");
        assert_eq!(value["messages"][2]["role"], "assistant");
        assert_eq!(value["stream"], false);
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(429, "").is_transient());
        assert!(classify_status(503, "busy").is_transient());
        assert!(matches!(classify_status(401, "nope"), GenerationError::Fatal(_)));
        assert!(matches!(classify_status(404, ""), GenerationError::Fatal(_)));
    }

    #[test]
    fn extracts_first_choice_content() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#).unwrap();
        assert_eq!(response_text(parsed).unwrap(), "hi");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(response_text(empty), Err(GenerationError::Unparsable(_))));
    }
}
