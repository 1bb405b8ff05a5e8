//! `reasoning` region – an OpenAI-compatible LLM behind dispatch.
//!
//! Talks to a model server exposing `/v1/chat/completions`, such as
//! [Ollama](https://ollama.com) (`http://localhost:11434`).
//!
//! | Operation | Arguments | Result |
//! |---|---|---|
//! | `reason` | `prompt`, `system`? | reply text |
//! | `propose_tasks` | `goal` | `[TaskProposal]` |
//! | `models` | – | model names from `/api/tags` |
//!
//! # Example
//!
//! ```rust,no_run
//! use cortex_runtime::regions::llm::{ChatMessage, LlmClient, Role};
//!
//! let client = LlmClient::new("http://localhost:11434", "llama3");
//! let messages = vec![ChatMessage::new(Role::User, "Summarise today's tasks.")];
//!
//! // Requires a running model server.
//! // let reply = client.complete(&messages, None).await.unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

use cortex_kernel::{CapabilityHandle, Region};
use cortex_types::{Args, CortexError, TaskProposal, Value};
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::{encode, REASONING};

/// System prompt used by `reason` when the caller supplies none.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are the reasoning region of a cognitive agent. Answer concisely and \
state assumptions explicitly.";

const PLANNER_PROMPT: &str = "\
You are a task planner. Break the user's goal into a short list of concrete \
tasks. Reply with JSON only, matching the provided schema. Use priority \
\"high\" only for blocking work.";

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from LLM client operations.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The HTTP request to the model server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response from the model server could not be parsed.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

impl From<LlmError> for CortexError {
    fn from(e: LlmError) -> Self {
        CortexError::fault(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

/// The role of a participant in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Structured reply requested by `propose_tasks`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskPlan {
    pub tasks: Vec<TaskProposal>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: Value,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// `response_format` payload constraining the reply to [`TaskPlan`].
fn task_plan_format() -> ResponseFormat {
    let schema = serde_json::to_value(schema_for!(TaskPlan)).unwrap_or(Value::Null);
    ResponseFormat {
        kind: "json_schema",
        json_schema: serde_json::json!({ "name": "task_plan", "schema": schema }),
    }
}

/// Decode a planner reply.  Accepts a `{"tasks": [...]}` object or a bare
/// array, optionally wrapped in a Markdown code fence.
pub fn parse_proposals(reply: &str) -> Result<Vec<TaskProposal>, LlmError> {
    let body = reply.trim();
    let body = body
        .strip_prefix("```json")
        .or_else(|| body.strip_prefix("```"))
        .and_then(|b| b.strip_suffix("```"))
        .unwrap_or(body)
        .trim();
    serde_json::from_str::<TaskPlan>(body)
        .map(|plan| plan.tasks)
        .or_else(|_| serde_json::from_str::<Vec<TaskProposal>>(body))
        .map_err(|e| LlmError::BadResponse(format!("task plan: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmClient
// ─────────────────────────────────────────────────────────────────────────────

/// An async client for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct LlmClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl LlmClient {
    /// Create a client pointing at `base_url` (e.g. `"http://localhost:11434"`)
    /// and using `model` (e.g. `"llama3"`).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Send `messages` and return the assistant's reply text.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the request fails, or
    /// [`LlmError::BadResponse`] if the response shape is unexpected.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        response_format: Option<ResponseFormat>,
    ) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            response_format,
        };
        let response: ChatResponse = self
            .post("/v1/chat/completions")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("empty choices array".into()))
    }

    /// Plain completion; a system prompt is prepended when `messages` has none.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
    ) -> Result<String, LlmError> {
        let mut conversation = messages.to_vec();
        if !conversation.iter().any(|m| m.role == Role::System) {
            conversation.insert(
                0,
                ChatMessage::new(Role::System, system.unwrap_or(DEFAULT_SYSTEM_PROMPT)),
            );
        }
        self.chat(&conversation, None).await
    }

    /// Ask the model to break `goal` into task proposals.
    pub async fn propose_tasks(&self, goal: &str) -> Result<Vec<TaskProposal>, LlmError> {
        let messages = [
            ChatMessage::new(Role::System, PLANNER_PROMPT),
            ChatMessage::new(Role::User, goal),
        ];
        let reply = self.chat(&messages, Some(task_plan_format())).await?;
        let proposals = parse_proposals(&reply)?;
        debug!(goal, proposals = proposals.len(), "task plan received");
        Ok(proposals)
    }

    /// Names of locally available models (Ollama `/api/tags`).
    pub async fn models(&self) -> Result<Vec<String>, LlmError> {
        let tags: TagsResponse = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Region
// ─────────────────────────────────────────────────────────────────────────────

/// Publishes an [`LlmClient`] as the `reasoning` region.
pub struct LlmRegion {
    client: LlmClient,
}

impl LlmRegion {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

impl Region for LlmRegion {
    fn capability(self: Arc<Self>) -> Result<CapabilityHandle, CortexError> {
        let reason = self.clone();
        let propose = self.clone();
        let models = self.clone();

        CapabilityHandle::builder(REASONING)
            .async_op("reason", move |args: Args| {
                let region = reason.clone();
                async move {
                    let prompt: String = args.required(0, "prompt")?;
                    let system: Option<String> = args.optional(1, "system")?;
                    let messages = [ChatMessage::new(Role::User, prompt)];
                    let reply = region.client.complete(&messages, system.as_deref()).await?;
                    Ok::<_, CortexError>(Value::from(reply))
                }
            })
            .async_op("propose_tasks", move |args: Args| {
                let region = propose.clone();
                async move {
                    let goal: String = args.required(0, "goal")?;
                    encode(&region.client.propose_tasks(&goal).await?)
                }
            })
            .async_op("models", move |_| {
                let region = models.clone();
                async move { encode(&region.client.models().await?) }
            })
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_types::PriorityClass;

    #[test]
    fn chat_message_serializes_role() {
        let json = serde_json::to_string(&ChatMessage::new(Role::System, "hello")).unwrap();
        assert!(json.contains("\"system\""));
    }

    #[test]
    fn request_omits_absent_response_format() {
        let messages = [ChatMessage::new(Role::User, "hi")];
        let body = ChatRequest {
            model: "llama3",
            messages: &messages,
            stream: false,
            response_format: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("response_format").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn task_plan_schema_names_priority_classes() {
        let format = task_plan_format();
        let text = format.json_schema.to_string();
        assert!(text.contains("task_plan"));
        assert!(text.contains("\"high\""));
        assert!(text.contains("\"low\""));
    }

    #[test]
    fn proposals_parse_from_object_array_and_fence() {
        let object = r#"{"tasks":[{"name":"Prepare Dataset","priority":"high"}]}"#;
        let parsed = parse_proposals(object).unwrap();
        assert_eq!(parsed[0].name, "Prepare Dataset");
        assert_eq!(parsed[0].priority, PriorityClass::High);

        let bare = r#"[{"name":"Train","priority":"normal"}]"#;
        assert_eq!(parse_proposals(bare).unwrap().len(), 1);

        let fenced = "```json\n[{\"name\":\"Eval\",\"priority\":\"low\"}]\n```";
        assert_eq!(parse_proposals(fenced).unwrap()[0].name, "Eval");

        assert!(matches!(
            parse_proposals("sure! here are some tasks"),
            Err(LlmError::BadResponse(_))
        ));
    }

    #[test]
    fn debug_redacts_api_key() {
        let client = LlmClient::new("http://localhost:11434/", "llama3")
            .with_api_key(Some("sk-secret".into()));
        let text = format!("{client:?}");
        assert!(!text.contains("sk-secret"));
        assert!(text.contains("http://localhost:11434\""));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_fault() {
        let region = Arc::new(LlmRegion::new(LlmClient::new("http://127.0.0.1:9", "none")));
        let handle = region.capability().unwrap();
        let models = handle.operation("models").unwrap();
        let err = models(Args::new()).await.unwrap_err();
        assert_eq!(err.kind(), "fault");
    }
}
