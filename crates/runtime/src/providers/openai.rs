//! OpenAI chat-completions backend. Also serves Ollama through its
//! OpenAI-compatible endpoint.

use crate::catalog::Declaration;
use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolSpec,
    Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const COMPLETIONS_PATH: &str = "/v1/chat/completions";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// A `{"type": "function", "function": {...}}` tool declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    kind: String,
    function: FunctionDeclaration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

impl Declaration for FunctionTool {
    fn from_spec(spec: &ToolSpec, schema: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionDeclaration {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: schema,
            },
        }
    }

    fn to_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.function.name.clone(),
            description: self.function.description.clone(),
            schema: self.function.parameters.clone(),
        }
    }

    fn name(&self) -> &str {
        &self.function.name
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [FunctionTool],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

fn no_tools(tools: &&[FunctionTool]) -> bool {
    tools.is_empty()
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &'static str, content: String) -> Self {
        Self {
            role,
            content: Some(content),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: ApiFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

/// Arguments travel as a JSON-encoded string.
#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    model: String,
    api_key: Option<String>,
    base_url: String,
    max_tokens: Option<u32>,
    label: &'static str,
}

impl OpenAiBackendBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: None,
            base_url: OPENAI_BASE_URL.to_string(),
            max_tokens: None,
            label: "openai",
        }
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Server root; `/v1/chat/completions` is appended.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn build(self) -> OpenAiBackend {
        OpenAiBackend {
            client: reqwest::Client::new(),
            model: self.model,
            api_key: self.api_key,
            url: format!("{}{COMPLETIONS_PATH}", self.base_url),
            max_tokens: self.max_tokens,
            label: self.label,
        }
    }
}

/// OpenAI chat-completions backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    model: String,
    api_key: Option<String>,
    url: String,
    max_tokens: Option<u32>,
    label: &'static str,
}

impl OpenAiBackend {
    pub fn builder(model: impl Into<String>) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(model)
    }

    /// A keyless backend for a local Ollama server.
    pub fn ollama(model: impl Into<String>, base_url: impl Into<String>) -> OpenAiBackend {
        let mut builder = OpenAiBackendBuilder::new(model).base_url(base_url);
        builder.label = "ollama";
        builder.build()
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// One message may become several: each tool result is its own
    /// `tool` message.
    fn message_to_api(msg: &Message, out: &mut Vec<ApiMessage>) {
        let role = Self::role_to_api(msg.role);
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut results = Vec::new();

        for part in &msg.parts {
            match part {
                Part::Text(t) => text.push_str(t),
                Part::ToolCall(call) => tool_calls.push(ApiToolCall {
                    id: call.id.clone(),
                    kind: function_kind(),
                    function: ApiFunctionCall {
                        name: call.name.clone(),
                        arguments: call.input.to_string(),
                    },
                }),
                Part::ToolResult(result) => results.push(ApiMessage {
                    role: "tool",
                    content: Some(result.content()),
                    tool_calls: Vec::new(),
                    tool_call_id: Some(result.tool_call_id().to_string()),
                }),
            }
        }

        out.extend(results);

        if !tool_calls.is_empty() {
            out.push(ApiMessage {
                role,
                content: (!text.is_empty()).then_some(text),
                tool_calls,
                tool_call_id: None,
            });
        } else if !text.is_empty() {
            out.push(ApiMessage::text(role, text));
        }
    }

    fn response_to_message(message: ApiResponseMessage) -> Result<Message, ModelError> {
        let mut parts = Vec::new();
        if let Some(text) = message.content.filter(|t| !t.is_empty()) {
            parts.push(Part::Text(text));
        }

        for call in message.tool_calls.unwrap_or_default() {
            let input = if call.function.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    ModelError::InvalidResponse(format!(
                        "arguments for `{}` are not JSON: {e}",
                        call.function.name
                    ))
                })?
            };
            parts.push(Part::ToolCall(ToolCall {
                id: call.id,
                name: call.function.name,
                input,
            }));
        }

        Ok(Message {
            role: Role::Assistant,
            parts,
        })
    }
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.label, self.model)
    }
}

impl Backend for OpenAiBackend {
    type Tool = FunctionTool;

    async fn call(
        &self,
        request: ModelRequest<'_, FunctionTool>,
    ) -> Result<ModelResponse, ModelError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system {
            messages.push(ApiMessage::text("system", system.to_string()));
        }
        for msg in request.messages {
            Self::message_to_api(msg, &mut messages);
        }

        let api_request = ApiRequest {
            model: &self.model,
            messages,
            tools: request.tools,
            max_tokens: self.max_tokens,
        };

        let mut req = self
            .client
            .post(&self.url)
            .header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".into()))?;

        let message = Self::response_to_message(choice.message)?;
        let usage = api_response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(ModelResponse { message, usage })
    }
}
