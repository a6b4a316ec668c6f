//! Generic OpenAI-compatible provider.
//! Most LLM APIs follow the same `/v1/chat/completions` format, including its
//! `tool_calls` extension. This module maps content blocks to and from it.

use crate::providers::traits::{ChatRequest, ChatResponse, Provider, ProviderError, ToolChoice};
use crate::sessions::{ContentBlock, Message, Role};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A provider that speaks the OpenAI-compatible chat completions API.
pub struct OpenAiCompatibleProvider {
    pub(crate) name: String,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) auth_header: AuthStyle,
    client: Client,
    timeout_secs: u64,
}

/// How the provider expects the API key to be sent.
#[derive(Debug, Clone)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `x-api-key: <key>`
    XApiKey,
    /// Custom header name
    Custom(String),
}

const DEFAULT_TIMEOUT_SECS: u64 = 120;

impl OpenAiCompatibleProvider {
    pub fn new(name: &str, base_url: &str, api_key: Option<&str>, auth_style: AuthStyle) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(ToString::to_string),
            auth_header: auth_style,
            client: Client::builder()
                .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Build the full URL for chat completions, detecting if base_url already
    /// includes the path.
    fn chat_completions_url(&self) -> String {
        let has_full_endpoint = reqwest::Url::parse(&self.base_url)
            .map(|url| {
                url.path()
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            })
            .unwrap_or_else(|_| self.base_url.ends_with("/chat/completions"));

        if has_full_endpoint {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }

    fn apply_auth_header(
        &self,
        req: reqwest::RequestBuilder,
        api_key: &str,
    ) -> reqwest::RequestBuilder {
        match &self.auth_header {
            AuthStyle::Bearer => req.header("Authorization", format!("Bearer {api_key}")),
            AuthStyle::XApiKey => req.header("x-api-key", api_key),
            AuthStyle::Custom(header) => req.header(header, api_key),
        }
    }

    fn classify_send_error(&self, err: &reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout_secs)
        } else {
            ProviderError::Transient(format!("{}: {}", self.name, err))
        }
    }
}

// ── Wire types ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn plain(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunctionSpec,
}

#[derive(Debug, Serialize)]
struct ApiFunctionSpec {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ApiToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ApiMessage,
}

/// Flatten one content-block message into wire messages. Tool results each
/// become their own `role = "tool"` message.
fn to_api_messages(message: &Message) -> Vec<ApiMessage> {
    let mut out = Vec::new();
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    let text = message.text();
    let tool_calls: Vec<ApiToolCall> = message
        .tool_uses()
        .map(|(id, name, input)| ApiToolCall {
            id: Some(id.to_string()),
            kind: Some("function".to_string()),
            function: ApiFunction {
                name: name.to_string(),
                arguments: Some(input.to_string()),
            },
        })
        .collect();

    if !text.is_empty() || !tool_calls.is_empty() {
        out.push(ApiMessage {
            role: role.to_string(),
            content: if text.is_empty() { None } else { Some(text) },
            tool_calls,
            tool_call_id: None,
        });
    }

    for block in &message.content {
        if let ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } = block
        {
            let payload = if *is_error {
                serde_json::json!({ "error": content })
            } else {
                content.clone()
            };
            out.push(ApiMessage {
                role: "tool".to_string(),
                content: Some(payload.to_string()),
                tool_calls: Vec::new(),
                tool_call_id: Some(tool_use_id.clone()),
            });
        }
    }

    out
}

fn build_api_request(request: &ChatRequest) -> ApiChatRequest {
    let mut messages = Vec::new();
    if let Some(system) = &request.system_prompt {
        messages.push(ApiMessage::plain("system", system.clone()));
    }
    for message in &request.messages {
        messages.extend(to_api_messages(message));
    }

    let tools = request
        .tools
        .iter()
        .map(|spec| ApiTool {
            kind: "function",
            function: ApiFunctionSpec {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            },
        })
        .collect::<Vec<_>>();

    let tool_choice = match (&request.tool_choice, tools.is_empty()) {
        (_, true) => None,
        (ToolChoice::Auto, false) => None,
        (ToolChoice::Tool(name), false) => Some(serde_json::json!({
            "type": "function",
            "function": { "name": name }
        })),
    };

    ApiChatRequest {
        model: request.model.clone(),
        messages,
        temperature: request.temperature,
        tools,
        tool_choice,
    }
}

/// Convert the first choice into content blocks. Unparseable tool arguments
/// are passed through as a JSON string so schema validation rejects them.
fn parse_api_message(message: ApiMessage) -> ChatResponse {
    let mut content = Vec::new();
    if let Some(text) = message.content {
        if !text.trim().is_empty() {
            content.push(ContentBlock::text(text));
        }
    }
    for call in message.tool_calls {
        let raw = call.function.arguments.unwrap_or_else(|| "{}".to_string());
        let input = serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw));
        content.push(ContentBlock::ToolUse {
            id: call
                .id
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
            name: call.function.name,
            input,
        });
    }
    ChatResponse { content }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ProviderError::Fatal(format!(
                "{} API key not set. Set SWITCHYARD_API_KEY or api_key in config.toml.",
                self.name
            ))
        })?;

        let body = build_api_request(request);
        let url = self.chat_completions_url();

        let response = self
            .apply_auth_header(self.client.post(&url).json(&body), api_key)
            .send()
            .await
            .map_err(|e| self.classify_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
            let sanitized = super::sanitize_api_error(&text);
            let detail = format!("{} API error ({status}): {sanitized}", self.name);
            return Err(if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                ProviderError::RateLimited(detail)
            } else if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
                ProviderError::Transient(detail)
            } else {
                ProviderError::Fatal(detail)
            });
        }

        let parsed: ApiChatResponse = response
            .json()
            .await
            .map_err(|e| {
                ProviderError::Transient(format!("{}: invalid response body: {e}", self.name))
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| parse_api_message(choice.message))
            .ok_or_else(|| ProviderError::Transient(format!("No response from {}", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
