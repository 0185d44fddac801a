use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::agent::tools::ToolDescriptor;
use crate::config::ChatModelConfig;
use crate::conversation::Speaker;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryMessage {
    pub role: Speaker,
    pub message: String,
}

/// A tool invocation requested by the model. Parameters are unvalidated here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub parameters: Map<String, Value>,
}

/// The endpoint may send `"parameters": null` for a call without arguments.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallResult {
    pub call: ToolCallRequest,
    pub outputs: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub preamble: String,
    /// Empty when the round only carries tool results.
    pub message: String,
    pub history: Vec<HistoryMessage>,
    pub tools: Vec<&'static ToolDescriptor>,
    pub tool_results: Vec<ToolCallResult>,
    pub temperature: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse>;
}

/// Client for a Cohere-style `/chat` endpoint.
#[derive(Clone)]
pub struct CohereChat {
    http: reqwest::Client,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl CohereChat {
    pub fn new(config: &ChatModelConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CohereChatResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallRequest>>,
}

fn tool_manifest(tools: &[&'static ToolDescriptor]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            let params: Map<String, Value> = t
                .parameters
                .iter()
                .map(|p| {
                    let def = json!({
                        "type": p.kind.as_str(),
                        "description": p.description,
                        "required": p.required,
                    });
                    (p.name.to_string(), def)
                })
                .collect();
            json!({
                "name": t.name,
                "description": t.description,
                "parameter_definitions": params,
            })
        })
        .collect()
}

fn request_body(req: &ChatRequest) -> Value {
    let mut body = json!({
        "model": req.model,
        "message": req.message,
        "preamble": req.preamble,
        "temperature": req.temperature,
        "chat_history": req.history,
    });
    if !req.tools.is_empty() {
        body["tools"] = json!(tool_manifest(&req.tools));
    }
    if !req.tool_results.is_empty() {
        body["tool_results"] = json!(req.tool_results);
    }
    body
}

#[async_trait]
impl LanguageModel for CohereChat {
    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        let url = format!("{}/chat", self.base_url.trim_end_matches('/'));
        let body = request_body(&req);
        let mut rb = self.http.post(url).json(&body);
        if let Some(key) = &self.api_key {
            rb = rb.bearer_auth(key);
        }
        let resp = rb.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("model call failed: {}: {}", status, detail);
        }
        let v: CohereChatResponse = resp.json().await?;
        Ok(ChatResponse { text: v.text, tool_calls: v.tool_calls.unwrap_or_default() })
    }
}

/// Replays canned responses in order and records every request.
#[cfg(test)]
#[derive(Default)]
pub struct ScriptedModel {
    responses: std::sync::Mutex<std::collections::VecDeque<ChatResponse>>,
    pub requests: std::sync::Mutex<Vec<ChatRequest>>,
}

#[cfg(test)]
impl ScriptedModel {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self { responses: std::sync::Mutex::new(responses.into()), requests: Default::default() }
    }

    pub fn text(text: &str) -> ChatResponse {
        ChatResponse { text: text.into(), tool_calls: Vec::new() }
    }

    pub fn call(name: &str, parameters: Value) -> ChatResponse {
        ChatResponse {
            text: String::new(),
            tool_calls: vec![ToolCallRequest {
                name: name.into(),
                parameters: parameters.as_object().cloned().unwrap_or_default(),
            }],
        }
    }

    pub fn recorded(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        self.requests.lock().unwrap().push(req);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))
    }
}
