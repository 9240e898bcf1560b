use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub mod decode;
pub mod encode;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: String,
    /// Forwarded as received; only the array itself is checked.
    pub messages: Vec<Value>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(flatten)]
    pub extra_body: Map<String, Value>,
}

impl ChatRequest {
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendRequest {
    pub model: String,
    pub messages: Vec<Value>,
    pub temperature: f64,
    pub max_tokens: u64,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_template_kwargs: Option<ChatTemplateKwargs>,
    #[serde(flatten)]
    pub extra_body: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatTemplateKwargs {
    pub thinking: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendCompletion {
    #[serde(default)]
    pub choices: Option<Vec<BackendChoice>>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendChoice {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub message: Option<BackendMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(flatten)]
    pub extra_body: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantMessage {
    pub role: &'static str,
    pub content: String,
}

/// One `data:` payload of the backend's event stream.
///
/// Only the fields the transcoder touches are typed; everything else rides
/// along in the flattened maps and is re-emitted as received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<ChunkChoice>>,
    #[serde(flatten)]
    pub extra_body: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<BackendDelta>,
    #[serde(flatten)]
    pub extra_body: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendDelta {
    /// Outer `None`: key absent. `Some(None)`: explicit `null`.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<Option<String>>,
    #[serde(default, skip_serializing)]
    pub reasoning_content: Option<String>,
    #[serde(flatten)]
    pub extra_body: Map<String, Value>,
}

impl BackendChunk {
    pub fn first_delta_mut(&mut self) -> Option<&mut BackendDelta> {
        self.choices
            .as_mut()
            .and_then(|choices| choices.first_mut())
            .and_then(|choice| choice.delta.as_mut())
    }
}

fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
