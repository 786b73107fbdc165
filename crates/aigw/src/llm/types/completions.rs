//! OpenAI Chat Completions API (`/v1/chat/completions`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
	#[serde(default)]
	pub id: String,
	#[serde(default)]
	pub object: String,
	#[serde(default)]
	pub created: u64,
	#[serde(default)]
	pub model: String,
	#[serde(default)]
	pub choices: Vec<Choice>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
	#[serde(default)]
	pub index: u32,
	pub message: ResponseMessage,
	#[serde(default)]
	pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
	#[serde(default)]
	pub role: String,
	#[serde(default)]
	pub content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reasoning_content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
	pub id: String,
	#[serde(rename = "type", default = "function_type")]
	pub r#type: String,
	pub function: FunctionCall,
}

fn function_type() -> String {
	"function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
	pub name: String,
	#[serde(default)]
	pub arguments: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prompt_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completion_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTokensDetails {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cached_tokens: Option<u64>,
}

/// One `chat.completion.chunk`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamResponse {
	#[serde(default)]
	pub id: String,
	#[serde(default)]
	pub model: String,
	#[serde(default)]
	pub choices: Vec<ChatChoiceStream>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatChoiceStream {
	#[serde(default)]
	pub index: u32,
	#[serde(default)]
	pub delta: StreamResponseDelta,
	#[serde(default)]
	pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamResponseDelta {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reasoning_content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCallChunk>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallChunk {
	#[serde(default)]
	pub index: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub function: Option<FunctionCallStream>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallStream {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub arguments: Option<String>,
}

/// A decoded `data:` payload of a completions stream.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionsStreamEvent {
	Chunk(StreamResponse),
	/// The `[DONE]` terminator.
	Done,
}

impl CompletionsStreamEvent {
	pub const DONE: &'static [u8] = b"[DONE]";

	pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
		if data.trim_ascii() == Self::DONE {
			return Ok(CompletionsStreamEvent::Done);
		}
		serde_json::from_slice(data).map(CompletionsStreamEvent::Chunk)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionErrorResponse {
	#[serde(rename = "type", default = "error_type")]
	pub r#type: String,
	pub error: ChatCompletionError,
}

fn error_type() -> String {
	"error".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionError {
	#[serde(rename = "type")]
	pub r#type: String,
	pub message: String,
	#[serde(default)]
	pub code: Option<String>,
}
