//! Anthropic Messages API (`/v1/messages`).
//!
//! See <https://docs.anthropic.com/en/api/messages> and
//! <https://docs.anthropic.com/en/docs/build-with-claude/streaming>.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesResponse {
	pub id: String,
	#[serde(rename = "type", default = "message_type")]
	pub r#type: String,
	#[serde(default = "assistant_role")]
	pub role: String,
	#[serde(default)]
	pub content: Vec<ContentBlock>,
	#[serde(default)]
	pub model: String,
	#[serde(default)]
	pub stop_reason: Option<String>,
	#[serde(default)]
	pub stop_sequence: Option<String>,
	#[serde(default)]
	pub usage: Usage,
}

fn message_type() -> String {
	"message".to_string()
}

fn assistant_role() -> String {
	"assistant".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub input_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub output_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_creation_input_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_read_input_tokens: Option<u64>,
}

/// Usage on a `message_delta` event. Every counter is optional; only reported ones change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeltaUsage {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub input_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub output_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_creation_input_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_read_input_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
	Text {
		text: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		citations: Option<Value>,
	},
	ToolUse {
		id: String,
		name: String,
		#[serde(default)]
		input: Value,
	},
	ServerToolUse {
		id: String,
		name: String,
		#[serde(default)]
		input: Value,
	},
	WebSearchToolResult {
		tool_use_id: String,
		#[serde(default)]
		content: Value,
	},
	SearchResult {
		#[serde(default)]
		source: String,
		#[serde(default)]
		title: String,
		#[serde(default)]
		content: Value,
	},
	Thinking {
		thinking: String,
		#[serde(default)]
		signature: String,
	},
	RedactedThinking {
		data: String,
	},
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagesStreamEvent {
	MessageStart {
		message: StreamMessage,
	},
	ContentBlockStart {
		index: usize,
		content_block: ContentBlock,
	},
	ContentBlockDelta {
		index: usize,
		delta: ContentBlockDelta,
	},
	ContentBlockStop {
		index: usize,
	},
	MessageDelta {
		#[serde(default)]
		delta: MessageDelta,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		usage: Option<MessageDeltaUsage>,
	},
	MessageStop,
	Ping,
	Error {
		error: MessagesError,
	},
	#[serde(other)]
	Unknown,
}

impl MessagesStreamEvent {
	/// The SSE `event:` name for this event.
	pub fn event_name(&self) -> &'static str {
		match self {
			MessagesStreamEvent::MessageStart { .. } => "message_start",
			MessagesStreamEvent::ContentBlockStart { .. } => "content_block_start",
			MessagesStreamEvent::ContentBlockDelta { .. } => "content_block_delta",
			MessagesStreamEvent::ContentBlockStop { .. } => "content_block_stop",
			MessagesStreamEvent::MessageDelta { .. } => "message_delta",
			MessagesStreamEvent::MessageStop => "message_stop",
			MessagesStreamEvent::Ping => "ping",
			MessagesStreamEvent::Error { .. } => "error",
			MessagesStreamEvent::Unknown => "unknown",
		}
	}
}

/// The partial message carried by `message_start`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
	#[serde(default)]
	pub id: String,
	#[serde(default)]
	pub model: String,
	#[serde(default)]
	pub content: Vec<ContentBlock>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDelta {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop_reason: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockDelta {
	TextDelta { text: String },
	InputJsonDelta { partial_json: String },
	ThinkingDelta { thinking: String },
	SignatureDelta { signature: String },
	CitationsDelta { citation: Value },
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesErrorResponse {
	#[serde(rename = "type")]
	pub r#type: String,
	pub error: MessagesError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesError {
	#[serde(rename = "type")]
	pub r#type: String,
	pub message: String,
}

impl MessagesErrorResponse {
	pub fn new(kind: &str, message: impl Into<String>) -> Self {
		MessagesErrorResponse {
			r#type: "error".to_string(),
			error: MessagesError {
				r#type: kind.to_string(),
				message: message.into(),
			},
		}
	}
}
