use ::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::llm::types::completions::CompletionsStreamEvent;
use crate::llm::types::messages::MessagesStreamEvent;
use crate::{Strng, http, strng};

pub mod anthropic;
pub mod azureopenai;
pub mod bedrock;
pub mod errors;
pub mod exchange;
pub mod openai;
pub mod recorder;
pub mod types;
pub mod usage;
pub mod vertex;

pub use exchange::Exchange;
pub use recorder::Recorder;
pub use usage::TokenUsage;

/// The wire protocol the client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputFormat {
	/// OpenAI /v1/chat/completions
	#[serde(rename = "openAI", alias = "completions")]
	Completions,
	/// Anthropic /v1/messages
	#[serde(rename = "anthropic", alias = "messages")]
	Messages,
}

impl InputFormat {
	pub fn as_str(&self) -> &'static str {
		match self {
			InputFormat::Completions => "completions",
			InputFormat::Messages => "messages",
		}
	}
}

/// The resolved backend, and the settings needed to address it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AIProvider {
	Anthropic(anthropic::Provider),
	AwsAnthropic(bedrock::Provider),
	GcpAnthropic(vertex::Provider),
	OpenAI(openai::Provider),
	AzureOpenAI(azureopenai::Provider),
}

pub trait Provider {
	const NAME: Strng;
}

impl AIProvider {
	pub fn provider(&self) -> Strng {
		match self {
			AIProvider::Anthropic(_) => anthropic::Provider::NAME,
			AIProvider::AwsAnthropic(_) => bedrock::Provider::NAME,
			AIProvider::GcpAnthropic(_) => vertex::Provider::NAME,
			AIProvider::OpenAI(_) => openai::Provider::NAME,
			AIProvider::AzureOpenAI(_) => azureopenai::Provider::NAME,
		}
	}

	/// The upstream host. Azure has no default; its host comes from configuration only.
	pub fn host(&self) -> Option<Strng> {
		match self {
			AIProvider::Anthropic(_) => Some(anthropic::DEFAULT_HOST),
			AIProvider::AwsAnthropic(p) => Some(p.get_host()),
			AIProvider::GcpAnthropic(p) => Some(p.get_host()),
			AIProvider::OpenAI(_) => Some(openai::DEFAULT_HOST),
			AIProvider::AzureOpenAI(p) => p.get_host(),
		}
	}

	/// The configured model override, if any.
	pub fn override_model(&self) -> Option<Strng> {
		match self {
			AIProvider::Anthropic(p) => p.model.clone(),
			AIProvider::AwsAnthropic(p) => p.model.clone(),
			AIProvider::GcpAnthropic(p) => p.model.clone(),
			AIProvider::OpenAI(p) => p.model.clone(),
			AIProvider::AzureOpenAI(p) => p.model.clone(),
		}
	}
}

/// Pick the translator for a client protocol and a backend.
pub fn new_translator(
	input_format: InputFormat,
	provider: &AIProvider,
) -> Result<Box<dyn Translator>, AIError> {
	let t: Box<dyn Translator> = match (input_format, provider) {
		(InputFormat::Messages, AIProvider::Anthropic(p)) => Box::new(anthropic::Translator::new(p.clone())),
		(InputFormat::Messages, AIProvider::AwsAnthropic(p)) => Box::new(bedrock::Translator::new(p.clone())),
		(InputFormat::Messages, AIProvider::GcpAnthropic(p)) => Box::new(vertex::Translator::new(p.clone())),
		(InputFormat::Completions, AIProvider::OpenAI(p)) => Box::new(openai::Translator::new(p.clone())),
		(InputFormat::Completions, AIProvider::AzureOpenAI(p)) => Box::new(openai::Translator::azure(p.clone())),
		(input_format, provider) => {
			warn!(
				provider = %provider.provider(),
				format = input_format.as_str(),
				"no translator for this pairing"
			);
			return Err(AIError::UnsupportedConversion(strng::format!(
				"{} from {}",
				provider.provider(),
				input_format.as_str()
			)));
		},
	};
	Ok(t)
}

/// One request/response exchange with a backend, seen through the backend's protocol.
///
/// A translator is created per exchange and dropped when it completes. It holds the
/// trailing bytes of a partially read stream and the running usage, and is never shared.
pub trait Translator: Send {
	/// Rewrite the client's request for the backend.
	///
	/// With `force_body_mutation` the original body is returned even when nothing changed.
	fn request(
		&mut self,
		req: &LLMRequest,
		force_body_mutation: bool,
	) -> Result<RequestMutation, AIError>;

	/// Header changes for the backend's response headers.
	fn response_headers(&mut self, headers: &HeaderMap) -> Vec<HeaderMutation>;

	/// Decode a complete, successful response body.
	///
	/// The canonical response is recorded on `recorder` before returning.
	fn response_body(
		&mut self,
		headers: &HeaderMap,
		body: &[u8],
		recorder: &mut dyn Recorder,
	) -> Result<ResponseBody, AIError>;

	/// Consume the next bytes of a streamed response. Every complete event is recorded on
	/// `recorder` before it is applied.
	fn response_chunk(
		&mut self,
		chunk: &[u8],
		recorder: &mut dyn Recorder,
	) -> Result<ResponseBody, AIError>;

	/// Rewrite an error response into the client's error schema, if needed.
	fn response_error(
		&mut self,
		status: StatusCode,
		headers: &HeaderMap,
		body: &[u8],
	) -> Result<ErrorResponse, AIError>;

	/// The canonical response as known so far.
	fn snapshot(&self) -> LLMResponse;
}

#[derive(thiserror::Error, Debug)]
pub enum AIError {
	#[error("missing field: {0}")]
	MissingField(Strng),
	#[error("unsupported conversion to {0}")]
	UnsupportedConversion(Strng),
	#[error("response was too large")]
	ResponseTooLarge,
	#[error("failed to parse request: {0}")]
	RequestParsing(serde_json::Error),
	#[error("failed to marshal request: {0}")]
	RequestMarshal(serde_json::Error),
	#[error("failed to parse response: {0}")]
	ResponseParsing(serde_json::Error),
	#[error("failed to marshal response: {0}")]
	ResponseMarshal(serde_json::Error),
	#[error("malformed event stream: {0}")]
	EventStream(String),
	#[error("failed to read body: {0}")]
	Body(Box<dyn std::error::Error + Send + Sync>),
	#[error("stream error: {0}")]
	Io(#[from] std::io::Error),
}

impl From<AIError> for std::io::Error {
	fn from(e: AIError) -> Self {
		match e {
			AIError::Io(e) => e,
			e => std::io::Error::other(e),
		}
	}
}

/// The client's request, as read from its body.
#[derive(Debug, Clone)]
pub struct LLMRequest {
	pub input_format: InputFormat,
	pub request_model: Strng,
	pub streaming: bool,
	pub headers: HeaderMap,
	pub body: Bytes,
}

impl LLMRequest {
	pub fn parse(input_format: InputFormat, headers: HeaderMap, body: Bytes) -> Result<Self, AIError> {
		#[derive(Deserialize)]
		struct Fields {
			#[serde(default)]
			model: Option<String>,
			#[serde(default)]
			stream: Option<bool>,
		}
		let fields: Fields = serde_json::from_slice(&body).map_err(AIError::RequestParsing)?;
		let request_model = fields
			.model
			.as_deref()
			.and_then(strng::non_empty)
			.ok_or_else(|| AIError::MissingField(strng::literal!("model")))?;
		Ok(LLMRequest {
			input_format,
			request_model,
			streaming: fields.stream.unwrap_or_default(),
			headers,
			body,
		})
	}
}

/// Provider-agnostic view of a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMResponse {
	/// Never empty: falls back to the request model when the backend does not report one.
	pub response_model: Strng,
	pub content: Vec<Content>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop_reason: Option<Strng>,
	pub usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
	Text {
		text: String,
	},
	ToolCall {
		id: String,
		name: String,
		input: Value,
	},
	ServerToolCall {
		id: String,
		name: String,
		input: Value,
	},
	ToolResult {
		tool_use_id: String,
		content: Value,
	},
	SearchResult {
		source: String,
		title: String,
		content: Value,
	},
	Thinking {
		thinking: String,
		signature: String,
	},
	RedactedThinking {
		data: String,
	},
}

/// One decoded streaming event, in the backend's protocol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamChunk<'a> {
	Messages(&'a MessagesStreamEvent),
	Completions(&'a CompletionsStreamEvent),
}

impl StreamChunk<'_> {
	pub fn kind(&self) -> &'static str {
		match self {
			StreamChunk::Messages(e) => e.event_name(),
			StreamChunk::Completions(CompletionsStreamEvent::Chunk(_)) => "chat.completion.chunk",
			StreamChunk::Completions(CompletionsStreamEvent::Done) => "done",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderMutation {
	pub name: Strng,
	pub value: Strng,
}

impl HeaderMutation {
	pub fn new(name: &str, value: impl AsRef<str>) -> Self {
		HeaderMutation {
			name: strng::new(name),
			value: strng::new(value),
		}
	}
}

/// What to send upstream instead of the client's request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMutation {
	/// Applied in order.
	pub headers: Vec<HeaderMutation>,
	/// `None` forwards the original body.
	pub body: Option<Bytes>,
}

impl RequestMutation {
	/// The path header always; the body and its length only when there is a body to send.
	fn new(path: impl AsRef<str>, body: Option<Vec<u8>>, req: &LLMRequest, force: bool) -> Self {
		let body = match body {
			Some(b) => Some(Bytes::from(b)),
			None if force => Some(req.body.clone()),
			None => None,
		};
		let mut headers = vec![http::path(path)];
		if let Some(b) = &body {
			headers.push(http::content_length(b.len()));
		}
		RequestMutation { headers, body }
	}
}

/// Result of feeding a response body, or part of one, through a translator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseBody {
	pub headers: Vec<HeaderMutation>,
	/// Replacement bytes for the client. `None` forwards what the backend sent.
	pub body: Option<Bytes>,
	pub usage: TokenUsage,
	pub response_model: Strng,
}

/// A backend error, possibly rewritten for the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorResponse {
	pub headers: Vec<HeaderMutation>,
	/// `None` forwards the backend's error body unchanged.
	pub body: Option<Bytes>,
}

impl ErrorResponse {
	pub fn passthrough() -> Self {
		ErrorResponse::default()
	}
}

fn response_model(reported: &Option<Strng>, request_model: &Strng) -> Strng {
	reported.clone().unwrap_or_else(|| request_model.clone())
}
