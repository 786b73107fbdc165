use std::collections::HashMap;

use ::http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::types::messages::{
	ContentBlock, ContentBlockDelta, MessageDeltaUsage, MessagesResponse, MessagesStreamEvent, Usage,
};
use crate::llm::{
	AIError, Content, ErrorResponse, HeaderMutation, LLMRequest, LLMResponse, Recorder,
	RequestMutation, ResponseBody, StreamChunk, TokenUsage, errors,
};
use crate::parse::sse;
use crate::{Strng, json, strng};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Provider {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<Strng>,
}

impl super::Provider for Provider {
	const NAME: Strng = strng::literal!("anthropic");
}
pub const DEFAULT_HOST_STR: &str = "api.anthropic.com";
pub const DEFAULT_HOST: Strng = strng::literal!(DEFAULT_HOST_STR);
pub const DEFAULT_PATH: &str = "/v1/messages";

/// Anthropic client to an Anthropic backend.
#[derive(Debug)]
pub struct Translator {
	provider: Provider,
	request_model: Strng,
	stream: MessagesStream,
}

impl Translator {
	pub fn new(provider: Provider) -> Self {
		Translator {
			provider,
			request_model: strng::EMPTY,
			stream: MessagesStream::default(),
		}
	}
}

impl super::Translator for Translator {
	fn request(
		&mut self,
		req: &LLMRequest,
		force_body_mutation: bool,
	) -> Result<RequestMutation, AIError> {
		self.request_model = req.request_model.clone();
		let mut body = None;
		if let Some(model) = &self.provider.model {
			body = Some(json::set_string_field(&req.body, "model", model).map_err(AIError::RequestMarshal)?);
			self.request_model = model.clone();
		}
		Ok(RequestMutation::new(
			DEFAULT_PATH,
			body,
			req,
			force_body_mutation,
		))
	}

	fn response_headers(&mut self, _: &HeaderMap) -> Vec<HeaderMutation> {
		vec![]
	}

	fn response_body(
		&mut self,
		_: &HeaderMap,
		body: &[u8],
		recorder: &mut dyn Recorder,
	) -> Result<ResponseBody, AIError> {
		self.stream.acc.set_response(decode_response(body)?);
		Ok(self.stream.acc.finish_body(&self.request_model, recorder))
	}

	fn response_chunk(
		&mut self,
		chunk: &[u8],
		recorder: &mut dyn Recorder,
	) -> Result<ResponseBody, AIError> {
		self.stream.push(chunk, recorder)?;
		Ok(self.stream.acc.progress(&self.request_model, None))
	}

	fn response_error(
		&mut self,
		status: StatusCode,
		headers: &HeaderMap,
		body: &[u8],
	) -> Result<ErrorResponse, AIError> {
		errors::anthropic_passthrough_or_wrap(status, headers, body)
	}

	fn snapshot(&self) -> LLMResponse {
		self.stream.acc.snapshot(&self.request_model)
	}
}

pub(super) fn decode_response(body: &[u8]) -> Result<MessagesResponse, AIError> {
	serde_json::from_slice::<MessagesResponse>(body).map_err(AIError::ResponseParsing)
}

/// A Messages SSE body, decoded as it arrives.
#[derive(Debug, Default)]
pub(super) struct MessagesStream {
	lines: sse::LineBuffer,
	pub(super) acc: MessagesAccumulator,
}

impl MessagesStream {
	pub(super) fn push(&mut self, chunk: &[u8], recorder: &mut dyn Recorder) -> Result<(), AIError> {
		self.lines.extend(chunk)?;
		while let Some(line) = self.lines.next_line() {
			let Some(data) = sse::data_payload(&line) else {
				continue;
			};
			match serde_json::from_slice::<MessagesStreamEvent>(data) {
				Ok(event) => {
					recorder.record_response_chunk(StreamChunk::Messages(&event));
					self.acc.apply(&event);
				},
				Err(e) => debug!(error = %e, "skipping malformed stream line"),
			}
		}
		self.acc.usage.recompute_total();
		Ok(())
	}
}

/// Raw Anthropic counters, kept so that a delta reporting only some of them can rebuild the
/// normalised input count.
#[derive(Debug, Default, Clone, Copy)]
struct RawInput {
	input: Option<u64>,
	cache_read: Option<u64>,
	cache_creation: Option<u64>,
}

impl RawInput {
	fn total(&self) -> u64 {
		self
			.input
			.unwrap_or_default()
			.saturating_add(self.cache_read.unwrap_or_default())
			.saturating_add(self.cache_creation.unwrap_or_default())
	}

	fn is_known(&self) -> bool {
		self.input.is_some() || self.cache_read.is_some() || self.cache_creation.is_some()
	}
}

/// How far past the last seen block a new block index may land.
const MAX_BLOCK_GAP: usize = 64;

/// Canonical response state built from Anthropic events or a whole Anthropic body.
#[derive(Debug, Default)]
pub(super) struct MessagesAccumulator {
	model: Option<Strng>,
	stop_reason: Option<Strng>,
	pub(super) usage: TokenUsage,
	raw: RawInput,
	/// Set once a `message_delta` has reported usage. From then on `message_start` may only
	/// fill counters that are still unset.
	usage_updated: bool,
	content: Vec<Option<Content>>,
	partial_json: HashMap<usize, String>,
}

impl MessagesAccumulator {
	/// Input tokens are reported net of cache reads and writes; count all of them as input.
	fn baseline(&mut self, u: &Usage) {
		self.raw = RawInput {
			input: u.input_tokens,
			cache_read: u.cache_read_input_tokens,
			cache_creation: u.cache_creation_input_tokens,
		};
		let mut usage = TokenUsage::default();
		if self.raw.is_known() {
			usage.set_input(self.raw.total());
		}
		if let Some(v) = u.output_tokens {
			usage.set_output(v);
		}
		if let Some(v) = u.cache_read_input_tokens {
			usage.set_cached_input(v);
		}
		if let Some(v) = u.cache_creation_input_tokens {
			usage.set_cache_creation_input(v);
		}
		self.usage.override_usage(usage);
	}

	/// A restated `message_start` after deltas: keep what the deltas reported.
	fn fill_unset(&mut self, u: &Usage) {
		self.raw.input = self.raw.input.or(u.input_tokens);
		self.raw.cache_read = self.raw.cache_read.or(u.cache_read_input_tokens);
		self.raw.cache_creation = self.raw.cache_creation.or(u.cache_creation_input_tokens);
		if self.usage.input().is_none() && self.raw.is_known() {
			self.usage.set_input(self.raw.total());
		}
		if let (None, Some(v)) = (self.usage.output(), u.output_tokens) {
			self.usage.set_output(v);
		}
		if let (None, Some(v)) = (self.usage.cached_input(), self.raw.cache_read) {
			self.usage.set_cached_input(v);
		}
		if let (None, Some(v)) = (self.usage.cache_creation_input(), self.raw.cache_creation) {
			self.usage.set_cache_creation_input(v);
		}
	}

	fn delta(&mut self, u: &MessageDeltaUsage) {
		self.usage_updated |= u.input_tokens.is_some()
			|| u.output_tokens.is_some()
			|| u.cache_read_input_tokens.is_some()
			|| u.cache_creation_input_tokens.is_some();
		if let Some(v) = u.output_tokens {
			self.usage.set_output(v);
		}
		if let Some(v) = u.cache_read_input_tokens {
			self.raw.cache_read = Some(v);
			self.usage.set_cached_input(v);
		}
		if let Some(v) = u.cache_creation_input_tokens {
			self.raw.cache_creation = Some(v);
			self.usage.set_cache_creation_input(v);
		}
		if let Some(v) = u.input_tokens {
			self.raw.input = Some(v);
		}
		if u.input_tokens.is_some()
			|| u.cache_read_input_tokens.is_some()
			|| u.cache_creation_input_tokens.is_some()
		{
			self.usage.set_input(self.raw.total());
		}
	}

	pub(super) fn set_response(&mut self, resp: MessagesResponse) {
		self.model = strng::non_empty(&resp.model);
		self.stop_reason = resp.stop_reason.as_deref().map(strng::new);
		self.baseline(&resp.usage);
		self.content = resp.content.iter().map(content).collect();
		self.usage.recompute_total();
	}

	pub(super) fn apply(&mut self, event: &MessagesStreamEvent) {
		match event {
			MessagesStreamEvent::MessageStart { message } => {
				if let Some(model) = strng::non_empty(&message.model) {
					self.model = Some(model);
				}
				match &message.usage {
					Some(u) if self.usage_updated => self.fill_unset(u),
					Some(u) => self.baseline(u),
					None => {},
				}
			},
			MessagesStreamEvent::ContentBlockStart {
				index,
				content_block,
			} => {
				if let Some(slot) = self.slot(*index) {
					*slot = content(content_block);
				}
			},
			MessagesStreamEvent::ContentBlockDelta { index, delta } => self.block_delta(*index, delta),
			MessagesStreamEvent::ContentBlockStop { index } => self.block_stop(*index),
			MessagesStreamEvent::MessageDelta { delta, usage } => {
				if let Some(reason) = &delta.stop_reason {
					self.stop_reason = Some(strng::new(reason));
				}
				if let Some(u) = usage {
					self.delta(u);
				}
			},
			MessagesStreamEvent::MessageStop
			| MessagesStreamEvent::Ping
			| MessagesStreamEvent::Error { .. }
			| MessagesStreamEvent::Unknown => {},
		}
	}

	fn in_range(&self, index: usize) -> bool {
		index < self.content.len() || index - self.content.len() <= MAX_BLOCK_GAP
	}

	/// The block at `index`, growing the list to reach it. `None` for an index too far past
	/// the blocks seen so far; the event is skipped.
	fn slot(&mut self, index: usize) -> Option<&mut Option<Content>> {
		if !self.in_range(index) {
			debug!(index, blocks = self.content.len(), "content block index out of range");
			return None;
		}
		if self.content.len() <= index {
			self.content.resize(index + 1, None);
		}
		self.content.get_mut(index)
	}

	fn block_delta(&mut self, index: usize, delta: &ContentBlockDelta) {
		match delta {
			ContentBlockDelta::TextDelta { text } => match self.slot(index) {
				Some(Some(Content::Text { text: t })) => t.push_str(text),
				Some(slot @ None) => {
					*slot = Some(Content::Text { text: text.clone() });
				},
				Some(_) => debug!(index, "text delta for a non-text block"),
				None => {},
			},
			ContentBlockDelta::ThinkingDelta { thinking } => match self.slot(index) {
				Some(Some(Content::Thinking { thinking: t, .. })) => t.push_str(thinking),
				Some(slot @ None) => {
					*slot = Some(Content::Thinking {
						thinking: thinking.clone(),
						signature: String::new(),
					});
				},
				Some(_) => debug!(index, "thinking delta for a non-thinking block"),
				None => {},
			},
			ContentBlockDelta::SignatureDelta { signature } => {
				if let Some(Some(Content::Thinking { signature: s, .. })) = self.slot(index) {
					s.push_str(signature);
				}
			},
			ContentBlockDelta::InputJsonDelta { partial_json } => {
				if !self.in_range(index) {
					debug!(index, blocks = self.content.len(), "content block index out of range");
					return;
				}
				self
					.partial_json
					.entry(index)
					.or_default()
					.push_str(partial_json);
			},
			ContentBlockDelta::CitationsDelta { .. } | ContentBlockDelta::Unknown => {},
		}
	}

	fn block_stop(&mut self, index: usize) {
		let Some(partial) = self.partial_json.remove(&index) else {
			return;
		};
		if partial.trim().is_empty() {
			return;
		}
		match self.content.get_mut(index) {
			Some(Some(Content::ToolCall { input, .. } | Content::ServerToolCall { input, .. })) => {
				match serde_json::from_str(&partial) {
					Ok(v) => *input = v,
					Err(e) => debug!(index, error = %e, "tool input is not valid JSON"),
				}
			},
			_ => debug!(index, "input delta for a block that takes no input"),
		}
	}

	pub(super) fn snapshot(&self, request_model: &Strng) -> LLMResponse {
		LLMResponse {
			response_model: super::response_model(&self.model, request_model),
			content: self.content.iter().flatten().cloned().collect(),
			stop_reason: self.stop_reason.clone(),
			usage: self.usage,
		}
	}

	pub(super) fn progress(&self, request_model: &Strng, body: Option<bytes::Bytes>) -> ResponseBody {
		ResponseBody {
			headers: vec![],
			body,
			usage: self.usage,
			response_model: super::response_model(&self.model, request_model),
		}
	}

	/// Record the decoded whole-body response and report it.
	pub(super) fn finish_body(&self, request_model: &Strng, recorder: &mut dyn Recorder) -> ResponseBody {
		let resp = self.snapshot(request_model);
		recorder.record_response(&resp);
		ResponseBody {
			headers: vec![],
			body: None,
			usage: resp.usage,
			response_model: resp.response_model,
		}
	}
}

pub(super) fn content(block: &ContentBlock) -> Option<Content> {
	Some(match block {
		ContentBlock::Text { text, .. } => Content::Text { text: text.clone() },
		ContentBlock::ToolUse { id, name, input } => Content::ToolCall {
			id: id.clone(),
			name: name.clone(),
			input: input.clone(),
		},
		ContentBlock::ServerToolUse { id, name, input } => Content::ServerToolCall {
			id: id.clone(),
			name: name.clone(),
			input: input.clone(),
		},
		ContentBlock::WebSearchToolResult {
			tool_use_id,
			content,
		} => Content::ToolResult {
			tool_use_id: tool_use_id.clone(),
			content: content.clone(),
		},
		ContentBlock::SearchResult {
			source,
			title,
			content,
		} => Content::SearchResult {
			source: source.clone(),
			title: title.clone(),
			content: content.clone(),
		},
		ContentBlock::Thinking {
			thinking,
			signature,
		} => Content::Thinking {
			thinking: thinking.clone(),
			signature: signature.clone(),
		},
		ContentBlock::RedactedThinking { data } => Content::RedactedThinking { data: data.clone() },
		ContentBlock::Unknown => return None,
	})
}

#[cfg(test)]
#[path = "anthropic_tests.rs"]
mod tests;
