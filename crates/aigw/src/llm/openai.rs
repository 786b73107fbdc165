use std::collections::BTreeMap;

use ::http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::llm::types::completions::{
	ChatChoiceStream, CompletionsStreamEvent, Response, ResponseMessage, Usage,
};
use crate::llm::{
	AIError, Content, ErrorResponse, HeaderMutation, LLMRequest, LLMResponse, Recorder,
	RequestMutation, ResponseBody, StreamChunk, TokenUsage, azureopenai, errors,
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
	const NAME: Strng = strng::literal!("openai");
}
pub const DEFAULT_HOST_STR: &str = "api.openai.com";
pub const DEFAULT_HOST: Strng = strng::literal!(DEFAULT_HOST_STR);
pub const DEFAULT_PATH: &str = "/v1/chat/completions";

/// OpenAI client to an OpenAI compatible backend.
#[derive(Debug)]
pub struct Translator {
	model_override: Option<Strng>,
	azure: Option<azureopenai::Provider>,
	request_model: Strng,
	lines: sse::LineBuffer,
	acc: CompletionsAccumulator,
}

impl Translator {
	pub fn new(provider: Provider) -> Self {
		Self::build(provider.model, None)
	}

	/// Same body rules, but deployments are addressed by path.
	pub fn azure(provider: azureopenai::Provider) -> Self {
		Self::build(provider.model.clone(), Some(provider))
	}

	fn build(model_override: Option<Strng>, azure: Option<azureopenai::Provider>) -> Self {
		Translator {
			model_override,
			azure,
			request_model: strng::EMPTY,
			lines: sse::LineBuffer::default(),
			acc: CompletionsAccumulator::default(),
		}
	}

	fn path(&self) -> Strng {
		match &self.azure {
			Some(p) => p.get_path_for_model(&self.request_model),
			None => strng::literal!(DEFAULT_PATH),
		}
	}
}

/// Streaming requests must ask for the trailing usage chunk, or a streamed response cannot be
/// accounted.
pub(super) fn include_stream_usage(body: &[u8]) -> Result<Option<Vec<u8>>, AIError> {
	#[derive(Deserialize)]
	struct StreamOptions {
		#[serde(default)]
		stream_options: Option<Map<String, Value>>,
	}
	let opts = serde_json::from_slice::<StreamOptions>(body)
		.map_err(AIError::RequestMarshal)?
		.stream_options
		.unwrap_or_default();
	if opts.get("include_usage") == Some(&Value::Bool(true)) {
		return Ok(None);
	}
	let mut opts = opts;
	opts.insert("include_usage".to_string(), Value::Bool(true));
	let value = serde_json::to_vec(&opts).map_err(AIError::RequestMarshal)?;
	json::set_field(body, "stream_options", &value)
		.map(Some)
		.map_err(AIError::RequestMarshal)
}

impl super::Translator for Translator {
	fn request(
		&mut self,
		req: &LLMRequest,
		force_body_mutation: bool,
	) -> Result<RequestMutation, AIError> {
		self.request_model = req.request_model.clone();
		let mut body = None;
		if let Some(model) = &self.model_override {
			body = Some(json::set_string_field(&req.body, "model", model).map_err(AIError::RequestMarshal)?);
			self.request_model = model.clone();
		}
		if req.streaming {
			let current = body.as_deref().unwrap_or(&req.body[..]);
			if let Some(b) = include_stream_usage(current)? {
				body = Some(b);
			}
		}
		Ok(RequestMutation::new(
			self.path(),
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
		let resp = serde_json::from_slice::<Response>(body).map_err(AIError::ResponseParsing)?;
		self.acc.set_response(resp);
		let out = self.snapshot();
		recorder.record_response(&out);
		Ok(ResponseBody {
			headers: vec![],
			body: None,
			usage: out.usage,
			response_model: out.response_model,
		})
	}

	fn response_chunk(
		&mut self,
		chunk: &[u8],
		recorder: &mut dyn Recorder,
	) -> Result<ResponseBody, AIError> {
		self.lines.extend(chunk)?;
		while let Some(line) = self.lines.next_line() {
			let Some(data) = sse::data_payload(&line) else {
				continue;
			};
			match CompletionsStreamEvent::decode(data) {
				Ok(event) => {
					recorder.record_response_chunk(StreamChunk::Completions(&event));
					self.acc.apply(&event);
				},
				Err(e) => debug!(error = %e, "skipping malformed stream line"),
			}
		}
		self.acc.usage.recompute_total();
		Ok(ResponseBody {
			headers: vec![],
			body: None,
			usage: self.acc.usage,
			response_model: super::response_model(&self.acc.model, &self.request_model),
		})
	}

	fn response_error(
		&mut self,
		status: StatusCode,
		headers: &HeaderMap,
		body: &[u8],
	) -> Result<ErrorResponse, AIError> {
		errors::openai_passthrough_or_wrap(status, headers, body)
	}

	fn snapshot(&self) -> LLMResponse {
		self.acc.snapshot(&self.request_model)
	}
}

pub(super) fn usage(u: &Usage) -> TokenUsage {
	let mut usage = TokenUsage::default();
	if let Some(v) = u.prompt_tokens {
		usage.set_input(v);
	}
	if let Some(v) = u.completion_tokens {
		usage.set_output(v);
	}
	if let Some(v) = u.total_tokens {
		usage.set_total(v);
	}
	if let Some(cached) = u
		.prompt_tokens_details
		.as_ref()
		.and_then(|d| d.cached_tokens)
	{
		usage.set_cached_input(cached);
	}
	usage
}

#[derive(Debug, Default)]
struct ToolCallState {
	id: String,
	name: String,
	arguments: String,
}

/// Canonical response state built from completion chunks or a whole completion.
///
/// Only the first choice is tracked.
#[derive(Debug, Default)]
pub(super) struct CompletionsAccumulator {
	model: Option<Strng>,
	stop_reason: Option<Strng>,
	usage: TokenUsage,
	text: Option<String>,
	reasoning: Option<String>,
	tool_calls: BTreeMap<u32, ToolCallState>,
}

impl CompletionsAccumulator {
	fn set_response(&mut self, resp: Response) {
		self.model = strng::non_empty(&resp.model);
		if let Some(u) = &resp.usage {
			self.usage.override_usage(usage(u));
		}
		if let Some(choice) = resp.choices.into_iter().find(|c| c.index == 0) {
			self.stop_reason = choice.finish_reason.as_deref().map(strng::new);
			let ResponseMessage {
				content,
				reasoning_content,
				tool_calls,
				..
			} = choice.message;
			self.text = content;
			self.reasoning = reasoning_content;
			for (i, call) in tool_calls.unwrap_or_default().into_iter().enumerate() {
				self.tool_calls.insert(
					i as u32,
					ToolCallState {
						id: call.id,
						name: call.function.name,
						arguments: call.function.arguments,
					},
				);
			}
		}
		self.usage.recompute_total();
	}

	fn apply(&mut self, event: &CompletionsStreamEvent) {
		let CompletionsStreamEvent::Chunk(chunk) = event else {
			return;
		};
		if let Some(model) = strng::non_empty(&chunk.model) {
			self.model = Some(model);
		}
		// The usage chunk comes last and carries the totals for the whole response.
		if let Some(u) = &chunk.usage {
			self.usage.override_usage(usage(u));
		}
		for choice in chunk.choices.iter().filter(|c| c.index == 0) {
			self.choice_delta(choice);
		}
	}

	fn choice_delta(&mut self, choice: &ChatChoiceStream) {
		let delta = &choice.delta;
		if let Some(text) = &delta.content {
			self.text.get_or_insert_default().push_str(text);
		}
		if let Some(reasoning) = &delta.reasoning_content {
			self.reasoning.get_or_insert_default().push_str(reasoning);
		}
		for call in delta.tool_calls.iter().flatten() {
			let state = self.tool_calls.entry(call.index).or_default();
			if let Some(id) = &call.id {
				state.id.clone_from(id);
			}
			if let Some(f) = &call.function {
				if let Some(name) = &f.name {
					state.name.push_str(name);
				}
				if let Some(args) = &f.arguments {
					state.arguments.push_str(args);
				}
			}
		}
		if let Some(reason) = &choice.finish_reason {
			self.stop_reason = Some(strng::new(reason));
		}
	}

	fn snapshot(&self, request_model: &Strng) -> LLMResponse {
		let mut content = Vec::new();
		if let Some(thinking) = &self.reasoning {
			content.push(Content::Thinking {
				thinking: thinking.clone(),
				signature: String::new(),
			});
		}
		if let Some(text) = &self.text {
			content.push(Content::Text { text: text.clone() });
		}
		for (index, call) in &self.tool_calls {
			content.push(Content::ToolCall {
				id: call.id.clone(),
				name: call.name.clone(),
				input: tool_input(*index, &call.arguments),
			});
		}
		LLMResponse {
			response_model: super::response_model(&self.model, request_model),
			content,
			stop_reason: self.stop_reason.clone(),
			usage: self.usage,
		}
	}
}

/// Arguments arrive as a JSON encoded string, possibly still incomplete mid-stream.
fn tool_input(index: u32, arguments: &str) -> Value {
	if arguments.trim().is_empty() {
		return Value::Object(Map::new());
	}
	serde_json::from_str(arguments).unwrap_or_else(|e| {
		debug!(index, error = %e, "tool arguments are not valid JSON yet");
		Value::String(arguments.to_string())
	})
}

#[cfg(test)]
#[path = "openai_tests.rs"]
mod tests;
