use ::http::{HeaderMap, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::BytesMut;
use percent_encoding::utf8_percent_encode;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::llm::anthropic::{MessagesAccumulator, decode_response};
use crate::llm::errors::{self, ErrorCategory};
use crate::llm::types::bedrock::{ErrorResponse as AwsErrorResponse, PayloadPart};
use crate::llm::types::messages::MessagesStreamEvent;
use crate::llm::{
	AIError, ErrorResponse, HeaderMutation, LLMRequest, LLMResponse, Recorder, RequestMutation,
	ResponseBody, StreamChunk,
};
use crate::parse::{aws_sse, sse};
use crate::{Strng, json, strng};

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Header AWS uses to name the exception behind an error response.
pub const X_AMZN_ERRORTYPE: &str = "x-amzn-errortype";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Provider {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<Strng>, // Optional: model override for Bedrock API path
	pub region: Strng, // Required: AWS region
}

impl super::Provider for Provider {
	const NAME: Strng = strng::literal!("aws.bedrock");
}

impl Provider {
	pub fn get_path_for_model(&self, streaming: bool, model: &str) -> Strng {
		let model = self.model.as_deref().unwrap_or(model);
		let model = utf8_percent_encode(model, crate::http::PATH_SEGMENT);
		if streaming {
			strng::format!("/model/{model}/invoke-with-response-stream")
		} else {
			strng::format!("/model/{model}/invoke")
		}
	}

	pub fn get_host(&self) -> Strng {
		strng::format!("bedrock-runtime.{}.amazonaws.com", self.region)
	}

	/// InvokeModel takes the model in the path and the streaming mode from the operation, and
	/// rejects either in the body.
	pub fn prepare_anthropic_request_body(&self, body: &[u8]) -> Result<Vec<u8>, AIError> {
		let mut body = body.to_vec();
		for field in ["model", "stream"] {
			if let Some(b) = json::remove_field(&body, field).map_err(AIError::RequestMarshal)? {
				body = b;
			}
		}
		json::set_string_field(&body, "anthropic_version", ANTHROPIC_VERSION)
			.map_err(AIError::RequestMarshal)
	}
}

/// Anthropic client to Anthropic models on Bedrock.
///
/// Bedrock streams Anthropic events wrapped in AWS event-stream frames; they are unwrapped and
/// re-emitted as SSE so the client sees the native Anthropic stream.
#[derive(Debug)]
pub struct Translator {
	provider: Provider,
	request_model: Strng,
	streaming: bool,
	frames: aws_sse::FrameBuffer,
	acc: MessagesAccumulator,
}

impl Translator {
	pub fn new(provider: Provider) -> Self {
		Translator {
			provider,
			request_model: strng::EMPTY,
			streaming: false,
			frames: aws_sse::FrameBuffer::default(),
			acc: MessagesAccumulator::default(),
		}
	}

	/// Unwrap one event-stream message into the Anthropic event it carries, if any.
	fn unwrap_message(&self, msg: &aws_smithy_types::event_stream::Message) -> Option<Vec<u8>> {
		match aws_sse::header(msg, aws_sse::MESSAGE_TYPE) {
			Some("event") => {},
			Some(kind @ ("exception" | "error")) => {
				let name = aws_sse::header(msg, aws_sse::EXCEPTION_TYPE)
					.or_else(|| aws_sse::header(msg, aws_sse::ERROR_CODE))
					.unwrap_or("unknown");
				let message = serde_json::from_slice::<AwsErrorResponse>(msg.payload())
					.map(|e| e.message)
					.unwrap_or_else(|_| errors::body_message(msg.payload()));
				warn!(kind, name, error = %message, "bedrock stream exception");
				return None;
			},
			other => {
				debug!(message_type = other, "skipping event-stream message");
				return None;
			},
		}
		match aws_sse::header(msg, aws_sse::EVENT_TYPE) {
			Some("chunk") => {},
			other => {
				debug!(event_type = other, "skipping event-stream event");
				return None;
			},
		}
		let part = match serde_json::from_slice::<PayloadPart>(msg.payload()) {
			Ok(p) => p,
			Err(e) => {
				debug!(error = %e, "skipping malformed chunk payload");
				return None;
			},
		};
		match STANDARD.decode(part.bytes.as_bytes()) {
			Ok(b) => Some(b),
			Err(e) => {
				debug!(error = %e, "skipping chunk with invalid base64");
				None
			},
		}
	}
}

impl super::Translator for Translator {
	fn request(
		&mut self,
		req: &LLMRequest,
		force_body_mutation: bool,
	) -> Result<RequestMutation, AIError> {
		self.streaming = req.streaming;
		self.request_model = self
			.provider
			.model
			.clone()
			.unwrap_or_else(|| req.request_model.clone());
		let body = self.provider.prepare_anthropic_request_body(&req.body)?;
		let path = self
			.provider
			.get_path_for_model(req.streaming, &req.request_model);
		Ok(RequestMutation::new(
			path,
			Some(body),
			req,
			force_body_mutation,
		))
	}

	fn response_headers(&mut self, _: &HeaderMap) -> Vec<HeaderMutation> {
		if self.streaming {
			vec![HeaderMutation::new(
				header::CONTENT_TYPE.as_str(),
				"text/event-stream",
			)]
		} else {
			vec![]
		}
	}

	fn response_body(
		&mut self,
		_: &HeaderMap,
		body: &[u8],
		recorder: &mut dyn Recorder,
	) -> Result<ResponseBody, AIError> {
		self.acc.set_response(decode_response(body)?);
		Ok(self.acc.finish_body(&self.request_model, recorder))
	}

	fn response_chunk(
		&mut self,
		chunk: &[u8],
		recorder: &mut dyn Recorder,
	) -> Result<ResponseBody, AIError> {
		self.frames.extend(chunk);
		let mut out = BytesMut::new();
		while let Some(msg) = self.frames.next_message()? {
			let Some(data) = self.unwrap_message(&msg) else {
				continue;
			};
			let event = match serde_json::from_slice::<MessagesStreamEvent>(&data) {
				Ok(e) => e,
				Err(e) => {
					debug!(error = %e, "skipping malformed stream event");
					continue;
				},
			};
			trace!(event = event.event_name(), "bedrock stream event");
			recorder.record_response_chunk(StreamChunk::Messages(&event));
			self.acc.apply(&event);
			out.extend_from_slice(&sse::encode_event(Some(event.event_name()), &data));
		}
		self.acc.usage.recompute_total();
		Ok(self.acc.progress(&self.request_model, Some(out.freeze())))
	}

	/// AWS errors never match the Anthropic schema, so they are always rewritten.
	fn response_error(
		&mut self,
		status: StatusCode,
		headers: &HeaderMap,
		body: &[u8],
	) -> Result<ErrorResponse, AIError> {
		let category = headers
			.get(X_AMZN_ERRORTYPE)
			.and_then(|v| v.to_str().ok())
			.and_then(ErrorCategory::from_aws_error_type)
			.unwrap_or_else(|| ErrorCategory::from_status(status));
		let message = serde_json::from_slice::<AwsErrorResponse>(body)
			.map(|e| e.message)
			.unwrap_or_else(|_| errors::body_message(body));
		errors::anthropic_error(category, message)
	}

	fn snapshot(&self) -> LLMResponse {
		self.acc.snapshot(&self.request_model)
	}
}

#[cfg(test)]
#[path = "bedrock_tests.rs"]
mod tests;
