//! Where decoded requests, stream events and responses are reported for tracing.
//!
//! Translators call a [`Recorder`] unconditionally. Whether anything is actually recorded is
//! the recorder's decision: [`NoopRecorder`] stands in when tracing is disabled or the request
//! is not sampled.

use ::http::StatusCode;
use opentelemetry::KeyValue;
use opentelemetry::trace::{Span, Status};
use tracing::{debug, info};

use crate::llm::{LLMRequest, LLMResponse, StreamChunk};

pub trait Recorder: Send {
	fn record_request(&mut self, req: &LLMRequest, body: &[u8]);
	fn record_response_chunk(&mut self, chunk: StreamChunk<'_>);
	fn record_response(&mut self, resp: &LLMResponse);
	fn record_response_on_error(&mut self, status: StatusCode, body: &[u8]);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
	fn record_request(&mut self, _: &LLMRequest, _: &[u8]) {}
	fn record_response_chunk(&mut self, _: StreamChunk<'_>) {}
	fn record_response(&mut self, _: &LLMResponse) {}
	fn record_response_on_error(&mut self, _: StatusCode, _: &[u8]) {}
}

/// Reports through `tracing` events.
#[derive(Debug, Default, Clone)]
pub struct LogRecorder {
	chunks: usize,
}

impl Recorder for LogRecorder {
	fn record_request(&mut self, req: &LLMRequest, body: &[u8]) {
		info!(
			format = req.input_format.as_str(),
			model = %req.request_model,
			streaming = req.streaming,
			body_len = body.len(),
			"llm request"
		);
	}

	fn record_response_chunk(&mut self, chunk: StreamChunk<'_>) {
		self.chunks += 1;
		debug!(kind = chunk.kind(), n = self.chunks, "llm stream event");
	}

	fn record_response(&mut self, resp: &LLMResponse) {
		let usage = &resp.usage;
		info!(
			model = %resp.response_model,
			stop_reason = resp.stop_reason.as_deref(),
			input_tokens = usage.input(),
			output_tokens = usage.output(),
			cached_input_tokens = usage.cached_input(),
			cache_creation_input_tokens = usage.cache_creation_input(),
			total_tokens = usage.total(),
			content_blocks = resp.content.len(),
			chunks = self.chunks,
			"llm response"
		);
	}

	fn record_response_on_error(&mut self, status: StatusCode, body: &[u8]) {
		info!(
			status = status.as_u16(),
			body = %String::from_utf8_lossy(body),
			"llm error response"
		);
	}
}

/// Writes `gen_ai.*` attributes onto an OpenTelemetry span, and one event per stream chunk.
///
/// The span lifecycle belongs to the caller; this never ends the span.
#[derive(Debug)]
pub struct SpanRecorder<S> {
	span: S,
}

impl<S: Span + Send> SpanRecorder<S> {
	pub fn new(span: S) -> Self {
		SpanRecorder { span }
	}

	pub fn into_inner(self) -> S {
		self.span
	}
}

fn count(v: u64) -> i64 {
	i64::try_from(v).unwrap_or(i64::MAX)
}

impl<S: Span + Send> Recorder for SpanRecorder<S> {
	fn record_request(&mut self, req: &LLMRequest, _body: &[u8]) {
		self.span.set_attribute(KeyValue::new(
			"gen_ai.request.model",
			req.request_model.to_string(),
		));
		self.span.set_attribute(KeyValue::new(
			"gen_ai.operation.name",
			req.input_format.as_str(),
		));
		self.span.set_attribute(KeyValue::new("gen_ai.request.stream", req.streaming));
	}

	fn record_response_chunk(&mut self, chunk: StreamChunk<'_>) {
		self.span.add_event(
			"gen_ai.stream.event",
			vec![KeyValue::new("gen_ai.stream.event.type", chunk.kind())],
		);
	}

	fn record_response(&mut self, resp: &LLMResponse) {
		self.span.set_attribute(KeyValue::new(
			"gen_ai.response.model",
			resp.response_model.to_string(),
		));
		if let Some(reason) = &resp.stop_reason {
			self.span.set_attribute(KeyValue::new(
				"gen_ai.response.finish_reasons",
				reason.to_string(),
			));
		}
		let usage = &resp.usage;
		let counters = [
			("gen_ai.usage.input_tokens", usage.input()),
			("gen_ai.usage.output_tokens", usage.output()),
			("gen_ai.usage.cache_read.input_tokens", usage.cached_input()),
			(
				"gen_ai.usage.cache_creation.input_tokens",
				usage.cache_creation_input(),
			),
			("gen_ai.usage.total_tokens", usage.total()),
		];
		for (key, value) in counters {
			if let Some(v) = value {
				self.span.set_attribute(KeyValue::new(key, count(v)));
			}
		}
	}

	fn record_response_on_error(&mut self, status: StatusCode, body: &[u8]) {
		self
			.span
			.set_attribute(KeyValue::new("http.response.status_code", i64::from(status.as_u16())));
		self.span.set_status(Status::error(
			String::from_utf8_lossy(body).into_owned(),
		));
	}
}
