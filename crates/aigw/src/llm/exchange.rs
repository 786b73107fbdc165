use ::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::http;
use crate::llm::{
	AIError, ErrorResponse, HeaderMutation, InputFormat, LLMRequest, LLMResponse, Recorder,
	RequestMutation, ResponseBody, Translator,
};

/// One HTTP exchange with a backend: the translator and recorder it owns, and the request
/// once it has been read.
///
/// Created when the request arrives and consumed by [`Exchange::finish`]; nothing in it is
/// shared with other exchanges.
pub struct Exchange {
	input_format: InputFormat,
	translator: Box<dyn Translator>,
	recorder: Box<dyn Recorder>,
	request: Option<LLMRequest>,
}

impl std::fmt::Debug for Exchange {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Exchange")
			.field("input_format", &self.input_format)
			.field("request", &self.request)
			.finish_non_exhaustive()
	}
}

impl Exchange {
	pub fn new(
		input_format: InputFormat,
		translator: Box<dyn Translator>,
		recorder: Box<dyn Recorder>,
	) -> Self {
		Exchange {
			input_format,
			translator,
			recorder,
			request: None,
		}
	}

	pub fn is_streaming(&self) -> bool {
		self.request.as_ref().is_some_and(|r| r.streaming)
	}

	pub fn llm_request(&self) -> Option<&LLMRequest> {
		self.request.as_ref()
	}

	pub fn request(
		&mut self,
		headers: HeaderMap,
		body: Bytes,
		force_body_mutation: bool,
	) -> Result<RequestMutation, AIError> {
		let req = LLMRequest::parse(self.input_format, headers, body)?;
		self.recorder.record_request(&req, &req.body);
		let mutation = self.translator.request(&req, force_body_mutation)?;
		self.request = Some(req);
		Ok(mutation)
	}

	pub fn response_headers(&mut self, headers: &HeaderMap) -> Vec<HeaderMutation> {
		self.translator.response_headers(headers)
	}

	pub fn response_body(&mut self, headers: &HeaderMap, body: &[u8]) -> Result<ResponseBody, AIError> {
		self
			.translator
			.response_body(headers, body, &mut *self.recorder)
	}

	/// Buffer `body` up to `limit` bytes, then decode it as a whole.
	pub async fn read_response_body<B>(
		&mut self,
		headers: &HeaderMap,
		body: B,
		limit: usize,
	) -> Result<ResponseBody, AIError>
	where
		B: http_body::Body,
		B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
	{
		let body = http::read_body_with_limit(body, limit).await?;
		self.response_body(headers, &body)
	}

	/// Feed a streamed body through the translator as it arrives.
	///
	/// Each item is the translator's replacement bytes when it produces any, and the backend's
	/// bytes otherwise. Errors from `body` are yielded unchanged.
	pub fn response_stream<'a, S, E>(&'a mut self, body: S) -> impl Stream<Item = Result<Bytes, E>> + 'a
	where
		S: Stream<Item = Result<Bytes, E>> + 'a,
		E: From<AIError> + 'a,
	{
		let Exchange {
			translator,
			recorder,
			..
		} = self;
		body.map(move |item| {
			let chunk = item?;
			let out = translator.response_chunk(&chunk, &mut **recorder)?;
			Ok(out.body.unwrap_or(chunk))
		})
	}

	pub fn response_error(
		&mut self,
		status: StatusCode,
		headers: &HeaderMap,
		body: &[u8],
	) -> Result<ErrorResponse, AIError> {
		self.recorder.record_response_on_error(status, body);
		self.translator.response_error(status, headers, body)
	}

	/// The final usage and response model. A streamed response is recorded here, once the
	/// stream is complete.
	pub fn finish(mut self) -> LLMResponse {
		let resp = self.translator.snapshot();
		if self.is_streaming() {
			self.recorder.record_response(&resp);
		}
		resp
	}
}
