use ::http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

use crate::llm::anthropic::{MessagesStream, decode_response};
use crate::llm::errors::{self, ErrorCategory};
use crate::llm::types::vertex::ErrorResponse as GcpErrorResponse;
use crate::llm::{
	AIError, ErrorResponse, HeaderMutation, LLMRequest, LLMResponse, Recorder, RequestMutation,
	ResponseBody,
};
use crate::{Strng, http, json, strng};

const ANTHROPIC_VERSION: &str = "vertex-2023-10-16";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Provider {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<Strng>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub region: Option<Strng>,
	pub project_id: Strng,
}

impl super::Provider for Provider {
	const NAME: Strng = strng::literal!("gcp.vertex_ai");
}

impl Provider {
	/// Accepts bare model names as well as `publishers/anthropic/models/` or `anthropic/`
	/// qualified ones.
	fn anthropic_model(&self, request_model: &str) -> Strng {
		let model = self.model.as_deref().unwrap_or(request_model);
		strng::new(
			model
				.strip_prefix("publishers/anthropic/models/")
				.or_else(|| model.strip_prefix("anthropic/"))
				.unwrap_or(model),
		)
	}

	pub fn get_path_for_model(&self, request_model: &str, streaming: bool) -> Strng {
		let location = self
			.region
			.clone()
			.unwrap_or_else(|| strng::literal!("global"));
		strng::format!(
			"/v1/projects/{}/locations/{}/publishers/anthropic/models/{}:{}",
			self.project_id,
			location,
			self.anthropic_model(request_model),
			if streaming {
				"streamRawPredict"
			} else {
				"rawPredict"
			}
		)
	}

	pub fn get_host(&self) -> Strng {
		match &self.region {
			Some(region) if region != "global" => {
				strng::format!("{region}-aiplatform.googleapis.com")
			},
			_ => {
				strng::literal!("aiplatform.googleapis.com")
			},
		}
	}

	/// The model moves into the path; `anthropic_version` is required in the body.
	pub fn prepare_anthropic_request_body(&self, body: &[u8]) -> Result<Vec<u8>, AIError> {
		let body = json::remove_field(body, "model")
			.map_err(AIError::RequestMarshal)?
			.unwrap_or_else(|| body.to_vec());
		json::set_string_field(&body, "anthropic_version", ANTHROPIC_VERSION)
			.map_err(AIError::RequestMarshal)
	}
}

/// Anthropic client to Anthropic models on Vertex AI.
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
		self.request_model = self
			.provider
			.model
			.clone()
			.unwrap_or_else(|| req.request_model.clone());
		let body = self.provider.prepare_anthropic_request_body(&req.body)?;
		let path = self
			.provider
			.get_path_for_model(&req.request_model, req.streaming);
		Ok(RequestMutation::new(
			path,
			Some(body),
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

	/// Errors raised by the model are already Anthropic shaped. Errors raised by the Google
	/// front end use the Google envelope and are rewritten, as is anything that is not JSON.
	fn response_error(
		&mut self,
		status: StatusCode,
		headers: &HeaderMap,
		body: &[u8],
	) -> Result<ErrorResponse, AIError> {
		let category = ErrorCategory::from_status(status);
		if !http::is_json_content_type(headers) {
			return errors::anthropic_error(category, errors::body_message(body));
		}
		match serde_json::from_slice::<GcpErrorResponse>(body) {
			Ok(gcp) => errors::anthropic_error(category, gcp.error.message),
			Err(_) => Ok(ErrorResponse::passthrough()),
		}
	}

	fn snapshot(&self) -> LLMResponse {
		self.stream.acc.snapshot(&self.request_model)
	}
}

#[cfg(test)]
#[path = "vertex_tests.rs"]
mod tests;
