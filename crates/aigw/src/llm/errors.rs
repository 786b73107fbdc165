//! Backend error responses, re-expressed in the client's error schema.

use ::http::{HeaderMap, StatusCode};
use bytes::Bytes;

use crate::http;
use crate::llm::types::completions::{ChatCompletionError, ChatCompletionErrorResponse};
use crate::llm::types::messages::MessagesErrorResponse;
use crate::llm::{AIError, ErrorResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
	InvalidRequest,
	Authentication,
	Permission,
	NotFound,
	RequestTooLarge,
	RateLimit,
	Internal,
	Unavailable,
	Overloaded,
}

impl ErrorCategory {
	/// Unmapped codes are treated as internal errors.
	pub fn from_status(status: StatusCode) -> Self {
		match status.as_u16() {
			400 => ErrorCategory::InvalidRequest,
			401 => ErrorCategory::Authentication,
			403 => ErrorCategory::Permission,
			404 => ErrorCategory::NotFound,
			413 => ErrorCategory::RequestTooLarge,
			429 => ErrorCategory::RateLimit,
			503 => ErrorCategory::Unavailable,
			529 => ErrorCategory::Overloaded,
			_ => ErrorCategory::Internal,
		}
	}

	/// From the `x-amzn-errortype` header, e.g. `ThrottlingException:http://internal.amazon.com/`.
	pub fn from_aws_error_type(error_type: &str) -> Option<Self> {
		let name = error_type.split(':').next().unwrap_or_default();
		Some(match name {
			"ValidationException" => ErrorCategory::InvalidRequest,
			"UnrecognizedClientException" => ErrorCategory::Authentication,
			"AccessDeniedException" => ErrorCategory::Permission,
			"ResourceNotFoundException" => ErrorCategory::NotFound,
			"ThrottlingException" | "ServiceQuotaExceededException" => ErrorCategory::RateLimit,
			"ServiceUnavailableException" => ErrorCategory::Unavailable,
			"ModelNotReadyException" => ErrorCategory::Overloaded,
			"InternalServerException" | "ModelErrorException" => ErrorCategory::Internal,
			_ => return None,
		})
	}

	pub fn anthropic_type(&self) -> &'static str {
		match self {
			ErrorCategory::InvalidRequest => "invalid_request_error",
			ErrorCategory::Authentication => "authentication_error",
			ErrorCategory::Permission => "permission_error",
			ErrorCategory::NotFound => "not_found_error",
			ErrorCategory::RequestTooLarge => "request_too_large",
			ErrorCategory::RateLimit => "rate_limit_error",
			ErrorCategory::Internal => "api_error",
			ErrorCategory::Unavailable => "service_unavailable",
			ErrorCategory::Overloaded => "overloaded_error",
		}
	}

	pub fn openai_type(&self) -> &'static str {
		match self {
			ErrorCategory::InvalidRequest | ErrorCategory::RequestTooLarge => "invalid_request_error",
			ErrorCategory::Authentication => "authentication_error",
			ErrorCategory::Permission => "permission_error",
			ErrorCategory::NotFound => "not_found_error",
			ErrorCategory::RateLimit => "rate_limit_error",
			ErrorCategory::Internal | ErrorCategory::Overloaded => "server_error",
			ErrorCategory::Unavailable => "service_unavailable",
		}
	}
}

/// Error bodies are not always UTF-8; keep what we can.
pub fn body_message(body: &[u8]) -> String {
	String::from_utf8_lossy(body).trim().to_string()
}

pub fn anthropic_error(category: ErrorCategory, message: impl Into<String>) -> Result<ErrorResponse, AIError> {
	let body = serde_json::to_vec(&MessagesErrorResponse::new(
		category.anthropic_type(),
		message,
	))
	.map_err(AIError::ResponseMarshal)?;
	Ok(rewritten(body))
}

pub fn openai_error(
	category: ErrorCategory,
	status: StatusCode,
	message: impl Into<String>,
) -> Result<ErrorResponse, AIError> {
	let body = serde_json::to_vec(&ChatCompletionErrorResponse {
		r#type: "error".to_string(),
		error: ChatCompletionError {
			r#type: category.openai_type().to_string(),
			message: message.into(),
			code: Some(status.as_u16().to_string()),
		},
	})
	.map_err(AIError::ResponseMarshal)?;
	Ok(rewritten(body))
}

fn rewritten(body: Vec<u8>) -> ErrorResponse {
	ErrorResponse {
		headers: vec![http::json_content_type(), http::content_length(body.len())],
		body: Some(Bytes::from(body)),
	}
}

/// JSON errors from a backend speaking the client's protocol pass through; anything else is
/// wrapped into an Anthropic error.
pub fn anthropic_passthrough_or_wrap(
	status: StatusCode,
	headers: &HeaderMap,
	body: &[u8],
) -> Result<ErrorResponse, AIError> {
	if http::is_json_content_type(headers) {
		return Ok(ErrorResponse::passthrough());
	}
	anthropic_error(ErrorCategory::from_status(status), body_message(body))
}

/// The OpenAI counterpart of [`anthropic_passthrough_or_wrap`].
pub fn openai_passthrough_or_wrap(
	status: StatusCode,
	headers: &HeaderMap,
	body: &[u8],
) -> Result<ErrorResponse, AIError> {
	if http::is_json_content_type(headers) {
		return Ok(ErrorResponse::passthrough());
	}
	openai_error(ErrorCategory::from_status(status), status, body_message(body))
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
