use ::http::{HeaderMap, HeaderValue, header};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

use crate::llm::{AIError, HeaderMutation};
use crate::strng;

/// Pseudo-header carrying the upstream request path, as the data plane understands it.
pub const PATH: &str = ":path";

pub const DEFAULT_BUFFER_LIMIT: usize = 2 * 1024 * 1024;

/// Escapes everything but RFC 3986 unreserved characters, so a model ID, ARN or deployment
/// name stays one path segment.
pub const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
	.remove(b'-')
	.remove(b'.')
	.remove(b'_')
	.remove(b'~');

pub fn content_type(headers: &HeaderMap) -> Option<&str> {
	headers
		.get(header::CONTENT_TYPE)
		.and_then(|v| v.to_str().ok())
}

/// `application/json` or any `+json` media type, ignoring parameters.
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
	let Some(ct) = content_type(headers) else {
		return false;
	};
	let essence = ct.split(';').next().unwrap_or_default().trim();
	essence.eq_ignore_ascii_case("application/json")
		|| essence
			.rsplit_once('+')
			.is_some_and(|(_, suffix)| suffix.eq_ignore_ascii_case("json"))
}

pub fn path(value: impl AsRef<str>) -> HeaderMutation {
	HeaderMutation::new(PATH, value)
}

pub fn content_length(len: usize) -> HeaderMutation {
	HeaderMutation::new(header::CONTENT_LENGTH.as_str(), strng::format!("{len}"))
}

pub fn json_content_type() -> HeaderMutation {
	HeaderMutation::new(header::CONTENT_TYPE.as_str(), "application/json")
}

/// Apply mutations to a header map, replacing existing values.
pub fn apply(headers: &mut HeaderMap, mutations: &[HeaderMutation]) {
	for m in mutations {
		let Ok(name) = header::HeaderName::from_bytes(m.name.as_bytes()) else {
			// Pseudo-headers such as `:path` are not representable here.
			continue;
		};
		if let Ok(value) = HeaderValue::from_str(&m.value) {
			headers.insert(name, value);
		}
	}
}

/// Buffer an entire body, failing with [`AIError::ResponseTooLarge`] past `limit` bytes.
pub async fn read_body_with_limit<B>(body: B, limit: usize) -> Result<Bytes, AIError>
where
	B: http_body::Body,
	B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
	match Limited::new(body, limit).collect().await {
		Ok(collected) => Ok(collected.to_bytes()),
		Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(AIError::ResponseTooLarge),
		Err(e) => Err(AIError::Body(e)),
	}
}
