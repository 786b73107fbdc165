//! Bedrock InvokeModel wire shapes for Anthropic models.

use serde::{Deserialize, Serialize};

/// Payload of an event-stream `chunk` event: a base64 encoded Anthropic stream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadPart {
	pub bytes: String,
}

/// Error body returned by AWS services, and carried by event-stream exceptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
	#[serde(alias = "Message")]
	pub message: String,
}
