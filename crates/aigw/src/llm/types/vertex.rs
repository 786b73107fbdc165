//! Google Cloud error envelope, returned by Vertex AI before a request reaches the model.
//!
//! All three fields are always present, which is what tells it apart from an Anthropic error.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: ErrorDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
	pub code: u16,
	pub message: String,
	pub status: String,
}
