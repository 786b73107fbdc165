//! Request/response translation and token accounting for an LLM gateway.
//!
//! Clients speak one provider's wire protocol ([`llm::InputFormat`]); the resolved backend
//! ([`llm::AIProvider`]) may speak another. A [`llm::Translator`] is created per exchange and
//! rewrites the request, decodes the response (whole or streamed), keeps the running
//! [`llm::TokenUsage`], and remaps backend errors into the client's error schema.

pub mod config;
pub mod http;
pub mod json;
pub mod llm;
pub mod parse;

pub use aigw_core::strng;
pub use aigw_core::strng::Strng;
