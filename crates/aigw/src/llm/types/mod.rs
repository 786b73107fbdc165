//! Typed wire models for the provider protocols.

pub mod bedrock;
pub mod completions;
pub mod messages;
pub mod vertex;
