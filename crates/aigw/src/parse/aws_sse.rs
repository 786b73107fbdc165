//! AWS `application/vnd.amazon.eventstream` framing.
//!
//! Frames are length prefixed and CRC protected. A frame may span any number of reads, and one
//! read may hold many frames.

use aws_smithy_eventstream::frame::{DecodedFrame, MessageFrameDecoder};
use aws_smithy_types::event_stream::Message;
use bytes::BytesMut;

use crate::llm::AIError;

pub const MESSAGE_TYPE: &str = ":message-type";
pub const EVENT_TYPE: &str = ":event-type";
pub const EXCEPTION_TYPE: &str = ":exception-type";
pub const ERROR_CODE: &str = ":error-code";

pub struct FrameBuffer {
	buffer: BytesMut,
	decoder: MessageFrameDecoder,
	max_frame: usize,
}

impl std::fmt::Debug for FrameBuffer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FrameBuffer")
			.field("pending", &self.buffer.len())
			.finish()
	}
}

impl Default for FrameBuffer {
	fn default() -> Self {
		Self::with_limit(super::DEFAULT_MAX_EVENT_BYTES)
	}
}

impl FrameBuffer {
	pub fn with_limit(max_frame: usize) -> Self {
		FrameBuffer {
			buffer: BytesMut::new(),
			decoder: MessageFrameDecoder::new(),
			max_frame,
		}
	}

	pub fn extend(&mut self, chunk: &[u8]) {
		self.buffer.extend_from_slice(chunk);
	}

	/// Decode the next complete message, or `None` when more bytes are needed.
	///
	/// A corrupt frame is an error: once framing is lost there is no way to find the next
	/// message boundary.
	pub fn next_message(&mut self) -> Result<Option<Message>, AIError> {
		match self.decoder.decode_frame(&mut self.buffer) {
			Ok(DecodedFrame::Complete(msg)) => Ok(Some(msg)),
			Ok(DecodedFrame::Incomplete) if self.buffer.len() > self.max_frame => {
				Err(AIError::ResponseTooLarge)
			},
			Ok(DecodedFrame::Incomplete) => Ok(None),
			Err(e) => Err(AIError::EventStream(e.to_string())),
		}
	}
}

/// The string value of header `name`, if present and a string.
pub fn header<'a>(msg: &'a Message, name: &str) -> Option<&'a str> {
	msg
		.headers()
		.iter()
		.find(|h| h.name().as_str() == name)
		.and_then(|h| h.value().as_string().ok())
		.map(|s| s.as_str())
}
