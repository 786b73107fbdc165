//! Server-sent events, decoded one line at a time.
//!
//! Only `data:` lines carry payload for the providers we speak; `event:`, `id:`, comments and
//! blank separators are framing and are skipped by callers.

use bytes::{Bytes, BytesMut};

use crate::llm::AIError;

const DATA_PREFIX: &[u8] = b"data:";

/// Trailing bytes of a stream that have not yet been terminated by a newline.
#[derive(Debug)]
pub struct LineBuffer {
	buffer: BytesMut,
	max_line: usize,
}

impl Default for LineBuffer {
	fn default() -> Self {
		Self::with_limit(super::DEFAULT_MAX_EVENT_BYTES)
	}
}

impl LineBuffer {
	pub fn with_limit(max_line: usize) -> Self {
		LineBuffer {
			buffer: BytesMut::new(),
			max_line,
		}
	}

	/// Append newly read bytes.
	///
	/// Fails when the unterminated tail grows past the configured limit.
	pub fn extend(&mut self, chunk: &[u8]) -> Result<(), AIError> {
		self.buffer.extend_from_slice(chunk);
		let tail = match self.buffer.iter().rposition(|b| *b == b'\n') {
			Some(pos) => self.buffer.len() - pos - 1,
			None => self.buffer.len(),
		};
		if tail > self.max_line {
			return Err(AIError::ResponseTooLarge);
		}
		Ok(())
	}

	/// Pop the next complete line, without its terminator.
	pub fn next_line(&mut self) -> Option<Bytes> {
		let pos = self.buffer.iter().position(|b| *b == b'\n')?;
		let mut line = self.buffer.split_to(pos + 1);
		line.truncate(pos);
		if line.last() == Some(&b'\r') {
			line.truncate(pos - 1);
		}
		Some(line.freeze())
	}

	/// Bytes still waiting for a newline.
	pub fn pending(&self) -> usize {
		self.buffer.len()
	}
}

/// The payload of a `data:` line, or `None` for any other line.
pub fn data_payload(line: &[u8]) -> Option<&[u8]> {
	let rest = line.strip_prefix(DATA_PREFIX)?;
	Some(rest.strip_prefix(b" ").unwrap_or(rest))
}

/// Encode one event in SSE framing, with an `event:` line when a name is given.
pub fn encode_event(name: Option<&str>, data: &[u8]) -> Bytes {
	let mut out = BytesMut::with_capacity(data.len() + name.map_or(0, |n| n.len() + 8) + 8);
	if let Some(name) = name {
		out.extend_from_slice(b"event: ");
		out.extend_from_slice(name.as_bytes());
		out.extend_from_slice(b"\n");
	}
	out.extend_from_slice(b"data: ");
	out.extend_from_slice(data);
	out.extend_from_slice(b"\n\n");
	out.freeze()
}
