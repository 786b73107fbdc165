//! Targeted edits of top-level JSON object members.
//!
//! Request bodies are patched in place rather than re-serialized: only the bytes of the edited
//! member change, so field order, number formatting and whitespace elsewhere in the client's
//! body reach the backend untouched.

use std::collections::BTreeMap;
use std::ops::Range;

use serde::de::Error as _;
use serde_json::value::RawValue;

/// Byte range of the value of every top-level member.
fn member_values(body: &[u8]) -> Result<BTreeMap<String, Range<usize>>, serde_json::Error> {
	let members: BTreeMap<String, &RawValue> = serde_json::from_slice(body)?;
	let base = body.as_ptr() as usize;
	Ok(
		members
			.into_iter()
			.map(|(k, v)| {
				let start = v.get().as_ptr() as usize - base;
				(k, start..start + v.get().len())
			})
			.collect(),
	)
}

/// Replace the value of `key` with the already-encoded JSON `value`, inserting the member at the
/// front of the object when it does not exist.
pub fn set_field(body: &[u8], key: &str, value: &[u8]) -> Result<Vec<u8>, serde_json::Error> {
	let members = member_values(body)?;
	if let Some(range) = members.get(key) {
		let mut out = Vec::with_capacity(body.len() - range.len() + value.len());
		out.extend_from_slice(&body[..range.start]);
		out.extend_from_slice(value);
		out.extend_from_slice(&body[range.end..]);
		return Ok(out);
	}

	let open = body
		.iter()
		.position(|b| *b == b'{')
		.ok_or_else(|| serde_json::Error::custom("expected a JSON object"))?;
	let key = serde_json::to_vec(key)?;
	let mut out = Vec::with_capacity(body.len() + key.len() + value.len() + 2);
	out.extend_from_slice(&body[..=open]);
	out.extend_from_slice(&key);
	out.push(b':');
	out.extend_from_slice(value);
	if !members.is_empty() {
		out.push(b',');
	}
	out.extend_from_slice(&body[open + 1..]);
	Ok(out)
}

/// Set `key` to a JSON string.
pub fn set_string_field(body: &[u8], key: &str, value: &str) -> Result<Vec<u8>, serde_json::Error> {
	set_field(body, key, &serde_json::to_vec(value)?)
}

/// Remove the member `key`, along with its separating comma. Returns `None` if it was absent.
pub fn remove_field(body: &[u8], key: &str) -> Result<Option<Vec<u8>>, serde_json::Error> {
	let members = member_values(body)?;
	let Some(value) = members.get(key) else {
		return Ok(None);
	};
	let start = key_start(body, value.start)
		.ok_or_else(|| serde_json::Error::custom("malformed object member"))?;

	let after = skip_ws_forward(body, value.end);
	let range = if body.get(after) == Some(&b',') {
		start..skip_ws_forward(body, after + 1)
	} else {
		let before = skip_ws_backward(body, start);
		if before > 0 && body[before - 1] == b',' {
			before - 1..value.end
		} else {
			start..value.end
		}
	};

	let mut out = Vec::with_capacity(body.len() - range.len());
	out.extend_from_slice(&body[..range.start]);
	out.extend_from_slice(&body[range.end..]);
	Ok(Some(out))
}

fn skip_ws_forward(body: &[u8], mut pos: usize) -> usize {
	while pos < body.len() && body[pos].is_ascii_whitespace() {
		pos += 1;
	}
	pos
}

fn skip_ws_backward(body: &[u8], mut pos: usize) -> usize {
	while pos > 0 && body[pos - 1].is_ascii_whitespace() {
		pos -= 1;
	}
	pos
}

/// Walk back from a member's value to the opening quote of its key.
fn key_start(body: &[u8], value_start: usize) -> Option<usize> {
	let pos = skip_ws_backward(body, value_start);
	if pos == 0 || body[pos - 1] != b':' {
		return None;
	}
	let pos = skip_ws_backward(body, pos - 1);
	if pos == 0 || body[pos - 1] != b'"' {
		return None;
	}
	let mut i = pos - 1;
	loop {
		if i == 0 {
			return None;
		}
		i -= 1;
		if body[i] == b'"' {
			let backslashes = body[..i].iter().rev().take_while(|b| **b == b'\\').count();
			if backslashes % 2 == 0 {
				return Some(i);
			}
		}
	}
}
