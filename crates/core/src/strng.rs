//! Cheap, immutable, reference counted strings.
//!
//! Model names, paths and header values are cloned onto every translator and every reported
//! usage record; `Strng` keeps those clones to a refcount bump.

use arcstr::ArcStr;

pub use arcstr::{format, literal};

pub type Strng = ArcStr;

pub const EMPTY: Strng = literal!("");

pub fn new(s: impl AsRef<str>) -> Strng {
	ArcStr::from(s.as_ref())
}

/// Returns `None` for the empty string, so an absent value and an empty one read the same.
pub fn non_empty(s: impl AsRef<str>) -> Option<Strng> {
	let s = s.as_ref();
	if s.is_empty() { None } else { Some(new(s)) }
}
