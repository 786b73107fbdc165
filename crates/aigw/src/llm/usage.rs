use serde::Serialize;

/// Running token counters for one exchange.
///
/// Every counter is tri-state: `None` means the backend has not reported it yet, which is
/// different from a reported zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
	#[serde(skip_serializing_if = "Option::is_none")]
	input: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	output: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	cached_input: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	cache_creation_input: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	total: Option<u64>,
}

impl TokenUsage {
	pub fn input(&self) -> Option<u64> {
		self.input
	}
	pub fn output(&self) -> Option<u64> {
		self.output
	}
	pub fn cached_input(&self) -> Option<u64> {
		self.cached_input
	}
	pub fn cache_creation_input(&self) -> Option<u64> {
		self.cache_creation_input
	}
	pub fn total(&self) -> Option<u64> {
		self.total
	}

	pub fn set_input(&mut self, v: u64) {
		self.input = Some(v);
	}
	pub fn set_output(&mut self, v: u64) {
		self.output = Some(v);
	}
	pub fn set_cached_input(&mut self, v: u64) {
		self.cached_input = Some(v);
	}
	pub fn set_cache_creation_input(&mut self, v: u64) {
		self.cache_creation_input = Some(v);
	}
	/// Record a backend-reported total. It is kept until both input and output are known.
	pub fn set_total(&mut self, v: u64) {
		self.total = Some(v);
	}

	/// Replace the whole state with `other`.
	///
	/// Only used to establish a baseline; calling it after field-level sets discards them.
	pub fn override_usage(&mut self, other: TokenUsage) {
		*self = other;
	}

	/// True when no counter has been reported.
	pub fn is_empty(&self) -> bool {
		self.input.is_none()
			&& self.output.is_none()
			&& self.cached_input.is_none()
			&& self.cache_creation_input.is_none()
			&& self.total.is_none()
	}

	/// Bring the derived fields in line with what is known so far.
	///
	/// Nothing happens until some usage has been reported. After that the cache counters are
	/// never left unset, input defaults to zero once output is known, and `total` is
	/// `input + output` once both are known.
	pub fn recompute_total(&mut self) {
		if self.is_empty() {
			return;
		}
		self.cached_input.get_or_insert(0);
		self.cache_creation_input.get_or_insert(0);
		if self.output.is_some() {
			self.input.get_or_insert(0);
		}
		if let (Some(input), Some(output)) = (self.input, self.output) {
			self.total = Some(input.saturating_add(output));
		}
	}
}
