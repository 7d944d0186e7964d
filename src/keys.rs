//! Cache key construction and validation.

/// Longest key the memcached protocol accepts.
pub const MAX_KEY_LENGTH: usize = 250;

/// Builds namespaced cache keys as `prefix:version:key`.
///
/// # Examples
///
/// ```
/// use reinhardt_memcached::CacheKeyBuilder;
///
/// let builder = CacheKeyBuilder::new("myapp").with_version(2);
/// assert_eq!(builder.build("user:123"), "myapp:2:user:123");
/// ```
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
	prefix: String,
	version: u32,
}

impl CacheKeyBuilder {
	pub fn new(prefix: impl Into<String>) -> Self {
		Self {
			prefix: prefix.into(),
			version: 1,
		}
	}

	pub fn with_version(mut self, version: u32) -> Self {
		self.version = version;
		self
	}

	pub fn build(&self, key: &str) -> String {
		format!("{}:{}:{}", self.prefix, self.version, key)
	}

	pub fn build_many(&self, keys: &[&str]) -> Vec<String> {
		keys.iter().map(|key| self.build(key)).collect()
	}
}

/// Warn about keys memcached will reject or mangle.
///
/// The operation still runs afterwards; the server is the final authority on
/// what it accepts.
pub(crate) fn warn_on_invalid_key(key: &str) {
	if key.len() > MAX_KEY_LENGTH {
		tracing::warn!(
			"Cache key is longer than {} bytes and may be rejected by memcached: {}",
			MAX_KEY_LENGTH,
			key
		);
	}
	if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
		tracing::warn!(
			"Cache key contains whitespace or control characters: {:?}",
			key
		);
	}
}
