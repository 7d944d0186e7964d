//! Backend configuration and credential resolution.
//!
//! Two layers feed the backend: [`CacheParams`], the per-backend parameter
//! mapping (one entry in the framework's cache configuration), and
//! [`Settings`], the process-wide knobs resolved once at startup. Both are
//! folded into an immutable [`ClientConfig`] when the backend is built, with
//! environment variables taking precedence over everything else so deployed
//! credentials never live in configuration files.

use std::collections::HashMap;
use std::env;

use crate::client::CompressionPolicy;

/// Environment variable overriding the configured server list.
pub const ENV_SERVERS: &str = "MEMCACHE_SERVERS";
/// Environment variable overriding the configured username.
pub const ENV_USERNAME: &str = "MEMCACHE_USERNAME";
/// Environment variable overriding the configured password.
pub const ENV_PASSWORD: &str = "MEMCACHE_PASSWORD";

/// Per-backend parameters.
///
/// # Examples
///
/// ```
/// use reinhardt_memcached::CacheParams;
///
/// let params = CacheParams::new()
///     .with_binary(true)
///     .with_key_prefix("myapp")
///     .with_version(2);
/// assert!(params.binary);
/// assert_eq!(params.default_timeout, 300);
/// ```
#[derive(Debug, Clone)]
pub struct CacheParams {
	/// Use the binary protocol when talking to the server.
	pub binary: bool,
	/// Username for server authentication.
	pub username: Option<String>,
	/// Password for server authentication.
	pub password: Option<String>,
	/// Client tuning options applied to every new client.
	pub behaviors: HashMap<String, String>,
	/// Prefix built into every cache key.
	pub key_prefix: String,
	/// Version component built into every cache key.
	pub version: u32,
	/// Expiration, in seconds, for operations that do not specify one.
	pub default_timeout: u32,
}

impl Default for CacheParams {
	fn default() -> Self {
		Self {
			binary: false,
			username: None,
			password: None,
			behaviors: HashMap::new(),
			key_prefix: String::new(),
			version: 1,
			default_timeout: 300,
		}
	}
}

impl CacheParams {
	pub fn new() -> Self {
		Self::default()
	}

	/// Select the binary protocol. Required for authenticated servers.
	pub fn with_binary(mut self, binary: bool) -> Self {
		self.binary = binary;
		self
	}

	/// Username from the parameter mapping. Overridden by an explicit
	/// builder argument and by `MEMCACHE_USERNAME`.
	pub fn with_username(mut self, username: impl Into<String>) -> Self {
		self.username = Some(username.into());
		self
	}

	/// Password from the parameter mapping. Overridden by an explicit
	/// builder argument and by `MEMCACHE_PASSWORD`.
	pub fn with_password(mut self, password: impl Into<String>) -> Self {
		self.password = Some(password.into());
		self
	}

	/// Add one client tuning option.
	pub fn with_behavior(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.behaviors.insert(name.into(), value.into());
		self
	}

	pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.key_prefix = prefix.into();
		self
	}

	pub fn with_version(mut self, version: u32) -> Self {
		self.version = version;
		self
	}

	pub fn with_default_timeout(mut self, seconds: u32) -> Self {
		self.default_timeout = seconds;
		self
	}
}

/// Process-wide settings, resolved once and passed to the backend builder.
///
/// # Examples
///
/// ```
/// use reinhardt_memcached::Settings;
///
/// let settings = Settings::new().with_min_compress_len(1024);
/// assert_eq!(settings.min_compress_len, 1024);
/// assert_eq!(settings.compress_level, -1);
/// assert!(settings.retry_on_broken_connection);
/// ```
#[derive(Debug, Clone)]
pub struct Settings {
	/// Minimum serialized size, in bytes, before compression is attempted.
	/// Zero disables compression.
	pub min_compress_len: usize,
	/// Compression level handed to the client library. `-1` keeps the
	/// library default.
	pub compress_level: i32,
	/// Give an operation one more attempt when the client reports a broken
	/// connection.
	pub retry_on_broken_connection: bool,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			min_compress_len: 0,
			compress_level: -1,
			retry_on_broken_connection: true,
		}
	}
}

impl Settings {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_min_compress_len(mut self, bytes: usize) -> Self {
		self.min_compress_len = bytes;
		self
	}

	pub fn with_compress_level(mut self, level: i32) -> Self {
		self.compress_level = level;
		self
	}

	pub fn with_retry_on_broken_connection(mut self, enabled: bool) -> Self {
		self.retry_on_broken_connection = enabled;
		self
	}
}

/// Client construction inputs, immutable once the backend is built.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	servers: Vec<String>,
	binary: bool,
	username: Option<String>,
	password: Option<String>,
	behaviors: HashMap<String, String>,
}

impl ClientConfig {
	/// Resolve servers and credentials.
	///
	/// Per field, the environment wins over the explicit argument and the
	/// explicit argument wins over the parameter mapping. The server list
	/// has no parameter-mapping tier; `location` is a `;`-separated server
	/// string.
	pub fn resolve(
		location: &str,
		username: Option<&str>,
		password: Option<&str>,
		params: &CacheParams,
	) -> Self {
		let raw_servers = env::var(ENV_SERVERS).unwrap_or_else(|_| location.to_string());
		Self {
			servers: split_servers(&raw_servers),
			binary: params.binary,
			username: resolve_credential(ENV_USERNAME, username, params.username.as_deref()),
			password: resolve_credential(ENV_PASSWORD, password, params.password.as_deref()),
			behaviors: params.behaviors.clone(),
		}
	}

	pub fn servers(&self) -> &[String] {
		&self.servers
	}

	pub fn binary(&self) -> bool {
		self.binary
	}

	pub fn behaviors(&self) -> &HashMap<String, String> {
		&self.behaviors
	}

	/// Username and password, present only when both resolved to a
	/// non-empty value.
	pub fn credentials(&self) -> Option<(&str, &str)> {
		match (self.username.as_deref(), self.password.as_deref()) {
			(Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
				Some((username, password))
			}
			_ => None,
		}
	}
}

fn resolve_credential(var: &str, explicit: Option<&str>, param: Option<&str>) -> Option<String> {
	env::var(var)
		.ok()
		.or_else(|| explicit.map(str::to_string))
		.or_else(|| param.map(str::to_string))
}

fn split_servers(raw: &str) -> Vec<String> {
	raw.split(';')
		.map(str::trim)
		.filter(|server| !server.is_empty())
		.map(str::to_string)
		.collect()
}

/// Resolve the effective compression policy for a client.
///
/// A client without compression support gets the configured minimum forced
/// to zero; the level is left as configured, matching what the client
/// library itself would ignore.
pub(crate) fn resolve_compression(settings: &Settings, supports_compression: bool) -> CompressionPolicy {
	let mut policy = CompressionPolicy {
		min_compress_len: settings.min_compress_len,
		compress_level: settings.compress_level,
	};
	if !supports_compression {
		if policy.min_compress_len > 0 {
			tracing::warn!(
				"A minimum compression length of {} is configured but the memcached client does not support compression",
				policy.min_compress_len
			);
			policy.min_compress_len = 0;
		}
		if policy.compress_level != -1 {
			tracing::warn!(
				"A compression level of {} is configured but the memcached client does not support compression",
				policy.compress_level
			);
		}
	}
	policy
}
