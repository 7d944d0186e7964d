//! The memcached cache backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::client::{ClientError, CompressionPolicy, Connector};
use crate::config::{self, CacheParams, ClientConfig, Settings};
use crate::connection::ConnectionManager;
use crate::error::{CacheError, CacheResult};
use crate::keys::{self, CacheKeyBuilder};
use crate::retry::{RetryPolicy, RetryingClient};

/// Relative expirations above this many seconds must be sent as absolute
/// unix timestamps; memcached would otherwise read them as timestamps in
/// the past.
const MEMCACHE_MAX_RELATIVE: u32 = 60 * 60 * 24 * 30;

/// Expiration for a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
	/// Use the backend's configured default timeout.
	#[default]
	Default,
	/// Store without expiration.
	Never,
	/// Expire after this many seconds. Zero stores without expiration.
	Seconds(u32),
}

/// Builder for [`MemcachedCache`].
pub struct MemcachedCacheBuilder {
	location: String,
	username: Option<String>,
	password: Option<String>,
	params: CacheParams,
	settings: Settings,
	connector: Option<Arc<dyn Connector>>,
}

impl MemcachedCacheBuilder {
	fn new(location: impl Into<String>) -> Self {
		Self {
			location: location.into(),
			username: None,
			password: None,
			params: CacheParams::default(),
			settings: Settings::default(),
			connector: None,
		}
	}

	/// Username taking precedence over the parameter mapping. The
	/// environment still wins over both.
	pub fn username(mut self, username: impl Into<String>) -> Self {
		self.username = Some(username.into());
		self
	}

	/// Password taking precedence over the parameter mapping. The
	/// environment still wins over both.
	pub fn password(mut self, password: impl Into<String>) -> Self {
		self.password = Some(password.into());
		self
	}

	pub fn params(mut self, params: CacheParams) -> Self {
		self.params = params;
		self
	}

	pub fn settings(mut self, settings: Settings) -> Self {
		self.settings = settings;
		self
	}

	/// Replace the client factory. The seam for tests and for alternative
	/// client libraries.
	pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
		self.connector = Some(connector);
		self
	}

	/// Resolve configuration and construct the backend.
	///
	/// No connection is attempted here; clients are created per thread on
	/// first use. Fails when the resolved server list is empty or when no
	/// client library is available.
	pub fn build(self) -> CacheResult<MemcachedCache> {
		let connector = match self.connector {
			Some(connector) => connector,
			None => default_connector()?,
		};
		let config = ClientConfig::resolve(
			&self.location,
			self.username.as_deref(),
			self.password.as_deref(),
			&self.params,
		);
		if config.servers().is_empty() {
			return Err(CacheError::Backend(
				"no memcached servers configured".to_string(),
			));
		}
		let compression =
			config::resolve_compression(&self.settings, connector.supports_compression());
		let policy = RetryPolicy::new(self.settings.retry_on_broken_connection);
		let key_builder =
			CacheKeyBuilder::new(self.params.key_prefix.clone()).with_version(self.params.version);
		Ok(MemcachedCache {
			manager: ConnectionManager::new(config, connector, policy),
			key_builder,
			compression,
			default_timeout: self.params.default_timeout,
		})
	}
}

#[cfg(feature = "memcache-client")]
fn default_connector() -> CacheResult<Arc<dyn Connector>> {
	Ok(Arc::new(crate::native::NativeConnector::new()))
}

#[cfg(not(feature = "memcache-client"))]
fn default_connector() -> CacheResult<Arc<dyn Connector>> {
	Err(CacheError::Backend(
		"no memcached client available; enable the `memcache-client` feature or supply a connector"
			.to_string(),
	))
}

/// Memcached cache backend.
///
/// Keys are namespaced as `prefix:version:key` and values are serialized as
/// JSON. Client failures on the read/write surface degrade to cache misses:
/// the error is logged and the operation returns its safe default, so a dead
/// cache server slows a site down instead of taking it down. Each thread
/// drives its own client; see [`ConnectionManager`].
///
/// # Examples
///
/// ```no_run
/// use reinhardt_memcached::{MemcachedCache, Timeout};
///
/// # fn main() -> Result<(), reinhardt_memcached::CacheError> {
/// let cache = MemcachedCache::builder("127.0.0.1:11211").build()?;
/// cache.set("greeting", &"hello", Timeout::Default);
/// let greeting: Option<String> = cache.get("greeting");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemcachedCache {
	manager: ConnectionManager,
	key_builder: CacheKeyBuilder,
	compression: CompressionPolicy,
	default_timeout: u32,
}

impl MemcachedCache {
	/// Start building a backend for a `;`-separated server string,
	/// overridable at runtime through `MEMCACHE_SERVERS`.
	pub fn builder(location: impl Into<String>) -> MemcachedCacheBuilder {
		MemcachedCacheBuilder::new(location)
	}

	/// Fetch and deserialize a value. A miss and a client failure both come
	/// back as `None`; only the failure is logged.
	pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
		let full_key = self.make_key(key);
		match self.with_client(|client| client.get(&full_key)) {
			Ok(Some(bytes)) => decode(&full_key, &bytes),
			Ok(None) => None,
			Err(error) => {
				tracing::error!("Memcached error on get for {}: {}", full_key, error);
				None
			}
		}
	}

	/// [`get`](Self::get) with a caller-supplied default, returned on a miss
	/// and on a client failure alike.
	pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
		self.get(key).unwrap_or(default)
	}

	/// Store a value. Returns `false` when serialization or the client
	/// fails; the failure is logged with the key and the serialized size.
	pub fn set<T: Serialize>(&self, key: &str, value: &T, timeout: Timeout) -> bool {
		let full_key = self.make_key(key);
		let Some(bytes) = encode(&full_key, value) else {
			return false;
		};
		let expire = self.backend_timeout(timeout);
		match self.with_client(|client| client.set(&full_key, &bytes, expire, &self.compression)) {
			Ok(()) => true,
			Err(error) => {
				log_store_failure("set", &full_key, bytes.len(), &error);
				false
			}
		}
	}

	/// Store a value only if the key is absent. `false` means the key
	/// already existed or the client failed; only the failure is logged.
	pub fn add<T: Serialize>(&self, key: &str, value: &T, timeout: Timeout) -> bool {
		let full_key = self.make_key(key);
		let Some(bytes) = encode(&full_key, value) else {
			return false;
		};
		let expire = self.backend_timeout(timeout);
		match self.with_client(|client| client.add(&full_key, &bytes, expire, &self.compression)) {
			Ok(stored) => stored,
			Err(error) => {
				log_store_failure("add", &full_key, bytes.len(), &error);
				false
			}
		}
	}

	/// Remove a key. `false` when the key was absent or the client failed;
	/// only the failure is logged.
	pub fn delete(&self, key: &str) -> bool {
		let full_key = self.make_key(key);
		match self.with_client(|client| client.delete(&full_key)) {
			Ok(deleted) => deleted,
			Err(error) => {
				tracing::error!("Memcached error on delete for {}: {}", full_key, error);
				false
			}
		}
	}

	/// Fetch several keys in one round trip. The result maps the caller's
	/// keys, not the namespaced ones; a client failure logs and yields an
	/// empty map.
	pub fn get_many<T: DeserializeOwned>(&self, keys: &[&str]) -> HashMap<String, T> {
		let mut key_map = HashMap::with_capacity(keys.len());
		for key in keys {
			key_map.insert(self.make_key(key), (*key).to_string());
		}
		let full_keys: Vec<String> = key_map.keys().cloned().collect();
		match self.with_client(|client| client.get_multi(&full_keys)) {
			Ok(found) => {
				let mut values = HashMap::with_capacity(found.len());
				for (full_key, bytes) in found {
					let Some(original) = key_map.get(&full_key) else {
						continue;
					};
					if let Some(value) = decode::<T>(&full_key, &bytes) {
						values.insert(original.clone(), value);
					}
				}
				values
			}
			Err(error) => {
				tracing::error!("Memcached error on get_many: {}", error);
				HashMap::new()
			}
		}
	}

	/// Store several values in one round trip. `false` when serialization
	/// or the client fails; the failure is logged.
	pub fn set_many<T: Serialize>(&self, items: &[(&str, T)], timeout: Timeout) -> bool {
		let mut encoded = Vec::with_capacity(items.len());
		for (key, value) in items {
			let full_key = self.make_key(key);
			let Some(bytes) = encode(&full_key, value) else {
				return false;
			};
			encoded.push((full_key, bytes));
		}
		let expire = self.backend_timeout(timeout);
		match self.with_client(|client| client.set_multi(&encoded, expire)) {
			Ok(()) => true,
			Err(error) => {
				tracing::error!("Memcached error on set_many: {}", error);
				false
			}
		}
	}

	/// Remove several keys in one round trip. `false` when any key was
	/// absent or the client failed; only the failure is logged.
	pub fn delete_many(&self, keys: &[&str]) -> bool {
		let full_keys: Vec<String> = keys.iter().map(|key| self.make_key(key)).collect();
		match self.with_client(|client| client.delete_multi(&full_keys)) {
			Ok(deleted) => deleted,
			Err(error) => {
				tracing::error!("Memcached error on delete_many: {}", error);
				false
			}
		}
	}

	/// Atomically increase a counter.
	///
	/// Unlike the degraded operations above, failures here propagate; a
	/// missing key is [`CacheError::KeyNotFound`].
	pub fn incr(&self, key: &str, delta: u64) -> CacheResult<u64> {
		let full_key = self.make_key(key);
		let updated = self.with_client(|client| client.incr(&full_key, delta))?;
		updated.ok_or(CacheError::KeyNotFound { key: full_key })
	}

	/// Atomically decrease a counter. Memcached floors the result at zero.
	///
	/// Failures propagate; a missing key is [`CacheError::KeyNotFound`].
	pub fn decr(&self, key: &str, delta: u64) -> CacheResult<u64> {
		let full_key = self.make_key(key);
		let updated = self.with_client(|client| client.decr(&full_key, delta))?;
		updated.ok_or(CacheError::KeyNotFound { key: full_key })
	}

	/// Drop every entry on every configured server.
	pub fn clear(&self) -> CacheResult<()> {
		self.with_client(|client| client.flush())?;
		Ok(())
	}

	/// Intentionally does nothing.
	///
	/// The client library manages its own connections, including failure
	/// and failover state. This hook runs at the end of every request
	/// cycle; tearing connections down here would discard that state and
	/// reconnect on the next request, so the thread's client is left
	/// untouched.
	pub fn close(&self) {}

	fn make_key(&self, key: &str) -> String {
		let full_key = self.key_builder.build(key);
		keys::warn_on_invalid_key(&full_key);
		full_key
	}

	fn backend_timeout(&self, timeout: Timeout) -> u32 {
		wire_expiration(timeout, self.default_timeout)
	}

	fn with_client<T>(
		&self,
		call: impl FnOnce(&RetryingClient) -> Result<T, ClientError>,
	) -> Result<T, ClientError> {
		let client = self.manager.get_client()?;
		call(&client)
	}
}

/// Convert a timeout to the wire expiration.
///
/// Zero passes through unchanged: to memcached it means "never expire", and
/// normalizing it away would silently change stored entries' lifetimes.
/// Relative values beyond 30 days become absolute unix timestamps, the
/// protocol's rule for large expirations.
fn wire_expiration(timeout: Timeout, default_timeout: u32) -> u32 {
	let seconds = match timeout {
		Timeout::Default => default_timeout,
		Timeout::Never => return 0,
		Timeout::Seconds(seconds) => seconds,
	};
	if seconds == 0 {
		return 0;
	}
	if seconds > MEMCACHE_MAX_RELATIVE {
		let now = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|elapsed| elapsed.as_secs())
			.unwrap_or(0) as u32;
		now.saturating_add(seconds)
	} else {
		seconds
	}
}

fn encode<T: Serialize>(key: &str, value: &T) -> Option<Vec<u8>> {
	match serde_json::to_vec(value) {
		Ok(bytes) => Some(bytes),
		Err(error) => {
			tracing::error!("Failed to serialize value for {}: {}", key, error);
			None
		}
	}
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Option<T> {
	match serde_json::from_slice(bytes) {
		Ok(value) => Some(value),
		Err(error) => {
			tracing::error!("Failed to deserialize cached value for {}: {}", key, error);
			None
		}
	}
}

fn log_store_failure(op: &str, key: &str, size: usize, error: &ClientError) {
	if error.is_server() {
		tracing::error!("Server error on {} for {} ({} bytes): {}", op, key, size, error);
	} else {
		tracing::error!(
			"Memcached error on {} for {} ({} bytes): {}",
			op,
			key,
			size,
			error
		);
	}
}
