//! The client seam consumed by the cache backend.
//!
//! The backend does not speak the memcached wire protocol itself. It drives
//! an external client through [`MemcacheClient`] and obtains per-thread
//! instances through [`Connector`]. Values are opaque byte strings at this
//! seam; serialization happens above it, compression (if any) below it.

use std::collections::HashMap;

use thiserror::Error;

use crate::config::ClientConfig;

/// Return code the client library reserves for a broken connection.
///
/// The value is defined by the library and is not reinterpreted here; it is
/// only compared against [`ClientError::code`] when deciding whether a failed
/// operation gets a second attempt.
pub const CONNECTION_FAILURE: u16 = 3;

/// Compression arguments handed to the client on single-key store calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionPolicy {
	/// Minimum serialized size, in bytes, before compression is attempted.
	/// Zero disables compression.
	pub min_compress_len: usize,
	/// Compression level forwarded to the client. `-1` keeps the client
	/// library's default.
	pub compress_level: i32,
}

impl Default for CompressionPolicy {
	fn default() -> Self {
		Self {
			min_compress_len: 0,
			compress_level: -1,
		}
	}
}

/// Which side reported a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
	/// The client library failed locally (connection, protocol, usage).
	Client,
	/// The memcached server answered with an error.
	Server,
}

/// An error reported by the memcached client.
///
/// Carries the numeric return code of the underlying library when one is
/// available; the code drives the retry decision and nothing else.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ClientError {
	kind: ClientErrorKind,
	code: Option<u16>,
	message: String,
}

impl ClientError {
	/// A client-side failure.
	pub fn client(message: impl Into<String>) -> Self {
		Self {
			kind: ClientErrorKind::Client,
			code: None,
			message: message.into(),
		}
	}

	/// A failure reported by the server.
	pub fn server(message: impl Into<String>) -> Self {
		Self {
			kind: ClientErrorKind::Server,
			code: None,
			message: message.into(),
		}
	}

	/// Attach the library's numeric return code.
	pub fn with_code(mut self, code: u16) -> Self {
		self.code = Some(code);
		self
	}

	pub fn kind(&self) -> ClientErrorKind {
		self.kind
	}

	pub fn code(&self) -> Option<u16> {
		self.code
	}

	pub fn is_server(&self) -> bool {
		matches!(self.kind, ClientErrorKind::Server)
	}
}

/// Operations the backend consumes from a memcached client.
///
/// A missing key is never an error at this seam: lookups yield `Ok(None)`
/// and counters yield `Ok(None)` when the key does not exist. Implementations
/// are created per thread by a [`Connector`] and never shared across threads.
pub trait MemcacheClient {
	/// Store a value only if the key is absent. `Ok(false)` means the key
	/// already existed.
	fn add(
		&self,
		key: &str,
		value: &[u8],
		expire: u32,
		compression: &CompressionPolicy,
	) -> Result<bool, ClientError>;

	/// Store several values, skipping keys that already exist.
	fn add_multi(&self, items: &[(String, Vec<u8>)], expire: u32) -> Result<(), ClientError>;

	fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ClientError>;

	/// Fetch several keys in one round trip. Missing keys are absent from
	/// the result.
	fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, ClientError>;

	fn set(
		&self,
		key: &str,
		value: &[u8],
		expire: u32,
		compression: &CompressionPolicy,
	) -> Result<(), ClientError>;

	fn set_multi(&self, items: &[(String, Vec<u8>)], expire: u32) -> Result<(), ClientError>;

	/// Remove a key. `Ok(false)` means the key was not present.
	fn delete(&self, key: &str) -> Result<bool, ClientError>;

	/// Remove several keys. `Ok(false)` means at least one was not present.
	fn delete_multi(&self, keys: &[String]) -> Result<bool, ClientError>;

	/// Increase a counter, returning the new value or `None` when the key
	/// does not exist.
	fn incr(&self, key: &str, delta: u64) -> Result<Option<u64>, ClientError>;

	/// Increase several counters by the same delta.
	fn incr_multi(&self, keys: &[String], delta: u64) -> Result<(), ClientError>;

	/// Decrease a counter, returning the new value or `None` when the key
	/// does not exist.
	fn decr(&self, key: &str, delta: u64) -> Result<Option<u64>, ClientError>;

	/// Drop every entry on every configured server.
	fn flush(&self) -> Result<(), ClientError>;

	/// Apply tuning options to a freshly created client.
	fn apply_behaviors(&mut self, behaviors: &HashMap<String, String>) -> Result<(), ClientError>;
}

/// Creates clients for the calling thread.
///
/// The connector is shared across threads; the clients it hands out are not.
pub trait Connector: Send + Sync {
	/// Create a new client from the resolved configuration.
	fn connect(&self, config: &ClientConfig) -> Result<Box<dyn MemcacheClient>, ClientError>;

	/// Whether the client library was built with value compression support.
	fn supports_compression(&self) -> bool {
		false
	}
}
