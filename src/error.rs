//! Error types surfaced by the cache backend.

use thiserror::Error;

use crate::client::ClientError;

/// Result type for cache backend operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced by the memcached cache backend.
///
/// Most read/write operations never return these: client failures are logged
/// and degraded to the operation's safe default. The variants here cover
/// backend construction and the counter operations, which propagate.
#[derive(Debug, Error)]
pub enum CacheError {
	/// The backend could not be constructed
	#[error("Cache backend initialization failed: {0}")]
	Backend(String),

	/// Counter operation on a key that does not exist
	#[error("Key not found: {key}")]
	KeyNotFound { key: String },

	/// Error reported by the underlying memcached client
	#[error(transparent)]
	Client(#[from] ClientError),
}
