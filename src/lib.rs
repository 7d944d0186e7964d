//! Memcached cache backend with per-thread clients and broken-connection
//! retry.
//!
//! The backend plugs a native memcached client into the framework's
//! pluggable cache surface. It stays thin on purpose: the wire protocol,
//! connection handling, and compression belong to the client library; this
//! crate owns client lifecycle, configuration, and failure semantics.
//!
//! - Each thread lazily creates and keeps its own client; nothing is locked
//!   and no client ever crosses a thread boundary.
//! - An operation interrupted by a broken connection is reissued exactly
//!   once; the second outcome is final.
//! - Client failures on the read/write surface degrade to cache misses with
//!   an error log, so callers experience a cold cache instead of errors.
//! - A timeout of zero seconds stores forever, matching the memcached
//!   protocol's meaning of zero.
//!
//! Credentials and servers resolve from the environment first
//! (`MEMCACHE_SERVERS`, `MEMCACHE_USERNAME`, `MEMCACHE_PASSWORD`), then
//! explicit builder arguments, then [`CacheParams`].
//!
//! # Examples
//!
//! ```no_run
//! use reinhardt_memcached::{CacheParams, MemcachedCache, Timeout};
//!
//! # fn main() -> Result<(), reinhardt_memcached::CacheError> {
//! let cache = MemcachedCache::builder("127.0.0.1:11211;127.0.0.1:11212")
//!     .params(CacheParams::new().with_binary(true).with_key_prefix("myapp"))
//!     .build()?;
//!
//! cache.set("user:42", &"alice", Timeout::Seconds(600));
//! let name: Option<String> = cache.get("user:42");
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod keys;
#[cfg(feature = "memcache-client")]
pub mod native;
pub mod retry;

pub use backend::{MemcachedCache, MemcachedCacheBuilder, Timeout};
pub use client::{
	ClientError, ClientErrorKind, CompressionPolicy, Connector, MemcacheClient,
	CONNECTION_FAILURE,
};
pub use config::{CacheParams, ClientConfig, Settings, ENV_PASSWORD, ENV_SERVERS, ENV_USERNAME};
pub use connection::ConnectionManager;
pub use error::{CacheError, CacheResult};
pub use keys::{CacheKeyBuilder, MAX_KEY_LENGTH};
#[cfg(feature = "memcache-client")]
pub use native::NativeConnector;
pub use retry::{RetryPolicy, RetryableOp, RetryingClient};
