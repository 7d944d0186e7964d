//! Retry-once wrapping for operations interrupted by a broken connection.
//!
//! The client library reports a torn-down connection with a dedicated return
//! code and reconnects internally on the next call. One immediate second
//! attempt therefore turns a transient failure into a success without hiding
//! persistent outages: the second outcome, whatever it is, is final.

use std::collections::HashMap;
use std::fmt;

use crate::client::{ClientError, CompressionPolicy, MemcacheClient, CONNECTION_FAILURE};

/// Decides whether a failed client call gets a second attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	enabled: bool,
}

impl RetryPolicy {
	pub fn new(enabled: bool) -> Self {
		Self { enabled }
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// Retry only when the client flagged the connection as broken. The
	/// error's kind plays no part; the code alone decides.
	pub fn should_retry(&self, error: &ClientError) -> bool {
		self.enabled && error.code() == Some(CONNECTION_FAILURE)
	}
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self::new(true)
	}
}

/// The operations that get a second attempt after a broken connection.
///
/// The set is fixed: `decr` has no multi-key variant and `flush` is
/// deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryableOp {
	Add,
	AddMulti,
	Get,
	GetMulti,
	Set,
	SetMulti,
	Delete,
	DeleteMulti,
	Incr,
	IncrMulti,
	Decr,
}

impl RetryableOp {
	/// Every operation in the retryable set.
	pub const ALL: [RetryableOp; 11] = [
		RetryableOp::Add,
		RetryableOp::AddMulti,
		RetryableOp::Get,
		RetryableOp::GetMulti,
		RetryableOp::Set,
		RetryableOp::SetMulti,
		RetryableOp::Delete,
		RetryableOp::DeleteMulti,
		RetryableOp::Incr,
		RetryableOp::IncrMulti,
		RetryableOp::Decr,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			RetryableOp::Add => "add",
			RetryableOp::AddMulti => "add_multi",
			RetryableOp::Get => "get",
			RetryableOp::GetMulti => "get_multi",
			RetryableOp::Set => "set",
			RetryableOp::SetMulti => "set_multi",
			RetryableOp::Delete => "delete",
			RetryableOp::DeleteMulti => "delete_multi",
			RetryableOp::Incr => "incr",
			RetryableOp::IncrMulti => "incr_multi",
			RetryableOp::Decr => "decr",
		}
	}
}

impl fmt::Display for RetryableOp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Client decorator that re-issues a failed call once when the connection
/// was reported broken.
///
/// Owns the client it wraps and deliberately does not implement
/// [`MemcacheClient`] itself, so a wrapped client cannot be wrapped a second
/// time.
pub struct RetryingClient {
	inner: Box<dyn MemcacheClient>,
	policy: RetryPolicy,
}

impl RetryingClient {
	pub fn new(inner: Box<dyn MemcacheClient>, policy: RetryPolicy) -> Self {
		Self { inner, policy }
	}

	/// At most two invocations: the first error that qualifies triggers one
	/// more attempt, and that second outcome is returned unconditionally.
	fn run<T>(
		&self,
		op: RetryableOp,
		call: impl Fn(&dyn MemcacheClient) -> Result<T, ClientError>,
	) -> Result<T, ClientError> {
		match call(self.inner.as_ref()) {
			Err(error) if self.policy.should_retry(&error) => {
				tracing::debug!("Retrying {} after a broken connection: {}", op, error);
				call(self.inner.as_ref())
			}
			outcome => outcome,
		}
	}

	pub fn add(
		&self,
		key: &str,
		value: &[u8],
		expire: u32,
		compression: &CompressionPolicy,
	) -> Result<bool, ClientError> {
		self.run(RetryableOp::Add, |client| {
			client.add(key, value, expire, compression)
		})
	}

	pub fn add_multi(
		&self,
		items: &[(String, Vec<u8>)],
		expire: u32,
	) -> Result<(), ClientError> {
		self.run(RetryableOp::AddMulti, |client| client.add_multi(items, expire))
	}

	pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ClientError> {
		self.run(RetryableOp::Get, |client| client.get(key))
	}

	pub fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, ClientError> {
		self.run(RetryableOp::GetMulti, |client| client.get_multi(keys))
	}

	pub fn set(
		&self,
		key: &str,
		value: &[u8],
		expire: u32,
		compression: &CompressionPolicy,
	) -> Result<(), ClientError> {
		self.run(RetryableOp::Set, |client| {
			client.set(key, value, expire, compression)
		})
	}

	pub fn set_multi(
		&self,
		items: &[(String, Vec<u8>)],
		expire: u32,
	) -> Result<(), ClientError> {
		self.run(RetryableOp::SetMulti, |client| client.set_multi(items, expire))
	}

	pub fn delete(&self, key: &str) -> Result<bool, ClientError> {
		self.run(RetryableOp::Delete, |client| client.delete(key))
	}

	pub fn delete_multi(&self, keys: &[String]) -> Result<bool, ClientError> {
		self.run(RetryableOp::DeleteMulti, |client| client.delete_multi(keys))
	}

	pub fn incr(&self, key: &str, delta: u64) -> Result<Option<u64>, ClientError> {
		self.run(RetryableOp::Incr, |client| client.incr(key, delta))
	}

	pub fn incr_multi(&self, keys: &[String], delta: u64) -> Result<(), ClientError> {
		self.run(RetryableOp::IncrMulti, |client| client.incr_multi(keys, delta))
	}

	pub fn decr(&self, key: &str, delta: u64) -> Result<Option<u64>, ClientError> {
		self.run(RetryableOp::Decr, |client| client.decr(key, delta))
	}

	/// Not in the retryable set; a failure propagates on the first attempt.
	pub fn flush(&self) -> Result<(), ClientError> {
		self.inner.flush()
	}
}

impl fmt::Debug for RetryingClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RetryingClient")
			.field("policy", &self.policy)
			.finish_non_exhaustive()
	}
}
