//! Per-thread client lifecycle.
//!
//! Every thread gets its own client, created lazily on first use and reused
//! for the thread's lifetime. Clients never cross threads and nothing here
//! takes a lock: the registry is thread-local state keyed by manager id, so
//! independent backends on one thread keep independent clients.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::client::{ClientError, Connector};
use crate::config::ClientConfig;
use crate::retry::{RetryPolicy, RetryingClient};

thread_local! {
	static CLIENTS: RefCell<HashMap<u64, Rc<RetryingClient>>> = RefCell::new(HashMap::new());
}

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(0);

/// Creates, configures, and hands out the calling thread's client.
pub struct ConnectionManager {
	id: u64,
	config: ClientConfig,
	connector: Arc<dyn Connector>,
	policy: RetryPolicy,
}

impl ConnectionManager {
	pub fn new(config: ClientConfig, connector: Arc<dyn Connector>, policy: RetryPolicy) -> Self {
		Self {
			id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
			config,
			connector,
			policy,
		}
	}

	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// The calling thread's client, created on first use.
	///
	/// The first call on a thread connects, applies the configured behaviors
	/// to the fresh client, and wraps it with the retry policy. Later calls
	/// return the same handle without reconfiguring anything.
	pub fn get_client(&self) -> Result<Rc<RetryingClient>, ClientError> {
		let existing = CLIENTS.with(|clients| clients.borrow().get(&self.id).cloned());
		if let Some(client) = existing {
			return Ok(client);
		}

		let mut raw = self.connector.connect(&self.config)?;
		if !self.config.behaviors().is_empty() {
			raw.apply_behaviors(self.config.behaviors())?;
		}
		tracing::debug!(
			"Created memcached client for {:?} on {:?}",
			self.config.servers(),
			std::thread::current().id()
		);

		let client = Rc::new(RetryingClient::new(raw, self.policy));
		CLIENTS.with(|clients| {
			clients.borrow_mut().insert(self.id, Rc::clone(&client));
		});
		Ok(client)
	}
}

impl Drop for ConnectionManager {
	fn drop(&mut self) {
		// Only the dropping thread's entry is reachable here; entries on
		// other threads are released when those threads exit. try_with
		// because thread teardown may have destroyed the registry already.
		let _ = CLIENTS.try_with(|clients| {
			clients.borrow_mut().remove(&self.id);
		});
	}
}

impl fmt::Debug for ConnectionManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionManager")
			.field("id", &self.id)
			.field("config", &self.config)
			.field("policy", &self.policy)
			.finish_non_exhaustive()
	}
}
