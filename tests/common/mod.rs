//! Recording mock client shared by the integration tests.
//!
//! The connector counts connections and snapshots the configuration it was
//! handed; the clients it creates record every call and consult a scripted
//! failure queue before touching the in-memory store.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reinhardt_memcached::{
	CacheParams, ClientConfig, ClientError, CompressionPolicy, Connector, MemcacheClient,
	MemcachedCache, Settings,
};

/// One recorded client call.
#[derive(Debug, Clone)]
pub struct MockCall {
	pub op: &'static str,
	pub key: Option<String>,
	pub expire: Option<u32>,
	pub compression: Option<CompressionPolicy>,
}

/// State shared between a test and every client the connector hands out.
#[derive(Default)]
pub struct MockState {
	connects: AtomicUsize,
	configs: Mutex<Vec<ClientConfig>>,
	calls: Mutex<Vec<MockCall>>,
	store: Mutex<HashMap<String, Vec<u8>>>,
	failures: Mutex<HashMap<&'static str, VecDeque<ClientError>>>,
	behaviors_applied: Mutex<Vec<HashMap<String, String>>>,
}

impl MockState {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Queue an error for the next call of `op`. Use `"connect"` to fail
	/// client creation itself.
	pub fn fail_next(&self, op: &'static str, error: ClientError) {
		self.failures
			.lock()
			.unwrap()
			.entry(op)
			.or_default()
			.push_back(error);
	}

	pub fn connects(&self) -> usize {
		self.connects.load(Ordering::SeqCst)
	}

	pub fn last_config(&self) -> Option<ClientConfig> {
		self.configs.lock().unwrap().last().cloned()
	}

	pub fn calls(&self) -> Vec<MockCall> {
		self.calls.lock().unwrap().clone()
	}

	pub fn calls_for(&self, op: &str) -> usize {
		self.calls
			.lock()
			.unwrap()
			.iter()
			.filter(|call| call.op == op)
			.count()
	}

	pub fn last_call(&self, op: &str) -> Option<MockCall> {
		self.calls
			.lock()
			.unwrap()
			.iter()
			.rev()
			.find(|call| call.op == op)
			.cloned()
	}

	pub fn behaviors_applied(&self) -> Vec<HashMap<String, String>> {
		self.behaviors_applied.lock().unwrap().clone()
	}

	pub fn insert_value(&self, key: &str, bytes: &[u8]) {
		self.store
			.lock()
			.unwrap()
			.insert(key.to_string(), bytes.to_vec());
	}

	pub fn stored_value(&self, key: &str) -> Option<Vec<u8>> {
		self.store.lock().unwrap().get(key).cloned()
	}

	fn record(&self, call: MockCall) {
		self.calls.lock().unwrap().push(call);
	}

	fn take_failure(&self, op: &'static str) -> Option<ClientError> {
		self.failures
			.lock()
			.unwrap()
			.get_mut(op)
			.and_then(|queue| queue.pop_front())
	}
}

pub struct MockClient {
	state: Arc<MockState>,
}

impl MemcacheClient for MockClient {
	fn add(
		&self,
		key: &str,
		value: &[u8],
		expire: u32,
		compression: &CompressionPolicy,
	) -> Result<bool, ClientError> {
		self.state.record(MockCall {
			op: "add",
			key: Some(key.to_string()),
			expire: Some(expire),
			compression: Some(*compression),
		});
		if let Some(error) = self.state.take_failure("add") {
			return Err(error);
		}
		let mut store = self.state.store.lock().unwrap();
		if store.contains_key(key) {
			return Ok(false);
		}
		store.insert(key.to_string(), value.to_vec());
		Ok(true)
	}

	fn add_multi(&self, items: &[(String, Vec<u8>)], expire: u32) -> Result<(), ClientError> {
		self.state.record(MockCall {
			op: "add_multi",
			key: None,
			expire: Some(expire),
			compression: None,
		});
		if let Some(error) = self.state.take_failure("add_multi") {
			return Err(error);
		}
		let mut store = self.state.store.lock().unwrap();
		for (key, value) in items {
			store.entry(key.clone()).or_insert_with(|| value.clone());
		}
		Ok(())
	}

	fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ClientError> {
		self.state.record(MockCall {
			op: "get",
			key: Some(key.to_string()),
			expire: None,
			compression: None,
		});
		if let Some(error) = self.state.take_failure("get") {
			return Err(error);
		}
		Ok(self.state.store.lock().unwrap().get(key).cloned())
	}

	fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, ClientError> {
		self.state.record(MockCall {
			op: "get_multi",
			key: None,
			expire: None,
			compression: None,
		});
		if let Some(error) = self.state.take_failure("get_multi") {
			return Err(error);
		}
		let store = self.state.store.lock().unwrap();
		let mut found = HashMap::new();
		for key in keys {
			if let Some(value) = store.get(key) {
				found.insert(key.clone(), value.clone());
			}
		}
		Ok(found)
	}

	fn set(
		&self,
		key: &str,
		value: &[u8],
		expire: u32,
		compression: &CompressionPolicy,
	) -> Result<(), ClientError> {
		self.state.record(MockCall {
			op: "set",
			key: Some(key.to_string()),
			expire: Some(expire),
			compression: Some(*compression),
		});
		if let Some(error) = self.state.take_failure("set") {
			return Err(error);
		}
		self.state
			.store
			.lock()
			.unwrap()
			.insert(key.to_string(), value.to_vec());
		Ok(())
	}

	fn set_multi(&self, items: &[(String, Vec<u8>)], expire: u32) -> Result<(), ClientError> {
		self.state.record(MockCall {
			op: "set_multi",
			key: None,
			expire: Some(expire),
			compression: None,
		});
		if let Some(error) = self.state.take_failure("set_multi") {
			return Err(error);
		}
		let mut store = self.state.store.lock().unwrap();
		for (key, value) in items {
			store.insert(key.clone(), value.clone());
		}
		Ok(())
	}

	fn delete(&self, key: &str) -> Result<bool, ClientError> {
		self.state.record(MockCall {
			op: "delete",
			key: Some(key.to_string()),
			expire: None,
			compression: None,
		});
		if let Some(error) = self.state.take_failure("delete") {
			return Err(error);
		}
		Ok(self.state.store.lock().unwrap().remove(key).is_some())
	}

	fn delete_multi(&self, keys: &[String]) -> Result<bool, ClientError> {
		self.state.record(MockCall {
			op: "delete_multi",
			key: None,
			expire: None,
			compression: None,
		});
		if let Some(error) = self.state.take_failure("delete_multi") {
			return Err(error);
		}
		let mut store = self.state.store.lock().unwrap();
		let mut all_deleted = true;
		for key in keys {
			all_deleted &= store.remove(key).is_some();
		}
		Ok(all_deleted)
	}

	fn incr(&self, key: &str, delta: u64) -> Result<Option<u64>, ClientError> {
		self.state.record(MockCall {
			op: "incr",
			key: Some(key.to_string()),
			expire: None,
			compression: None,
		});
		if let Some(error) = self.state.take_failure("incr") {
			return Err(error);
		}
		let mut store = self.state.store.lock().unwrap();
		match store.get_mut(key) {
			Some(bytes) => {
				let current = parse_counter(bytes);
				let updated = current + delta;
				*bytes = updated.to_string().into_bytes();
				Ok(Some(updated))
			}
			None => Ok(None),
		}
	}

	fn incr_multi(&self, keys: &[String], delta: u64) -> Result<(), ClientError> {
		self.state.record(MockCall {
			op: "incr_multi",
			key: None,
			expire: None,
			compression: None,
		});
		if let Some(error) = self.state.take_failure("incr_multi") {
			return Err(error);
		}
		let mut store = self.state.store.lock().unwrap();
		for key in keys {
			if let Some(bytes) = store.get_mut(key) {
				let updated = parse_counter(bytes) + delta;
				*bytes = updated.to_string().into_bytes();
			}
		}
		Ok(())
	}

	fn decr(&self, key: &str, delta: u64) -> Result<Option<u64>, ClientError> {
		self.state.record(MockCall {
			op: "decr",
			key: Some(key.to_string()),
			expire: None,
			compression: None,
		});
		if let Some(error) = self.state.take_failure("decr") {
			return Err(error);
		}
		let mut store = self.state.store.lock().unwrap();
		match store.get_mut(key) {
			Some(bytes) => {
				let updated = parse_counter(bytes).saturating_sub(delta);
				*bytes = updated.to_string().into_bytes();
				Ok(Some(updated))
			}
			None => Ok(None),
		}
	}

	fn flush(&self) -> Result<(), ClientError> {
		self.state.record(MockCall {
			op: "flush",
			key: None,
			expire: None,
			compression: None,
		});
		if let Some(error) = self.state.take_failure("flush") {
			return Err(error);
		}
		self.state.store.lock().unwrap().clear();
		Ok(())
	}

	fn apply_behaviors(&mut self, behaviors: &HashMap<String, String>) -> Result<(), ClientError> {
		if let Some(error) = self.state.take_failure("apply_behaviors") {
			return Err(error);
		}
		self.state
			.behaviors_applied
			.lock()
			.unwrap()
			.push(behaviors.clone());
		Ok(())
	}
}

fn parse_counter(bytes: &[u8]) -> u64 {
	std::str::from_utf8(bytes)
		.expect("counter value is not utf-8")
		.parse()
		.expect("counter value is not an integer")
}

pub struct MockConnector {
	state: Arc<MockState>,
	supports_compression: bool,
}

impl MockConnector {
	pub fn new(state: Arc<MockState>) -> Self {
		Self {
			state,
			supports_compression: false,
		}
	}

	pub fn with_compression(mut self, enabled: bool) -> Self {
		self.supports_compression = enabled;
		self
	}
}

impl Connector for MockConnector {
	fn connect(&self, config: &ClientConfig) -> Result<Box<dyn MemcacheClient>, ClientError> {
		self.state.configs.lock().unwrap().push(config.clone());
		if let Some(error) = self.state.take_failure("connect") {
			return Err(error);
		}
		self.state.connects.fetch_add(1, Ordering::SeqCst);
		Ok(Box::new(MockClient {
			state: Arc::clone(&self.state),
		}))
	}

	fn supports_compression(&self) -> bool {
		self.supports_compression
	}
}

/// Backend wired to a fresh mock, alongside the shared state for assertions.
pub fn mock_backend(params: CacheParams, settings: Settings) -> (MemcachedCache, Arc<MockState>) {
	let state = MockState::new();
	let connector = Arc::new(MockConnector::new(Arc::clone(&state)));
	let cache = MemcachedCache::builder("127.0.0.1:11211")
		.params(params)
		.settings(settings)
		.connector(connector)
		.build()
		.expect("mock backend should build");
	(cache, state)
}
