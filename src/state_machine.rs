//! In-memory key/value state machine (spec.md §4.4).
//!
//! Grounded in `pyraft.storage.StateMachine`: a plain dict cache with a
//! default `update`-style `apply`, overridable by installing a handler that
//! may itself be async (the core does not block on its completion).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::protos::Command;

/// The shared cache handle passed to a custom `ApplyHandler`, so a handler
/// can actually write into the same store `StateMachine::get` reads from
/// (spec.md §4.4: the core invokes the handler with `(state_machine,
/// command)`).
pub type Cache = Arc<Mutex<HashMap<String, Value>>>;

pub type ApplyHandler =
	Arc<dyn Fn(Cache, Command) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct StateMachine {
	cache: Cache,
	handler: Option<ApplyHandler>,
}

impl StateMachine {
	pub fn new() -> Self {
		StateMachine {
			cache: Arc::new(Mutex::new(HashMap::new())),
			handler: None,
		}
	}

	/// Installs a handler invoked in place of the default merge behaviour.
	/// Per spec.md §4.4 the handler may be asynchronous; the core spawns it
	/// and moves on rather than blocking the commit/apply loop.
	pub fn set_apply_handler(&mut self, handler: ApplyHandler) {
		self.handler = Some(handler);
	}

	pub fn get(&self, key: &str) -> Option<Value> {
		self.cache.lock().unwrap().get(key).cloned()
	}

	/// Default behaviour: merge `command` into the store.
	fn merge(&self, command: &Command) {
		let mut cache = self.cache.lock().unwrap();
		for (key, value) in command {
			cache.insert(key.clone(), value.clone());
		}
	}

    /// Applies one committed command. Must be called exactly once per
    /// committed log index, in index order (spec.md §4.4) — the role
    /// engine's commit/apply loop is responsible for that ordering; this
    /// method itself has no notion of log indices.
	pub fn apply(&mut self, command: Command) {
		match &self.handler {
			Some(handler) => {
				let fut = handler(self.cache.clone(), command);
				tokio::spawn(fut);
			}
			None => self.merge(&command),
		}
	}
}

impl Default for StateMachine {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cmd(pairs: &[(&str, i64)]) -> Command {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), serde_json::json!(v)))
			.collect()
	}

	#[test]
	fn default_apply_merges_the_command_into_the_store() {
		let mut sm = StateMachine::new();
		sm.apply(cmd(&[("x", 1)]));
		sm.apply(cmd(&[("y", 2)]));
		assert_eq!(sm.get("x"), Some(serde_json::json!(1)));
		assert_eq!(sm.get("y"), Some(serde_json::json!(2)));
	}

	#[test]
	fn later_apply_overwrites_earlier_keys() {
		let mut sm = StateMachine::new();
		sm.apply(cmd(&[("x", 1)]));
		sm.apply(cmd(&[("x", 2)]));
		assert_eq!(sm.get("x"), Some(serde_json::json!(2)));
	}

	#[tokio::test]
	async fn custom_handler_can_write_into_the_shared_cache() {
		let mut sm = StateMachine::new();
		let (tx, rx) = tokio::sync::oneshot::channel();
		let tx = Mutex::new(Some(tx));
		sm.set_apply_handler(Arc::new(move |cache: Cache, command: Command| {
			let tx = tx.lock().unwrap().take();
			Box::pin(async move {
				for (key, value) in &command {
					cache.lock().unwrap().insert(key.clone(), value.clone());
				}
				if let Some(tx) = tx {
					let _ = tx.send(());
				}
			})
		}));
		sm.apply(cmd(&[("x", 5)]));
		rx.await.unwrap();
		// The handler's write is visible through the same `get` the default
		// merge path uses, not just to the handler's own cache clone.
		assert_eq!(sm.get("x"), Some(serde_json::json!(5)));
	}
}
