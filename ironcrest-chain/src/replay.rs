// Copyright 2016 The Grin Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The replay cache: the set of `TxId`s of all transactions in the
//! consensus chain within the replay window. Kept in memory, rebuilt
//! from storage on startup, and maintained incrementally by the engine
//! on every apply/rollback.

use std::collections::HashMap;

use ironcrest_core::height::Height;
use ironcrest_core::txid::{TxId, PIN_WINDOW};

/// Tracks every `TxId` whose `pinHeight` still lies in
/// `[tip - PIN_WINDOW + 1, tip]`, so `append_mined`/`stage_add` can
/// reject duplicates in O(1) without touching storage.
#[derive(Clone, Debug, Default)]
pub struct ReplayCache {
	ids: HashMap<TxId, ()>,
}

impl ReplayCache {
	/// An empty cache.
	pub fn new() -> ReplayCache {
		ReplayCache { ids: HashMap::new() }
	}

	/// Whether `id` is currently cached (i.e. would be a replay).
	pub fn contains(&self, id: &TxId) -> bool {
		self.ids.contains_key(id)
	}

	/// Records `id` as consumed, e.g. when a block containing it is applied.
	pub fn insert(&mut self, id: TxId) {
		self.ids.insert(id, ());
	}

	/// Un-records `id`, e.g. when the block that consumed it is rolled back.
	pub fn remove(&mut self, id: &TxId) {
		self.ids.remove(id);
	}

	/// Drops every id whose `pin_height` has fallen out of the replay
	/// window at `tip`. Returns the number of entries dropped, for logging.
	pub fn prune(&mut self, tip: Height) -> usize {
		let low = tip.saturating_sub(PIN_WINDOW - 1).max(1);
		let before = self.ids.len();
		self.ids.retain(|id, _| id.pin_height >= low && id.pin_height <= tip);
		before - self.ids.len()
	}

	/// Number of ids currently cached.
	pub fn len(&self) -> usize {
		self.ids.len()
	}

	/// Whether the cache holds no ids.
	pub fn is_empty(&self) -> bool {
		self.ids.is_empty()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use ironcrest_core::address::AccountId;

	fn id(pin_height: Height, nonce: u32) -> TxId {
		TxId { account_id: AccountId(0), pin_height, nonce_id: nonce }
	}

	#[test]
	fn insert_then_contains() {
		let mut cache = ReplayCache::new();
		cache.insert(id(5, 0));
		assert!(cache.contains(&id(5, 0)));
		assert!(!cache.contains(&id(5, 1)));
	}

	#[test]
	fn prune_drops_ids_outside_window() {
		let mut cache = ReplayCache::new();
		cache.insert(id(1, 0));
		cache.insert(id(PIN_WINDOW + 5, 0));
		let dropped = cache.prune(PIN_WINDOW + 5);
		assert_eq!(dropped, 1);
		assert!(!cache.contains(&id(1, 0)));
		assert!(cache.contains(&id(PIN_WINDOW + 5, 0)));
	}

	#[test]
	fn remove_reverses_insert() {
		let mut cache = ReplayCache::new();
		cache.insert(id(5, 0));
		cache.remove(&id(5, 0));
		assert!(cache.is_empty());
	}
}
