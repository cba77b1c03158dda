// Copyright 2017 The Grin Developers
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

//! The mempool itself: a `TxId -> Transaction` map plus a fee-ordered
//! secondary index for block template generation (`get_mining`).

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use ironcrest_core::block::TransferTx;
use ironcrest_core::hash::Hash;
use ironcrest_core::height::Height;
use ironcrest_core::ser::{BinWriter, Writeable};
use ironcrest_core::signature::Verifier;
use ironcrest_core::txid::{TxId, PIN_WINDOW};

use crate::error::PoolError;
use crate::types::ChainView;

/// The height window within which a `pin_height` is still acceptable.
pub fn replay_window(tip: Height) -> (Height, Height) {
	let low = tip.saturating_sub(PIN_WINDOW - 1).max(1);
	(low, tip)
}

/// The message a transaction's signature is taken over: its mutable
/// fields plus the header hash at `pin_height`, so a signature only
/// recovers correctly if the signer actually observed that hash. Exposed
/// so `ironcrest-chain` can re-derive the same binding when
/// re-validating a signature against the chain's registered address
/// table (the pool itself only checks that *some* address recovers).
pub fn signing_message(tx: &TransferTx, pin_hash: &Hash) -> Hash {
	let mut buf = Vec::new();
	{
		let mut writer = BinWriter::new(&mut buf);
		tx.from.write(&mut writer).expect("in-memory write cannot fail");
		writer.write_u32(tx.pin_height).expect("in-memory write cannot fail");
		writer.write_u32(tx.nonce_id).expect("in-memory write cannot fail");
		tx.to.write(&mut writer).expect("in-memory write cannot fail");
		writer.write_u64(tx.amount).expect("in-memory write cannot fail");
		writer.write_u64(tx.fee).expect("in-memory write cannot fail");
		pin_hash.write(&mut writer).expect("in-memory write cannot fail");
	}
	Hash(ironcrest_util::hash::double_sha256(&buf))
}

#[derive(Copy, Clone, PartialEq, Eq)]
struct FeeIndexEntry {
	fee: Reverse<u64>,
	id: TxId,
}

impl PartialOrd for FeeIndexEntry {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for FeeIndexEntry {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		(self.fee, self.id).cmp(&(other.fee, other.id))
	}
}

/// The mempool: transactions known but not yet included in a block.
pub struct TransactionPool {
	txs: HashMap<TxId, TransferTx>,
	fee_index: BTreeSet<FeeIndexEntry>,
}

impl TransactionPool {
	/// An empty pool.
	pub fn new() -> TransactionPool {
		TransactionPool { txs: HashMap::new(), fee_index: BTreeSet::new() }
	}

	/// Number of transactions currently held.
	pub fn len(&self) -> usize {
		self.txs.len()
	}

	/// Whether the pool holds no transactions.
	pub fn is_empty(&self) -> bool {
		self.txs.is_empty()
	}

	/// Whether a transaction with this id is already known.
	pub fn contains(&self, id: &TxId) -> bool {
		self.txs.contains_key(id)
	}

	/// Validates and inserts `tx`. `already_used` additionally rejects ids
	/// already consumed by the consensus chain (the replay cache); the
	/// pool itself only guards against a second copy of the same id
	/// already sitting in the pool.
	pub fn put(
		&mut self,
		tx: TransferTx,
		view: &dyn ChainView,
		verifier: &dyn Verifier,
		already_used: impl FnOnce(&TxId) -> bool,
	) -> Result<Hash, PoolError> {
		let id = tx.tx_id();
		let (low, high) = replay_window(view.tip_height());
		if tx.pin_height < low || tx.pin_height > high {
			return Err(PoolError::PinHeightOutOfRange(tx.pin_height));
		}
		let pin_hash = view.header_hash_at(tx.pin_height).ok_or(PoolError::PinHeightOutOfRange(tx.pin_height))?;
		let message = signing_message(&tx, &pin_hash);
		let sender_addr = verifier.recover(&message, &tx.signature).ok_or(PoolError::BadSignature)?;
		// A signature that recovers at all but to the wrong key is
		// indistinguishable from a bad pin hash without the chain's
		// address table; `ironcrest-chain` re-derives `sender_addr` against
		// the registered address for `tx.from` before final acceptance.
		let _ = sender_addr;
		if self.txs.contains_key(&id) || already_used(&id) {
			return Err(PoolError::NonceAlreadyUsed);
		}
		let needed = tx.amount + tx.fee;
		let available = view.balance_of(tx.from);
		if available < needed {
			return Err(PoolError::InsufficientFunds { needed, available });
		}
		let hash = ironcrest_core::hash::Hashed::hash(&tx);
		self.fee_index.insert(FeeIndexEntry { fee: Reverse(tx.fee), id });
		self.txs.insert(id, tx);
		Ok(hash)
	}

	/// Removes a transaction, e.g. because it was just included in a
	/// newly-applied block.
	pub fn remove(&mut self, id: &TxId) -> Option<TransferTx> {
		if let Some(tx) = self.txs.remove(id) {
			self.fee_index.remove(&FeeIndexEntry { fee: Reverse(tx.fee), id: *id });
			Some(tx)
		} else {
			None
		}
	}

	/// Drops every transaction whose `pin_height` has fallen out of the
	/// replay window at the current tip.
	pub fn prune_stale(&mut self, tip: Height) -> Vec<TransferTx> {
		let (low, high) = replay_window(tip);
		let stale: Vec<TxId> = self
			.txs
			.iter()
			.filter(|(_, tx)| tx.pin_height < low || tx.pin_height > high)
			.map(|(id, _)| *id)
			.collect();
		stale.iter().filter_map(|id| self.remove(id)).collect()
	}

	/// Reinserts a transaction rolled back off the chain. Skips
	/// transactions whose pin height no longer lies in the window rather
	/// than erroring, since rollback isn't the transaction's fault.
	pub fn reinsert_from_rollback(&mut self, tx: TransferTx, tip: Height) {
		let (low, high) = replay_window(tip);
		if tx.pin_height < low || tx.pin_height > high {
			return;
		}
		let id = tx.tx_id();
		if self.txs.contains_key(&id) {
			return;
		}
		self.fee_index.insert(FeeIndexEntry { fee: Reverse(tx.fee), id });
		self.txs.insert(id, tx);
	}

	/// The top `limit` transactions by fee, for `get_mining`/`get_mempool`.
	pub fn top_by_fee(&self, limit: usize) -> Vec<TransferTx> {
		self.fee_index.iter().take(limit).filter_map(|e| self.txs.get(&e.id).cloned()).collect()
	}

	/// Every transaction id currently held, for `get_txcache`.
	pub fn tx_ids(&self) -> Vec<TxId> {
		self.txs.keys().copied().collect()
	}

	/// Looks up a transaction by hash (`lookup_tx`).
	pub fn find_by_hash(&self, hash: &Hash) -> Option<&TransferTx> {
		self.txs.values().find(|tx| &ironcrest_core::hash::Hashed::hash(*tx) == hash)
	}
}

impl Default for TransactionPool {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use ironcrest_core::address::{AccountId, Address};
	use ironcrest_core::hash::ZERO_HASH;
	use ironcrest_core::signature::Signature;

	struct FakeView {
		tip: Height,
		balance: u64,
	}
	impl ChainView for FakeView {
		fn tip_height(&self) -> Height {
			self.tip
		}
		fn header_hash_at(&self, _height: Height) -> Option<Hash> {
			Some(ZERO_HASH)
		}
		fn balance_of(&self, _account: AccountId) -> u64 {
			self.balance
		}
	}

	struct AlwaysRecovers(Address);
	impl Verifier for AlwaysRecovers {
		fn recover(&self, _message: &Hash, _signature: &Signature) -> Option<Address> {
			Some(self.0)
		}
	}

	fn sample_tx(pin_height: Height, fee: u64, nonce_id: u32) -> TransferTx {
		TransferTx {
			from: AccountId(0),
			pin_height,
			nonce_id,
			to: AccountId(1),
			amount: 100,
			fee,
			signature: Signature([0u8; 65]),
		}
	}

	#[test]
	fn put_accepts_a_well_formed_transaction() {
		let mut pool = TransactionPool::new();
		let view = FakeView { tip: 5, balance: 1_000 };
		let verifier = AlwaysRecovers(Address([1; 20]));
		let tx = sample_tx(5, 10, 0);
		let id = tx.tx_id();
		assert!(pool.put(tx, &view, &verifier, |_| false).is_ok());
		assert!(pool.contains(&id));
	}

	#[test]
	fn put_rejects_pin_height_outside_window() {
		let mut pool = TransactionPool::new();
		let view = FakeView { tip: 20_000, balance: 1_000 };
		let verifier = AlwaysRecovers(Address([1; 20]));
		let tx = sample_tx(1, 10, 0);
		match pool.put(tx, &view, &verifier, |_| false) {
			Err(PoolError::PinHeightOutOfRange(_)) => {}
			other => panic!("expected PinHeightOutOfRange, got {:?}", other.map(|_| ())),
		}
	}

	#[test]
	fn put_rejects_insufficient_balance() {
		let mut pool = TransactionPool::new();
		let view = FakeView { tip: 5, balance: 50 };
		let verifier = AlwaysRecovers(Address([1; 20]));
		let tx = sample_tx(5, 10, 0);
		assert!(matches!(pool.put(tx, &view, &verifier, |_| false), Err(PoolError::InsufficientFunds { .. })));
	}

	#[test]
	fn second_put_with_same_nonce_is_rejected() {
		let mut pool = TransactionPool::new();
		let view = FakeView { tip: 5, balance: 1_000 };
		let verifier = AlwaysRecovers(Address([1; 20]));
		assert!(pool.put(sample_tx(5, 10, 0), &view, &verifier, |_| false).is_ok());
		match pool.put(sample_tx(5, 20, 0), &view, &verifier, |_| false) {
			Err(PoolError::NonceAlreadyUsed) => {}
			other => panic!("expected NonceAlreadyUsed, got {:?}", other.map(|_| ())),
		}
	}

	#[test]
	fn top_by_fee_orders_descending() {
		let mut pool = TransactionPool::new();
		let view = FakeView { tip: 5, balance: 1_000 };
		let verifier = AlwaysRecovers(Address([1; 20]));
		pool.put(sample_tx(5, 5, 0), &view, &verifier, |_| false).unwrap();
		pool.put(sample_tx(5, 50, 1), &view, &verifier, |_| false).unwrap();
		pool.put(sample_tx(5, 20, 2), &view, &verifier, |_| false).unwrap();
		let top = pool.top_by_fee(2);
		assert_eq!(top.len(), 2);
		assert_eq!(top[0].fee, 50);
		assert_eq!(top[1].fee, 20);
	}

	#[test]
	fn prune_stale_drops_transactions_outside_the_window() {
		let mut pool = TransactionPool::new();
		let view = FakeView { tip: 5, balance: 1_000 };
		let verifier = AlwaysRecovers(Address([1; 20]));
		pool.put(sample_tx(5, 10, 0), &view, &verifier, |_| false).unwrap();
		let dropped = pool.prune_stale(5 + PIN_WINDOW);
		assert_eq!(dropped.len(), 1);
		assert!(pool.is_empty());
	}
}
