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

//! The narrow handle the `ChainEngine` actor uses to reach persistence:
//! every row type lives prefix-keyed in a single LMDB database, so one
//! [`lmdb::Batch`] gives a whole mutation one atomic commit.

use std::collections::HashSet;

use ironcrest_core::address::{AccountId, Address};
use ironcrest_core::block::Body;
use ironcrest_core::hash::Hash;
use ironcrest_core::header::Header;
use ironcrest_core::height::Height;
use ironcrest_core::ser::{self, BinReader, BinWriter, Readable, Writeable};
use ironcrest_core::txid::TxId;

use crate::lmdb::{self, Store};
use crate::types::{
	account_history_key, account_history_prefix, account_key, address_index_key, badblock_key,
	body_key, hash_index_key, header_key, history_key, undo_key, AccountRow, BadblockRow,
	ConsensusRow, HistoryRow, CONSENSUS_TIP_KEY,
};

/// Reversible delta recorded when a block is applied, so `rollback_to` can
/// undo it exactly. Keyed by the height it was recorded at.
#[derive(Clone, Debug, Default)]
pub struct UndoLog {
	/// Account balances as they were *before* this block, for every
	/// account this block touched (including newly-created accounts,
	/// whose prior balance is implicitly 0 and is reversed by deletion).
	pub balance_before: Vec<(AccountId, u64)>,
	/// Accounts newly introduced by this block (reversed by deleting the
	/// account row and its address index entry).
	pub new_accounts: Vec<(AccountId, Address)>,
	/// `TxId`s this block inserted into the replay set.
	pub inserted_tx_ids: Vec<TxId>,
	/// `(account_id, history_id)` pairs this block appended, including the
	/// reward; reversed by deleting both the flat history row and the
	/// per-account index rows.
	pub inserted_history: Vec<(AccountId, u64)>,
}

impl Writeable for UndoLog {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u32(self.balance_before.len() as u32)?;
		for (id, bal) in &self.balance_before {
			id.write(writer)?;
			writer.write_u64(*bal)?;
		}
		writer.write_u32(self.new_accounts.len() as u32)?;
		for (id, addr) in &self.new_accounts {
			id.write(writer)?;
			addr.write(writer)?;
		}
		writer.write_u32(self.inserted_tx_ids.len() as u32)?;
		for tx in &self.inserted_tx_ids {
			tx.write(writer)?;
		}
		writer.write_u32(self.inserted_history.len() as u32)?;
		for (id, hist) in &self.inserted_history {
			id.write(writer)?;
			writer.write_u64(*hist)?;
		}
		Ok(())
	}
}

impl Readable for UndoLog {
	fn read(reader: &mut BinReader) -> Result<UndoLog, ser::Error> {
		let mut undo = UndoLog::default();
		let n = reader.read_u32()?;
		for _ in 0..n {
			undo.balance_before.push((AccountId::read(reader)?, reader.read_u64()?));
		}
		let n = reader.read_u32()?;
		for _ in 0..n {
			undo.new_accounts.push((AccountId::read(reader)?, Address::read(reader)?));
		}
		let n = reader.read_u32()?;
		for _ in 0..n {
			undo.inserted_tx_ids.push(TxId::read(reader)?);
		}
		let n = reader.read_u32()?;
		for _ in 0..n {
			undo.inserted_history.push((AccountId::read(reader)?, reader.read_u64()?));
		}
		Ok(undo)
	}
}

/// Persistence handle for the chain engine. Single LMDB database, prefix
/// keyed, one `Batch` per mutation for atomicity.
pub struct ChainStore {
	store: Store,
	/// Heights whose body must survive garbage collection even though
	/// they're no longer on the canonical chain (used by `stage_set` to
	/// protect overlapping blocks in storage).
	retained: std::sync::Mutex<HashSet<Height>>,
}

impl ChainStore {
	/// Opens (creating if absent) the chain database under `path`.
	pub fn open(path: &str) -> ChainStore {
		let env = lmdb::new_env(path);
		let store = Store::open(env, "chain");
		ChainStore { store, retained: std::sync::Mutex::new(HashSet::new()) }
	}

	/// Starts an atomic mutation.
	pub fn batch(&self) -> Result<ChainBatch, lmdb::Error> {
		Ok(ChainBatch { batch: self.store.batch()? })
	}

	/// The current consensus tip row, or the all-zero row before genesis.
	pub fn consensus(&self) -> Result<ConsensusRow, lmdb::Error> {
		Ok(self
			.store
			.get_ser(CONSENSUS_TIP_KEY)?
			.unwrap_or(ConsensusRow { height: 0, descriptor: 0, history_cursor: 0, account_cursor: 0 }))
	}

	/// Reads the header stored at `height`.
	pub fn get_header(&self, height: Height) -> Result<Option<Header>, lmdb::Error> {
		self.store.get_ser(&header_key(height))
	}

	/// Reads the body stored at `height`.
	pub fn get_body(&self, height: Height) -> Result<Option<Body>, lmdb::Error> {
		self.store.get_ser(&body_key(height))
	}

	/// Resolves a header hash to the height it's stored at, if canonical.
	pub fn height_of_hash(&self, hash: &Hash) -> Result<Option<Height>, lmdb::Error> {
		self.store.get_ser(&hash_index_key(hash))
	}

	/// Reads the undo log recorded for `height`.
	pub fn get_undo(&self, height: Height) -> Result<Option<UndoLog>, lmdb::Error> {
		self.store.get_ser(&undo_key(height))
	}

	/// Reads an account's row.
	pub fn get_account(&self, id: AccountId) -> Result<Option<AccountRow>, lmdb::Error> {
		self.store.get_ser(&account_key(id))
	}

	/// Resolves an address to its assigned `AccountId`, if registered.
	pub fn account_id_of(&self, address: &Address) -> Result<Option<AccountId>, lmdb::Error> {
		self.store.get_ser(&address_index_key(address))
	}

	/// Every known account, for `get_richlist`. Uses `keys_with_prefix`
	/// rather than `Store::iter` since the account id lives in the key, not
	/// just the value.
	pub fn all_accounts(&self) -> Result<Vec<(AccountId, AccountRow)>, lmdb::Error> {
		let keys = self.store.keys_with_prefix(b"A")?;
		let mut out = Vec::with_capacity(keys.len());
		for key in keys {
			if key.len() != 1 + 8 {
				continue;
			}
			let mut buf = [0u8; 8];
			buf.copy_from_slice(&key[1..]);
			let id = AccountId(u64::from_be_bytes(buf));
			if let Some(row) = self.get_account(id)? {
				out.push((id, row));
			}
		}
		Ok(out)
	}

	/// Reads the rejected header recorded for `height`, if any.
	pub fn get_badblock(&self, height: Height) -> Result<Option<Header>, lmdb::Error> {
		Ok(self.store.get_ser::<BadblockRow>(&badblock_key(height))?.map(|r| r.header))
	}

	/// Paginates an account's history backward from `before_id` (exclusive),
	/// newest-first, up to `limit` entries.
	pub fn get_history(
		&self,
		account_id: AccountId,
		before_id: Option<u64>,
		limit: usize,
	) -> Result<Vec<(u64, HistoryRow)>, lmdb::Error> {
		let prefix = account_history_prefix(account_id);
		let keys = self.store.keys_with_prefix(&prefix)?;
		let mut ids: Vec<u64> = keys
			.into_iter()
			.filter_map(|k| {
				let suffix = &k[prefix.len()..];
				if suffix.len() == 8 {
					let mut buf = [0u8; 8];
					buf.copy_from_slice(suffix);
					Some(u64::from_be_bytes(buf))
				} else {
					None
				}
			})
			.collect();
		ids.retain(|id| before_id.map(|b| *id < b).unwrap_or(true));
		ids.sort_unstable_by(|a, b| b.cmp(a));
		ids.truncate(limit);
		let mut out = Vec::with_capacity(ids.len());
		for id in ids {
			if let Some(row) = self.store.get_ser::<HistoryRow>(&history_key(id))? {
				out.push((id, row));
			}
		}
		Ok(out)
	}

	/// Marks `height` as retained: its body must not be garbage collected
	/// even if a reorg currently leaves it off the canonical chain.
	pub fn retain(&self, height: Height) {
		self.retained.lock().unwrap().insert(height);
	}

	/// Releases a previously retained height, allowing GC to reclaim it.
	pub fn release(&self, height: Height) {
		self.retained.lock().unwrap().remove(&height);
	}

	/// Whether `height` is currently retained.
	pub fn is_retained(&self, height: Height) -> bool {
		self.retained.lock().unwrap().contains(&height)
	}

	/// Best-effort convenience wrapper around `ChainBatch::mark_badblock`
	/// for callers that don't otherwise need a batch of their own.
	pub fn mark_badblock(&self, height: Height, header: &Header) -> Result<(), lmdb::Error> {
		let batch = self.batch()?;
		batch.mark_badblock(height, header)?;
		batch.commit()
	}
}

/// One atomic mutation against the chain store.
pub struct ChainBatch<'a> {
	batch: lmdb::Batch<'a>,
}

impl<'a> ChainBatch<'a> {
	/// Reads a header, observing this batch's own uncommitted writes (needed
	/// when a block's body references a height written earlier in the same
	/// batch, e.g. never happens for headers but kept symmetric with
	/// [`ChainBatch::get_account`]).
	pub fn get_header(&self, height: Height) -> Result<Option<Header>, lmdb::Error> {
		self.batch.get_ser(&header_key(height))
	}

	/// Reads an account row, observing this batch's own uncommitted writes
	/// (needed so a transaction can reference an account registered by the
	/// same block's address table, before that registration is committed).
	pub fn get_account(&self, id: AccountId) -> Result<Option<AccountRow>, lmdb::Error> {
		self.batch.get_ser(&account_key(id))
	}

	/// Resolves an address to its account id, observing this batch's own
	/// uncommitted writes.
	pub fn account_id_of(&self, address: &Address) -> Result<Option<AccountId>, lmdb::Error> {
		self.batch.get_ser(&address_index_key(address))
	}

	/// Overwrites the consensus tip row.
	pub fn set_consensus(&self, row: ConsensusRow) -> Result<(), lmdb::Error> {
		self.batch.put_ser(CONSENSUS_TIP_KEY, &row)
	}

	/// Stores a header and its hash index entry.
	pub fn put_header(&self, height: Height, header: &Header) -> Result<(), lmdb::Error> {
		self.batch.put_ser(&header_key(height), header)?;
		self.batch.put_ser(&hash_index_key(&ironcrest_core::hash::Hashed::hash(header)), &height)
	}

	/// Removes a header and its hash index entry (used when trimming a
	/// losing stage/rolled-back height).
	pub fn delete_header(&self, height: Height, header: &Header) -> Result<(), lmdb::Error> {
		self.batch.delete(&hash_index_key(&ironcrest_core::hash::Hashed::hash(header)))?;
		self.batch.delete(&header_key(height))
	}

	/// Stores a body.
	pub fn put_body(&self, height: Height, body: &Body) -> Result<(), lmdb::Error> {
		self.batch.put_ser(&body_key(height), body)
	}

	/// Removes a body.
	pub fn delete_body(&self, height: Height) -> Result<(), lmdb::Error> {
		self.batch.delete(&body_key(height))
	}

	/// Stores the undo log for `height`.
	pub fn put_undo(&self, height: Height, undo: &UndoLog) -> Result<(), lmdb::Error> {
		self.batch.put_ser(&undo_key(height), undo)
	}

	/// Removes the undo log for `height` once it can no longer be rolled
	/// back to (past the retained window).
	pub fn delete_undo(&self, height: Height) -> Result<(), lmdb::Error> {
		self.batch.delete(&undo_key(height))
	}

	/// Writes (or overwrites) an account row.
	pub fn put_account(&self, id: AccountId, row: AccountRow) -> Result<(), lmdb::Error> {
		self.batch.put_ser(&account_key(id), &row)
	}

	/// Registers a brand-new account and its address index entry.
	pub fn register_account(&self, id: AccountId, row: AccountRow) -> Result<(), lmdb::Error> {
		self.batch.put_ser(&address_index_key(&row.address), &id)?;
		self.put_account(id, row)
	}

	/// Removes an account and its address index entry (reversing
	/// `register_account` during rollback).
	pub fn deregister_account(&self, id: AccountId, address: &Address) -> Result<(), lmdb::Error> {
		self.batch.delete(&address_index_key(address))?;
		self.batch.delete(&account_key(id))
	}

	/// Appends a flat history entry plus its per-account index rows.
	pub fn append_history(
		&self,
		history_id: u64,
		accounts: &[AccountId],
		row: &HistoryRow,
	) -> Result<(), lmdb::Error> {
		self.batch.put_ser(&history_key(history_id), row)?;
		for account_id in accounts {
			self.batch.put(&account_history_key(*account_id, history_id), vec![])?;
		}
		Ok(())
	}

	/// Reverses `append_history`.
	pub fn remove_history(&self, history_id: u64, accounts: &[AccountId]) -> Result<(), lmdb::Error> {
		self.batch.delete(&history_key(history_id))?;
		for account_id in accounts {
			self.batch.delete(&account_history_key(*account_id, history_id))?;
		}
		Ok(())
	}

	/// Records a header that failed validation, so a probe for a retired
	/// chain can still answer with it.
	pub fn mark_badblock(&self, height: Height, header: &Header) -> Result<(), lmdb::Error> {
		self.batch.put_ser(&badblock_key(height), &BadblockRow { header: *header })
	}

	/// Commits every write made through this batch atomically.
	pub fn commit(self) -> Result<(), lmdb::Error> {
		self.batch.commit()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use ironcrest_core::hash::ZERO_HASH;

	fn open_tmp() -> (tempfile::TempDir, ChainStore) {
		let dir = tempfile::tempdir().unwrap();
		let store = ChainStore::open(dir.path().to_str().unwrap());
		(dir, store)
	}

	#[test]
	fn header_and_account_roundtrip_through_a_batch() {
		let (_dir, store) = open_tmp();
		let header = Header {
			version: 1,
			prev_hash: ZERO_HASH,
			merkle_root: ZERO_HASH,
			timestamp: 1,
			target_raw: 0,
			nonce: 0,
		};
		let addr = Address([7u8; 20]);
		{
			let batch = store.batch().unwrap();
			batch.put_header(1, &header).unwrap();
			batch.register_account(AccountId(0), AccountRow { address: addr, balance: 50 }).unwrap();
			batch.commit().unwrap();
		}
		assert_eq!(store.get_header(1).unwrap(), Some(header));
		assert_eq!(store.account_id_of(&addr).unwrap(), Some(AccountId(0)));
		assert_eq!(store.get_account(AccountId(0)).unwrap().unwrap().balance, 50);
	}

	#[test]
	fn undo_log_roundtrips() {
		let (_dir, store) = open_tmp();
		let undo = UndoLog {
			balance_before: vec![(AccountId(0), 10)],
			new_accounts: vec![(AccountId(1), Address([1; 20]))],
			inserted_tx_ids: vec![TxId { account_id: AccountId(0), pin_height: 1, nonce_id: 0 }],
			inserted_history: vec![(AccountId(0), 0)],
		};
		{
			let batch = store.batch().unwrap();
			batch.put_undo(5, &undo).unwrap();
			batch.commit().unwrap();
		}
		let got = store.get_undo(5).unwrap().unwrap();
		assert_eq!(got.balance_before, undo.balance_before);
		assert_eq!(got.inserted_tx_ids, undo.inserted_tx_ids);
	}

	#[test]
	fn account_history_pagination_returns_newest_first() {
		let (_dir, store) = open_tmp();
		let account = AccountId(0);
		{
			let batch = store.batch().unwrap();
			for i in 0..5u64 {
				batch
					.append_history(i, &[account], &HistoryRow { hash: ZERO_HASH, data: vec![i as u8] })
					.unwrap();
			}
			batch.commit().unwrap();
		}
		let page = store.get_history(account, None, 2).unwrap();
		assert_eq!(page.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![4, 3]);
		let next = store.get_history(account, Some(3), 2).unwrap();
		assert_eq!(next.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![2, 1]);
	}
}
