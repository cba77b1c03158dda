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

//! `ChainEngine`: the single-threaded owner of the canonical chain, stage
//! chain, mempool, and replay cache. Every mutation goes through
//! `&mut self`; callers (the orchestrator actor in `ironcrest-servers`)
//! serialize access by routing through one event loop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ironcrest_core::address::{AccountId, AccountRef, Address};
use ironcrest_core::block::{AddressTableEntry, Block, Body, RewardTx, TransferTx};
use ironcrest_core::consensus::{BLOCK_TIME_SECONDS, MEDIAN_TIME_SPAN, RETARGET_WINDOW};
use ironcrest_core::genesis::{self, Network};
use ironcrest_core::hash::{Hash, Hashed};
use ironcrest_core::header::Header;
use ironcrest_core::height::Height;
use ironcrest_core::pow::{self, PowHasher};
use ironcrest_core::signature::Verifier;
use ironcrest_core::target::{Target, Worksum};
use ironcrest_core::txid::{TxId, PIN_WINDOW};
use ironcrest_pool::{signing_message, ChainView, PoolError, TransactionPool, TxSource};
use ironcrest_store::chain_store::{ChainBatch, UndoLog};
use ironcrest_store::types::{AccountRow, ConsensusRow, HistoryRow};
use ironcrest_store::ChainStore;

use crate::error::{ChainError, Error, ErrorKind};
use crate::params::{block_reward, ConsensusParams};
use crate::replay::ReplayCache;
use crate::stage::StageChain;
use crate::types::{ChainDescriptor, ChainEvent, ChainState, HistoryEntry, MiningTemplate, SignedSnapshot, StateUpdate};

/// How many mempool candidates `get_mining` pulls by fee before filtering
/// down to ones that actually fit under the simulated block balances.
const MINING_CANDIDATE_MULTIPLIER: usize = 4;

fn now_unix() -> u32 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0)
}

/// The chain engine. Owns persistence, the in-memory chain descriptor,
/// the stage chain, the mempool, and the replay cache.
pub struct ChainEngine {
	store: ChainStore,
	params: ConsensusParams,
	pow: Arc<dyn PowHasher>,
	verifier: Arc<dyn Verifier>,
	/// Configured leader address a signed snapshot's signature must
	/// recover to.
	leader_address: Option<Address>,
	descriptor: ChainDescriptor,
	stage: StageChain,
	mempool: TransactionPool,
	replay: ReplayCache,
	state: ChainState,
	snapshot: Option<SignedSnapshot>,
	genesis_hash: Hash,
	genesis_timestamp: u32,
	history_cursor: u64,
	account_cursor: u64,
}

/// Read-only view of consensus state handed to `ironcrest-pool`'s
/// `TransactionPool` for admission checks against current balances and
/// pin heights.
struct EngineView<'a> {
	store: &'a ChainStore,
	descriptor: &'a ChainDescriptor,
	genesis_hash: Hash,
}

impl<'a> ChainView for EngineView<'a> {
	fn tip_height(&self) -> Height {
		self.descriptor.length
	}

	fn header_hash_at(&self, height: Height) -> Option<Hash> {
		if height == 0 {
			return Some(self.genesis_hash);
		}
		if height > self.descriptor.length {
			return None;
		}
		self.store.get_header(height).ok().flatten().map(|h| h.hash())
	}

	fn balance_of(&self, account: AccountId) -> u64 {
		self.store.get_account(account).ok().flatten().map(|r| r.balance).unwrap_or(0)
	}
}

/// Per-block bookkeeping: caches account rows touched so far (so a
/// within-block double-spend sees its own prior debit) and the undo
/// entries accumulated for this height.
struct Ledger<'a, 'b> {
	batch: &'b ChainBatch<'a>,
	rows: HashMap<AccountId, AccountRow>,
	/// Balance as it stood before this block, recorded once per account.
	balance_before: HashMap<AccountId, u64>,
	new_accounts: Vec<(AccountId, Address)>,
	inserted_tx_ids: Vec<TxId>,
	inserted_history: Vec<(AccountId, u64)>,
}

impl<'a, 'b> Ledger<'a, 'b> {
	fn new(batch: &'b ChainBatch<'a>) -> Self {
		Ledger {
			batch,
			rows: HashMap::new(),
			balance_before: HashMap::new(),
			new_accounts: Vec::new(),
			inserted_tx_ids: Vec::new(),
			inserted_history: Vec::new(),
		}
	}

	fn get(&mut self, id: AccountId) -> Result<Option<AccountRow>, Error> {
		if let Some(row) = self.rows.get(&id) {
			return Ok(Some(*row));
		}
		match self.batch.get_account(id)? {
			Some(row) => {
				self.rows.insert(id, row);
				Ok(Some(row))
			}
			None => Ok(None),
		}
	}

	fn touch(&mut self, id: AccountId, row: AccountRow) {
		self.balance_before.entry(id).or_insert(row.balance);
		self.rows.insert(id, row);
	}

	fn register_new(&mut self, id: AccountId, address: Address) {
		let row = AccountRow { address, balance: 0 };
		self.rows.insert(id, row);
		self.new_accounts.push((id, address));
	}

	fn into_undo(self) -> UndoLog {
		UndoLog {
			balance_before: self.balance_before.into_iter().collect(),
			new_accounts: self.new_accounts,
			inserted_tx_ids: self.inserted_tx_ids,
			inserted_history: self.inserted_history,
		}
	}
}

impl ChainEngine {
	/// Opens (or initializes) the chain engine against `store`, rebuilding
	/// the in-memory descriptor, replay cache, and account/history
	/// cursors from the persisted chain. The mempool always starts empty
	/// on restart: it is not persisted, and a restarted node re-learns it
	/// from peer gossip.
	pub fn open(
		store: ChainStore,
		network: Network,
		pow: Arc<dyn PowHasher>,
		verifier: Arc<dyn Verifier>,
		leader_address: Option<Address>,
	) -> Result<ChainEngine, Error> {
		let params = ConsensusParams::for_network(network);
		let genesis = genesis::genesis_block(network);
		let genesis_hash = genesis.header.hash();
		let row = store.consensus()?;

		let mut descriptor = ChainDescriptor::genesis(genesis_hash);
		let mut replay = ReplayCache::new();
		for height in 1..=row.height {
			let header = store
				.get_header(height)?
				.ok_or_else(|| Error::from(ErrorKind::StoreErr(format!("missing header at height {}", height))))?;
			let target = params.target_at(header.target_raw, height);
			descriptor.append(&header, Worksum::from_target(target));
			if let Some(undo) = store.get_undo(height)? {
				for id in undo.inserted_tx_ids {
					replay.insert(id);
				}
			}
		}
		descriptor.descriptor = row.descriptor;
		replay.prune(row.height);

		Ok(ChainEngine {
			store,
			params,
			pow,
			verifier,
			leader_address,
			descriptor,
			stage: StageChain::new(),
			mempool: TransactionPool::new(),
			replay,
			state: ChainState::Steady,
			snapshot: None,
			genesis_hash,
			genesis_timestamp: genesis.header.timestamp,
			history_cursor: row.history_cursor,
			account_cursor: row.account_cursor,
		})
	}

	/// The current consensus chain descriptor.
	pub fn descriptor(&self) -> &ChainDescriptor {
		&self.descriptor
	}

	/// Which phase of a mutation the engine is currently in.
	pub fn state(&self) -> ChainState {
		self.state
	}

	fn header_hash_at(&self, height: Height) -> Option<Hash> {
		if height == 0 {
			return Some(self.genesis_hash);
		}
		self.store.get_header(height).ok().flatten().map(|h| h.hash())
	}

	fn view(&self) -> EngineView {
		EngineView { store: &self.store, descriptor: &self.descriptor, genesis_hash: self.genesis_hash }
	}

	/// Median of the timestamps of the `MEDIAN_TIME_SPAN` blocks ending at
	/// `height` (bitcoin-style median-time-past).
	fn median_time_past(&self, height: Height) -> Result<u32, Error> {
		let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN);
		let mut h = height;
		while times.len() < MEDIAN_TIME_SPAN {
			if h == 0 {
				times.push(self.genesis_timestamp);
				break;
			}
			let header = self
				.store
				.get_header(h)?
				.ok_or_else(|| Error::from(ErrorKind::StoreErr(format!("missing header at height {}", h))))?;
			times.push(header.timestamp);
			h -= 1;
		}
		times.sort_unstable();
		Ok(times[times.len() / 2])
	}

	/// Computes the target the header at `height` must satisfy, from the
	/// trailing `RETARGET_WINDOW` timestamps.
	fn next_target(&self, height: Height) -> Result<Target, Error> {
		if height <= 1 {
			let raw = if self.params.target_v2_activation_height == 0 {
				self.params.min_target_v2.raw()
			} else {
				ironcrest_core::target::TargetV1::genesis().raw()
			};
			return Ok(self.params.target_at(raw, height));
		}
		let tip = height - 1;
		let window_start = tip.saturating_sub(RETARGET_WINDOW).max(1);
		let mut times = Vec::new();
		for h in window_start..=tip {
			let header = self
				.store
				.get_header(h)?
				.ok_or_else(|| Error::from(ErrorKind::StoreErr(format!("missing header at height {}", h))))?;
			times.push(header.timestamp);
		}
		let tip_header = self
			.store
			.get_header(tip)?
			.ok_or_else(|| Error::from(ErrorKind::StoreErr(format!("missing header at height {}", tip))))?;
		let current = self.params.target_at(tip_header.target_raw, tip);
		let actual = times.last().copied().unwrap_or(0).saturating_sub(times[0]).max(1);
		let expected = (BLOCK_TIME_SECONDS * (times.len() as u32 - 1).max(1)).max(1);
		Ok(match current {
			Target::V1(t) => Target::V1(t.scale(actual, expected)),
			Target::V2(t) => Target::V2(t.scale(actual, expected, self.params.min_target_v2)),
		})
	}

	/// Resolves an `AccountRef` to a concrete `AccountId`.
	pub fn resolve_account(&self, account: AccountRef) -> Option<AccountId> {
		match account {
			AccountRef::Id(id) => Some(id),
			AccountRef::Addr(addr) => self.store.account_id_of(&addr).ok().flatten(),
		}
	}

	/// Appends a single externally-mined block onto the current tip.
	pub fn append_mined(&mut self, block: Block) -> Result<StateUpdate, ChainError> {
		let height = block.height;
		if height != self.descriptor.length + 1 {
			return Err(self.fail(height, ErrorKind::WrongHeight));
		}
		let worksum_delta = self
			.apply_single(height, block.header, block.body)
			.map_err(|e| ChainError { error: e, height })?;
		self.descriptor.append(&block.header, worksum_delta);
		self.replay.prune(self.descriptor.length);
		self.mempool.prune_stale(self.descriptor.length);
		Ok(StateUpdate {
			event: ChainEvent::Append { height, header: block.header, worksum_delta },
			mempool_log: Vec::new(),
		})
	}

	fn fail(&self, height: Height, kind: ErrorKind) -> ChainError {
		ChainError { error: kind.into(), height }
	}

	/// Validates and applies the body at `height` against current state,
	/// inside a single atomic store transaction. Shared by `append_mined`
	/// and `apply_stage`'s replay loop. Returns the work contributed by
	/// `header`.
	fn apply_single(&mut self, height: Height, header: Header, body: Body) -> Result<Worksum, Error> {
		let prev_hash = self.header_hash_at(height - 1).ok_or(ErrorKind::WrongHeight)?;
		if header.prev_hash != prev_hash {
			return Err(ErrorKind::WrongHeight.into());
		}
		if !pow::verify(&*self.pow, &header, height) {
			return Err(ErrorKind::BadPow.into());
		}
		if body.merkle_root() != header.merkle_root {
			return Err(ErrorKind::BadMerkle.into());
		}
		let median = self.median_time_past(height - 1)?;
		let now = now_unix();
		if header.timestamp <= median {
			return Err(ErrorKind::BadTimestamp.into());
		}
		if header.timestamp > now.saturating_add(ironcrest_core::consensus::MAX_FUTURE_DRIFT_SECONDS) {
			return Err(ErrorKind::BadTimestamp.into());
		}
		if let Some(snapshot) = &self.snapshot {
			if height == snapshot.height && header.hash() != snapshot.hash {
				return Err(ErrorKind::LeaderMismatch.into());
			}
		}

		let batch = self.store.batch()?;
		let mut ledger = Ledger::new(&batch);

		for entry in &body.address_table {
			let id = AccountId(self.account_cursor);
			self.account_cursor += 1;
			ledger.register_new(id, entry.address);
		}

		for reward in &body.reward_txs {
			self.credit(&mut ledger, reward.to, reward.amount)?;
			let hist_id = self.history_cursor;
			self.history_cursor += 1;
			batch.append_history(
				hist_id,
				&[reward.to],
				&HistoryRow { hash: reward.hash(), data: reward.amount.to_be_bytes().to_vec() },
			)?;
			ledger.inserted_history.push((reward.to, hist_id));
		}

		for tx in &body.transfer_txs {
			self.apply_transfer(&mut ledger, height, tx)?;
		}

		for (id, row) in &ledger.rows {
			if !ledger.new_accounts.iter().any(|(new_id, _)| new_id == id) {
				batch.put_account(*id, *row)?;
			}
		}
		for (id, address) in &ledger.new_accounts {
			batch.register_account(*id, AccountRow { address: *address, balance: ledger.rows[id].balance })?;
		}
		batch.put_header(height, &header)?;
		batch.put_body(height, &body)?;

		let undo = ledger.into_undo();
		for id in &undo.inserted_tx_ids {
			self.replay.insert(*id);
		}
		batch.put_undo(height, &undo)?;
		batch.set_consensus(ConsensusRow {
			height,
			descriptor: self.descriptor.descriptor,
			history_cursor: self.history_cursor,
			account_cursor: self.account_cursor,
		})?;
		batch.commit()?;

		for tx in &body.transfer_txs {
			self.mempool.remove(&tx.tx_id());
		}

		let target = self.params.target_at(header.target_raw, height);
		Ok(Worksum::from_target(target))
	}

	fn credit(&self, ledger: &mut Ledger, id: AccountId, amount: u64) -> Result<(), Error> {
		let row = ledger
			.get(id)?
			.ok_or_else(|| Error::from(ErrorKind::BadBody("reward to unknown account".to_owned())))?;
		let new_row = AccountRow { address: row.address, balance: row.balance + amount };
		if !ledger.new_accounts.iter().any(|(nid, _)| *nid == id) {
			ledger.touch(id, new_row);
		} else {
			ledger.rows.insert(id, new_row);
		}
		Ok(())
	}

	fn apply_transfer(&mut self, ledger: &mut Ledger, height: Height, tx: &TransferTx) -> Result<(), Error> {
		let id = tx.tx_id();
		if self.replay.contains(&id) {
			return Err(ErrorKind::DuplicateTxId.into());
		}
		let (low, high) = ironcrest_pool::replay_window(height - 1);
		if tx.pin_height < low || tx.pin_height > high {
			return Err(ErrorKind::BadBody("pin height outside replay window".to_owned()).into());
		}
		let pin_hash = self
			.header_hash_at(tx.pin_height)
			.ok_or_else(|| Error::from(ErrorKind::BadBody("unknown pin height".to_owned())))?;
		let message = signing_message(tx, &pin_hash);
		let sender = ledger
			.get(tx.from)?
			.ok_or_else(|| Error::from(ErrorKind::BadBody("unknown sender".to_owned())))?;
		let recovered = self.verifier.recover(&message, &tx.signature);
		if recovered != Some(sender.address) {
			return Err(ErrorKind::BadBody("bad signature".to_owned()).into());
		}
		let needed = tx
			.amount
			.checked_add(tx.fee)
			.ok_or_else(|| Error::from(ErrorKind::BadBody("overflow".to_owned())))?;
		if sender.balance < needed {
			return Err(ErrorKind::InsufficientBalance.into());
		}
		ledger.touch(tx.from, AccountRow { address: sender.address, balance: sender.balance - needed });
		self.credit(ledger, tx.to, tx.amount)?;

		let hist_id = self.history_cursor;
		self.history_cursor += 1;
		ledger.inserted_history.push((tx.from, hist_id));
		ledger.inserted_history.push((tx.to, hist_id));
		ledger.inserted_tx_ids.push(id);
		Ok(())
	}

	/// Replaces the stage's headerchain, dropping bodies past the first
	/// differing height and retaining overlapping storage. Returns the
	/// first height still needing a body.
	pub fn stage_set(&mut self, headerchain: Vec<Header>) -> Height {
		let diff = self.stage.set_headerchain(headerchain);
		let overlap = diff.saturating_sub(1).min(self.descriptor.length);
		for height in 1..=overlap {
			self.store.retain(height);
		}
		self.state = if self.stage.is_empty() { ChainState::Steady } else { ChainState::Staging };
		self.stage.first_missing_body(self.descriptor.length).unwrap_or(self.stage.length() + 1)
	}

	/// Appends verified bodies to the stage and, if the stage now
	/// outweighs consensus, promotes it via `apply_stage`.
	pub fn stage_add(&mut self, bodies: Vec<(Height, Body)>) -> Result<Option<StateUpdate>, ChainError> {
		self.state = ChainState::Staging;
		for (height, body) in bodies {
			let header = match self.stage.header_at(height) {
				Some(h) => *h,
				None => return Err(self.fail(height, ErrorKind::WrongHeight)),
			};
			if body.merkle_root() != header.merkle_root {
				return Err(self.fail(height, ErrorKind::BadMerkle));
			}
			self.stage.put_body(height, body);
		}
		if self.stage.worksum(&self.params) > self.descriptor.worksum {
			Ok(Some(self.apply_stage()?))
		} else {
			self.state = ChainState::Steady;
			Ok(None)
		}
	}

	/// Rolls consensus back to the fork point and replays the stage chain
	/// over it, atomically per block.
	fn apply_stage(&mut self) -> Result<StateUpdate, ChainError> {
		self.state = ChainState::Rollback;
		let store = &self.store;
		let h_star = self.stage.first_differ(self.descriptor.length, |h| store.get_header(h).ok().flatten());
		let rollback_target = h_star.saturating_sub(1);
		let mut mempool_log = self
			.rollback_to(rollback_target)
			.map_err(|e| self.fail(rollback_target + 1, ErrorKind::StoreErr(e.to_string())))?;

		self.state = ChainState::Staging;
		let old_batches = self.descriptor.grid.batch_heads().len();
		let mut applied_through = rollback_target;
		for height in h_star..=self.stage.length() {
			let header = match self.stage.header_at(height) {
				Some(h) => *h,
				None => break,
			};
			let body = match self.stage.body_at(height) {
				Some(b) => b.clone(),
				None => {
					self.stage.truncate(height.saturating_sub(1));
					self.state = ChainState::Steady;
					return Err(self.fail(height, ErrorKind::BadBody("missing body".to_owned())));
				}
			};
			match self.apply_single(height, header, body) {
				Ok(worksum_delta) => {
					self.descriptor.append(&header, worksum_delta);
					applied_through = height;
				}
				Err(e) => {
					let fatal_to_block = e.is_block_fatal_only();
					self.store.mark_badblock(height, &header).ok();
					self.stage.truncate(height.saturating_sub(1));
					self.state = ChainState::Steady;
					let _ = fatal_to_block;
					return Err(ChainError { error: e, height });
				}
			}
		}
		self.state = ChainState::Steady;
		self.replay.prune(self.descriptor.length);
		let stale = self.mempool.prune_stale(self.descriptor.length);
		mempool_log.extend(stale);
		self.stage = StageChain::new();

		let new_head = self
			.store
			.get_header(self.descriptor.length)
			.map_err(|e| ChainError { error: e.into(), height: applied_through })?
			.ok_or_else(|| ChainError {
				error: ErrorKind::StoreErr("missing new tip header".to_owned()).into(),
				height: applied_through,
			})?;
		let grid_suffix = self.descriptor.grid.batch_heads()
			[old_batches.min(self.descriptor.grid.batch_heads().len())..]
			.to_vec();

		Ok(StateUpdate {
			event: ChainEvent::Fork { fork_height: h_star, worksum: self.descriptor.worksum, new_head, grid_suffix },
			mempool_log,
		})
	}

	/// Rolls consensus back to `new_length` (inclusive), reversing undo
	/// logs from the current tip downward, and returns the transactions
	/// that should re-enter the mempool.
	fn rollback_to(&mut self, new_length: Height) -> Result<Vec<TransferTx>, Error> {
		let mut to_mempool = Vec::new();
		let mut height = self.descriptor.length;
		let mut new_tip_hash = self.descriptor.tip_hash;
		let mut new_worksum = self.descriptor.worksum;

		while height > new_length {
			let removed_header = self
				.store
				.get_header(height)?
				.ok_or_else(|| Error::from(ErrorKind::StoreErr(format!("missing header at height {}", height))))?;
			let undo = self
				.store
				.get_undo(height)?
				.ok_or_else(|| Error::from(ErrorKind::StoreErr(format!("missing undo log at height {}", height))))?;
			let body = self
				.store
				.get_body(height)?
				.ok_or_else(|| Error::from(ErrorKind::StoreErr(format!("missing body at height {}", height))))?;

			let batch = self.store.batch()?;
			for (id, prior_balance) in &undo.balance_before {
				if let Some(row) = batch.get_account(*id)? {
					batch.put_account(*id, AccountRow { address: row.address, balance: *prior_balance })?;
				}
			}
			for (id, address) in &undo.new_accounts {
				batch.deregister_account(*id, address)?;
			}
			let mut seen_hist_ids = HashSet::new();
			for (account_id, hist_id) in &undo.inserted_history {
				batch.remove_history(*hist_id, &[*account_id])?;
				seen_hist_ids.insert(*hist_id);
			}
			batch.delete_undo(height)?;
			if !self.store.is_retained(height) {
				batch.delete_header(height, &removed_header)?;
				batch.delete_body(height)?;
			}

			self.account_cursor -= undo.new_accounts.len() as u64;
			self.history_cursor -= seen_hist_ids.len() as u64;
			batch.set_consensus(ConsensusRow {
				height: height - 1,
				descriptor: self.descriptor.descriptor,
				history_cursor: self.history_cursor,
				account_cursor: self.account_cursor,
			})?;
			batch.commit()?;

			for id in &undo.inserted_tx_ids {
				self.replay.remove(id);
			}
			for tx in body.transfer_txs {
				to_mempool.push(tx);
			}

			let header_work = Worksum::from_target(self.params.target_at(removed_header.target_raw, height));
			new_worksum = new_worksum - header_work;
			new_tip_hash = if height == 1 { self.genesis_hash } else { removed_header.prev_hash };
			height -= 1;
		}

		self.descriptor.descriptor += 1;
		self.descriptor.rollback(new_length, new_tip_hash, new_worksum);
		for tx in &to_mempool {
			self.mempool.reinsert_from_rollback(tx.clone(), self.descriptor.length);
		}
		Ok(to_mempool)
	}

	/// Admits a transaction into the mempool, re-deriving the sender's
	/// registered address so a signature that merely recovers to *some*
	/// key is rejected, not just one that fails to recover at all.
	pub fn put_mempool(&mut self, tx: TransferTx, _source: TxSource) -> Result<Hash, PoolError> {
		let (low, high) = ironcrest_pool::replay_window(self.descriptor.length);
		if tx.pin_height < low || tx.pin_height > high {
			return Err(PoolError::PinHeightOutOfRange(tx.pin_height));
		}
		let pin_hash = self.header_hash_at(tx.pin_height).ok_or(PoolError::PinHeightOutOfRange(tx.pin_height))?;
		let message = signing_message(&tx, &pin_hash);
		let recovered = self.verifier.recover(&message, &tx.signature).ok_or(PoolError::BadSignature)?;
		let registered = self.store.get_account(tx.from).ok().flatten().ok_or(PoolError::BadSignature)?;
		if recovered != registered.address {
			return Err(PoolError::BadSignature);
		}
		let replay = &self.replay;
		let view = self.view();
		self.mempool.put(tx, &view, &*self.verifier, |id| replay.contains(id))
	}

	/// Accepts a new advisory finality snapshot, rolling canonical history
	/// back to it if it disagrees with what is currently stored.
	pub fn set_signed_snapshot(&mut self, snap: SignedSnapshot) -> Result<(), Error> {
		if let Some(current) = &self.snapshot {
			if snap.priority <= current.priority {
				return Err(ErrorKind::LowPriority.into());
			}
		}
		if let Some(leader) = self.leader_address {
			let message = Hash(ironcrest_util::hash::double_sha256(
				&[snap.height.to_be_bytes().as_slice(), snap.hash.as_bytes().as_slice()].concat(),
			));
			let recovered = self.verifier.recover(&message, &snap.signature);
			if recovered != Some(leader) {
				return Err(ErrorKind::BadLeaderSignature.into());
			}
		}
		let incompatible = match self.header_hash_at(snap.height) {
			Some(h) => h != snap.hash,
			None => true,
		};
		if incompatible && snap.height <= self.descriptor.length {
			self.snapshot = Some(snap.clone());
			self.rollback_to(snap.height.saturating_sub(1))?;
		} else {
			self.snapshot = Some(snap);
		}
		Ok(())
	}

	/// The currently acknowledged signed snapshot, if any.
	pub fn signed_snapshot(&self) -> Option<&SignedSnapshot> {
		self.snapshot.as_ref()
	}

	/// Assembles a block template for `address`, the next miner's reward
	/// destination.
	pub fn get_mining(&self, address: Address) -> Result<MiningTemplate, Error> {
		let height = self.descriptor.length + 1;
		let prev_hash = self.descriptor.tip_hash;
		let target = self.next_target(height)?;
		let median = self.median_time_past(height - 1)?;
		let prev_timestamp = if height == 1 {
			self.genesis_timestamp
		} else {
			self.store.get_header(height - 1)?.map(|h| h.timestamp).unwrap_or(self.genesis_timestamp)
		};
		let timestamp = now_unix().max(prev_timestamp + 1).max(median + 1);

		let mut address_table = Vec::new();
		let reward_account = match self.store.account_id_of(&address)? {
			Some(id) => id,
			None => {
				let id = AccountId(self.account_cursor);
				address_table.push(AddressTableEntry { address });
				id
			}
		};
		let reward = RewardTx { to: reward_account, amount: block_reward(height) };

		let mut sim_balances: HashMap<AccountId, u64> = HashMap::new();
		let mut transfer_txs = Vec::new();
		let candidates = self.mempool.top_by_fee(100 * MINING_CANDIDATE_MULTIPLIER);
		for tx in candidates {
			if tx.pin_height < height.saturating_sub(PIN_WINDOW - 1).max(1) || tx.pin_height >= height {
				continue;
			}
			let balance = *sim_balances
				.entry(tx.from)
				.or_insert_with(|| self.store.get_account(tx.from).ok().flatten().map(|r| r.balance).unwrap_or(0));
			let needed = tx.amount + tx.fee;
			if balance < needed {
				continue;
			}
			*sim_balances.get_mut(&tx.from).unwrap() -= needed;
			transfer_txs.push(tx);
			if transfer_txs.len() >= 100 {
				break;
			}
		}

		let mut seed = [0u8; 4];
		seed.copy_from_slice(&ironcrest_util::hash::double_sha256(&timestamp.to_be_bytes())[..4]);

		let body = Body { seed, address_table, reward_txs: vec![reward], transfer_txs, token_actions: vec![] };
		let header = Header {
			version: 1,
			prev_hash,
			merkle_root: body.merkle_root(),
			timestamp,
			target_raw: target.raw(),
			nonce: 0,
		};
		Ok(MiningTemplate { height, header, body, target })
	}

	/// Looks up a block by height.
	pub fn get_block(&self, height: Height) -> Result<Option<Block>, Error> {
		let header = match self.store.get_header(height)? {
			Some(h) => h,
			None => return Ok(None),
		};
		let body = self.store.get_body(height)?.unwrap_or(Body {
			seed: [0; 4],
			address_table: vec![],
			reward_txs: vec![],
			transfer_txs: vec![],
			token_actions: vec![],
		});
		Ok(Some(Block { height, header, body }))
	}

	/// Resolves a hash to the height it's stored at on the canonical chain.
	pub fn height_of(&self, hash: &Hash) -> Result<Option<Height>, Error> {
		Ok(self.store.height_of_hash(hash)?)
	}

	/// Looks up a header by height.
	pub fn get_header(&self, height: Height) -> Result<Option<Header>, Error> {
		Ok(self.store.get_header(height)?)
	}

	/// Resolves `account` and returns its current balance.
	pub fn get_balance(&self, account: AccountRef) -> Result<Option<u64>, Error> {
		let id = match self.resolve_account(account) {
			Some(id) => id,
			None => return Ok(None),
		};
		Ok(self.store.get_account(id)?.map(|r| r.balance))
	}

	/// Paginates an account's history, newest first.
	pub fn get_history(
		&self,
		account: AccountRef,
		before_id: Option<u64>,
		limit: usize,
	) -> Result<Vec<HistoryEntry>, Error> {
		let id = match self.resolve_account(account) {
			Some(id) => id,
			None => return Ok(vec![]),
		};
		let rows = self.store.get_history(id, before_id, limit)?;
		Ok(rows.into_iter().map(|(id, row)| HistoryEntry { id, hash: row.hash, data: row.data }).collect())
	}

	/// The top `limit` accounts by balance.
	pub fn get_richlist(&self, limit: usize) -> Result<Vec<(Address, u64)>, Error> {
		let mut accounts = self.store.all_accounts()?;
		accounts.sort_unstable_by(|a, b| b.1.balance.cmp(&a.1.balance));
		accounts.truncate(limit);
		Ok(accounts.into_iter().map(|(_, row)| (row.address, row.balance)).collect())
	}

	/// The top `limit` mempool transactions by fee.
	pub fn get_mempool(&self, limit: usize) -> Vec<TransferTx> {
		self.mempool.top_by_fee(limit)
	}

	/// Every transaction id currently held by the mempool.
	pub fn get_txcache(&self) -> Vec<TxId> {
		self.mempool.tx_ids()
	}

	/// Looks up a mempool transaction by its hash.
	pub fn lookup_tx(&self, hash: &Hash) -> Option<TransferTx> {
		self.mempool.find_by_hash(hash).cloned()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use ironcrest_core::address::Address;
	use ironcrest_core::signature::Signature;

	struct IdentityHasher;
	impl PowHasher for IdentityHasher {
		fn pow_hash(&self, header: &Header, _v: pow::PowVersion) -> Hash {
			header.hash()
		}
	}

	struct AlwaysRecovers(Address);
	impl Verifier for AlwaysRecovers {
		fn recover(&self, _m: &Hash, _s: &Signature) -> Option<Address> {
			Some(self.0)
		}
	}

	fn open_engine() -> (tempfile::TempDir, ChainEngine) {
		let dir = tempfile::tempdir().unwrap();
		let store = ChainStore::open(dir.path().to_str().unwrap());
		let pow: Arc<dyn PowHasher> = Arc::new(IdentityHasher);
		let verifier: Arc<dyn Verifier> = Arc::new(AlwaysRecovers(Address([9; 20])));
		let engine = ChainEngine::open(store, Network::Test, pow, verifier, None).unwrap();
		(dir, engine)
	}

	#[test]
	fn genesis_engine_starts_at_height_zero() {
		let (_dir, engine) = open_engine();
		assert_eq!(engine.descriptor.length, 0);
		assert_eq!(engine.state, ChainState::Steady);
	}

	#[test]
	fn get_mining_then_append_mined_advances_the_tip() {
		let (_dir, mut engine) = open_engine();
		let miner = Address([1; 20]);
		let template = engine.get_mining(miner).unwrap();
		assert_eq!(template.height, 1);
		let header = Header { nonce: 0, ..template.header };
		let block = Block { height: 1, header, body: template.body };
		let update = engine.append_mined(block).unwrap();
		assert_eq!(engine.descriptor.length, 1);
		match update.event {
			ChainEvent::Append { height, .. } => assert_eq!(height, 1),
			other => panic!("expected Append, got {:?}", other),
		}
		assert_eq!(engine.get_balance(AccountRef::Addr(miner)).unwrap(), Some(block_reward(1)));
	}

	#[test]
	fn append_mined_rejects_wrong_height() {
		let (_dir, mut engine) = open_engine();
		let template = engine.get_mining(Address([1; 20])).unwrap();
		let block = Block { height: 2, header: template.header, body: template.body };
		match engine.append_mined(block) {
			Err(e) => assert!(matches!(e.error.kind(), ErrorKind::WrongHeight)),
			Ok(_) => panic!("expected WrongHeight"),
		}
	}
}
