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

//! The handful of chain-state types named but not defined by
//! `ironcrest-core` (chain descriptor, grid, signed snapshot): these
//! describe a specific *instance* of consensus history rather than
//! wire-format primitives, so they live with the engine that tracks them
//! rather than in `ironcrest-core`. Shaped like a `Tip` type used for the
//! same purpose elsewhere in this workspace.

use ironcrest_core::hash::Hash;
use ironcrest_core::header::Header;
use ironcrest_core::height::Height;
use ironcrest_core::target::Worksum;

/// Number of headers per completed batch.
pub const BATCH_SIZE: Height = 100;

/// Monotonically-increasing identifier for a specific consensus-chain
/// instance, bumped on every fork so peers can detect reorgs without
/// re-comparing hashes.
pub type Descriptor = u64;

/// O(√N)-size chain summary: the final header hash of each completed
/// batch. A grid is the ordered sequence of the final header of each
/// completed batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Grid {
	batch_heads: Vec<Hash>,
}

impl Grid {
	/// An empty grid (no completed batches yet).
	pub fn new() -> Grid {
		Grid { batch_heads: Vec::new() }
	}

	/// Rebuilds a grid from a known sequence of batch-final hashes, e.g.
	/// when restoring from storage.
	pub fn from_batch_heads(batch_heads: Vec<Hash>) -> Grid {
		Grid { batch_heads }
	}

	/// Notifies the grid that `height` was just appended with hash
	/// `hash`; if `height` completes a batch, the hash is recorded.
	pub fn on_append(&mut self, height: Height, hash: Hash) {
		if height > 0 && height % BATCH_SIZE == 0 {
			self.batch_heads.push(hash);
		}
	}

	/// Truncates the grid back to what it would have been at `length`
	/// (used by rollback: drops batch heads for batches that no longer
	/// exist).
	pub fn truncate_to(&mut self, length: Height) {
		let kept_batches = (length / BATCH_SIZE) as usize;
		self.batch_heads.truncate(kept_batches);
	}

	/// The recorded batch-final hashes, oldest first.
	pub fn batch_heads(&self) -> &[Hash] {
		&self.batch_heads
	}
}

/// Identifies a specific consensus-chain instance: descriptor, length,
/// total work, and its grid summary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainDescriptor {
	/// Identifies this chain instance; bumped on every fork.
	pub descriptor: Descriptor,
	/// Current chain length.
	pub length: Height,
	/// Hash of the header at `length`.
	pub tip_hash: Hash,
	/// Accumulated work over `1..=length`.
	pub worksum: Worksum,
	/// O(√N) chain summary.
	pub grid: Grid,
}

impl ChainDescriptor {
	/// The descriptor describing an empty chain (genesis only).
	pub fn genesis(tip_hash: Hash) -> ChainDescriptor {
		ChainDescriptor { descriptor: 0, length: 0, tip_hash, worksum: Worksum::zero(), grid: Grid::new() }
	}

	/// Extends this descriptor by one header, bumping its worksum and
	/// feeding the grid.
	pub fn append(&mut self, header: &Header, header_work: Worksum) {
		use ironcrest_core::hash::Hashed;
		self.length += 1;
		self.tip_hash = header.hash();
		self.worksum = self.worksum + header_work;
		self.grid.on_append(self.length, self.tip_hash);
	}

	/// Rolls the descriptor back to `new_length`, replacing the tip hash
	/// and accumulated worksum with the values the caller has already
	/// recomputed for that height.
	pub fn rollback(&mut self, new_length: Height, new_tip_hash: Hash, new_worksum: Worksum) {
		self.length = new_length;
		self.tip_hash = new_tip_hash;
		self.worksum = new_worksum;
		self.grid.truncate_to(new_length);
	}
}

/// Advisory finality marker: `(height, hash, priority, signature)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedSnapshot {
	/// The height this snapshot attests to.
	pub height: Height,
	/// The header hash expected at `height`.
	pub hash: Hash,
	/// Monotonically-compared priority; a higher-priority snapshot
	/// preempts any previously accepted one.
	pub priority: u64,
	/// Signature over `(height, hash, priority)`, recoverable to the
	/// configured leader address.
	pub signature: ironcrest_core::signature::Signature,
}

/// What `append_mined`/`apply_stage` hand back to the orchestrator so it
/// can broadcast to peers and update its own bookkeeping.
#[derive(Clone, Debug)]
pub enum ChainEvent {
	/// A single header was appended to the consensus tip.
	Append {
		/// The new chain length.
		height: Height,
		/// The appended header.
		header: Header,
		/// Work added by this header.
		worksum_delta: Worksum,
	},
	/// The consensus chain reorganized onto a new branch.
	Fork {
		/// The first height at which the new branch differs.
		fork_height: Height,
		/// The new chain's total accumulated work.
		worksum: Worksum,
		/// The new tip header.
		new_head: Header,
		/// Batch-final hashes added by the new branch beyond `fork_height`.
		grid_suffix: Vec<Hash>,
	},
	/// The chain was rolled back (without yet re-extending), e.g. by a
	/// signed snapshot. A `Rollback` is observed strictly before the
	/// subsequent `Append` events that re-populate the chain.
	Rollback {
		/// The height the chain was rolled back to.
		height: Height,
	},
}

/// A full state update batch: the event plus any mempool consequences.
#[derive(Clone, Debug)]
pub struct StateUpdate {
	/// What changed.
	pub event: ChainEvent,
	/// Transactions that re-entered (or left) the mempool as a result.
	pub mempool_log: Vec<ironcrest_core::block::TransferTx>,
}

/// The three phases a chain mutation can be in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainState {
	/// No mutation in progress; reads see a consistent snapshot.
	Steady,
	/// A stage chain is being assembled (`stage_add` in progress).
	Staging,
	/// `apply_stage` is rolling consensus back before re-applying.
	Rollback,
}

/// One paginated row of `get_history`, resolved from the store's flat
/// history table plus the account it was queried under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
	/// This entry's globally-ordered id, usable as the next page's `before_id`.
	pub id: u64,
	/// Hash of whatever produced the entry (a transfer or a reward).
	pub hash: ironcrest_core::hash::Hash,
	/// Opaque payload, caller-encoded (amount/counterparty).
	pub data: Vec<u8>,
}

/// A mined block template plus the target it must satisfy.
#[derive(Clone, Debug)]
pub struct MiningTemplate {
	/// Height the template is for.
	pub height: Height,
	/// Header with `nonce` unset (0), ready for external PoW search.
	pub header: Header,
	/// Body committed to by `header.merkle_root`.
	pub body: ironcrest_core::block::Body,
	/// The target `header`'s proof-of-work hash must satisfy.
	pub target: ironcrest_core::target::Target,
}
