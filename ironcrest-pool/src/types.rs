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

//! The seam between the pool and whatever holds consensus state. Kept as
//! a trait (rather than a dependency on `ironcrest-chain`) so this crate
//! has no knowledge of storage or the chain engine's internals.

use ironcrest_core::address::AccountId;
use ironcrest_core::hash::Hash;
use ironcrest_core::height::Height;

/// Everything `put_mempool`/`get_mining` need to know about consensus
/// state, without the pool depending on how that state is stored.
pub trait ChainView {
	/// The consensus chain's current length.
	fn tip_height(&self) -> Height;
	/// The header hash at `height`, if within living history.
	fn header_hash_at(&self, height: Height) -> Option<Hash>;
	/// `account`'s current balance.
	fn balance_of(&self, account: AccountId) -> u64;
}

/// Identifies who handed a transaction to `put_mempool`, for logging and
/// relay bookkeeping (kept here, not in `ironcrest-p2p`, since the pool
/// is what decides admission).
#[derive(Clone, Debug)]
pub struct TxSource {
	/// Human-readable origin, e.g. `"rpc"` or a peer address.
	pub debug_name: String,
}

impl TxSource {
	/// A transaction submitted through the local RPC surface.
	pub fn local() -> TxSource {
		TxSource { debug_name: "rpc".to_owned() }
	}

	/// A transaction relayed by a peer.
	pub fn peer(addr: String) -> TxSource {
		TxSource { debug_name: addr }
	}
}
