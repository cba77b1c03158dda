// Copyright 2020 The Grin Developers
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

//! JSON-serializable view types returned by [`crate::ChainApi`]. These
//! are plain conversions from the internal chain/p2p types, which carry
//! fixed-width byte arrays rather than `serde` impls of their own.

use std::net::{IpAddr, SocketAddr};

use ironcrest_chain::{ChainDescriptor, HistoryEntry, MiningTemplate, SignedSnapshot};
use ironcrest_core::address::Address;
use ironcrest_core::block::{Block, Body};
use ironcrest_core::hash::{Hash, Hashed};
use ironcrest_core::header::Header;
use ironcrest_core::height::Height;
use ironcrest_p2p::orchestrator::PeerSummary;
use ironcrest_util::to_hex;

fn hex_hash(h: &Hash) -> String {
	to_hex(h.as_bytes())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeaderView {
	pub version: u32,
	pub hash: String,
	pub prev_hash: String,
	pub merkle_root: String,
	pub timestamp: u32,
	pub target_raw: u32,
	pub nonce: u32,
}

impl HeaderView {
	pub fn from_header(header: &Header) -> HeaderView {
		HeaderView {
			version: header.version,
			hash: hex_hash(&header.hash()),
			prev_hash: hex_hash(&header.prev_hash),
			merkle_root: hex_hash(&header.merkle_root),
			timestamp: header.timestamp,
			target_raw: header.target_raw,
			nonce: header.nonce,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockView {
	pub height: Height,
	pub header: HeaderView,
	pub body: Body,
}

impl BlockView {
	pub fn from_block(block: &Block) -> BlockView {
		BlockView { height: block.height, header: HeaderView::from_header(&block.header), body: block.body.clone() }
	}
}

/// Chain head summary, for `get_head`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainHeadView {
	pub descriptor: u64,
	pub length: Height,
	pub tip_hash: String,
	pub worksum: ironcrest_core::target::Worksum,
}

impl ChainHeadView {
	pub fn from_descriptor(d: &ChainDescriptor) -> ChainHeadView {
		ChainHeadView { descriptor: d.descriptor, length: d.length, tip_hash: hex_hash(&d.tip_hash), worksum: d.worksum }
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MiningTemplateView {
	pub height: Height,
	pub header: HeaderView,
	pub body: Body,
	pub target: ironcrest_core::target::Target,
}

impl MiningTemplateView {
	pub fn from_template(t: &MiningTemplate) -> MiningTemplateView {
		MiningTemplateView { height: t.height, header: HeaderView::from_header(&t.header), body: t.body.clone(), target: t.target }
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedSnapshotView {
	pub height: Height,
	pub hash: String,
	pub priority: u64,
}

impl SignedSnapshotView {
	pub fn from_snapshot(s: &SignedSnapshot) -> SignedSnapshotView {
		SignedSnapshotView { height: s.height, hash: hex_hash(&s.hash), priority: s.priority }
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntryView {
	pub id: u64,
	pub hash: String,
	pub data: Vec<u8>,
}

impl HistoryEntryView {
	pub fn from_entry(e: &HistoryEntry) -> HistoryEntryView {
		HistoryEntryView { id: e.id, hash: hex_hash(&e.hash), data: e.data.clone() }
	}
}

/// `get_richlist` row: an account and its balance, with the account
/// resolved back to its `Address` for display.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RichlistEntryView {
	pub address: Address,
	pub balance: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerView {
	pub id: u64,
	pub addr: SocketAddr,
	pub inbound: bool,
	pub claimed_chain_length: Option<Height>,
	pub is_leader: bool,
	pub connected_secs: u64,
}

impl PeerView {
	pub fn from_summary(p: &PeerSummary) -> PeerView {
		PeerView {
			id: p.id,
			addr: p.addr,
			inbound: p.inbound,
			claimed_chain_length: p.claimed_chain_length,
			is_leader: p.is_leader,
			connected_secs: p.connected_secs,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BannedView {
	pub ip: IpAddr,
	pub until_unix: u64,
}

/// Either an `AccountId` or an `Address`, the way `get_balance`/
/// `get_history` accept their argument; re-exported so API consumers
/// don't need to depend on `ironcrest_core` directly for this one type.
pub use ironcrest_core::address::AccountRef;

#[cfg(test)]
mod test {
	use super::*;
	use ironcrest_core::hash::ZERO_HASH;

	fn sample_header() -> Header {
		Header { version: 1, prev_hash: ZERO_HASH, merkle_root: ZERO_HASH, timestamp: 0, target_raw: 0, nonce: 0 }
	}

	#[test]
	fn header_view_hex_encodes_hashes() {
		let view = HeaderView::from_header(&sample_header());
		assert_eq!(view.prev_hash.len(), 64);
		assert_eq!(view.merkle_root.len(), 64);
		assert_eq!(view.hash.len(), 64);
	}

	#[test]
	fn chain_head_view_carries_length_and_worksum() {
		let descriptor = ChainDescriptor::genesis(ZERO_HASH);
		let view = ChainHeadView::from_descriptor(&descriptor);
		assert_eq!(view.length, descriptor.length);
		assert_eq!(view.descriptor, descriptor.descriptor);
	}
}
