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

//! Genesis block construction, parameterized by network: a configuration
//! carries a network selector that picks among these.

use crate::block::{Block, Body};
use crate::consensus::genesis_target;
use crate::hash::ZERO_HASH;
use crate::header::Header;

/// Which network a node is participating in; genesis contents and magic
/// strings both key off this.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Network {
	/// Production network.
	Main,
	/// Public test network.
	Test,
}

/// Builds the genesis block for `network`. The genesis body carries no
/// transactions and no address table entries; only the seed differs
/// between networks so that main and test genesis hashes never collide.
pub fn genesis_block(network: Network) -> Block {
	let seed = match network {
		Network::Main => [0x49, 0x52, 0x4f, 0x4e], // "IRON"
		Network::Test => [0x54, 0x45, 0x53, 0x54], // "TEST"
	};
	let body = Body {
		seed,
		address_table: vec![],
		reward_txs: vec![],
		transfer_txs: vec![],
		token_actions: vec![],
	};
	let header = Header {
		version: 1,
		prev_hash: ZERO_HASH,
		merkle_root: body.merkle_root(),
		timestamp: match network {
			Network::Main => 1_700_000_000,
			Network::Test => 1_700_000_000,
		},
		target_raw: genesis_target().raw(),
		nonce: 0,
	};
	Block { height: 0, header, body }
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn main_and_test_genesis_blocks_differ() {
		let main = genesis_block(Network::Main);
		let test = genesis_block(Network::Test);
		assert_ne!(main.header.merkle_root, test.header.merkle_root);
	}

	#[test]
	fn genesis_block_merkle_root_matches_header() {
		let b = genesis_block(Network::Main);
		assert!(b.merkle_root_matches());
	}
}
