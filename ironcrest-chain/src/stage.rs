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

//! The stage chain: a candidate chain being assembled from peer
//! downloads. It becomes canonical when `stage.total_work >
//! consensus.total_work` and block application succeeds.
//!
//! There is deliberately no orphan-block pool here: the orchestrator's
//! header-download/block-download already hand down a complete candidate
//! headerchain plus the bodies for it, so the stage only ever needs to
//! track *one* candidate at a time.

use std::collections::BTreeMap;

use ironcrest_core::block::Body;
use ironcrest_core::hash::{Hash, Hashed};
use ironcrest_core::header::Header;
use ironcrest_core::height::Height;
use ironcrest_core::target::Worksum;

use crate::params::ConsensusParams;

/// A candidate chain being assembled: a run of headers starting at
/// height 1, plus whichever bodies have arrived for it so far.
#[derive(Clone, Debug, Default)]
pub struct StageChain {
	/// `headerchain[i]` is the header for height `i + 1`.
	headerchain: Vec<Header>,
	/// Bodies received so far, keyed by height.
	bodies: BTreeMap<Height, Body>,
}

impl StageChain {
	/// An empty stage (no candidate currently being assembled).
	pub fn new() -> StageChain {
		StageChain { headerchain: Vec::new(), bodies: BTreeMap::new() }
	}

	/// The stage's current length (number of headers known).
	pub fn length(&self) -> Height {
		self.headerchain.len() as Height
	}

	/// The header recorded for `height`, if within `1..=length`.
	pub fn header_at(&self, height: Height) -> Option<&Header> {
		if height == 0 {
			return None;
		}
		self.headerchain.get((height - 1) as usize)
	}

	/// The body recorded for `height`, if it has arrived.
	pub fn body_at(&self, height: Height) -> Option<&Body> {
		self.bodies.get(&height)
	}

	/// Replaces the stage's headerchain with a freshly downloaded one,
	/// dropping any bodies whose height no longer matches the new
	/// headers. Returns the first height the new headerchain diverges
	/// from what was previously staged (so the caller can decide which
	/// overlapping storage to retain).
	pub fn set_headerchain(&mut self, headerchain: Vec<Header>) -> Height {
		let overlap = self.headerchain.len().min(headerchain.len());
		let mut diff_at = overlap as Height + 1;
		for i in 0..overlap {
			if self.headerchain[i] != headerchain[i] {
				diff_at = i as Height + 1;
				break;
			}
		}
		self.bodies.retain(|h, _| *h < diff_at);
		self.headerchain = headerchain;
		diff_at
	}

	/// The lowest height in `1..=length` that has no recorded header
	/// (stage empty) or, if headers are present, the first height with
	/// neither a recorded body nor a canonical one already covering it.
	pub fn first_missing_body(&self, canonical_length: Height) -> Option<Height> {
		for height in 1..=self.length() {
			if height <= canonical_length {
				continue;
			}
			if !self.bodies.contains_key(&height) {
				return Some(height);
			}
		}
		None
	}

	/// Records a body for `height`, after the caller has verified it
	/// against the staged header's Merkle root.
	pub fn put_body(&mut self, height: Height, body: Body) {
		self.bodies.insert(height, body);
	}

	/// The first height (1-indexed) at which `self`'s headerchain
	/// diverges from the canonical chain's stored headers, scanning up to
	/// `canonical_length`. Returns `canonical_length + 1` if every
	/// overlapping header agrees (i.e. the stage is a pure extension).
	pub fn first_differ(
		&self,
		canonical_length: Height,
		header_at: impl Fn(Height) -> Option<Header>,
	) -> Height {
		let overlap = canonical_length.min(self.length());
		for height in 1..=overlap {
			let staged = match self.header_at(height) {
				Some(h) => *h,
				None => return height,
			};
			match header_at(height) {
				Some(stored) if stored == staged => continue,
				_ => return height,
			}
		}
		overlap + 1
	}

	/// Total accumulated work of the staged headerchain, `1..=length`.
	pub fn worksum(&self, params: &ConsensusParams) -> Worksum {
		let mut total = Worksum::zero();
		for (i, header) in self.headerchain.iter().enumerate() {
			let height = i as Height + 1;
			let target = params.target_at(header.target_raw, height);
			total = total + Worksum::from_target(target);
		}
		total
	}

	/// Truncates the stage to `new_length`, discarding headers and bodies
	/// beyond it.
	pub fn truncate(&mut self, new_length: Height) {
		self.headerchain.truncate(new_length as usize);
		self.bodies.retain(|h, _| *h <= new_length);
	}

	/// Whether the stage currently holds no headers.
	pub fn is_empty(&self) -> bool {
		self.headerchain.is_empty()
	}

	/// Hash of the header at `height`, if present.
	pub fn hash_at(&self, height: Height) -> Option<Hash> {
		self.header_at(height).map(|h| h.hash())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use ironcrest_core::hash::ZERO_HASH;

	fn header(nonce: u32) -> Header {
		Header { version: 1, prev_hash: ZERO_HASH, merkle_root: ZERO_HASH, timestamp: 0, target_raw: 0, nonce }
	}

	#[test]
	fn set_headerchain_reports_full_overlap_as_pure_extension() {
		let mut stage = StageChain::new();
		let diff = stage.set_headerchain(vec![header(1), header(2)]);
		assert_eq!(diff, 3);
		let diff2 = stage.set_headerchain(vec![header(1), header(2), header(3)]);
		assert_eq!(diff2, 3);
	}

	#[test]
	fn set_headerchain_detects_divergence_and_drops_bodies() {
		let mut stage = StageChain::new();
		stage.set_headerchain(vec![header(1), header(2), header(3)]);
		stage.put_body(2, Body { seed: [0; 4], address_table: vec![], reward_txs: vec![], transfer_txs: vec![], token_actions: vec![] });
		let diff = stage.set_headerchain(vec![header(1), header(9)]);
		assert_eq!(diff, 2);
		assert!(stage.body_at(2).is_none());
	}

	#[test]
	fn first_missing_body_skips_canonical_heights() {
		let mut stage = StageChain::new();
		stage.set_headerchain(vec![header(1), header(2), header(3)]);
		assert_eq!(stage.first_missing_body(1), Some(2));
		stage.put_body(2, Body { seed: [0; 4], address_table: vec![], reward_txs: vec![], transfer_txs: vec![], token_actions: vec![] });
		assert_eq!(stage.first_missing_body(1), Some(3));
	}
}
