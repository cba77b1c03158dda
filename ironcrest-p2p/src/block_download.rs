//! Block-body download: once [`crate::header_download`] hands off a
//! header range that outweighs our own chain, this component schedules
//! `BlockReq`s for the bodies that range commits to, in chunks of up to
//! 100 heights, against whichever peers claim the matching descriptor.
//! Replies are handed to the chain engine's `stage_add` by the
//! Orchestrator; this module only tracks what has been requested, from
//! whom, and what still needs to be.
//!
//! Like [`crate::header_download::HeaderDownload`], this is a pure state
//! machine — no socket or chain-engine access lives here.

use std::collections::{HashMap, VecDeque};

use ironcrest_chain::{Descriptor, BATCH_SIZE};
use ironcrest_core::block::Body;
use ironcrest_core::height::Height;

use crate::error::Offense;
use crate::msg::Selector;
use crate::peer_state::ConnectionId;

const RANGE_LEN: u32 = BATCH_SIZE;

pub enum Action {
	SendBlockReq { to: ConnectionId, nonce: u64, descriptor: Descriptor, range: Selector },
	Offend { connection: ConnectionId, offense: Offense, detail: String },
}

struct Outstanding {
	nonce: u64,
	start: Height,
	len: u32,
}

/// Tracks body download against one target candidate chain at a time.
pub struct BlockDownload {
	descriptor: Option<Descriptor>,
	target_length: Height,
	pending_ranges: VecDeque<(Height, u32)>,
	outstanding: HashMap<ConnectionId, Outstanding>,
	served_by: HashMap<Height, ConnectionId>,
	next_nonce: u64,
}

impl BlockDownload {
	pub fn new() -> BlockDownload {
		BlockDownload {
			descriptor: None,
			target_length: 0,
			pending_ranges: VecDeque::new(),
			outstanding: HashMap::new(),
			served_by: HashMap::new(),
			next_nonce: 1,
		}
	}

	fn nonce(&mut self) -> u64 {
		let n = self.next_nonce;
		self.next_nonce += 1;
		n
	}

	/// Whether a download is currently targeting `descriptor`.
	pub fn is_active(&self) -> bool {
		self.descriptor.is_some()
	}

	pub fn target_descriptor(&self) -> Option<Descriptor> {
		self.descriptor
	}

	/// (Re)starts body download against a candidate chain of
	/// `target_length` headers, starting at `first_missing` (the height
	/// `ChainEngine::stage_set` reported as the first one lacking a
	/// body). Discards any in-flight state from a previous candidate.
	pub fn set_target(&mut self, descriptor: Descriptor, first_missing: Height, target_length: Height) {
		self.descriptor = Some(descriptor);
		self.target_length = target_length;
		self.pending_ranges.clear();
		self.outstanding.clear();
		self.served_by.clear();

		let mut start = first_missing;
		while start <= target_length {
			let len = RANGE_LEN.min(target_length - start + 1);
			self.pending_ranges.push_back((start, len));
			start += len;
		}
	}

	/// Clears all download state, e.g. once the candidate has been fully
	/// applied (or discarded) by the chain engine.
	pub fn clear(&mut self) {
		self.descriptor = None;
		self.target_length = 0;
		self.pending_ranges.clear();
		self.outstanding.clear();
		self.served_by.clear();
	}

	/// Assigns the next pending range to `peer`, if any is left and the
	/// peer isn't already serving one.
	pub fn request_next(&mut self, peer: ConnectionId) -> Option<Action> {
		if self.outstanding.contains_key(&peer) {
			return None;
		}
		let descriptor = self.descriptor?;
		let (start, len) = self.pending_ranges.pop_front()?;
		let nonce = self.nonce();
		self.outstanding.insert(peer, Outstanding { nonce, start, len });
		Some(Action::SendBlockReq { to: peer, nonce, descriptor, range: Selector { descriptor, start_height: start, length: len } })
	}

	/// An outstanding request against `peer` timed out: requeue its
	/// range (at the front, so it is retried before newer ranges) and
	/// forget the assignment.
	pub fn on_timeout(&mut self, peer: ConnectionId) {
		if let Some(o) = self.outstanding.remove(&peer) {
			self.pending_ranges.push_front((o.start, o.len));
		}
	}

	/// `peer` disconnected: same handling as a timeout.
	pub fn on_peer_gone(&mut self, peer: ConnectionId) {
		self.on_timeout(peer);
	}

	/// Processes a `BlockRep`, returning the `(height, body)` pairs ready
	/// to hand to `ChainEngine::stage_add`, or an offense if the reply
	/// was malformed or didn't match what was asked for.
	pub fn on_block_rep(&mut self, peer: ConnectionId, nonce: u64, bodies: Vec<Body>) -> Result<Vec<(Height, Body)>, Action> {
		let o = match self.outstanding.get(&peer) {
			Some(o) if o.nonce == nonce => o,
			_ => return Err(Action::Offend { connection: peer, offense: Offense::Unrequested, detail: "block nonce".into() }),
		};
		let (start, len) = (o.start, o.len);
		self.outstanding.remove(&peer);

		if bodies.is_empty() {
			self.pending_ranges.push_front((start, len));
			return Err(Action::Offend { connection: peer, offense: Offense::NoBlock, detail: format!("empty reply for {}", start) });
		}
		if bodies.len() as u32 > len {
			self.pending_ranges.push_front((start, len));
			return Err(Action::Offend { connection: peer, offense: Offense::InvBlockRepSize, detail: "too many bodies".into() });
		}

		let delivered = bodies.len() as u32;
		let mut out = Vec::with_capacity(bodies.len());
		for (i, body) in bodies.into_iter().enumerate() {
			let height = start + i as Height;
			self.served_by.insert(height, peer);
			out.push((height, body));
		}
		if delivered < len {
			self.pending_ranges.push_back((start + delivered, len - delivered));
		}
		Ok(out)
	}

	/// `ChainEngine::stage_add` rejected the body at `height`: offend
	/// whoever served it and requeue the remainder of the candidate
	/// range for re-download.
	pub fn on_bad_body(&mut self, height: Height) -> Option<Action> {
		let peer = self.served_by.remove(&height)?;
		for h in height..=self.target_length {
			self.served_by.remove(&h);
		}
		let mut start = height;
		while start <= self.target_length {
			let len = RANGE_LEN.min(self.target_length - start + 1);
			self.pending_ranges.push_back((start, len));
			start += len;
		}
		Some(Action::Offend { connection: peer, offense: Offense::MerkleRoot, detail: format!("bad body at height {}", height) })
	}

	/// Whether every height in the target range has been delivered (not
	/// necessarily yet applied).
	pub fn is_fully_requested(&self) -> bool {
		self.pending_ranges.is_empty() && self.outstanding.is_empty()
	}
}

impl Default for BlockDownload {
	fn default() -> BlockDownload {
		BlockDownload::new()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn body() -> Body {
		Body { seed: [0; 4], address_table: vec![], reward_txs: vec![], transfer_txs: vec![], token_actions: vec![] }
	}

	#[test]
	fn schedules_ranges_in_batch_size_chunks() {
		let mut bd = BlockDownload::new();
		bd.set_target(1, 1, 250);
		let mut total = 0u32;
		while let Some(Action::SendBlockReq { range, .. }) = bd.request_next(1) {
			total += range.length;
			// single peer, so requests would normally serialize; force the
			// slot free again for the test by completing it.
			bd.outstanding.remove(&1);
		}
		assert_eq!(total, 250);
	}

	#[test]
	fn bad_body_requeues_remainder_and_offends_server() {
		let mut bd = BlockDownload::new();
		bd.set_target(1, 1, 10);
		let action = bd.request_next(7).unwrap();
		let nonce = match action {
			Action::SendBlockReq { nonce, .. } => nonce,
			_ => panic!(),
		};
		let delivered = bd.on_block_rep(7, nonce, vec![body(); 10]).unwrap();
		assert_eq!(delivered.len(), 10);
		let offend = bd.on_bad_body(5).unwrap();
		match offend {
			Action::Offend { connection, .. } => assert_eq!(connection, 7),
			_ => panic!(),
		}
		assert!(!bd.pending_ranges.is_empty());
	}
}
