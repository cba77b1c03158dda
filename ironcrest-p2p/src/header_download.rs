//! Header-first sync: once a peer's advertised chain summary outweighs
//! ours, pull its headers before touching any block bodies. Up to
//! [`MAX_LEADERS`] peers are elected to supply the candidate headerchain
//! directly; every other outweighing peer is kept as a verifier, probed
//! to cross-check the leaders' headers rather than trusted outright. A
//! binary search against each candidate's own descriptor finds the fork
//! point before any batch is requested, so a peer can never walk us past
//! a height we actually disagree on.
//!
//! This module is a pure state machine: it never touches a socket or the
//! chain engine directly. [`crate::orchestrator::Orchestrator`] drives it
//! by feeding in peer events and request replies, resolving whatever
//! local chain data (headers at a given height) or crypto (PoW
//! verification) it asks for along the way, and turns the [`Action`]s it
//! returns into actual `BatchReq`/`ProbeReq` sends.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ironcrest_chain::{ChainDescriptor, ConsensusParams, Descriptor, BATCH_SIZE};
use ironcrest_core::hash::Hashed;
use ironcrest_core::header::Header;
use ironcrest_core::height::Height;
use ironcrest_core::pow::{self, PowHasher};
use ironcrest_core::target::Worksum;

use crate::error::Offense;
use crate::msg::ChainSummary;
use crate::peer_state::ConnectionId;

/// Upper bound on how many peers simultaneously supply the candidate
/// headerchain.
pub const MAX_LEADERS: usize = 3;

/// Heights per `BatchReq`, matching the batch size the chain summary
/// itself is keyed on.
const BATCH_LEN: Height = BATCH_SIZE;

#[derive(Copy, Clone, Debug)]
struct ProbeWindow {
	/// Highest height known to agree with our own chain.
	lo: Height,
	/// Lowest height known to differ (or not yet probed past).
	hi: Height,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Role {
	/// Binary-searching for the fork point against this candidate.
	Probing,
	/// Supplying headerchain batches.
	Leader,
	/// Outweighs us but parked: cross-checks leaders' headers on request.
	Verifier,
}

struct Candidate {
	role: Role,
	descriptor: Descriptor,
	claimed_length: Height,
	claimed_worksum: Worksum,
	probe: Option<ProbeWindow>,
	fork_height: Option<Height>,
}

/// Something the Orchestrator must do in response to a
/// [`HeaderDownload`] state transition.
pub enum Action {
	SendProbe { to: ConnectionId, nonce: u64, descriptor: Descriptor, height: Height },
	SendBatchReq { to: ConnectionId, nonce: u64, descriptor: Descriptor, start_height: Height, length: Height },
	/// `connection` violated the protocol; the Orchestrator should record
	/// the offense and close the connection.
	Offend { connection: ConnectionId, offense: Offense, detail: String },
}

/// A complete, PoW-verified run of headers ready to hand to
/// [`crate::block_download::BlockDownload`], once the assembled chain's
/// worksum exceeds ours.
pub struct ReadyHeaderchain {
	pub descriptor: Descriptor,
	/// `headers[i]` is the header for height `start_height + i`.
	pub start_height: Height,
	pub headers: Vec<Header>,
}

/// Drives leader election, fork-point probing, and batch header download
/// against every peer currently known to outweigh our own chain.
pub struct HeaderDownload {
	pow: Arc<dyn PowHasher>,
	params: ConsensusParams,
	candidates: HashMap<ConnectionId, Candidate>,
	leaders: Vec<ConnectionId>,
	/// Headers assembled so far from leaders, absolute height keyed.
	assembled: BTreeMap<Height, Header>,
	/// Descriptor the assembled headers are being collected under; `None`
	/// until the first leader is elected.
	descriptor: Option<Descriptor>,
	outstanding_probes: HashMap<ConnectionId, (u64, Height)>,
	outstanding_batches: HashMap<ConnectionId, (u64, Height)>,
	next_nonce: u64,
}

impl HeaderDownload {
	pub fn new(pow: Arc<dyn PowHasher>, params: ConsensusParams) -> HeaderDownload {
		HeaderDownload {
			pow,
			params,
			candidates: HashMap::new(),
			leaders: Vec::new(),
			assembled: BTreeMap::new(),
			descriptor: None,
			outstanding_probes: HashMap::new(),
			outstanding_batches: HashMap::new(),
			next_nonce: 1,
		}
	}

	fn nonce(&mut self) -> u64 {
		let n = self.next_nonce;
		self.next_nonce += 1;
		n
	}

	/// Whether this peer is currently being tracked as a download source.
	pub fn is_tracking(&self, id: ConnectionId) -> bool {
		self.candidates.contains_key(&id)
	}

	/// The height a pending `ProbeReq` against `id` was sent for, if any.
	/// The Orchestrator resolves its own header at this height before
	/// calling [`Self::on_probe_rep`].
	pub fn probe_height(&self, id: ConnectionId) -> Option<Height> {
		self.outstanding_probes.get(&id).map(|(_, h)| *h)
	}

	/// The start height a pending `BatchReq` against `id` was sent for,
	/// if any. The Orchestrator resolves the header immediately preceding
	/// it (from its own store or from what's already assembled) before
	/// calling [`Self::on_batch_rep`].
	pub fn outstanding_batch_start(&self, id: ConnectionId) -> Option<Height> {
		self.outstanding_batches.get(&id).map(|(_, s)| *s)
	}

	/// Connections currently elected as headerchain leaders, for the
	/// Orchestrator to report via the external `get_peers` query and to
	/// assign block-body ranges to once a headerchain is promoted.
	pub fn leaders(&self) -> Vec<ConnectionId> {
		self.leaders.clone()
	}

	/// A header already assembled from a leader at `height`, if any —
	/// used by the Orchestrator to resolve link hashes for a subsequent
	/// batch without going back to its own store.
	pub fn assembled_header_at(&self, height: Height) -> Option<Header> {
		self.assembled.get(&height).copied()
	}

	/// Call whenever a peer's advertised chain (`Init`/`Append`/`Fork`)
	/// newly exceeds `our.worksum`. Does nothing if already tracked.
	pub fn consider_peer(&mut self, id: ConnectionId, peer: &ChainSummary, our: &ChainDescriptor) -> Vec<Action> {
		if self.candidates.contains_key(&id) {
			return vec![];
		}
		let probe_height = our.length.min(peer.length);
		self.candidates.insert(
			id,
			Candidate {
				role: Role::Probing,
				descriptor: peer.descriptor,
				claimed_length: peer.length,
				claimed_worksum: peer.worksum,
				probe: Some(ProbeWindow { lo: 0, hi: probe_height }),
				fork_height: None,
			},
		);
		if probe_height == 0 {
			return self.resolve_fork_height(id, 0);
		}
		self.issue_probe(id, probe_height)
	}

	/// Drops a peer from tracking, e.g. on disconnect. Frees a leader
	/// slot so another candidate can be promoted.
	pub fn remove_peer(&mut self, id: ConnectionId) -> Vec<Action> {
		self.outstanding_probes.remove(&id);
		self.outstanding_batches.remove(&id);
		let was_leader = self.candidates.remove(&id).map(|c| c.role == Role::Leader).unwrap_or(false);
		self.leaders.retain(|&l| l != id);
		if was_leader {
			return self.promote_next_verifier();
		}
		vec![]
	}

	fn issue_probe(&mut self, id: ConnectionId, height: Height) -> Vec<Action> {
		let descriptor = match self.candidates.get(&id) {
			Some(c) => c.descriptor,
			None => return vec![],
		};
		let nonce = self.nonce();
		self.outstanding_probes.insert(id, (nonce, height));
		vec![Action::SendProbe { to: id, nonce, descriptor, height }]
	}

	/// `our_header_at_probe` is the header we ourselves hold at the
	/// height [`Self::probe_height`] reported for this peer, already
	/// resolved by the Orchestrator before calling in (avoids making this
	/// state machine async).
	pub fn on_probe_rep(
		&mut self,
		id: ConnectionId,
		nonce: u64,
		requested: Option<Header>,
		our_header_at_probe: Option<Header>,
	) -> Vec<Action> {
		let probed_height = match self.outstanding_probes.get(&id) {
			Some((n, h)) if *n == nonce => *h,
			_ => return vec![Action::Offend { connection: id, offense: Offense::Unrequested, detail: "probe nonce".into() }],
		};
		self.outstanding_probes.remove(&id);

		let (is_verifier, window) = match self.candidates.get(&id) {
			Some(c) => (c.role == Role::Verifier, c.probe),
			None => return vec![],
		};

		if is_verifier {
			return self.cross_check(id, probed_height, requested);
		}

		let mut window = match window {
			Some(w) => w,
			None => return vec![],
		};

		let matches = match (requested, our_header_at_probe) {
			(Some(a), Some(b)) => a == b,
			(None, None) => true,
			_ => false,
		};
		if matches {
			window.lo = probed_height;
		} else {
			window.hi = probed_height;
		}

		if window.hi.saturating_sub(window.lo) <= 1 {
			return self.resolve_fork_height(id, window.hi.max(1));
		}
		let mid = window.lo + (window.hi - window.lo) / 2;
		if let Some(c) = self.candidates.get_mut(&id) {
			c.probe = Some(window);
		}
		self.issue_probe(id, mid)
	}

	fn resolve_fork_height(&mut self, id: ConnectionId, fork_height: Height) -> Vec<Action> {
		if let Some(c) = self.candidates.get_mut(&id) {
			c.fork_height = Some(fork_height);
			c.probe = None;
		}
		if self.leaders.len() < MAX_LEADERS {
			self.promote_leader(id, fork_height)
		} else {
			if let Some(c) = self.candidates.get_mut(&id) {
				c.role = Role::Verifier;
			}
			vec![]
		}
	}

	fn promote_leader(&mut self, id: ConnectionId, fork_height: Height) -> Vec<Action> {
		let descriptor = match self.candidates.get_mut(&id) {
			Some(c) => {
				c.role = Role::Leader;
				c.descriptor
			}
			None => return vec![],
		};
		if self.descriptor.is_none() {
			self.descriptor = Some(descriptor);
			self.assembled.clear();
		}
		self.leaders.push(id);
		self.request_next_batch(id, fork_height)
	}

	fn promote_next_verifier(&mut self) -> Vec<Action> {
		if self.leaders.len() >= MAX_LEADERS {
			return vec![];
		}
		let candidate = self
			.candidates
			.iter()
			.find(|(_, c)| c.role == Role::Verifier)
			.map(|(id, c)| (*id, c.fork_height.unwrap_or(0)));
		match candidate {
			Some((id, fork_height)) => self.promote_leader(id, fork_height),
			None => vec![],
		}
	}

	fn next_batch_start(&self) -> Height {
		match self.assembled.keys().next_back() {
			Some(&h) => h + 1,
			None => self.candidates.values().find_map(|c| if c.role == Role::Leader { c.fork_height } else { None }).unwrap_or(1),
		}
	}

	fn request_next_batch(&mut self, id: ConnectionId, start_override: Height) -> Vec<Action> {
		let descriptor = match self.candidates.get(&id) {
			Some(c) if c.role == Role::Leader => c.descriptor,
			_ => return vec![],
		};
		let start = if self.assembled.is_empty() { start_override } else { self.next_batch_start() };
		let nonce = self.nonce();
		self.outstanding_batches.insert(id, (nonce, start));
		vec![Action::SendBatchReq { to: id, nonce, descriptor, start_height: start, length: BATCH_LEN }]
	}

	/// Verifies and assembles a batch reply. `prev_hash` is the hash of
	/// the header immediately preceding the batch's start height (either
	/// from our own store, if the batch starts before any
	/// previously-assembled header, or the previously-assembled tail),
	/// resolved by the Orchestrator.
	pub fn on_batch_rep(
		&mut self,
		id: ConnectionId,
		nonce: u64,
		headers: Vec<Header>,
		prev_hash: ironcrest_core::hash::Hash,
	) -> Vec<Action> {
		let (expected_nonce, start) = match self.outstanding_batches.get(&id) {
			Some(v) => *v,
			None => return vec![Action::Offend { connection: id, offense: Offense::Unrequested, detail: "batch nonce".into() }],
		};
		if nonce != expected_nonce {
			return vec![Action::Offend { connection: id, offense: Offense::Unrequested, detail: "batch nonce mismatch".into() }];
		}
		self.outstanding_batches.remove(&id);

		if headers.is_empty() {
			self.leaders.retain(|&l| l != id);
			if let Some(c) = self.candidates.get_mut(&id) {
				c.role = Role::Verifier;
			}
			return self.promote_next_verifier();
		}

		let mut prev = prev_hash;
		let mut height = start;
		for header in &headers {
			if header.prev_hash != prev {
				self.leaders.retain(|&l| l != id);
				return vec![Action::Offend { connection: id, offense: Offense::HeaderLink, detail: format!("height {}", height) }];
			}
			if !pow::verify(&*self.pow, header, height) {
				self.leaders.retain(|&l| l != id);
				return vec![Action::Offend { connection: id, offense: Offense::Pow, detail: format!("height {}", height) }];
			}
			prev = header.hash();
			self.assembled.insert(height, *header);
			height += 1;
		}

		let mut actions = vec![];
		if let Some(verifier) = self.candidates.iter().find(|(_, c)| c.role == Role::Verifier).map(|(id, _)| *id) {
			actions.extend(self.issue_probe(verifier, height - 1));
		}
		actions.extend(self.request_next_batch(id, start));
		actions
	}

	/// A cross-check probe against a verifier came back inconsistent
	/// with what a leader already handed us at that height: whichever
	/// side a verifier's own claimed chain agrees with is trusted, and
	/// the other is offended.
	fn cross_check(&mut self, verifier: ConnectionId, height: Height, requested: Option<Header>) -> Vec<Action> {
		let ours = self.assembled.get(&height).copied();
		match (requested, ours) {
			(Some(theirs), Some(leader_header)) if theirs != leader_header => {
				let leader = self.leaders.first().copied();
				let mut actions = vec![Action::Offend {
					connection: leader.unwrap_or(verifier),
					offense: Offense::BadMatch,
					detail: format!("verifier disagreed at height {}", height),
				}];
				if let Some(l) = leader {
					self.leaders.retain(|&x| x != l);
					self.assembled.retain(|&h, _| h < height);
				}
				actions.extend(self.promote_next_verifier());
				actions
			}
			_ => vec![],
		}
	}

	/// Whether the assembled headerchain now outweighs `our.worksum`,
	/// and if so, hands back the full candidate range for
	/// [`crate::block_download::BlockDownload`] to fetch bodies for.
	pub fn ready_headerchain(&self, our: &ChainDescriptor) -> Option<ReadyHeaderchain> {
		let descriptor = self.descriptor?;
		if self.assembled.is_empty() {
			return None;
		}
		let start_height = *self.assembled.keys().next().unwrap();
		let mut total = Worksum::zero();
		// worksum of our own chain up to (but not including) the fork.
		let mut prefix = our.worksum;
		if start_height <= our.length {
			// Conservatively treat the whole candidate span as newly
			// contributed work; the engine recomputes the authoritative
			// worksum from its own stored headers on `stage_set`/`apply_stage`.
			prefix = Worksum::zero();
		}
		for (&height, header) in &self.assembled {
			let target = self.params.target_at(header.target_raw, height);
			total = total + Worksum::from_target(target);
		}
		if prefix + total <= our.worksum {
			return None;
		}
		let headers: Vec<Header> = self.assembled.values().copied().collect();
		Some(ReadyHeaderchain { descriptor, start_height, headers })
	}

	/// Discards everything assembled so far, e.g. after the Orchestrator
	/// has handed a [`ReadyHeaderchain`] off to block download, or after
	/// it has been rejected by the chain engine.
	pub fn reset(&mut self) {
		self.assembled.clear();
		self.descriptor = None;
		self.leaders.clear();
		self.candidates.clear();
		self.outstanding_probes.clear();
		self.outstanding_batches.clear();
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use ironcrest_core::hash::ZERO_HASH;

	struct IdentityHasher;
	impl PowHasher for IdentityHasher {
		fn pow_hash(&self, header: &Header, _v: ironcrest_core::pow::PowVersion) -> ironcrest_core::hash::Hash {
			header.hash()
		}
	}

	fn hd() -> HeaderDownload {
		HeaderDownload::new(Arc::new(IdentityHasher), ConsensusParams::testnet())
	}

	fn genesis_our() -> ChainDescriptor {
		ChainDescriptor::genesis(ZERO_HASH)
	}

	#[test]
	fn new_peer_with_zero_overlap_is_promoted_directly() {
		let mut d = hd();
		let our = genesis_our();
		let peer = ChainSummary { descriptor: 9, length: 5, worksum: Worksum::max(), grid: ironcrest_chain::Grid::new() };
		let actions = d.consider_peer(1, &peer, &our);
		assert_eq!(actions.len(), 1);
		match &actions[0] {
			Action::SendBatchReq { to, start_height, .. } => {
				assert_eq!(*to, 1);
				assert_eq!(*start_height, 1);
			}
			_ => panic!("expected an immediate batch request"),
		}
	}

	#[test]
	fn fourth_outweighing_peer_becomes_a_verifier_not_a_leader() {
		let mut d = hd();
		let our = genesis_our();
		let peer = ChainSummary { descriptor: 1, length: 0, worksum: Worksum::max(), grid: ironcrest_chain::Grid::new() };
		for id in 1..=3u64 {
			d.consider_peer(id, &peer, &our);
		}
		let actions = d.consider_peer(4, &peer, &our);
		assert!(actions.is_empty());
		assert_eq!(d.leaders.len(), 3);
	}
}
