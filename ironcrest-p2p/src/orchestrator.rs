//! The network event loop: single-threaded driver of every peer
//! connection. Holds the connection table, per-peer chain descriptor,
//! the [`HeaderDownload`]/[`BlockDownload`] sub-components, the outbound
//! [`ConnectionSchedule`], and per-peer request/timeout tracking.
//! Consumes [`TransportEvent`]s from [`crate::transport`] and
//! [`StateUpdate`]s from [`crate::chain_actor`], and drives both back:
//! requests to peers via [`TransportHandle`], mutations via
//! [`ChainHandle`].
//!
//! Every other crate reaches the Orchestrator only through
//! [`OrchestratorHandle`], never through a shared mutable reference.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::interval;

use ironcrest_chain::{ChainDescriptor, ChainEvent, ConsensusParams, StateUpdate};
use ironcrest_core::hash::{Hash, Hashed};
use ironcrest_core::height::Height;
use ironcrest_core::pow::PowHasher;
use ironcrest_core::txid::TxId;
use ironcrest_pool::TxSource;

use crate::block_download::{self, BlockDownload};
use crate::chain_actor::ChainHandle;
use crate::error::{ErrorKind, Offense};
use crate::header_download::{self, HeaderDownload};
use crate::msg::{
	Append, BatchRep, BatchReq, BlockRep, BlockReq, ChainSummary, Fork, Init, Leader, Message, Ping, Pong, ProbeRep,
	ProbeReq, Selector, SignedPinRollback, TxNotify, TxRep, TxReq,
};
use crate::peer_state::{ConnectionId, Job, PeerState, PING_INTERVAL};
use crate::peer_store::PeerStore;
use crate::schedule::{ConnectionOutcome, ConnectionSchedule};
use crate::transport::{CloseReason, TransportHandle};

/// Maximum simultaneous connections sharing one source IP.
const MAX_PER_IP: usize = 3;
const PING_SAMPLE_ADDRESSES: u32 = 64;
const PING_SAMPLE_TX: u32 = 256;
/// How often the tick loop re-checks timers, ping cadence, and the
/// outbound schedule.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// A snapshot of one connection, for the external `get_peers` query.
#[derive(Clone, Debug)]
pub struct PeerSummary {
	pub id: ConnectionId,
	pub addr: SocketAddr,
	pub inbound: bool,
	pub claimed_chain_length: Option<Height>,
	pub is_leader: bool,
	pub connected_secs: u64,
}

/// Queries the external API surface makes of the Orchestrator.
pub enum ApiCommand {
	GetPeers { reply: oneshot::Sender<Vec<PeerSummary>> },
	GetBanned { reply: oneshot::Sender<Vec<(IpAddr, u64)>> },
	Unban { ip: IpAddr, reply: oneshot::Sender<()> },
	Disconnect { id: ConnectionId, reply: oneshot::Sender<bool> },
	/// Returns a watch channel bumped every time consensus advances or
	/// the mempool changes in a way that affects the block template, so
	/// callers can invalidate a cached template without polling.
	SubscribeMining { reply: oneshot::Sender<watch::Receiver<u64>> },
}

/// Cloneable handle to a running Orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
	tx: mpsc::Sender<ApiCommand>,
}

impl OrchestratorHandle {
	async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ApiCommand) -> T {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.tx.send(build(reply_tx)).await.expect("orchestrator task has exited");
		reply_rx.await.expect("orchestrator task has exited")
	}

	pub async fn get_peers(&self) -> Vec<PeerSummary> {
		self.call(|reply| ApiCommand::GetPeers { reply }).await
	}

	pub async fn get_banned(&self) -> Vec<(IpAddr, u64)> {
		self.call(|reply| ApiCommand::GetBanned { reply }).await
	}

	pub async fn unban(&self, ip: IpAddr) {
		self.call(|reply| ApiCommand::Unban { ip, reply }).await
	}

	pub async fn disconnect(&self, id: ConnectionId) -> bool {
		self.call(|reply| ApiCommand::Disconnect { id, reply }).await
	}

	pub async fn subscribe_mining(&self) -> watch::Receiver<u64> {
		self.call(|reply| ApiCommand::SubscribeMining { reply }).await
	}
}

/// Drives sync toward the canonical chain and publishes chain updates
/// back to every initialized peer.
pub struct Orchestrator {
	chain: ChainHandle,
	transport: TransportHandle,
	peer_store: Arc<PeerStore>,
	schedule: ConnectionSchedule,
	connections: HashMap<ConnectionId, PeerState>,
	by_ip: HashMap<IpAddr, HashSet<ConnectionId>>,
	header_download: HeaderDownload,
	block_download: BlockDownload,
	our: ChainDescriptor,
	/// Suppresses all outbound connects (config `isolated`).
	isolated: bool,
	our_listen_port: Option<u16>,
	next_ping_nonce: u64,
	mining_version: watch::Sender<u64>,
}

impl Orchestrator {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		chain: ChainHandle,
		transport: TransportHandle,
		peer_store: Arc<PeerStore>,
		schedule: ConnectionSchedule,
		pow: Arc<dyn PowHasher>,
		params: ConsensusParams,
		our: ChainDescriptor,
		isolated: bool,
		our_listen_port: Option<u16>,
	) -> Orchestrator {
		Orchestrator {
			chain,
			transport,
			peer_store,
			schedule,
			connections: HashMap::new(),
			by_ip: HashMap::new(),
			header_download: HeaderDownload::new(pow, params),
			block_download: BlockDownload::new(),
			our,
			isolated,
			our_listen_port,
			next_ping_nonce: 1,
			mining_version: watch::channel(0).0,
		}
	}

	fn bump_mining_version(&self) {
		self.mining_version.send_modify(|v| *v += 1);
	}

	fn next_nonce(&mut self) -> u64 {
		let n = self.next_ping_nonce;
		self.next_ping_nonce += 1;
		n
	}

	/// Runs the event loop until every input channel closes. Consumes
	/// `self`: this is the actor's entire lifetime.
	pub async fn run(
		mut self,
		mut transport_events: mpsc::Receiver<crate::transport::TransportEvent>,
		mut chain_updates: mpsc::Receiver<StateUpdate>,
		mut api_commands: mpsc::Receiver<ApiCommand>,
	) {
		let mut ticker = interval(TICK_INTERVAL);
		loop {
			tokio::select! {
				event = transport_events.recv() => {
					match event {
						Some(event) => self.on_transport_event(event).await,
						None => break,
					}
				}
				update = chain_updates.recv() => {
					match update {
						Some(update) => self.on_state_update(update).await,
						None => break,
					}
				}
				cmd = api_commands.recv() => {
					match cmd {
						Some(cmd) => self.on_api_command(cmd).await,
						None => break,
					}
				}
				_ = ticker.tick() => self.on_tick().await,
			}
		}
	}

	// ---- connection admission & lifecycle -----------------------------

	async fn on_transport_event(&mut self, event: crate::transport::TransportEvent) {
		use crate::transport::TransportEvent::*;
		match event {
			Connected { id, addr, inbound, claimed_version, claimed_port } => {
				self.on_connected(id, addr, inbound, claimed_version, claimed_port).await;
			}
			HandshakeFailed { addr, inbound, reason } => {
				if !inbound {
					self.schedule.outbound_connection_ended(addr, ConnectionOutcome::NotConnected);
				}
				if let CloseReason::Error(kind) = reason {
					self.record_if_offense(addr.ip(), &kind);
				}
			}
			Disconnected { id, reason } => {
				self.on_disconnected(id, reason).await;
			}
			Message { id, message } => {
				self.on_message(id, message).await;
			}
		}
	}

	async fn on_connected(&mut self, id: ConnectionId, addr: SocketAddr, inbound: bool, claimed_version: u32, claimed_port: Option<u16>) {
		let ip = addr.ip();
		let same_ip = self.by_ip.entry(ip).or_default();
		if same_ip.len() >= MAX_PER_IP {
			let oldest = same_ip
				.iter()
				.filter(|cid| !self.connections.get(cid).map(|p| self.schedule.is_pinned(&p.peer_addr)).unwrap_or(false))
				.min_by_key(|cid| self.connections.get(cid).map(|p| p.connected_at).unwrap_or_else(Instant::now))
				.copied();
			if let Some(evict) = oldest {
				self.close_connection(evict, CloseReason::Error(ErrorKind::MaxConnections)).await;
			}
		}

		let mut peer = PeerState::new(id, inbound, addr);
		peer.claimed_version = claimed_version;
		peer.claimed_port = claimed_port;
		self.by_ip.entry(ip).or_default().insert(id);
		self.connections.insert(id, peer);

		if !inbound {
			self.schedule.connection_established(addr);
		}

		let init = Init {
			version: crate::framing::PROTOCOL_VERSION,
			chain: ChainSummary { descriptor: self.our.descriptor, length: self.our.length, worksum: self.our.worksum, grid: self.our.grid.clone() },
			pin_height: self.our.length,
			pin_hash: self.our.tip_hash,
		};
		self.transport.send(id, Message::Init(init)).await;
	}

	async fn on_disconnected(&mut self, id: ConnectionId, reason: CloseReason) {
		if let Some(peer) = self.connections.remove(&id) {
			if let Some(ips) = self.by_ip.get_mut(&peer.peer_addr.ip()) {
				ips.remove(&id);
				if ips.is_empty() {
					self.by_ip.remove(&peer.peer_addr.ip());
				}
			}
			if let CloseReason::Error(kind) = &reason {
				self.record_if_offense(peer.peer_addr.ip(), kind);
			}
			if !peer.inbound {
				let outcome = if peer.initialized() {
					ConnectionOutcome::ConnectedInitialized
				} else {
					ConnectionOutcome::ConnectedUninitialized
				};
				self.schedule.outbound_connection_ended(peer.peer_addr, outcome);
			}
		}
		for action in self.header_download.remove_peer(id) {
			self.apply_header_action(action).await;
		}
		self.block_download.on_peer_gone(id);
	}

	async fn close_connection(&mut self, id: ConnectionId, reason: CloseReason) {
		self.transport.disconnect(id, reason).await;
	}

	fn record_if_offense(&self, ip: IpAddr, kind: &ErrorKind) {
		if let ErrorKind::Offense(offense, _) = kind {
			self.peer_store.record_offense(ip, *offense);
		}
	}

	async fn offend(&mut self, id: ConnectionId, offense: Offense, detail: String) {
		log::debug!("offending connection {}: {:?} ({})", id, offense, detail);
		self.close_connection(id, CloseReason::Error(ErrorKind::Offense(offense, detail))).await;
	}

	// ---- message dispatch ----------------------------------------------

	async fn on_message(&mut self, id: ConnectionId, message: Message) {
		match message {
			Message::Init(m) => self.on_init(id, m).await,
			Message::Append(m) => self.on_append(id, m).await,
			Message::Fork(m) => self.on_fork(id, m).await,
			Message::SignedPinRollback(m) => self.on_signed_pin_rollback(id, m).await,
			Message::BatchReq(m) => self.on_batch_req(id, m).await,
			Message::BatchRep(m) => self.on_batch_rep(id, m).await,
			Message::ProbeReq(m) => self.on_probe_req(id, m).await,
			Message::ProbeRep(m) => self.on_probe_rep(id, m).await,
			Message::BlockReq(m) => self.on_block_req(id, m).await,
			Message::BlockRep(m) => self.on_block_rep(id, m).await,
			Message::Ping(m) => self.on_ping(id, m).await,
			Message::Pong(m) => self.on_pong(id, m).await,
			Message::TxNotify(m) => self.on_tx_notify(id, m).await,
			Message::TxReq(m) => self.on_tx_req(id, m).await,
			Message::TxRep(m) => self.on_tx_rep(id, m).await,
			Message::Leader(m) => self.on_leader(id, m).await,
		}
	}

	async fn on_init(&mut self, id: ConnectionId, m: Init) {
		let already_initialized = self.connections.get(&id).map(|p| p.initialized()).unwrap_or(false);
		if already_initialized {
			self.offend(id, Offense::MsgType, "duplicate Init".into()).await;
			return;
		}
		let chain = m.chain.clone();
		if let Some(peer) = self.connections.get_mut(&id) {
			peer.peer_chain = Some(chain.clone());
		} else {
			return;
		}
		self.consider_for_download(id, &chain).await;
	}

	async fn consider_for_download(&mut self, id: ConnectionId, chain: &ChainSummary) {
		if chain.worksum <= self.our.worksum {
			return;
		}
		let actions = self.header_download.consider_peer(id, chain, &self.our);
		for action in actions {
			self.apply_header_action(action).await;
		}
	}

	async fn on_append(&mut self, id: ConnectionId, m: Append) {
		let expected = match self.connections.get(&id).and_then(|p| p.peer_chain.as_ref()) {
			Some(c) => c.length + 1,
			None => {
				self.offend(id, Offense::BadAppend, "Append before Init".into()).await;
				return;
			}
		};
		if m.height != expected {
			self.offend(id, Offense::BadAppend, format!("expected height {}", expected)).await;
			return;
		}
		if let Some(peer) = self.connections.get_mut(&id) {
			if let Some(chain) = peer.peer_chain.as_mut() {
				chain.length = m.height;
				chain.worksum = chain.worksum + m.worksum_delta;
				if let Some(hash) = m.grid_delta {
					chain.grid.on_append(m.height, hash);
				}
			}
		}
		let chain = self.connections.get(&id).and_then(|p| p.peer_chain.clone());
		if let Some(chain) = chain {
			self.consider_for_download(id, &chain).await;
		}
	}

	async fn on_fork(&mut self, id: ConnectionId, m: Fork) {
		let ok = match self.connections.get(&id).and_then(|p| p.peer_chain.as_ref()) {
			Some(c) => m.fork_height <= c.length + 1,
			None => false,
		};
		if !ok {
			self.offend(id, Offense::BadFork, "Fork before Init or past tip".into()).await;
			return;
		}
		if let Some(peer) = self.connections.get_mut(&id) {
			if let Some(chain) = peer.peer_chain.as_mut() {
				chain.descriptor = chain.descriptor.wrapping_add(1);
				chain.grid.truncate_to(m.fork_height.saturating_sub(1));
				let mut height = m.fork_height;
				for hash in &m.grid_suffix {
					chain.grid.on_append(height, *hash);
					height += 1;
				}
				chain.length = height.saturating_sub(1).max(m.fork_height);
				chain.worksum = m.worksum;
			}
		}
		let chain = self.connections.get(&id).and_then(|p| p.peer_chain.clone());
		if let Some(chain) = chain {
			self.header_download.reset();
			self.consider_for_download(id, &chain).await;
		}
	}

	async fn on_signed_pin_rollback(&mut self, id: ConnectionId, m: SignedPinRollback) {
		let theirs = self.connections.get(&id).map(|p| p.snapshot_priority.theirs).unwrap_or(0);
		if m.snapshot.priority <= theirs {
			return;
		}
		if let Some(peer) = self.connections.get_mut(&id) {
			peer.snapshot_priority.theirs = m.snapshot.priority;
		}
		if self.chain.set_signed_snapshot(m.snapshot).await.is_err() {
			// Rejected (e.g. lower priority than already acknowledged, or a
			// bad signature). Not the peer's fault to disconnect over: the
			// chain engine is the arbiter here, not the wire message shape.
		}
	}

	async fn on_leader(&mut self, id: ConnectionId, m: Leader) {
		let theirs = self.connections.get(&id).map(|p| p.snapshot_priority.theirs).unwrap_or(0);
		if m.snapshot.priority <= theirs {
			return;
		}
		if let Some(peer) = self.connections.get_mut(&id) {
			peer.snapshot_priority.theirs = m.snapshot.priority;
		}
		let _ = self.chain.set_signed_snapshot(m.snapshot).await;
	}

	// ---- serving requests (BatchReq/ProbeReq/BlockReq) ----

	async fn on_batch_req(&mut self, id: ConnectionId, m: BatchReq) {
		let mut headers = Vec::new();
		if m.selector.descriptor == self.our.descriptor {
			for h in 0..m.selector.length {
				let height = m.selector.start_height + h;
				if height > self.our.length {
					break;
				}
				match self.chain.get_header(height).await {
					Ok(Some(header)) => headers.push(header),
					_ => break,
				}
			}
		}
		self.transport.send(id, Message::BatchRep(BatchRep { nonce: m.nonce, headers })).await;
	}

	async fn on_probe_req(&mut self, id: ConnectionId, m: ProbeReq) {
		let current = match self.chain.get_header(m.height.min(self.our.length)).await {
			Ok(Some(h)) => h,
			_ => return,
		};
		let requested = if m.descriptor == self.our.descriptor {
			match self.chain.get_header(m.height).await {
				Ok(h) => h,
				Err(_) => None,
			}
		} else {
			None
		};
		self.transport.send(id, Message::ProbeRep(ProbeRep { nonce: m.nonce, requested, current })).await;
	}

	async fn on_block_req(&mut self, id: ConnectionId, m: BlockReq) {
		let mut bodies = Vec::new();
		if m.descriptor == self.our.descriptor {
			for h in 0..m.range.length {
				let height = m.range.start_height + h;
				if height > self.our.length {
					break;
				}
				match self.chain.get_block(height).await {
					Ok(Some(block)) => bodies.push(block.body),
					_ => break,
				}
			}
		}
		self.transport.send(id, Message::BlockRep(BlockRep { nonce: m.nonce, bodies })).await;
	}

	// ---- header download wiring ----------------------------------------

	async fn on_batch_rep(&mut self, id: ConnectionId, m: BatchRep) {
		let start = match self.header_download.outstanding_batch_start(id) {
			Some(s) => s,
			None => {
				self.offend(id, Offense::Unrequested, "unexpected BatchRep".into()).await;
				return;
			}
		};
		let prev_hash = self.resolve_prev_hash(start).await;
		let actions = self.header_download.on_batch_rep(id, m.nonce, m.headers, prev_hash);
		for action in actions {
			self.apply_header_action(action).await;
		}
		self.maybe_promote_headerchain().await;
	}

	async fn resolve_prev_hash(&self, start: Height) -> Hash {
		if let Some(h) = self.header_download.assembled_header_at(start.saturating_sub(1)) {
			return h.hash();
		}
		match self.chain.get_header(start.saturating_sub(1)).await {
			Ok(Some(h)) => h.hash(),
			_ => self.our.tip_hash,
		}
	}

	async fn on_probe_rep(&mut self, id: ConnectionId, m: ProbeRep) {
		let probed_height = match self.header_download.probe_height(id) {
			Some(h) => h,
			None => {
				self.offend(id, Offense::Unrequested, "unexpected ProbeRep".into()).await;
				return;
			}
		};
		let our_header = match self.chain.get_header(probed_height).await {
			Ok(h) => h,
			Err(_) => None,
		};
		let actions = self.header_download.on_probe_rep(id, m.nonce, m.requested, our_header);
		for action in actions {
			self.apply_header_action(action).await;
		}
	}

	async fn apply_header_action(&mut self, action: header_download::Action) {
		match action {
			header_download::Action::SendProbe { to, nonce, descriptor, height } => {
				self.set_job(to, Job::Probe { nonce, height, started_at: Instant::now() });
				self.transport.send(to, Message::ProbeReq(ProbeReq { nonce, descriptor, height })).await;
			}
			header_download::Action::SendBatchReq { to, nonce, descriptor, start_height, length } => {
				self.set_job(to, Job::HeaderBatch { nonce, start_height, started_at: Instant::now() });
				self.transport
					.send(to, Message::BatchReq(BatchReq { nonce, selector: Selector { descriptor, start_height, length } }))
					.await;
			}
			header_download::Action::Offend { connection, offense, detail } => {
				self.offend(connection, offense, detail).await;
			}
		}
	}

	async fn maybe_promote_headerchain(&mut self) {
		let ready = match self.header_download.ready_headerchain(&self.our) {
			Some(r) => r,
			None => return,
		};
		let first_missing = self.chain.stage_set(ready.headers.clone()).await;
		self.block_download.set_target(ready.descriptor, first_missing, ready.start_height + ready.headers.len() as Height - 1);
		self.header_download.reset();
		self.dispatch_block_requests().await;
	}

	// ---- block download wiring ------------------------------------------

	async fn dispatch_block_requests(&mut self) {
		let target = self.block_download.target_descriptor();
		let peers: Vec<ConnectionId> = self
			.connections
			.iter()
			.filter(|(_, p)| p.peer_chain.as_ref().map(|c| Some(c.descriptor) == target).unwrap_or(false))
			.map(|(id, _)| *id)
			.collect();
		for peer in peers {
			if let Some(action) = self.block_download.request_next(peer) {
				self.apply_block_action(action).await;
			}
		}
	}

	async fn apply_block_action(&mut self, action: block_download::Action) {
		match action {
			block_download::Action::SendBlockReq { to, nonce, descriptor, range } => {
				self.set_job(to, Job::BlockRange { nonce, start_height: range.start_height, started_at: Instant::now() });
				self.transport.send(to, Message::BlockReq(BlockReq { nonce, descriptor, range })).await;
			}
			block_download::Action::Offend { connection, offense, detail } => {
				self.offend(connection, offense, detail).await;
			}
		}
	}

	async fn on_block_rep(&mut self, id: ConnectionId, m: BlockRep) {
		let delivered = match self.block_download.on_block_rep(id, m.nonce, m.bodies) {
			Ok(bodies) => bodies,
			Err(action) => {
				self.apply_block_action(action).await;
				self.dispatch_block_requests().await;
				return;
			}
		};
		if let Some(peer) = self.connections.get_mut(&id) {
			peer.job = None;
		}
		match self.chain.stage_add(delivered).await {
			Ok(Some(update)) => self.publish_state_update(update).await,
			Ok(None) => {}
			Err(err) => {
				if let Some(action) = self.block_download.on_bad_body(err.height) {
					self.apply_block_action(action).await;
				}
			}
		}
		if self.block_download.is_active() {
			self.dispatch_block_requests().await;
		} else {
			self.block_download.clear();
		}
	}

	// ---- publishing state updates ---------------------------------------

	async fn on_state_update(&mut self, update: StateUpdate) {
		self.publish_state_update(update).await;
	}

	async fn publish_state_update(&mut self, update: StateUpdate) {
		match &update.event {
			ChainEvent::Append { height, header, worksum_delta } => {
				self.our.append(header, *worksum_delta);
				debug_assert_eq!(self.our.length, *height);
				let grid_delta = if *height % ironcrest_chain::BATCH_SIZE == 0 { Some(header.hash()) } else { None };
				self.broadcast(Message::Append(Append { height: *height, header: *header, worksum_delta: *worksum_delta, grid_delta })).await;
			}
			ChainEvent::Fork { fork_height, worksum, new_head, grid_suffix } => {
				self.our.descriptor = self.our.descriptor.wrapping_add(1);
				self.our.worksum = *worksum;
				self.our.tip_hash = new_head.hash();
				self.our.grid.truncate_to(fork_height.saturating_sub(1));
				let mut h = *fork_height;
				for hash in grid_suffix {
					self.our.grid.on_append(h, *hash);
					h += 1;
				}
				self.broadcast(Message::Fork(Fork { fork_height: *fork_height, worksum: *worksum, new_head: *new_head, grid_suffix: grid_suffix.clone() })).await;
			}
			ChainEvent::Rollback { height } => {
				self.our.length = *height;
			}
		}
		if !update.mempool_log.is_empty() {
			let txids = update.mempool_log.iter().map(|tx| tx.tx_id()).collect();
			self.broadcast(Message::TxNotify(TxNotify { txids })).await;
		}
		self.bump_mining_version();
	}

	async fn broadcast(&mut self, message: Message) {
		let ids: Vec<ConnectionId> = self.connections.iter().filter(|(_, p)| p.initialized()).map(|(id, _)| *id).collect();
		for id in ids {
			self.transport.send(id, message.clone()).await;
		}
	}

	// ---- liveness: ping/pong, peer exchange, mempool gossip -------------

	async fn on_ping(&mut self, id: ConnectionId, m: Ping) {
		let allowed = self.connections.get_mut(&id).map(|p| p.ping_rate.take()).unwrap_or(false);
		if !allowed {
			self.offend(id, Offense::MsgFlood, "ping rate exceeded".into()).await;
			return;
		}
		if let Some(peer) = self.connections.get_mut(&id) {
			peer.snapshot_priority.theirs = peer.snapshot_priority.theirs.max(m.snapshot_priority);
		}
		let addresses = self.schedule.sample_verified((m.max_addresses.min(PING_SAMPLE_ADDRESSES)) as usize);
		let mut txids = self.chain.get_txcache().await;
		txids.truncate((m.max_tx.min(PING_SAMPLE_TX)) as usize);
		self.transport.send(id, Message::Pong(Pong { nonce: m.nonce, addresses, txids })).await;
	}

	async fn on_pong(&mut self, id: ConnectionId, m: Pong) {
		let matches = self.connections.get(&id).map(|p| p.ping.outstanding_nonce == Some(m.nonce)).unwrap_or(false);
		if !matches {
			self.offend(id, Offense::Unrequested, "pong nonce".into()).await;
			return;
		}
		if let Some(peer) = self.connections.get_mut(&id) {
			peer.ping.outstanding_nonce = None;
			peer.ping.sent_at = None;
			peer.ping.last_pong_at = Some(Instant::now());
		}
		for addr in &m.addresses {
			self.schedule.insert(*addr);
		}
		let known: HashSet<TxId> = self.chain.get_txcache().await.into_iter().collect();
		let unknown: Vec<TxId> = m.txids.into_iter().filter(|id| !known.contains(id)).collect();
		if !unknown.is_empty() {
			self.transport.send(id, Message::TxReq(TxReq { txids: unknown })).await;
		}
	}

	async fn on_tx_notify(&mut self, id: ConnectionId, m: TxNotify) {
		let allowed = self.connections.get_mut(&id).map(|p| p.tx_notify_rate.take()).unwrap_or(false);
		if !allowed {
			self.offend(id, Offense::MsgFlood, "tx-notify rate exceeded".into()).await;
			return;
		}
		let known: HashSet<TxId> = self.chain.get_txcache().await.into_iter().collect();
		let unknown: Vec<TxId> = m.txids.into_iter().filter(|id| !known.contains(id)).collect();
		if !unknown.is_empty() {
			self.transport.send(id, Message::TxReq(TxReq { txids: unknown })).await;
		}
	}

	async fn on_tx_req(&mut self, id: ConnectionId, m: TxReq) {
		let wanted: HashSet<TxId> = m.txids.into_iter().collect();
		let pool = self.chain.get_mempool(usize::MAX / 2).await;
		let txs = pool.into_iter().filter(|tx| wanted.contains(&tx.tx_id())).collect();
		self.transport.send(id, Message::TxRep(TxRep { txs })).await;
	}

	async fn on_tx_rep(&mut self, id: ConnectionId, m: TxRep) {
		let source = TxSource::peer(self.connections.get(&id).map(|p| p.peer_addr.to_string()).unwrap_or_default());
		for tx in m.txs {
			let _ = self.chain.put_mempool(tx, source.clone()).await;
		}
	}

	// ---- tick: timers, ping cadence, outbound schedule -------------------

	fn set_job(&mut self, id: ConnectionId, job: Job) {
		if let Some(peer) = self.connections.get_mut(&id) {
			peer.job = Some(job);
		}
	}

	async fn on_tick(&mut self) {
		let now = Instant::now();

		let expired_jobs: Vec<ConnectionId> = self.connections.iter().filter(|(_, p)| p.job_expired(now)).map(|(id, _)| *id).collect();
		for id in expired_jobs {
			self.block_download.on_timeout(id);
			self.header_download.remove_peer(id);
			self.close_connection(id, CloseReason::Error(ErrorKind::Timeout)).await;
		}

		let timed_out_pings: Vec<ConnectionId> = self.connections.iter().filter(|(_, p)| p.ping_expired(now)).map(|(id, _)| *id).collect();
		for id in timed_out_pings {
			self.close_connection(id, CloseReason::Error(ErrorKind::Timeout)).await;
		}

		let due: Vec<ConnectionId> = self
			.connections
			.iter()
			.filter(|(_, p)| {
				p.initialized()
					&& p.ping.outstanding_nonce.is_none()
					&& p.ping.last_pong_at.map(|t| now.duration_since(t) >= PING_INTERVAL).unwrap_or(true)
			})
			.map(|(id, _)| *id)
			.collect();
		for id in due {
			let nonce = self.next_nonce();
			if let Some(peer) = self.connections.get_mut(&id) {
				peer.ping.outstanding_nonce = Some(nonce);
				peer.ping.sent_at = Some(now);
			}
			self.transport
				.send(id, Message::Ping(Ping { nonce, snapshot_priority: 0, max_addresses: PING_SAMPLE_ADDRESSES, max_tx: PING_SAMPLE_TX }))
				.await;
		}

		if !self.isolated {
			for addr in self.schedule.pop_expired() {
				self.transport.connect(addr).await;
			}
		}
	}

	async fn on_api_command(&mut self, cmd: ApiCommand) {
		match cmd {
			ApiCommand::GetPeers { reply } => {
				let now = Instant::now();
				let leaders: HashSet<ConnectionId> = self.header_download.leaders().into_iter().collect();
				let summaries = self
					.connections
					.values()
					.map(|p| PeerSummary {
						id: p.id,
						addr: p.peer_addr,
						inbound: p.inbound,
						claimed_chain_length: p.peer_chain.as_ref().map(|c| c.length),
						is_leader: leaders.contains(&p.id),
						connected_secs: now.duration_since(p.connected_at).as_secs(),
					})
					.collect();
				let _ = reply.send(summaries);
			}
			ApiCommand::GetBanned { reply } => {
				let _ = reply.send(self.peer_store.banned());
			}
			ApiCommand::Unban { ip, reply } => {
				self.peer_store.unban(ip);
				let _ = reply.send(());
			}
			ApiCommand::Disconnect { id, reply } => {
				let existed = self.connections.contains_key(&id);
				if existed {
					self.close_connection(id, CloseReason::Requested).await;
				}
				let _ = reply.send(existed);
			}
			ApiCommand::SubscribeMining { reply } => {
				let _ = reply.send(self.mining_version.subscribe());
			}
		}
	}
}

/// Spawns the Orchestrator task, returning the handle the external API
/// surface uses plus its join handle.
pub fn spawn_orchestrator(
	orchestrator: Orchestrator,
	transport_events: mpsc::Receiver<crate::transport::TransportEvent>,
	chain_updates: mpsc::Receiver<StateUpdate>,
) -> (OrchestratorHandle, tokio::task::JoinHandle<()>) {
	let (api_tx, api_rx) = mpsc::channel::<ApiCommand>(256);
	let join = tokio::spawn(async move {
		orchestrator.run(transport_events, chain_updates, api_rx).await;
	});
	(OrchestratorHandle { tx: api_tx }, join)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn max_per_ip_matches_the_configured_limit() {
		assert_eq!(MAX_PER_IP, 3);
	}
}
