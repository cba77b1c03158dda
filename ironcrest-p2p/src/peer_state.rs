//! Per-connection record: claimed chain, outstanding requests, ping
//! liveness, and a rate limiter. Created on successful handshake,
//! destroyed on disconnect; never outlives its underlying socket, which
//! is exclusively owned by [`crate::transport::TransportManager`].

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use ironcrest_util::rate_counter::TokenBucket;

use crate::msg::ChainSummary;

/// Opaque handle to a connection, owned by [`crate::transport::TransportManager`];
/// every other component refers to a connection only by this id.
pub type ConnectionId = u64;

/// The three kinds of request the Orchestrator ever has outstanding
/// against a given peer, each capped at one in flight at a time.
#[derive(Copy, Clone, Debug)]
pub enum Job {
	HeaderBatch { nonce: u64, start_height: u32, started_at: Instant },
	BlockRange { nonce: u64, start_height: u32, started_at: Instant },
	Probe { nonce: u64, height: u32, started_at: Instant },
}

impl Job {
	pub fn nonce(&self) -> u64 {
		match self {
			Job::HeaderBatch { nonce, .. } | Job::BlockRange { nonce, .. } | Job::Probe { nonce, .. } => *nonce,
		}
	}

	pub fn started_at(&self) -> Instant {
		match self {
			Job::HeaderBatch { started_at, .. }
			| Job::BlockRange { started_at, .. }
			| Job::Probe { started_at, .. } => *started_at,
		}
	}
}

/// Default timeout for any outstanding request (2 minutes).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Ping/Pong liveness bookkeeping for one connection.
#[derive(Clone, Debug)]
pub struct PingState {
	pub outstanding_nonce: Option<u64>,
	pub sent_at: Option<Instant>,
	pub last_pong_at: Option<Instant>,
}

impl PingState {
	pub fn new() -> PingState {
		PingState { outstanding_nonce: None, sent_at: None, last_pong_at: None }
	}
}

impl Default for PingState {
	fn default() -> PingState {
		PingState::new()
	}
}

/// Seconds to sleep after a successful Pong before sending the next Ping.
pub const PING_INTERVAL: Duration = Duration::from_secs(10);
/// Seconds without a Pong after a Ping before the connection is closed.
pub const PING_TIMEOUT: Duration = Duration::from_secs(60);
/// Minimum spacing enforced between Pings we accept from a peer.
pub const PING_RATE_INTERVAL: Duration = Duration::from_secs(8);

/// A remote peer's belief of its own snapshot acknowledgment state,
/// tracked so we only forward higher-priority snapshots.
#[derive(Copy, Clone, Debug, Default)]
pub struct SnapshotPriority {
	pub ack: u64,
	pub theirs: u64,
}

/// Full per-connection state.
pub struct PeerState {
	pub id: ConnectionId,
	pub inbound: bool,
	pub peer_addr: SocketAddr,
	pub claimed_version: u32,
	pub claimed_port: Option<u16>,
	pub peer_chain: Option<ChainSummary>,
	pub snapshot_priority: SnapshotPriority,
	pub job: Option<Job>,
	pub ping: PingState,
	pub ping_rate: TokenBucket,
	pub tx_notify_rate: TokenBucket,
	pub connected_at: Instant,
}

impl PeerState {
	pub fn new(id: ConnectionId, inbound: bool, peer_addr: SocketAddr) -> PeerState {
		PeerState {
			id,
			inbound,
			peer_addr,
			claimed_version: 0,
			claimed_port: None,
			peer_chain: None,
			snapshot_priority: SnapshotPriority::default(),
			job: None,
			ping: PingState::new(),
			ping_rate: TokenBucket::new(PING_RATE_INTERVAL, 1.0),
			tx_notify_rate: TokenBucket::new(Duration::from_secs(1), 8.0),
			connected_at: Instant::now(),
		}
	}

	/// Whether this peer has completed `Init` and may now be driven by
	/// the header/block download sub-components.
	pub fn initialized(&self) -> bool {
		self.peer_chain.is_some()
	}

	/// Whether the currently outstanding job, if any, has exceeded
	/// [`REQUEST_TIMEOUT`].
	pub fn job_expired(&self, now: Instant) -> bool {
		self.job.map(|j| now.duration_since(j.started_at()) > REQUEST_TIMEOUT).unwrap_or(false)
	}

	/// Whether an outstanding ping has gone unanswered past [`PING_TIMEOUT`].
	pub fn ping_expired(&self, now: Instant) -> bool {
		match self.ping.sent_at {
			Some(t) => now.duration_since(t) > PING_TIMEOUT,
			None => false,
		}
	}
}
