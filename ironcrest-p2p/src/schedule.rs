//! Outbound-reconnect policy: three disjoint buckets of candidate
//! endpoints (verified, unverified-but-previously-failed, unverified-new),
//! each entry carrying a bit-packed recent-attempt log and a next-attempt
//! timer.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::thread_rng;

/// Bit-packed history of recent connection attempts against one
/// endpoint. Bits `[0..5)` count how many of the last attempts were
/// active (tried) vs. unset; bit 5 and above record success/failure in
/// the order they happened, most recent in the lowest active bit.
/// `log_failure`/`log_success` shift the prior log left by the
/// active-bit count and prepend a 0 (failure) or 1 (success) outcome bit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionLog {
	bits: u32,
}

impl ConnectionLog {
	fn active_bits(&self) -> u32 {
		self.bits & 0x0000_001F
	}

	/// Number of consecutive failures at the head of the log (most
	/// recent first), capped by how many attempts have actually been
	/// logged.
	pub fn consecutive_failures(&self) -> u32 {
		let z = (self.bits >> 5).trailing_zeros();
		z.min(self.active_bits())
	}

	/// Whether the most recent logged attempt was a failure.
	pub fn last_connection_failed(&self) -> bool {
		(self.bits & (1 << 5)) == 0
	}

	pub fn log_failure(&mut self) {
		let mut active = self.active_bits() + 1;
		if (active >> 5) > 0 {
			active = 0x0000_001F;
		}
		let logbits = self.bits >> 5;
		self.bits = (logbits << 6) | active;
	}

	pub fn log_success(&mut self) {
		let mut active = self.active_bits() + 1;
		if (active >> 5) > 0 {
			active = 0x0000_001F;
		}
		self.bits = (((self.bits >> 4) | 0x0000_0001) << 5) | active;
	}
}

/// Which of the three buckets an endpoint currently lives in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EndpointState {
	Verified,
	UnverifiedNew,
	UnverifiedFailed,
}

/// What [`ConnectionSchedule::outbound_connection_ended`] needs to know
/// about how an outbound attempt concluded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionOutcome {
	/// Never even reached TCP connect.
	NotConnected,
	/// Connected but never completed the handshake.
	ConnectedUninitialized,
	/// Connected and fully handshaked.
	ConnectedInitialized,
}

struct Entry {
	log: ConnectionLog,
	next_attempt: Instant,
	prev_wait: Duration,
	pending: bool,
}

impl Entry {
	fn new(now: Instant) -> Entry {
		Entry { log: ConnectionLog::default(), next_attempt: now, prev_wait: Duration::from_secs(0), pending: false }
	}
}

/// Outbound-reconnect scheduler: maintains the verified / unverified-new /
/// unverified-failed buckets, their backoff timers, a pinned-peer set
/// that is always kept in the schedule and favored, and provides the
/// random verified-address sample used to answer `Ping` with `Pong`.
pub struct ConnectionSchedule {
	verified: HashMap<SocketAddr, Entry>,
	unverified_new: HashMap<SocketAddr, Entry>,
	unverified_failed: HashMap<SocketAddr, Entry>,
	pinned: std::collections::HashSet<SocketAddr>,
}

impl ConnectionSchedule {
	/// Builds a fresh schedule, inserting `pinned` addresses (the
	/// configured `connect` list) into `unverified_new` so they are
	/// always retried regardless of prior failures.
	pub fn new(pinned: Vec<SocketAddr>) -> ConnectionSchedule {
		let now = Instant::now();
		let mut unverified_new = HashMap::new();
		for addr in &pinned {
			unverified_new.insert(*addr, Entry::new(now));
		}
		ConnectionSchedule {
			verified: HashMap::new(),
			unverified_new,
			unverified_failed: HashMap::new(),
			pinned: pinned.into_iter().collect(),
		}
	}

	/// Seeds the verified bucket from persisted peer-store history,
	/// treating `last_seen` as the last-verified instant.
	pub fn seed_verified(&mut self, addrs: Vec<SocketAddr>) {
		let now = Instant::now();
		for addr in addrs {
			self.verified.entry(addr).or_insert_with(|| Entry::new(now));
		}
	}

	fn find_state(&self, addr: &SocketAddr) -> Option<EndpointState> {
		if self.verified.contains_key(addr) {
			Some(EndpointState::Verified)
		} else if self.unverified_new.contains_key(addr) {
			Some(EndpointState::UnverifiedNew)
		} else if self.unverified_failed.contains_key(addr) {
			Some(EndpointState::UnverifiedFailed)
		} else {
			None
		}
	}

	/// Inserts a newly-learned address (e.g. from a `Pong` sample) into
	/// `unverified_new` if it isn't already tracked in some bucket.
	pub fn insert(&mut self, addr: SocketAddr) {
		if self.find_state(&addr).is_some() {
			return;
		}
		self.unverified_new.insert(addr, Entry::new(Instant::now()));
	}

	/// Moves `addr` into the verified bucket on a successful handshake.
	pub fn connection_established(&mut self, addr: SocketAddr) {
		if let Some(mut e) = self.unverified_new.remove(&addr).or_else(|| self.unverified_failed.remove(&addr)) {
			e.pending = false;
			e.log.log_success();
			self.verified.insert(addr, e);
		} else if let Some(e) = self.verified.get_mut(&addr) {
			e.pending = false;
			e.log.log_success();
		}
	}

	/// Applies the backoff policy after an outbound attempt against
	/// `addr` concluded with `outcome`, returning the new next-attempt
	/// time.
	pub fn outbound_connection_ended(&mut self, addr: SocketAddr, outcome: ConnectionOutcome) -> Instant {
		let pinned = self.pinned.contains(&addr);
		let bucket = match self.find_state(&addr) {
			Some(EndpointState::Verified) => &mut self.verified,
			Some(EndpointState::UnverifiedNew) => &mut self.unverified_new,
			Some(EndpointState::UnverifiedFailed) => &mut self.unverified_failed,
			None => return Instant::now(),
		};
		let verified = matches!(self.find_state(&addr), Some(EndpointState::Verified));
		let entry = bucket.get_mut(&addr).expect("bucket lookup matched find_state");
		entry.pending = false;
		if outcome == ConnectionOutcome::NotConnected || outcome == ConnectionOutcome::ConnectedUninitialized {
			entry.log.log_failure();
		}

		let consecutive_failures = entry.log.consecutive_failures();
		let wait = if consecutive_failures == 0 && verified {
			Duration::from_secs(5 * 60)
		} else if consecutive_failures == 1 {
			if verified || pinned {
				Duration::from_secs(1)
			} else {
				Duration::from_secs(30)
			}
		} else {
			let mut d = entry.prev_wait;
			if d < Duration::from_secs(1) {
				d = Duration::from_secs(1);
			} else {
				d *= 2;
			}
			if pinned {
				d.min(Duration::from_secs(20))
			} else {
				d.min(Duration::from_secs(30 * 60))
			}
		};
		entry.prev_wait = wait;
		entry.next_attempt = Instant::now() + wait;
		entry.next_attempt
	}

	/// Pops every entry (across all three buckets) whose `next_attempt`
	/// has passed, marking them pending so they aren't popped again until
	/// their next conclusion is reported.
	pub fn pop_expired(&mut self) -> Vec<SocketAddr> {
		let now = Instant::now();
		let mut out = Vec::new();
		for bucket in [&mut self.verified, &mut self.unverified_new, &mut self.unverified_failed] {
			for (addr, entry) in bucket.iter_mut() {
				if !entry.pending && entry.next_attempt <= now {
					entry.pending = true;
					out.push(*addr);
				}
			}
		}
		out
	}

	/// The earliest upcoming `next_attempt` across all buckets, for
	/// sizing the Orchestrator's wakeup timer.
	pub fn next_wakeup(&self) -> Option<Instant> {
		[&self.verified, &self.unverified_new, &self.unverified_failed]
			.iter()
			.flat_map(|b| b.values())
			.filter(|e| !e.pending)
			.map(|e| e.next_attempt)
			.min()
	}

	/// A bucket-balanced random sample of up to `n` verified addresses,
	/// for answering a `Ping` with a `Pong` address sample.
	pub fn sample_verified(&self, n: usize) -> Vec<SocketAddr> {
		let mut addrs: Vec<SocketAddr> = self.verified.keys().copied().collect();
		addrs.shuffle(&mut thread_rng());
		addrs.truncate(n);
		addrs
	}

	/// Whether `addr` is one of the pinned (always-favored) peers.
	pub fn is_pinned(&self, addr: &SocketAddr) -> bool {
		self.pinned.contains(addr)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn connection_log_tracks_consecutive_failures() {
		let mut log = ConnectionLog::default();
		assert_eq!(log.consecutive_failures(), 0);
		log.log_failure();
		assert_eq!(log.consecutive_failures(), 1);
		log.log_failure();
		assert_eq!(log.consecutive_failures(), 2);
		log.log_success();
		assert_eq!(log.consecutive_failures(), 0);
	}

	#[test]
	fn first_failure_after_success_retries_quickly_when_verified() {
		let mut sched = ConnectionSchedule::new(vec![]);
		let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
		sched.insert(addr);
		sched.connection_established(addr);
		let next = sched.outbound_connection_ended(addr, ConnectionOutcome::NotConnected);
		assert!(next <= Instant::now() + Duration::from_secs(2));
	}

	#[test]
	fn unverified_first_failure_waits_thirty_seconds() {
		let mut sched = ConnectionSchedule::new(vec![]);
		let addr: SocketAddr = "127.0.0.2:9000".parse().unwrap();
		sched.insert(addr);
		let next = sched.outbound_connection_ended(addr, ConnectionOutcome::NotConnected);
		assert!(next >= Instant::now() + Duration::from_secs(29));
	}

	#[test]
	fn pinned_backoff_caps_at_twenty_seconds() {
		let addr: SocketAddr = "127.0.0.3:9000".parse().unwrap();
		let mut sched = ConnectionSchedule::new(vec![addr]);
		for _ in 0..10 {
			sched.outbound_connection_ended(addr, ConnectionOutcome::NotConnected);
		}
		let next = sched.outbound_connection_ended(addr, ConnectionOutcome::NotConnected);
		assert!(next <= Instant::now() + Duration::from_secs(21));
	}
}
