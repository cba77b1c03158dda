//! Persists ban records, the offense log, and recently-seen peer
//! addresses; answers authentication queries synchronously off the
//! accept/connect hot path. The ban cache is consulted before a socket
//! is even accepted, so it is a `parking_lot::RwLock` rather than a
//! message round-trip to a separate actor task — the one place state
//! is shared outside the otherwise strictly message-passing actor
//! model.

use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lru_cache::LruCache;
use serde::{Deserialize, Serialize};

use ironcrest_util::RwLock;

use crate::error::Offense;

/// One recorded protocol offense, kept for diagnostics independent of
/// whether it led to a ban.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OffenseRecord {
	pub ip: IpAddr,
	pub offense: String,
	pub at_unix: u64,
}

/// A persisted ban: the IP and the unix timestamp it expires at.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BanRecord {
	pub ban_until_unix: u64,
}

/// An address this node has successfully connected to before, along with
/// when it was last seen, used to seed the connection schedule's verified
/// bucket on startup.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SeenPeer {
	pub last_seen_unix: u64,
}

#[derive(Default, Serialize, Deserialize)]
struct PersistedState {
	bans: HashMap<IpAddr, BanRecord>,
	seen: HashMap<std::net::SocketAddr, SeenPeer>,
}

fn now_unix() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// In-memory-backed, file-persisted store of peer reputation data. Ban
/// lookups are synchronous (`RwLock`, not a channel), since they must
/// answer before an inbound socket is accepted or an outbound connect
/// is attempted.
pub struct PeerStore {
	path: Option<PathBuf>,
	bans: RwLock<HashMap<IpAddr, BanRecord>>,
	seen: RwLock<HashMap<std::net::SocketAddr, SeenPeer>>,
	ban_cache: RwLock<LruCache<IpAddr, u64>>,
	offense_log: RwLock<Vec<OffenseRecord>>,
	enable_ban: bool,
}

impl PeerStore {
	/// Opens (or initializes) a peer store backed by `path`, a JSON file.
	/// `path = None` keeps everything in memory only (used by tests).
	pub fn open(path: Option<PathBuf>, enable_ban: bool) -> PeerStore {
		let persisted = path
			.as_ref()
			.and_then(|p| fs::read(p).ok())
			.and_then(|bytes| serde_json::from_slice::<PersistedState>(&bytes).ok())
			.unwrap_or_default();

		let mut ban_cache = LruCache::new(10_000);
		for (ip, rec) in &persisted.bans {
			ban_cache.insert(*ip, rec.ban_until_unix);
		}

		PeerStore {
			path,
			bans: RwLock::new(persisted.bans),
			seen: RwLock::new(persisted.seen),
			ban_cache: RwLock::new(ban_cache),
			offense_log: RwLock::new(Vec::new()),
			enable_ban,
		}
	}

	fn persist(&self) {
		let path = match &self.path {
			Some(p) => p,
			None => return,
		};
		let state = PersistedState { bans: self.bans.read().clone(), seen: self.seen.read().clone() };
		if let Ok(bytes) = serde_json::to_vec_pretty(&state) {
			let _ = fs::write(path, bytes);
		}
	}

	/// Whether `ip` is currently under an active ban.
	pub fn is_banned(&self, ip: IpAddr) -> bool {
		if !self.enable_ban {
			return false;
		}
		let now = now_unix();
		if let Some(until) = self.ban_cache.write().get_mut(&ip) {
			return *until > now;
		}
		false
	}

	/// Records an offense; if it carries a positive ban duration, inserts
	/// (or extends) a ban for `ip` both in the synchronous cache and in
	/// persisted storage.
	pub fn record_offense(&self, ip: IpAddr, offense: Offense) {
		self.offense_log.write().push(OffenseRecord {
			ip,
			offense: offense.to_string(),
			at_unix: now_unix(),
		});

		let bantime = offense.bantime();
		if bantime == Duration::from_secs(0) || !self.enable_ban {
			return;
		}
		let until = now_unix() + bantime.as_secs();
		self.bans.write().insert(ip, BanRecord { ban_until_unix: until });
		self.ban_cache.write().insert(ip, until);
		self.persist();
	}

	/// Clears a ban, e.g. via the external `unban` API call.
	pub fn unban(&self, ip: IpAddr) {
		self.bans.write().remove(&ip);
		self.ban_cache.write().remove(&ip);
		self.persist();
	}

	/// All currently-active bans, for the external `get_banned` API call.
	pub fn banned(&self) -> Vec<(IpAddr, u64)> {
		let now = now_unix();
		self.bans.read().iter().filter(|(_, r)| r.ban_until_unix > now).map(|(ip, r)| (*ip, r.ban_until_unix)).collect()
	}

	/// Records a successful handshake with `addr`, for seeding the
	/// connection schedule's verified bucket across restarts.
	pub fn record_seen(&self, addr: std::net::SocketAddr) {
		self.seen.write().insert(addr, SeenPeer { last_seen_unix: now_unix() });
		self.persist();
	}

	/// Up to `limit` most-recently-seen addresses, newest first.
	pub fn recent_peers(&self, limit: usize) -> Vec<(std::net::SocketAddr, u64)> {
		let seen = self.seen.read();
		let mut all: Vec<_> = seen.iter().map(|(a, s)| (*a, s.last_seen_unix)).collect();
		all.sort_by(|a, b| b.1.cmp(&a.1));
		all.truncate(limit);
		all
	}

	/// The offense log, newest last, for diagnostics.
	pub fn offense_log(&self) -> Vec<OffenseRecord> {
		self.offense_log.read().clone()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn ban_then_unban_round_trips() {
		let store = PeerStore::open(None, true);
		let ip: IpAddr = "127.0.0.1".parse().unwrap();
		assert!(!store.is_banned(ip));
		store.record_offense(ip, Offense::Pow);
		assert!(store.is_banned(ip));
		store.unban(ip);
		assert!(!store.is_banned(ip));
	}

	#[test]
	fn non_bannable_offense_does_not_ban() {
		let store = PeerStore::open(None, true);
		let ip: IpAddr = "127.0.0.2".parse().unwrap();
		store.record_offense(ip, Offense::Checksum);
		assert!(!store.is_banned(ip));
		assert_eq!(store.offense_log().len(), 1);
	}

	#[test]
	fn disabled_ban_config_never_bans() {
		let store = PeerStore::open(None, false);
		let ip: IpAddr = "127.0.0.3".parse().unwrap();
		store.record_offense(ip, Offense::Pow);
		assert!(!store.is_banned(ip));
	}
}
