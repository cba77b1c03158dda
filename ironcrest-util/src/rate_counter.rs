//! Utility to track the rate of data transfers, and a simple token bucket
//! for rate-limiting chatty peer messages (pings, tx-notify floods).

use std::time::{Duration, Instant};

/// A rate counter tracks the number of transfers, the amount of data
/// exchanged and the rate of transfer over the last minute. The counter
/// does not try to be accurate, instead it only updates lazily; produced
/// rates are worst-case estimates.
pub struct RateCounter {
	last_min_bytes: Vec<u64>,
	last_min_times: Vec<Instant>,
}

impl RateCounter {
	/// Instantiate a new rate counter
	pub fn new() -> RateCounter {
		RateCounter { last_min_bytes: vec![], last_min_times: vec![] }
	}

	/// Increments number of bytes transferred, updating counts and rates.
	pub fn inc(&mut self, bytes: u64) {
		let now = Instant::now();
		self.last_min_times.push(now);
		self.last_min_bytes.push(bytes);
		while let Some(&t) = self.last_min_times.first() {
			if now.duration_since(t) > Duration::from_secs(60) {
				self.last_min_times.remove(0);
				self.last_min_bytes.remove(0);
			} else {
				break;
			}
		}
	}

	/// Number of bytes counted in the last minute
	pub fn bytes_per_min(&self) -> u64 {
		self.last_min_bytes.iter().sum()
	}

	/// Count of increases in the last minute
	pub fn count_per_min(&self) -> u64 {
		self.last_min_bytes.len() as u64
	}
}

impl Default for RateCounter {
	fn default() -> Self {
		Self::new()
	}
}

/// A simple token bucket: refills at `rate` tokens per `per` duration, caps
/// at `burst` tokens. Used to bound Ping frequency and TxNotify floods.
pub struct TokenBucket {
	capacity: f64,
	tokens: f64,
	rate_per_sec: f64,
	last_refill: Instant,
}

impl TokenBucket {
	/// Builds a bucket that allows on average one token every `interval`,
	/// with room for `burst` tokens of slack.
	pub fn new(interval: Duration, burst: f64) -> TokenBucket {
		let rate_per_sec = 1.0 / interval.as_secs_f64();
		TokenBucket { capacity: burst, tokens: burst, rate_per_sec, last_refill: Instant::now() }
	}

	fn refill(&mut self) {
		let now = Instant::now();
		let elapsed = now.duration_since(self.last_refill).as_secs_f64();
		self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);
		self.last_refill = now;
	}

	/// Attempts to take one token. Returns `false` (and leaves the bucket
	/// untouched) if none is available, meaning the caller is over the
	/// rate limit.
	pub fn take(&mut self) -> bool {
		self.refill();
		if self.tokens >= 1.0 {
			self.tokens -= 1.0;
			true
		} else {
			false
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn rate_counter_expires_old_entries() {
		let mut rc = RateCounter::new();
		rc.inc(100);
		assert_eq!(rc.bytes_per_min(), 100);
		assert_eq!(rc.count_per_min(), 1);
	}

	#[test]
	fn token_bucket_limits_burst() {
		let mut tb = TokenBucket::new(Duration::from_secs(8), 1.0);
		assert!(tb.take());
		assert!(!tb.take());
	}
}
