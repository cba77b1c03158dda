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

//! Proof-of-work hash dispatch.
//!
//! The actual PoW hash function is an external, versioned cryptographic
//! primitive, treated as a pluggable primitive supplied by the embedder.
//! This module only carries the seam: a trait the embedder implements, and
//! the height-based version dispatch recovered from the activation-height
//! pattern already used for [`crate::target::Target`].

use crate::hash::Hash;
use crate::header::Header;
use crate::height::Height;

/// Proof-of-work hash algorithm version in effect at a given height.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PowVersion {
	/// First-generation algorithm.
	V1,
	/// Second-generation algorithm, activated at [`POW_V2_ACTIVATION_HEIGHT`].
	V2,
}

/// Height at which the proof-of-work hash algorithm switches from
/// [`PowVersion::V1`] to [`PowVersion::V2`]. Placeholder pending the exact
/// activation height (see DESIGN.md Open Questions).
pub const POW_V2_ACTIVATION_HEIGHT: Height = 0;

/// Resolves which algorithm version governs a header at `height`.
pub fn version_at(height: Height) -> PowVersion {
	if height < POW_V2_ACTIVATION_HEIGHT {
		PowVersion::V1
	} else {
		PowVersion::V2
	}
}

/// External collaborator computing the proof-of-work hash of a header.
/// Implementations wrap whatever native/FFI primitive the embedder links
/// in; this crate never computes the hash itself.
pub trait PowHasher: Send + Sync {
	/// Computes the proof-of-work hash of `header` using the algorithm
	/// version appropriate for `height`.
	fn pow_hash(&self, header: &Header, version: PowVersion) -> Hash;
}

/// Verifies that `header`'s proof-of-work hash satisfies its own target,
/// delegating the hash computation to `hasher`.
pub fn verify(hasher: &dyn PowHasher, header: &Header, height: Height) -> bool {
	let version = version_at(height);
	let pow_hash = hasher.pow_hash(header, version);
	header.target(height).compatible(pow_hash.as_bytes())
}

#[cfg(test)]
mod test {
	use super::*;

	struct IdentityHasher;
	impl PowHasher for IdentityHasher {
		fn pow_hash(&self, header: &Header, _version: PowVersion) -> Hash {
			use crate::hash::Hashed;
			header.hash()
		}
	}

	#[test]
	fn verify_rejects_header_failing_its_own_target() {
		let header = Header {
			version: 1,
			prev_hash: crate::hash::ZERO_HASH,
			merkle_root: crate::hash::ZERO_HASH,
			timestamp: 0,
			target_raw: crate::target::TargetV1::from_raw(crate::target::HARDEST_TARGET_V1).raw(),
			nonce: 0,
		};
		assert!(!verify(&IdentityHasher, &header, 0));
	}
}
