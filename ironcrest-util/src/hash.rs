//! Double-SHA256 checksum helper used by the wire framer.
//!
//! VerusHash (the proof-of-work hash) and secp256k1 signature
//! verification are cryptographic primitives the core treats as external
//! collaborators; this module only provides the one hash the core
//! itself needs for frame checksums.

use sha2::{Digest, Sha256};

/// SHA256(SHA256(data)), truncated by the caller where only a prefix is
/// needed (the wire frame checksum uses the first 4 bytes).
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
	let first = Sha256::digest(data);
	let second = Sha256::digest(&first);
	let mut out = [0u8; 32];
	out.copy_from_slice(&second);
	out
}

/// First 4 bytes of SHA256(data), used as the frame checksum.
pub fn frame_checksum(payload: &[u8]) -> [u8; 4] {
	let digest = Sha256::digest(payload);
	let mut out = [0u8; 4];
	out.copy_from_slice(&digest[..4]);
	out
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn checksum_is_deterministic() {
		let a = frame_checksum(b"hello");
		let b = frame_checksum(b"hello");
		assert_eq!(a, b);
		let c = frame_checksum(b"hellp");
		assert_ne!(a, c);
	}
}
