// Copyright 2020 The Grin Developers
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

//! Concrete implementations of the `PowHasher`/`Verifier` collaborators
//! `ironcrest_core` leaves pluggable. Everything else in the workspace
//! only ever sees the traits; this is the one place a real cryptographic
//! primitive gets wired in.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use ironcrest_core::address::Address;
use ironcrest_core::hash::Hash;
use ironcrest_core::header::Header;
use ironcrest_core::pow::{PowHasher, PowVersion};
use ironcrest_core::signature::{Signature, Verifier};
use ironcrest_util::hash::double_sha256;

/// Derives the 20-byte address a public key signs under: the low 20
/// bytes of the double-SHA256 hash of its compressed encoding, matching
/// [`ironcrest_core::hash::Hashed`]'s own choice of digest.
fn address_from_pubkey(pubkey: &PublicKey) -> Address {
	let digest = double_sha256(&pubkey.serialize());
	Address::from_slice(&digest[12..]).expect("double_sha256 output is 32 bytes, tail is 20")
}

/// `secp256k1`-backed recoverable-signature verifier.
pub struct Secp256k1Verifier {
	secp: Secp256k1<secp256k1::VerifyOnly>,
}

impl Secp256k1Verifier {
	pub fn new() -> Secp256k1Verifier {
		Secp256k1Verifier { secp: Secp256k1::verification_only() }
	}
}

impl Default for Secp256k1Verifier {
	fn default() -> Secp256k1Verifier {
		Secp256k1Verifier::new()
	}
}

impl Verifier for Secp256k1Verifier {
	fn recover(&self, message: &Hash, signature: &Signature) -> Option<Address> {
		let msg = Message::from_slice(message.as_bytes()).ok()?;
		let recovery_id = RecoveryId::from_i32(i32::from(signature.0[64])).ok()?;
		let recoverable = RecoverableSignature::from_compact(&signature.0[..64], recovery_id).ok()?;
		let pubkey = self.secp.recover_ecdsa(&msg, &recoverable).ok()?;
		Some(address_from_pubkey(&pubkey))
	}
}

/// Double-SHA256 proof-of-work hash, reusing the same digest
/// [`ironcrest_core::hash::Hashed`] derives block hashes with. Both
/// [`PowVersion`]s hash identically here; see DESIGN.md for why a
/// second, harder primitive was not introduced for `V2`.
pub struct DoubleSha256PowHasher;

impl PowHasher for DoubleSha256PowHasher {
	fn pow_hash(&self, header: &Header, _version: PowVersion) -> Hash {
		let mut buf = Vec::with_capacity(ironcrest_core::header::HEADER_SIZE);
		buf.extend_from_slice(&header.version.to_le_bytes());
		buf.extend_from_slice(header.prev_hash.as_bytes());
		buf.extend_from_slice(header.merkle_root.as_bytes());
		buf.extend_from_slice(&header.timestamp.to_le_bytes());
		buf.extend_from_slice(&header.target_raw.to_le_bytes());
		buf.extend_from_slice(&header.nonce.to_le_bytes());
		Hash(double_sha256(&buf))
	}
}

/// Recovers the address a configured leader private key signs under, for
/// `ChainEngine::open`'s `leader_address` parameter.
pub fn leader_address(secret_hex: &str) -> Result<Address, secp256k1::Error> {
	let bytes = ironcrest_util::from_hex(secret_hex).map_err(|_| secp256k1::Error::InvalidSecretKey)?;
	let secret = SecretKey::from_slice(&bytes)?;
	let secp = Secp256k1::signing_only();
	let public = PublicKey::from_secret_key(&secp, &secret);
	Ok(address_from_pubkey(&public))
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn pow_hasher_is_deterministic() {
		let header = Header {
			version: 1,
			prev_hash: ironcrest_core::hash::ZERO_HASH,
			merkle_root: ironcrest_core::hash::ZERO_HASH,
			timestamp: 0,
			target_raw: 0,
			nonce: 7,
		};
		let hasher = DoubleSha256PowHasher;
		assert_eq!(hasher.pow_hash(&header, PowVersion::V1), hasher.pow_hash(&header, PowVersion::V1));
	}

	#[test]
	fn leader_address_rejects_malformed_hex() {
		assert!(leader_address("not hex").is_err());
	}
}
