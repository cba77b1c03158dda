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

//! Recoverable signatures (`Signature`: 65 bytes, recoverable).
//!
//! Actual ECDSA recovery is delegated to an external collaborator trait
//! ([`Verifier`]) rather than vendored here; this crate only carries the
//! fixed-width wire type and the wiring to call out to that collaborator.

use std::fmt;

use ironcrest_util::to_hex;

use crate::address::Address;
use crate::hash::Hash;
use crate::ser::{self, BinReader, BinWriter, Readable, Writeable};

/// A 65-byte recoverable ECDSA signature (32-byte r, 32-byte s, 1-byte
/// recovery id).
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Signature(pub [u8; 65]);

impl Signature {
	/// Builds a `Signature` from a byte slice, failing if its length isn't 65.
	pub fn from_slice(bytes: &[u8]) -> Option<Signature> {
		if bytes.len() != 65 {
			return None;
		}
		let mut buf = [0u8; 65];
		buf.copy_from_slice(bytes);
		Some(Signature(buf))
	}
}

impl fmt::Debug for Signature {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", to_hex(&self.0[..8]))
	}
}

impl Writeable for Signature {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl Readable for Signature {
	fn read(reader: &mut BinReader) -> Result<Signature, ser::Error> {
		let bytes = reader.read_fixed_bytes(65)?;
		Ok(Signature::from_slice(&bytes).expect("read_fixed_bytes(65) returns 65 bytes"))
	}
}

/// External collaborator for the cryptographic primitives this crate
/// deliberately does not vendor: public-key recovery from a signature plus
/// message hash, and the external proof-of-work hash. These are treated
/// as pluggable primitives supplied by the embedder rather than built in.
pub trait Verifier: Send + Sync {
	/// Recovers the signing address from `signature` over `message`, or
	/// `None` if the signature is malformed or doesn't recover.
	fn recover(&self, message: &Hash, signature: &Signature) -> Option<Address>;
}
