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

//! Blocks and block bodies: a body holds a random seed, an address table,
//! reward transactions, transfer transactions, and optional token actions.
//!
//! There is no UTXO set here: a body is a flat list of account-model
//! transactions plus the address table entries those transactions'
//! signatures resolved to for the first time.

use crate::address::{AccountId, Address};
use crate::hash::{Hash, Hashed};
use crate::height::Height;
use crate::header::Header;
use crate::ser::{self, BinReader, BinWriter, Readable, Writeable};
use crate::signature::Signature;
use crate::txid::TxId;

/// A new account introduced in this block, assigned the next unused
/// [`AccountId`] in table order.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct AddressTableEntry {
	/// The address being registered.
	pub address: Address,
}

impl Writeable for AddressTableEntry {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		self.address.write(writer)
	}
}

impl Readable for AddressTableEntry {
	fn read(reader: &mut BinReader) -> Result<AddressTableEntry, ser::Error> {
		Ok(AddressTableEntry { address: Address::read(reader)? })
	}
}

/// A block reward payout to the miner that produced the block. There is
/// exactly one per block, carried in the body rather than implied, so
/// that the reward amount is explicit consensus data rather than derived.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RewardTx {
	/// Recipient of the reward.
	pub to: AccountId,
	/// Reward amount, in the smallest denomination.
	pub amount: u64,
}

impl Writeable for RewardTx {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		self.to.write(writer)?;
		writer.write_u64(self.amount)
	}
}

impl Readable for RewardTx {
	fn read(reader: &mut BinReader) -> Result<RewardTx, ser::Error> {
		let to = AccountId::read(reader)?;
		let amount = reader.read_u64()?;
		Ok(RewardTx { to, amount })
	}
}

/// A signed balance transfer from one account to another.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TransferTx {
	/// Paying account.
	pub from: AccountId,
	/// Height this transaction pins against (see [`crate::txid`]).
	pub pin_height: Height,
	/// Per-account nonce disambiguating same-height transactions.
	pub nonce_id: u32,
	/// Recipient.
	pub to: AccountId,
	/// Amount transferred, in the smallest denomination.
	pub amount: u64,
	/// Fee paid to the block producer.
	pub fee: u64,
	/// Signature over the transaction's canonical encoding, recoverable
	/// to `from`'s registered address via [`crate::signature::Verifier`].
	pub signature: Signature,
}

impl TransferTx {
	/// The identity used for replay protection and mempool indexing.
	pub fn tx_id(&self) -> TxId {
		TxId { account_id: self.from, pin_height: self.pin_height, nonce_id: self.nonce_id }
	}
}

impl Writeable for TransferTx {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		self.from.write(writer)?;
		writer.write_u32(self.pin_height)?;
		writer.write_u32(self.nonce_id)?;
		self.to.write(writer)?;
		writer.write_u64(self.amount)?;
		writer.write_u64(self.fee)?;
		self.signature.write(writer)
	}
}

impl Readable for TransferTx {
	fn read(reader: &mut BinReader) -> Result<TransferTx, ser::Error> {
		let from = AccountId::read(reader)?;
		let pin_height = reader.read_u32()?;
		let nonce_id = reader.read_u32()?;
		let to = AccountId::read(reader)?;
		let amount = reader.read_u64()?;
		let fee = reader.read_u64()?;
		let signature = Signature::read(reader)?;
		Ok(TransferTx { from, pin_height, nonce_id, to, amount, fee, signature })
	}
}

/// An optional token-layer action (mint/transfer of a secondary asset).
/// Kept as an opaque payload so the chain engine can round-trip it without
/// needing to understand token semantics it doesn't consensus-validate
/// itself.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TokenAction {
	/// Raw action payload, opaque to the chain engine.
	pub payload: Vec<u8>,
}

impl Writeable for TokenAction {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_bytes(&self.payload)
	}
}

impl Readable for TokenAction {
	fn read(reader: &mut BinReader) -> Result<TokenAction, ser::Error> {
		Ok(TokenAction { payload: reader.read_bytes()? })
	}
}

fn write_vec<T: Writeable>(writer: &mut BinWriter, items: &[T]) -> Result<(), ser::Error> {
	writer.write_u32(items.len() as u32)?;
	for item in items {
		item.write(writer)?;
	}
	Ok(())
}

fn read_vec<T: Readable>(reader: &mut BinReader) -> Result<Vec<T>, ser::Error> {
	let len = reader.read_u32()?;
	if len > ser::MAX_READ_LEN {
		return Err(ser::Error::TooLarge(format!("{} items", len)));
	}
	(0..len).map(|_| T::read(reader)).collect()
}

/// A block's body: everything the header's `merkleRoot` commits to.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Body {
	/// Random seed mixed into this block's derived randomness (mining
	/// template selection, tie-breaking).
	pub seed: [u8; 4],
	/// Accounts introduced for the first time by this block.
	pub address_table: Vec<AddressTableEntry>,
	/// Reward transactions (one per block in practice, plural to leave
	/// room for split/delayed rewards without a format change).
	pub reward_txs: Vec<RewardTx>,
	/// Balance transfers.
	pub transfer_txs: Vec<TransferTx>,
	/// Optional token-layer actions.
	pub token_actions: Vec<TokenAction>,
}

impl Body {
	/// Computes the Merkle root committed to by the header. Leaves are,
	/// in order: the seed, each address table entry, each reward tx, each
	/// transfer tx, each token action — each leaf hashed individually and
	/// combined pairwise until a single root remains (duplicating the
	/// last leaf on an odd level, the conventional Merkle-tree padding
	/// rule for fixed-leaf-set commitments).
	pub fn merkle_root(&self) -> Hash {
		let mut leaves: Vec<Hash> = Vec::new();
		leaves.push(Hash(ironcrest_util::hash::double_sha256(&self.seed)));
		for e in &self.address_table {
			leaves.push(e.hash());
		}
		for t in &self.reward_txs {
			leaves.push(t.hash());
		}
		for t in &self.transfer_txs {
			leaves.push(t.hash());
		}
		for a in &self.token_actions {
			leaves.push(a.hash());
		}
		merkle_root_of(leaves)
	}
}

fn merkle_root_of(mut level: Vec<Hash>) -> Hash {
	if level.is_empty() {
		return crate::hash::ZERO_HASH;
	}
	while level.len() > 1 {
		if level.len() % 2 == 1 {
			level.push(*level.last().unwrap());
		}
		level = level
			.chunks(2)
			.map(|pair| {
				let mut buf = Vec::with_capacity(64);
				buf.extend_from_slice(pair[0].as_bytes());
				buf.extend_from_slice(pair[1].as_bytes());
				Hash(ironcrest_util::hash::double_sha256(&buf))
			})
			.collect();
	}
	level[0]
}

impl Writeable for Body {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.seed)?;
		write_vec(writer, &self.address_table)?;
		write_vec(writer, &self.reward_txs)?;
		write_vec(writer, &self.transfer_txs)?;
		write_vec(writer, &self.token_actions)
	}
}

impl Readable for Body {
	fn read(reader: &mut BinReader) -> Result<Body, ser::Error> {
		let seed_vec = reader.read_fixed_bytes(4)?;
		let mut seed = [0u8; 4];
		seed.copy_from_slice(&seed_vec);
		let address_table = read_vec(reader)?;
		let reward_txs = read_vec(reader)?;
		let transfer_txs = read_vec(reader)?;
		let token_actions = read_vec(reader)?;
		Ok(Body { seed, address_table, reward_txs, transfer_txs, token_actions })
	}
}

/// A full block: height, header, and body. Height is carried alongside
/// the header rather than derived, since it is needed before the header
/// can even be linked into a chain (`append_mined`).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Block {
	/// This block's height.
	pub height: Height,
	/// The block header.
	pub header: Header,
	/// The block body.
	pub body: Body,
}

impl Block {
	/// Whether the body's Merkle root matches the header's commitment.
	pub fn merkle_root_matches(&self) -> bool {
		self.body.merkle_root() == self.header.merkle_root
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn empty_body_merkle_root_is_zero_hash() {
		let body = Body {
			seed: [0; 4],
			address_table: vec![],
			reward_txs: vec![],
			transfer_txs: vec![],
			token_actions: vec![],
		};
		// seed leaf is always present, so root is never the zero hash.
		assert_ne!(body.merkle_root(), crate::hash::ZERO_HASH);
	}

	#[test]
	fn body_roundtrips_through_wire_encoding() {
		let body = Body {
			seed: [1, 2, 3, 4],
			address_table: vec![AddressTableEntry { address: Address([9; 20]) }],
			reward_txs: vec![RewardTx { to: AccountId(1), amount: 5_000_000 }],
			transfer_txs: vec![],
			token_actions: vec![],
		};
		let bytes = ser::ser_vec(&body).unwrap();
		let body2: Body = ser::deserialize(&bytes).unwrap();
		assert_eq!(body, body2);
	}
}
