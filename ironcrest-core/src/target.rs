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

//! Proof-of-work difficulty targets and accumulated chain work.
//!
//! Two target encodings coexist across the chain's history, recovered
//! bit-for-bit from
//! `original_source/src/shared/src/block/header/difficulty.hpp` and
//! `original_source/src/node/block/header/difficulty_scale.hpp`):
//!
//! - [`TargetV1`]: a leading zero-bit count (1 byte) followed by a 24-bit
//!   mantissa whose top bit is always 1.
//! - [`TargetV2`]: a 10-bit zero-bit count followed by a 22-bit mantissa
//!   whose top bit is always 1, packed into the same 4 bytes.
//!
//! Both pack into 4 bytes and both are compared against a candidate block
//! hash the same way: the hash must have at least `zeros` leading zero
//! bits, and the remaining bits must not exceed the mantissa.
//!
//! [`Worksum`] is the accumulated-work counter used to pick the canonical
//! chain: the "heaviest" chain (not necessarily the longest) wins.

use std::cmp::Ordering;
use std::fmt;

use crate::height::Height;
use crate::ser::{self, BinReader, BinWriter, Readable, Writeable};

/// Hardest (smallest) TargetV1: all 232 leading zero bits, minimal mantissa.
pub const HARDEST_TARGET_V1: u32 = 0xe880_0000;

/// Height (network-specific constant, recovered from
/// `JANUSV2RETARGETSTART`/`GENESISDIFFICULTYEXPONENT` in
/// `difficulty_scale.hpp`) at which mining switches from [`TargetV1`] to
/// [`TargetV2`] encoding. Exact mainnet activation height is an Open
/// Question (see DESIGN.md); this is the conservative placeholder.
pub const TARGET_V2_ACTIVATION_HEIGHT: Height = 0;

/// Genesis difficulty exponent (leading zero-bit count of the easiest
/// allowed target at height 0).
pub const GENESIS_DIFFICULTY_EXPONENT: u8 = 20;

fn hash_be_u32(hash: &[u8; 32], start: usize) -> u32 {
	u32::from_be_bytes([hash[start], hash[start + 1], hash[start + 2], hash[start + 3]])
}

/// Checks that the `zerobytes` leading bytes of `hash` (big-endian, i.e.
/// `hash[31]` down to `hash[31 - zerobytes + 1]`) are all zero.
fn leading_bytes_zero(hash: &[u8; 32], zerobytes: usize) -> bool {
	(0..zerobytes).all(|i| hash[31 - i] == 0)
}

/// The original 32-bit target encoding: 1 byte of leading-zero-bit count
/// (`zeros8`), then a 24-bit mantissa (`bits24`) whose top bit is always 1.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TargetV1(u32);

impl TargetV1 {
	/// Wraps a raw 4-byte big-endian encoding as read from the wire.
	pub fn from_raw(data: u32) -> TargetV1 {
		TargetV1(data)
	}

	/// The raw 4-byte encoding.
	pub fn raw(self) -> u32 {
		self.0
	}

	/// Number of required leading zero bits.
	pub fn zeros8(self) -> u8 {
		(self.0 >> 24) as u8
	}

	/// The 24-bit mantissa, top bit always set.
	pub fn bits24(self) -> u32 {
		self.0 & 0x00FF_FFFF
	}

	/// Builds the genesis target for this network.
	pub fn genesis() -> TargetV1 {
		TargetV1((u32::from(GENESIS_DIFFICULTY_EXPONENT) << 24) | 0x00FF_FFFF)
	}

	/// Whether `hash` satisfies this target (PoW validity).
	pub fn compatible(self, hash: &[u8; 32]) -> bool {
		let zeros = self.zeros8();
		if zeros > (256 - 4 * 8) {
			return false;
		}
		if self.bits24() & 0x0080_0000 == 0 {
			return false; // top mantissa bit must be 1
		}
		let zerobytes = (zeros / 8) as usize;
		let shift = zeros & 0x07;
		if !leading_bytes_zero(hash, zerobytes) {
			return false;
		}

		let threshold = self.bits24() << (8 - shift);
		// 4 bytes of `hash` starting right after the zero bytes, read big-endian.
		let candidate = hash_be_u32(hash, 28 - zerobytes);
		if candidate > threshold {
			return false;
		}
		if candidate < threshold {
			return true;
		}
		// Exact equality on the compared window: the remaining low-order
		// bytes of `hash` (below the compared window) must also be zero.
		(0..(28 - zerobytes)).all(|i| hash[i] == 0)
	}

	/// Rescales the target so that blocks found in `actual` seconds trend
	/// toward `target` seconds, capped at a factor of 2 per adjustment
	/// (mirrors bitcoin's 4x cap, halved here).
	pub fn scale(self, easier_factor: u32, harder_factor: u32) -> TargetV1 {
		let easier_factor = easier_factor.min(0x7FFF_FFFF).max(1);
		let harder_factor = harder_factor.min(0x7FFF_FFFF).max(1);
		let mut zeros = i32::from(self.zeros8());
		let mut bits64 = u64::from(self.bits24());

		if harder_factor >= 2 * easier_factor {
			zeros += 1;
		} else if easier_factor >= 2 * harder_factor {
			zeros -= 1;
		} else {
			let mut easier_factor = easier_factor;
			if harder_factor > easier_factor {
				easier_factor <<= 1;
				zeros += 1;
			}
			bits64 = (bits64 * u64::from(easier_factor)) / u64::from(harder_factor);
			if bits64 > 0x00FF_FFFF {
				bits64 >>= 1;
				zeros -= 1;
			}
		}

		if zeros < i32::from(GENESIS_DIFFICULTY_EXPONENT) {
			return TargetV1::genesis();
		}
		if zeros >= 255 {
			return TargetV1(HARDEST_TARGET_V1);
		}
		TargetV1(((zeros as u32) << 24) | (bits64 as u32 & 0x00FF_FFFF))
	}

	/// The difficulty this target represents, as used for display/RPC
	/// (`get_mining` difficulty field), not for consensus.
	pub fn difficulty(self) -> f64 {
		let zeros = f64::from(self.zeros8());
		let dbits = f64::from(self.bits24());
		(1.0 / dbits) * 2f64.powi(zeros as i32 + 24)
	}
}

impl Writeable for TargetV1 {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u32(self.0)
	}
}

impl Readable for TargetV1 {
	fn read(reader: &mut BinReader) -> Result<TargetV1, ser::Error> {
		Ok(TargetV1(reader.read_u32()?))
	}
}

/// The successor target encoding: a 10-bit leading-zero-bit count
/// followed by a 22-bit mantissa (top bit always 1), both packed into
/// the same 4 bytes as [`TargetV1`] but with finer-grained difficulty
/// steps.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TargetV2(u32);

impl TargetV2 {
	/// Wraps a raw 4-byte big-endian encoding as read from the wire.
	pub fn from_raw(data: u32) -> TargetV2 {
		TargetV2(data)
	}

	/// The raw 4-byte encoding.
	pub fn raw(self) -> u32 {
		self.0
	}

	/// Number of required leading zero bits (10-bit field).
	pub fn zeros10(self) -> u32 {
		self.0 >> 22
	}

	/// The 22-bit mantissa, top bit always set.
	pub fn bits22(self) -> u32 {
		self.0 & 0x003F_FFFF
	}

	fn set(zeros: u32, bits22: u64) -> TargetV2 {
		TargetV2((zeros << 22) | (bits22 as u32 & 0x003F_FFFF))
	}

	/// Whether `hash` satisfies this target.
	pub fn compatible(self, hash: &[u8; 32]) -> bool {
		let zeros = self.zeros10();
		if zeros > 256 - 22 {
			return false;
		}
		if self.bits22() & 0x0020_0000 == 0 {
			return false;
		}
		let zerobytes = (zeros / 8) as usize;
		let shift = zeros & 0x07;
		if zerobytes >= 32 || !leading_bytes_zero(hash, zerobytes) {
			return false;
		}

		// Compare a 30-bit window (22-bit mantissa aligned to `shift`)
		// against the hash bytes immediately following the zero run.
		let threshold = (self.bits22() as u64) << (8 - shift);
		let window_start = 28usize.saturating_sub(zerobytes);
		let candidate = u64::from(hash_be_u32(hash, window_start));
		if candidate > threshold {
			return false;
		}
		if candidate < threshold {
			return true;
		}
		(0..window_start).all(|i| hash[i] == 0)
	}

	/// Rescales analogously to [`TargetV1::scale`], honoring the
	/// per-network minimum target chosen at `height` (the retarget
	/// algorithm's floor, recovered from `TargetV2::scale` in
	/// `difficulty_scale.hpp`).
	pub fn scale(self, easier_factor: u32, harder_factor: u32, min_target: TargetV2) -> TargetV2 {
		let easier_factor = easier_factor.min(0x7FFF_FFFF).max(1);
		let harder_factor = harder_factor.min(0x7FFF_FFFF).max(1);
		let mut zeros = i64::from(self.zeros10());
		let mut bits64 = u64::from(self.bits22());

		if harder_factor >= 2 * easier_factor {
			zeros += 1;
		} else if easier_factor >= 2 * harder_factor {
			zeros -= 1;
		} else {
			let mut easier_factor = easier_factor;
			if harder_factor > easier_factor {
				easier_factor <<= 1;
				zeros += 1;
			}
			bits64 = (bits64 * u64::from(easier_factor)) / u64::from(harder_factor);
			if bits64 > 0x003F_FFFF {
				bits64 >>= 1;
				zeros -= 1;
			}
		}

		if zeros < i64::from(min_target.zeros10()) {
			return min_target;
		}
		if zeros >= 256 * 3 {
			return TargetV2::from_raw(u32::MAX);
		}
		TargetV2::set(zeros as u32, bits64)
	}

	/// The difficulty this target represents.
	pub fn difficulty(self) -> f64 {
		let zeros = f64::from(self.zeros10());
		let dbits = f64::from(self.bits22());
		(1.0 / dbits) * 2f64.powi(zeros as i32 + 22)
	}
}

impl Writeable for TargetV2 {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u32(self.0)
	}
}

impl Readable for TargetV2 {
	fn read(reader: &mut BinReader) -> Result<TargetV2, ser::Error> {
		Ok(TargetV2(reader.read_u32()?))
	}
}

/// A header's 4-byte difficulty field, whose interpretation depends on the
/// header's height relative to [`TARGET_V2_ACTIVATION_HEIGHT`].
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Target {
	/// Pre-activation encoding.
	V1(TargetV1),
	/// Post-activation encoding.
	V2(TargetV2),
}

impl Target {
	/// Interprets a raw 4-byte field at `height` using the activation rule.
	pub fn from_raw(data: u32, height: Height) -> Target {
		if height < TARGET_V2_ACTIVATION_HEIGHT {
			Target::V1(TargetV1::from_raw(data))
		} else {
			Target::V2(TargetV2::from_raw(data))
		}
	}

	/// The raw 4-byte encoding, irrespective of which version it is.
	pub fn raw(self) -> u32 {
		match self {
			Target::V1(t) => t.raw(),
			Target::V2(t) => t.raw(),
		}
	}

	/// Whether `hash` satisfies this target.
	pub fn compatible(self, hash: &[u8; 32]) -> bool {
		match self {
			Target::V1(t) => t.compatible(hash),
			Target::V2(t) => t.compatible(hash),
		}
	}

	/// The difficulty this target represents.
	pub fn difficulty(self) -> f64 {
		match self {
			Target::V1(t) => t.difficulty(),
			Target::V2(t) => t.difficulty(),
		}
	}
}

impl Writeable for Target {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u32(self.raw())
	}
}

/// 256-bit accumulated work counter, stored as 8 little-endian u32 limbs
/// (`fragments[0]` least significant). Ordering is reverse-lexicographic
/// over the limbs (compare from the most significant limb down), matching
/// `Worksum::operator<` in
/// `original_source/src/shared/src/block/chain/worksum.cpp`.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Worksum {
	fragments: [u32; 8],
}

impl Worksum {
	/// The zero worksum (no accumulated work).
	pub fn zero() -> Worksum {
		Worksum { fragments: [0; 8] }
	}

	/// The maximal representable worksum.
	pub fn max() -> Worksum {
		Worksum { fragments: [u32::MAX; 8] }
	}

	/// Reconstructs a worksum from its 32-byte big-endian wire encoding.
	pub fn from_bytes(data: &[u8; 32]) -> Worksum {
		let mut fragments = [0u32; 8];
		for (i, f) in fragments.iter_mut().enumerate() {
			*f = u32::from_be_bytes([data[i * 4], data[i * 4 + 1], data[i * 4 + 2], data[i * 4 + 3]]);
		}
		Worksum { fragments }
	}

	/// The 32-byte big-endian wire encoding.
	pub fn to_bytes(self) -> [u8; 32] {
		let mut out = [0u8; 32];
		for (i, f) in self.fragments.iter().enumerate() {
			out[i * 4..i * 4 + 4].copy_from_slice(&f.to_be_bytes());
		}
		out
	}

	/// The per-block work contribution of a [`TargetV1`]: the reciprocal
	/// of the target's probability of being met, placed at the bit
	/// position implied by its leading-zero count. Mirrors
	/// `Worksum::Worksum(const TargetV1&)`.
	pub fn from_target_v1(t: TargetV1) -> Worksum {
		let mut fragments = [0u32; 8];
		let mut zeros = u32::from(t.zeros8());
		let invbits = (1u64 << (24 + 31)) / u64::from(t.bits24());
		if invbits == 1u64 << 32 {
			zeros += 1;
			let fragment_index = (zeros / 32) as usize;
			let shift = zeros & 0x1F;
			fragments[fragment_index] = 1 << shift;
		} else {
			let fragment_index = (zeros / 32) as usize;
			let shift = zeros & 0x1F;
			fragments[fragment_index] = (invbits >> (31 - shift)) as u32;
			if fragment_index > 0 {
				fragments[fragment_index - 1] = (invbits << (1 + shift)) as u32;
			}
		}
		Worksum { fragments }
	}

	/// Same as [`Worksum::from_target_v1`] but for [`TargetV2`]'s 10-bit
	/// zero count and 22-bit mantissa.
	pub fn from_target_v2(t: TargetV2) -> Worksum {
		let mut fragments = [0u32; 8];
		let mut zeros = t.zeros10();
		let invbits = (1u64 << (22 + 31)) / u64::from(t.bits22());
		if invbits == 1u64 << 32 {
			zeros += 1;
			let fragment_index = (zeros / 32) as usize;
			let shift = zeros & 0x1F;
			fragments[fragment_index] = 1 << shift;
		} else {
			let fragment_index = (zeros / 32) as usize;
			let shift = zeros & 0x1F;
			fragments[fragment_index] = (invbits >> (31 - shift)) as u32;
			if fragment_index > 0 {
				fragments[fragment_index - 1] = (invbits << (1 + shift)) as u32;
			}
		}
		Worksum { fragments }
	}

	/// The per-block work contribution of `target`, dispatching on its
	/// encoding version.
	pub fn from_target(target: Target) -> Worksum {
		match target {
			Target::V1(t) => Worksum::from_target_v1(t),
			Target::V2(t) => Worksum::from_target_v2(t),
		}
	}

	/// Approximates the worksum as an `f64`, used only for display/RPC.
	pub fn as_f64(self) -> f64 {
		let mut factor = 1.0f64;
		let mut sum = f64::from(self.fragments[0]);
		for &f in &self.fragments[1..] {
			factor *= 4_294_967_296.0;
			sum += factor * f64::from(f);
		}
		sum
	}
}

impl fmt::Display for Worksum {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x")?;
		for frag in self.fragments.iter().rev() {
			write!(f, "{:08x}", frag)?;
		}
		Ok(())
	}
}

impl Ord for Worksum {
	fn cmp(&self, other: &Worksum) -> Ordering {
		for j in (0..self.fragments.len()).rev() {
			if self.fragments[j] != other.fragments[j] {
				return self.fragments[j].cmp(&other.fragments[j]);
			}
		}
		Ordering::Equal
	}
}

impl PartialOrd for Worksum {
	fn partial_cmp(&self, other: &Worksum) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl std::ops::Add for Worksum {
	type Output = Worksum;
	fn add(mut self, rhs: Worksum) -> Worksum {
		let mut carry: u64 = 0;
		for i in 0..self.fragments.len() {
			let n = carry + u64::from(self.fragments[i]) + u64::from(rhs.fragments[i]);
			self.fragments[i] = n as u32;
			carry = n >> 32;
		}
		self
	}
}

impl std::ops::Sub for Worksum {
	type Output = Worksum;
	fn sub(mut self, rhs: Worksum) -> Worksum {
		let mut borrow: u64 = 0;
		for i in 0..self.fragments.len() {
			borrow += u64::from(rhs.fragments[i]);
			if u64::from(self.fragments[i]) >= borrow {
				self.fragments[i] = (u64::from(self.fragments[i]) - borrow) as u32;
				borrow = 0;
			} else {
				self.fragments[i] = (u64::from(self.fragments[i]).wrapping_sub(borrow)) as u32;
				borrow = 1;
			}
		}
		self
	}
}

impl std::ops::Mul<u32> for Worksum {
	type Output = Worksum;
	fn mul(mut self, factor: u32) -> Worksum {
		let mut carry: u64 = 0;
		for f in self.fragments.iter_mut() {
			let n = carry + u64::from(*f) * u64::from(factor);
			*f = n as u32;
			carry = n >> 32;
		}
		self
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn genesis_target_is_compatible_with_zero_hash() {
		let t = TargetV1::genesis();
		assert!(t.compatible(&[0u8; 32]));
	}

	#[test]
	fn worksum_ordering_is_reverse_lexicographic() {
		let mut a = Worksum::zero();
		let mut b = Worksum::zero();
		a.fragments[7] = 1;
		b.fragments[0] = u32::MAX;
		assert!(a > b);
	}

	#[test]
	fn worksum_add_sub_roundtrip() {
		let a = Worksum::from_target_v1(TargetV1::genesis());
		let b = Worksum::from_target_v1(TargetV1::genesis());
		let sum = a + b;
		assert_eq!(sum - b, a);
	}

	#[test]
	fn harder_target_yields_larger_worksum() {
		let easy = TargetV1::genesis();
		let hard = easy.scale(1, 2);
		assert!(Worksum::from_target_v1(hard) > Worksum::from_target_v1(easy));
	}

	#[test]
	fn target_v1_scale_caps_difficulty_change_to_factor_of_two() {
		let t = TargetV1::genesis();
		let harder = t.scale(1, 1000);
		assert_eq!(harder.zeros8(), t.zeros8() + 1);
	}

	#[test]
	fn target_v1_scale_moves_by_at_most_one_bit_near_the_two_times_boundary() {
		let t = TargetV1::genesis();
		let scaled = t.scale(100, 199);
		assert_eq!(scaled.zeros8(), t.zeros8());
		assert!(scaled.bits24() <= 0x00FF_FFFF);
		assert!(scaled.difficulty() > t.difficulty());
	}

	// zeros10 = 0, bits22 = 0x20_0000 (top mantissa bit set, easiest possible
	// V2 target): the all-zero hash trivially satisfies it.
	#[test]
	fn target_v2_compatible_with_zero_hash_at_minimum_difficulty() {
		let t = TargetV2::from_raw(0x0020_0000);
		assert!(t.compatible(&[0u8; 32]));
	}

	// zeros10 = 8 (one required leading zero byte), bits22 = 0x3F_FFFF (max
	// mantissa): pins the zerobytes = zeros10 / 8 byte-alignment and the
	// top-mantissa-bit requirement at once.
	#[test]
	fn target_v2_compatible_golden_vector() {
		let t = TargetV2::from_raw(0x023F_FFFF);
		assert_eq!(t.zeros10(), 8);
		assert_eq!(t.bits22(), 0x003F_FFFF);
		assert!(t.compatible(&[0u8; 32]));

		let mut violating = [0u8; 32];
		violating[31] = 1;
		assert!(!t.compatible(&violating));
	}

	#[test]
	fn target_v2_scale_caps_difficulty_change_to_factor_of_two() {
		let min = TargetV2::from_raw(0x0020_0000);
		let t = TargetV2::from_raw(0x0020_0000);
		let harder = t.scale(1, 1000, min);
		assert_eq!(harder.zeros10(), t.zeros10() + 1);
	}

	#[test]
	fn target_v2_scale_moves_by_at_most_one_bit_near_the_two_times_boundary() {
		let min = TargetV2::from_raw(0x0020_0000);
		let t = TargetV2::from_raw(0x0020_0000);
		let scaled = t.scale(100, 199, min);
		assert_eq!(scaled.zeros10(), t.zeros10());
		assert!(scaled.bits22() <= 0x003F_FFFF);
		assert!(scaled.difficulty() > t.difficulty());
	}

	#[test]
	fn target_v2_scale_respects_minimum_target_floor() {
		let min = TargetV2::from_raw(0x0060_0000);
		let t = TargetV2::from_raw(0x0020_0000);
		let scaled = t.scale(1000, 1, min);
		assert_eq!(scaled, min);
	}
}
