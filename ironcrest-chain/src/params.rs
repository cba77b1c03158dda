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

//! Network-dependent consensus constants. The `TargetV1`→`TargetV2`
//! activation height and the proof-of-work version switch height are
//! both network-dependent (testnet vs mainnet), modeled as fields on a
//! `ConsensusParams` struct rather than hardcoded, keeping them
//! inspectable and testable.

use ironcrest_core::genesis::Network;
use ironcrest_core::height::Height;
use ironcrest_core::pow::PowVersion;
use ironcrest_core::target::{Target, TargetV1, TargetV2, TARGET_V2_ACTIVATION_HEIGHT};

/// Consensus constants that differ between mainnet and testnet. Grouped
/// into a struct (rather than global constants) so tests can exercise
/// both regimes side by side.
#[derive(Clone, Copy, Debug)]
pub struct ConsensusParams {
	/// Which network these parameters describe.
	pub network: Network,
	/// Height at which headers switch from `TargetV1` to `TargetV2` encoding.
	pub target_v2_activation_height: Height,
	/// Height at which the proof-of-work hash switches version.
	pub pow_activation_height: Height,
	/// Floor below which `TargetV2::scale` never rescales past, post
	/// activation (the per-network minimum target `TargetV2::scale`
	/// takes as a parameter).
	pub min_target_v2: TargetV2,
}

impl ConsensusParams {
	/// Mainnet parameters.
	pub fn mainnet() -> ConsensusParams {
		ConsensusParams {
			network: Network::Main,
			target_v2_activation_height: TARGET_V2_ACTIVATION_HEIGHT,
			pow_activation_height: 0,
			min_target_v2: TargetV2::from_raw(0x0014_3FFF),
		}
	}

	/// Testnet parameters: same shape, held separately so a future
	/// divergence (earlier activation, easier floor) doesn't require
	/// touching call sites, since the exact activation constant is
	/// network-dependent.
	pub fn testnet() -> ConsensusParams {
		ConsensusParams {
			network: Network::Test,
			target_v2_activation_height: TARGET_V2_ACTIVATION_HEIGHT,
			pow_activation_height: 0,
			min_target_v2: TargetV2::from_raw(0x000A_3FFF),
		}
	}

	/// Resolves the parameter set for `network`.
	pub fn for_network(network: Network) -> ConsensusParams {
		match network {
			Network::Main => ConsensusParams::mainnet(),
			Network::Test => ConsensusParams::testnet(),
		}
	}

	/// Which target encoding governs a header at `height`.
	pub fn target_at(&self, raw: u32, height: Height) -> Target {
		if height < self.target_v2_activation_height {
			Target::V1(TargetV1::from_raw(raw))
		} else {
			Target::V2(TargetV2::from_raw(raw))
		}
	}

	/// Which proof-of-work hash version governs a header at `height`.
	pub fn pow_version_at(&self, height: Height) -> PowVersion {
		if height < self.pow_activation_height {
			PowVersion::V1
		} else {
			PowVersion::V2
		}
	}
}

/// Flat block subsidy. The filtered source excerpt did not carry a
/// halving schedule for the reward curve (recovered constants stopped at
/// the difficulty/worksum layer); a flat reward is recorded as an Open
/// Question decision in DESIGN.md rather than inventing a halving
/// schedule with no grounding.
pub const BLOCK_REWARD: u64 = 50 * 1_000_000; // 50 coins, 6 decimals

/// The subsidy paid to the miner of `height`.
pub fn block_reward(_height: Height) -> u64 {
	BLOCK_REWARD
}
