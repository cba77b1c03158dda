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

//! Core chain data model shared by every other crate in the workspace:
//! headers, targets, worksums, blocks, accounts, and the binary wire
//! serialization they're all built on.

#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate serde_derive;

pub mod address;
pub mod block;
pub mod consensus;
pub mod genesis;
pub mod hash;
pub mod header;
pub mod height;
pub mod pow;
pub mod ser;
pub mod signature;
pub mod target;
pub mod txid;

pub use crate::address::{AccountId, AccountRef, Address};
pub use crate::block::{AddressTableEntry, Block, Body, RewardTx, TokenAction, TransferTx};
pub use crate::hash::{Hash, Hashed, ZERO_HASH};
pub use crate::header::{Header, HEADER_SIZE};
pub use crate::height::{Height, NonzeroHeight};
pub use crate::signature::{Signature, Verifier};
pub use crate::target::{Target, TargetV1, TargetV2, Worksum};
pub use crate::txid::TxId;
