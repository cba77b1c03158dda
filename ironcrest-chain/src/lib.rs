// Copyright 2018 The Grin Developers
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

//! The consensus engine: canonical chain, stage chain, replay cache and
//! mempool wired together behind a single-threaded mutation API. Owns the
//! only handle to `ironcrest_store`; every other actor reaches chain state
//! through the events this crate emits.

#[macro_use]
extern crate failure_derive;

pub mod engine;
pub mod error;
pub mod params;
pub mod replay;
pub mod stage;
pub mod types;

pub use crate::engine::ChainEngine;
pub use crate::error::{ChainError, Error, ErrorKind};
pub use crate::params::{block_reward, ConsensusParams, BLOCK_REWARD};
pub use crate::replay::ReplayCache;
pub use crate::stage::StageChain;
pub use crate::types::{
	ChainDescriptor, ChainEvent, ChainState, Descriptor, Grid, HistoryEntry, MiningTemplate, SignedSnapshot,
	StateUpdate, BATCH_SIZE,
};
