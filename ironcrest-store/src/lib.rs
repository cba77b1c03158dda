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

//! Narrow persistence handle for the `ChainEngine` actor. Every other
//! actor reaches the database only through messages answered by
//! `ChainEngine`; nothing outside this crate touches LMDB directly,
//! except `ironcrest-pool`'s in-memory mempool, which persists nothing.

#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate serde_derive;

pub mod chain_store;
pub mod lmdb;
pub mod types;

pub use crate::chain_store::{ChainBatch, ChainStore, UndoLog};
pub use crate::lmdb::Error;
pub use crate::types::{AccountRow, ConsensusRow, HistoryRow};
