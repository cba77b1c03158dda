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

//! Glues the different parts of the system together: opens storage,
//! builds the `ChainEngine`, and spawns the `TransportManager` and
//! `Orchestrator` actors on top of it. The result is an [`Env`], the one
//! long-lived struct the RPC/stratum front-ends and the `ironcrest`
//! binary hold onto.
//!
//! `ironcrest_config` is the caller: it loads the TOML file into a
//! [`ServerParams`] and hands it to [`start`]. This crate never reads a
//! config file itself, taking an already-parsed set of parameters rather
//! than touching disk.

#[macro_use]
extern crate failure_derive;

pub mod crypto;

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use tokio::sync::mpsc;

use ironcrest_api::{ChainApi, NodeApi};
use ironcrest_chain::{ChainEngine, ConsensusParams};
use ironcrest_core::address::Address;
use ironcrest_core::genesis::Network;
use ironcrest_core::pow::PowHasher;
use ironcrest_core::signature::Verifier;
use ironcrest_p2p::{spawn_chain_actor, spawn_transport, ConnectionSchedule, Orchestrator, OrchestratorHandle, PeerStore};
use ironcrest_store::ChainStore;

use crate::crypto::{DoubleSha256PowHasher, Secp256k1Verifier};

/// Everything [`start`] needs, one field per configuration key this
/// crate cares about. Parsing the TOML file itself, and whatever keys
/// only matter to the RPC/stratum front-ends, is `ironcrest_config`'s
/// job.
#[derive(Clone, Debug)]
pub struct ServerParams {
	pub chain_db_path: PathBuf,
	pub peers_db_path: Option<PathBuf>,
	pub bind: Option<SocketAddr>,
	pub connect: Vec<SocketAddr>,
	pub enable_ban: bool,
	pub leader_address: Option<Address>,
	pub isolated: bool,
	pub testnet: bool,
}

/// Failures `start` can return; every variant wraps a collaborator's own
/// error rather than losing its detail behind a string.
#[derive(Debug, Fail)]
pub enum Error {
	#[fail(display = "failed to acquire node lock file at {:?}: {}", _0, _1)]
	Lock(PathBuf, std::io::Error),
	#[fail(display = "{}", _0)]
	Chain(ironcrest_chain::Error),
}

impl From<ironcrest_chain::Error> for Error {
	fn from(e: ironcrest_chain::Error) -> Error {
		Error::Chain(e)
	}
}

/// Advisory exclusive lock preventing two node processes from opening
/// the same chain database at once.
fn acquire_lock(dir: &Path) -> Result<std::fs::File, Error> {
	fs::create_dir_all(dir).map_err(|e| Error::Lock(dir.to_owned(), e))?;
	let path = dir.join("LOCK");
	let file = fs::OpenOptions::new()
		.read(true)
		.write(true)
		.create(true)
		.open(&path)
		.map_err(|e| Error::Lock(path.clone(), e))?;
	file.try_lock_exclusive().map_err(|e| Error::Lock(path, e))?;
	Ok(file)
}

/// The running node: every actor handle the API surface or a shutdown
/// routine needs. Dropping the last `Env` does not itself stop the
/// actors; callers join their [`Env::join_handles`] (or rely on process
/// exit) to actually tear down.
pub struct Env {
	pub api: Arc<dyn ChainApi>,
	pub orchestrator: OrchestratorHandle,
	pub peer_store: Arc<PeerStore>,
	/// Advisory lock on the chain database directory, held for the
	/// lifetime of the node.
	_lock: std::fs::File,
	join_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Env {
	/// Background task handles spawned while wiring the node up, kept so
	/// a caller can detect an actor task exiting early.
	pub fn join_handles(&mut self) -> &mut [tokio::task::JoinHandle<()>] {
		&mut self.join_handles
	}
}

/// Opens storage, builds the chain engine, and spawns the transport and
/// orchestrator actors. Must run inside a Tokio runtime: the actor spawn
/// functions call `tokio::spawn` directly rather than taking a handle.
pub fn start(params: ServerParams) -> Result<Env, Error> {
	let lock = acquire_lock(&params.chain_db_path)?;

	let network = if params.testnet { Network::Test } else { Network::Main };
	let pow: Arc<dyn PowHasher> = Arc::new(DoubleSha256PowHasher);
	let verifier: Arc<dyn Verifier> = Arc::new(Secp256k1Verifier::new());

	let store = ChainStore::open(params.chain_db_path.to_string_lossy().as_ref());
	let engine = ChainEngine::open(store, network, pow.clone(), verifier, params.leader_address)?;
	let our_descriptor = engine.descriptor().clone();
	let consensus = ConsensusParams::for_network(network);

	let (updates_tx, updates_rx) = mpsc::channel(256);
	let (chain, chain_join) = spawn_chain_actor(engine, updates_tx);

	let peer_store = Arc::new(PeerStore::open(params.peers_db_path, params.enable_ban));
	let our_listen_port = params.bind.map(|addr| addr.port());
	let (transport, transport_events) = spawn_transport(params.bind, params.testnet, our_listen_port, peer_store.clone());

	let schedule = ConnectionSchedule::new(params.connect);
	let orchestrator = Orchestrator::new(
		chain.clone(),
		transport,
		peer_store.clone(),
		schedule,
		pow,
		consensus,
		our_descriptor,
		params.isolated,
		our_listen_port,
	);
	let (orchestrator, orchestrator_join) =
		ironcrest_p2p::orchestrator::spawn_orchestrator(orchestrator, transport_events, updates_rx);

	let api: Arc<dyn ChainApi> = Arc::new(NodeApi::new(chain, orchestrator.clone(), peer_store.clone()));

	Ok(Env { api, orchestrator, peer_store, _lock: lock, join_handles: vec![chain_join, orchestrator_join] })
}

#[cfg(test)]
mod test {
	use super::*;

	#[tokio::test]
	async fn start_wires_up_an_isolated_node() {
		let dir = tempfile::tempdir().unwrap();
		let params = ServerParams {
			chain_db_path: dir.path().join("chain"),
			peers_db_path: None,
			bind: None,
			connect: vec![],
			enable_ban: true,
			leader_address: None,
			isolated: true,
			testnet: true,
		};
		let env = start(params).expect("wiring an isolated node should succeed");
		let head = env.api.get_head().await.expect("get_head always succeeds on a fresh chain");
		assert_eq!(head.length, 0);
	}
}
