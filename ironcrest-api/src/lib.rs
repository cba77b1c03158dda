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

//! Thin async `ChainApi` trait: the seam an external HTTP/WebSocket/
//! Stratum router calls into. Every method here forwards to
//! `ironcrest_chain::ChainEngine`, `ironcrest_p2p::Orchestrator`, or
//! `ironcrest_p2p::PeerStore` over their own actor channels; no HTTP or
//! JSON-RPC framing lives in this crate.

#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate serde_derive;

pub mod error;
pub mod types;

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use ironcrest_core::address::Address;
use ironcrest_core::block::{Block, TransferTx};
use ironcrest_core::hash::Hash;
use ironcrest_core::height::Height;
use ironcrest_p2p::chain_actor::ChainHandle;
use ironcrest_p2p::orchestrator::OrchestratorHandle;
use ironcrest_p2p::peer_store::PeerStore;
use ironcrest_pool::TxSource;

pub use crate::error::{Error, ErrorKind};
use crate::types::{
	AccountRef, BannedView, BlockView, ChainHeadView, HeaderView, HistoryEntryView, MiningTemplateView, PeerView,
	RichlistEntryView, SignedSnapshotView,
};

/// Operations an external router (HTTP/WebSocket/Stratum) may call
/// against a running node. Implemented once, by [`NodeApi`]; the trait
/// exists so tests and alternative front-ends can substitute a mock.
#[async_trait]
pub trait ChainApi: Send + Sync {
	// ---- Chain --------------------------------------------------------
	async fn get_head(&self) -> Result<ChainHeadView, Error>;
	async fn get_header(&self, height: Height) -> Result<HeaderView, Error>;
	async fn get_hash(&self, height: Height) -> Result<String, Error>;
	async fn get_block(&self, height: Height) -> Result<BlockView, Error>;
	async fn get_grid(&self) -> Result<Vec<String>, Error>;
	async fn get_mining(&self, address: Address) -> Result<MiningTemplateView, Error>;
	async fn submit_block(&self, block: Block) -> Result<ChainHeadView, Error>;
	async fn get_signed_snapshot(&self) -> Result<Option<SignedSnapshotView>, Error>;
	async fn get_txcache(&self) -> Result<Vec<String>, Error>;
	async fn get_hashrate(&self, n: Height) -> Result<f64, Error>;

	// ---- Account --------------------------------------------------------
	async fn get_balance(&self, account: AccountRef) -> Result<u64, Error>;
	async fn get_history(&self, account: AccountRef, before_id: Option<u64>) -> Result<Vec<HistoryEntryView>, Error>;
	async fn get_richlist(&self, limit: usize) -> Result<Vec<RichlistEntryView>, Error>;

	// ---- Mempool --------------------------------------------------------
	async fn put_mempool(&self, tx: TransferTx, debug_source: String) -> Result<String, Error>;
	async fn get_mempool(&self, limit: usize) -> Result<Vec<TransferTx>, Error>;
	async fn lookup_tx(&self, hash: Hash) -> Result<TransferTx, Error>;

	// ---- Peers ------------------------------------------------------------
	async fn get_peers(&self) -> Vec<PeerView>;
	async fn get_banned(&self) -> Vec<BannedView>;
	async fn unban(&self, ip: IpAddr);
	async fn disconnect(&self, connection_id: u64) -> bool;

	// ---- Subscriptions ----------------------------------------------------
	/// Returns a channel bumped every time consensus advances or the
	/// mempool changes in a way that affects the block template; the
	/// Stratum server polls this rather than this crate invoking a
	/// caller-supplied callback directly.
	async fn subscribe_mining(&self) -> tokio::sync::watch::Receiver<u64>;
}

/// The concrete [`ChainApi`], wired to a running node's three actors.
pub struct NodeApi {
	chain: ChainHandle,
	orchestrator: OrchestratorHandle,
	peer_store: Arc<PeerStore>,
}

impl NodeApi {
	pub fn new(chain: ChainHandle, orchestrator: OrchestratorHandle, peer_store: Arc<PeerStore>) -> NodeApi {
		NodeApi { chain, orchestrator, peer_store }
	}
}

#[async_trait]
impl ChainApi for NodeApi {
	async fn get_head(&self) -> Result<ChainHeadView, Error> {
		Ok(ChainHeadView::from_descriptor(&self.chain.descriptor().await))
	}

	async fn get_header(&self, height: Height) -> Result<HeaderView, Error> {
		let header = self.chain.get_header(height).await?.ok_or(ErrorKind::NotFound)?;
		Ok(HeaderView::from_header(&header))
	}

	async fn get_hash(&self, height: Height) -> Result<String, Error> {
		let header = self.chain.get_header(height).await?.ok_or(ErrorKind::NotFound)?;
		Ok(ironcrest_util::to_hex(ironcrest_core::hash::Hashed::hash(&header).as_bytes()))
	}

	async fn get_block(&self, height: Height) -> Result<BlockView, Error> {
		let block = self.chain.get_block(height).await?.ok_or(ErrorKind::NotFound)?;
		Ok(BlockView::from_block(&block))
	}

	async fn get_grid(&self) -> Result<Vec<String>, Error> {
		let descriptor = self.chain.descriptor().await;
		Ok(descriptor.grid.batch_heads().iter().map(|h| ironcrest_util::to_hex(h.as_bytes())).collect())
	}

	async fn get_mining(&self, address: Address) -> Result<MiningTemplateView, Error> {
		let template = self.chain.get_mining(address).await?;
		Ok(MiningTemplateView::from_template(&template))
	}

	async fn submit_block(&self, block: Block) -> Result<ChainHeadView, Error> {
		self.chain.append_mined(block).await?;
		Ok(ChainHeadView::from_descriptor(&self.chain.descriptor().await))
	}

	async fn get_signed_snapshot(&self) -> Result<Option<SignedSnapshotView>, Error> {
		Ok(self.chain.signed_snapshot().await.as_ref().map(SignedSnapshotView::from_snapshot))
	}

	async fn get_txcache(&self) -> Result<Vec<String>, Error> {
		let ids = self.chain.get_txcache().await;
		Ok(ids.iter().map(|id| format!("{}:{}:{}", id.account_id.0, id.pin_height, id.nonce_id)).collect())
	}

	async fn get_hashrate(&self, n: Height) -> Result<f64, Error> {
		let head = self.chain.descriptor().await;
		if head.length == 0 || n == 0 {
			return Ok(0.0);
		}
		let window = n.min(head.length);
		let start = self.chain.get_header(head.length.saturating_sub(window) + 1).await?.ok_or(ErrorKind::NotFound)?;
		let end = self.chain.get_header(head.length).await?.ok_or(ErrorKind::NotFound)?;
		let elapsed = end.timestamp.saturating_sub(start.timestamp).max(1) as f64;
		let difficulty = end.target(head.length).difficulty;
		Ok(difficulty * window as f64 / elapsed)
	}

	async fn get_balance(&self, account: AccountRef) -> Result<u64, Error> {
		Ok(self.chain.get_balance(account).await?.unwrap_or(0))
	}

	async fn get_history(&self, account: AccountRef, before_id: Option<u64>) -> Result<Vec<HistoryEntryView>, Error> {
		let entries = self.chain.get_history(account, before_id, 100).await?;
		Ok(entries.iter().map(HistoryEntryView::from_entry).collect())
	}

	async fn get_richlist(&self, limit: usize) -> Result<Vec<RichlistEntryView>, Error> {
		let rows = self.chain.get_richlist(limit).await?;
		Ok(rows.into_iter().map(|(address, balance)| RichlistEntryView { address, balance }).collect())
	}

	async fn put_mempool(&self, tx: TransferTx, debug_source: String) -> Result<String, Error> {
		let hash = self.chain.put_mempool(tx, TxSource::peer(debug_source)).await?;
		Ok(ironcrest_util::to_hex(hash.as_bytes()))
	}

	async fn get_mempool(&self, limit: usize) -> Result<Vec<TransferTx>, Error> {
		Ok(self.chain.get_mempool(limit).await)
	}

	async fn lookup_tx(&self, hash: Hash) -> Result<TransferTx, Error> {
		self.chain.lookup_tx(hash).await.ok_or_else(|| ErrorKind::NotFound.into())
	}

	async fn get_peers(&self) -> Vec<PeerView> {
		self.orchestrator.get_peers().await.iter().map(PeerView::from_summary).collect()
	}

	async fn get_banned(&self) -> Vec<BannedView> {
		self.peer_store.banned().into_iter().map(|(ip, until_unix)| BannedView { ip, until_unix }).collect()
	}

	async fn unban(&self, ip: IpAddr) {
		self.orchestrator.unban(ip).await;
	}

	async fn disconnect(&self, connection_id: u64) -> bool {
		self.orchestrator.disconnect(connection_id).await
	}

	async fn subscribe_mining(&self) -> tokio::sync::watch::Receiver<u64> {
		self.orchestrator.subscribe_mining().await
	}
}
