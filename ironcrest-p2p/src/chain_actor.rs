//! Wraps a `ChainEngine` as a single-threaded cooperative actor: every
//! mutation arrives as a [`ChainCommand`] over a bounded channel, is
//! applied to the one `ChainEngine` the task owns, and any resulting
//! `StateUpdate` is forwarded to the orchestrator on a second channel,
//! in the order the engine produced them. The orchestrator never
//! touches `ChainEngine` directly, only through the [`ChainHandle`]
//! passed into it.

use tokio::sync::{mpsc, oneshot};

use ironcrest_chain::{
	ChainDescriptor, ChainError, ChainEngine, ChainState, Error, HistoryEntry, MiningTemplate, SignedSnapshot,
	StateUpdate,
};
use ironcrest_core::address::{Address, AccountRef};
use ironcrest_core::block::{Block, Body, TransferTx};
use ironcrest_core::hash::Hash;
use ironcrest_core::header::Header;
use ironcrest_core::height::Height;
use ironcrest_core::txid::TxId;
use ironcrest_pool::{PoolError, TxSource};

/// Every mutation or query the orchestrator (and, transitively, the API
/// layer) can ask the chain actor to perform.
pub enum ChainCommand {
	AppendMined { block: Block, reply: oneshot::Sender<Result<StateUpdate, ChainError>> },
	StageSet { headerchain: Vec<Header>, reply: oneshot::Sender<Height> },
	StageAdd { bodies: Vec<(Height, Body)>, reply: oneshot::Sender<Result<Option<StateUpdate>, ChainError>> },
	PutMempool { tx: TransferTx, source: TxSource, reply: oneshot::Sender<Result<Hash, PoolError>> },
	SetSignedSnapshot { snapshot: SignedSnapshot, reply: oneshot::Sender<Result<(), Error>> },
	SignedSnapshot { reply: oneshot::Sender<Option<SignedSnapshot>> },
	Descriptor { reply: oneshot::Sender<ChainDescriptor> },
	State { reply: oneshot::Sender<ChainState> },
	GetMining { address: Address, reply: oneshot::Sender<Result<MiningTemplate, Error>> },
	GetBlock { height: Height, reply: oneshot::Sender<Result<Option<Block>, Error>> },
	GetHeader { height: Height, reply: oneshot::Sender<Result<Option<Header>, Error>> },
	HeightOf { hash: Hash, reply: oneshot::Sender<Result<Option<Height>, Error>> },
	GetBalance { account: AccountRef, reply: oneshot::Sender<Result<Option<u64>, Error>> },
	GetHistory {
		account: AccountRef,
		before_id: Option<u64>,
		limit: usize,
		reply: oneshot::Sender<Result<Vec<HistoryEntry>, Error>>,
	},
	GetRichlist { limit: usize, reply: oneshot::Sender<Result<Vec<(Address, u64)>, Error>> },
	GetMempool { limit: usize, reply: oneshot::Sender<Vec<TransferTx>> },
	GetTxcache { reply: oneshot::Sender<Vec<TxId>> },
	LookupTx { hash: Hash, reply: oneshot::Sender<Option<TransferTx>> },
}

/// Cloneable handle to a running chain actor. Every method sends one
/// `ChainCommand` and awaits its reply; if the actor task has already
/// exited (a fatal store error shuts the engine down), the whole node
/// is shutting down and there is nothing sensible to return, so these
/// methods panic rather than invent a placeholder value.
#[derive(Clone)]
pub struct ChainHandle {
	tx: mpsc::Sender<ChainCommand>,
}

const ACTOR_GONE: &str = "chain actor task has exited";

impl ChainHandle {
	async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ChainCommand) -> T {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.tx.send(build(reply_tx)).await.expect(ACTOR_GONE);
		reply_rx.await.expect(ACTOR_GONE)
	}

	pub async fn append_mined(&self, block: Block) -> Result<StateUpdate, ChainError> {
		self.call(|reply| ChainCommand::AppendMined { block, reply }).await
	}

	pub async fn stage_set(&self, headerchain: Vec<Header>) -> Height {
		self.call(|reply| ChainCommand::StageSet { headerchain, reply }).await
	}

	pub async fn stage_add(&self, bodies: Vec<(Height, Body)>) -> Result<Option<StateUpdate>, ChainError> {
		self.call(|reply| ChainCommand::StageAdd { bodies, reply }).await
	}

	pub async fn put_mempool(&self, tx: TransferTx, source: TxSource) -> Result<Hash, PoolError> {
		self.call(|reply| ChainCommand::PutMempool { tx, source, reply }).await
	}

	pub async fn set_signed_snapshot(&self, snapshot: SignedSnapshot) -> Result<(), Error> {
		self.call(|reply| ChainCommand::SetSignedSnapshot { snapshot, reply }).await
	}

	pub async fn signed_snapshot(&self) -> Option<SignedSnapshot> {
		self.call(|reply| ChainCommand::SignedSnapshot { reply }).await
	}

	pub async fn descriptor(&self) -> ChainDescriptor {
		self.call(|reply| ChainCommand::Descriptor { reply }).await
	}

	pub async fn state(&self) -> ChainState {
		self.call(|reply| ChainCommand::State { reply }).await
	}

	pub async fn get_mining(&self, address: Address) -> Result<MiningTemplate, Error> {
		self.call(|reply| ChainCommand::GetMining { address, reply }).await
	}

	pub async fn get_block(&self, height: Height) -> Result<Option<Block>, Error> {
		self.call(|reply| ChainCommand::GetBlock { height, reply }).await
	}

	pub async fn get_header(&self, height: Height) -> Result<Option<Header>, Error> {
		self.call(|reply| ChainCommand::GetHeader { height, reply }).await
	}

	pub async fn height_of(&self, hash: Hash) -> Result<Option<Height>, Error> {
		self.call(|reply| ChainCommand::HeightOf { hash, reply }).await
	}

	pub async fn get_balance(&self, account: AccountRef) -> Result<Option<u64>, Error> {
		self.call(|reply| ChainCommand::GetBalance { account, reply }).await
	}

	pub async fn get_history(
		&self,
		account: AccountRef,
		before_id: Option<u64>,
		limit: usize,
	) -> Result<Vec<HistoryEntry>, Error> {
		self.call(|reply| ChainCommand::GetHistory { account, before_id, limit, reply }).await
	}

	pub async fn get_richlist(&self, limit: usize) -> Result<Vec<(Address, u64)>, Error> {
		self.call(|reply| ChainCommand::GetRichlist { limit, reply }).await
	}

	pub async fn get_mempool(&self, limit: usize) -> Vec<TransferTx> {
		self.call(|reply| ChainCommand::GetMempool { limit, reply }).await
	}

	pub async fn get_txcache(&self) -> Vec<TxId> {
		self.call(|reply| ChainCommand::GetTxcache { reply }).await
	}

	pub async fn lookup_tx(&self, hash: Hash) -> Option<TransferTx> {
		self.call(|reply| ChainCommand::LookupTx { hash, reply }).await
	}
}

/// Spawns the chain actor task: a loop that owns `engine` exclusively,
/// applies each `ChainCommand` in arrival order, and forwards any
/// `StateUpdate` the mutation produced to `updates_tx` before replying
/// to the caller. This ordering is what lets the orchestrator observe
/// `ChainEngine` state updates in the same total order the engine
/// emitted them in.
pub fn spawn_chain_actor(
	mut engine: ChainEngine,
	updates_tx: mpsc::Sender<StateUpdate>,
) -> (ChainHandle, tokio::task::JoinHandle<()>) {
	let (tx, mut rx) = mpsc::channel::<ChainCommand>(256);

	let join = tokio::spawn(async move {
		while let Some(cmd) = rx.recv().await {
			match cmd {
				ChainCommand::AppendMined { block, reply } => {
					let result = engine.append_mined(block);
					if let Ok(update) = &result {
						let _ = updates_tx.send(update.clone()).await;
					}
					let _ = reply.send(result);
				}
				ChainCommand::StageSet { headerchain, reply } => {
					let _ = reply.send(engine.stage_set(headerchain));
				}
				ChainCommand::StageAdd { bodies, reply } => {
					let result = engine.stage_add(bodies);
					if let Ok(Some(update)) = &result {
						let _ = updates_tx.send(update.clone()).await;
					}
					let _ = reply.send(result);
				}
				ChainCommand::PutMempool { tx, source, reply } => {
					let _ = reply.send(engine.put_mempool(tx, source));
				}
				ChainCommand::SetSignedSnapshot { snapshot, reply } => {
					let _ = reply.send(engine.set_signed_snapshot(snapshot));
				}
				ChainCommand::SignedSnapshot { reply } => {
					let _ = reply.send(engine.signed_snapshot().cloned());
				}
				ChainCommand::Descriptor { reply } => {
					let _ = reply.send(engine.descriptor().clone());
				}
				ChainCommand::State { reply } => {
					let _ = reply.send(engine.state());
				}
				ChainCommand::GetMining { address, reply } => {
					let _ = reply.send(engine.get_mining(address));
				}
				ChainCommand::GetBlock { height, reply } => {
					let _ = reply.send(engine.get_block(height));
				}
				ChainCommand::GetHeader { height, reply } => {
					let _ = reply.send(engine.get_header(height));
				}
				ChainCommand::HeightOf { hash, reply } => {
					let _ = reply.send(engine.height_of(&hash));
				}
				ChainCommand::GetBalance { account, reply } => {
					let _ = reply.send(engine.get_balance(account));
				}
				ChainCommand::GetHistory { account, before_id, limit, reply } => {
					let _ = reply.send(engine.get_history(account, before_id, limit));
				}
				ChainCommand::GetRichlist { limit, reply } => {
					let _ = reply.send(engine.get_richlist(limit));
				}
				ChainCommand::GetMempool { limit, reply } => {
					let _ = reply.send(engine.get_mempool(limit));
				}
				ChainCommand::GetTxcache { reply } => {
					let _ = reply.send(engine.get_txcache());
				}
				ChainCommand::LookupTx { hash, reply } => {
					let _ = reply.send(engine.lookup_tx(&hash));
				}
			}
		}
	});

	(ChainHandle { tx }, join)
}
