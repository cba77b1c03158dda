//! TransportManager (framing, handshake) and Orchestrator (sync protocol,
//! header/block download, connection schedule). Owns the wire protocol
//! and everything downstream of it; the only door into `ironcrest-chain`
//! that any network-facing code uses is [`chain_actor::ChainHandle`].

#[macro_use]
extern crate failure_derive;

pub mod block_download;
pub mod chain_actor;
pub mod error;
pub mod framing;
pub mod header_download;
pub mod msg;
pub mod orchestrator;
pub mod peer_state;
pub mod peer_store;
pub mod schedule;
pub mod transport;

pub use crate::chain_actor::{spawn_chain_actor, ChainCommand, ChainHandle};
pub use crate::error::{Error, ErrorKind, Offense};
pub use crate::orchestrator::{ApiCommand, Orchestrator, OrchestratorHandle};
pub use crate::peer_state::{ConnectionId, PeerState};
pub use crate::peer_store::PeerStore;
pub use crate::schedule::ConnectionSchedule;
pub use crate::transport::{spawn_transport, CloseReason, TransportCommand, TransportEvent, TransportHandle};
