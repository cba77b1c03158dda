//! Owns every TCP socket: accepts inbound connections, drives outbound
//! connects, runs the handshake and, once a connection's handshake
//! completes, shuttles [`crate::msg::Message`] values to and from the
//! Orchestrator. Each connection is a standalone tokio task; the manager
//! task here only tracks the per-connection outbound channel and relays
//! [`TransportCommand`]s and [`TransportEvent`]s.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::error::{ErrorKind, Offense};
use crate::framing::{
	Codec, Frame, Greeting, GREETING_SIZE, MAGIC_MAINNET_IN, MAGIC_MAINNET_OUT, MAGIC_TESTNET_IN, MAGIC_TESTNET_OUT,
	MIN_PROTOCOL_VERSION,
};
use crate::msg::Message;
use crate::peer_state::ConnectionId;
use crate::peer_store::PeerStore;

/// Why a connection's task exited.
#[derive(Clone, Debug)]
pub enum CloseReason {
	/// Asked to close by [`TransportCommand::Disconnect`].
	Requested,
	/// A protocol offense or local fault, per [`ErrorKind`].
	Error(ErrorKind),
	/// The peer closed the socket cleanly.
	Eof,
}

/// Commands accepted by the transport manager task.
pub enum TransportCommand {
	Connect(SocketAddr),
	Send(ConnectionId, Message),
	Disconnect(ConnectionId, CloseReason),
}

/// Events the transport manager emits to the Orchestrator.
pub enum TransportEvent {
	/// A connection completed its handshake and may now be driven.
	Connected { id: ConnectionId, addr: SocketAddr, inbound: bool, claimed_version: u32, claimed_port: Option<u16> },
	/// An inbound or outbound attempt never completed its handshake.
	HandshakeFailed { addr: SocketAddr, inbound: bool, reason: CloseReason },
	/// A previously-connected connection's task has exited.
	Disconnected { id: ConnectionId, reason: CloseReason },
	/// A decoded message arrived from a handshaked connection.
	Message { id: ConnectionId, message: Message },
}

/// Cloneable handle to a running transport manager.
#[derive(Clone)]
pub struct TransportHandle {
	tx: mpsc::Sender<TransportCommand>,
}

impl TransportHandle {
	pub async fn connect(&self, addr: SocketAddr) {
		let _ = self.tx.send(TransportCommand::Connect(addr)).await;
	}

	pub async fn send(&self, id: ConnectionId, message: Message) {
		let _ = self.tx.send(TransportCommand::Send(id, message)).await;
	}

	pub async fn disconnect(&self, id: ConnectionId, reason: CloseReason) {
		let _ = self.tx.send(TransportCommand::Disconnect(id, reason)).await;
	}
}

/// Bound on the per-connection outbound queue, in messages. A connection
/// whose peer cannot keep up trips `Offense::BufferFull` once this fills.
const OUTBOX_CAPACITY: usize = 256;

fn magic_for(testnet: bool, outbound: bool) -> &'static [u8; 14] {
	match (testnet, outbound) {
		(false, true) => MAGIC_MAINNET_OUT,
		(false, false) => MAGIC_MAINNET_IN,
		(true, true) => MAGIC_TESTNET_OUT,
		(true, false) => MAGIC_TESTNET_IN,
	}
}

/// Runs the raw (pre-`Framed`) handshake on a freshly connected or
/// accepted socket, returning the peer's greeting plus its claimed
/// listen port (present only when the peer connected to us outbound,
/// i.e. when `inbound` is true here).
async fn handshake(
	stream: &mut TcpStream,
	testnet: bool,
	inbound: bool,
	our_listen_port: Option<u16>,
) -> Result<(Greeting, Option<u16>), ErrorKind> {
	let ours = Greeting::ours(magic_for(testnet, !inbound));
	let mut out = ours.encode().to_vec();
	if !inbound {
		let port = our_listen_port.unwrap_or(0);
		out.extend_from_slice(&port.to_be_bytes());
	}
	stream.write_all(&out).await.map_err(|e| ErrorKind::Io(e.to_string()))?;

	let mut greeting_buf = [0u8; GREETING_SIZE];
	stream.read_exact(&mut greeting_buf).await.map_err(|e| ErrorKind::Io(e.to_string()))?;
	let theirs = Greeting::decode(&greeting_buf);

	if !Greeting::magic_recognized(&theirs.magic, testnet) {
		return Err(ErrorKind::Offense(Offense::Handshake, "unrecognized magic".into()));
	}
	if theirs.version < MIN_PROTOCOL_VERSION {
		return Err(ErrorKind::Offense(Offense::Version, format!("peer version {}", theirs.version)));
	}

	let claimed_port = if inbound {
		let mut port_buf = [0u8; 2];
		stream.read_exact(&mut port_buf).await.map_err(|e| ErrorKind::Io(e.to_string()))?;
		stream.write_all(&[1u8]).await.map_err(|e| ErrorKind::Io(e.to_string()))?;
		Some(u16::from_be_bytes(port_buf))
	} else {
		let mut ack = [0u8; 1];
		stream.read_exact(&mut ack).await.map_err(|e| ErrorKind::Io(e.to_string()))?;
		None
	};

	Ok((theirs, claimed_port))
}

#[allow(clippy::too_many_arguments)]
async fn run_connection(
	id: ConnectionId,
	addr: SocketAddr,
	inbound: bool,
	testnet: bool,
	our_listen_port: Option<u16>,
	mut stream: TcpStream,
	mut outbox: mpsc::Receiver<Message>,
	events_tx: mpsc::Sender<TransportEvent>,
	peer_store: Arc<PeerStore>,
) {
	let (greeting, claimed_port) = match handshake(&mut stream, testnet, inbound, our_listen_port).await {
		Ok(v) => v,
		Err(kind) => {
			let reason = CloseReason::Error(kind);
			let _ = events_tx.send(TransportEvent::HandshakeFailed { addr, inbound, reason }).await;
			return;
		}
	};

	peer_store.record_seen(addr);

	let _ = events_tx
		.send(TransportEvent::Connected {
			id,
			addr,
			inbound,
			claimed_version: greeting.version,
			claimed_port,
		})
		.await;

	let mut framed = Framed::new(stream, Codec::new());
	let close_reason;
	loop {
		tokio::select! {
			incoming = framed.next() => {
				match incoming {
					Some(Ok(frame)) => {
						match Message::decode_payload(frame.msg_type, &frame.payload) {
							Ok(message) => {
								if events_tx.send(TransportEvent::Message { id, message }).await.is_err() {
									close_reason = CloseReason::Requested;
									break;
								}
							}
							Err(e) => {
								close_reason = CloseReason::Error(ErrorKind::Offense(Offense::MsgIntegrity, e.to_string()));
								break;
							}
						}
					}
					Some(Err(e)) => {
						close_reason = CloseReason::Error(e.kind());
						break;
					}
					None => {
						close_reason = CloseReason::Eof;
						break;
					}
				}
			}
			outgoing = outbox.recv() => {
				match outgoing {
					Some(message) => {
						let payload = match message.encode_payload() {
							Ok(p) => p,
							Err(_) => continue,
						};
						let frame = Frame { msg_type: message.msg_type(), payload };
						if framed.send(frame).await.is_err() {
							close_reason = CloseReason::Eof;
							break;
						}
					}
					None => {
						close_reason = CloseReason::Requested;
						break;
					}
				}
			}
		}
	}

	let _ = events_tx.send(TransportEvent::Disconnected { id, reason: close_reason }).await;
}

/// Spawns the transport manager: optionally binds `listen_addr` for
/// inbound connections, and thereafter accepts [`TransportCommand`]s and
/// emits [`TransportEvent`]s for every connection it owns. `testnet`
/// selects the magic-byte pair; `our_listen_port` is advertised to peers
/// we dial outbound, so they can record us as connectable in turn.
pub fn spawn_transport(
	listen_addr: Option<SocketAddr>,
	testnet: bool,
	our_listen_port: Option<u16>,
	peer_store: Arc<PeerStore>,
) -> (TransportHandle, mpsc::Receiver<TransportEvent>) {
	let (cmd_tx, mut cmd_rx) = mpsc::channel::<TransportCommand>(256);
	let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(1024);

	tokio::spawn(async move {
		let next_id = AtomicU64::new(1);
		let mut outboxes: HashMap<ConnectionId, mpsc::Sender<Message>> = HashMap::new();

		let listener = match listen_addr {
			Some(addr) => TcpListener::bind(addr).await.ok(),
			None => None,
		};

		loop {
			tokio::select! {
				cmd = cmd_rx.recv() => {
					match cmd {
						Some(TransportCommand::Connect(addr)) => {
							if peer_store.is_banned(addr.ip()) {
								continue;
							}
							let id = next_id.fetch_add(1, Ordering::Relaxed);
							let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
							outboxes.insert(id, outbox_tx);
							let events_tx = event_tx.clone();
							let peer_store = peer_store.clone();
							tokio::spawn(async move {
								match TcpStream::connect(addr).await {
									Ok(stream) => {
										run_connection(id, addr, false, testnet, our_listen_port, stream, outbox_rx, events_tx, peer_store).await;
									}
									Err(e) => {
										let reason = CloseReason::Error(ErrorKind::Io(e.to_string()));
										let _ = events_tx.send(TransportEvent::HandshakeFailed { addr, inbound: false, reason }).await;
									}
								}
							});
						}
						Some(TransportCommand::Send(id, message)) => {
							if let Some(outbox) = outboxes.get(&id) {
								let _ = outbox.send(message).await;
							}
						}
						Some(TransportCommand::Disconnect(id, _reason)) => {
							outboxes.remove(&id);
						}
						None => break,
					}
				}
				accepted = async {
					match &listener {
						Some(l) => l.accept().await,
						None => std::future::pending().await,
					}
				}, if listener.is_some() => {
					if let Ok((stream, addr)) = accepted {
						if peer_store.is_banned(addr.ip()) {
							continue;
						}
						let id = next_id.fetch_add(1, Ordering::Relaxed);
						let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
						outboxes.insert(id, outbox_tx);
						let events_tx = event_tx.clone();
						let peer_store = peer_store.clone();
						tokio::spawn(async move {
							run_connection(id, addr, true, testnet, our_listen_port, stream, outbox_rx, events_tx, peer_store).await;
						});
					}
				}
			}
		}
	});

	(TransportHandle { tx: cmd_tx }, event_rx)
}
