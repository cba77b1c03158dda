//! Message taxonomy exchanged once a connection has completed its
//! handshake: chain-state gossip (`Init`/`Append`/`Fork`/
//! `SignedPinRollback`), header/block download (`BatchReq/Rep`,
//! `ProbeReq/Rep`, `BlockReq/Rep`), liveness and peer exchange
//! (`Ping`/`Pong`), mempool gossip (`TxNotify`/`TxReq/Rep`), and advisory
//! finality (`Leader`). Every message has a fixed-width, bit-exact binary
//! encoding via the shared [`ironcrest_core::ser`] layer, framed by
//! [`crate::framing`].

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use ironcrest_chain::{Descriptor, Grid, SignedSnapshot};
use ironcrest_core::block::{Body, TransferTx};
use ironcrest_core::hash::Hash;
use ironcrest_core::header::Header;
use ironcrest_core::height::Height;
use ironcrest_core::ser::{self, BinReader, BinWriter, Readable, Writeable};
use ironcrest_core::target::Worksum;
use ironcrest_core::txid::TxId;

/// Discriminant for each message type, carried in a frame's `typeLo` byte
/// (`typeHi` is reserved and must be 0).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum MsgType {
	Init = 0,
	Append = 1,
	Fork = 2,
	SignedPinRollback = 3,
	BatchReq = 4,
	BatchRep = 5,
	ProbeReq = 6,
	ProbeRep = 7,
	BlockReq = 8,
	BlockRep = 9,
	Ping = 10,
	Pong = 11,
	TxNotify = 12,
	TxReq = 13,
	TxRep = 14,
	Leader = 15,
}

impl MsgType {
	/// Largest payload byte count this message type is ever allowed to
	/// carry; oversize frames are an `MsgLen` offense before the payload
	/// is even parsed.
	pub fn max_len(self) -> u32 {
		use MsgType::*;
		match self {
			Init | Append | Fork | SignedPinRollback | ProbeReq | ProbeRep | Ping | Pong => 8 * 1024,
			BatchReq | BlockReq | TxReq => 64 * 1024,
			BatchRep => 100 * 128,
			BlockRep => 100 * 64 * 1024,
			TxNotify | TxRep => 4 * 1024 * 1024,
			Leader => 4 * 1024,
		}
	}

	/// Decodes a discriminant byte, failing for unknown values (an
	/// `MsgType` offense).
	pub fn from_u8(v: u8) -> Option<MsgType> {
		use MsgType::*;
		Some(match v {
			0 => Init,
			1 => Append,
			2 => Fork,
			3 => SignedPinRollback,
			4 => BatchReq,
			5 => BatchRep,
			6 => ProbeReq,
			7 => ProbeRep,
			8 => BlockReq,
			9 => BlockRep,
			10 => Ping,
			11 => Pong,
			12 => TxNotify,
			13 => TxReq,
			14 => TxRep,
			15 => Leader,
			_ => return None,
		})
	}
}

fn write_vec<T: Writeable>(writer: &mut BinWriter, items: &[T]) -> Result<(), ser::Error> {
	writer.write_u32(items.len() as u32)?;
	for item in items {
		item.write(writer)?;
	}
	Ok(())
}

fn read_vec<T: Readable>(reader: &mut BinReader, max: u32) -> Result<Vec<T>, ser::Error> {
	let len = reader.read_u32()?;
	if len > max {
		return Err(ser::Error::TooLarge(format!("{} items", len)));
	}
	(0..len).map(|_| T::read(reader)).collect()
}

fn write_socket_addr(writer: &mut BinWriter, addr: &SocketAddr) -> Result<(), ser::Error> {
	match addr.ip() {
		IpAddr::V4(v4) => {
			writer.write_u8(4)?;
			writer.write_fixed_bytes(&v4.octets())?;
		}
		IpAddr::V6(v6) => {
			writer.write_u8(6)?;
			writer.write_fixed_bytes(&v6.octets())?;
		}
	}
	writer.write_u32(addr.port() as u32)
}

fn read_socket_addr(reader: &mut BinReader) -> Result<SocketAddr, ser::Error> {
	let tag = reader.read_u8()?;
	let ip = match tag {
		4 => {
			let b = reader.read_fixed_bytes(4)?;
			IpAddr::V4(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
		}
		6 => {
			let b = reader.read_fixed_bytes(16)?;
			let mut octets = [0u8; 16];
			octets.copy_from_slice(&b);
			IpAddr::V6(Ipv6Addr::from(octets))
		}
		_ => return Err(ser::Error::CorruptedData),
	};
	let port = reader.read_u32()? as u16;
	Ok(SocketAddr::new(ip, port))
}

/// A chain summary as exchanged in `Init`/`Append`/`Fork`: descriptor,
/// length, accumulated work, and the O(sqrt(N)) grid.
#[derive(Clone, Debug)]
pub struct ChainSummary {
	pub descriptor: Descriptor,
	pub length: Height,
	pub worksum: Worksum,
	pub grid: Grid,
}

fn write_grid(writer: &mut BinWriter, grid: &Grid) -> Result<(), ser::Error> {
	write_vec(writer, grid.batch_heads())
}

fn read_grid(reader: &mut BinReader) -> Result<Grid, ser::Error> {
	let heads: Vec<Hash> = read_vec(reader, 1_000_000)?;
	Ok(Grid::from_batch_heads(heads))
}

impl Writeable for ChainSummary {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u64(self.descriptor)?;
		writer.write_u32(self.length)?;
		writer.write_fixed_bytes(&self.worksum.to_bytes())?;
		write_grid(writer, &self.grid)
	}
}

impl Readable for ChainSummary {
	fn read(reader: &mut BinReader) -> Result<ChainSummary, ser::Error> {
		let descriptor = reader.read_u64()?;
		let length = reader.read_u32()?;
		let ws_bytes = reader.read_fixed_bytes(32)?;
		let mut buf = [0u8; 32];
		buf.copy_from_slice(&ws_bytes);
		let worksum = Worksum::from_bytes(&buf);
		let grid = read_grid(reader)?;
		Ok(ChainSummary { descriptor, length, worksum, grid })
	}
}

/// Must be the first message on every connection. Announces the sender's
/// chain and its replay-pin commitment.
#[derive(Clone, Debug)]
pub struct Init {
	pub version: u32,
	pub chain: ChainSummary,
	pub pin_height: Height,
	pub pin_hash: Hash,
}

impl Writeable for Init {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u32(self.version)?;
		self.chain.write(writer)?;
		writer.write_u32(self.pin_height)?;
		self.pin_hash.write(writer)
	}
}

impl Readable for Init {
	fn read(reader: &mut BinReader) -> Result<Init, ser::Error> {
		let version = reader.read_u32()?;
		let chain = ChainSummary::read(reader)?;
		let pin_height = reader.read_u32()?;
		let pin_hash = Hash::read(reader)?;
		Ok(Init { version, chain, pin_height, pin_hash })
	}
}

/// Announces that the sender's chain grew by exactly one header.
#[derive(Clone, Debug)]
pub struct Append {
	pub height: Height,
	pub header: Header,
	pub worksum_delta: Worksum,
	pub grid_delta: Option<Hash>,
}

impl Writeable for Append {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u32(self.height)?;
		self.header.write(writer)?;
		writer.write_fixed_bytes(&self.worksum_delta.to_bytes())?;
		match self.grid_delta {
			Some(h) => {
				writer.write_u8(1)?;
				h.write(writer)
			}
			None => writer.write_u8(0),
		}
	}
}

impl Readable for Append {
	fn read(reader: &mut BinReader) -> Result<Append, ser::Error> {
		let height = reader.read_u32()?;
		let header = Header::read(reader)?;
		let ws = reader.read_fixed_bytes(32)?;
		let mut buf = [0u8; 32];
		buf.copy_from_slice(&ws);
		let worksum_delta = Worksum::from_bytes(&buf);
		let has_grid = reader.read_u8()?;
		let grid_delta = if has_grid == 1 { Some(Hash::read(reader)?) } else { None };
		Ok(Append { height, header, worksum_delta, grid_delta })
	}
}

/// Announces that the sender's chain reorganized onto a different branch.
#[derive(Clone, Debug)]
pub struct Fork {
	pub fork_height: Height,
	pub worksum: Worksum,
	pub new_head: Header,
	pub grid_suffix: Vec<Hash>,
}

impl Writeable for Fork {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u32(self.fork_height)?;
		writer.write_fixed_bytes(&self.worksum.to_bytes())?;
		self.new_head.write(writer)?;
		write_vec(writer, &self.grid_suffix)
	}
}

impl Readable for Fork {
	fn read(reader: &mut BinReader) -> Result<Fork, ser::Error> {
		let fork_height = reader.read_u32()?;
		let ws = reader.read_fixed_bytes(32)?;
		let mut buf = [0u8; 32];
		buf.copy_from_slice(&ws);
		let worksum = Worksum::from_bytes(&buf);
		let new_head = Header::read(reader)?;
		let grid_suffix = read_vec(reader, 1_000_000)?;
		Ok(Fork { fork_height, worksum, new_head, grid_suffix })
	}
}

/// Propagates an advisory finality marker; `shrink_length` is present
/// when accepting it requires rolling the receiver's chain back.
#[derive(Clone, Debug)]
pub struct SignedPinRollback {
	pub snapshot: SignedSnapshot,
	pub shrink_length: Option<Height>,
}

impl Writeable for SignedPinRollback {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u32(self.snapshot.height)?;
		self.snapshot.hash.write(writer)?;
		writer.write_u64(self.snapshot.priority)?;
		self.snapshot.signature.write(writer)?;
		match self.shrink_length {
			Some(h) => {
				writer.write_u8(1)?;
				writer.write_u32(h)
			}
			None => writer.write_u8(0),
		}
	}
}

impl Readable for SignedPinRollback {
	fn read(reader: &mut BinReader) -> Result<SignedPinRollback, ser::Error> {
		let height = reader.read_u32()?;
		let hash = Hash::read(reader)?;
		let priority = reader.read_u64()?;
		let signature = ironcrest_core::signature::Signature::read(reader)?;
		let has_shrink = reader.read_u8()?;
		let shrink_length = if has_shrink == 1 { Some(reader.read_u32()?) } else { None };
		Ok(SignedPinRollback {
			snapshot: SignedSnapshot { height, hash, priority, signature },
			shrink_length,
		})
	}
}

/// Identifies a contiguous span of headers within a specific chain
/// instance: the unit of `BatchReq`/`BlockReq`.
#[derive(Copy, Clone, Debug)]
pub struct Selector {
	pub descriptor: Descriptor,
	pub start_height: Height,
	pub length: u32,
}

impl Writeable for Selector {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u64(self.descriptor)?;
		writer.write_u32(self.start_height)?;
		writer.write_u32(self.length)
	}
}

impl Readable for Selector {
	fn read(reader: &mut BinReader) -> Result<Selector, ser::Error> {
		let descriptor = reader.read_u64()?;
		let start_height = reader.read_u32()?;
		let length = reader.read_u32()?;
		Ok(Selector { descriptor, start_height, length })
	}
}

/// Requests up to `selector.length` headers starting at `selector.start_height`.
#[derive(Clone, Debug)]
pub struct BatchReq {
	pub nonce: u64,
	pub selector: Selector,
}

impl Writeable for BatchReq {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u64(self.nonce)?;
		self.selector.write(writer)
	}
}

impl Readable for BatchReq {
	fn read(reader: &mut BinReader) -> Result<BatchReq, ser::Error> {
		let nonce = reader.read_u64()?;
		let selector = Selector::read(reader)?;
		Ok(BatchReq { nonce, selector })
	}
}

/// Reply to a [`BatchReq`]; empty `headers` means the descriptor was
/// unknown to the responder.
#[derive(Clone, Debug)]
pub struct BatchRep {
	pub nonce: u64,
	pub headers: Vec<Header>,
}

impl Writeable for BatchRep {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u64(self.nonce)?;
		write_vec(writer, &self.headers)
	}
}

impl Readable for BatchRep {
	fn read(reader: &mut BinReader) -> Result<BatchRep, ser::Error> {
		let nonce = reader.read_u64()?;
		let headers = read_vec(reader, ironcrest_chain::BATCH_SIZE + 1)?;
		Ok(BatchRep { nonce, headers })
	}
}

/// Asks a peer for its header at `height` under the chain identified by
/// `descriptor`, to binary-search for a fork point.
#[derive(Clone, Debug)]
pub struct ProbeReq {
	pub nonce: u64,
	pub descriptor: Descriptor,
	pub height: Height,
}

impl Writeable for ProbeReq {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u64(self.nonce)?;
		writer.write_u64(self.descriptor)?;
		writer.write_u32(self.height)
	}
}

impl Readable for ProbeReq {
	fn read(reader: &mut BinReader) -> Result<ProbeReq, ser::Error> {
		let nonce = reader.read_u64()?;
		let descriptor = reader.read_u64()?;
		let height = reader.read_u32()?;
		Ok(ProbeReq { nonce, descriptor, height })
	}
}

/// Reply to a [`ProbeReq`]: the requested header (if the descriptor was
/// recognized) plus the responder's own current header at that height.
#[derive(Clone, Debug)]
pub struct ProbeRep {
	pub nonce: u64,
	pub requested: Option<Header>,
	pub current: Header,
}

impl Writeable for ProbeRep {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u64(self.nonce)?;
		match self.requested {
			Some(h) => {
				writer.write_u8(1)?;
				h.write(writer)?;
			}
			None => writer.write_u8(0)?,
		}
		self.current.write(writer)
	}
}

impl Readable for ProbeRep {
	fn read(reader: &mut BinReader) -> Result<ProbeRep, ser::Error> {
		let nonce = reader.read_u64()?;
		let has_requested = reader.read_u8()?;
		let requested = if has_requested == 1 { Some(Header::read(reader)?) } else { None };
		let current = Header::read(reader)?;
		Ok(ProbeRep { nonce, requested, current })
	}
}

/// Requests bodies for a height range under a specific chain descriptor.
#[derive(Clone, Debug)]
pub struct BlockReq {
	pub nonce: u64,
	pub descriptor: Descriptor,
	pub range: Selector,
}

impl Writeable for BlockReq {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u64(self.nonce)?;
		writer.write_u64(self.descriptor)?;
		self.range.write(writer)
	}
}

impl Readable for BlockReq {
	fn read(reader: &mut BinReader) -> Result<BlockReq, ser::Error> {
		let nonce = reader.read_u64()?;
		let descriptor = reader.read_u64()?;
		let range = Selector::read(reader)?;
		Ok(BlockReq { nonce, descriptor, range })
	}
}

/// Reply to a [`BlockReq`].
#[derive(Clone, Debug)]
pub struct BlockRep {
	pub nonce: u64,
	pub bodies: Vec<Body>,
}

impl Writeable for BlockRep {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u64(self.nonce)?;
		write_vec(writer, &self.bodies)
	}
}

impl Readable for BlockRep {
	fn read(reader: &mut BinReader) -> Result<BlockRep, ser::Error> {
		let nonce = reader.read_u64()?;
		let bodies = read_vec(reader, ironcrest_chain::BATCH_SIZE + 1)?;
		Ok(BlockRep { nonce, bodies })
	}
}

/// Liveness probe; also requests a sample of addresses and mempool txids.
#[derive(Clone, Debug)]
pub struct Ping {
	pub nonce: u64,
	pub snapshot_priority: u64,
	pub max_addresses: u32,
	pub max_tx: u32,
}

impl Writeable for Ping {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u64(self.nonce)?;
		writer.write_u64(self.snapshot_priority)?;
		writer.write_u32(self.max_addresses)?;
		writer.write_u32(self.max_tx)
	}
}

impl Readable for Ping {
	fn read(reader: &mut BinReader) -> Result<Ping, ser::Error> {
		let nonce = reader.read_u64()?;
		let snapshot_priority = reader.read_u64()?;
		let max_addresses = reader.read_u32()?;
		let max_tx = reader.read_u32()?;
		Ok(Ping { nonce, snapshot_priority, max_addresses, max_tx })
	}
}

/// Reply to a [`Ping`]: a sample of verified addresses plus mempool txids
/// the sender believes the requester may not have.
#[derive(Clone, Debug)]
pub struct Pong {
	pub nonce: u64,
	pub addresses: Vec<SocketAddr>,
	pub txids: Vec<TxId>,
}

impl Writeable for Pong {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u64(self.nonce)?;
		writer.write_u32(self.addresses.len() as u32)?;
		for a in &self.addresses {
			write_socket_addr(writer, a)?;
		}
		write_vec(writer, &self.txids)
	}
}

impl Readable for Pong {
	fn read(reader: &mut BinReader) -> Result<Pong, ser::Error> {
		let nonce = reader.read_u64()?;
		let n = reader.read_u32()?;
		if n > 4096 {
			return Err(ser::Error::TooLarge(format!("{} addresses", n)));
		}
		let mut addresses = Vec::with_capacity(n as usize);
		for _ in 0..n {
			addresses.push(read_socket_addr(reader)?);
		}
		let txids = read_vec(reader, 1_000_000)?;
		Ok(Pong { nonce, addresses, txids })
	}
}

/// Announces a set of mempool txids the sender holds, without the bodies.
#[derive(Clone, Debug)]
pub struct TxNotify {
	pub txids: Vec<TxId>,
}

impl Writeable for TxNotify {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		write_vec(writer, &self.txids)
	}
}

impl Readable for TxNotify {
	fn read(reader: &mut BinReader) -> Result<TxNotify, ser::Error> {
		Ok(TxNotify { txids: read_vec(reader, 1_000_000)? })
	}
}

/// Requests the full transactions for a set of txids.
#[derive(Clone, Debug)]
pub struct TxReq {
	pub txids: Vec<TxId>,
}

impl Writeable for TxReq {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		write_vec(writer, &self.txids)
	}
}

impl Readable for TxReq {
	fn read(reader: &mut BinReader) -> Result<TxReq, ser::Error> {
		Ok(TxReq { txids: read_vec(reader, 10_000)? })
	}
}

/// Reply to a [`TxReq`].
#[derive(Clone, Debug)]
pub struct TxRep {
	pub txs: Vec<TransferTx>,
}

impl Writeable for TxRep {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		write_vec(writer, &self.txs)
	}
}

impl Readable for TxRep {
	fn read(reader: &mut BinReader) -> Result<TxRep, ser::Error> {
		Ok(TxRep { txs: read_vec(reader, 10_000)? })
	}
}

/// Propagates a signed snapshot directly (as opposed to the rollback
/// variant carried by [`SignedPinRollback`] for peers that must shrink
/// their chain to accept it).
#[derive(Clone, Debug)]
pub struct Leader {
	pub snapshot: SignedSnapshot,
}

impl Writeable for Leader {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u32(self.snapshot.height)?;
		self.snapshot.hash.write(writer)?;
		writer.write_u64(self.snapshot.priority)?;
		self.snapshot.signature.write(writer)
	}
}

impl Readable for Leader {
	fn read(reader: &mut BinReader) -> Result<Leader, ser::Error> {
		let height = reader.read_u32()?;
		let hash = Hash::read(reader)?;
		let priority = reader.read_u64()?;
		let signature = ironcrest_core::signature::Signature::read(reader)?;
		Ok(Leader { snapshot: SignedSnapshot { height, hash, priority, signature } })
	}
}

/// Every message a connection can receive once past the handshake. The
/// wire discriminant ([`MsgType`]) is carried in the frame header
/// ([`crate::framing::Frame`]), not duplicated in this payload.
#[derive(Clone, Debug)]
pub enum Message {
	Init(Init),
	Append(Append),
	Fork(Fork),
	SignedPinRollback(SignedPinRollback),
	BatchReq(BatchReq),
	BatchRep(BatchRep),
	ProbeReq(ProbeReq),
	ProbeRep(ProbeRep),
	BlockReq(BlockReq),
	BlockRep(BlockRep),
	Ping(Ping),
	Pong(Pong),
	TxNotify(TxNotify),
	TxReq(TxReq),
	TxRep(TxRep),
	Leader(Leader),
}

impl Message {
	/// The wire discriminant for this message.
	pub fn msg_type(&self) -> MsgType {
		match self {
			Message::Init(_) => MsgType::Init,
			Message::Append(_) => MsgType::Append,
			Message::Fork(_) => MsgType::Fork,
			Message::SignedPinRollback(_) => MsgType::SignedPinRollback,
			Message::BatchReq(_) => MsgType::BatchReq,
			Message::BatchRep(_) => MsgType::BatchRep,
			Message::ProbeReq(_) => MsgType::ProbeReq,
			Message::ProbeRep(_) => MsgType::ProbeRep,
			Message::BlockReq(_) => MsgType::BlockReq,
			Message::BlockRep(_) => MsgType::BlockRep,
			Message::Ping(_) => MsgType::Ping,
			Message::Pong(_) => MsgType::Pong,
			Message::TxNotify(_) => MsgType::TxNotify,
			Message::TxReq(_) => MsgType::TxReq,
			Message::TxRep(_) => MsgType::TxRep,
			Message::Leader(_) => MsgType::Leader,
		}
	}

	/// Serializes the payload (without the frame header).
	pub fn encode_payload(&self) -> Result<Vec<u8>, ser::Error> {
		match self {
			Message::Init(m) => ser::ser_vec(m),
			Message::Append(m) => ser::ser_vec(m),
			Message::Fork(m) => ser::ser_vec(m),
			Message::SignedPinRollback(m) => ser::ser_vec(m),
			Message::BatchReq(m) => ser::ser_vec(m),
			Message::BatchRep(m) => ser::ser_vec(m),
			Message::ProbeReq(m) => ser::ser_vec(m),
			Message::ProbeRep(m) => ser::ser_vec(m),
			Message::BlockReq(m) => ser::ser_vec(m),
			Message::BlockRep(m) => ser::ser_vec(m),
			Message::Ping(m) => ser::ser_vec(m),
			Message::Pong(m) => ser::ser_vec(m),
			Message::TxNotify(m) => ser::ser_vec(m),
			Message::TxReq(m) => ser::ser_vec(m),
			Message::TxRep(m) => ser::ser_vec(m),
			Message::Leader(m) => ser::ser_vec(m),
		}
	}

	/// Parses a payload of the given [`MsgType`].
	pub fn decode_payload(msg_type: MsgType, payload: &[u8]) -> Result<Message, ser::Error> {
		Ok(match msg_type {
			MsgType::Init => Message::Init(ser::deserialize(payload)?),
			MsgType::Append => Message::Append(ser::deserialize(payload)?),
			MsgType::Fork => Message::Fork(ser::deserialize(payload)?),
			MsgType::SignedPinRollback => Message::SignedPinRollback(ser::deserialize(payload)?),
			MsgType::BatchReq => Message::BatchReq(ser::deserialize(payload)?),
			MsgType::BatchRep => Message::BatchRep(ser::deserialize(payload)?),
			MsgType::ProbeReq => Message::ProbeReq(ser::deserialize(payload)?),
			MsgType::ProbeRep => Message::ProbeRep(ser::deserialize(payload)?),
			MsgType::BlockReq => Message::BlockReq(ser::deserialize(payload)?),
			MsgType::BlockRep => Message::BlockRep(ser::deserialize(payload)?),
			MsgType::Ping => Message::Ping(ser::deserialize(payload)?),
			MsgType::Pong => Message::Pong(ser::deserialize(payload)?),
			MsgType::TxNotify => Message::TxNotify(ser::deserialize(payload)?),
			MsgType::TxReq => Message::TxReq(ser::deserialize(payload)?),
			MsgType::TxRep => Message::TxRep(ser::deserialize(payload)?),
			MsgType::Leader => Message::Leader(ser::deserialize(payload)?),
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use ironcrest_core::target::Worksum;

	#[test]
	fn ping_roundtrips_through_message_envelope() {
		let msg = Message::Ping(Ping { nonce: 7, snapshot_priority: 0, max_addresses: 10, max_tx: 10 });
		let payload = msg.encode_payload().unwrap();
		let decoded = Message::decode_payload(MsgType::Ping, &payload).unwrap();
		match decoded {
			Message::Ping(p) => assert_eq!(p.nonce, 7),
			_ => panic!("wrong variant"),
		}
	}

	#[test]
	fn chain_summary_roundtrips() {
		let cs = ChainSummary { descriptor: 3, length: 42, worksum: Worksum::zero(), grid: Grid::new() };
		let bytes = ser::ser_vec(&cs).unwrap();
		let cs2: ChainSummary = ser::deserialize(&bytes).unwrap();
		assert_eq!(cs.length, cs2.length);
		assert_eq!(cs.descriptor, cs2.descriptor);
	}
}
