//! Wire framing and the handshake greeting. A `tokio_util::codec::Decoder`/
//! `Encoder` pair lets the post-handshake message stream run directly in a
//! `tokio::select!` loop via `Framed<TcpStream, Codec>`; the handshake
//! itself (`Greeting` exchange before any framed message) is driven one
//! level up in [`crate::transport`], since the handshake and the
//! post-handshake message stream use different wire shapes.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use ironcrest_util::hash::frame_checksum;

use crate::error::{Error, ErrorKind, Offense};
use crate::msg::MsgType;

/// 14-byte magic preceding every handshake greeting, distinguishing
/// mainnet from testnet and inbound from outbound direction.
pub const MAGIC_MAINNET_OUT: &[u8; 14] = b"WARTHOG GRUNT?";
pub const MAGIC_MAINNET_IN: &[u8; 14] = b"WARTHOG GRUNT!";
pub const MAGIC_TESTNET_OUT: &[u8; 14] = b"TESTNET GRUNT?";
pub const MAGIC_TESTNET_IN: &[u8; 14] = b"TESTNET GRUNT!";

/// Size of the handshake greeting: `14-byte magic | version:u32 | reserved:u32`.
pub const GREETING_SIZE: usize = 14 + 4 + 4;

/// The lowest protocol version this node will accept from a peer.
pub const MIN_PROTOCOL_VERSION: u32 = 1;
/// The protocol version this node speaks.
pub const PROTOCOL_VERSION: u32 = 1;

/// A decoded handshake greeting.
#[derive(Copy, Clone, Debug)]
pub struct Greeting {
	pub magic: [u8; 14],
	pub version: u32,
	pub reserved: u32,
}

impl Greeting {
	/// Builds the greeting this node sends, given which network it runs.
	pub fn ours(magic: &[u8; 14]) -> Greeting {
		Greeting { magic: *magic, version: PROTOCOL_VERSION, reserved: 0 }
	}

	/// Encodes the greeting to exactly [`GREETING_SIZE`] bytes.
	pub fn encode(&self) -> [u8; GREETING_SIZE] {
		let mut buf = [0u8; GREETING_SIZE];
		buf[0..14].copy_from_slice(&self.magic);
		buf[14..18].copy_from_slice(&self.version.to_be_bytes());
		buf[18..22].copy_from_slice(&self.reserved.to_be_bytes());
		buf
	}

	/// Decodes a greeting from exactly [`GREETING_SIZE`] bytes.
	pub fn decode(buf: &[u8]) -> Greeting {
		let mut magic = [0u8; 14];
		magic.copy_from_slice(&buf[0..14]);
		let version = u32::from_be_bytes(buf[14..18].try_into().unwrap());
		let reserved = u32::from_be_bytes(buf[18..22].try_into().unwrap());
		Greeting { magic, version, reserved }
	}

	/// Whether `magic` is one of the four recognized magics for the given
	/// network (`testnet` selects between the two magic pairs); direction
	/// (in/out) is not checked here since either side may see either.
	pub fn magic_recognized(magic: &[u8; 14], testnet: bool) -> bool {
		if testnet {
			magic == MAGIC_TESTNET_OUT || magic == MAGIC_TESTNET_IN
		} else {
			magic == MAGIC_MAINNET_OUT || magic == MAGIC_MAINNET_IN
		}
	}
}

/// A single framed message, post-handshake: `length:u32 | checksum:u32 |
/// typeHi:u8 | typeLo:u8 | payload[length-2]`. `length` counts the two
/// type bytes plus the payload, not including itself or the checksum.
#[derive(Clone, Debug)]
pub struct Frame {
	pub msg_type: MsgType,
	pub payload: Vec<u8>,
}

const HEADER_LEN: usize = 4 + 4 + 1 + 1;

/// Codec implementing the post-handshake frame format over a byte stream.
pub struct Codec {
	/// Caps oversize frames before the payload itself is even buffered.
	max_frame_len: u32,
}

impl Codec {
	pub fn new() -> Codec {
		Codec { max_frame_len: 8 * 1024 * 1024 }
	}
}

impl Default for Codec {
	fn default() -> Codec {
		Codec::new()
	}
}

impl Decoder for Codec {
	type Item = Frame;
	type Error = Error;

	fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
		if src.len() < HEADER_LEN {
			return Ok(None);
		}
		let length = u32::from_be_bytes(src[0..4].try_into().unwrap());
		if length < 2 {
			return Err(ErrorKind::Offense(Offense::MsgLen, "frame shorter than type bytes".into()).into());
		}
		if length - 2 > self.max_frame_len {
			return Err(ErrorKind::Offense(Offense::MsgLen, format!("frame of {} bytes", length)).into());
		}
		let total = HEADER_LEN + (length - 2) as usize;
		if src.len() < total {
			src.reserve(total - src.len());
			return Ok(None);
		}

		let checksum = u32::from_be_bytes(src[4..8].try_into().unwrap());
		let type_hi = src[8];
		let type_lo = src[9];
		if type_hi != 0 {
			return Err(ErrorKind::Offense(Offense::MsgType, "reserved type byte set".into()).into());
		}
		let msg_type = MsgType::from_u8(type_lo)
			.ok_or_else(|| ErrorKind::Offense(Offense::MsgType, format!("unknown type {}", type_lo)))?;

		let payload = src[HEADER_LEN..total].to_vec();
		let expected = u32::from_be_bytes(frame_checksum(&payload));
		if expected != checksum {
			return Err(ErrorKind::Offense(Offense::Checksum, "frame checksum mismatch".into()).into());
		}
		if payload.len() as u32 > msg_type.max_len() {
			return Err(ErrorKind::Offense(Offense::MsgLen, "oversize for this message type".into()).into());
		}

		src.advance(total);
		Ok(Some(Frame { msg_type, payload }))
	}
}

impl Encoder<Frame> for Codec {
	type Error = Error;

	fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Error> {
		let length = (frame.payload.len() + 2) as u32;
		let checksum = u32::from_be_bytes(frame_checksum(&frame.payload));
		dst.reserve(HEADER_LEN + frame.payload.len());
		dst.put_u32(length);
		dst.put_u32(checksum);
		dst.put_u8(0);
		dst.put_u8(frame.msg_type as u8);
		dst.put_slice(&frame.payload);
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::msg::{Message, Ping};

	#[test]
	fn encodes_then_decodes_a_frame() {
		let mut codec = Codec::new();
		let msg = Message::Ping(Ping { nonce: 1, snapshot_priority: 0, max_addresses: 5, max_tx: 5 });
		let payload = msg.encode_payload().unwrap();
		let frame = Frame { msg_type: MsgType::Ping, payload };

		let mut buf = BytesMut::new();
		codec.encode(frame.clone(), &mut buf).unwrap();
		let decoded = codec.decode(&mut buf).unwrap().unwrap();
		assert_eq!(decoded.msg_type as u8, MsgType::Ping as u8);
		assert_eq!(decoded.payload, frame.payload);
	}

	#[test]
	fn rejects_bad_checksum() {
		let mut codec = Codec::new();
		let mut buf = BytesMut::new();
		buf.put_u32(4);
		buf.put_u32(0xDEAD_BEEF);
		buf.put_u8(0);
		buf.put_u8(MsgType::Ping as u8);
		buf.put_slice(&[1, 2]);
		assert!(codec.decode(&mut buf).is_err());
	}

	#[test]
	fn greeting_roundtrips() {
		let g = Greeting::ours(MAGIC_MAINNET_OUT);
		let bytes = g.encode();
		let g2 = Greeting::decode(&bytes);
		assert_eq!(g.magic, g2.magic);
		assert_eq!(g.version, g2.version);
	}
}
