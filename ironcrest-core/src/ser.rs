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

//! Serialization and deserialization layer specialized for the fixed-width
//! binary wire formats used by headers, blocks, and peer messages. A
//! minimal subset of what `serde` gives us for free, kept separate because
//! wire layout here is bit-exact rather than self-describing.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Errors deriving from serializing or deserializing.
#[derive(Debug, Fail)]
pub enum Error {
	/// Wraps an io error produced when reading or writing
	#[fail(display = "IO error: {}", _0)]
	IOErr(String),
	/// Data wasn't in a consumable format
	#[fail(display = "corrupted data")]
	CorruptedData,
	/// A length-prefixed collection exceeded the allowed maximum
	#[fail(display = "oversized read: {}", _0)]
	TooLarge(String),
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::IOErr(e.to_string())
	}
}

/// Thin wrapper around `std::io::Write` providing the fixed-width
/// primitives the wire formats need.
pub struct BinWriter<'a> {
	sink: &'a mut dyn Write,
}

impl<'a> BinWriter<'a> {
	/// Wraps a `Write` sink.
	pub fn new(sink: &'a mut dyn Write) -> BinWriter<'a> {
		BinWriter { sink }
	}

	/// Writes a big-endian u8.
	pub fn write_u8(&mut self, n: u8) -> Result<(), Error> {
		Ok(self.sink.write_u8(n)?)
	}
	/// Writes a big-endian u32.
	pub fn write_u32(&mut self, n: u32) -> Result<(), Error> {
		Ok(self.sink.write_u32::<BigEndian>(n)?)
	}
	/// Writes a big-endian u64.
	pub fn write_u64(&mut self, n: u64) -> Result<(), Error> {
		Ok(self.sink.write_u64::<BigEndian>(n)?)
	}
	/// Writes raw bytes verbatim (caller knows the length at read time).
	pub fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		Ok(self.sink.write_all(bytes)?)
	}
	/// Writes a length-prefixed (u32) byte vector.
	pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.write_u32(bytes.len() as u32)?;
		self.write_fixed_bytes(bytes)
	}
}

/// Thin wrapper around `std::io::Read` providing the fixed-width
/// primitives the wire formats need.
pub struct BinReader<'a> {
	source: &'a mut dyn Read,
}

/// Largest length prefix this layer will honor before treating the stream
/// as corrupted; protects against allocating on attacker-controlled sizes.
pub const MAX_READ_LEN: u32 = 64_000_000;

impl<'a> BinReader<'a> {
	/// Wraps a `Read` source.
	pub fn new(source: &'a mut dyn Read) -> BinReader<'a> {
		BinReader { source }
	}

	/// Reads a big-endian u8.
	pub fn read_u8(&mut self) -> Result<u8, Error> {
		Ok(self.source.read_u8()?)
	}
	/// Reads a big-endian u32.
	pub fn read_u32(&mut self) -> Result<u32, Error> {
		Ok(self.source.read_u32::<BigEndian>()?)
	}
	/// Reads a big-endian u64.
	pub fn read_u64(&mut self) -> Result<u64, Error> {
		Ok(self.source.read_u64::<BigEndian>()?)
	}
	/// Reads exactly `len` bytes.
	pub fn read_fixed_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error> {
		let mut buf = vec![0u8; len];
		self.source.read_exact(&mut buf)?;
		Ok(buf)
	}
	/// Reads a length-prefixed (u32) byte vector, capped at [`MAX_READ_LEN`].
	pub fn read_bytes(&mut self) -> Result<Vec<u8>, Error> {
		let len = self.read_u32()?;
		if len > MAX_READ_LEN {
			return Err(Error::TooLarge(format!("{} bytes", len)));
		}
		self.read_fixed_bytes(len as usize)
	}
	/// Consumes a byte, failing unless it equals `expected`.
	pub fn expect_u8(&mut self, expected: u8) -> Result<(), Error> {
		let got = self.read_u8()?;
		if got != expected {
			return Err(Error::CorruptedData);
		}
		Ok(())
	}
}

/// Implemented by every type with a fixed binary wire encoding.
pub trait Writeable {
	/// Writes `self` to `writer`.
	fn write(&self, writer: &mut BinWriter) -> Result<(), Error>;
}

/// Implemented by every type with a fixed binary wire encoding.
pub trait Readable: Sized {
	/// Reads a `Self` from `reader`.
	fn read(reader: &mut BinReader) -> Result<Self, Error>;
}

/// Serializes a `Writeable` into a fresh `Vec<u8>`.
pub fn ser_vec<W: Writeable>(thing: &W) -> Result<Vec<u8>, Error> {
	let mut buf = vec![];
	{
		let mut writer = BinWriter::new(&mut buf);
		thing.write(&mut writer)?;
	}
	Ok(buf)
}

/// Deserializes a `Readable` from a byte slice. Errors if trailing bytes
/// remain for fixed-size types that are meant to consume the whole slice;
/// callers that expect a prefix should slice first.
pub fn deserialize<T: Readable>(bytes: &[u8]) -> Result<T, Error> {
	let mut source = bytes;
	let mut reader = BinReader::new(&mut source);
	T::read(&mut reader)
}
