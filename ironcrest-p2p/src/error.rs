//! Flat protocol-offense enumeration and the local faults/recoverable
//! errors that close a connection without banning. Every offense bans
//! by default except the handful explicitly carved out (bad checksum,
//! empty-but-not-expired reply, probe-descriptor mismatch).

use std::fmt;
use std::time::Duration;

use failure::{Backtrace, Context, Fail};

/// Top-level p2p error, carrying a backtrace via `failure::Context`.
#[derive(Debug, Fail)]
pub struct Error {
	inner: Context<ErrorKind>,
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&self.inner, f)
	}
}

impl Error {
	/// The error classification, without the backtrace.
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Error {
		Error { inner: Context::new(kind) }
	}
}

impl From<Context<ErrorKind>> for Error {
	fn from(inner: Context<ErrorKind>) -> Error {
		Error { inner }
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Error {
		ErrorKind::Io(e.to_string()).into()
	}
}

impl From<ironcrest_core::ser::Error> for Error {
	fn from(e: ironcrest_core::ser::Error) -> Error {
		ErrorKind::Offense(Offense::MsgIntegrity, e.to_string()).into()
	}
}

/// A protocol violation that, by default, both closes the offending
/// connection and bans its source IP for [`Offense::bantime`] seconds.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Offense {
	MsgType,
	MsgLen,
	Checksum,
	MsgFlood,
	NoBatch,
	BufferFull,
	BatchSize,
	HeaderLink,
	Pow,
	Timestamp,
	Difficulty,
	Handshake,
	Version,
	ReorgWork,
	Descriptor,
	MerkleRoot,
	NoBlock,
	Unrequested,
	IdNotReferenced,
	AddrPolicy,
	Balance,
	CorruptedSig,
	InvAccount,
	Timeout,
	Switching,
	DuplicateNonce,
	Dust,
	BlockSize,
	PinHeight,
	ClockTolerance,
	InvDescriptor,
	BadAppend,
	BadFork,
	NotFound,
	Empty,
	FakeHeight,
	FakeWork,
	BadMatch,
	BadMismatch,
	BadProbe,
	ProbeDescriptor,
	Restricted,
	NoPinHeight,
	BadLeader,
	LeaderMismatch,
	LowPriority,
	BadAddress,
	BadHeight,
	BadRollback,
	BlockRange,
	ForkHeight,
	ProbeHeight,
	BatchHeight,
	GridMismatch,
	MsgIntegrity,
	InvGrid,
	InvInitGrid,
	InvHeaderVec,
	InvBlockRepSize,
	InvTxReq,
	InvTxRep,
}

impl Offense {
	/// Whether this offense closes the connection and bans the peer's
	/// source IP by default. Checksum, empty-but-unexpired, and
	/// probe-descriptor mismatches are excluded because they're as
	/// plausibly caused by a race or a bug as by malice.
	pub fn leads_to_ban(self) -> bool {
		!matches!(self, Offense::Checksum | Offense::Empty | Offense::ProbeDescriptor)
	}

	/// How long the peer's source IP is banned once this offense bans at
	/// all. Bucketed by severity tier (see DESIGN.md): consensus-breaking
	/// violations ban for days, malformed-protocol violations for hours,
	/// ambiguous/rate-limit violations for minutes.
	pub fn bantime(self) -> Duration {
		use Offense::*;
		match self {
			Pow | MerkleRoot | Difficulty | HeaderLink | BadAppend | BadFork | ReorgWork | FakeHeight
			| FakeWork | GridMismatch | BadMismatch | CorruptedSig | Balance | DuplicateNonce => {
				Duration::from_secs(3 * 24 * 3600)
			}
			MsgType | MsgLen | BatchSize | Handshake | Version | Descriptor | Unrequested
			| IdNotReferenced | AddrPolicy | InvAccount | Switching | Dust | BlockSize | PinHeight
			| ClockTolerance | InvDescriptor | BadMatch | BadProbe | BadLeader | LeaderMismatch
			| BadAddress | BadHeight | BadRollback | BlockRange | ForkHeight | ProbeHeight
			| BatchHeight | MsgIntegrity | InvGrid | InvInitGrid | InvHeaderVec | InvBlockRepSize
			| InvTxReq | InvTxRep | NoPinHeight => Duration::from_secs(6 * 3600),
			MsgFlood | NoBatch | BufferFull | NoBlock | Timeout | Restricted | LowPriority => {
				Duration::from_secs(10 * 60)
			}
			Checksum | Empty | ProbeDescriptor | NotFound => Duration::from_secs(0),
		}
	}
}

impl fmt::Display for Offense {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{:?}", self)
	}
}

/// Every way a connection can be asked to close: a bannable offense, a
/// recoverable condition, or a purely local fault.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
	/// A protocol offense, carrying a human-readable detail.
	#[fail(display = "offense {}: {}", _0, _1)]
	Offense(Offense, String),
	/// Recoverable: peer has nothing to offer right now.
	#[fail(display = "not found")]
	NotFound,
	/// Recoverable: reply legitimately empty, request not yet expired.
	#[fail(display = "empty reply")]
	Empty,
	/// Recoverable: an outstanding request's timer expired.
	#[fail(display = "request timed out")]
	Timeout,
	/// Local fault: outbound send queue exceeded its byte cap.
	#[fail(display = "send buffer full")]
	BufferFull,
	/// Local fault: too many connections already open from this source IP.
	#[fail(display = "too many connections from this source")]
	MaxConnections,
	/// Local fault: already connected to this peer.
	#[fail(display = "duplicate connection")]
	DuplicateConnection,
	/// Underlying socket or io error, not attributable to the remote peer.
	#[fail(display = "io error: {}", _0)]
	Io(String),
}

impl Fail for ErrorKind {
	fn cause(&self) -> Option<&dyn Fail> {
		None
	}
	fn backtrace(&self) -> Option<&Backtrace> {
		None
	}
}

impl ErrorKind {
	/// Whether closing for this reason should also ban the connection's
	/// source IP.
	pub fn leads_to_ban(&self) -> bool {
		matches!(self, ErrorKind::Offense(o, _) if o.leads_to_ban())
	}

	/// The ban duration, zero if this error never bans.
	pub fn bantime(&self) -> Duration {
		match self {
			ErrorKind::Offense(o, _) if o.leads_to_ban() => o.bantime(),
			_ => Duration::from_secs(0),
		}
	}
}
