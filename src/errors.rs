//! Various errors that can be raised by this library.

use crate::convert::{Capability, SocketKind};
use std::{
	io,
	num::ParseIntError,
	os::fd::RawFd,
};

#[cfg(doc)]
use crate::{
	decode_count,
	decode_names,
	listen,
	listen_with_names,
	Socket,
};

#[cfg(all(doc, feature = "tokio"))]
use crate::convert::{AnyTokioDatagram, AnyTokioListener, AnyTokioStream};

/// An error that occurred in decoding the socket activation environment, or in adopting the sockets it describes.
///
/// Raised by [`listen`], [`listen_with_names`], [`decode_count`], and [`decode_names`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ListenError {
	/// `LISTEN_PID` is not set, or is empty.
	///
	/// This is what happens when the process was started directly rather than by a service manager. Callers that want to treat that case as “no sockets” can match on this variant.
	#[error("socket activation environment not set (`LISTEN_PID` is missing)")]
	MissingEnvironment,

	/// `LISTEN_PID` is not a valid process ID.
	#[error("invalid `LISTEN_PID`: {error}")]
	#[non_exhaustive]
	InvalidIdentity {
		#[source]
		error: ParseIntError,
	},

	/// `LISTEN_PID` names some other process.
	///
	/// This usually means that the environment was inherited through an intermediate process that did not consume it.
	#[error("`LISTEN_PID` does not match (expected process {expected}; this is process {actual})")]
	#[non_exhaustive]
	IdentityMismatch {
		/// The process ID in `LISTEN_PID`.
		expected: u32,

		/// The ID of the current process.
		actual: u32,
	},

	/// `LISTEN_FDS` is missing or is not a valid integer.
	#[error("invalid number of file descriptors in `LISTEN_FDS`: {error}")]
	#[non_exhaustive]
	InvalidCount {
		#[source]
		error: ParseIntError,
	},

	/// `LISTEN_FDS` is a valid integer, but so large that the passed file descriptor numbers would overflow.
	#[error("`LISTEN_FDS` is out of range: {count}")]
	#[non_exhaustive]
	CountOutOfRange {
		/// The value of `LISTEN_FDS`.
		count: RawFd,
	},

	/// Socket names were requested, but `LISTEN_FDNAMES` is not set, or is empty.
	#[error("socket names not set (`LISTEN_FDNAMES` is missing)")]
	MissingNames,

	/// `LISTEN_FDNAMES` does not contain exactly one name per passed socket.
	#[error("mismatch between number of sockets and socket names: expected {expected}, got {actual}")]
	#[non_exhaustive]
	NameCountMismatch {
		/// The number of sockets, according to `LISTEN_FDS`.
		expected: usize,

		/// The number of colon-separated fields in `LISTEN_FDNAMES`.
		actual: usize,
	},

	/// The close-on-exec flag could not be set on a passed file descriptor. Most likely, the descriptor isn't open, despite what `LISTEN_FDS` says.
	#[error("couldn't set close-on-exec on inherited file descriptor {fd}: {error}")]
	#[non_exhaustive]
	CloseOnExec {
		/// The file descriptor in question.
		fd: RawFd,

		#[source]
		error: io::Error,
	},
}

impl From<ListenError> for io::Error {
	fn from(error: ListenError) -> Self {
		use io::ErrorKind as EK;

		let kind = match &error {
			ListenError::MissingEnvironment          => EK::NotFound    ,
			ListenError::MissingNames                => EK::NotFound    ,
			ListenError::IdentityMismatch { .. }     => EK::InvalidInput,
			ListenError::InvalidIdentity { .. }      => EK::InvalidData ,
			ListenError::InvalidCount { .. }         => EK::InvalidData ,
			ListenError::CountOutOfRange { .. }      => EK::InvalidData ,
			ListenError::NameCountMismatch { .. }    => EK::InvalidData ,
			ListenError::CloseOnExec { error, .. }   => error.kind(),
		};

		io::Error::new(kind, error)
	}
}

/// An error in converting a [`Socket`] to a listener, connection, or packet connection.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConversionError {
	/// The socket doesn't have the requested capability. This happens when calling [`Socket::as_listener`] on a UDP socket, for example.
	#[error("socket cannot be used as {expected} (it is {actual})")]
	#[non_exhaustive]
	Inappropriate {
		/// What the socket was supposed to be usable as.
		expected: Capability,

		/// What the socket actually is.
		actual: SocketKind,
	},

	/// There was an error checking details about the socket, such as its [type][socket2::Type] and whether it is listening.
	#[error("couldn't get socket details: {error}")]
	#[non_exhaustive]
	Check {
		#[source]
		error: io::Error,
	},

	/// The file descriptor could not be duplicated.
	#[error("couldn't duplicate the socket's file descriptor: {error}")]
	#[non_exhaustive]
	Duplicate {
		#[source]
		error: io::Error,
	},
}

impl From<ConversionError> for io::Error {
	fn from(error: ConversionError) -> Self {
		let kind = match &error {
			ConversionError::Inappropriate { .. } => io::ErrorKind::InvalidInput,

			| ConversionError::Check { error }
			| ConversionError::Duplicate { error }
			=> error.kind(),
		};

		io::Error::new(kind, error)
	}
}

/// The errors that can occur in setting up a socket for use with Tokio.
///
/// This error type can be raised when converting to [`AnyTokioListener`], [`AnyTokioStream`], or [`AnyTokioDatagram`].
///
/// # Availability
///
/// Requires the `tokio` feature.
#[cfg(feature = "tokio")]
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum IntoTokioError {
	/// There was an error setting non-blocking mode on the socket.
	#[error("couldn't set non-blocking mode on socket: {error}")]
	#[non_exhaustive]
	SetNonBlocking {
		#[source]
		error: io::Error,
	},

	/// An error was raised by one of the Tokio socket type conversion methods, like [`tokio::net::TcpListener::from_std`].
	#[error("error passing the socket to Tokio: {error}")]
	#[non_exhaustive]
	Wrap {
		#[source]
		error: io::Error,
	},
}

#[cfg(feature = "tokio")]
impl From<IntoTokioError> for io::Error {
	fn from(error: IntoTokioError) -> Self {
		let kind = match &error {
			| IntoTokioError::SetNonBlocking { error }
			| IntoTokioError::Wrap { error }
			=> error.kind(),
		};

		io::Error::new(kind, error)
	}
}

#[test]
fn test_name_count_mismatch_message() {
	let error = ListenError::NameCountMismatch { expected: 2, actual: 3 };

	assert_eq!(
		error.to_string(),
		"mismatch between number of sockets and socket names: expected 2, got 3",
	);

	assert_eq!(io::Error::from(error).kind(), io::ErrorKind::InvalidData);
}
