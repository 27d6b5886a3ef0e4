//! Conversion of adopted sockets to [standard library][std] socket types, such as [`std::net::TcpListener`].

use cfg_if::cfg_if;
use crate::errors::ConversionError;
use socket2::Socket;
use std::{
	fmt::{self, Display, Formatter},
	io,
	os::{
		fd::{AsFd, AsRawFd, BorrowedFd, RawFd},
		unix::net::{UnixDatagram, UnixListener, UnixStream},
	},
	net::{TcpListener, TcpStream, UdpSocket},
};

cfg_if! {
	if #[cfg(feature = "tokio")] {
		mod tokio;
		pub use self::tokio::*;
	}
}

/// What a socket is going to be used as. Each capability corresponds to one of the conversion methods on [`Socket`][crate::Socket].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Capability {
	/// A stream listener. See [`Socket::as_listener`][crate::Socket::as_listener].
	Listener,

	/// A connected stream. See [`Socket::as_connection`][crate::Socket::as_connection].
	Connection,

	/// A datagram socket. See [`Socket::as_packet_connection`][crate::Socket::as_packet_connection].
	PacketConnection,
}

impl Display for Capability {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Listener => "a stream listener",
			Self::Connection => "a stream connection",
			Self::PacketConnection => "a packet connection",
		})
	}
}

/// What kind of socket a file descriptor turned out to be.
///
/// # Stream socket handling
///
/// For [stream-type][socket2::Type::STREAM] sockets, it is checked whether the socket is listening and whether it is connected. Sockets that are neither are classified as [`Other`][SocketKind::Other].
///
/// **Warning:** On platforms other than AIX, Android, FreeBSD, Fuchsia, and Linux, it is not possible to check whether a socket is listening. It is therefore **assumed** on such platforms that a non-connected stream socket is a listening socket.
///
///
/// # Transport protocol checking
///
/// On Android, FreeBSD, Fuchsia, and Linux, the transport protocol of Internet-domain sockets is checked, so that (for example) an SCTP stream socket is not mistaken for TCP. On other platforms, IPv4/IPv6 stream and datagram sockets are **assumed** to be TCP and UDP, respectively.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum SocketKind {
	/// A TCP listening socket.
	TcpListener,

	/// A connected TCP socket.
	TcpStream,

	/// A UDP socket.
	UdpSocket,

	/// A Unix-domain [stream-type][socket2::Type::STREAM] listening socket.
	UnixListener,

	/// A connected Unix-domain [stream-type][socket2::Type::STREAM] socket.
	UnixStream,

	/// A Unix-domain datagram socket.
	UnixDatagram,

	/// Anything else, including file descriptors that aren't sockets at all.
	Other,
}

impl SocketKind {
	/// Checks whether a socket of this kind can be used as `capability`.
	pub fn supports(self, capability: Capability) -> bool {
		matches!(
			(capability, self),
			| (Capability::Listener, Self::TcpListener | Self::UnixListener)
			| (Capability::Connection, Self::TcpStream | Self::UnixStream)
			| (Capability::PacketConnection, Self::UdpSocket | Self::UnixDatagram)
		)
	}

	/// Classifies the given socket.
	pub(crate) fn of(socket: &Socket) -> io::Result<Self> {
		let address: socket2::SockAddr = match socket.local_addr() {
			Ok(address) => address,

			// Not a socket at all, such as a pipe.
			Err(error) if error.raw_os_error() == Some(nix::libc::ENOTSOCK) => return Ok(Self::Other),

			Err(error) => return Err(error),
		};

		let domain: socket2::Domain = address.domain();
		let r#type: socket2::Type = socket.r#type()?;

		cfg_if! {
			if #[cfg(any(
				target_os = "android",
				target_os = "freebsd",
				target_os = "fuchsia",
				target_os = "linux",
			))] {
				let protocol: Option<socket2::Protocol> = socket.protocol()?;
			}
			else {
				let protocol: Option<socket2::Protocol> = None;
			}
		}

		cfg_if! {
			if #[cfg(any(
				target_os = "aix",
				target_os = "android",
				target_os = "freebsd",
				target_os = "fuchsia",
				target_os = "linux",
			))] {
				let is_listening: Option<bool> = Some(socket.is_listener()?);
			}
			else {
				let is_listening: Option<bool> = None;
			}
		}

		let is_connected: bool = {
			if
				r#type != socket2::Type::STREAM ||
				is_listening == Some(true)
			{
				false
			}
			else { match socket.peer_addr() {
				Ok(_) => true,

				Err(error) if error.kind() == io::ErrorKind::NotConnected => false,

				Err(error) => return Err(error),
			}}
		};

		let is_inet: bool = domain == socket2::Domain::IPV4 || domain == socket2::Domain::IPV6;

		Ok(match (is_inet, domain, r#type, protocol, is_listening, is_connected) {
			| (true, _, socket2::Type::STREAM, None | Some(socket2::Protocol::TCP), None | Some(true), false)
			=> Self::TcpListener,

			| (true, _, socket2::Type::STREAM, None | Some(socket2::Protocol::TCP), None | Some(false), true)
			=> Self::TcpStream,

			| (true, _, socket2::Type::DGRAM, None | Some(socket2::Protocol::UDP), _, _)
			=> Self::UdpSocket,

			| (false, socket2::Domain::UNIX, socket2::Type::STREAM, _, None | Some(true), false)
			=> Self::UnixListener,

			| (false, socket2::Domain::UNIX, socket2::Type::STREAM, _, _, true)
			=> Self::UnixStream,

			| (false, socket2::Domain::UNIX, socket2::Type::DGRAM, _, _, _)
			=> Self::UnixDatagram,

			_ => Self::Other,
		})
	}
}

impl Display for SocketKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::TcpListener => "a TCP listener",
			Self::TcpStream => "a connected TCP socket",
			Self::UdpSocket => "a UDP socket",
			Self::UnixListener => "a Unix-domain listener",
			Self::UnixStream => "a connected Unix-domain stream socket",
			Self::UnixDatagram => "a Unix-domain datagram socket",
			Self::Other => "an unsupported kind of socket",
		})
	}
}

/// Checks that `socket` has the given capability, and classifies it.
pub(crate) fn check(socket: &Socket, expected: Capability) -> Result<SocketKind, ConversionError> {
	let actual: SocketKind =
		SocketKind::of(socket)
		.map_err(|error| ConversionError::Check { error })?;

	if actual.supports(expected) {
		Ok(actual)
	}
	else {
		Err(ConversionError::Inappropriate { expected, actual })
	}
}

/// A [stream-type][socket2::Type::STREAM] listening socket, either TCP or Unix-domain. Produced by [`Socket::as_listener`][crate::Socket::as_listener].
#[derive(Debug, derive_more::From)]
#[non_exhaustive]
pub enum AnyStdListener {
	/// A TCP listening socket.
	Tcp(TcpListener),

	/// A Unix-domain listening socket.
	Unix(UnixListener),
}

impl AnyStdListener {
	pub(crate) fn new(socket: Socket, kind: SocketKind) -> Self {
		match kind {
			SocketKind::UnixListener => Self::Unix(socket.into()),
			_ => Self::Tcp(socket.into()),
		}
	}

	/// Accepts a new connection, blocking until one arrives.
	pub fn accept(&self) -> io::Result<AnyStdStream> {
		match self {
			Self::Tcp(l) => l.accept().map(|(s, _)| s.into()),
			Self::Unix(l) => l.accept().map(|(s, _)| s.into()),
		}
	}

	/// Moves this listener into or out of non-blocking mode.
	pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
		match self {
			Self::Tcp(l) => l.set_nonblocking(nonblocking),
			Self::Unix(l) => l.set_nonblocking(nonblocking),
		}
	}
}

/// A connected [stream-type][socket2::Type::STREAM] socket, either TCP or Unix-domain. Produced by [`Socket::as_connection`][crate::Socket::as_connection] and [`AnyStdListener::accept`].
#[derive(Debug, derive_more::From)]
#[non_exhaustive]
pub enum AnyStdStream {
	/// A connected TCP socket.
	Tcp(TcpStream),

	/// A connected Unix-domain stream socket.
	Unix(UnixStream),
}

impl AnyStdStream {
	pub(crate) fn new(socket: Socket, kind: SocketKind) -> Self {
		match kind {
			SocketKind::UnixStream => Self::Unix(socket.into()),
			_ => Self::Tcp(socket.into()),
		}
	}

	/// Shuts down the read half, write half, or both halves of this connection.
	pub fn shutdown(&self, how: std::net::Shutdown) -> io::Result<()> {
		match self {
			Self::Tcp(s) => s.shutdown(how),
			Self::Unix(s) => s.shutdown(how),
		}
	}

	/// Moves this connection into or out of non-blocking mode.
	pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
		match self {
			Self::Tcp(s) => s.set_nonblocking(nonblocking),
			Self::Unix(s) => s.set_nonblocking(nonblocking),
		}
	}
}

impl io::Read for AnyStdStream {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		match self {
			Self::Tcp(s) => io::Read::read(s, buf),
			Self::Unix(s) => io::Read::read(s, buf),
		}
	}
}

impl io::Write for AnyStdStream {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self {
			Self::Tcp(s) => io::Write::write(s, buf),
			Self::Unix(s) => io::Write::write(s, buf),
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self {
			Self::Tcp(s) => io::Write::flush(s),
			Self::Unix(s) => io::Write::flush(s),
		}
	}
}

/// A datagram socket, either UDP or Unix-domain. Produced by [`Socket::as_packet_connection`][crate::Socket::as_packet_connection].
#[derive(Debug, derive_more::From)]
#[non_exhaustive]
pub enum AnyStdDatagram {
	/// A UDP socket.
	Udp(UdpSocket),

	/// A Unix-domain datagram socket.
	Unix(UnixDatagram),
}

impl AnyStdDatagram {
	pub(crate) fn new(socket: Socket, kind: SocketKind) -> Self {
		match kind {
			SocketKind::UnixDatagram => Self::Unix(socket.into()),
			_ => Self::Udp(socket.into()),
		}
	}

	/// Sends a datagram to the connected peer.
	pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
		match self {
			Self::Udp(s) => s.send(buf),
			Self::Unix(s) => s.send(buf),
		}
	}

	/// Receives a single datagram.
	pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
		match self {
			Self::Udp(s) => s.recv(buf),
			Self::Unix(s) => s.recv(buf),
		}
	}

	/// Moves this socket into or out of non-blocking mode.
	pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
		match self {
			Self::Udp(s) => s.set_nonblocking(nonblocking),
			Self::Unix(s) => s.set_nonblocking(nonblocking),
		}
	}
}

macro_rules! impl_fd_traits {
	($($t:ident),*) => {$(
		impl AsFd for $t {
			fn as_fd(&self) -> BorrowedFd<'_> {
				match self {
					Self::Tcp(s) => s.as_fd(),
					Self::Unix(s) => s.as_fd(),
				}
			}
		}

		impl AsRawFd for $t {
			fn as_raw_fd(&self) -> RawFd {
				match self {
					Self::Tcp(s) => s.as_raw_fd(),
					Self::Unix(s) => s.as_raw_fd(),
				}
			}
		}

		impl From<$t> for Socket {
			fn from(socket: $t) -> Self {
				match socket {
					$t::Tcp(s) => s.into(),
					$t::Unix(s) => s.into(),
				}
			}
		}
	)*};
}

impl_fd_traits!(AnyStdListener, AnyStdStream);

impl AsFd for AnyStdDatagram {
	fn as_fd(&self) -> BorrowedFd<'_> {
		match self {
			Self::Udp(s) => s.as_fd(),
			Self::Unix(s) => s.as_fd(),
		}
	}
}

impl AsRawFd for AnyStdDatagram {
	fn as_raw_fd(&self) -> RawFd {
		match self {
			Self::Udp(s) => s.as_raw_fd(),
			Self::Unix(s) => s.as_raw_fd(),
		}
	}
}

impl From<AnyStdDatagram> for Socket {
	fn from(socket: AnyStdDatagram) -> Self {
		match socket {
			AnyStdDatagram::Udp(s) => s.into(),
			AnyStdDatagram::Unix(s) => s.into(),
		}
	}
}

#[test]
fn test_supports() {
	assert!(SocketKind::TcpListener.supports(Capability::Listener));
	assert!(SocketKind::UnixListener.supports(Capability::Listener));
	assert!(!SocketKind::TcpListener.supports(Capability::Connection));

	assert!(SocketKind::UnixStream.supports(Capability::Connection));
	assert!(!SocketKind::UnixStream.supports(Capability::PacketConnection));

	assert!(SocketKind::UdpSocket.supports(Capability::PacketConnection));
	assert!(SocketKind::UnixDatagram.supports(Capability::PacketConnection));

	for capability in [Capability::Listener, Capability::Connection, Capability::PacketConnection] {
		assert!(!SocketKind::Other.supports(capability));
	}
}
