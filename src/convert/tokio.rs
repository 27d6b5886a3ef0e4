use crate::{
	convert::{AnyStdDatagram, AnyStdListener, AnyStdStream},
	errors::IntoTokioError,
};
use pin_project::pin_project;
use socket2::SockAddr;
use std::{
	io,
	os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd},
	path::Path,
	pin::Pin,
	task,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

fn unix_sockaddr(addr: &tokio::net::unix::SocketAddr) -> io::Result<SockAddr> {
	SockAddr::unix(addr.as_pathname().unwrap_or(Path::new("")))
}

/// A [stream-type][socket2::Type::STREAM] listening socket, either TCP or Unix-domain, adapted for use with [`tokio`].
///
///
/// # Example
///
/// ```no_run
/// # use sd_activation::convert::{AnyTokioListener, AnyTokioStream};
/// # async fn example_fn() -> std::io::Result<()> {
/// let sockets = sd_activation::listen()?;
///
/// let listener: AnyTokioListener = sockets[0].as_listener()?.try_into()?;
///
/// loop {
/// 	let (connection, peer_addr): (AnyTokioStream, socket2::SockAddr) =
/// 		listener.accept().await?;
///
/// 	// …do something with the connection…
/// }
/// # }
/// ```
///
///
/// # Availability
///
/// Requires the `tokio` feature.
#[derive(Debug, derive_more::From)]
#[non_exhaustive]
pub enum AnyTokioListener {
	/// A TCP listening socket.
	Tcp(tokio::net::TcpListener),

	/// A Unix-domain listening socket.
	Unix(tokio::net::UnixListener),
}

impl AnyTokioListener {
	/// Accepts a new connection.
	pub async fn accept(&self) -> io::Result<(AnyTokioStream, SockAddr)> {
		match self {
			Self::Tcp(l) => {
				let (s, addr) = l.accept().await?;
				Ok((s.into(), addr.into()))
			}

			Self::Unix(l) => {
				let (s, addr) = l.accept().await?;
				Ok((s.into(), unix_sockaddr(&addr)?))
			}
		}
	}

	/// Polls to accept a new connection.
	pub fn poll_accept(&self, cx: &mut task::Context<'_>) -> task::Poll<io::Result<(AnyTokioStream, SockAddr)>> {
		match self {
			Self::Tcp(l) => l.poll_accept(cx).map_ok(|(s, addr)| (AnyTokioStream::from(s), SockAddr::from(addr))),

			Self::Unix(l) => l.poll_accept(cx).map(|result| -> io::Result<(AnyTokioStream, SockAddr)> {
				let (s, addr) = result?;
				Ok((s.into(), unix_sockaddr(&addr)?))
			}),
		}
	}

	/// Returns the local address that this listener is bound to.
	pub fn local_addr(&self) -> io::Result<SockAddr> {
		match self {
			Self::Tcp(l) => l.local_addr().map(SockAddr::from),
			Self::Unix(l) => unix_sockaddr(&l.local_addr()?),
		}
	}
}

impl TryFrom<AnyStdListener> for AnyTokioListener {
	type Error = IntoTokioError;

	fn try_from(listener: AnyStdListener) -> Result<Self, Self::Error> {
		listener.set_nonblocking(true)
		.map_err(|error| IntoTokioError::SetNonBlocking { error })?;

		match listener {
			AnyStdListener::Tcp(l) => tokio::net::TcpListener::from_std(l).map(Self::Tcp),
			AnyStdListener::Unix(l) => tokio::net::UnixListener::from_std(l).map(Self::Unix),
		}
		.map_err(|error| IntoTokioError::Wrap { error })
	}
}

#[cfg(feature = "futures")]
impl futures::Stream for AnyTokioListener {
	type Item = io::Result<AnyTokioStream>;

	fn poll_next(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Option<Self::Item>> {
		self.poll_accept(cx)
		.map_ok(|(s, _)| s)
		.map(Some)
	}
}

impl AsFd for AnyTokioListener {
	fn as_fd(&self) -> BorrowedFd<'_> {
		match self {
			Self::Tcp(l) => l.as_fd(),
			Self::Unix(l) => l.as_fd(),
		}
	}
}

impl AsRawFd for AnyTokioListener {
	fn as_raw_fd(&self) -> RawFd {
		match self {
			Self::Tcp(l) => l.as_raw_fd(),
			Self::Unix(l) => l.as_raw_fd(),
		}
	}
}

/// A connected [stream-type][socket2::Type::STREAM] socket, either TCP or Unix-domain, adapted for use with [`tokio`].
///
/// These are obtained from [`AnyTokioListener::accept`], or by converting an [`AnyStdStream`]. This type implements [`AsyncRead`] and [`AsyncWrite`].
///
///
/// # Availability
///
/// Requires the `tokio` feature.
#[derive(Debug, derive_more::From)]
#[pin_project(project = AnyTokioStreamProj)]
pub enum AnyTokioStream {
	/// A connected TCP socket.
	Tcp(#[pin] tokio::net::TcpStream),

	/// A connected Unix-domain stream socket.
	Unix(#[pin] tokio::net::UnixStream),
}

impl AnyTokioStream {
	/// Returns the remote address that this socket is connected to.
	pub fn peer_addr(&self) -> io::Result<SockAddr> {
		match self {
			Self::Tcp(s) => s.peer_addr().map(SockAddr::from),
			Self::Unix(s) => unix_sockaddr(&s.peer_addr()?),
		}
	}
}

impl AsyncRead for AnyTokioStream {
	fn poll_read(
		self: Pin<&mut Self>,
		cx: &mut task::Context,
		buf: &mut ReadBuf,
	) -> task::Poll<io::Result<()>> {
		match self.project() {
			AnyTokioStreamProj::Tcp(s) => s.poll_read(cx, buf),
			AnyTokioStreamProj::Unix(s) => s.poll_read(cx, buf),
		}
	}
}

impl AsyncWrite for AnyTokioStream {
	fn poll_write(
		self: Pin<&mut Self>,
		cx: &mut task::Context,
		buf: &[u8],
	) -> task::Poll<Result<usize, io::Error>> {
		match self.project() {
			AnyTokioStreamProj::Tcp(s) => s.poll_write(cx, buf),
			AnyTokioStreamProj::Unix(s) => s.poll_write(cx, buf),
		}
	}

	fn poll_flush(
		self: Pin<&mut Self>,
		cx: &mut task::Context,
	) -> task::Poll<Result<(), io::Error>> {
		match self.project() {
			AnyTokioStreamProj::Tcp(s) => s.poll_flush(cx),
			AnyTokioStreamProj::Unix(s) => s.poll_flush(cx),
		}
	}

	fn poll_shutdown(
		self: Pin<&mut Self>,
		cx: &mut task::Context,
	) -> task::Poll<Result<(), io::Error>> {
		match self.project() {
			AnyTokioStreamProj::Tcp(s) => s.poll_shutdown(cx),
			AnyTokioStreamProj::Unix(s) => s.poll_shutdown(cx),
		}
	}
}

impl TryFrom<AnyStdStream> for AnyTokioStream {
	type Error = IntoTokioError;

	fn try_from(stream: AnyStdStream) -> Result<Self, Self::Error> {
		stream.set_nonblocking(true)
		.map_err(|error| IntoTokioError::SetNonBlocking { error })?;

		match stream {
			AnyStdStream::Tcp(s) => tokio::net::TcpStream::from_std(s).map(Self::Tcp),
			AnyStdStream::Unix(s) => tokio::net::UnixStream::from_std(s).map(Self::Unix),
		}
		.map_err(|error| IntoTokioError::Wrap { error })
	}
}

impl AsFd for AnyTokioStream {
	fn as_fd(&self) -> BorrowedFd<'_> {
		match self {
			Self::Tcp(s) => s.as_fd(),
			Self::Unix(s) => s.as_fd(),
		}
	}
}

impl AsRawFd for AnyTokioStream {
	fn as_raw_fd(&self) -> RawFd {
		match self {
			Self::Tcp(s) => s.as_raw_fd(),
			Self::Unix(s) => s.as_raw_fd(),
		}
	}
}

/// A datagram socket, either UDP or Unix-domain, adapted for use with [`tokio`].
///
///
/// # Availability
///
/// Requires the `tokio` feature.
#[derive(Debug, derive_more::From)]
#[non_exhaustive]
pub enum AnyTokioDatagram {
	/// A UDP socket.
	Udp(tokio::net::UdpSocket),

	/// A Unix-domain datagram socket.
	Unix(tokio::net::UnixDatagram),
}

impl AnyTokioDatagram {
	/// Sends a datagram to the connected peer.
	pub async fn send(&self, buf: &[u8]) -> io::Result<usize> {
		match self {
			Self::Udp(s) => s.send(buf).await,
			Self::Unix(s) => s.send(buf).await,
		}
	}

	/// Receives a single datagram from the connected peer.
	pub async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
		match self {
			Self::Udp(s) => s.recv(buf).await,
			Self::Unix(s) => s.recv(buf).await,
		}
	}
}

impl TryFrom<AnyStdDatagram> for AnyTokioDatagram {
	type Error = IntoTokioError;

	fn try_from(socket: AnyStdDatagram) -> Result<Self, Self::Error> {
		socket.set_nonblocking(true)
		.map_err(|error| IntoTokioError::SetNonBlocking { error })?;

		match socket {
			AnyStdDatagram::Udp(s) => tokio::net::UdpSocket::from_std(s).map(Self::Udp),
			AnyStdDatagram::Unix(s) => tokio::net::UnixDatagram::from_std(s).map(Self::Unix),
		}
		.map_err(|error| IntoTokioError::Wrap { error })
	}
}

impl AsFd for AnyTokioDatagram {
	fn as_fd(&self) -> BorrowedFd<'_> {
		match self {
			Self::Udp(s) => s.as_fd(),
			Self::Unix(s) => s.as_fd(),
		}
	}
}

impl AsRawFd for AnyTokioDatagram {
	fn as_raw_fd(&self) -> RawFd {
		match self {
			Self::Udp(s) => s.as_raw_fd(),
			Self::Unix(s) => s.as_raw_fd(),
		}
	}
}

#[cfg(test)]
mod tests {
	use crate::convert::{AnyStdStream, AnyTokioListener, AnyTokioStream};
	use std::net::Ipv4Addr;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};

	#[tokio::test(flavor = "current_thread")]
	async fn accept_and_echo() {
		let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
		let addr = listener.local_addr().unwrap();

		let listener: AnyTokioListener = crate::convert::AnyStdListener::Tcp(listener).try_into().unwrap();

		let client = std::net::TcpStream::connect(addr).unwrap();
		let mut client: AnyTokioStream = AnyStdStream::Tcp(client).try_into().unwrap();

		let (mut server, _) = listener.accept().await.unwrap();

		client.write_all(b"Hello").await.unwrap();
		client.shutdown().await.unwrap();

		let mut buf = Vec::new();
		server.read_to_end(&mut buf).await.unwrap();
		assert_eq!(buf, b"Hello");
	}
}
