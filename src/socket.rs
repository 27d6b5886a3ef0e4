use crate::{
	convert::{
		self,
		AnyStdDatagram,
		AnyStdListener,
		AnyStdStream,
		Capability,
		SocketKind,
	},
	errors::ConversionError,
};
use std::{
	io,
	os::fd::{
		AsFd,
		AsRawFd,
		BorrowedFd,
		FromRawFd,
		IntoRawFd,
		RawFd,
	},
};

#[cfg(test)]
use {
	assert_matches::assert_matches,
	crate::util::TEST_SCRATCH,
	std::{
		fs::File,
		io::{Read, Write},
		net::{Ipv4Addr, TcpListener, TcpStream, UdpSocket},
		os::unix::net::{UnixDatagram, UnixListener, UnixStream},
	},
};

/// A socket passed to this process by the service manager.
///
/// A `Socket` exclusively owns its file descriptor. The descriptor is released by [`close`][Self::close], or when the `Socket` is dropped.
///
/// The conversion methods ([`as_listener`][Self::as_listener], [`as_connection`][Self::as_connection], and [`as_packet_connection`][Self::as_packet_connection]) each return a *duplicate* of the file descriptor. Closing the duplicate does not affect the `Socket`, and closing the `Socket` does not affect the duplicate.
#[derive(Debug)]
pub struct Socket {
	inner: socket2::Socket,
	name: String,
}

impl Socket {
	/// Takes ownership of `fd`.
	///
	/// # Safety
	///
	/// `fd` must be an open file descriptor that nothing else owns.
	pub(crate) unsafe fn from_raw_fd(fd: RawFd, name: String) -> Self {
		Self {
			inner: socket2::Socket::from_raw_fd(fd),
			name,
		}
	}

	/// The file descriptor number. It is valid only until this `Socket` is closed or dropped.
	pub fn descriptor(&self) -> RawFd {
		self.inner.as_raw_fd()
	}

	/// The name of this socket.
	///
	/// For sockets obtained from [`listen_with_names`][crate::listen_with_names], this is the name configured with `FileDescriptorName=` in the socket unit. Otherwise, it is a path of the form `/proc/self/fd/N`.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Closes the socket, reporting any error from the operating system.
	///
	/// Simply dropping a `Socket` also closes it, but any error is silently ignored.
	pub fn close(self) -> io::Result<()> {
		let fd: RawFd = self.inner.into_raw_fd();
		nix::unistd::close(fd)?;
		Ok(())
	}

	/// Classifies the socket, such as whether it is a TCP listener or a connected Unix-domain socket.
	pub fn kind(&self) -> Result<SocketKind, ConversionError> {
		SocketKind::of(&self.inner)
		.map_err(|error| ConversionError::Check { error })
	}

	/// Returns a copy of this socket as a stream listener.
	///
	/// # Errors
	///
	/// [`ConversionError::Inappropriate`] if the socket is not a listening TCP or Unix-domain stream socket.
	pub fn as_listener(&self) -> Result<AnyStdListener, ConversionError> {
		let (socket, kind) = self.duplicate(Capability::Listener)?;
		Ok(AnyStdListener::new(socket, kind))
	}

	/// Returns a copy of this socket as a connected stream.
	///
	/// # Errors
	///
	/// [`ConversionError::Inappropriate`] if the socket is not a connected TCP or Unix-domain stream socket.
	pub fn as_connection(&self) -> Result<AnyStdStream, ConversionError> {
		let (socket, kind) = self.duplicate(Capability::Connection)?;
		Ok(AnyStdStream::new(socket, kind))
	}

	/// Returns a copy of this socket as a datagram socket.
	///
	/// # Errors
	///
	/// [`ConversionError::Inappropriate`] if the socket is not a UDP or Unix-domain datagram socket.
	pub fn as_packet_connection(&self) -> Result<AnyStdDatagram, ConversionError> {
		let (socket, kind) = self.duplicate(Capability::PacketConnection)?;
		Ok(AnyStdDatagram::new(socket, kind))
	}

	/// Unwraps the underlying [`socket2::Socket`], without duplicating it.
	pub fn into_inner(self) -> socket2::Socket {
		self.inner
	}

	fn duplicate(&self, expected: Capability) -> Result<(socket2::Socket, SocketKind), ConversionError> {
		let kind: SocketKind = convert::check(&self.inner, expected)?;

		// `try_clone` sets close-on-exec on the new file descriptor.
		let socket: socket2::Socket =
			self.inner.try_clone()
			.map_err(|error| ConversionError::Duplicate { error })?;

		Ok((socket, kind))
	}
}

impl AsFd for Socket {
	fn as_fd(&self) -> BorrowedFd<'_> {
		self.inner.as_fd()
	}
}

impl AsRawFd for Socket {
	fn as_raw_fd(&self) -> RawFd {
		self.descriptor()
	}
}

impl From<Socket> for socket2::Socket {
	fn from(socket: Socket) -> Self {
		socket.into_inner()
	}
}

#[cfg(test)]
fn adopt(fd: impl IntoRawFd, name: &str) -> Socket {
	unsafe { Socket::from_raw_fd(fd.into_raw_fd(), name.to_owned()) }
}

#[test]
fn test_accessors_and_close() {
	let (a, _b) = UnixStream::pair().unwrap();

	// Park the socket far above the descriptors other tests allocate, so that nothing can reuse the number between the two closes below.
	let fd: RawFd = nix::fcntl::fcntl(
		a.as_raw_fd(),
		nix::fcntl::FcntlArg::F_DUPFD_CLOEXEC(900),
	).unwrap();
	drop(a);

	let socket = unsafe { Socket::from_raw_fd(fd, "fd3".to_owned()) };

	assert_eq!(socket.descriptor(), fd);
	assert_eq!(socket.as_raw_fd(), fd);
	assert_eq!(socket.name(), "fd3");

	socket.close().unwrap();

	// The descriptor is gone, so releasing it again must fail rather than silently succeed.
	assert_matches!(
		nix::unistd::close(fd),
		Err(nix::errno::Errno::EBADF)
	);
}

#[test]
fn test_as_listener() {
	let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
	let addr = listener.local_addr().unwrap();
	let socket = adopt(listener, "listener");

	assert_matches!(socket.kind(), Ok(SocketKind::TcpListener));

	let copy = socket.as_listener().unwrap();
	assert_matches!(copy, AnyStdListener::Tcp(_));
	assert_ne!(copy.as_raw_fd(), socket.descriptor());

	assert_matches!(
		socket.as_connection(),
		Err(ConversionError::Inappropriate {
			expected: Capability::Connection,
			actual: SocketKind::TcpListener,
		})
	);

	assert_matches!(
		socket.as_packet_connection(),
		Err(ConversionError::Inappropriate { expected: Capability::PacketConnection, .. })
	);

	// Closing the original must leave the copy usable.
	socket.close().unwrap();

	let _client = TcpStream::connect(addr).unwrap();
	let accepted = copy.accept().unwrap();
	assert_matches!(accepted, AnyStdStream::Tcp(_));
}

#[test]
fn test_as_unix_listener() {
	let path = TEST_SCRATCH.join("socket-unix-listener");
	let listener = UnixListener::bind(&path).unwrap();
	let socket = adopt(listener, "unix-listener");

	assert_matches!(socket.kind(), Ok(SocketKind::UnixListener));
	assert_matches!(
		socket.as_connection(),
		Err(ConversionError::Inappropriate { actual: SocketKind::UnixListener, .. })
	);

	let copy = socket.as_listener().unwrap();
	assert_matches!(copy, AnyStdListener::Unix(_));
	socket.close().unwrap();

	let mut client = UnixStream::connect(&path).unwrap();
	let mut accepted = copy.accept().unwrap();
	assert_matches!(accepted, AnyStdStream::Unix(_));

	client.write_all(b"ping").unwrap();
	let mut buf = [0u8; 4];
	accepted.read_exact(&mut buf).unwrap();
	assert_eq!(&buf, b"ping");
}

#[test]
fn test_as_connection() {
	let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
	let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
	let (mut server, _) = listener.accept().unwrap();

	let socket = adopt(client, "client");

	assert_matches!(socket.kind(), Ok(SocketKind::TcpStream));

	assert_matches!(
		socket.as_listener(),
		Err(ConversionError::Inappropriate { actual: SocketKind::TcpStream, .. })
	);

	// Closing a copy must leave the original usable.
	let copy = socket.as_connection().unwrap();
	assert_matches!(copy, AnyStdStream::Tcp(_));
	drop(copy);

	let mut conn = socket.as_connection().unwrap();
	conn.write_all(b"ping").unwrap();

	let mut buf = [0u8; 4];
	server.read_exact(&mut buf).unwrap();
	assert_eq!(&buf, b"ping");

	// Closing the original must leave the copy usable.
	socket.close().unwrap();

	server.write_all(b"pong").unwrap();
	conn.read_exact(&mut buf).unwrap();
	assert_eq!(&buf, b"pong");
}

#[test]
fn test_as_packet_connection() {
	let receiver = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
	let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
	sender.connect(receiver.local_addr().unwrap()).unwrap();

	let socket = adopt(sender, "udp");

	assert_matches!(
		socket.as_listener(),
		Err(ConversionError::Inappropriate { actual: SocketKind::UdpSocket, .. })
	);

	let copy = socket.as_packet_connection().unwrap();
	assert_matches!(copy, AnyStdDatagram::Udp(_));

	copy.send(b"datagram").unwrap();

	let mut buf = [0u8; 16];
	let len = receiver.recv(&mut buf).unwrap();
	assert_eq!(&buf[..len], b"datagram");

	let (a, b) = UnixDatagram::pair().unwrap();
	let socket = adopt(a, "unixgram");
	assert_matches!(socket.as_packet_connection(), Ok(AnyStdDatagram::Unix(_)));
	assert_matches!(socket.as_connection(), Err(ConversionError::Inappropriate { .. }));
	drop(b);
}

#[test]
fn test_round_trip() {
	let (a, b) = UnixStream::pair().unwrap();
	let writer = adopt(a, "writer");
	let reader = adopt(b, "reader");

	let test_msg: &[u8] = b"This test is totally sufficient\n";

	let mut w = writer.as_connection().unwrap();
	w.write_all(test_msg).unwrap();
	drop(w);
	writer.close().unwrap();

	let mut out = Vec::new();
	reader.as_connection().unwrap().read_to_end(&mut out).unwrap();
	assert_eq!(out, test_msg);
}

#[test]
fn test_not_a_socket() {
	let file = File::open("/dev/null").unwrap();
	let socket = adopt(file, "/dev/null");

	assert_matches!(socket.kind(), Ok(SocketKind::Other));
	assert_matches!(
		socket.as_connection(),
		Err(ConversionError::Inappropriate { actual: SocketKind::Other, .. })
	);
}
