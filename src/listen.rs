use crate::{
	decode_count,
	decode_names,
	env::{Environment, ProcessEnvironment},
	errors::ListenError,
	Socket,
};
use log::{debug, trace};
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use std::{
	ops::Range,
	os::fd::RawFd,
};

#[cfg(test)]
use {
	assert_matches::assert_matches,
	crate::env::{LISTEN_FDNAMES, LISTEN_FDS, LISTEN_PID},
	std::{
		io::{Read, Write},
		os::{
			fd::{AsRawFd, OwnedFd, FromRawFd},
			unix::net::UnixStream,
		},
		process,
	},
};

/// The first file descriptor passed by the service manager. Descriptors 0 through 2 are the standard streams.
pub const SD_LISTEN_FDS_START: RawFd = 3;

/// The directory that unnamed sockets get their [names][Socket::name] from.
const PSEUDO_FD_DIR: &str = "/proc/self/fd";

/// Adopts the sockets passed by the service manager as part of socket activation.
///
/// The sockets are returned in the same order as they are configured in the socket unit, which is also ascending order of file descriptor number, starting from [`SD_LISTEN_FDS_START`]. Each one is named after its file descriptor, like `/proc/self/fd/3`.
///
/// The close-on-exec flag is set on every adopted file descriptor, so that they are not leaked into child processes.
///
/// If `LISTEN_FDS` is zero, an empty list is returned. The environment is never modified.
///
///
/// # Errors
///
/// Any error from [`decode_count`][crate::decode_count], or [`ListenError::CloseOnExec`] if one of the file descriptors isn't open. In case of error, no file descriptors are adopted, and none are closed.
///
/// Note that [`ListenError::MissingEnvironment`] means the process was not socket-activated at all. Callers that support being started directly may want to treat that as an empty list.
pub fn listen() -> Result<Vec<Socket>, ListenError> {
	listen_from(&ProcessEnvironment)
}

/// Like [`listen`], but also names each socket, using the names from `LISTEN_FDNAMES`.
///
/// Names are configured with `FileDescriptorName=` in the socket unit, and can be used to tell sockets apart without depending on their order.
///
///
/// # Errors
///
/// Same as [`listen`], plus any error from [`decode_names`][crate::decode_names].
pub fn listen_with_names() -> Result<Vec<Socket>, ListenError> {
	listen_with_names_from(&ProcessEnvironment)
}

/// Like [`listen`], but reads the environment variables from `env` instead of the process environment.
pub fn listen_from(env: &impl Environment) -> Result<Vec<Socket>, ListenError> {
	let count: usize = decode_count(env).map_err(not_activated)?;
	let block: Range<RawFd> = descriptor_block(SD_LISTEN_FDS_START, count);

	adopt(block.clone(), block.map(|fd| format!("{PSEUDO_FD_DIR}/{fd}")))
}

/// Like [`listen_with_names`], but reads the environment variables from `env` instead of the process environment.
pub fn listen_with_names_from(env: &impl Environment) -> Result<Vec<Socket>, ListenError> {
	let count: usize = decode_count(env).map_err(not_activated)?;

	if count == 0 {
		trace!("no sockets passed, so no names to decode");
		return Ok(Vec::new());
	}

	let names: Vec<String> = decode_names(env, count)?;

	adopt(descriptor_block(SD_LISTEN_FDS_START, count), names)
}

fn not_activated(error: ListenError) -> ListenError {
	trace!("no sockets adopted: {error}");
	error
}

fn descriptor_block(start: RawFd, count: usize) -> Range<RawFd> {
	// `decode_count` has already checked that this doesn't overflow.
	start..start + count as RawFd
}

/// Sets close-on-exec on each file descriptor in `block`, then takes ownership of them, naming them in order from `names`. Nothing is owned unless every descriptor is open.
///
/// `names` is only consumed once every descriptor has been checked, so a bogus count fails at the first closed descriptor without building anything.
fn adopt(block: Range<RawFd>, names: impl IntoIterator<Item = String>) -> Result<Vec<Socket>, ListenError> {
	if block.is_empty() {
		trace!("no sockets passed (`LISTEN_FDS` is zero or negative)");
		return Ok(Vec::new());
	}

	for fd in block.clone() {
		fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
		.map_err(|errno| ListenError::CloseOnExec {
			fd,
			error: errno.into(),
		})?;
	}

	let sockets: Vec<Socket> =
		block.zip(names)
		.map(|(fd, name)| {
			debug!("adopting socket-activated file descriptor {fd} ({name:?})");

			// Safety: the service manager handed this descriptor to us, and it has just been verified to be open.
			unsafe { Socket::from_raw_fd(fd, name) }
		})
		.collect();

	Ok(sockets)
}

/// Places a connected pair of Unix-domain sockets at `base` and `base + 1`, without close-on-exec, the way a service manager would pass them.
#[cfg(test)]
fn pass_socket_pair(base: RawFd) {
	let (a, b) = UnixStream::pair().unwrap();

	for (socket, expected) in [(a, base), (b, base + 1)] {
		let fd = fcntl(socket.as_raw_fd(), FcntlArg::F_DUPFD(expected)).unwrap();
		assert_eq!(fd, expected, "file descriptor {expected} is already in use");
	}
}

#[cfg(test)]
fn is_cloexec(fd: RawFd) -> bool {
	let flags = fcntl(fd, FcntlArg::F_GETFD).unwrap();
	FdFlag::from_bits_truncate(flags).contains(FdFlag::FD_CLOEXEC)
}

#[test]
fn test_adopt_block() {
	const BASE: RawFd = 600;

	pass_socket_pair(BASE);
	assert!(!is_cloexec(BASE));

	let block = descriptor_block(BASE, 2);
	let sockets = adopt(block.clone(), block.map(|fd| format!("{PSEUDO_FD_DIR}/{fd}"))).unwrap();

	assert_eq!(sockets.len(), 2);
	assert_eq!(sockets[0].descriptor(), BASE);
	assert_eq!(sockets[1].descriptor(), BASE + 1);
	assert_eq!(sockets[0].name(), "/proc/self/fd/600");
	assert_eq!(sockets[1].name(), "/proc/self/fd/601");
	assert!(is_cloexec(BASE));
	assert!(is_cloexec(BASE + 1));

	let test_msg: &[u8] = b"This test is totally sufficient\n";

	let mut w = sockets[1].as_connection().unwrap();
	w.write_all(test_msg).unwrap();
	drop(w);

	let mut sockets = sockets.into_iter();
	let reader = sockets.next().unwrap();
	sockets.next().unwrap().close().unwrap();

	let mut out = Vec::new();
	reader.as_connection().unwrap().read_to_end(&mut out).unwrap();
	assert_eq!(out, test_msg);
}

#[test]
fn test_adopt_named() {
	const BASE: RawFd = 610;

	pass_socket_pair(BASE);

	let names = vec!["rpc".to_owned(), "events".to_owned()];
	let sockets = adopt(descriptor_block(BASE, 2), names).unwrap();

	let names: Vec<&str> = sockets.iter().map(Socket::name).collect();
	assert_eq!(names, ["rpc", "events"]);
	assert_eq!(sockets[0].descriptor(), BASE);
	assert_eq!(sockets[1].descriptor(), BASE + 1);
}

#[test]
fn test_adopt_not_open() {
	const BASE: RawFd = 620;

	// Only the first descriptor is open. It must not be adopted, and so must not be closed either.
	let (a, _b) = UnixStream::pair().unwrap();
	let fd = fcntl(a.as_raw_fd(), FcntlArg::F_DUPFD(BASE)).unwrap();
	assert_eq!(fd, BASE);
	let first = unsafe { OwnedFd::from_raw_fd(fd) };

	assert_matches!(
		adopt(descriptor_block(BASE, 2), ["first".to_owned(), "second".to_owned()]),
		Err(ListenError::CloseOnExec { fd, .. })
		if fd == BASE + 1
	);

	assert_matches!(fcntl(first.as_raw_fd(), FcntlArg::F_GETFD), Ok(_));
}

#[test]
fn test_adopt_huge_block() {
	const BASE: RawFd = 630;

	// Nothing is open at `BASE`. Building a name for every claimed descriptor up front would exhaust memory long before the first one is checked.
	let block = descriptor_block(BASE, (RawFd::MAX - BASE) as usize);
	assert_eq!(block.end, RawFd::MAX);

	let names = block.clone().map(|_| -> String { panic!("names must not be built before every descriptor is checked") });

	assert_matches!(
		adopt(block, names),
		Err(ListenError::CloseOnExec { fd, .. })
		if fd == BASE
	);
}

#[test]
fn test_listen_not_activated() {
	let pid = process::id().to_string();

	assert_matches!(
		listen_from(&[(LISTEN_FDS, "2")]),
		Err(ListenError::MissingEnvironment)
	);

	assert_matches!(
		listen_from(&[(LISTEN_PID, "1"), (LISTEN_FDS, "2")]),
		Err(ListenError::IdentityMismatch { .. })
	);

	assert_matches!(
		listen_from(&[(LISTEN_PID, pid.as_str())]),
		Err(ListenError::InvalidCount { .. })
	);

	assert_matches!(
		listen_from(&[(LISTEN_PID, pid.as_str()), (LISTEN_FDS, "0")]),
		Ok(sockets) if sockets.is_empty()
	);

	assert_matches!(
		listen_from(&[(LISTEN_PID, pid.as_str()), (LISTEN_FDS, "-1")]),
		Ok(sockets) if sockets.is_empty()
	);
}

#[test]
fn test_listen_with_names_not_activated() {
	let pid = process::id().to_string();

	assert_matches!(
		listen_with_names_from(&[(LISTEN_FDS, "2"), (LISTEN_FDNAMES, "a:b")]),
		Err(ListenError::MissingEnvironment)
	);

	// No names are needed when there are no sockets.
	assert_matches!(
		listen_with_names_from(&[(LISTEN_PID, pid.as_str()), (LISTEN_FDS, "0")]),
		Ok(sockets) if sockets.is_empty()
	);

	// Name errors are detected before any file descriptor is touched.
	assert_matches!(
		listen_with_names_from(&[(LISTEN_PID, pid.as_str()), (LISTEN_FDS, "2")]),
		Err(ListenError::MissingNames)
	);

	assert_matches!(
		listen_with_names_from(&[(LISTEN_PID, pid.as_str()), (LISTEN_FDS, "2"), (LISTEN_FDNAMES, "a")]),
		Err(ListenError::NameCountMismatch { expected: 2, actual: 1 })
	);

	assert_matches!(
		listen_with_names_from(&[(LISTEN_PID, pid.as_str()), (LISTEN_FDS, "2"), (LISTEN_FDNAMES, "a:b:c")]),
		Err(ListenError::NameCountMismatch { expected: 2, actual: 3 })
	);
}
