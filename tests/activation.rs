use escargot::CargoBuild;
use nix::fcntl::{fcntl, FcntlArg};
use sd_activation::SD_LISTEN_FDS_START;
use std::{
	io::{self, BufRead, BufReader, Read, Write},
	net::{Ipv4Addr, Shutdown, TcpListener, TcpStream},
	os::{
		fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
		unix::{
			net::UnixStream,
			process::CommandExt as _,
		},
	},
	path::PathBuf,
	process::{Child, Command, Output, Stdio},
};

const TEST_MSG_LEN: usize = 13;
const TEST_MSG: &[u8; TEST_MSG_LEN] = b"Hello, world!";
const TEST_MSG_MODIFIED: &[u8; TEST_MSG_LEN] = b"Ifmmp-!xpsme\"";

#[test]
fn listen_with_names() {
	let tcp = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
	let tcp_addr = tcp.local_addr().unwrap();
	let (unix, unix_peer) = UnixStream::pair().unwrap();

	let mut child = spawn_activated(
		&[tcp.as_raw_fd(), unix.as_raw_fd()],
		&["--fdname", "web", "--fdname", "control"],
		&[],
	);

	drop(tcp);
	drop(unix);

	assert_eq!(
		read_report(&mut child, 2),
		["3 web TcpListener", "4 control UnixStream"],
	);

	echo_incr_client(TcpStream::connect(tcp_addr).unwrap());
	echo_incr_client(unix_peer);
}

#[test]
fn listen_without_names() {
	let (a, a_peer) = UnixStream::pair().unwrap();
	let (b, b_peer) = UnixStream::pair().unwrap();

	let mut child = spawn_activated(
		&[a.as_raw_fd(), b.as_raw_fd()],
		&[],
		&["--no-names"],
	);

	drop(a);
	drop(b);

	assert_eq!(
		read_report(&mut child, 2),
		["3 /proc/self/fd/3 UnixStream", "4 /proc/self/fd/4 UnixStream"],
	);

	// The sockets must come back in the order they were passed.
	echo_incr_client(b_peer);
	echo_incr_client(a_peer);
}

#[test]
fn too_few_names() {
	let (a, _a_peer) = UnixStream::pair().unwrap();
	let (b, _b_peer) = UnixStream::pair().unwrap();

	let output = spawn_activated(
		&[a.as_raw_fd(), b.as_raw_fd()],
		&["--fdname", "only-one"],
		&[],
	).wait_with_output_taken();

	assert!(!output.status.success());
	assert_stderr_contains(&output, "expected 2, got 1");
}

#[test]
fn too_many_names() {
	let (a, _a_peer) = UnixStream::pair().unwrap();
	let (b, _b_peer) = UnixStream::pair().unwrap();

	let output = spawn_activated(
		&[a.as_raw_fd(), b.as_raw_fd()],
		&["--fdname", "a", "--fdname", "b", "--fdname", "c"],
		&[],
	).wait_with_output_taken();

	assert!(!output.status.success());
	assert_stderr_contains(&output, "expected 2, got 3");
}

#[test]
fn not_activated() {
	let output =
		Command::new(demo("echo_activated"))
		.env_remove("LISTEN_PID")
		.env_remove("LISTEN_FDS")
		.env_remove("LISTEN_FDNAMES")
		.stdin(Stdio::null())
		.output()
		.unwrap();

	assert!(!output.status.success());
	assert_stderr_contains(&output, "`LISTEN_PID` is missing");
}

#[test]
fn zero_sockets() {
	let mut child = spawn_activated(&[], &[], &[]);

	let output = child.wait_with_output_taken();

	assert!(output.status.success(), "{output:?}");
	assert!(output.stdout.is_empty());
}

/// Builds one of the demo programs, and returns the path to its executable.
fn demo(name: &str) -> PathBuf {
	CargoBuild::new()
	.example(name)
	.run()
	.unwrap()
	.path()
	.to_owned()
}

/// Runs `echo_activated` with the given `sockets` passed to it by the `activate` demo, the way systemd would pass them.
fn spawn_activated(
	sockets: &[RawFd],
	activate_args: &[&str],
	echo_args: &[&str],
) -> KillOnDrop {
	// Move the sockets well out of the way first, so that placing them at 3, 4, … in the child can't clobber one of them before it's placed.
	let parked: Vec<OwnedFd> =
		sockets.iter()
		.map(|fd| {
			let fd = fcntl(*fd, FcntlArg::F_DUPFD_CLOEXEC(100)).unwrap();
			unsafe { OwnedFd::from_raw_fd(fd) }
		})
		.collect();

	let raw: Vec<RawFd> = parked.iter().map(AsRawFd::as_raw_fd).collect();

	let mut command = Command::new(demo("activate"));

	command
	.arg("--fds")
	.arg(sockets.len().to_string())
	.args(activate_args)
	.arg("--")
	.arg(demo("echo_activated"))
	.args(echo_args)
	.stdin(Stdio::null())
	.stdout(Stdio::piped())
	.stderr(Stdio::piped());

	// Safety: `dup2` is async-signal-safe, and nothing here allocates.
	unsafe {
		command.pre_exec(move || {
			for (index, fd) in raw.iter().enumerate() {
				// `dup2` leaves close-on-exec unset on the new descriptor, which is just what the child needs.
				if nix::libc::dup2(*fd, SD_LISTEN_FDS_START + index as RawFd) == -1 {
					return Err(io::Error::last_os_error());
				}
			}

			Ok(())
		});
	}

	let child = KillOnDrop(command.spawn().unwrap());

	drop(parked);

	child
}

/// Reads the first `lines` lines that `echo_activated` prints, describing the sockets it adopted.
fn read_report(child: &mut KillOnDrop, lines: usize) -> Vec<String> {
	let stdout = child.stdout.take().unwrap();

	BufReader::new(stdout)
	.lines()
	.take(lines)
	.collect::<io::Result<_>>()
	.unwrap()
}

fn assert_stderr_contains(output: &Output, expected: &str) {
	let stderr = String::from_utf8_lossy(&output.stderr);

	assert!(
		stderr.contains(expected),
		"expected stderr to contain {expected:?}, but it was: {stderr}",
	);
}

/// Sends [`TEST_MSG`] and checks that it comes back with every byte incremented. Expects `socket` to already be connected to `echo_activated`.
fn echo_incr_client<S: Read + Write + ShutdownWrite>(mut socket: S) {
	let mut actual_input = [0u8; TEST_MSG_LEN];

	socket.write_all(TEST_MSG).unwrap();
	socket.flush().unwrap();
	socket.shutdown_write().unwrap();

	socket.read_exact(&mut actual_input).unwrap();

	assert_eq!(&actual_input, TEST_MSG_MODIFIED);
}

trait ShutdownWrite {
	fn shutdown_write(&self) -> io::Result<()>;
}

impl ShutdownWrite for TcpStream {
	fn shutdown_write(&self) -> io::Result<()> {
		self.shutdown(Shutdown::Write)
	}
}

impl ShutdownWrite for UnixStream {
	fn shutdown_write(&self) -> io::Result<()> {
		self.shutdown(Shutdown::Write)
	}
}

#[derive(derive_more::Deref, derive_more::DerefMut)]
struct KillOnDrop(Child);

impl KillOnDrop {
	/// Waits for the child to exit on its own, collecting its output.
	fn wait_with_output_taken(&mut self) -> Output {
		let mut stdout = Vec::new();
		let mut stderr = Vec::new();

		if let Some(mut pipe) = self.stdout.take() {
			pipe.read_to_end(&mut stdout).unwrap();
		}

		if let Some(mut pipe) = self.stderr.take() {
			pipe.read_to_end(&mut stderr).unwrap();
		}

		let status = self.wait().unwrap();

		Output { status, stdout, stderr }
	}
}

impl Drop for KillOnDrop {
	fn drop(&mut self) {
		let _ = self.0.kill();
		let _ = self.0.wait();
	}
}
