use anyhow::Context as _;
use sd_activation::{
	convert::AnyStdStream,
	Socket,
};
use std::{
	io::{self, Read, Write},
	thread,
};

/// A simple echo server for socket activation. It lists the sockets it was passed, one per line, then echoes back all bytes received on each of them, incremented by one.
///
/// Listening sockets accept a single connection. Connected sockets are served directly.
#[derive(clap::Parser)]
struct CommandLine {
	/// Ignore `LISTEN_FDNAMES`, and name each socket after its file descriptor.
	#[arg(long)]
	no_names: bool,
}

fn main() -> anyhow::Result<()> {
	let command_line = <CommandLine as clap::Parser>::parse();

	let sockets: Vec<Socket> = {
		if command_line.no_names {
			sd_activation::listen()
		}
		else {
			sd_activation::listen_with_names()
		}
	}.context("couldn't adopt sockets")?;

	// Report what was passed, so that whoever started this process knows it's ready.
	{
		let mut stdout = io::stdout().lock();

		for socket in &sockets {
			let kind = socket.kind().context("couldn't check socket")?;
			writeln!(stdout, "{} {} {kind:?}", socket.descriptor(), socket.name())?;
		}

		stdout.flush()?;
	}

	thread::scope(|scope| {
		for socket in &sockets {
			scope.spawn(move || {
				if let Err(error) = serve(socket) {
					eprintln!("Error serving socket `{}`: {error:#}", socket.name());
				}
			});
		}
	});

	for socket in sockets {
		socket.close().context("couldn't close socket")?;
	}

	Ok(())
}

fn serve(socket: &Socket) -> anyhow::Result<()> {
	let connection: AnyStdStream = match socket.as_listener() {
		Ok(listener) => listener.accept().context("couldn't accept a connection")?,
		Err(_) => socket.as_connection().context("socket is neither a listener nor a connection")?,
	};

	echo(connection)
}

fn echo(mut connection: AnyStdStream) -> anyhow::Result<()> {
	let mut buf = [0u8; 1024];

	loop {
		// Read some bytes from the client.
		let bytes_read = connection.read(&mut buf).context("couldn't read from client")?;

		if bytes_read == 0 {
			break;
		}

		// Take a slice of the buffer, containing just the bytes that were read.
		let buf = &mut buf[..bytes_read];

		// Increment each byte by one.
		for byte in &mut *buf {
			*byte = byte.wrapping_add(1);
		}

		// Echo the bytes back.
		connection.write_all(buf).context("couldn't write to client")?;
	}

	Ok(())
}
