use anyhow::Context as _;
use sd_activation::env::{LISTEN_FDNAMES, LISTEN_FDS, LISTEN_PID};
use std::{
	ffi::OsString,
	os::unix::process::CommandExt as _,
	process::{self, Command},
};

/// Runs a program as if it had been socket-activated by systemd, much like `systemd-socket-activate`.
///
/// The sockets must already be open, starting at file descriptor 3, and must not have the close-on-exec flag set. This program sets `LISTEN_PID`, `LISTEN_FDS`, and `LISTEN_FDNAMES`, then replaces itself with the given program, which therefore gets the same process ID.
#[derive(clap::Parser)]
struct CommandLine {
	/// Number of sockets passed, starting at file descriptor 3.
	#[arg(long)]
	fds: u32,

	/// Name of a passed socket. Give this once per socket, in order.
	#[arg(long = "fdname")]
	fdnames: Vec<String>,

	/// The program to run, followed by its arguments.
	#[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
	command: Vec<OsString>,
}

fn main() -> anyhow::Result<()> {
	let command_line = <CommandLine as clap::Parser>::parse();

	let (program, args) =
		command_line.command.split_first()
		.context("no program given")?;

	let mut command = Command::new(program);

	command
	.args(args)
	.env(LISTEN_PID, process::id().to_string())
	.env(LISTEN_FDS, command_line.fds.to_string());

	if command_line.fdnames.is_empty() {
		command.env_remove(LISTEN_FDNAMES);
	}
	else {
		command.env(LISTEN_FDNAMES, command_line.fdnames.join(":"));
	}

	// `exec` only returns if it fails.
	let error = command.exec();

	Err(error).with_context(|| format!("couldn't execute `{}`", program.to_string_lossy()))
}
