//! This library lets a program adopt the sockets that systemd passes to it through [socket activation](https://www.freedesktop.org/software/systemd/man/sd_listen_fds.html).
//!
//! With socket activation, the service manager opens and binds the sockets itself, then starts the program with those sockets already open, starting at file descriptor 3. The environment variables `LISTEN_PID`, `LISTEN_FDS`, and optionally `LISTEN_FDNAMES` tell the program how many sockets there are and what they're called.
//!
//!
//! # Usage
//!
//! The entry points of this library are [`listen`] and [`listen_with_names`], which decode those environment variables and return one [`Socket`] per passed file descriptor, in the order they were configured in the socket unit.
//!
//! A `Socket` can be converted into one of the [standard library][std]'s socket types using [`Socket::as_listener`], [`Socket::as_connection`], or [`Socket::as_packet_connection`]. Each of these returns an independent duplicate of the socket; the `Socket` itself stays open and usable.
#![cfg_attr(feature = "tokio", doc = r#" For non-blocking I/O with [`tokio`], the `convert` module includes [`AnyTokioListener`][crate::convert::AnyTokioListener], [`AnyTokioStream`][crate::convert::AnyTokioStream], and [`AnyTokioDatagram`][crate::convert::AnyTokioDatagram]."#)]
//!
//! ```no_run
//! use std::io::Write;
//!
//! # fn example_fn() -> std::io::Result<()> {
//! for socket in sd_activation::listen_with_names()? {
//! 	if socket.name() == "greeting" {
//! 		let listener = socket.as_listener()?;
//!
//! 		loop {
//! 			let mut connection = listener.accept()?;
//! 			connection.write_all(b"Hello, world!\n")?;
//! 		}
//! 	}
//! }
//! #
//! # Ok(())
//! # }
//! ```
//!
//! [`is_supervised`] checks whether systemd is the init system at all.
//!
//!
//! # Feature flags and platform support
//!
//! Socket activation is a Unix-only protocol, and so is this library.
#![cfg_attr(all(
	feature = "futures",
	feature = "tokio",
), doc = r#"

## Available feature flags

This library has the following feature flags:

* `futures`: Adds an implementation of [`futures::Stream`] for [`AnyTokioListener`][crate::convert::AnyTokioListener]. Only works if the `tokio` feature is also enabled; otherwise, this feature does nothing.
* `tokio`: Adds the utility types [`AnyTokioListener`][crate::convert::AnyTokioListener], [`AnyTokioStream`][crate::convert::AnyTokioStream], and [`AnyTokioDatagram`][crate::convert::AnyTokioDatagram].
"#)]
//!
//!
//! # Logging
//!
//! This library logs what it adopts through the [`log`] facade, at `debug` and `trace` level. It does not install a logger.

#![allow(clippy::tabs_in_doc_comments)] // This project uses tabs for indentation throughout, including in documentation examples.

#[cfg(not(unix))]
compile_error!("socket activation is only available on Unix-like platforms");

mod booted;
pub mod convert;
mod decode;
pub mod env;
pub mod errors;
mod listen;
mod socket;
#[cfg(test)] mod util;

pub use self::{
	booted::*,
	decode::*,
	errors::{ConversionError, ListenError},
	listen::*,
	socket::*,
};
