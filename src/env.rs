use std::{
	collections::{BTreeMap, HashMap},
	env,
};

/// Name of the environment variable holding the process ID that the service manager meant to pass sockets to.
pub const LISTEN_PID: &str = "LISTEN_PID";

/// Name of the environment variable holding the number of passed sockets.
pub const LISTEN_FDS: &str = "LISTEN_FDS";

/// Name of the environment variable holding the colon-separated socket names, as configured with `FileDescriptorName=` in the socket unit.
pub const LISTEN_FDNAMES: &str = "LISTEN_FDNAMES";

/// A source of environment variables for decoding the socket activation handshake.
///
/// [`ProcessEnvironment`] reads the real process environment. The other implementations exist so that the handshake can be decoded from a fixture, without touching process-wide state.
pub trait Environment {
	/// Looks up a variable. Returns `None` if it is not set or its value is not valid Unicode.
	fn var(&self, key: &str) -> Option<String>;
}

/// The environment of the current process.
///
/// This is read-only. Nothing in this library ever sets or removes an environment variable.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
	fn var(&self, key: &str) -> Option<String> {
		env::var(key).ok()
	}
}

impl<E: Environment + ?Sized> Environment for &E {
	fn var(&self, key: &str) -> Option<String> {
		(**self).var(key)
	}
}

impl<S: std::hash::BuildHasher> Environment for HashMap<String, String, S> {
	fn var(&self, key: &str) -> Option<String> {
		self.get(key).cloned()
	}
}

impl Environment for BTreeMap<String, String> {
	fn var(&self, key: &str) -> Option<String> {
		self.get(key).cloned()
	}
}

impl Environment for [(&str, &str)] {
	fn var(&self, key: &str) -> Option<String> {
		self.iter()
		.rev()
		.find(|(k, _)| *k == key)
		.map(|(_, v)| (*v).to_owned())
	}
}

impl<const N: usize> Environment for [(&str, &str); N] {
	fn var(&self, key: &str) -> Option<String> {
		self.as_slice().var(key)
	}
}

#[test]
fn test_fixture_lookup() {
	let pairs = [
		(LISTEN_PID, "1"),
		(LISTEN_FDS, "2"),
		(LISTEN_FDS, "3"),
	];

	// Later entries win, like repeated assignments in a shell.
	assert_eq!(pairs.var(LISTEN_FDS).as_deref(), Some("3"));
	assert_eq!(pairs.var(LISTEN_PID).as_deref(), Some("1"));
	assert_eq!(pairs.var(LISTEN_FDNAMES), None);

	let map: HashMap<String, String> = [(LISTEN_FDNAMES.to_owned(), "a:b".to_owned())].into_iter().collect();
	assert_eq!((&map).var(LISTEN_FDNAMES).as_deref(), Some("a:b"));
}
