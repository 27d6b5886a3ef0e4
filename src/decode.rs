use crate::{
	env::{
		Environment,
		LISTEN_FDNAMES,
		LISTEN_FDS,
		LISTEN_PID,
	},
	errors::ListenError,
	SD_LISTEN_FDS_START,
};
use std::{
	os::fd::RawFd,
	process,
};

#[cfg(test)]
use assert_matches::assert_matches;

type Pid = u32;

/// Decodes the number of sockets passed by the service manager, from `LISTEN_PID` and `LISTEN_FDS`.
///
/// Returns zero if `LISTEN_FDS` is zero or negative. That is not an error; it just means there's nothing to adopt.
///
///
/// # Errors
///
/// The checks happen in this order, and the first one to fail determines the error:
///
/// 1. `LISTEN_PID` is missing or empty: [`ListenError::MissingEnvironment`].
/// 2. `LISTEN_PID` is not a number: [`ListenError::InvalidIdentity`].
/// 3. `LISTEN_PID` is not the ID of this process: [`ListenError::IdentityMismatch`].
/// 4. `LISTEN_FDS` is missing or not a number: [`ListenError::InvalidCount`].
/// 5. `LISTEN_FDS` is too large to number the file descriptors: [`ListenError::CountOutOfRange`].
pub fn decode_count(env: &impl Environment) -> Result<usize, ListenError> {
	let expected_pid: Pid = match env.var(LISTEN_PID) {
		Some(pid) if !pid.is_empty() => {
			pid.parse()
			.map_err(|error| ListenError::InvalidIdentity { error })?
		},

		_ => return Err(ListenError::MissingEnvironment),
	};

	let actual_pid: Pid = process::id();

	if actual_pid != expected_pid {
		return Err(ListenError::IdentityMismatch {
			expected: expected_pid,
			actual: actual_pid,
		});
	}

	let count: RawFd =
		env.var(LISTEN_FDS)
		.unwrap_or_default()
		.parse()
		.map_err(|error| ListenError::InvalidCount { error })?;

	if count < 1 {
		return Ok(0);
	}

	if SD_LISTEN_FDS_START.checked_add(count).is_none() {
		return Err(ListenError::CountOutOfRange { count });
	}

	// Positive and no larger than `RawFd::MAX`, so this can't fail.
	Ok(count as usize)
}

/// Decodes the socket names from `LISTEN_FDNAMES`, given the number of sockets from [`decode_count`].
///
/// The names are separated by `:`, in the same order as the sockets. A name may be empty.
///
/// If `count` is zero, this returns an empty list without looking at the environment. In particular, a missing `LISTEN_FDNAMES` is not an error in that case, because there are no sockets to name.
///
///
/// # Errors
///
/// * [`ListenError::MissingNames`] if `LISTEN_FDNAMES` is missing or empty.
/// * [`ListenError::NameCountMismatch`] if there are more or fewer names than `count`.
pub fn decode_names(env: &impl Environment, count: usize) -> Result<Vec<String>, ListenError> {
	if count == 0 {
		return Ok(Vec::new());
	}

	let raw_names: String = match env.var(LISTEN_FDNAMES) {
		Some(names) if !names.is_empty() => names,
		_ => return Err(ListenError::MissingNames),
	};

	let names: Vec<String> =
		raw_names.splitn(count, ':')
		.map(str::to_owned)
		.collect();

	// `splitn` puts any surplus names, separators and all, into the last field. That's the only way to tell that there are too many.
	let too_few: bool = names.len() != count;
	let too_many: bool = names.last().is_some_and(|last| last.contains(':'));

	if too_few || too_many {
		return Err(ListenError::NameCountMismatch {
			expected: count,
			actual: raw_names.matches(':').count() + 1,
		});
	}

	Ok(names)
}

#[cfg(test)]
fn own_pid() -> String {
	process::id().to_string()
}

#[test]
fn test_decode_count() {
	let pid = own_pid();

	assert_matches!(decode_count(&[(LISTEN_PID, pid.as_str()), (LISTEN_FDS, "2")]), Ok(2));
	assert_matches!(decode_count(&[(LISTEN_PID, pid.as_str()), (LISTEN_FDS, "0")]), Ok(0));
	assert_matches!(decode_count(&[(LISTEN_PID, pid.as_str()), (LISTEN_FDS, "-5")]), Ok(0));
}

#[test]
fn test_decode_count_identity() {
	assert_matches!(
		decode_count(&[(LISTEN_FDS, "2")]),
		Err(ListenError::MissingEnvironment)
	);

	assert_matches!(
		decode_count(&[(LISTEN_PID, ""), (LISTEN_FDS, "2")]),
		Err(ListenError::MissingEnvironment)
	);

	assert_matches!(
		decode_count(&[(LISTEN_PID, "Gordon"), (LISTEN_FDS, "2")]),
		Err(ListenError::InvalidIdentity { .. })
	);

	assert_matches!(
		decode_count(&[(LISTEN_PID, "-1"), (LISTEN_FDS, "2")]),
		Err(ListenError::InvalidIdentity { .. })
	);

	// The test harness is never process 1.
	assert_matches!(
		decode_count(&[(LISTEN_PID, "1"), (LISTEN_FDS, "2")]),
		Err(ListenError::IdentityMismatch { expected: 1, actual })
		if actual == process::id()
	);
}

#[test]
fn test_decode_count_invalid() {
	let pid = own_pid();

	assert_matches!(
		decode_count(&[(LISTEN_PID, pid.as_str())]),
		Err(ListenError::InvalidCount { .. })
	);

	assert_matches!(
		decode_count(&[(LISTEN_PID, pid.as_str()), (LISTEN_FDS, "two")]),
		Err(ListenError::InvalidCount { .. })
	);

	assert_matches!(
		decode_count(&[(LISTEN_PID, pid.as_str()), (LISTEN_FDS, "99999999999")]),
		Err(ListenError::InvalidCount { .. })
	);

	let max = RawFd::MAX.to_string();

	assert_matches!(
		decode_count(&[(LISTEN_PID, pid.as_str()), (LISTEN_FDS, max.as_str())]),
		Err(ListenError::CountOutOfRange { count: RawFd::MAX })
	);
}

#[test]
fn test_decode_names() {
	assert_eq!(decode_names(&[(LISTEN_FDNAMES, "a:b")], 2).unwrap(), ["a", "b"]);
	assert_eq!(decode_names(&[(LISTEN_FDNAMES, "fd3")], 1).unwrap(), ["fd3"]);
	assert_eq!(decode_names(&[(LISTEN_FDNAMES, ":")], 2).unwrap(), ["", ""]);
	assert!(decode_names(&[(LISTEN_FDNAMES, "ignored")], 0).unwrap().is_empty());
}

#[test]
fn test_decode_names_none_needed() {
	// With no sockets, neither a missing nor an empty `LISTEN_FDNAMES` is reported.
	assert_matches!(decode_names(&[(LISTEN_PID, "1")], 0), Ok(names) if names.is_empty());
	assert_matches!(decode_names(&[(LISTEN_FDNAMES, "")], 0), Ok(names) if names.is_empty());
}

#[test]
fn test_decode_names_missing() {
	assert_matches!(
		decode_names(&[(LISTEN_PID, "1")], 2),
		Err(ListenError::MissingNames)
	);

	assert_matches!(
		decode_names(&[(LISTEN_FDNAMES, "")], 2),
		Err(ListenError::MissingNames)
	);
}

#[test]
fn test_decode_names_mismatch() {
	assert_matches!(
		decode_names(&[(LISTEN_FDNAMES, "a")], 2),
		Err(ListenError::NameCountMismatch { expected: 2, actual: 1 })
	);

	assert_matches!(
		decode_names(&[(LISTEN_FDNAMES, "a:b:c")], 2),
		Err(ListenError::NameCountMismatch { expected: 2, actual: 3 })
	);

	// A surplus separator at the very start of the last field still counts.
	assert_matches!(
		decode_names(&[(LISTEN_FDNAMES, "a::")], 2),
		Err(ListenError::NameCountMismatch { expected: 2, actual: 3 })
	);

	assert_matches!(
		decode_names(&[(LISTEN_FDNAMES, "a:b:c:d")], 1),
		Err(ListenError::NameCountMismatch { expected: 1, actual: 4 })
	);
}
