use std::{
	fs,
	path::Path,
};

#[cfg(test)]
use crate::util::TEST_SCRATCH;

/// The directory that systemd creates at boot. Its presence means systemd is the init system.
const SYSTEMD_RUNTIME_DIR: &str = "/run/systemd/system";

/// Checks whether the system was booted with systemd as its init system.
///
/// This checks whether `/run/systemd/system` is a directory, the same way `sd_booted(3)` does. A symbolic link does not count, even if it points to a directory. Any error in checking, including the path not existing, results in `false`.
pub fn is_supervised() -> bool {
	is_dir_no_follow(Path::new(SYSTEMD_RUNTIME_DIR))
}

fn is_dir_no_follow(path: &Path) -> bool {
	fs::symlink_metadata(path)
	.is_ok_and(|metadata| metadata.is_dir())
}

#[test]
fn test_is_dir_no_follow() {
	let dir = TEST_SCRATCH.join("booted-dir");
	let file = TEST_SCRATCH.join("booted-file");
	let link = TEST_SCRATCH.join("booted-link");

	assert!(!is_dir_no_follow(&dir));

	fs::create_dir(&dir).unwrap();
	fs::write(&file, b"").unwrap();
	std::os::unix::fs::symlink("booted-dir", &link).unwrap();

	assert!(is_dir_no_follow(&dir));
	assert!(!is_dir_no_follow(&file));
	assert!(!is_dir_no_follow(&link));
}

#[test]
fn test_is_supervised() {
	let expected = fs::symlink_metadata(SYSTEMD_RUNTIME_DIR).is_ok_and(|metadata| metadata.file_type().is_dir());
	assert_eq!(is_supervised(), expected);
}
