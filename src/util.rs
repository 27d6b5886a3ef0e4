use once_cell::sync::Lazy;
use std::{
	fs,
	path::PathBuf,
};

pub(crate) static TEST_SCRATCH: Lazy<PathBuf> = Lazy::new(|| {
	let path: PathBuf = ["target", "lib-test-scratch"].into_iter().collect();

	// Try to remove the scratch folder, but ignore errors in doing so.
	let _ = fs::remove_dir_all(&path);

	fs::create_dir_all(&path)
	.expect("couldn't create test scratch folder");

	path
});
