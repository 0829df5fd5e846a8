//! Running irreversible restrictions in a child process.
//!
//! Each restricted test re-executes the test binary, filtered down to
//! itself. The child learns which test it is running and where its scratch
//! directory lives from environment variables, so the harness process is
//! never restricted.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use ll_policy::{abi, Syscalls};

/// Name of the test the child process should run.
pub const CHILD_ENV: &str = "LL_POLICY_TEST_CHILD";
/// Scratch directory prepared by the parent.
pub const SCRATCH_ENV: &str = "LL_POLICY_TEST_SCRATCH";

/// True if the kernel provides at least ABI `version`. Prints a skip message otherwise.
pub fn abi_at_least(version: u32) -> bool {
    let found = abi::probe(&Syscalls).version;
    if found < version {
        eprintln!("skipping test: Landlock ABI {found} < {version}");
        return false;
    }
    true
}

/// Runs `body` restricted, in a child process.
///
/// In the parent, `setup` populates a fresh scratch directory and the test
/// binary is re-run for `name` only; the child's exit status decides the test.
/// In the child, `body` runs against that directory.
pub fn run_restricted(name: &str, setup: impl FnOnce(&Path), body: impl FnOnce(&Path)) {
    if let Ok(target) = env::var(CHILD_ENV) {
        if target == name {
            let scratch = PathBuf::from(env::var(SCRATCH_ENV).expect("scratch directory not set"));
            body(&scratch);
        }
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());

    let output = Command::new(env::current_exe().unwrap())
        .args([name, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, name)
        .env(SCRATCH_ENV, dir.path())
        .output()
        .expect("failed to run child test");

    assert!(
        output.status.success(),
        "child test {name} failed. stdout: {}, stderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(
        String::from_utf8_lossy(&output.stdout).contains("1 passed"),
        "child test {name} did not run. stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );
}
