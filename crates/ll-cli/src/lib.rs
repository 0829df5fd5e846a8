//! Command-line tools that run a program under a Landlock policy.
//!
//! - `landlock-restrict` restricts filesystem access
//! - `landlock-restrict-net` restricts TCP bind and connect
//! - `landlock-restrict-scoped` restricts signals and abstract unix sockets
//! - `landlock-abi-version` prints the kernel's Landlock ABI version

pub mod args;
pub mod exec;

/// Installs `env_logger`, at `debug` when verbose and `info` otherwise.
/// `RUST_LOG` takes precedence.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}
