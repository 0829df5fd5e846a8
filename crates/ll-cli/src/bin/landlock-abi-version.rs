//! Prints the kernel's Landlock ABI version, or 0 without Landlock.

use ll_policy::{abi, Syscalls};

fn main() {
    ll_cli::init_logging(false);
    println!("{}", abi::probe(&Syscalls).version);
}
