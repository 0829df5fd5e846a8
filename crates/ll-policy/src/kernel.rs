//! The boundary between policy logic and the kernel.
//!
//! [`Syscalls`] is the real thing. Everything above this trait is plain
//! computation over access sets and can be exercised against a fake.

use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
use std::sync::OnceLock;

use ll_sys::landlock::{self as sys, NetPortAttr, PathBeneathAttr, RulesetAttr};
use ll_sys::{Errno, ThreadOp};

use crate::access::{AccessFs, AccessNet, RestrictFlags};

/// Landlock primitives used by the enforcement pipeline.
pub trait Kernel {
    fn abi_version(&self) -> Result<u32, Errno>;

    fn errata(&self) -> Result<u32, Errno>;

    fn create_ruleset(&self, attr: &RulesetAttr) -> Result<OwnedFd, Errno>;

    fn add_path_beneath(
        &self,
        ruleset: BorrowedFd<'_>,
        parent: BorrowedFd<'_>,
        access: AccessFs,
    ) -> Result<(), Errno>;

    fn add_net_port(&self, ruleset: BorrowedFd<'_>, port: u16, access: AccessNet) -> Result<(), Errno>;

    /// Sets no-new-privileges on every thread of the process.
    fn no_new_privs_all_threads(&self) -> Result<(), Errno>;

    /// Enforces `ruleset` on every thread of the process.
    fn restrict_self_all_threads(&self, ruleset: BorrowedFd<'_>, flags: RestrictFlags) -> Result<(), Errno>;
}

/// The running kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Syscalls;

impl Kernel for Syscalls {
    fn abi_version(&self) -> Result<u32, Errno> {
        static ABI_VERSION: OnceLock<Result<u32, Errno>> = OnceLock::new();
        *ABI_VERSION.get_or_init(sys::abi_version)
    }

    fn errata(&self) -> Result<u32, Errno> {
        static ERRATA: OnceLock<Result<u32, Errno>> = OnceLock::new();
        *ERRATA.get_or_init(sys::errata)
    }

    fn create_ruleset(&self, attr: &RulesetAttr) -> Result<OwnedFd, Errno> {
        sys::create_ruleset(attr)
    }

    fn add_path_beneath(
        &self,
        ruleset: BorrowedFd<'_>,
        parent: BorrowedFd<'_>,
        access: AccessFs,
    ) -> Result<(), Errno> {
        sys::add_path_beneath_rule(ruleset, &PathBeneathAttr::new(parent, access.bits()))
    }

    fn add_net_port(&self, ruleset: BorrowedFd<'_>, port: u16, access: AccessNet) -> Result<(), Errno> {
        let attr = NetPortAttr {
            allowed_access: access.bits(),
            port: u64::from(port),
        };
        sys::add_net_port_rule(ruleset, &attr)
    }

    fn no_new_privs_all_threads(&self) -> Result<(), Errno> {
        ll_sys::all_threads(ThreadOp::NoNewPrivs)
    }

    fn restrict_self_all_threads(&self, ruleset: BorrowedFd<'_>, flags: RestrictFlags) -> Result<(), Errno> {
        ll_sys::all_threads(ThreadOp::RestrictSelf {
            ruleset: ruleset.as_raw_fd(),
            flags: flags.bits(),
        })
    }
}
