//! Landlock ABI constants, attribute structs and syscalls.
//!
//! ## ABI Versions
//!
//! | ABI | Kernel | Features |
//! |-----|--------|----------|
//! | 1 | 5.13 | Basic filesystem access |
//! | 2 | 5.19 | `REFER` (cross-directory rename/link) |
//! | 3 | 6.2 | `TRUNCATE` |
//! | 4 | 6.7 | TCP bind/connect |
//! | 5 | 6.10 | `IOCTL_DEV` |
//! | 6 | 6.12 | `SCOPE_ABSTRACT_UNIX_SOCKET`, `SCOPE_SIGNAL` |
//! | 7 | 6.15 | audit logging flags for `landlock_restrict_self` |
//!
//! ## Usage
//!
//! ```ignore
//! let attr = RulesetAttr { handled_access_fs: ACCESS_FS_READ_FILE, ..Default::default() };
//! let ruleset = create_ruleset(&attr)?;
//! add_path_beneath_rule(ruleset.as_fd(), &PathBeneathAttr::new(dir.as_fd(), ACCESS_FS_READ_FILE))?;
//! all_threads(ThreadOp::NoNewPrivs)?;
//! all_threads(ThreadOp::RestrictSelf { ruleset: ruleset.as_raw_fd(), flags: 0 })?;
//! ```
//!
//! `restrict_self` and `set_no_new_privs` only affect the calling thread.
//! Use [`crate::threads::all_threads`] to cover the whole process.

use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use nix::errno::Errno;

/// `landlock_create_ruleset` flag: return the highest supported ABI version.
pub const CREATE_RULESET_VERSION: u32 = 1 << 0;
/// `landlock_create_ruleset` flag: return the errata bitmask.
pub const CREATE_RULESET_ERRATA: u32 = 1 << 1;

pub const RULE_PATH_BENEATH: u32 = 1;
pub const RULE_NET_PORT: u32 = 2;

// ABI v1
pub const ACCESS_FS_EXECUTE: u64 = 1 << 0;
pub const ACCESS_FS_WRITE_FILE: u64 = 1 << 1;
pub const ACCESS_FS_READ_FILE: u64 = 1 << 2;
pub const ACCESS_FS_READ_DIR: u64 = 1 << 3;
pub const ACCESS_FS_REMOVE_DIR: u64 = 1 << 4;
pub const ACCESS_FS_REMOVE_FILE: u64 = 1 << 5;
pub const ACCESS_FS_MAKE_CHAR: u64 = 1 << 6;
pub const ACCESS_FS_MAKE_DIR: u64 = 1 << 7;
pub const ACCESS_FS_MAKE_REG: u64 = 1 << 8;
pub const ACCESS_FS_MAKE_SOCK: u64 = 1 << 9;
pub const ACCESS_FS_MAKE_FIFO: u64 = 1 << 10;
pub const ACCESS_FS_MAKE_BLOCK: u64 = 1 << 11;
pub const ACCESS_FS_MAKE_SYM: u64 = 1 << 12;

// ABI v2
pub const ACCESS_FS_REFER: u64 = 1 << 13;

// ABI v3
pub const ACCESS_FS_TRUNCATE: u64 = 1 << 14;

// ABI v4
pub const ACCESS_NET_BIND_TCP: u64 = 1 << 0;
pub const ACCESS_NET_CONNECT_TCP: u64 = 1 << 1;

// ABI v5
pub const ACCESS_FS_IOCTL_DEV: u64 = 1 << 15;

// ABI v6
/// Block connections to abstract unix sockets created outside the domain.
pub const SCOPE_ABSTRACT_UNIX_SOCKET: u64 = 1 << 0;
/// Block signals to processes outside the domain.
pub const SCOPE_SIGNAL: u64 = 1 << 1;

// ABI v7
pub const RESTRICT_SELF_LOG_SAME_EXEC_OFF: u32 = 1 << 0;
pub const RESTRICT_SELF_LOG_NEW_EXEC_ON: u32 = 1 << 1;
pub const RESTRICT_SELF_LOG_SUBDOMAINS_OFF: u32 = 1 << 2;

/// Errata bit for the fix of signal scoping across threads (ABI 6).
pub const ERRATA_SCOPED_SIGNAL: u32 = 1 << 1;

/// Argument of `landlock_create_ruleset`. May grow with future ABI versions;
/// the kernel accepts a larger struct as long as unknown trailing fields are zero.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RulesetAttr {
    pub handled_access_fs: u64,
    pub handled_access_net: u64,
    pub scoped: u64,
}

/// `struct landlock_path_beneath_attr` (packed in the kernel headers).
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct PathBeneathAttr {
    pub allowed_access: u64,
    pub parent_fd: RawFd,
}

impl PathBeneathAttr {
    pub fn new(parent: BorrowedFd<'_>, allowed_access: u64) -> Self {
        Self {
            allowed_access,
            parent_fd: parent.as_raw_fd(),
        }
    }
}

/// `struct landlock_net_port_attr` (packed in the kernel headers).
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct NetPortAttr {
    pub allowed_access: u64,
    pub port: u64,
}

/// Returns the Landlock ABI version supported by the kernel.
///
/// # Errors
///
/// `ENOSYS` if the kernel was built without Landlock, `EOPNOTSUPP` if it is
/// disabled at boot time.
pub fn abi_version() -> Result<u32, Errno> {
    platform::create_ruleset(std::ptr::null(), 0, CREATE_RULESET_VERSION).map(|v| v as u32)
}

/// Returns the kernel's Landlock errata bitmask.
///
/// # Errors
///
/// Fails on kernels that predate the errata query (`EINVAL`) or lack Landlock.
pub fn errata() -> Result<u32, Errno> {
    platform::create_ruleset(std::ptr::null(), 0, CREATE_RULESET_ERRATA).map(|v| v as u32)
}

/// Creates a new ruleset handling the rights in `attr`.
///
/// # Errors
///
/// Returns the raw `Errno` of `landlock_create_ruleset`.
pub fn create_ruleset(attr: &RulesetAttr) -> Result<OwnedFd, Errno> {
    let fd = platform::create_ruleset(attr, size_of::<RulesetAttr>(), 0)?;
    // SAFETY: on success the kernel returned a fresh file descriptor we own.
    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

/// Adds a "path beneath" rule to `ruleset`.
///
/// # Errors
///
/// Returns the raw `Errno` of `landlock_add_rule`.
pub fn add_path_beneath_rule(ruleset: BorrowedFd<'_>, attr: &PathBeneathAttr) -> Result<(), Errno> {
    platform::add_rule(
        ruleset.as_raw_fd(),
        RULE_PATH_BENEATH,
        (attr as *const PathBeneathAttr).cast(),
    )
}

/// Adds a "net port" rule to `ruleset`.
///
/// # Errors
///
/// Returns the raw `Errno` of `landlock_add_rule`.
pub fn add_net_port_rule(ruleset: BorrowedFd<'_>, attr: &NetPortAttr) -> Result<(), Errno> {
    platform::add_rule(
        ruleset.as_raw_fd(),
        RULE_NET_PORT,
        (attr as *const NetPortAttr).cast(),
    )
}

/// Enforces `ruleset` on the calling thread. Irreversible.
///
/// # Errors
///
/// `E2BIG` when the thread already has the maximum number of stacked domains.
pub fn restrict_self(ruleset: BorrowedFd<'_>, flags: u32) -> Result<(), Errno> {
    platform::restrict_self(ruleset.as_raw_fd(), flags)
}

/// Sets `PR_SET_NO_NEW_PRIVS` on the calling thread.
///
/// # Errors
///
/// Returns the raw `Errno` of `prctl`.
pub fn set_no_new_privs() -> Result<(), Errno> {
    platform::set_no_new_privs()
}

// Raw-fd variant for the signal handler in `threads`, which only has the
// descriptor number at hand.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn restrict_self_raw(ruleset: RawFd, flags: u32) -> Result<(), Errno> {
    platform::restrict_self(ruleset, flags)
}

// --- Platform-specific syscalls ---

#[cfg(target_os = "linux")]
mod platform {
    use std::os::fd::RawFd;

    use nix::errno::Errno;

    use super::RulesetAttr;

    pub fn create_ruleset(
        attr: *const RulesetAttr,
        size: usize,
        flags: u32,
    ) -> Result<libc::c_long, Errno> {
        // SAFETY: attr is either null (with size 0) or points to a live RulesetAttr of `size` bytes.
        Errno::result(unsafe { libc::syscall(libc::SYS_landlock_create_ruleset, attr, size, flags) })
    }

    pub fn add_rule(ruleset: RawFd, rule_type: u32, attr: *const libc::c_void) -> Result<(), Errno> {
        // SAFETY: attr points to the attribute struct matching rule_type.
        let ret = unsafe {
            libc::syscall(libc::SYS_landlock_add_rule, ruleset, rule_type, attr, 0u32)
        };
        Errno::result(ret).map(drop)
    }

    pub fn restrict_self(ruleset: RawFd, flags: u32) -> Result<(), Errno> {
        // SAFETY: plain integer arguments.
        Errno::result(unsafe { libc::syscall(libc::SYS_landlock_restrict_self, ruleset, flags) })
            .map(drop)
    }

    pub fn set_no_new_privs() -> Result<(), Errno> {
        // SAFETY: plain integer arguments.
        Errno::result(unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) }).map(drop)
    }
}

#[cfg(not(target_os = "linux"))]
mod platform {
    use std::os::fd::RawFd;

    use nix::errno::Errno;

    use super::RulesetAttr;

    pub fn create_ruleset(
        _attr: *const RulesetAttr,
        _size: usize,
        _flags: u32,
    ) -> Result<libc::c_long, Errno> {
        Err(Errno::ENOSYS)
    }

    pub fn add_rule(_ruleset: RawFd, _rule_type: u32, _attr: *const libc::c_void) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }

    pub fn restrict_self(_ruleset: RawFd, _flags: u32) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }

    pub fn set_no_new_privs() -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }
}
