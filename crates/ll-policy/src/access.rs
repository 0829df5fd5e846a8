//! Capability sets: filesystem rights, network rights, IPC scopes and
//! `landlock_restrict_self` flags.
//!
//! Each set is a `bitflags` type over the kernel's bit layout. On top of the
//! generated set algebra (`union`, `intersection`, `difference`, `is_empty`)
//! every type gets [`is_subset`](AccessFs::is_subset),
//! [`valid`](AccessFs::valid), [`from_canonical_name`](AccessFs::from_canonical_name) and a
//! `Display` impl that renders `∅` (`log_same_exec_on` for restrict flags),
//! `{read_file,read_dir}` or `1<<N` for bits without a name.

use std::fmt::{self, Write as _};

use bitflags::bitflags;
use ll_sys::landlock as sys;

bitflags! {
    /// Filesystem access rights (`LANDLOCK_ACCESS_FS_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFs: u64 {
        const EXECUTE = sys::ACCESS_FS_EXECUTE;
        const WRITE_FILE = sys::ACCESS_FS_WRITE_FILE;
        const READ_FILE = sys::ACCESS_FS_READ_FILE;
        const READ_DIR = sys::ACCESS_FS_READ_DIR;
        const REMOVE_DIR = sys::ACCESS_FS_REMOVE_DIR;
        const REMOVE_FILE = sys::ACCESS_FS_REMOVE_FILE;
        const MAKE_CHAR = sys::ACCESS_FS_MAKE_CHAR;
        const MAKE_DIR = sys::ACCESS_FS_MAKE_DIR;
        const MAKE_REG = sys::ACCESS_FS_MAKE_REG;
        const MAKE_SOCK = sys::ACCESS_FS_MAKE_SOCK;
        const MAKE_FIFO = sys::ACCESS_FS_MAKE_FIFO;
        const MAKE_BLOCK = sys::ACCESS_FS_MAKE_BLOCK;
        const MAKE_SYM = sys::ACCESS_FS_MAKE_SYM;
        const REFER = sys::ACCESS_FS_REFER;
        const TRUNCATE = sys::ACCESS_FS_TRUNCATE;
        const IOCTL_DEV = sys::ACCESS_FS_IOCTL_DEV;
    }
}

bitflags! {
    /// Network access rights (`LANDLOCK_ACCESS_NET_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessNet: u64 {
        const BIND_TCP = sys::ACCESS_NET_BIND_TCP;
        const CONNECT_TCP = sys::ACCESS_NET_CONNECT_TCP;
    }
}

bitflags! {
    /// IPC scopes (`LANDLOCK_SCOPE_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Scope: u64 {
        const ABSTRACT_UNIX_SOCKET = sys::SCOPE_ABSTRACT_UNIX_SOCKET;
        const SIGNAL = sys::SCOPE_SIGNAL;
    }
}

bitflags! {
    /// Flags for `landlock_restrict_self` (`LANDLOCK_RESTRICT_SELF_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RestrictFlags: u32 {
        const LOG_SAME_EXEC_OFF = sys::RESTRICT_SELF_LOG_SAME_EXEC_OFF;
        const LOG_NEW_EXEC_ON = sys::RESTRICT_SELF_LOG_NEW_EXEC_ON;
        const LOG_SUBDOMAINS_OFF = sys::RESTRICT_SELF_LOG_SUBDOMAINS_OFF;
    }
}

const FS_NAMES: &[&str] = &[
    "execute",
    "write_file",
    "read_file",
    "read_dir",
    "remove_dir",
    "remove_file",
    "make_char",
    "make_dir",
    "make_reg",
    "make_sock",
    "make_fifo",
    "make_block",
    "make_sym",
    "refer",
    "truncate",
    "ioctl_dev",
];

const NET_NAMES: &[&str] = &["bind_tcp", "connect_tcp"];

const SCOPE_NAMES: &[&str] = &["abstract_unix_socket", "signal"];

const FLAG_NAMES: &[&str] = &["log_same_exec_off", "log_new_exec_on", "log_subdomains_off"];

impl AccessFs {
    /// Rights that apply to files. Everything else only makes sense on directories.
    pub const FILE: Self = Self::EXECUTE
        .union(Self::WRITE_FILE)
        .union(Self::READ_FILE)
        .union(Self::TRUNCATE)
        .union(Self::IOCTL_DEV);

    /// Reading and executing files, listing directories.
    pub const READ: Self = Self::EXECUTE.union(Self::READ_FILE).union(Self::READ_DIR);

    /// Writing, truncating, creating and removing files and directories.
    pub const WRITE: Self = Self::WRITE_FILE
        .union(Self::REMOVE_DIR)
        .union(Self::REMOVE_FILE)
        .union(Self::MAKE_CHAR)
        .union(Self::MAKE_DIR)
        .union(Self::MAKE_REG)
        .union(Self::MAKE_SOCK)
        .union(Self::MAKE_FIFO)
        .union(Self::MAKE_BLOCK)
        .union(Self::MAKE_SYM)
        .union(Self::TRUNCATE);

    pub const READ_WRITE: Self = Self::READ.union(Self::WRITE);

    /// Rights that cannot be silently dropped when the kernel lacks them.
    ///
    /// Without `REFER` handled, the kernel forbids every cross-directory
    /// rename and link, so asking for `REFER` on an older kernel has no
    /// partial equivalent.
    pub const ALL_OR_NOTHING: Self = Self::REFER;
}

macro_rules! capability_set {
    ($ty:ident, $names:ident, $empty:literal) => {
        impl $ty {
            /// `self ⊆ other`.
            pub const fn is_subset(self, other: Self) -> bool {
                self.bits() & other.bits() == self.bits()
            }

            /// True if no bit outside the known range is set.
            pub const fn valid(self) -> bool {
                Self::all().contains(self)
            }

            /// Parses a single canonical name such as `read_file`.
            pub fn from_canonical_name(name: &str) -> Option<Self> {
                $names
                    .iter()
                    .position(|n| *n == name)
                    .map(|bit| Self::from_bits_retain(1 << bit))
            }

            /// Names of the set bits, in ascending order.
            pub fn names(self) -> impl Iterator<Item = &'static str> {
                $names
                    .iter()
                    .enumerate()
                    .filter(move |(bit, _)| self.bits() & (1 << bit) != 0)
                    .map(|(_, name)| *name)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write_set(f, u64::from(self.bits()), $names, $empty)
            }
        }
    };
}

capability_set!(AccessFs, FS_NAMES, "∅");
capability_set!(AccessNet, NET_NAMES, "∅");
capability_set!(Scope, SCOPE_NAMES, "∅");
// No flags means the kernel's default: log the current program only.
capability_set!(RestrictFlags, FLAG_NAMES, "log_same_exec_on");

fn write_set(f: &mut fmt::Formatter<'_>, bits: u64, names: &[&str], empty: &str) -> fmt::Result {
    if bits == 0 {
        return f.write_str(empty);
    }
    f.write_char('{')?;
    let mut first = true;
    for bit in 0..u64::BITS as usize {
        if bits & (1 << bit) == 0 {
            continue;
        }
        if !first {
            f.write_char(',')?;
        }
        first = false;
        match names.get(bit) {
            Some(name) => f.write_str(name)?,
            None => write!(f, "1<<{bit}")?,
        }
    }
    f.write_char('}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(AccessFs::empty().to_string(), "∅");
        assert_eq!(
            (AccessFs::READ_FILE | AccessFs::READ_DIR).to_string(),
            "{read_file,read_dir}"
        );
        assert_eq!(
            AccessFs::from_bits_retain(AccessFs::EXECUTE.bits() | 1 << 63).to_string(),
            "{execute,1<<63}"
        );
        assert_eq!(AccessNet::from_bits_retain(1 << 5).to_string(), "{1<<5}");
        assert_eq!(Scope::SIGNAL.to_string(), "{signal}");
        assert_eq!(
            RestrictFlags::all().to_string(),
            "{log_same_exec_off,log_new_exec_on,log_subdomains_off}"
        );
    }

    #[test]
    fn names_cover_every_known_bit() {
        assert_eq!(FS_NAMES.len(), AccessFs::all().bits().count_ones() as usize);
        assert_eq!(NET_NAMES.len(), AccessNet::all().bits().count_ones() as usize);
        assert_eq!(SCOPE_NAMES.len(), Scope::all().bits().count_ones() as usize);
        assert_eq!(FLAG_NAMES.len(), RestrictFlags::all().bits().count_ones() as usize);
        for name in FS_NAMES {
            assert_eq!(AccessFs::from_canonical_name(name).unwrap().to_string(), format!("{{{name}}}"));
        }
        assert_eq!(AccessFs::from_canonical_name("nope"), None);
    }

    #[test]
    fn canonical_names_are_lowercase() {
        assert_eq!(AccessFs::from_canonical_name("read_file"), Some(AccessFs::READ_FILE));
        assert_eq!(AccessFs::from_canonical_name("READ_FILE"), None);
        assert_eq!(AccessNet::from_canonical_name("connect_tcp"), Some(AccessNet::CONNECT_TCP));
        assert_eq!(Scope::from_canonical_name("signal"), Some(Scope::SIGNAL));
        assert_eq!(
            RestrictFlags::from_canonical_name("log_new_exec_on"),
            Some(RestrictFlags::LOG_NEW_EXEC_ON)
        );
    }

    #[test]
    fn empty_restrict_flags_name_the_default_logging() {
        assert_eq!(RestrictFlags::empty().to_string(), "log_same_exec_on");
        assert_eq!(Scope::empty().to_string(), "∅");
    }

    #[test]
    fn names_iterates_in_bit_order() {
        let names: Vec<_> = (AccessFs::TRUNCATE | AccessFs::EXECUTE).names().collect();
        assert_eq!(names, ["execute", "truncate"]);
    }

    #[test]
    fn subset() {
        let a = AccessFs::READ_FILE;
        let b = AccessFs::READ_FILE | AccessFs::WRITE_FILE;
        assert!(a.is_subset(b));
        assert!(!b.is_subset(a));
        assert!(AccessFs::empty().is_subset(a));
        assert!(a.is_subset(a));
    }

    #[test]
    fn bit_algebra() {
        let sets = [
            AccessFs::empty(),
            AccessFs::READ,
            AccessFs::WRITE,
            AccessFs::FILE,
            AccessFs::REFER | AccessFs::MAKE_SYM,
        ];
        for a in sets {
            for b in sets {
                let i = a.intersection(b);
                let u = a.union(b);
                assert!(i.is_subset(a) && i.is_subset(b));
                assert!(a.is_subset(u) && b.is_subset(u));
                assert_eq!(a.union(a), a);
                assert_eq!(a.intersection(a), a);
            }
        }
    }

    #[test]
    fn validity() {
        assert!(AccessFs::all().valid());
        assert!(AccessFs::empty().valid());
        assert!(!AccessFs::from_bits_retain(1 << 16).valid());
        assert!(!Scope::from_bits_retain(1 << 2).valid());
        assert!(!RestrictFlags::from_bits_retain(1 << 3).valid());
    }

    #[test]
    fn canned_sets() {
        assert_eq!(AccessFs::READ_WRITE, AccessFs::READ | AccessFs::WRITE);
        assert!(AccessFs::TRUNCATE.is_subset(AccessFs::WRITE));
        assert!(!AccessFs::REFER.is_subset(AccessFs::READ_WRITE));
        assert!(!AccessFs::READ_DIR.is_subset(AccessFs::FILE));
        assert_eq!(
            AccessFs::READ.intersection(AccessFs::FILE),
            AccessFs::EXECUTE | AccessFs::READ_FILE
        );
    }
}
