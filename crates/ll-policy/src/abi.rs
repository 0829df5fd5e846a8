//! Known Landlock ABI versions and what each one supports.

use log::debug;
use ll_sys::landlock::ERRATA_SCOPED_SIGNAL;

use crate::access::{AccessFs, AccessNet, RestrictFlags, Scope};
use crate::config::Config;
use crate::kernel::Kernel;

/// What a given Landlock ABI version can enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbiInfo {
    pub version: u32,
    pub supported_fs: AccessFs,
    pub supported_net: AccessNet,
    pub supported_scoped: Scope,
    pub supported_flags: RestrictFlags,
}

impl AbiInfo {
    /// A config handling everything this version supports, restrict flags excluded.
    pub const fn as_config(&self) -> Config {
        Config::from_parts(
            self.supported_fs,
            self.supported_net,
            self.supported_scoped,
            RestrictFlags::empty(),
        )
    }
}

const FS_V1: AccessFs = AccessFs::from_bits_retain((1 << 13) - 1);
const FS_V2: AccessFs = FS_V1.union(AccessFs::REFER);
const FS_V3: AccessFs = FS_V2.union(AccessFs::TRUNCATE);
const FS_V5: AccessFs = FS_V3.union(AccessFs::IOCTL_DEV);
const NET_V4: AccessNet = AccessNet::BIND_TCP.union(AccessNet::CONNECT_TCP);
const SCOPED_V6: Scope = Scope::ABSTRACT_UNIX_SOCKET.union(Scope::SIGNAL);
const FLAGS_V7: RestrictFlags = RestrictFlags::LOG_SAME_EXEC_OFF
    .union(RestrictFlags::LOG_NEW_EXEC_ON)
    .union(RestrictFlags::LOG_SUBDOMAINS_OFF);

const fn abi(
    version: u32,
    supported_fs: AccessFs,
    supported_net: AccessNet,
    supported_scoped: Scope,
    supported_flags: RestrictFlags,
) -> AbiInfo {
    AbiInfo {
        version,
        supported_fs,
        supported_net,
        supported_scoped,
        supported_flags,
    }
}

// Const copy of the table for use in other constants.
pub(crate) const INFOS: [AbiInfo; 8] = [
    abi(0, AccessFs::empty(), AccessNet::empty(), Scope::empty(), RestrictFlags::empty()),
    abi(1, FS_V1, AccessNet::empty(), Scope::empty(), RestrictFlags::empty()),
    abi(2, FS_V2, AccessNet::empty(), Scope::empty(), RestrictFlags::empty()),
    abi(3, FS_V3, AccessNet::empty(), Scope::empty(), RestrictFlags::empty()),
    abi(4, FS_V3, NET_V4, Scope::empty(), RestrictFlags::empty()),
    abi(5, FS_V5, NET_V4, Scope::empty(), RestrictFlags::empty()),
    abi(6, FS_V5, NET_V4, SCOPED_V6, RestrictFlags::empty()),
    abi(7, FS_V5, NET_V4, SCOPED_V6, FLAGS_V7),
];

/// Every known ABI version. `ABI_INFOS[i].version == i`.
pub static ABI_INFOS: [AbiInfo; 8] = INFOS;

/// The newest ABI version this library knows about.
pub fn highest_known() -> &'static AbiInfo {
    &ABI_INFOS[ABI_INFOS.len() - 1]
}

/// Looks up a version in the table.
pub fn get(version: u32) -> Option<&'static AbiInfo> {
    ABI_INFOS.get(usize::try_from(version).ok()?)
}

/// Asks the kernel which ABI it implements.
///
/// Any error reads as version 0. Versions newer than [`highest_known`] are
/// clamped to it. A kernel reporting version 6 or later without the
/// scoped-signal erratum fix is treated as version 5, since its signal
/// scoping cannot be relied upon.
pub fn probe(kernel: &dyn Kernel) -> &'static AbiInfo {
    let reported = match kernel.abi_version() {
        Ok(version) => version,
        Err(e) => {
            debug!("Landlock ABI probe failed ({e}), assuming version 0");
            0
        }
    };
    let mut version = reported.min(highest_known().version);
    if version >= 6 {
        match kernel.errata() {
            Ok(errata) if errata & ERRATA_SCOPED_SIGNAL != 0 => {}
            errata => {
                debug!("Landlock ABI {version} without the scoped signal fix ({errata:?}), using version 5");
                version = 5;
            }
        }
    }
    &ABI_INFOS[version as usize]
}
