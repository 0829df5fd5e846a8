//! The set of rights a ruleset handles.
//!
//! A [`Config`] names everything the policy restricts. Whatever a config
//! handles is denied unless a rule grants it back; whatever it does not
//! handle stays unrestricted.

use std::fmt;

use thiserror::Error;

use crate::abi::{self, AbiInfo, ABI_INFOS};
use crate::access::{AccessFs, AccessNet, RestrictFlags, Scope};

/// Errors from [`Config::new`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("only one {0} argument may be given")]
    Duplicate(&'static str),
    #[error("unsupported {kind} value {value}; a newer version of ll-policy may be needed")]
    Unsupported { kind: &'static str, value: String },
}

/// One argument of [`Config::new`].
///
/// Every capability kind converts into it, so a config can be built from a
/// mixed list such as `[AccessFs::READ.into(), AccessNet::BIND_TCP.into()]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigArg {
    Fs(AccessFs),
    Net(AccessNet),
    Scoped(Scope),
    Flags(RestrictFlags),
}

impl From<AccessFs> for ConfigArg {
    fn from(access: AccessFs) -> Self {
        ConfigArg::Fs(access)
    }
}

impl From<AccessNet> for ConfigArg {
    fn from(access: AccessNet) -> Self {
        ConfigArg::Net(access)
    }
}

impl From<Scope> for ConfigArg {
    fn from(scoped: Scope) -> Self {
        ConfigArg::Scoped(scoped)
    }
}

impl From<RestrictFlags> for ConfigArg {
    fn from(flags: RestrictFlags) -> Self {
        ConfigArg::Flags(flags)
    }
}

/// Handled rights, restrict flags and the best-effort switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    handled_fs: AccessFs,
    handled_net: AccessNet,
    handled_scoped: Scope,
    restrict_flags: RestrictFlags,
    best_effort: bool,
}

impl Config {
    /// Handles every right of ABI version 1.
    pub const V1: Config = abi::INFOS[1].as_config();
    /// Handles every right of ABI version 2.
    pub const V2: Config = abi::INFOS[2].as_config();
    /// Handles every right of ABI version 3.
    pub const V3: Config = abi::INFOS[3].as_config();
    /// Handles every right of ABI version 4.
    pub const V4: Config = abi::INFOS[4].as_config();
    /// Handles every right of ABI version 5.
    pub const V5: Config = abi::INFOS[5].as_config();
    /// Handles every right of ABI version 6.
    pub const V6: Config = abi::INFOS[6].as_config();
    /// Handles every right of ABI version 7.
    pub const V7: Config = abi::INFOS[7].as_config();

    /// Builds a config from at most one argument per capability kind.
    ///
    /// No arguments at all give a config that handles nothing, which
    /// enforces nothing.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Duplicate`] if a kind appears twice,
    /// [`ConfigError::Unsupported`] if a value has bits unknown to the
    /// newest supported ABI.
    pub fn new<I>(args: I) -> Result<Config, ConfigError>
    where
        I: IntoIterator,
        I::Item: Into<ConfigArg>,
    {
        let mut config = Config::default();
        let mut seen = [false; 4];
        for arg in args {
            let arg = arg.into();
            let slot = match arg {
                ConfigArg::Fs(_) => 0,
                ConfigArg::Net(_) => 1,
                ConfigArg::Scoped(_) => 2,
                ConfigArg::Flags(_) => 3,
            };
            if std::mem::replace(&mut seen[slot], true) {
                return Err(ConfigError::Duplicate(arg.kind()));
            }
            match arg {
                ConfigArg::Fs(access) => config.handled_fs = access,
                ConfigArg::Net(access) => config.handled_net = access,
                ConfigArg::Scoped(scoped) => config.handled_scoped = scoped,
                ConfigArg::Flags(flags) => config.restrict_flags = flags,
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub(crate) const fn from_parts(
        handled_fs: AccessFs,
        handled_net: AccessNet,
        handled_scoped: Scope,
        restrict_flags: RestrictFlags,
    ) -> Config {
        Config {
            handled_fs,
            handled_net,
            handled_scoped,
            restrict_flags,
            best_effort: false,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let unsupported = |arg: ConfigArg| ConfigError::Unsupported {
            kind: arg.kind(),
            value: arg.to_string(),
        };
        if !self.handled_fs.valid() {
            return Err(unsupported(self.handled_fs.into()));
        }
        if !self.handled_net.valid() {
            return Err(unsupported(self.handled_net.into()));
        }
        if !self.handled_scoped.valid() {
            return Err(unsupported(self.handled_scoped.into()));
        }
        if !self.restrict_flags.valid() {
            return Err(unsupported(self.restrict_flags.into()));
        }
        Ok(())
    }

    /// The same config, downgraded to whatever the running kernel supports
    /// instead of failing.
    #[must_use]
    pub const fn best_effort(self) -> Config {
        Config {
            best_effort: true,
            ..self
        }
    }

    pub const fn handled_fs(&self) -> AccessFs {
        self.handled_fs
    }

    pub const fn handled_net(&self) -> AccessNet {
        self.handled_net
    }

    pub const fn handled_scoped(&self) -> Scope {
        self.handled_scoped
    }

    pub const fn restrict_flags(&self) -> RestrictFlags {
        self.restrict_flags
    }

    pub const fn is_best_effort(&self) -> bool {
        self.best_effort
    }

    /// True if the config restricts nothing at all.
    pub fn handles_nothing(&self) -> bool {
        self.handled_fs.is_empty() && self.handled_net.is_empty() && self.handled_scoped.is_empty()
    }

    /// True if `abi` can enforce everything this config asks for.
    pub fn compatible_with_abi(&self, abi: &AbiInfo) -> bool {
        self.handled_fs.is_subset(abi.supported_fs)
            && self.handled_net.is_subset(abi.supported_net)
            && self.handled_scoped.is_subset(abi.supported_scoped)
            && self.restrict_flags.is_subset(abi.supported_flags)
    }

    /// The oldest ABI able to enforce this config.
    pub fn lowest_compatible_abi(&self) -> Option<&'static AbiInfo> {
        ABI_INFOS.iter().find(|abi| self.compatible_with_abi(abi))
    }

    /// Intersects every handled set with what `abi` supports.
    pub(crate) fn restrict_to(&self, abi: &AbiInfo) -> Config {
        Config {
            handled_fs: self.handled_fs.intersection(abi.supported_fs),
            handled_net: self.handled_net.intersection(abi.supported_net),
            handled_scoped: self.handled_scoped.intersection(abi.supported_scoped),
            restrict_flags: self.restrict_flags.intersection(abi.supported_flags),
            best_effort: self.best_effort,
        }
    }

    /// Keeps only the filesystem part.
    pub(crate) fn fs_only(&self) -> Config {
        Config {
            handled_net: AccessNet::empty(),
            handled_scoped: Scope::empty(),
            ..*self
        }
    }

    /// Keeps only the network part.
    pub(crate) fn net_only(&self) -> Config {
        Config {
            handled_fs: AccessFs::empty(),
            handled_scoped: Scope::empty(),
            ..*self
        }
    }

    /// Keeps only the scope part.
    pub(crate) fn scoped_only(&self) -> Config {
        Config {
            handled_fs: AccessFs::empty(),
            handled_net: AccessNet::empty(),
            ..*self
        }
    }
}

impl ConfigArg {
    fn kind(&self) -> &'static str {
        match self {
            ConfigArg::Fs(_) => "filesystem access",
            ConfigArg::Net(_) => "network access",
            ConfigArg::Scoped(_) => "scope",
            ConfigArg::Flags(_) => "restrict flags",
        }
    }
}

impl fmt::Display for ConfigArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigArg::Fs(access) => fmt::Display::fmt(access, f),
            ConfigArg::Net(access) => fmt::Display::fmt(access, f),
            ConfigArg::Scoped(scoped) => fmt::Display::fmt(scoped, f),
            ConfigArg::Flags(flags) => fmt::Display::fmt(flags, f),
        }
    }
}

fn fmt_handled<T>(set: T, supported: T) -> String
where
    T: fmt::Display + PartialEq + Default,
{
    if set != T::default() && set == supported {
        "all".to_string()
    } else {
        set.to_string()
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lowest_compatible_abi() {
            Some(abi) => write!(
                f,
                "{{Landlock V{}; FS: {}; Net: {}; Scoped: {}",
                abi.version,
                fmt_handled(self.handled_fs, abi.supported_fs),
                fmt_handled(self.handled_net, abi.supported_net),
                fmt_handled(self.handled_scoped, abi.supported_scoped),
            )?,
            None => write!(
                f,
                "{{Landlock V???; FS: {}; Net: {}; Scoped: {}",
                self.handled_fs, self.handled_net, self.handled_scoped,
            )?,
        }
        if !self.restrict_flags.is_empty() {
            write!(f, "; Flags: {}", self.restrict_flags)?;
        }
        if self.best_effort {
            f.write_str(" (best effort)")?;
        }
        f.write_str("}")
    }
}
