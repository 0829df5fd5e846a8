//! Rules grant back some of the rights a [`Config`] handles.
//!
//! Rules are built with the factory functions in this module and combined
//! with [`composite`]:
//!
//! ```no_run
//! use ll_policy::rule::{composite, connect_tcp, ro_dirs, rw_dirs, Rule};
//!
//! let rules = composite::<_, Rule>([
//!     ro_dirs(["/usr", "/etc"]).into(),
//!     rw_dirs(["/tmp"]).ignore_if_missing().into(),
//!     connect_tcp(443).into(),
//! ]);
//! ```

use std::fmt;
use std::fs::OpenOptions;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use ll_sys::Errno;

use crate::access::{AccessFs, AccessNet, Scope};
use crate::config::Config;
use crate::error::Error;
use crate::kernel::Kernel;

#[cfg(any(target_os = "linux", target_os = "android"))]
const O_PATH: libc::c_int = libc::O_PATH;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const O_PATH: libc::c_int = 0;

/// A single grant, or a group of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Path(PathRule),
    Net(NetRule),
    Scope(ScopeRule),
    Composite(CompositeRule),
}

/// Grants filesystem rights beneath a list of paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRule {
    access: AccessFs,
    paths: Vec<PathBuf>,
    // Requested rights must all be handled, instead of being clipped to
    // whatever the config handles.
    enforce_subset: bool,
    ignore_if_missing: bool,
}

/// Grants binding or connecting to one TCP port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetRule {
    access: AccessNet,
    port: u16,
}

/// Exempts the process from some of the handled IPC scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeRule {
    scoped: Scope,
}

/// Several rules applied in order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompositeRule {
    rules: Vec<Rule>,
}

/// Grants exactly `access` beneath `paths`.
///
/// Every right in `access` must be handled by the config the rule is used
/// with. An empty `access` over a non-empty path list is rejected.
pub fn path_access<I, P>(access: AccessFs, paths: I) -> PathRule
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    PathRule {
        access,
        paths: paths.into_iter().map(Into::into).collect(),
        enforce_subset: true,
        ignore_if_missing: false,
    }
}

fn canned<I, P>(access: AccessFs, paths: I) -> PathRule
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    PathRule {
        enforce_subset: false,
        ..path_access(access, paths)
    }
}

/// Read-only access to directory trees: execute, read files, list directories.
pub fn ro_dirs<I, P>(paths: I) -> PathRule
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    canned(AccessFs::READ, paths)
}

/// Read-write access to directory trees.
pub fn rw_dirs<I, P>(paths: I) -> PathRule
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    canned(AccessFs::READ_WRITE, paths)
}

/// Read-only access to individual files.
pub fn ro_files<I, P>(paths: I) -> PathRule
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    canned(AccessFs::READ.intersection(AccessFs::FILE), paths)
}

/// Read-write access to individual files.
pub fn rw_files<I, P>(paths: I) -> PathRule
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    canned(AccessFs::READ_WRITE.intersection(AccessFs::FILE), paths)
}

/// Permits `bind(2)` on a TCP port.
pub fn bind_tcp(port: u16) -> NetRule {
    NetRule {
        access: AccessNet::BIND_TCP,
        port,
    }
}

/// Permits `connect(2)` to a TCP port.
pub fn connect_tcp(port: u16) -> NetRule {
    NetRule {
        access: AccessNet::CONNECT_TCP,
        port,
    }
}

/// Lifts the given scopes again.
pub fn scope_exempt(scoped: Scope) -> ScopeRule {
    ScopeRule { scoped }
}

pub fn composite<I, R>(rules: I) -> CompositeRule
where
    I: IntoIterator<Item = R>,
    R: Into<Rule>,
{
    CompositeRule {
        rules: rules.into_iter().map(Into::into).collect(),
    }
}

impl PathRule {
    fn with_rights(mut self, access: AccessFs) -> Self {
        self.access = self.access.union(access);
        self
    }

    /// Also permits linking and renaming across directories.
    ///
    /// Unlike other rights, `refer` is never dropped silently: a best-effort
    /// policy asking for it on a kernel without it is not enforced at all.
    #[must_use]
    pub fn with_refer(self) -> Self {
        self.with_rights(AccessFs::REFER)
    }

    /// Also permits `ioctl(2)` on character and block devices.
    #[must_use]
    pub fn with_ioctl_dev(self) -> Self {
        self.with_rights(AccessFs::IOCTL_DEV)
    }

    /// Paths that do not exist are skipped instead of failing the policy.
    #[must_use]
    pub fn ignore_if_missing(mut self) -> Self {
        self.ignore_if_missing = true;
        self
    }

    pub fn access(&self) -> AccessFs {
        self.access
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_ignore_if_missing(&self) -> bool {
        self.ignore_if_missing
    }

    fn compatible_with_config(&self, config: &Config) -> bool {
        let required = if self.enforce_subset {
            self.access
        } else {
            self.access.intersection(AccessFs::ALL_OR_NOTHING)
        };
        required.is_subset(config.handled_fs())
    }

    fn downgrade(&self, config: &Config) -> Option<PathRule> {
        if !self
            .access
            .intersection(AccessFs::ALL_OR_NOTHING)
            .is_subset(config.handled_fs())
        {
            return None;
        }
        Some(PathRule {
            access: self.access.intersection(config.handled_fs()),
            ..self.clone()
        })
    }

    fn add_to_ruleset(&self, kernel: &dyn Kernel, ruleset: BorrowedFd<'_>, config: &Config) -> Result<(), Error> {
        let access = self.access.intersection(config.handled_fs());
        if access.is_empty() {
            debug!("skipping {self}: no handled rights left");
            return Ok(());
        }
        for path in &self.paths {
            match add_path_beneath(kernel, ruleset, path, access) {
                Err(err) if self.ignore_if_missing && err.is_not_found() => {
                    warn!("ignoring missing path {}", path.display());
                }
                result => result?,
            }
        }
        Ok(())
    }
}

fn add_path_beneath(kernel: &dyn Kernel, ruleset: BorrowedFd<'_>, path: &Path, access: AccessFs) -> Result<(), Error> {
    let path_error = |source| Error::Path {
        path: path.to_path_buf(),
        source,
    };
    // Closed when it goes out of scope, whatever happens below.
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(O_PATH)
        .open(path)
        .map_err(path_error)?;

    if !file.metadata().map_err(path_error)?.is_dir() && !access.is_subset(AccessFs::FILE) {
        return Err(Error::NotADirectory {
            path: path.to_path_buf(),
            access: access.difference(AccessFs::FILE),
        });
    }

    debug!("granting {access} beneath {}", path.display());
    kernel
        .add_path_beneath(ruleset, file.as_fd(), access)
        .map_err(|errno| match errno {
            Errno::ENOMSG => Error::EmptyRights {
                paths: vec![path.to_path_buf()],
            },
            Errno::EINVAL => Error::bug(
                "landlock_add_rule: unknown flags or access rights not handled by the ruleset",
                errno,
            ),
            _ => Error::bug("landlock_add_rule", errno),
        })
}

impl NetRule {
    pub fn access(&self) -> AccessNet {
        self.access
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn add_to_ruleset(&self, kernel: &dyn Kernel, ruleset: BorrowedFd<'_>, config: &Config) -> Result<(), Error> {
        let access = self.access.intersection(config.handled_net());
        if access.is_empty() {
            debug!("skipping {self}: not handled");
            return Ok(());
        }
        debug!("granting {access} on TCP port {}", self.port);
        kernel
            .add_net_port(ruleset, self.port, access)
            .map_err(|errno| Error::bug("landlock_add_rule", errno))
    }
}

impl ScopeRule {
    pub fn scoped(&self) -> Scope {
        self.scoped
    }
}

impl CompositeRule {
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl Rule {
    /// True if `config` handles what this rule needs.
    ///
    /// Path rules built with [`path_access`] need every requested right
    /// handled. Canned path rules only need `refer` handled when they ask for
    /// it; their other rights are clipped to the config.
    pub fn compatible_with_config(&self, config: &Config) -> bool {
        match self {
            Rule::Path(rule) => rule.compatible_with_config(config),
            Rule::Net(rule) => rule.access.is_subset(config.handled_net()),
            Rule::Scope(rule) => rule.scoped.is_subset(config.handled_scoped()),
            Rule::Composite(rule) => rule.rules.iter().all(|r| r.compatible_with_config(config)),
        }
    }

    /// Compatibility and empty-rights validation. Makes no kernel calls.
    pub(crate) fn check(&self, config: &Config) -> Result<(), Error> {
        match self {
            Rule::Composite(rule) => rule.rules.iter().try_for_each(|r| r.check(config)),
            _ if !self.compatible_with_config(config) => Err(Error::IncompatibleRule {
                rule: self.to_string(),
                config: *config,
            }),
            Rule::Path(rule) if rule.enforce_subset && rule.access.is_empty() && !rule.paths.is_empty() => {
                Err(Error::EmptyRights {
                    paths: rule.paths.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Narrows the rule to `config`. `None` if it cannot be honoured partially.
    pub(crate) fn downgrade(&self, config: &Config) -> Option<Rule> {
        Some(match self {
            Rule::Path(rule) => Rule::Path(rule.downgrade(config)?),
            Rule::Net(rule) => Rule::Net(NetRule {
                access: rule.access.intersection(config.handled_net()),
                ..*rule
            }),
            Rule::Scope(rule) => Rule::Scope(ScopeRule {
                scoped: rule.scoped.intersection(config.handled_scoped()),
            }),
            Rule::Composite(rule) => Rule::Composite(CompositeRule {
                rules: rule
                    .rules
                    .iter()
                    .map(|r| r.downgrade(config))
                    .collect::<Option<_>>()?,
            }),
        })
    }

    /// Scopes this rule exempts from.
    pub(crate) fn scope_exemptions(&self) -> Scope {
        match self {
            Rule::Scope(rule) => rule.scoped,
            Rule::Composite(rule) => rule
                .rules
                .iter()
                .fold(Scope::empty(), |acc, r| acc.union(r.scope_exemptions())),
            Rule::Path(_) | Rule::Net(_) => Scope::empty(),
        }
    }

    /// Registers the rule's entries in `ruleset`.
    ///
    /// Scope exemptions have no entries; they are folded into the ruleset
    /// attribute when it is created.
    pub(crate) fn add_to_ruleset(
        &self,
        kernel: &dyn Kernel,
        ruleset: BorrowedFd<'_>,
        config: &Config,
    ) -> Result<(), Error> {
        match self {
            Rule::Path(rule) => rule.add_to_ruleset(kernel, ruleset, config),
            Rule::Net(rule) => rule.add_to_ruleset(kernel, ruleset, config),
            Rule::Scope(_) => Ok(()),
            Rule::Composite(rule) => rule
                .rules
                .iter()
                .try_for_each(|r| r.add_to_ruleset(kernel, ruleset, config)),
        }
    }
}

impl From<PathRule> for Rule {
    fn from(rule: PathRule) -> Self {
        Rule::Path(rule)
    }
}

impl From<NetRule> for Rule {
    fn from(rule: NetRule) -> Self {
        Rule::Net(rule)
    }
}

impl From<ScopeRule> for Rule {
    fn from(rule: ScopeRule) -> Self {
        Rule::Scope(rule)
    }
}

impl From<CompositeRule> for Rule {
    fn from(rule: CompositeRule) -> Self {
        Rule::Composite(rule)
    }
}

impl fmt::Display for PathRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {:?}", self.access, self.paths)?;
        if self.ignore_if_missing {
            f.write_str(" (ignore if missing)")?;
        }
        Ok(())
    }
}

impl fmt::Display for NetRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on TCP port {}", self.access, self.port)
    }
}

impl fmt::Display for ScopeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exemption from scopes {}", self.scoped)
    }
}

impl fmt::Display for CompositeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, rule) in self.rules.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{rule}")?;
        }
        f.write_str("]")
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Path(rule) => fmt::Display::fmt(rule, f),
            Rule::Net(rule) => fmt::Display::fmt(rule, f),
            Rule::Scope(rule) => fmt::Display::fmt(rule, f),
            Rule::Composite(rule) => fmt::Display::fmt(rule, f),
        }
    }
}
