//! Enforcing a policy on the current process.
//!
//! The pipeline is linear and makes no retries:
//!
//! 1. validate the rules against the config (no kernel calls),
//! 2. probe the ABI and, for best-effort configs, downgrade,
//! 3. create the ruleset and populate it,
//! 4. set no-new-privileges and restrict every thread.
//!
//! Enforcement is irreversible. A failure before step 4 leaves the process
//! untouched.

use std::fmt;
use std::os::fd::AsFd;

use log::{debug, info, warn};
use ll_sys::landlock::RulesetAttr;
use ll_sys::Errno;

use crate::abi;
use crate::access::Scope;
use crate::config::Config;
use crate::downgrade::{downgrade, Downgraded};
use crate::error::Error;
use crate::kernel::{Kernel, Syscalls};
use crate::rule::Rule;

/// What an enforcement call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enforced {
    /// The config after negotiation with the kernel.
    pub config: Config,
    /// The ABI version the kernel was treated as.
    pub abi_version: u32,
    active: bool,
}

impl Enforced {
    fn noop(config: Config, abi_version: u32) -> Self {
        Enforced {
            config,
            abi_version,
            active: false,
        }
    }

    /// True if nothing was restricted, because the policy handles nothing or
    /// a best-effort policy could not be honoured on this kernel.
    pub fn is_noop(&self) -> bool {
        !self.active
    }
}

impl fmt::Display for Enforced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.active {
            write!(f, "enforced {} on Landlock ABI v{}", self.config, self.abi_version)
        } else {
            write!(f, "nothing enforced on Landlock ABI v{}", self.abi_version)
        }
    }
}

impl Config {
    /// Enforces the config and `rules` on every thread of the process.
    ///
    /// # Errors
    ///
    /// See [`Error`]. Best-effort configs only turn missing kernel support
    /// into a no-op; policy errors are reported either way.
    pub fn restrict<I>(&self, rules: I) -> Result<Enforced, Error>
    where
        I: IntoIterator,
        I::Item: Into<Rule>,
    {
        self.restrict_with(&Syscalls, rules)
    }

    /// Like [`restrict`](Config::restrict), using only the filesystem part of the config.
    pub fn restrict_paths<I>(&self, rules: I) -> Result<Enforced, Error>
    where
        I: IntoIterator,
        I::Item: Into<Rule>,
    {
        self.fs_only().restrict(rules)
    }

    /// Like [`restrict`](Config::restrict), using only the network part of the config.
    pub fn restrict_net<I>(&self, rules: I) -> Result<Enforced, Error>
    where
        I: IntoIterator,
        I::Item: Into<Rule>,
    {
        self.net_only().restrict(rules)
    }

    /// Like [`restrict`](Config::restrict), using only the scope part of the config.
    pub fn restrict_scoped<I>(&self, rules: I) -> Result<Enforced, Error>
    where
        I: IntoIterator,
        I::Item: Into<Rule>,
    {
        self.scoped_only().restrict(rules)
    }

    /// Like [`restrict`](Config::restrict), against the given kernel.
    pub fn restrict_with<I>(&self, kernel: &dyn Kernel, rules: I) -> Result<Enforced, Error>
    where
        I: IntoIterator,
        I::Item: Into<Rule>,
    {
        enforce(kernel, *self, rules.into_iter().map(Into::into).collect())
    }
}

fn enforce(kernel: &dyn Kernel, config: Config, rules: Vec<Rule>) -> Result<Enforced, Error> {
    for rule in &rules {
        rule.check(&config)?;
    }

    let abi = abi::probe(kernel);
    debug!("kernel supports Landlock ABI v{}", abi.version);

    let (config, rules) = if config.is_best_effort() {
        match downgrade(&config, &rules, abi) {
            Downgraded::Narrowed(config, rules) => (config, rules),
            Downgraded::Fallback => {
                warn!("Landlock ABI v{} cannot honour {config} partially, not enforcing it", abi.version);
                return Ok(Enforced::noop(Config::default().best_effort(), abi.version));
            }
        }
    } else {
        (config, rules)
    };

    if !config.compatible_with_abi(abi) {
        return Err(Error::MissingSupport {
            found: abi.version,
            wanted: config,
        });
    }

    let exempted = rules
        .iter()
        .fold(Scope::empty(), |acc, rule| acc.union(rule.scope_exemptions()));
    let attr = RulesetAttr {
        handled_access_fs: config.handled_fs().bits(),
        handled_access_net: config.handled_net().bits(),
        scoped: config.handled_scoped().difference(exempted).bits(),
    };
    if attr == RulesetAttr::default() {
        info!("{config} restricts nothing");
        return Ok(Enforced::noop(config, abi.version));
    }

    let ruleset = kernel.create_ruleset(&attr).map_err(|errno| match errno {
        Errno::ENOSYS | Errno::EOPNOTSUPP => Error::Unavailable(errno),
        Errno::EINVAL => Error::bug(
            "landlock_create_ruleset: unknown flags, unknown access, or too small size",
            errno,
        ),
        _ => Error::bug("landlock_create_ruleset", errno),
    })?;

    for rule in &rules {
        rule.add_to_ruleset(kernel, ruleset.as_fd(), &config)?;
    }

    kernel
        .no_new_privs_all_threads()
        .map_err(|errno| Error::bug("prctl(PR_SET_NO_NEW_PRIVS)", errno))?;

    kernel
        .restrict_self_all_threads(ruleset.as_fd(), config.restrict_flags())
        .map_err(|errno| match errno {
            Errno::E2BIG => Error::TooManyRulesets(errno),
            _ => Error::bug("landlock_restrict_self", errno),
        })?;

    info!("enforced {config} on Landlock ABI v{}", abi.version);
    Ok(Enforced {
        config,
        abi_version: abi.version,
        active: true,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use ll_sys::landlock::ERRATA_SCOPED_SIGNAL;

    use super::*;
    use crate::access::{AccessFs, AccessNet, RestrictFlags};
    use crate::config::ConfigArg;
    use crate::kernel::fake::{Call, FakeKernel};
    use crate::rule::{bind_tcp, connect_tcp, path_access, ro_dirs, ro_files, rw_dirs, scope_exempt};

    fn scratch() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn created(kernel: &FakeKernel) -> RulesetAttr {
        kernel
            .calls()
            .into_iter()
            .find_map(|call| match call {
                Call::CreateRuleset(attr) => Some(attr),
                _ => None,
            })
            .expect("no ruleset was created")
    }

    #[test]
    fn full_pipeline_call_order() {
        let dir = scratch();
        let kernel = FakeKernel::default();
        let enforced = Config::V7
            .restrict_with(&kernel, [Rule::from(ro_dirs([dir.path()])), connect_tcp(443).into()])
            .unwrap();
        assert!(!enforced.is_noop());
        assert_eq!(enforced.abi_version, 7);

        let canonical = dir.path().canonicalize().unwrap();
        assert_eq!(
            kernel.calls(),
            vec![
                Call::CreateRuleset(RulesetAttr {
                    handled_access_fs: AccessFs::all().bits(),
                    handled_access_net: AccessNet::all().bits(),
                    scoped: Scope::all().bits(),
                }),
                Call::AddPath {
                    path: Some(canonical),
                    access: AccessFs::READ,
                },
                Call::AddNet {
                    port: 443,
                    access: AccessNet::CONNECT_TCP,
                },
                Call::NoNewPrivs,
                Call::RestrictSelf(RestrictFlags::empty()),
            ]
        );
    }

    #[test]
    fn restrict_flags_reach_restrict_self() {
        let kernel = FakeKernel::default();
        let config = Config::new([ConfigArg::from(AccessFs::READ_FILE), RestrictFlags::LOG_NEW_EXEC_ON.into()]).unwrap();
        config.restrict_with(&kernel, Vec::<Rule>::new()).unwrap();
        assert_eq!(
            kernel.calls().last(),
            Some(&Call::RestrictSelf(RestrictFlags::LOG_NEW_EXEC_ON))
        );
    }

    #[test]
    fn strict_mode_needs_kernel_support() {
        let kernel = FakeKernel::with_abi(3);
        let err = Config::V4.restrict_with(&kernel, Vec::<Rule>::new()).unwrap_err();
        match err {
            Error::MissingSupport { found, wanted } => {
                assert_eq!(found, 3);
                assert_eq!(wanted, Config::V4);
            }
            other => panic!("unexpected {other}"),
        }
        assert!(kernel.calls().is_empty());
    }

    #[test]
    fn best_effort_downgrades() {
        let kernel = FakeKernel::with_abi(1);
        let enforced = Config::V5
            .best_effort()
            .restrict_with(&kernel, [bind_tcp(80)])
            .unwrap();
        assert!(!enforced.is_noop());
        assert_eq!(enforced.config, Config::V1.best_effort());
        assert_eq!(created(&kernel).handled_access_net, 0);
        assert!(!kernel.calls().iter().any(|call| matches!(call, Call::AddNet { .. })));
    }

    #[test]
    fn best_effort_falls_back_when_refer_is_missing() {
        let kernel = FakeKernel::with_abi(1);
        let enforced = Config::V2
            .best_effort()
            .restrict_with(&kernel, [rw_dirs(["/tmp"]).with_refer()])
            .unwrap();
        assert!(enforced.is_noop());
        assert_eq!(enforced.config.handled_fs(), AccessFs::empty());
        assert!(kernel.calls().is_empty());
    }

    #[test]
    fn best_effort_without_landlock_is_a_noop() {
        let kernel = FakeKernel {
            abi: Err(Errno::ENOSYS),
            ..FakeKernel::default()
        };
        let enforced = Config::V3.best_effort().restrict_with(&kernel, [ro_dirs(["/"])]).unwrap();
        assert!(enforced.is_noop());
        assert_eq!(enforced.abi_version, 0);
        assert!(kernel.calls().is_empty());
    }

    #[test]
    fn incompatible_rules_fail_even_in_best_effort_mode() {
        let kernel = FakeKernel::default();
        let config = Config::new([AccessFs::READ_FILE]).unwrap().best_effort();
        let err = config
            .restrict_with(&kernel, [path_access(AccessFs::WRITE_FILE, ["/tmp"])])
            .unwrap_err();
        assert!(matches!(err, Error::IncompatibleRule { .. }), "{err}");
        assert!(kernel.calls().is_empty());
    }

    #[test]
    fn empty_rights_are_rejected_before_any_kernel_call() {
        let kernel = FakeKernel::default();
        let err = Config::V3
            .best_effort()
            .restrict_with(&kernel, [path_access(AccessFs::empty(), ["/tmp"])])
            .unwrap_err();
        assert!(matches!(err, Error::EmptyRights { .. }), "{err}");
        assert_eq!(err.errno(), Some(Errno::ENOMSG));
        assert!(kernel.calls().is_empty());
    }

    #[test]
    fn nothing_handled_is_a_noop() {
        let kernel = FakeKernel::default();
        let enforced = Config::default().restrict_with(&kernel, Vec::<Rule>::new()).unwrap();
        assert!(enforced.is_noop());
        assert!(kernel.calls().is_empty());
    }

    #[test]
    fn scope_exemptions_shrink_the_handled_scopes() {
        let kernel = FakeKernel::default();
        Config::V6
            .scoped_only()
            .restrict_with(&kernel, [scope_exempt(Scope::SIGNAL)])
            .unwrap();
        assert_eq!(created(&kernel).scoped, Scope::ABSTRACT_UNIX_SOCKET.bits());
    }

    #[test]
    fn fully_exempted_scopes_restrict_nothing() {
        let kernel = FakeKernel::default();
        let enforced = Config::V6
            .scoped_only()
            .restrict_with(&kernel, [scope_exempt(Scope::all())])
            .unwrap();
        assert!(enforced.is_noop());
        assert!(kernel.calls().is_empty());
    }

    #[test]
    fn partial_configs() {
        let kernel = FakeKernel::default();
        Config::V6.net_only().restrict_with(&kernel, [bind_tcp(8080)]).unwrap();
        let attr = created(&kernel);
        assert_eq!(attr.handled_access_fs, 0);
        assert_eq!(attr.handled_access_net, AccessNet::all().bits());
        assert_eq!(attr.scoped, 0);

        let err = Config::V6
            .fs_only()
            .restrict_with(&FakeKernel::default(), [bind_tcp(8080)])
            .unwrap_err();
        assert!(matches!(err, Error::IncompatibleRule { .. }));
    }

    #[test]
    fn create_errors_are_classified() {
        let cases = [
            (Errno::ENOSYS, false),
            (Errno::EOPNOTSUPP, false),
            (Errno::EINVAL, true),
            (Errno::ENOMEM, true),
        ];
        for (errno, bug) in cases {
            let kernel = FakeKernel {
                create: Err(errno),
                ..FakeKernel::default()
            };
            let err = Config::V1.restrict_with(&kernel, Vec::<Rule>::new()).unwrap_err();
            assert_eq!(err.is_bug(), bug, "{errno}: {err}");
            assert_eq!(err.errno(), Some(errno));
            if !bug {
                assert!(matches!(err, Error::Unavailable(_)));
            }
        }
    }

    #[test]
    fn missing_paths() {
        let dir = scratch();
        let missing = dir.path().join("missing");

        let err = Config::V1
            .restrict_with(&FakeKernel::default(), [ro_dirs([&missing])])
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
        assert!(!err.is_bug());

        let kernel = FakeKernel::default();
        Config::V1
            .restrict_with(&kernel, [ro_dirs([missing.clone(), dir.path().to_path_buf()]).ignore_if_missing()])
            .unwrap();
        let added: Vec<PathBuf> = kernel
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::AddPath { path, .. } => path,
                _ => None,
            })
            .collect();
        assert_eq!(added, vec![dir.path().canonicalize().unwrap()]);
    }

    #[test]
    fn directory_rights_on_a_file_are_a_policy_error() {
        let dir = scratch();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        let err = Config::V1
            .restrict_with(&FakeKernel::default(), [ro_dirs([&file])])
            .unwrap_err();
        match &err {
            Error::NotADirectory { access, .. } => assert_eq!(*access, AccessFs::READ_DIR),
            other => panic!("unexpected {other}"),
        }
        assert!(!err.is_bug());

        let kernel = FakeKernel::default();
        Config::V1.restrict_with(&kernel, [ro_files([&file])]).unwrap();
    }

    #[test]
    fn clipped_to_nothing_is_skipped() {
        let dir = scratch();
        let kernel = FakeKernel::default();
        let config = Config::new([AccessFs::MAKE_SOCK]).unwrap();
        config.restrict_with(&kernel, [ro_dirs([dir.path()])]).unwrap();
        assert!(!kernel.calls().iter().any(|call| matches!(call, Call::AddPath { .. })));
    }

    #[test]
    fn add_rule_errors_are_classified() {
        let dir = scratch();
        let kernel = FakeKernel {
            add_rule: Err(Errno::ENOMSG),
            ..FakeKernel::default()
        };
        let err = Config::V1.restrict_with(&kernel, [ro_dirs([dir.path()])]).unwrap_err();
        assert!(matches!(err, Error::EmptyRights { .. }), "{err}");

        let kernel = FakeKernel {
            add_rule: Err(Errno::EBADF),
            ..FakeKernel::default()
        };
        let err = Config::V1.restrict_with(&kernel, [ro_dirs([dir.path()])]).unwrap_err();
        assert!(err.is_bug(), "{err}");
        assert!(!kernel.calls().contains(&Call::NoNewPrivs));
    }

    #[test]
    fn restrict_errors_are_classified() {
        let kernel = FakeKernel {
            restrict: Err(Errno::E2BIG),
            ..FakeKernel::default()
        };
        let err = Config::V1.restrict_with(&kernel, Vec::<Rule>::new()).unwrap_err();
        assert!(matches!(err, Error::TooManyRulesets(_)), "{err}");
        assert!(!err.is_bug());

        let kernel = FakeKernel {
            no_new_privs: Err(Errno::EPERM),
            ..FakeKernel::default()
        };
        let err = Config::V1.restrict_with(&kernel, Vec::<Rule>::new()).unwrap_err();
        assert!(err.is_bug(), "{err}");
        assert!(!kernel
            .calls()
            .iter()
            .any(|call| matches!(call, Call::RestrictSelf(_))));
    }

    #[test]
    fn unfixed_abi_6_kernels_lose_scoping_in_best_effort_mode() {
        let kernel = FakeKernel {
            errata: Ok(!ERRATA_SCOPED_SIGNAL),
            ..FakeKernel::with_abi(6)
        };
        let enforced = Config::V6.best_effort().restrict_with(&kernel, Vec::<Rule>::new()).unwrap();
        assert_eq!(enforced.abi_version, 5);
        assert_eq!(created(&kernel).scoped, 0);
    }
}
