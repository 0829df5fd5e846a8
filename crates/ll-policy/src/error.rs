use std::io;
use std::path::PathBuf;

use ll_sys::Errno;
use thiserror::Error;

use crate::access::AccessFs;
use crate::config::{Config, ConfigError};

/// Marker carried by errors that point at a defect in this library or an
/// unexpected kernel response, rather than at the caller's policy.
pub const BUG_MARKER: &str = "BUG(ll-policy)";

/// Errors from building or enforcing a Landlock policy.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("incompatible rule {rule}: not covered by {config}")]
    IncompatibleRule { rule: String, config: Config },

    #[error("populating ruleset for {}: {access} only apply to directories", .path.display())]
    NotADirectory { path: PathBuf, access: AccessFs },

    #[error("missing kernel Landlock support: got Landlock ABI v{found}, wanted {wanted}")]
    MissingSupport { found: u32, wanted: Config },

    #[error("Landlock is not supported by the kernel or not enabled at boot time: {0}")]
    Unavailable(Errno),

    #[error("populating ruleset for {}: {source}", .path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("empty access rights for {paths:?}")]
    EmptyRights { paths: Vec<PathBuf> },

    #[error("the maximum number of stacked rulesets is reached for the current thread: {0}")]
    TooManyRulesets(Errno),

    #[error("BUG(ll-policy): this should not have happened: {context}: {errno}")]
    Bug { context: &'static str, errno: Errno },
}

impl Error {
    pub(crate) fn bug(context: &'static str, errno: Errno) -> Self {
        Error::Bug { context, errno }
    }

    /// The low-level error code behind this error, if there is one.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::Config(_) | Error::IncompatibleRule { .. } | Error::NotADirectory { .. } => {
                Some(Errno::EINVAL)
            }
            Error::EmptyRights { .. } => Some(Errno::ENOMSG),
            Error::Unavailable(errno) | Error::TooManyRulesets(errno) | Error::Bug { errno, .. } => {
                Some(*errno)
            }
            Error::Path { source, .. } => source.raw_os_error().map(Errno::from_raw),
            Error::MissingSupport { .. } => None,
        }
    }

    /// True if the error is a defect, not a problem with the policy or the system.
    pub fn is_bug(&self) -> bool {
        matches!(self, Error::Bug { .. })
    }

    /// True if a path named by a rule does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Path { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bug_errors_carry_the_marker() {
        let err = Error::bug("landlock_add_rule", Errno::EBADF);
        assert!(err.is_bug());
        assert_eq!(err.errno(), Some(Errno::EBADF));
        let msg = err.to_string();
        assert!(msg.starts_with(BUG_MARKER), "{msg}");
        assert!(msg.contains("landlock_add_rule"), "{msg}");
    }

    #[test]
    fn not_found_is_detectable() {
        let err = Error::Path {
            path: PathBuf::from("/does/not/exist"),
            source: io::Error::from_raw_os_error(libc::ENOENT),
        };
        assert!(err.is_not_found());
        assert!(!err.is_bug());
        assert_eq!(err.errno(), Some(Errno::ENOENT));
        assert_eq!(
            err.to_string(),
            format!("populating ruleset for /does/not/exist: {}", io::Error::from_raw_os_error(libc::ENOENT))
        );
    }

    #[test]
    fn policy_errors_are_invalid_argument() {
        let err = Error::IncompatibleRule {
            rule: "REFER on [\"/\"]".to_string(),
            config: Config::V1,
        };
        assert_eq!(err.errno(), Some(Errno::EINVAL));
        assert!(err.to_string().contains("incompatible rule"));
        assert!(!err.is_bug());
    }

    #[test]
    fn empty_rights_is_no_message() {
        let err = Error::EmptyRights {
            paths: vec![PathBuf::from("/tmp")],
        };
        assert_eq!(err.errno(), Some(Errno::ENOMSG));
    }
}
