//! Ready-made rule groups for common needs.

use crate::rule::{composite, connect_tcp, ro_dirs, ro_files, CompositeRule, Rule};

/// Directories holding shared libraries on common distributions.
pub const SHARED_LIBRARY_DIRS: &[&str] = &["/lib", "/lib32", "/lib64", "/usr/lib", "/usr/lib32", "/usr/lib64"];

/// Name resolution: the resolver configuration files and TCP port 53.
pub fn dns() -> CompositeRule {
    composite([
        Rule::from(connect_tcp(53)),
        ro_files(["/etc/hosts", "/etc/resolv.conf"]).ignore_if_missing().into(),
    ])
}

/// Read access to the shared library directories that exist on this system.
pub fn shared_libraries() -> CompositeRule {
    composite([ro_dirs(SHARED_LIBRARY_DIRS.iter().copied()).ignore_if_missing()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessFs;
    use crate::config::Config;
    use crate::kernel::fake::{Call, FakeKernel};

    #[test]
    fn dns_needs_network_rights() {
        let dns = Rule::from(dns());
        assert!(!dns.compatible_with_config(&Config::V3));
        assert!(dns.compatible_with_config(&Config::V4));
    }

    #[test]
    fn shared_libraries_skip_missing_directories() {
        let kernel = FakeKernel::default();
        Config::V1.restrict_with(&kernel, [shared_libraries()]).unwrap();
        let added = kernel
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::AddPath { .. }))
            .count();
        let existing = SHARED_LIBRARY_DIRS
            .iter()
            .filter(|dir| std::path::Path::new(dir).is_dir())
            .count();
        assert_eq!(added, existing);
        assert!(kernel.calls().iter().all(|call| match call {
            Call::AddPath { access, .. } => *access == AccessFs::READ,
            _ => true,
        }));
    }
}
