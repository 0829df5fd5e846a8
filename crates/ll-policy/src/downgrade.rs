//! Fitting a best-effort policy to an older kernel.

use crate::abi::AbiInfo;
use crate::config::Config;
use crate::rule::Rule;

/// Outcome of [`downgrade`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Downgraded {
    /// The policy, narrowed to what the ABI supports.
    Narrowed(Config, Vec<Rule>),
    /// The policy cannot be honoured partially. Nothing should be enforced.
    Fallback,
}

/// Narrows `config` and `rules` to what `abi` supports.
///
/// Each handled set is intersected with the ABI's, then each rule with the
/// narrowed config. A rule asking for `refer` on an ABI without it turns the
/// whole policy into [`Downgraded::Fallback`].
pub fn downgrade(config: &Config, rules: &[Rule], abi: &AbiInfo) -> Downgraded {
    let config = config.restrict_to(abi);
    let rules: Option<Vec<Rule>> = rules.iter().map(|rule| rule.downgrade(&config)).collect();
    match rules {
        Some(rules) => Downgraded::Narrowed(config, rules),
        None => Downgraded::Fallback,
    }
}
