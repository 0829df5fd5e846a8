//! Policies described in JSON or TOML.
//!
//! ```toml
//! abi = 4
//! best_effort = true
//!
//! [[rules]]
//! type = "ro_dirs"
//! paths = ["/usr", "/etc"]
//!
//! [[rules]]
//! type = "rw_dirs"
//! paths = ["$CWD", "$HOME/.cache"]
//! ignore_if_missing = true
//!
//! [[rules]]
//! type = "connect_tcp"
//! port = 443
//! ```
//!
//! Paths may start with `$HOME` or be exactly `$CWD`.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::abi;
use crate::access::{AccessFs, AccessNet, RestrictFlags, Scope};
use crate::config::{Config, ConfigArg, ConfigError};
use crate::rule::{self, bind_tcp, composite, connect_tcp, scope_exempt, PathRule, Rule};

/// Environment variable holding a JSON policy.
pub const POLICY_ENV_VAR: &str = "LL_POLICY";

/// Errors from reading or interpreting a policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("reading policy {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON policy: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML policy: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unknown {kind} name {name:?}")]
    UnknownName { kind: &'static str, name: String },
    #[error("unknown Landlock ABI version {0}")]
    UnknownAbi(u32),
    #[error("`abi` and `handled` are mutually exclusive")]
    AbiAndHandled,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A serializable description of a [`Config`] and its rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Policy {
    /// Handle everything this ABI version supports.
    pub abi: Option<u32>,
    /// Handle exactly these rights.
    pub handled: Option<Handled>,
    pub best_effort: bool,
    pub rules: Vec<RuleSpec>,
}

/// Handled rights by name, such as `fs = ["read_file", "write_file"]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Handled {
    pub fs: Vec<String>,
    pub net: Vec<String>,
    pub scoped: Vec<String>,
    pub flags: Vec<String>,
}

/// Paths and modifiers shared by the canned path rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathSpec {
    pub paths: Vec<String>,
    #[serde(default)]
    pub refer: bool,
    #[serde(default)]
    pub ioctl_dev: bool,
    #[serde(default)]
    pub ignore_if_missing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleSpec {
    PathAccess {
        access: Vec<String>,
        paths: Vec<String>,
        #[serde(default)]
        ignore_if_missing: bool,
    },
    RoDirs(PathSpec),
    RwDirs(PathSpec),
    RoFiles(PathSpec),
    RwFiles(PathSpec),
    BindTcp {
        port: u16,
    },
    ConnectTcp {
        port: u16,
    },
    ScopeExempt {
        scoped: Vec<String>,
    },
    Group {
        rules: Vec<RuleSpec>,
    },
}

impl Policy {
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, PolicyError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_toml(text: &str) -> Result<Self, PolicyError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads a policy file: TOML for `.toml`, JSON otherwise.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&text),
            _ => Self::from_json(&text),
        }
    }

    /// Reads the policy from `LL_POLICY`. `None` if the variable is unset.
    pub fn from_env() -> Result<Option<Self>, PolicyError> {
        match env::var(POLICY_ENV_VAR) {
            Ok(json) => Self::from_json(&json).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Builds the config and rules this policy describes.
    ///
    /// Without `abi` or `handled`, the config handles everything the newest
    /// known ABI supports.
    pub fn to_parts(&self) -> Result<(Config, Vec<Rule>), PolicyError> {
        let config = match (self.abi, &self.handled) {
            (Some(_), Some(_)) => return Err(PolicyError::AbiAndHandled),
            (Some(version), None) => abi::get(version)
                .ok_or(PolicyError::UnknownAbi(version))?
                .as_config(),
            (None, Some(handled)) => handled.to_config()?,
            (None, None) => abi::highest_known().as_config(),
        };
        let config = if self.best_effort { config.best_effort() } else { config };
        let rules = self.rules.iter().map(RuleSpec::to_rule).collect::<Result<_, _>>()?;
        Ok((config, rules))
    }
}

impl Handled {
    fn to_config(&self) -> Result<Config, PolicyError> {
        let args: [ConfigArg; 4] = [
            parse_names(&self.fs, "filesystem access", AccessFs::from_canonical_name)?.into(),
            parse_names(&self.net, "network access", AccessNet::from_canonical_name)?.into(),
            parse_names(&self.scoped, "scope", Scope::from_canonical_name)?.into(),
            parse_names(&self.flags, "restrict flag", RestrictFlags::from_canonical_name)?.into(),
        ];
        Ok(Config::new(args)?)
    }
}

impl RuleSpec {
    fn to_rule(&self) -> Result<Rule, PolicyError> {
        Ok(match self {
            RuleSpec::PathAccess {
                access,
                paths,
                ignore_if_missing,
            } => {
                let access = parse_names(access, "filesystem access", AccessFs::from_canonical_name)?;
                let rule = rule::path_access(access, paths.iter().map(|p| resolve_path(p)));
                if *ignore_if_missing {
                    rule.ignore_if_missing().into()
                } else {
                    rule.into()
                }
            }
            RuleSpec::RoDirs(spec) => spec.apply(rule::ro_dirs(spec.resolved())).into(),
            RuleSpec::RwDirs(spec) => spec.apply(rule::rw_dirs(spec.resolved())).into(),
            RuleSpec::RoFiles(spec) => spec.apply(rule::ro_files(spec.resolved())).into(),
            RuleSpec::RwFiles(spec) => spec.apply(rule::rw_files(spec.resolved())).into(),
            RuleSpec::BindTcp { port } => bind_tcp(*port).into(),
            RuleSpec::ConnectTcp { port } => connect_tcp(*port).into(),
            RuleSpec::ScopeExempt { scoped } => {
                scope_exempt(parse_names(scoped, "scope", Scope::from_canonical_name)?).into()
            }
            RuleSpec::Group { rules } => {
                composite(rules.iter().map(RuleSpec::to_rule).collect::<Result<Vec<_>, _>>()?).into()
            }
        })
    }
}

impl PathSpec {
    fn resolved(&self) -> Vec<PathBuf> {
        self.paths.iter().map(|p| resolve_path(p)).collect()
    }

    fn apply(&self, mut rule: PathRule) -> PathRule {
        if self.refer {
            rule = rule.with_refer();
        }
        if self.ioctl_dev {
            rule = rule.with_ioctl_dev();
        }
        if self.ignore_if_missing {
            rule = rule.ignore_if_missing();
        }
        rule
    }
}

fn parse_names<T>(names: &[String], kind: &'static str, from_name: fn(&str) -> Option<T>) -> Result<T, PolicyError>
where
    T: Default + std::ops::BitOr<Output = T>,
{
    names.iter().try_fold(T::default(), |acc, name| {
        from_name(name)
            .map(|bit| acc | bit)
            .ok_or_else(|| PolicyError::UnknownName {
                kind,
                name: name.clone(),
            })
    })
}

/// Resolve path placeholders: `$CWD` → current_dir(), `$HOME` → $HOME env var.
pub fn resolve_path(s: &str) -> PathBuf {
    let home = || env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."));
    match s {
        "$CWD" => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        "$HOME" => home(),
        other => match other.strip_prefix("$HOME/") {
            Some(rest) => home().join(rest),
            None => PathBuf::from(other),
        },
    }
}
