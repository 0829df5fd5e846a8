//! Argument parsing for the `landlock-*` tools.
//!
//! Flags use a single dash, like `-ro` or `-tcp.bind`, and everything after
//! `--` is the command to run.

use std::iter::Peekable;
use std::path::PathBuf;

use ll_policy::rule::{bind_tcp, connect_tcp, ro_dirs, ro_files, rw_dirs, rw_files, PathRule};
use ll_policy::{abi, Config, Rule};
use thiserror::Error;

/// Command run when none is given.
pub const DEFAULT_COMMAND: &str = "/bin/bash";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error("unrecognized option {0:?}")]
    Unrecognized(String),
    #[error("{0} needs a value")]
    MissingValue(String),
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("need proper command, got nothing")]
    MissingCommand,
    #[error("need absolute binary path, got {0:?}")]
    RelativeCommand(String),
    #[error("-policy sets the Landlock version and mode, drop {0:?}")]
    PolicyConflict(String),
}

/// Parsed `landlock-restrict` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct RestrictArgs {
    pub verbose: bool,
    pub help: bool,
    pub config: Config,
    /// The first `-strict` or version flag given, if any.
    pub config_flag: Option<String>,
    pub policy: Option<PathBuf>,
    pub rules: Vec<Rule>,
    pub command: Vec<String>,
}

/// Parses `[-v] [-1..-7] [-strict] [-policy FILE] [-ro|-rw|-rofiles|-rwfiles [+refer] [+ioctl_dev] PATH...]... -- COMMAND...`.
///
/// Defaults to the newest known ABI in best-effort mode.
pub fn parse_restrict(args: &[String]) -> Result<RestrictArgs, ArgsError> {
    let mut parsed = RestrictArgs {
        verbose: false,
        help: false,
        config: Config::default(),
        config_flag: None,
        policy: None,
        rules: Vec::new(),
        command: Vec::new(),
    };
    let mut version = abi::highest_known().version;
    let mut strict = false;

    let mut args = args.iter().peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-v" => parsed.verbose = true,
            "-h" | "-help" | "--help" => parsed.help = true,
            "-strict" => {
                strict = true;
                parsed.config_flag.get_or_insert_with(|| arg.clone());
            }
            "-policy" => {
                let file = args.next().ok_or_else(|| ArgsError::MissingValue(arg.clone()))?;
                parsed.policy = Some(PathBuf::from(file));
            }
            "-ro" | "-rw" | "-rofiles" | "-rwfiles" => {
                parsed.rules.push(take_paths(arg, &mut args).into());
            }
            "--" => {
                parsed.command = args.by_ref().cloned().collect();
                break;
            }
            flag => {
                let selected = flag
                    .strip_prefix('-')
                    .and_then(|v| v.parse::<u32>().ok())
                    .and_then(abi::get)
                    .filter(|info| info.version >= 1);
                match selected {
                    Some(info) => {
                        version = info.version;
                        parsed.config_flag.get_or_insert_with(|| arg.clone());
                    }
                    None => return Err(ArgsError::Unrecognized(flag.to_string())),
                }
            }
        }
    }

    let config = abi::get(version).map(|info| info.as_config()).unwrap_or_default();
    parsed.config = if strict { config } else { config.best_effort() };

    if let (Some(_), Some(flag)) = (&parsed.policy, &parsed.config_flag) {
        return Err(ArgsError::PolicyConflict(flag.clone()));
    }

    if !parsed.help {
        match parsed.command.first() {
            None => return Err(ArgsError::MissingCommand),
            Some(program) if !program.starts_with('/') => {
                return Err(ArgsError::RelativeCommand(program.clone()));
            }
            Some(_) => {}
        }
    }
    Ok(parsed)
}

fn take_paths<'a, I>(kind: &str, args: &mut Peekable<I>) -> PathRule
where
    I: Iterator<Item = &'a String>,
{
    let mut paths = Vec::new();
    let (mut refer, mut ioctl_dev) = (false, false);
    while let Some(arg) = args.next_if(|arg| !arg.starts_with('-')) {
        match arg.as_str() {
            "+refer" => refer = true,
            "+ioctl_dev" => ioctl_dev = true,
            path => paths.push(PathBuf::from(path)),
        }
    }
    let mut rule = match kind {
        "-ro" => ro_dirs(paths),
        "-rw" => rw_dirs(paths),
        "-rofiles" => ro_files(paths),
        _ => rw_files(paths),
    };
    if refer {
        rule = rule.with_refer();
    }
    if ioctl_dev {
        rule = rule.with_ioctl_dev();
    }
    log::debug!("path option: {rule}");
    rule
}

/// Parsed `landlock-restrict-net` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct NetArgs {
    pub help: bool,
    pub rules: Vec<Rule>,
    pub command: Vec<String>,
}

/// Parses `[-tcp.bind PORT]... [-tcp.connect PORT]... [--] [COMMAND...]`.
pub fn parse_net(args: &[String]) -> Result<NetArgs, ArgsError> {
    let mut parsed = NetArgs {
        help: false,
        rules: Vec::new(),
        command: Vec::new(),
    };
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag, Some(value.to_string())),
            None => (arg.as_str(), None),
        };
        match flag.trim_start_matches('-') {
            "h" | "help" => parsed.help = true,
            "tcp.bind" | "tcp.connect" => {
                let value = match inline {
                    Some(value) => value,
                    None => args.next().cloned().ok_or_else(|| ArgsError::MissingValue(flag.to_string()))?,
                };
                let port = value.parse::<u16>().map_err(|_| ArgsError::InvalidPort(value.clone()))?;
                let rule = if flag.ends_with("bind") {
                    log::info!("permit TCP bind on port {port}");
                    bind_tcp(port)
                } else {
                    log::info!("permit TCP connect to port {port}");
                    connect_tcp(port)
                };
                parsed.rules.push(rule.into());
            }
            "" if arg == "--" => {
                parsed.command = args.by_ref().cloned().collect();
                break;
            }
            _ if !arg.starts_with('-') => {
                parsed.command = std::iter::once(arg).chain(args.by_ref()).cloned().collect();
                break;
            }
            _ => return Err(ArgsError::Unrecognized(arg.clone())),
        }
    }
    if parsed.command.is_empty() {
        log::info!("missing command to call, using {DEFAULT_COMMAND}");
        parsed.command = vec![DEFAULT_COMMAND.to_string()];
    }
    Ok(parsed)
}

/// Parses `[--] [COMMAND...]` for `landlock-restrict-scoped`. `None` asks for help.
pub fn parse_scoped(args: &[String]) -> Result<Option<Vec<String>>, ArgsError> {
    let command = match args.first().map(String::as_str) {
        Some("-h" | "-help" | "--help") => return Ok(None),
        Some("--") => args[1..].to_vec(),
        Some(flag) if flag.starts_with('-') => return Err(ArgsError::Unrecognized(flag.to_string())),
        _ => args.to_vec(),
    };
    if command.is_empty() {
        log::info!("missing command to call, using {DEFAULT_COMMAND}");
        return Ok(Some(vec![DEFAULT_COMMAND.to_string()]));
    }
    Ok(Some(command))
}
