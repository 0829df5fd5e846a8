use std::path::Path;
use std::process;

use ll_cli::args::parse_restrict;
use ll_cli::exec::exec;
use ll_cli::init_logging;
use ll_policy::policy::{PolicyError, POLICY_ENV_VAR};
use ll_policy::Policy;

fn print_help() {
    println!("landlock-restrict: run a command with restricted filesystem access");
    println!();
    println!("Usage:");
    println!("  landlock-restrict [OPTIONS] -- COMMAND [ARG...]");
    println!();
    println!("Options:");
    println!("  -v                 Verbose logging");
    println!("  -1 .. -7           Landlock ABI version to restrict to (default: newest)");
    println!("  -strict            Fail if the kernel lacks the selected ABI version");
    println!("  -policy FILE       Load a JSON or TOML policy (also read from $LL_POLICY)");
    println!("  -ro [+FLAG] PATH...      Read-only directories");
    println!("  -rw [+FLAG] PATH...      Read-write directories");
    println!("  -rofiles [+FLAG] PATH... Read-only files");
    println!("  -rwfiles [+FLAG] PATH... Read-write files");
    println!();
    println!("Flags:");
    println!("  +refer       Also allow linking and renaming across directories");
    println!("  +ioctl_dev   Also allow ioctl on device files");
    println!();
    println!("COMMAND must be an absolute path.");
    println!();
    println!("Example:");
    println!("  landlock-restrict -ro /usr /lib /etc -rw /tmp -- /usr/bin/ls -l /");
}

fn load_policy(file: Option<&Path>) -> Result<Option<Policy>, PolicyError> {
    match file {
        Some(file) => Policy::load(file).map(Some),
        None => Policy::from_env(),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    init_logging(args.iter().any(|a| a == "-v"));

    let parsed = match parse_restrict(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("landlock-restrict: {e}");
            eprintln!();
            print_help();
            process::exit(2);
        }
    };
    if parsed.help {
        print_help();
        return;
    }

    let result = match load_policy(parsed.policy.as_deref()) {
        Ok(Some(policy)) => {
            if let Some(flag) = &parsed.config_flag {
                log::warn!("{flag} ignored: ${POLICY_ENV_VAR} sets the Landlock version and mode");
            }
            let (config, mut rules) = match policy.to_parts() {
                Ok(parts) => parts,
                Err(e) => {
                    log::error!("invalid policy: {e}");
                    process::exit(1);
                }
            };
            rules.extend(parsed.rules);
            log::info!("policy: {config}");
            config.restrict(rules)
        }
        Ok(None) => {
            log::info!("config: {}", parsed.config);
            for rule in &parsed.rules {
                log::debug!("rule: {rule}");
            }
            parsed.config.restrict_paths(parsed.rules)
        }
        Err(e) => {
            log::error!("failed to load policy: {e}");
            process::exit(1);
        }
    };

    match result {
        Ok(enforced) => log::info!("{enforced}"),
        Err(e) => {
            log::error!("{e}");
            process::exit(1);
        }
    }

    exec(&parsed.command);
}
