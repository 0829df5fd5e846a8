use std::process;

use ll_cli::args::parse_net;
use ll_cli::exec::exec;
use ll_cli::init_logging;
use ll_policy::Config;

fn print_help() {
    println!("landlock-restrict-net: run a command with restricted TCP access");
    println!();
    println!("Usage:");
    println!("  landlock-restrict-net [OPTIONS] [--] [COMMAND [ARG...]]");
    println!();
    println!("Options:");
    println!("  -tcp.bind PORT     Permit binding to PORT (repeatable)");
    println!("  -tcp.connect PORT  Permit connecting to PORT (repeatable)");
    println!();
    println!("COMMAND defaults to /bin/bash.");
}

fn main() {
    init_logging(false);
    let args: Vec<String> = std::env::args().skip(1).collect();

    let parsed = match parse_net(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("landlock-restrict-net: {e}");
            eprintln!();
            print_help();
            process::exit(2);
        }
    };
    if parsed.help {
        print_help();
        return;
    }

    match Config::V4.restrict_net(parsed.rules) {
        Ok(enforced) => log::info!("{enforced}"),
        Err(e) => {
            log::error!("landlock: {e}");
            process::exit(1);
        }
    }

    exec(&parsed.command);
}
