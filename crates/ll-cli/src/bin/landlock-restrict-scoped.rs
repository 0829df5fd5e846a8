use std::process;

use ll_cli::args::parse_scoped;
use ll_cli::exec::exec;
use ll_cli::init_logging;
use ll_policy::{Config, Rule};

fn print_help() {
    println!("landlock-restrict-scoped: run a command that cannot signal or reach");
    println!("processes outside its Landlock domain");
    println!();
    println!("Usage:");
    println!("  landlock-restrict-scoped [--] [COMMAND [ARG...]]");
    println!();
    println!("Restricts abstract unix socket connections and signals.");
    println!("COMMAND defaults to /bin/bash.");
}

fn main() {
    init_logging(false);
    let args: Vec<String> = std::env::args().skip(1).collect();

    let command = match parse_scoped(&args) {
        Ok(Some(command)) => command,
        Ok(None) => {
            print_help();
            return;
        }
        Err(e) => {
            eprintln!("landlock-restrict-scoped: {e}");
            eprintln!();
            print_help();
            process::exit(2);
        }
    };

    match Config::V6.restrict_scoped(Vec::<Rule>::new()) {
        Ok(enforced) => log::info!("{enforced}"),
        Err(e) => {
            log::error!("landlock: {e}");
            process::exit(1);
        }
    }

    exec(&command);
}
