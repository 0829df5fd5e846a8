use std::os::unix::process::CommandExt;
use std::process::Command;

/// Exit code when the command cannot be started.
pub const EXEC_FAILED: i32 = 126;

/// Replaces the current process with `command`. Does not return.
///
/// On failure, logs the error and exits with code 126.
pub fn exec(command: &[String]) -> ! {
    let Some((program, args)) = command.split_first() else {
        log::error!("no command specified");
        std::process::exit(EXEC_FAILED);
    };

    log::info!("starting {command:?}");
    // exec() only returns on error
    let err = Command::new(program).args(args).exec();

    log::error!("exec {program} failed: {err}");
    std::process::exit(EXEC_FAILED);
}
