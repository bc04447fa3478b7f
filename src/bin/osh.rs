use std::path::PathBuf;
use std::process::{self, ExitStatus};

use docopt::Docopt;
use log::{debug, error, LevelFilter};
use nix::unistd::Pid;
use serde_derive::Deserialize;

use osh::errors::*;
use osh::{Shell, ShellConfig, ShellExitStatusExt};

const COMMAND_HISTORY_CAPACITY: usize = 1000;
const LOG_FILE_NAME: &str = ".osh_log";

const USAGE: &str = "
osh - a small job-control shell.

Usage:
    osh [options]
    osh [options] -c <command>
    osh [options] <file>
    osh (-h | --help)
    osh --version

Options:
    -h --help       Show this screen.
    --version       Show version.
    -c              Run <command> and exit with its status.
    --log=<path>    Write the log to <path> instead of ~/.osh_log.
    --verbose       Include trace-level messages in the log.
";

#[derive(Debug, Deserialize)]
struct Args {
    arg_command: Option<String>,
    arg_file: Option<String>,
    flag_version: bool,
    flag_c: bool,
    flag_log: Option<String>,
    flag_verbose: bool,
}

enum Source<'a> {
    Command(&'a str),
    File(&'a str),
    Stdin,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    if let Err(e) = init_logger(args.flag_log.as_deref(), args.flag_verbose) {
        eprintln!("osh: logging disabled: {}", e);
    }
    debug!("{:?}", args);

    if args.flag_version {
        println!("osh version {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let source = match (args.arg_command.as_deref(), args.arg_file.as_deref()) {
        (Some(command), _) => Source::Command(command),
        (None, Some(file)) => Source::File(file),
        (None, None) => Source::Stdin,
    };
    run(source)
}

fn init_logger(path: Option<&str>, verbose: bool) -> Result<()> {
    let log_path = match path {
        Some(path) => PathBuf::from(path),
        None => dirs::home_dir()
            .map(|home| home.join(LOG_FILE_NAME))
            .ok_or("unable to get home directory")?,
    };
    let log_file = fern::log_file(&log_path)
        .chain_err(|| format!("failed to open log file {}", log_path.display()))?;

    let pid = Pid::this();
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                pid,
                record.level(),
                record.target(),
                message
            ))
        })
        .level(if verbose {
            LevelFilter::Trace
        } else {
            LevelFilter::Debug
        })
        .chain(log_file)
        .apply()
        .chain_err(|| "failed to install logger")
}

fn run(source: Source) -> ! {
    let config = match source {
        Source::Stdin => ShellConfig::interactive(COMMAND_HISTORY_CAPACITY),
        _ => ShellConfig::noninteractive(),
    };
    let mut shell = match Shell::new(config) {
        Ok(shell) => shell,
        Err(e) => {
            error!("failed to create shell: {}", e);
            eprintln!("osh: {}", e);
            process::exit(ExitStatus::from_failure().code().unwrap_or(1));
        }
    };

    let result = match source {
        Source::Command(command) => shell.execute_command_string(command),
        Source::File(path) => shell.execute_commands_from_file(path),
        Source::Stdin => {
            shell.execute_from_stdin();
            Ok(())
        }
    };
    shell.do_job_notification();

    match result {
        Ok(()) => shell.exit(None),
        Err(e) => {
            eprintln!("osh: {}", e);
            shell.exit(Some(ExitStatus::from_failure()))
        }
    }
}
