//! Osh builtins
//!
//! Commands that run inside the shell process because they read or change
//! the shell's own state. Where possible the commands conform to their
//! standard Bash counterparts.

use std::iter;

use docopt::Docopt;
use log::debug;
use serde::de::DeserializeOwned;

use self::prelude::*;

use self::cd::Cd;
use self::exit::Exit;
use self::help::Help;
use self::history::History;
use self::jobs::{Bg, Fg, Jobs};

pub mod prelude {
    pub use std::io::Write;
    pub use std::process::ExitStatus;

    pub use super::parse_args;
    pub use crate::errors::{Error, ErrorKind, Result, ResultExt};
    pub use crate::shell::Shell;
    pub use crate::util::ShellExitStatusExt;
}

mod cd;
mod exit;
mod help;
mod history;
mod jobs;

pub const BG_NAME: &str = "bg";
pub const CD_NAME: &str = "cd";
pub const EXIT_NAME: &str = "exit";
pub const FG_NAME: &str = "fg";
pub const HELP_NAME: &str = "help";
pub const HISTORY_NAME: &str = "history";
pub const JOBS_NAME: &str = "jobs";

/// Names of every builtin, sorted.
pub const NAMES: [&str; 7] = [
    BG_NAME,
    CD_NAME,
    EXIT_NAME,
    FG_NAME,
    HELP_NAME,
    HISTORY_NAME,
    JOBS_NAME,
];

/// Represents an Osh builtin command such as cd or help.
pub trait BuiltinCommand {
    /// The NAME of the command.
    const NAME: &'static str;
    /// The help string to display to the user.
    const HELP: &'static str;
    /// The usage string to display to the user.
    fn usage() -> &'static str {
        Self::HELP.lines().next().unwrap_or(Self::NAME)
    }
    /// Runs the command with the given arguments in the `shell` environment.
    /// Output goes to `stdout`, which may be a redirection target.
    fn run(shell: &mut Shell, args: &[String], stdout: &mut dyn Write) -> Result<ExitStatus>;
}

pub fn is_builtin<T: AsRef<str>>(program: T) -> bool {
    NAMES.contains(&program.as_ref())
}

/// precondition: command is a builtin.
/// Returns (`exit_status_code`, `builtin_result`)
pub fn run(
    shell: &mut Shell,
    program: &str,
    args: &[String],
    stdout: &mut dyn Write,
) -> (ExitStatus, Result<()>) {
    debug_assert!(is_builtin(program));

    let result = match program {
        BG_NAME => Bg::run(shell, args, stdout),
        CD_NAME => Cd::run(shell, args, stdout),
        EXIT_NAME => Exit::run(shell, args, stdout),
        FG_NAME => Fg::run(shell, args, stdout),
        HELP_NAME => Help::run(shell, args, stdout),
        HISTORY_NAME => History::run(shell, args, stdout),
        JOBS_NAME => Jobs::run(shell, args, stdout),
        _ => Err(Error::builtin_command(
            format!("{}: not a shell builtin", program),
            1,
        )),
    };

    match result {
        Ok(status) => (status, Ok(())),
        Err(e) => (get_builtin_exit_status(&e), Err(e)),
    }
}

fn get_builtin_exit_status(e: &Error) -> ExitStatus {
    let status = match *e.kind() {
        ErrorKind::BuiltinCommand(_, code) => code,
        _ => 1,
    };

    ExitStatus::from_status(status)
}

/// Parses `args` against a docopt `usage` string. On failure the returned
/// error carries the command's usage line and exit status 2.
pub fn parse_args<D, S, I>(usage: &str, program: &str, args: I) -> Result<D>
where
    D: DeserializeOwned,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let args: Vec<String> = iter::once(program.to_string())
        .chain(args.into_iter().map(|arg| arg.as_ref().to_string()))
        .collect();
    Docopt::new(usage)?
        .help(false)
        .argv(args)
        .deserialize()
        .map_err(|e| {
            debug!("{}: {}", program, e);
            let usage_line = usage
                .lines()
                .skip_while(|line| !line.trim().eq_ignore_ascii_case("usage:"))
                .nth(1)
                .map_or(program, str::trim);
            Error::builtin_command(format!("{}: usage: {}", program, usage_line), 2)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_builtin() {
        for name in NAMES.iter() {
            assert!(is_builtin(name));
        }
        assert!(!is_builtin("ls"));
        assert!(!is_builtin(""));
    }

    #[test]
    fn test_names_sorted() {
        let mut sorted = NAMES;
        sorted.sort();
        assert_eq!(sorted, NAMES);
    }

    #[test]
    fn test_builtin_exit_status() {
        let e = Error::builtin_command("nope", 3);
        assert_eq!(get_builtin_exit_status(&e).code(), Some(3));
        let e: Error = ErrorKind::EmptyPipeline.into();
        assert_eq!(get_builtin_exit_status(&e).code(), Some(1));
    }
}
