use crate::shell::builtins::{
    self,
    cd::Cd,
    exit::Exit,
    history::History,
    jobs::{Bg, Fg, Jobs},
    prelude::*,
    BuiltinCommand,
};

pub struct Help;

impl builtins::BuiltinCommand for Help {
    const NAME: &'static str = builtins::HELP_NAME;

    const HELP: &'static str = "\
help: help [command ...]
    Display helpful information about builtin commands. If COMMAND is specified,
    gives detailed help on all commands matching COMMAND, otherwise a list of the
    builtins is printed.";

    fn run(_shell: &mut Shell, args: &[String], stdout: &mut dyn Write) -> Result<ExitStatus> {
        if args.is_empty() {
            for usage in &usage_strings() {
                writeln!(stdout, "{}", usage)?;
            }
            return Ok(ExitStatus::from_success());
        }

        let mut all_invalid = true;
        for arg in args {
            if let Some(msg) = help_text(arg) {
                writeln!(stdout, "{}", msg)?;
                all_invalid = false;
            }
        }
        if all_invalid {
            let topic = args.last().map_or("", String::as_str);
            return Err(Error::builtin_command(
                format!("help: no help topics match `{}'", topic),
                1,
            ));
        }

        Ok(ExitStatus::from_success())
    }
}

/// Help text up to the docopt usage section, if any.
fn help_text(name: &str) -> Option<&'static str> {
    let text = match name {
        builtins::BG_NAME => Bg::HELP,
        builtins::CD_NAME => Cd::HELP,
        builtins::EXIT_NAME => Exit::HELP,
        builtins::FG_NAME => Fg::HELP,
        builtins::HELP_NAME => Help::HELP,
        builtins::HISTORY_NAME => History::HELP,
        builtins::JOBS_NAME => Jobs::HELP,
        _ => return None,
    };
    Some(text.split("\n\nUsage:").next().unwrap_or(text))
}

fn usage_strings() -> [&'static str; 7] {
    [
        Bg::usage(),
        Cd::usage(),
        Exit::usage(),
        Fg::usage(),
        Help::usage(),
        History::usage(),
        Jobs::usage(),
    ]
}
