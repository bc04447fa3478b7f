use std::env;
use std::path::PathBuf;

use crate::shell::builtins::{self, prelude::*};

pub struct Cd;

impl builtins::BuiltinCommand for Cd {
    const NAME: &'static str = builtins::CD_NAME;

    const HELP: &'static str = "\
cd: cd [dir]
    Change the current directory to DIR. The variable $HOME is the default dir.
    If DIR is '-', then the current directory will be the variable $OLDPWD,
    which is the last working directory.";

    fn run(_shell: &mut Shell, args: &[String], stdout: &mut dyn Write) -> Result<ExitStatus> {
        let dir = match args.first().map(String::as_str) {
            Some("~") | None => env::var_os("HOME")
                .map(PathBuf::from)
                .or_else(dirs::home_dir)
                .ok_or_else(|| Error::builtin_command("cd: HOME not set", 1))?,
            Some("-") => match env::var_os("OLDPWD") {
                Some(val) => {
                    let dir = PathBuf::from(val);
                    writeln!(stdout, "{}", dir.display())?;
                    dir
                }
                None => return Err(Error::builtin_command("cd: OLDPWD not set", 1)),
            },
            Some(val) => PathBuf::from(val),
        };

        let cwd = env::current_dir()?;
        env::set_current_dir(&dir).map_err(|e| {
            Error::builtin_command(format!("cd: {}: {}", dir.display(), e), 1)
        })?;
        env::set_var("OLDPWD", cwd);
        Ok(ExitStatus::from_success())
    }
}
