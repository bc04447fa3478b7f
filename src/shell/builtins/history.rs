use crate::shell::builtins::{self, prelude::*};

pub struct History;

impl builtins::BuiltinCommand for History {
    const NAME: &'static str = builtins::HISTORY_NAME;

    const HELP: &'static str = "\
history: history [n]
    Display the history list with line numbers. Argument of N
    says to list only the last N lines.";

    fn run(shell: &mut Shell, args: &[String], stdout: &mut dyn Write) -> Result<ExitStatus> {
        let entries = shell.editor().history_entries();
        let n_last_entries = match args.first() {
            Some(arg) => arg.parse::<usize>().map_err(|_| {
                Error::builtin_command(
                    format!("history: {}: nonnegative numeric argument required", arg),
                    1,
                )
            })?,
            None => entries.len(),
        };

        write!(stdout, "{}", history_display(&entries, n_last_entries))?;
        Ok(ExitStatus::from_success())
    }
}

fn history_display(entries: &[String], n_last_entries: usize) -> String {
    let num_to_skip = entries.len().saturating_sub(n_last_entries);
    entries
        .iter()
        .enumerate()
        .skip(num_to_skip)
        .map(|(i, e)| format!("\t{}\t{}\n", i + 1, e))
        .collect()
}
