//! Line editing front end: prompt, history, and completion.

use std::env;
use std::fmt;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use log::{debug, warn};
use rustyline::{
    self,
    completion::{Completer, FilenameCompleter, Pair},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    history::{DefaultHistory, History, SearchDirection},
    validate::Validator,
    CompletionType, Config, Helper,
};

use crate::errors::{Result, ResultExt};
use crate::shell::builtins;

struct EditorHelper {
    filename_completer: FilenameCompleter,
    /// Program names on `PATH` plus the builtins, sorted and deduplicated.
    commands: Vec<String>,
}

impl EditorHelper {
    fn new() -> Self {
        let mut commands = find_commands_on_path();
        commands.extend(builtins::NAMES.iter().map(|name| name.to_string()));
        commands.sort();
        commands.dedup();
        debug!("loaded {} command names for completion", commands.len());
        Self {
            filename_completer: FilenameCompleter::new(),
            commands,
        }
    }
}

impl Completer for EditorHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let (start, word, is_command) = completion_context(line, pos);
        if is_command && !word.contains('/') {
            Ok((start, command_candidates(&self.commands, word)))
        } else {
            self.filename_completer.complete(line, pos, ctx)
        }
    }
}

impl Hinter for EditorHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        None
    }
}

impl Highlighter for EditorHelper {}

impl Helper for EditorHelper {}

impl Validator for EditorHelper {}

pub struct Editor {
    internal: rustyline::Editor<EditorHelper, DefaultHistory>,
    history_capacity: usize,
}

impl Editor {
    pub fn with_capacity(history_capacity: usize) -> Result<Editor> {
        let config = Config::builder()
            .max_history_size(history_capacity)?
            .history_ignore_space(true)
            .completion_type(CompletionType::Circular)
            .build();

        let mut internal = rustyline::Editor::with_config(config)?;
        internal.set_helper(Some(EditorHelper::new()));

        Ok(Editor {
            internal,
            history_capacity,
        })
    }

    /// Reads one line. Returns `None` when end of file is reached; an
    /// interrupted line (Ctrl-C) yields an empty line.
    pub fn readline(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.internal.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(e) => Err(e.into()),
        }
    }

    pub fn load_history<P: AsRef<Path> + ?Sized>(&mut self, path: &P) -> Result<()> {
        match self.internal.load_history(path) {
            Ok(()) => Ok(()),
            Err(ReadlineError::Io(ref inner)) if inner.kind() == std::io::ErrorKind::NotFound => {
                Ok(())
            }
            Err(e) => Err(e).chain_err(|| "failed to load history"),
        }
    }

    pub fn save_history<P: AsRef<Path> + ?Sized>(&mut self, path: &P) -> Result<()> {
        self.internal
            .save_history(path)
            .chain_err(|| "failed to save history")
    }

    pub fn add_history_entry(&mut self, line: &str) {
        let temp_result = self.internal.add_history_entry(line);
        log_if_err!(temp_result, "failed to add history entry");
    }

    /// History entries, oldest first.
    pub fn history_entries(&self) -> Vec<String> {
        let history = self.internal.history();
        (0..history.len())
            .filter_map(|i| match history.get(i, SearchDirection::Forward) {
                Ok(entry) => entry.map(|e| e.entry.into_owned()),
                Err(e) => {
                    warn!("failed to read history entry {}: {}", i, e);
                    None
                }
            })
            .collect()
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} history entries (capacity {})",
            self.internal.history().len(),
            self.history_capacity
        )
    }
}

/// Returns where the word under the cursor starts, the word itself, and
/// whether it is in command position (the first word of a stage).
fn completion_context(line: &str, pos: usize) -> (usize, &str, bool) {
    let before = &line[..pos];
    let start = before
        .char_indices()
        .rev()
        .find(|&(_, c)| c.is_whitespace() || c == '|')
        .map_or(0, |(i, c)| i + c.len_utf8());
    let preceding = before[..start].trim_end();
    let is_command = preceding.is_empty() || preceding.ends_with('|');
    (start, &before[start..], is_command)
}

fn command_candidates(commands: &[String], prefix: &str) -> Vec<Pair> {
    commands
        .iter()
        .filter(|command| command.starts_with(prefix))
        .map(|command| Pair {
            display: command.clone(),
            replacement: command.clone(),
        })
        .collect()
}

fn find_commands_on_path() -> Vec<String> {
    let path = match env::var_os("PATH") {
        Some(path) => path,
        None => return Vec::new(),
    };

    env::split_paths(&path)
        .filter_map(|dir| fs::read_dir(dir).ok())
        .flat_map(|entries| entries.filter_map(|entry| entry.ok()))
        .filter(|entry| {
            entry
                .metadata()
                .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        })
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands() -> Vec<String> {
        vec!["cat", "cd", "echo", "grep"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn init_with_capacity() {
        let editor = Editor::with_capacity(10).unwrap();
        assert!(editor.history_entries().is_empty());
        assert_eq!(editor.history_capacity(), 10);
    }

    #[test]
    fn add_history_entry_duplicate() {
        let mut editor = Editor::with_capacity(2).unwrap();
        editor.add_history_entry("dup");
        editor.add_history_entry("dup");
        assert_eq!(editor.history_entries(), vec!["dup"]);
    }

    #[test]
    fn add_history_entry_rollover() {
        let mut editor = Editor::with_capacity(2).unwrap();
        for line in &["one", "two", "three"] {
            editor.add_history_entry(line);
        }
        assert_eq!(editor.history_entries(), vec!["two", "three"]);
    }

    #[test]
    fn completion_context_first_word() {
        assert_eq!(completion_context("ec", 2), (0, "ec", true));
        assert_eq!(completion_context("  ec", 4), (2, "ec", true));
    }

    #[test]
    fn completion_context_after_pipe() {
        assert_eq!(completion_context("ls | gr", 7), (5, "gr", true));
        assert_eq!(completion_context("ls |gr", 6), (4, "gr", true));
    }

    #[test]
    fn completion_context_argument() {
        assert_eq!(completion_context("cat fo", 6), (4, "fo", false));
        assert_eq!(completion_context("cat > ou", 8), (6, "ou", false));
        assert_eq!(completion_context("cat ", 4), (4, "", false));
    }

    #[test]
    fn command_candidates_match_prefix() {
        let candidates: Vec<String> = command_candidates(&commands(), "c")
            .into_iter()
            .map(|pair| pair.replacement)
            .collect();
        assert_eq!(candidates, vec!["cat", "cd"]);
        assert!(command_candidates(&commands(), "z").is_empty());
    }
}
