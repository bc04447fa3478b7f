pub use self::job_control::{ForegroundStatus, GroupStatus, JobEvent, JobManager};
pub use self::reaper::Reaper;
pub use self::shell::Shell;

pub mod builtins;
pub mod execute_command;
pub mod job_control;
pub mod reaper;
#[allow(clippy::module_inception)]
mod shell;

pub(crate) const HISTORY_FILE_NAME: &str = ".osh_history";
pub(crate) const SYNTAX_ERROR_EXIT_STATUS: i32 = 2;

/// Decides which interactive conveniences a `Shell` turns on.
#[derive(Debug, Copy, Clone, Default)]
pub struct ShellConfig {
    /// Entered lines are recorded and persisted to the history file.
    enable_command_history: bool,
    command_history_capacity: usize,
    /// Foreground jobs receive the terminal when stdin is one. Process
    /// groups, stop and continue work regardless.
    enable_job_control: bool,
    /// Print messages meant for a person at a terminal, e.g. "exit".
    display_messages: bool,
}

impl ShellConfig {
    /// Config for a person at a terminal: history of `command_history_capacity`
    /// lines, terminal handoff, and messages.
    pub fn interactive(command_history_capacity: usize) -> Self {
        Self {
            enable_command_history: true,
            command_history_capacity,
            enable_job_control: true,
            display_messages: true,
        }
    }

    /// Config for `-c` and scripts. Nothing is recorded in history (the
    /// `history` builtin still works) and foreground jobs never receive
    /// the terminal.
    pub fn noninteractive() -> Self {
        Self::default()
    }
}
