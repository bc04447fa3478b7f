//! Osh - Shell Module
//!
//! The Shell itself is responsible for launching pipelines, tracking their
//! jobs, reporting background job changes, and maintaining an editor of
//! previous commands.

use std::env;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::{self, ExitStatus};

use log::{debug, error, info, warn};

use crate::core::{
    job::{JobId, JobState},
    parser::{Command, OutputMode, OutputRedirect, Pipeline},
};
use crate::editor::Editor;
use crate::errors::{ErrorKind, Result, ResultExt};
use crate::shell::{
    builtins,
    execute_command::spawn_processes,
    job_control::{self, ForegroundStatus, JobManager},
    reaper::Reaper,
    ShellConfig, HISTORY_FILE_NAME, SYNTAX_ERROR_EXIT_STATUS,
};
use crate::util::{self, ShellExitStatusExt};

/// Osh Shell
pub struct Shell {
    /// Responsible for readline and history.
    editor: Editor,
    history_file: Option<PathBuf>,
    job_manager: JobManager,
    reaper: Reaper,
    /// Exit status of last command executed.
    last_exit_status: ExitStatus,
    config: ShellConfig,
    /// Set when `exit` was refused because jobs exist.
    exit_warned: bool,
}

impl Shell {
    /// Constructs a new Shell to manage running jobs and command history.
    pub fn new(config: ShellConfig) -> Result<Shell> {
        let mut is_interactive = config.enable_job_control && util::isatty();
        if is_interactive {
            let result = job_control::initialize_job_control(util::get_terminal());
            if let Err(e) = result {
                error!(
                    "failed to initialize shell for job control despite isatty: {}",
                    e
                );
                is_interactive = false;
            }
        }
        // A noninteractive shell still hands the terminal to its foreground
        // jobs when it owns one, or they would stop on their first read.
        let terminal = if is_interactive || util::owns_terminal() {
            Some(util::get_terminal())
        } else {
            None
        };
        debug!("foreground jobs receive terminal: {:?}", terminal);

        let mut shell = Shell {
            editor: Editor::with_capacity(config.command_history_capacity)?,
            history_file: None,
            job_manager: JobManager::new(terminal),
            reaper: Reaper::install()?,
            last_exit_status: ExitStatus::from_success(),
            config,
            exit_warned: false,
        };

        if config.enable_command_history {
            shell.load_history()?
        }

        info!("osh started up");
        Ok(shell)
    }

    pub fn last_exit_status(&self) -> ExitStatus {
        self.last_exit_status
    }

    pub fn job_manager(&self) -> &JobManager {
        &self.job_manager
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    fn load_history(&mut self) -> Result<()> {
        self.history_file = dirs::home_dir().map(|p| p.join(HISTORY_FILE_NAME));
        if let Some(ref history_file) = self.history_file {
            self.editor.load_history(history_file)?;
        } else {
            warn!("unable to get home directory")
        }

        Ok(())
    }

    /// Custom prompt to output to the user.
    /// Returns `None` when end of file is reached.
    pub fn prompt(&mut self) -> Result<Option<String>> {
        let cwd = env::current_dir().unwrap_or_default();
        let rel = match dirs::home_dir().and_then(|home| cwd.strip_prefix(home).ok()) {
            Some(rel) => Path::new("~").join(rel),
            None => cwd.clone(),
        };

        let prompt = format!(
            "{}|{}\n$ ",
            self.last_exit_status.code().unwrap_or(0),
            rel.display()
        );
        self.editor.readline(&prompt)
    }

    /// Runs a job from a command string.
    pub fn execute_command_string(&mut self, input: &str) -> Result<()> {
        let input = input.trim();
        // skip if empty
        if input.is_empty() {
            return Ok(());
        }

        if self.config.enable_command_history {
            self.editor.add_history_entry(input);
        }

        let pipeline = match Pipeline::parse(input) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                if let ErrorKind::Syntax(_) = *e.kind() {
                    eprintln!("osh: {}", e);
                    self.last_exit_status = ExitStatus::from_status(SYNTAX_ERROR_EXIT_STATUS);
                    return Ok(());
                }

                return Err(e);
            }
        };

        let builtin = pipeline
            .commands
            .iter()
            .map(Command::program)
            .find(|program| builtins::is_builtin(program));
        match builtin {
            Some(program) if pipeline.commands.len() > 1 => {
                eprintln!("osh: syntax error near: {}: builtins cannot be piped", program);
                self.last_exit_status = ExitStatus::from_status(SYNTAX_ERROR_EXIT_STATUS);
                self.exit_warned = false;
                Ok(())
            }
            Some(program) => {
                if program != builtins::EXIT_NAME {
                    self.exit_warned = false;
                }
                self.execute_builtin(&pipeline.commands[0]);
                Ok(())
            }
            None => {
                self.exit_warned = false;
                self.execute_pipeline(&pipeline)
            }
        }
    }

    /// Runs an osh script from a file, one line at a time.
    pub fn execute_commands_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let f = File::open(path).chain_err(|| format!("failed to open {}", path.display()))?;

        for line in BufReader::new(f).lines() {
            self.execute_command_string(&line?)?;
            self.do_job_notification();
        }

        Ok(())
    }

    /// Runs jobs from stdin until EOF is received.
    pub fn execute_from_stdin(&mut self) {
        loop {
            // Report background jobs that finished or stopped since the last prompt.
            self.do_job_notification();

            let input = match self.prompt() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                e => {
                    log_if_err!(e, "prompt");
                    continue;
                }
            };

            // Children may have changed state while the line was being read.
            self.do_job_notification();

            let temp_result = self.execute_command_string(&input);
            if let Err(ref e) = temp_result {
                eprintln!("osh: {}", e);
            }
            log_if_err!(temp_result, "execute_command_string");
        }
    }

    /// Reaps children whose state changed and prints a line for every
    /// background job that finished or stopped.
    pub fn do_job_notification(&mut self) {
        for event in self.reaper.drain(&mut self.job_manager) {
            println!("{}", event);
        }
    }

    /// Spawns a pipeline and either waits for it or registers it as a
    /// background job.
    fn execute_pipeline(&mut self, pipeline: &Pipeline) -> Result<()> {
        let terminal = if pipeline.background {
            None
        } else {
            self.job_manager.terminal()
        };

        let process_group = match spawn_processes(pipeline, terminal) {
            Ok(process_group) => process_group,
            Err(e) => {
                eprintln!("osh: {}", e);
                self.last_exit_status = ExitStatus::from_failure();
                return Ok(());
            }
        };

        if pipeline.background {
            let pgid = process_group.id;
            let job_id = self
                .job_manager
                .create_job(&pipeline.input, process_group, JobState::Running);
            println!("[{}] {}", job_id, pgid);
            self.last_exit_status = ExitStatus::from_success();
            return Ok(());
        }

        let status = self
            .job_manager
            .run_in_foreground(&pipeline.input, process_group)?;
        if let ForegroundStatus::Stopped(job_id, _) = status {
            let mut stdout = io::stdout();
            writeln!(stdout)?;
            self.print_job(job_id, &mut stdout)?;
        }
        self.last_exit_status = status.exit_status();
        Ok(())
    }

    /// Runs a builtin in the shell process. Redirections are applied to the
    /// builtin's own output.
    fn execute_builtin(&mut self, command: &Command) {
        if let Some(ref path) = command.stdin {
            if let Err(e) = File::open(path) {
                eprintln!("osh: {}: {}", path, e);
                self.last_exit_status = ExitStatus::from_failure();
                return;
            }
        }

        let (status, result) = match command.stdout {
            Some(ref redirect) => match open_redirect(redirect) {
                Ok(mut file) => {
                    builtins::run(self, command.program(), command.args(), &mut file)
                }
                Err(e) => {
                    eprintln!("osh: {}: {}", redirect.path, e);
                    (ExitStatus::from_failure(), Ok(()))
                }
            },
            None => {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                let outcome = builtins::run(self, command.program(), command.args(), &mut handle);
                let temp_result = handle.flush();
                log_if_err!(temp_result, "failed to flush stdout");
                outcome
            }
        };

        if let Err(ref e) = result {
            eprintln!("osh: {}", e);
        }
        debug!("builtin {} returned {:?}", command.program(), status);
        self.last_exit_status = status;
    }

    /// Refuses the first `exit` while jobs exist. Returns `true` if the
    /// caller should warn instead of exiting.
    pub(crate) fn warn_before_exit(&mut self) -> bool {
        if self.job_manager.has_jobs() && !self.exit_warned {
            self.exit_warned = true;
            return true;
        }
        false
    }

    /// Starts the specified job or the current one and waits for it.
    pub fn put_job_in_foreground(
        &mut self,
        job_id: Option<JobId>,
        stdout: &mut dyn Write,
    ) -> Result<ExitStatus> {
        if let Some(job) = job_id
            .or_else(|| self.job_manager.current_job())
            .and_then(|job_id| self.job_manager.get_job(job_id))
        {
            writeln!(stdout, "{}", job.input())?;
            stdout.flush()?;
        }

        let status = self.job_manager.put_job_in_foreground(job_id)?;
        if let ForegroundStatus::Stopped(job_id, _) = status {
            writeln!(stdout)?;
            self.print_job(job_id, stdout)?;
        }
        Ok(status.exit_status())
    }

    /// Resumes the specified job, or the current one, in the background.
    pub fn put_job_in_background(
        &mut self,
        job_id: Option<JobId>,
        stdout: &mut dyn Write,
    ) -> Result<()> {
        let job_id = self.job_manager.put_job_in_background(job_id)?;
        self.print_job(job_id, stdout)
    }

    fn print_job(&self, job_id: JobId, stdout: &mut dyn Write) -> Result<()> {
        if let Some(job) = self.job_manager.get_job(job_id) {
            writeln!(stdout, "{}", job)?;
        }
        Ok(())
    }

    /// Exit the shell.
    ///
    /// Valid exit codes are between 0 and 255. Like bash and its descendents, it automatically
    /// converts exit codes to a u8 such that positive n becomes n % 256 and negative n becomes
    /// (256 + n) % 256.
    ///
    /// Exit the shell with a status of n. If n is None, then the exit status is that of the last
    /// command executed.
    pub fn exit(&mut self, n: Option<ExitStatus>) -> ! {
        if self.config.display_messages {
            println!("exit");
        }

        let code = n.unwrap_or(self.last_exit_status).code().unwrap_or(1);
        let code_like_u8 = code.rem_euclid(256);

        if self.config.enable_command_history {
            if let Some(ref history_file) = self.history_file {
                if let Err(e) = self.editor.save_history(history_file) {
                    error!(
                        "error: failed to save history to file during shutdown: {}",
                        e
                    );
                }
            }
        }

        info!("osh has shut down");
        process::exit(code_like_u8);
    }
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}\n{:?}", self.job_manager, self.editor)
    }
}

fn open_redirect(redirect: &OutputRedirect) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).mode(0o644);
    match redirect.mode {
        OutputMode::Truncate => options.truncate(true),
        OutputMode::Append => options.append(true),
    };
    options.open(&redirect.path)
}
