use std::collections::BTreeMap;
use std::fmt;
use std::os::unix::io::RawFd;
use std::process::ExitStatus;

use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::termios::{self, Termios};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};

use crate::core::job::{Job, JobId, JobState, ProcessGroup};
use crate::errors::{Error, Result, ResultExt};
use crate::util::ShellExitStatusExt;

const JOB_CONTROL_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// Makes the shell a job-control shell on `shell_terminal`: the shell waits
/// until it is in the foreground, moves into its own process group, ignores
/// keyboard-generated job-control signals, and takes the terminal.
pub fn initialize_job_control(shell_terminal: RawFd) -> Result<()> {
    // Loop until the shell is in the foreground
    loop {
        let shell_pgid = unistd::getpgrp();
        if unistd::tcgetpgrp(shell_terminal)? == shell_pgid {
            break;
        }
        signal::killpg(shell_pgid, Signal::SIGTTIN)?;
    }

    // Ignore interactive and job-control signals
    for &sig in &JOB_CONTROL_SIGNALS {
        unsafe { signal::signal(sig, SigHandler::SigIgn) }
            .chain_err(|| format!("failed to ignore {:?}", sig))?;
    }

    // Put ourselves in our own process group
    let shell_pgid = Pid::this();
    if unistd::getpgrp() != shell_pgid {
        unistd::setpgid(shell_pgid, shell_pgid)
            .chain_err(|| "couldn't put the shell in its own process group")?;
    }

    // Grab control of the terminal
    let temp_result = unistd::tcsetpgrp(shell_terminal, shell_pgid);
    log_if_err!(temp_result, "failed to grab control of terminal");

    info!("job control initialized, shell pgid {}", shell_pgid);
    Ok(())
}

/// How a process group came back to the shell from a wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupStatus {
    /// Every process exited; carries the status of the last stage.
    Exited(ExitStatus),
    Stopped(Signal),
}

/// Outcome of running a job in the foreground.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForegroundStatus {
    /// The job ran to completion and is no longer in the job table.
    Completed(ExitStatus),
    /// The job was stopped and is in the job table as `Stopped`.
    Stopped(JobId, ExitStatus),
}

impl ForegroundStatus {
    pub fn exit_status(&self) -> ExitStatus {
        match *self {
            ForegroundStatus::Completed(status) | ForegroundStatus::Stopped(_, status) => status,
        }
    }
}

/// A change the reaper observed in a background job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobEvent {
    /// The job's leader terminated; the job was removed from the table.
    Done(Job),
    /// The job's leader stopped; the job is now `Stopped`.
    Stopped(Job),
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            JobEvent::Done(ref job) => write!(f, "[{}] Done\t{}", job.id(), job.input()),
            JobEvent::Stopped(ref job) => write!(f, "{}", job),
        }
    }
}

/// Waits until every process of group `pgid` has terminated or one of them
/// stops. The exit status is taken from `last_process` when it is seen.
pub fn wait_for_group(pgid: Pid, last_process: Option<Pid>) -> Result<GroupStatus> {
    let group = Pid::from_raw(-pgid.as_raw());
    let mut last_status: Option<ExitStatus> = None;
    loop {
        let (pid, status) = match wait::waitpid(group, Some(WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::Exited(pid, code)) => {
                debug!("{} exited with {}.", pid, code);
                (pid, ExitStatus::from_status(code))
            }
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                debug!("{} terminated by signal {:?}.", pid, signal);
                (pid, ExitStatus::from_signal(signal))
            }
            Ok(WaitStatus::Stopped(pid, signal)) => {
                debug!("{} was signaled to stop {:?}.", pid, signal);
                return Ok(GroupStatus::Stopped(signal));
            }
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => break,
            Err(e) => {
                return Err(e).chain_err(|| format!("failed to wait for process group {}", pgid))
            }
        };

        if last_status.is_none() || last_process == Some(pid) {
            last_status = Some(status);
        }
    }

    Ok(GroupStatus::Exited(
        last_status.unwrap_or_else(ExitStatus::from_success),
    ))
}

/// The job table. Owned by the shell and mutated only from its control loop;
/// the asynchronous SIGCHLD path merely wakes the loop up (see `Reaper`).
#[derive(Default)]
pub struct JobManager {
    jobs: BTreeMap<JobId, Job>,
    job_count: u32,
    current_job: Option<JobId>,
    /// Set when the shell owns a controlling terminal that it hands to
    /// foreground jobs.
    terminal: Option<RawFd>,
}

impl JobManager {
    pub fn new(terminal: Option<RawFd>) -> Self {
        Self {
            terminal,
            ..Default::default()
        }
    }

    pub fn terminal(&self) -> Option<RawFd> {
        self.terminal
    }

    /// Registers `process_group` under a fresh id and makes it the current
    /// job. Ids are never reused.
    pub fn create_job(
        &mut self,
        input: &str,
        process_group: ProcessGroup,
        state: JobState,
    ) -> JobId {
        let job_id = self.get_next_job_id();
        debug!(
            "creating job [{}] for group {} ({})",
            job_id, process_group.id, state
        );
        self.jobs
            .insert(job_id, Job::new(job_id, input, process_group, state));
        self.current_job = Some(job_id);
        job_id
    }

    pub fn has_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }

    pub fn has_stopped_jobs(&self) -> bool {
        self.jobs.values().any(Job::is_stopped)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Returns the jobs ordered by id.
    pub fn get_jobs(&self) -> Vec<Job> {
        self.jobs.values().cloned().collect()
    }

    pub fn get_job(&self, job_id: JobId) -> Option<&Job> {
        self.jobs.get(&job_id)
    }

    /// The job `fg` and `bg` use when no job is named: the most recently
    /// stopped or backgrounded one.
    pub fn current_job(&self) -> Option<JobId> {
        self.current_job.filter(|id| self.jobs.contains_key(id))
    }

    pub fn remove_job(&mut self, job_id: JobId) -> Option<Job> {
        if self.current_job == Some(job_id) {
            self.current_job = None;
        }
        let job = self.jobs.remove(&job_id);
        if job.is_some() {
            debug!("removed job [{}]", job_id);
        }
        job
    }

    /// Hands the terminal to a freshly spawned foreground group and waits for
    /// it. A group that stops is registered as a new `Stopped` job; a group
    /// that completes never enters the table.
    pub fn run_in_foreground(
        &mut self,
        input: &str,
        process_group: ProcessGroup,
    ) -> Result<ForegroundStatus> {
        let status = self.wait_in_foreground(
            process_group.id,
            process_group.last_process(),
            false, /* cont */
        )?;
        match status {
            GroupStatus::Exited(status) => Ok(ForegroundStatus::Completed(status)),
            GroupStatus::Stopped(signal) => {
                let job_id = self.create_job(input, process_group, JobState::Stopped);
                Ok(ForegroundStatus::Stopped(
                    job_id,
                    ExitStatus::from_signal(signal),
                ))
            }
        }
    }

    /// Continues the specified job, or the current one, in the foreground and
    /// waits for it to stop or complete.
    pub fn put_job_in_foreground(&mut self, job_id: Option<JobId>) -> Result<ForegroundStatus> {
        let job_id = self.resolve_job_id(job_id)?;
        debug!("putting job [{}] in foreground", job_id);

        let (pgid, last_process) = {
            let job = self
                .jobs
                .get_mut(&job_id)
                .ok_or_else(|| Error::no_such_job(job_id.to_string()))?;
            job.mark_running();
            (job.pgid(), job.last_process())
        };

        match self.wait_in_foreground(pgid, last_process, true /* cont */)? {
            GroupStatus::Exited(status) => {
                self.remove_job(job_id);
                Ok(ForegroundStatus::Completed(status))
            }
            GroupStatus::Stopped(signal) => {
                if let Some(job) = self.jobs.get_mut(&job_id) {
                    job.mark_stopped();
                }
                self.current_job = Some(job_id);
                Ok(ForegroundStatus::Stopped(
                    job_id,
                    ExitStatus::from_signal(signal),
                ))
            }
        }
    }

    /// Continues the specified job, or the current one, without waiting and
    /// without touching the terminal.
    pub fn put_job_in_background(&mut self, job_id: Option<JobId>) -> Result<JobId> {
        let job_id = self.resolve_job_id(job_id)?;
        debug!("putting job [{}] in background", job_id);

        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::no_such_job(job_id.to_string()))?;
        match signal::killpg(job.pgid(), Signal::SIGCONT) {
            Ok(()) => job.mark_running(),
            // The reaper retires the job once it collects the leader.
            Err(Errno::ESRCH) => warn!("process group {} no longer exists", job.pgid()),
            Err(e) => {
                return Err(e).chain_err(|| format!("failed to continue job [{}]", job_id));
            }
        }

        self.current_job = Some(job_id);
        Ok(job_id)
    }

    /// Collects every child that has terminated or stopped, without blocking.
    ///
    /// A job is retired when the process whose pid equals its group id, the
    /// pipeline's first stage, terminates. Other stages are reaped silently.
    pub fn reap_children(&mut self) -> Result<Vec<JobEvent>> {
        let mut events = Vec::new();
        loop {
            let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED;
            match wait::waitpid(None, Some(flags)) {
                Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
                Ok(WaitStatus::Exited(pid, _)) | Ok(WaitStatus::Signaled(pid, _, _)) => {
                    debug!("reaped {}", pid);
                    if let Some(job_id) = self.find_job_led_by(pid) {
                        if let Some(job) = self.remove_job(job_id) {
                            events.push(JobEvent::Done(job));
                        }
                    }
                }
                Ok(WaitStatus::Stopped(pid, signal)) => {
                    debug!("{} was signaled to stop {:?}.", pid, signal);
                    if let Some(job_id) = self.find_job_led_by(pid) {
                        if let Some(job) = self.jobs.get_mut(&job_id) {
                            if !job.is_stopped() {
                                job.mark_stopped();
                                events.push(JobEvent::Stopped(job.clone()));
                            }
                        }
                        self.current_job = Some(job_id);
                    }
                }
                Ok(_) | Err(Errno::EINTR) => continue,
                Err(e) => return Err(e).chain_err(|| "failed to reap children"),
            }
        }

        Ok(events)
    }

    fn wait_in_foreground(
        &self,
        pgid: Pid,
        last_process: Option<Pid>,
        cont: bool,
    ) -> Result<GroupStatus> {
        let _terminal_state = self
            .terminal
            .map(|terminal| TerminalState::new(terminal, pgid));

        // Send the job a continue signal if necessary
        if cont {
            match signal::killpg(pgid, Signal::SIGCONT) {
                Ok(()) => {}
                Err(Errno::ESRCH) => warn!("process group {} no longer exists", pgid),
                Err(e) => {
                    return Err(e)
                        .chain_err(|| format!("failed to continue process group {}", pgid))
                }
            }
        }

        wait_for_group(pgid, last_process)
    }

    fn resolve_job_id(&self, job_id: Option<JobId>) -> Result<JobId> {
        let job_id = match job_id {
            Some(job_id) => job_id,
            None => self
                .current_job()
                .ok_or_else(|| Error::no_such_job("current"))?,
        };
        if self.jobs.contains_key(&job_id) {
            Ok(job_id)
        } else {
            Err(Error::no_such_job(job_id.to_string()))
        }
    }

    fn find_job_led_by(&self, pid: Pid) -> Option<JobId> {
        self.jobs
            .values()
            .find(|job| job.is_led_by(pid))
            .map(|job| job.id())
    }

    fn get_next_job_id(&mut self) -> JobId {
        self.job_count += 1;
        JobId(self.job_count)
    }
}

impl fmt::Debug for JobManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} jobs\tjob_count: {}", self.jobs.len(), self.job_count)?;
        for job in self.jobs.values() {
            writeln!(f, "{:?}", job)?;
        }

        Ok(())
    }
}

/// RAII struct to encapsulate manipulating terminal state.
///
/// Gives the terminal to a job's process group on creation and gives it back
/// to the shell, with the shell's terminal modes, on drop.
struct TerminalState {
    terminal: RawFd,
    shell_pgid: Pid,
    shell_tmodes: Option<Termios>,
}

impl TerminalState {
    fn new(terminal: RawFd, job_pgid: Pid) -> TerminalState {
        debug!("setting terminal process group to job's process group");
        let shell_tmodes = termios::tcgetattr(terminal).ok();
        // The child may already have taken the terminal, leaving the shell
        // in a background group.
        let temp_result = without_sigttou(|| unistd::tcsetpgrp(terminal, job_pgid));
        log_if_err!(
            temp_result,
            "failed to give terminal to process group {}",
            job_pgid
        );
        TerminalState {
            terminal,
            shell_pgid: unistd::getpgrp(),
            shell_tmodes,
        }
    }
}

impl Drop for TerminalState {
    fn drop(&mut self) {
        debug!("putting shell back into foreground and restoring shell's terminal modes");
        let temp_result = without_sigttou(|| unistd::tcsetpgrp(self.terminal, self.shell_pgid));
        log_if_err!(temp_result, "failed to take back control of terminal");
        if let Some(ref shell_tmodes) = self.shell_tmodes {
            let temp_result = without_sigttou(|| {
                termios::tcsetattr(self.terminal, termios::SetArg::TCSADRAIN, shell_tmodes)
            });
            log_if_err!(
                temp_result,
                "error restoring terminal configuration for shell"
            );
        }
    }
}

/// Runs `f` with SIGTTOU ignored. A process outside the terminal's foreground
/// group is stopped by SIGTTOU when it calls `tcsetpgrp(3)` or `tcsetattr(3)`,
/// unless it ignores the signal. An interactive shell already ignores it.
fn without_sigttou<T, F: FnOnce() -> T>(f: F) -> T {
    let previous = unsafe { signal::signal(Signal::SIGTTOU, SigHandler::SigIgn) };
    let result = f();
    match previous {
        Ok(handler) => {
            let temp_result = unsafe { signal::signal(Signal::SIGTTOU, handler) };
            log_if_err!(temp_result, "failed to restore SIGTTOU handler");
        }
        Err(e) => error!("failed to ignore SIGTTOU: {}", e),
    }
    result
}
