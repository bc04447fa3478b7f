use std::fmt;
use std::str::FromStr;

use nix::unistd::Pid;

use crate::errors::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u32);

impl FromStr for JobId {
    type Err = Error;

    /// Accepts `n` and `%n` for positive `n`.
    fn from_str(s: &str) -> Result<JobId> {
        let digits = s.strip_prefix('%').unwrap_or(s);
        match digits.parse::<u32>() {
            Ok(id) if id > 0 => Ok(JobId(id)),
            _ => Err(Error::no_such_job(s)),
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
}

impl Default for JobState {
    fn default() -> Self {
        JobState::Running
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            JobState::Running => write!(f, "Running"),
            JobState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// The processes launched for one pipeline. Every process is a member of the
/// process group `id`, which is the pid of the first process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessGroup {
    pub id: Pid,
    pub processes: Vec<Pid>,
}

impl ProcessGroup {
    pub fn leader(&self) -> Pid {
        self.id
    }

    pub fn last_process(&self) -> Option<Pid> {
        self.processes.last().cloned()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Job {
    id: JobId,
    input: String,
    pgid: Pid,
    processes: Vec<Pid>,
    state: JobState,
}

impl Job {
    pub fn new(id: JobId, input: &str, process_group: ProcessGroup, state: JobState) -> Self {
        Self {
            id,
            input: input.to_string(),
            pgid: process_group.id,
            processes: process_group.processes,
            state,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn pgid(&self) -> Pid {
        self.pgid
    }

    pub fn processes(&self) -> &[Pid] {
        &self.processes
    }

    pub fn last_process(&self) -> Option<Pid> {
        self.processes.last().cloned()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.state == JobState::Stopped
    }

    pub fn mark_running(&mut self) {
        self.state = JobState::Running;
    }

    pub fn mark_stopped(&mut self) {
        self.state = JobState::Stopped;
    }

    /// Only the group leader's pid equals the group id.
    pub fn is_led_by(&self, pid: Pid) -> bool {
        self.pgid == pid
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "id: {}\tpgid: {}\tstate: {}\tinput: {}",
            self.id, self.pgid, self.state, self.input
        )
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}\t{}", self.id, self.state, self.input)
    }
}
