use std::ffi::{CStr, CString};
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use log::{debug, error};
use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::libc;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::stat::Mode;
use nix::unistd::{self, ForkResult, Pid};

use crate::core::job::ProcessGroup;
use crate::core::parser::{Command, OutputMode, Pipeline};
use crate::errors::{ErrorKind, Result, ResultExt};

const SIGNALS_TO_RESET: [Signal; 6] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGCHLD,
];

const EXIT_REDIRECT_FAILED: i32 = 1;
const EXIT_NOT_EXECUTABLE: i32 = 126;
const EXIT_NOT_FOUND: i32 = 127;

/// A `Command` converted to the representation `execvp(3)` and `open(2)`
/// need. Built before forking so the child does not allocate.
#[derive(Debug)]
struct PreparedCommand {
    argv: Vec<CString>,
    stdin: Option<CString>,
    stdout: Option<(CString, OutputMode)>,
}

impl PreparedCommand {
    fn new(command: &Command) -> Result<Self> {
        Ok(Self {
            argv: command
                .argv
                .iter()
                .map(|arg| to_cstring(arg))
                .collect::<Result<_>>()?,
            stdin: command.stdin.as_ref().map(|p| to_cstring(p)).transpose()?,
            stdout: command
                .stdout
                .as_ref()
                .map(|r| to_cstring(&r.path).map(|path| (path, r.mode)))
                .transpose()?,
        })
    }

    fn program(&self) -> &CStr {
        &self.argv[0]
    }
}

fn to_cstring(s: &str) -> Result<CString> {
    CString::new(s).chain_err(|| ErrorKind::InvalidArgument(s.to_string()))
}

/// Spawns one process per stage of `pipeline`, all in one new process group.
///
/// Stage *i*'s stdout is connected to stage *i+1*'s stdin. If `terminal` is
/// set, each child also makes the new group the terminal's foreground group
/// before it execs.
///
/// Fails without creating any process if the pipeline is empty, if an
/// argument cannot be passed to `execvp(3)`, or if a pipe cannot be created.
/// A stage that cannot be forked is reported and skipped.
pub fn spawn_processes(pipeline: &Pipeline, terminal: Option<RawFd>) -> Result<ProcessGroup> {
    if pipeline.is_empty() {
        return Err(ErrorKind::EmptyPipeline.into());
    }

    let commands = pipeline
        .commands
        .iter()
        .map(PreparedCommand::new)
        .collect::<Result<Vec<_>>>()?;
    let pipes = (1..commands.len())
        .map(|_| create_pipe())
        .collect::<Result<Vec<_>>>()?;

    let mut pgid: Option<Pid> = None;
    let mut processes = Vec::with_capacity(commands.len());
    for (index, command) in commands.iter().enumerate() {
        // The child only reaches async-signal-safe calls plus execvp(3).
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => exec_command(index, command, &pipes, pgid, terminal),
            Ok(ForkResult::Parent { child }) => {
                let group = *pgid.get_or_insert(child);
                // Set the group in both parent and child so that neither
                // depends on which runs first. Fails with EACCES once the
                // child has already exec'd, by which time it set it itself.
                if let Err(e) = unistd::setpgid(child, group) {
                    debug!("setpgid({}, {}) failed in parent: {}", child, group, e);
                }
                debug!(
                    "spawned {:?} as pid {} in group {}",
                    command.program(),
                    child,
                    group
                );
                processes.push(child);
            }
            Err(e) => {
                error!("failed to fork stage {} ({:?}): {}", index, command.program(), e);
                eprintln!(
                    "osh: {}: fork failed: {}",
                    command.program().to_string_lossy(),
                    e
                );
            }
        }
    }

    // The parent must not hold any pipe end, or readers never see EOF.
    drop(pipes);

    match pgid {
        Some(id) => Ok(ProcessGroup {
            id,
            processes,
        }),
        None => Err(ErrorKind::Spawn(pipeline.input.clone()).into()),
    }
}

/// Wraps `unistd::pipe()` to return RAII structs instead of raw, owning file descriptors
/// Returns (`read_end_pipe`, `write_end_pipe`)
fn create_pipe() -> Result<(OwnedFd, OwnedFd)> {
    // IMPORTANT: immediately pass the RawFds returned by unistd::pipe()
    // into RAII structs. If the function returns before they are moved
    // into RAII structs, the fds could be leaked.
    let (read_end_pipe, write_end_pipe) =
        unistd::pipe().chain_err(|| "failed to create pipe")?;
    unsafe {
        Ok((
            OwnedFd::from_raw_fd(read_end_pipe),
            OwnedFd::from_raw_fd(write_end_pipe),
        ))
    }
}

/// Runs in the forked child. Never returns: the child either becomes the
/// stage's program or exits with a non-zero status.
fn exec_command(
    index: usize,
    command: &PreparedCommand,
    pipes: &[(OwnedFd, OwnedFd)],
    pgid: Option<Pid>,
    terminal: Option<RawFd>,
) -> ! {
    let pid = unistd::getpid();
    let pgid = pgid.unwrap_or(pid);
    let _ = unistd::setpgid(pid, pgid);

    // A new group is a background group until it owns the terminal, so
    // SIGTTOU must be ignored while taking it. The reset below restores it.
    if let Some(terminal) = terminal {
        unsafe {
            let _ = signal::signal(Signal::SIGTTOU, SigHandler::SigIgn);
        }
        let _ = unistd::tcsetpgrp(terminal, pgid);
    }

    for &sig in &SIGNALS_TO_RESET {
        unsafe {
            let _ = signal::signal(sig, SigHandler::SigDfl);
        }
    }

    if index > 0 {
        redirect(command, pipes[index - 1].0.as_raw_fd(), libc::STDIN_FILENO);
    }
    if index < pipes.len() {
        redirect(command, pipes[index].1.as_raw_fd(), libc::STDOUT_FILENO);
    }
    for (read_end, write_end) in pipes {
        let _ = unistd::close(read_end.as_raw_fd());
        let _ = unistd::close(write_end.as_raw_fd());
    }

    // File redirects override the pipe, following bash's behavior.
    if let Some(ref path) = command.stdin {
        let fd = open_or_exit(command, path, OFlag::O_RDONLY);
        redirect_and_close(command, fd, libc::STDIN_FILENO);
    }
    if let Some((ref path, mode)) = command.stdout {
        let flags = OFlag::O_WRONLY
            | OFlag::O_CREAT
            | match mode {
                OutputMode::Truncate => OFlag::O_TRUNC,
                OutputMode::Append => OFlag::O_APPEND,
            };
        let fd = open_or_exit(command, path, flags);
        redirect_and_close(command, fd, libc::STDOUT_FILENO);
    }

    let errno = match unistd::execvp(command.program(), &command.argv) {
        Ok(never) => match never {},
        Err(errno) => errno,
    };
    report_child_error(command.program(), None, errno);
    child_exit(match errno {
        Errno::ENOENT => EXIT_NOT_FOUND,
        _ => EXIT_NOT_EXECUTABLE,
    })
}

fn open_or_exit(command: &PreparedCommand, path: &CStr, flags: OFlag) -> RawFd {
    let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
    match fcntl::open(path, flags, mode) {
        Ok(fd) => fd,
        Err(errno) => {
            report_child_error(command.program(), Some(path), errno);
            child_exit(EXIT_REDIRECT_FAILED)
        }
    }
}

fn redirect(command: &PreparedCommand, from: RawFd, to: RawFd) {
    if from == to {
        return;
    }
    if let Err(errno) = unistd::dup2(from, to) {
        report_child_error(command.program(), None, errno);
        child_exit(EXIT_REDIRECT_FAILED)
    }
}

fn redirect_and_close(command: &PreparedCommand, fd: RawFd, to: RawFd) {
    if fd != to {
        redirect(command, fd, to);
        let _ = unistd::close(fd);
    }
}

/// Writes `osh: <program>[: <path>]: <reason>` to stderr without allocating.
fn report_child_error(program: &CStr, path: Option<&CStr>, errno: Errno) {
    let reason = match errno {
        Errno::ENOENT if path.is_none() => "command not found",
        _ => errno.desc(),
    };
    let mut parts: [&[u8]; 7] = [b"osh: ", program.to_bytes(), b"", b"", b": ", b"", b"\n"];
    if let Some(path) = path {
        parts[2] = b": ";
        parts[3] = path.to_bytes();
    }
    parts[5] = reason.as_bytes();
    for part in parts.iter() {
        let _ = unistd::write(libc::STDERR_FILENO, part);
    }
}

fn child_exit(code: i32) -> ! {
    // The parent's atexit handlers and stdio buffers are not ours to run.
    unsafe { libc::_exit(code) }
}

