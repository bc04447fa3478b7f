//! Runs the `osh` binary on a pseudo-terminal, as its controlling terminal,
//! to check that foreground jobs get the terminal and the shell gets it back.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::fcntl::{self, FcntlArg, OFlag};
use nix::libc;
use nix::pty::{self, PtyMaster};
use nix::unistd::{self, Pid};
use tempdir::TempDir;

const TIMEOUT: Duration = Duration::from_secs(10);

struct Terminal {
    master: PtyMaster,
    slave_path: String,
    dir: TempDir,
}

impl Terminal {
    fn new() -> Terminal {
        let master = pty::posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).unwrap();
        pty::grantpt(&master).unwrap();
        pty::unlockpt(&master).unwrap();
        let slave_path = pty::ptsname_r(&master).unwrap();
        fcntl::fcntl(master.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).unwrap();
        Terminal {
            master,
            slave_path,
            dir: TempDir::new("osh-tty").unwrap(),
        }
    }

    fn path(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().into_owned()
    }

    fn open_slave(&self) -> File {
        OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&self.slave_path)
            .unwrap()
    }

    /// Starts `osh` in a new session whose controlling terminal is this one.
    fn spawn_osh(&self, args: &[&str]) -> Child {
        let mut command = Command::new(env!("CARGO_BIN_EXE_osh"));
        command
            .arg("--log")
            .arg(self.path("osh.log"))
            .args(args)
            .current_dir(self.dir.path())
            .env("HOME", self.dir.path())
            .env("TERM", "dumb")
            .stdin(self.open_slave())
            .stdout(self.open_slave())
            .stderr(self.open_slave());
        unsafe {
            command.pre_exec(|| {
                unistd::setsid().map_err(io::Error::from)?;
                if libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY as _, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
        command.spawn().unwrap()
    }

    fn type_line(&self, line: &str) {
        let input = format!("{}\n", line);
        let written = unistd::write(self.master.as_raw_fd(), input.as_bytes()).unwrap();
        assert_eq!(written, input.len());
    }

    /// Collects output until `needle` appears at or after byte `from`.
    /// Returns the offset just past it.
    fn read_until(&self, output: &mut Vec<u8>, from: usize, needle: &str) -> usize {
        let start = Instant::now();
        loop {
            if let Some(at) = find(&output[from..], needle.as_bytes()) {
                return from + at + needle.len();
            }
            assert!(
                start.elapsed() < TIMEOUT,
                "{:?} never appeared in {:?}",
                needle,
                String::from_utf8_lossy(output)
            );
            thread::sleep(Duration::from_millis(20));
            read_available(self.master.as_raw_fd(), output);
        }
    }

    fn foreground_group(&self) -> Pid {
        unistd::tcgetpgrp(self.master.as_raw_fd()).unwrap()
    }

    /// Collects output until `child` exits. Panics if it does not exit in time.
    fn wait(&self, child: &mut Child) -> (ExitStatus, String) {
        let start = Instant::now();
        let mut output = Vec::new();
        let status = loop {
            read_available(self.master.as_raw_fd(), &mut output);
            if let Some(status) = child.try_wait().unwrap() {
                break status;
            }
            if start.elapsed() > TIMEOUT {
                let _ = child.kill();
                let _ = child.wait();
                panic!(
                    "osh did not exit, output: {:?}",
                    String::from_utf8_lossy(&output)
                );
            }
            thread::sleep(Duration::from_millis(20));
        };
        read_available(self.master.as_raw_fd(), &mut output);
        (status, String::from_utf8_lossy(&output).into_owned())
    }
}

fn read_available(fd: RawFd, output: &mut Vec<u8>) {
    let mut buf = [0u8; 1024];
    loop {
        match unistd::read(fd, &mut buf) {
            Ok(0) | Err(Errno::EAGAIN) | Err(Errno::EIO) => break,
            Ok(n) => output.extend_from_slice(&buf[..n]),
            Err(Errno::EINTR) => continue,
            Err(e) => panic!("failed to read terminal: {}", e),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn write_script(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

#[test]
fn test_command_string_job_reads_terminal() {
    let terminal = Terminal::new();
    let mut child = terminal.spawn_osh(&["-c", "head -n 1"]);
    terminal.type_line("hello");

    let (status, output) = terminal.wait(&mut child);
    assert!(status.success(), "{:?}: {:?}", status, output);
    assert!(output.contains("hello"), "{:?}", output);
    assert!(!output.contains("Stopped"), "{:?}", output);
}

#[test]
fn test_script_job_reads_terminal() {
    let terminal = Terminal::new();
    write_script(terminal.dir.path(), "read.osh", "head -n 1\nexit 4\n");
    let mut child = terminal.spawn_osh(&["read.osh"]);
    terminal.type_line("from the terminal");

    let (status, output) = terminal.wait(&mut child);
    assert_eq!(status.code(), Some(4), "{:?}", output);
    assert!(!output.contains("Stopped"), "{:?}", output);
}

#[test]
fn test_shell_takes_terminal_back_after_stop_and_exit() {
    let terminal = Terminal::new();
    write_script(terminal.dir.path(), "stop.sh", "kill -STOP $$\n");
    let mut child = terminal.spawn_osh(&[]);
    // `osh` leads its own session, so its group id is its pid.
    let shell_pgid = Pid::from_raw(child.id() as i32);
    let mut output = Vec::new();

    let end = terminal.read_until(&mut output, 0, "$ ");
    assert_eq!(terminal.foreground_group(), shell_pgid);

    terminal.type_line("sh stop.sh");
    let end = terminal.read_until(&mut output, end, "[1] Stopped\tsh stop.sh");
    assert_eq!(terminal.foreground_group(), shell_pgid);

    terminal.type_line("fg");
    terminal.type_line("expr 40000 + 2345");
    let end = terminal.read_until(&mut output, end, "42345");
    // The next prompt is only printed once the job has been waited for.
    terminal.read_until(&mut output, end, "$ ");
    assert_eq!(terminal.foreground_group(), shell_pgid);

    terminal.type_line("exit");
    let (status, rest) = terminal.wait(&mut child);
    assert!(
        status.success(),
        "{:?}: {:?}{:?}",
        status,
        String::from_utf8_lossy(&output),
        rest
    );
}
