use crate::shell::builtins::{self, prelude::*};
use crate::shell::JobManager;

pub struct Exit;

impl builtins::BuiltinCommand for Exit {
    const NAME: &'static str = builtins::EXIT_NAME;

    const HELP: &'static str = "\
exit: exit [n]
    Exit the shell with a status of N. If N is omitted, the exit status
    is that of the last command executed. If there are jobs, the first
    attempt is refused with a warning; a second `exit' in a row exits.";

    fn run(shell: &mut Shell, args: &[String], _stdout: &mut dyn Write) -> Result<ExitStatus> {
        if shell.warn_before_exit() {
            let message = refusal_message(shell.job_manager());
            return Err(Error::builtin_command(message, 1));
        }

        let status_code = args
            .first()
            .map(|arg| {
                arg.parse::<i32>().unwrap_or_else(|_| {
                    eprintln!("osh: exit: {}: numeric argument required", arg);
                    2
                })
            })
            .map(ExitStatus::from_status);
        shell.exit(status_code);
    }
}

fn refusal_message(job_manager: &JobManager) -> &'static str {
    if job_manager.has_stopped_jobs() {
        "There are stopped jobs."
    } else {
        "There are running jobs."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::{JobState, ProcessGroup};
    use nix::unistd::Pid;

    fn process_group(leader: i32) -> ProcessGroup {
        ProcessGroup {
            id: Pid::from_raw(leader),
            processes: vec![Pid::from_raw(leader)],
        }
    }

    #[test]
    fn test_refusal_names_running_jobs() {
        let mut manager = JobManager::default();
        manager.create_job("sleep 10 &", process_group(100), JobState::Running);
        assert_eq!(refusal_message(&manager), "There are running jobs.");
    }

    #[test]
    fn test_refusal_names_stopped_jobs() {
        let mut manager = JobManager::default();
        manager.create_job("sleep 10 &", process_group(100), JobState::Running);
        manager.create_job("vi", process_group(200), JobState::Stopped);
        assert_eq!(refusal_message(&manager), "There are stopped jobs.");
    }
}
