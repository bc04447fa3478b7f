use log::debug;
use serde_derive::Deserialize;

use crate::core::job::JobId;
use crate::shell::builtins::{self, prelude::*};

pub struct Jobs;

#[derive(Debug, Deserialize)]
struct JobsArgs {
    flag_l: bool,
    flag_p: bool,
}

impl builtins::BuiltinCommand for Jobs {
    const NAME: &'static str = builtins::JOBS_NAME;

    const HELP: &'static str = "\
jobs: jobs [-l | -p]
    Display status of jobs.

    Lists the active jobs in order of their job ids.

    Exit Status:
    Returns success unless an invalid option is given or an error occurs.

Usage:
    jobs [-l | -p]

Options:
    -l  List process IDs in addition to the normal information.
    -p  List process group IDs only.";

    fn run(shell: &mut Shell, args: &[String], stdout: &mut dyn Write) -> Result<ExitStatus> {
        let args: JobsArgs = parse_args(Self::HELP, Self::NAME, args)?;
        debug!("{:?}", args);

        for job in &shell.job_manager().get_jobs() {
            if args.flag_p {
                writeln!(stdout, "{}", job.pgid())?;
                continue;
            }

            writeln!(stdout, "{} (PGID {})", job, job.pgid())?;
            if args.flag_l {
                for pid in job.processes() {
                    writeln!(stdout, "\t{}", pid)?;
                }
            }
        }

        Ok(ExitStatus::from_success())
    }
}

fn parse_job_id(arg: Option<&String>) -> Result<Option<JobId>> {
    arg.map(|arg| arg.parse::<JobId>()).transpose()
}

fn with_builtin_name(name: &str, e: Error) -> Error {
    match *e.kind() {
        ErrorKind::NoSuchJob(ref job) => Error::no_such_job(format!("{}: {}", name, job)),
        _ => e,
    }
}

pub struct Fg;

impl builtins::BuiltinCommand for Fg {
    const NAME: &'static str = builtins::FG_NAME;

    const HELP: &'static str = "\
fg: fg [job_spec]
    Move job to the foreground.

    Place the job identified by JOB_SPEC in the foreground, making it
    the current job. If JOB_SPEC is not present, the shell's notion of the
    current job is used. JOB_SPEC is a job id, optionally prefixed by `%'.

    Exit Status:
    Status of command placed in foreground or failure if an error occurs.";

    fn run(shell: &mut Shell, args: &[String], stdout: &mut dyn Write) -> Result<ExitStatus> {
        parse_job_id(args.first())
            .and_then(|job_id| shell.put_job_in_foreground(job_id, stdout))
            .map_err(|e| with_builtin_name(Self::NAME, e))
    }
}

pub struct Bg;

impl builtins::BuiltinCommand for Bg {
    const NAME: &'static str = builtins::BG_NAME;

    const HELP: &'static str = "\
bg: bg [job_spec ...]
    Move jobs to the background.

    Place the jobs identified by each JOB_SPEC in the background, as if they
    had been started with `&'. If JOB_SPEC is not present, the shell's notion
    of the current job is used.

    Exit Status:
    Returns success unless a JOB_SPEC names no job or an error occurs.";

    fn run(shell: &mut Shell, args: &[String], stdout: &mut dyn Write) -> Result<ExitStatus> {
        if args.is_empty() {
            shell
                .put_job_in_background(None, stdout)
                .map_err(|e| with_builtin_name(Self::NAME, e))?;
            return Ok(ExitStatus::from_success());
        }

        let mut status = ExitStatus::from_success();
        for arg in args {
            let result = parse_job_id(Some(arg))
                .and_then(|job_id| shell.put_job_in_background(job_id, stdout))
                .map_err(|e| with_builtin_name(Self::NAME, e));
            if let Err(e) = result {
                eprintln!("osh: {}", e);
                status = ExitStatus::from_failure();
            }
        }

        Ok(status)
    }
}
