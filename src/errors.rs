//! Error module. See the [error-chain](https://crates.io/crates/error-chain) crate for details.

use error_chain::error_chain;

error_chain! {
    foreign_links {
        Docopt(::docopt::Error);
        Io(::std::io::Error);
        Nix(::nix::Error);
        Readline(::rustyline::error::ReadlineError);
    }

    errors {
        /// Offending line or token.
        Syntax(line: String) {
            description("syntax error")
            display("syntax error near: {}", line)
        }
        EmptyPipeline {
            description("empty pipeline")
            display("empty pipeline")
        }
        NoSuchJob(job: String) {
            description("no such job")
            display("{}: no such job", job)
        }
        BuiltinCommand(message: String, code: i32) {
            description("builtin command failed")
            display("{}", message)
        }
        InvalidArgument(arg: String) {
            description("invalid argument")
            display("{}: argument contains a nul byte", arg)
        }
        Spawn(command: String) {
            description("unable to spawn pipeline")
            display("{}: unable to create any process", command)
        }
    }
}

impl Error {
    pub(crate) fn syntax<T: AsRef<str>>(line: T) -> Error {
        ErrorKind::Syntax(line.as_ref().to_string()).into()
    }

    pub(crate) fn builtin_command<T: AsRef<str>>(message: T, code: i32) -> Error {
        ErrorKind::BuiltinCommand(message.as_ref().to_string(), code).into()
    }

    pub(crate) fn no_such_job<T: AsRef<str>>(job: T) -> Error {
        ErrorKind::NoSuchJob(job.as_ref().to_string()).into()
    }
}

/// Logs the error of a `Result` and moves on.
#[macro_export]
macro_rules! log_if_err {
    ($result:expr, $($arg:tt)+) => {
        if let Err(ref e) = $result {
            log::error!("{}: {}", format_args!($($arg)+), e);
        }
    };
}
