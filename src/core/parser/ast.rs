/// How an output redirection opens its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// `>`
    Truncate,
    /// `>>`
    Append,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputRedirect {
    pub path: String,
    pub mode: OutputMode,
}

/// One stage of a pipeline: `argv[0]` is the program, searched on `PATH`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Command {
    pub argv: Vec<String>,
    pub stdin: Option<String>,
    pub stdout: Option<OutputRedirect>,
}

impl Command {
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CommandBuilder {
    argv: Vec<String>,
    stdin: Option<String>,
    stdout: Option<OutputRedirect>,
}

impl CommandBuilder {
    pub fn new() -> CommandBuilder {
        Default::default()
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> CommandBuilder {
        self.argv.push(arg.into());
        self
    }

    /// Later redirections replace earlier ones, following bash's behavior.
    pub fn stdin<S: Into<String>>(self, path: S) -> CommandBuilder {
        CommandBuilder {
            stdin: Some(path.into()),
            ..self
        }
    }

    pub fn stdout<S: Into<String>>(self, path: S, mode: OutputMode) -> CommandBuilder {
        CommandBuilder {
            stdout: Some(OutputRedirect {
                path: path.into(),
                mode,
            }),
            ..self
        }
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    pub fn build(self) -> Command {
        Command {
            argv: self.argv,
            stdin: self.stdin,
            stdout: self.stdout,
        }
    }
}
