//! Osh Parser
//!
//! A command line is split on `|` into stages and each stage is split on
//! whitespace. There is no quoting: a `|` between quotes still separates
//! stages.

use log::debug;

use crate::errors::{Error, Result};

pub use self::ast::{Command, CommandBuilder, OutputMode, OutputRedirect};

pub mod ast;

const PIPE: char = '|';
const BACKGROUND: char = '&';
const INPUT_REDIRECT: &str = "<";
const OUTPUT_REDIRECT: &str = ">";
const APPEND_REDIRECT: &str = ">>";

#[derive(Debug, PartialEq, Eq)]
pub struct Pipeline {
    /// Command line, used for job messages
    pub input: String,
    /// The stages to execute, connected stdout to stdin
    pub commands: Vec<Command>,
    /// Run the pipeline in the background, defaults to false
    pub background: bool,
}

impl Pipeline {
    /// Parses a finished command line. Blank input yields an empty pipeline.
    pub fn parse(input: &str) -> Result<Pipeline> {
        let input = input.trim();
        let (body, background) = match input.strip_suffix(BACKGROUND) {
            Some(body) => (body.trim_end(), true),
            None => (input, false),
        };

        if body.is_empty() {
            if background {
                return Err(Error::syntax(BACKGROUND.to_string()));
            }
            return Ok(Pipeline {
                input: input.to_string(),
                commands: Vec::new(),
                background,
            });
        }

        let commands = body
            .split(PIPE)
            .map(Command::parse)
            .collect::<Result<Vec<_>>>()?;
        let pipeline = Pipeline {
            input: input.to_string(),
            commands,
            background,
        };
        debug!("parsed Pipeline: {:?}", pipeline);
        Ok(pipeline)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Command {
    /// Parses one pipeline stage.
    ///
    /// `<`, `>` and `>>` take the following token as their target; the target
    /// may also be attached (`>out.txt`). A redirection without a target, or
    /// a stage without a program, is a syntax error.
    pub fn parse(stage: &str) -> Result<Command> {
        let mut builder = CommandBuilder::new();
        let mut tokens = stage.split_whitespace();
        while let Some(token) = tokens.next() {
            builder = match split_redirect(token) {
                Some((operator, target)) => {
                    let target = match target {
                        Some(target) => target,
                        None => tokens
                            .next()
                            .filter(|t| split_redirect(t).is_none())
                            .ok_or_else(|| Error::syntax(operator))?,
                    };
                    match operator {
                        INPUT_REDIRECT => builder.stdin(target),
                        OUTPUT_REDIRECT => builder.stdout(target, OutputMode::Truncate),
                        _ => builder.stdout(target, OutputMode::Append),
                    }
                }
                None => builder.arg(token),
            };
        }

        if builder.is_empty() {
            let stage = stage.trim();
            let near = if stage.is_empty() {
                PIPE.to_string()
            } else {
                stage.to_string()
            };
            return Err(Error::syntax(near));
        }

        Ok(builder.build())
    }
}

/// Returns the redirection operator of `token` and its attached target, if any.
fn split_redirect(token: &str) -> Option<(&'static str, Option<&str>)> {
    let operator: &'static str = *[APPEND_REDIRECT, OUTPUT_REDIRECT, INPUT_REDIRECT]
        .iter()
        .find(|op| token.starts_with(**op))?;
    let rest = &token[operator.len()..];
    Some((operator, if rest.is_empty() { None } else { Some(rest) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn syntax_error_near(result: Result<Pipeline>) -> String {
        match result {
            Err(e) => match *e.kind() {
                ErrorKind::Syntax(ref line) => line.clone(),
                ref kind => panic!("expected syntax error, got {:?}", kind),
            },
            Ok(pipeline) => panic!("expected syntax error, got {:?}", pipeline),
        }
    }

    #[test]
    fn test_parse_empty() {
        let pipeline = Pipeline::parse("   ").unwrap();
        assert!(pipeline.is_empty());
        assert!(!pipeline.background);
    }

    #[test]
    fn test_parse_simple_command() {
        let pipeline = Pipeline::parse("  ls -l   /tmp ").unwrap();
        assert_eq!(pipeline.input, "ls -l   /tmp");
        assert_eq!(
            pipeline.commands,
            vec![CommandBuilder::new().arg("ls").arg("-l").arg("/tmp").build()]
        );
        assert_eq!(pipeline.commands[0].program(), "ls");
        assert_eq!(pipeline.commands[0].args(), &["-l", "/tmp"]);
    }

    #[test]
    fn test_parse_background() {
        let pipeline = Pipeline::parse("sleep 10 &").unwrap();
        assert!(pipeline.background);
        assert_eq!(pipeline.input, "sleep 10 &");
        assert_eq!(pipeline.commands[0].argv, vec!["sleep", "10"]);

        let pipeline = Pipeline::parse("sleep 10&").unwrap();
        assert!(pipeline.background);
        assert_eq!(pipeline.commands[0].argv, vec!["sleep", "10"]);
    }

    #[test]
    fn test_parse_lone_background_marker() {
        assert_eq!(syntax_error_near(Pipeline::parse(" & ")), "&");
    }

    #[test]
    fn test_parse_pipeline() {
        let pipeline = Pipeline::parse("cat < in.txt | sort -r | uniq >> out.txt &").unwrap();
        assert!(pipeline.background);
        assert_eq!(
            pipeline.commands,
            vec![
                CommandBuilder::new().arg("cat").stdin("in.txt").build(),
                CommandBuilder::new().arg("sort").arg("-r").build(),
                CommandBuilder::new()
                    .arg("uniq")
                    .stdout("out.txt", OutputMode::Append)
                    .build(),
            ]
        );
    }

    #[test]
    fn test_parse_redirects() {
        let command = Command::parse("sort > out.txt < in.txt -n").unwrap();
        assert_eq!(
            command,
            CommandBuilder::new()
                .arg("sort")
                .arg("-n")
                .stdin("in.txt")
                .stdout("out.txt", OutputMode::Truncate)
                .build()
        );
    }

    #[test]
    fn test_parse_attached_redirects() {
        let command = Command::parse("sort <in.txt >>out.txt").unwrap();
        assert_eq!(command.stdin, Some("in.txt".to_string()));
        assert_eq!(
            command.stdout,
            Some(OutputRedirect {
                path: "out.txt".to_string(),
                mode: OutputMode::Append,
            })
        );
    }

    #[test]
    fn test_parse_last_redirect_wins() {
        let command = Command::parse("echo hi > a > b").unwrap();
        assert_eq!(command.stdout.unwrap().path, "b");
    }

    #[test]
    fn test_parse_dangling_redirect() {
        assert_eq!(syntax_error_near(Pipeline::parse("cat <")), "<");
        assert_eq!(syntax_error_near(Pipeline::parse("echo hi >")), ">");
        assert_eq!(syntax_error_near(Pipeline::parse("echo hi >> | wc")), ">>");
        assert_eq!(syntax_error_near(Pipeline::parse("echo hi > > out")), ">");
    }

    #[test]
    fn test_parse_empty_stage() {
        assert_eq!(syntax_error_near(Pipeline::parse("ls | | wc")), "|");
        assert_eq!(syntax_error_near(Pipeline::parse("| wc")), "|");
        assert_eq!(syntax_error_near(Pipeline::parse("> out.txt")), "> out.txt");
    }

    #[test]
    fn test_parse_pipe_inside_quotes_is_not_protected() {
        let pipeline = Pipeline::parse("echo 'a|b'").unwrap();
        assert_eq!(pipeline.commands.len(), 2);
        assert_eq!(pipeline.commands[0].argv, vec!["echo", "'a"]);
        assert_eq!(pipeline.commands[1].argv, vec!["b'"]);
    }
}
