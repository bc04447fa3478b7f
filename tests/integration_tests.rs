//! Integration Tests

use std::fs;
use std::path::PathBuf;

use assert_cli::Assert;
use tempdir::TempDir;

trait AssertExt {
    fn exit_status_is(self, exit_status: i32) -> Self;
}

impl AssertExt for Assert {
    fn exit_status_is(self, exit_status: i32) -> Self {
        if exit_status == 0 {
            self.succeeds()
        } else {
            self.fails_with(exit_status)
        }
    }
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Workspace {
        Workspace {
            dir: TempDir::new("osh-cli").expect("unable to generate temp dir"),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn log_path(&self) -> String {
        self.path("osh.log").to_string_lossy().into_owned()
    }

    /// Runs `osh -c <command>` with logging redirected into the workspace.
    fn command(&self, command: &str) -> Assert {
        Assert::main_binary().with_args(&["--log", &self.log_path(), "-c", command])
    }

    fn script(&self, name: &str, contents: &str) -> Assert {
        let path = self.path(name);
        fs::write(&path, contents).expect("unable to write script");
        Assert::main_binary().with_args(&["--log", &self.log_path(), &path.to_string_lossy()])
    }
}

#[test]
fn test_simple_echo() {
    let workspace = Workspace::new();
    workspace
        .command("echo test")
        .stdout()
        .contains("test")
        .exit_status_is(0)
        .unwrap();
}

#[test]
fn test_exit_status_of_last_stage() {
    let workspace = Workspace::new();
    workspace.command("false | true").exit_status_is(0).unwrap();
    workspace.command("true | false").exit_status_is(1).unwrap();
}

#[test]
fn test_exit_codes_wrap_like_u8() {
    let workspace = Workspace::new();
    workspace.command("exit 85").exit_status_is(85).unwrap();
    workspace.command("exit 300").exit_status_is(44).unwrap();
    workspace.command("exit -12").exit_status_is(244).unwrap();
}

#[test]
fn test_syntax_error() {
    let workspace = Workspace::new();
    workspace
        .command("cat >")
        .stderr()
        .contains("osh: syntax error near: >")
        .exit_status_is(2)
        .unwrap();
    workspace
        .command("ls | | wc")
        .stderr()
        .contains("syntax error")
        .exit_status_is(2)
        .unwrap();
}

#[test]
fn test_command_not_found() {
    let workspace = Workspace::new();
    workspace
        .command("osh-definitely-not-a-command")
        .stderr()
        .contains("osh-definitely-not-a-command: command not found")
        .exit_status_is(127)
        .unwrap();
}

#[test]
fn test_script_pipeline_and_redirects() {
    let workspace = Workspace::new();
    let out = workspace.path("out.txt");
    let script = format!(
        "echo hay > {out}\necho needle >> {out}\ncat < {out} | grep needle\nexit 3\n",
        out = out.display()
    );
    workspace
        .script("pipeline.osh", &script)
        .stdout()
        .contains("needle")
        .exit_status_is(3)
        .unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), "hay\nneedle\n");
}

#[test]
fn test_builtin_output_redirect() {
    let workspace = Workspace::new();
    let out = workspace.path("help.txt");
    workspace
        .command(&format!("help exit > {}", out.display()))
        .exit_status_is(0)
        .unwrap();
    assert!(fs::read_to_string(&out)
        .unwrap()
        .starts_with("exit: exit [n]"));
}

#[test]
fn test_builtin_in_pipeline_rejected() {
    let workspace = Workspace::new();
    workspace
        .command("jobs | cat")
        .stderr()
        .contains("builtins cannot be piped")
        .exit_status_is(2)
        .unwrap();
}

#[test]
fn test_fg_without_jobs() {
    let workspace = Workspace::new();
    workspace
        .command("fg 3")
        .stderr()
        .contains("fg: 3: no such job")
        .exit_status_is(1)
        .unwrap();
}

#[test]
fn test_background_job_is_announced() {
    let workspace = Workspace::new();
    workspace
        .command("true &")
        .stdout()
        .contains("[1] ")
        .exit_status_is(0)
        .unwrap();
}

#[test]
fn test_version() {
    Assert::main_binary()
        .with_args(&["--version"])
        .stdout()
        .contains("osh version")
        .unwrap();
}
