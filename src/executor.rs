use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info, warn};

#[cfg(test)]
use mockall::automock;

/// How the text typed at the prompt becomes a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShellMode {
    /// split into words following shell quoting rules, no shell involved
    ArgumentVector,
    /// handed verbatim to `sh -c`: pipes, redirections and expansions work
    Passthrough,
}

/// A line of user input, ready to be appended to a wrapper command.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UserCommand {
    Words(Vec<String>),
    Shell(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum InvocationError {
    #[error("unbalanced quotes or dangling escape in {0:?}")]
    Unparseable(String),
}

impl UserCommand {
    pub fn parse(text: &str, mode: ShellMode) -> Result<Self, InvocationError> {
        match mode {
            ShellMode::Passthrough => Ok(UserCommand::Shell(text.to_string())),
            ShellMode::ArgumentVector => shlex::split(text)
                .map(UserCommand::Words)
                .ok_or_else(|| InvocationError::Unparseable(text.to_string())),
        }
    }
}

/// A fully assembled command line: program plus arguments.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Invocation {
    program: String,
    args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Invocation {
            program: program.into(),
            args,
        }
    }
    pub fn program(&self) -> &str {
        &self.program
    }
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        match shlex::try_join(words.clone()) {
            Ok(joined) => f.write_str(&joined),
            // nul bytes cannot be quoted, show the raw words instead
            Err(_) => f.write_str(&words.collect::<Vec<_>>().join(" ")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum ExitOutcome {
    Success,
    Failure,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait CommandExecutor: Send + Sync {
    /// Runs the invocation to completion. Spawn errors and non-zero exits are failures.
    async fn execute(&self, invocation: &Invocation) -> ExitOutcome;
}

/// Runs invocations as child processes sharing the terminal with us.
pub(crate) struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, invocation: &Invocation) -> ExitOutcome {
        info!("running {invocation}");
        match Command::new(invocation.program())
            .args(invocation.args())
            .status()
            .await
        {
            Ok(status) if status.success() => ExitOutcome::Success,
            Ok(status) => {
                warn!("{} exited with {status}", invocation.program());
                ExitOutcome::Failure
            }
            Err(e) => {
                error!("unable to start {}: {e}", invocation.program());
                ExitOutcome::Failure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn argument_vector_splits_like_a_shell() {
        let parsed = UserCommand::parse(
            r#"curl -H "Accept: text/plain" 'https://example.com/a b'"#,
            ShellMode::ArgumentVector,
        )
        .unwrap();
        assert_eq!(
            parsed,
            UserCommand::Words(words(&[
                "curl",
                "-H",
                "Accept: text/plain",
                "https://example.com/a b"
            ]))
        );
    }
    #[test]
    fn argument_vector_keeps_shell_syntax_literal() {
        let parsed = UserCommand::parse("cat /etc/hosts | wc -l", ShellMode::ArgumentVector).unwrap();
        assert_eq!(
            parsed,
            UserCommand::Words(words(&["cat", "/etc/hosts", "|", "wc", "-l"]))
        );
    }
    #[test]
    fn unbalanced_quotes_are_rejected() {
        assert_eq!(
            UserCommand::parse("echo \"oops", ShellMode::ArgumentVector),
            Err(InvocationError::Unparseable(String::from("echo \"oops")))
        );
    }
    #[test]
    fn passthrough_keeps_the_text() {
        assert_eq!(
            UserCommand::parse("echo \"oops | tee x", ShellMode::Passthrough),
            Ok(UserCommand::Shell(String::from("echo \"oops | tee x")))
        );
    }
    #[test]
    fn display_quotes_arguments() {
        let invocation = Invocation::new("proxychains", words(&["-f", "/tmp/p.conf", "echo", "a b"]));
        let shown = invocation.to_string();
        assert!(shown.starts_with("proxychains -f /tmp/p.conf echo "));
        assert_eq!(
            shlex::split(&shown).unwrap(),
            words(&["proxychains", "-f", "/tmp/p.conf", "echo", "a b"])
        );
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let outcome = ProcessExecutor.execute(&Invocation::new("true", vec![])).await;
        assert_eq!(outcome, ExitOutcome::Success);
    }
    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let outcome = ProcessExecutor
            .execute(&Invocation::new("sh", words(&["-c", "exit 3"])))
            .await;
        assert_eq!(outcome, ExitOutcome::Failure);
    }
    #[tokio::test]
    async fn spawn_error_is_failure() {
        let outcome = ProcessExecutor
            .execute(&Invocation::new("/nonexistent/proxyspray-test-binary", vec![]))
            .await;
        assert_eq!(outcome, ExitOutcome::Failure);
    }
}
