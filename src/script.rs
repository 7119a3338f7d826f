//! # Script
//!
//! Parsing and execution of the changer script that is run inside each
//! repository clone

use eyre::Context;
use std::{
    path::{Path, PathBuf, absolute},
    process::Stdio,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
};

/// ENOEXEC, running a file that is not in an executable format
const EXEC_FORMAT_ERROR: i32 = 8;

/// A changer executable together with its arguments
#[derive(Debug, Clone)]
pub struct Script {
    /// Absolute path of the executable, the script runs with the
    /// repository clone as its working directory so a relative path
    /// would resolve against the wrong directory
    path: PathBuf,
    arguments: Vec<String>,
}

impl Script {
    /// Parse a shell style command string into a script. The executable
    /// is resolved through PATH, then relative to the working directory
    pub fn parse(command: &str) -> eyre::Result<Script> {
        let mut parts = parse_command_line(command)?.into_iter();

        let executable = parts
            .next()
            .ok_or_else(|| eyre::eyre!("no script was provided"))?;

        let path = match which::which(&executable) {
            Ok(path) => path,
            Err(_) if !Path::new(&executable).exists() => {
                eyre::bail!("could not find executable {executable}")
            }
            Err(_) => eyre::bail!(
                "could not find executable {executable}, does it have executable privileges?"
            ),
        };

        let path = absolute(path).context("failed to get absolute script path")?;

        Ok(Script {
            path,
            arguments: parts.collect(),
        })
    }

    fn command(&self, directory: &Path, repository: &str) -> Command {
        let mut command = Command::new(&self.path);
        command
            .args(&self.arguments)
            .current_dir(directory)
            .env("REPOSITORY", repository);
        command
    }

    /// Run the script inside `directory`, streaming its stdout and
    /// stderr line by line into the log. A non zero exit code is an
    /// error
    pub async fn run(&self, directory: &Path, repository: &str) -> eyre::Result<()> {
        let mut child = self
            .command(directory, repository)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(transform_exec_error)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| eyre::eyre!("script stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| eyre::eyre!("script stderr was not captured"))?;

        let (status, _, _) = tokio::join!(
            child.wait(),
            log_lines(stdout),
            log_lines(stderr)
        );

        let status = status.context("failed to wait for script")?;
        if !status.success() {
            eyre::bail!(
                "script exited with {}",
                status.code().unwrap_or(-1)
            );
        }

        Ok(())
    }

    /// Run the script inside `directory`, copying its stdout and stderr
    /// verbatim to the provided writers once it finishes
    pub async fn run_with_output(
        &self,
        directory: &Path,
        repository: &str,
        stdout: &mut dyn std::io::Write,
        stderr: &mut dyn std::io::Write,
    ) -> eyre::Result<()> {
        let output = self
            .command(directory, repository)
            .output()
            .await
            .map_err(transform_exec_error)?;

        stdout
            .write_all(&output.stdout)
            .context("failed to write script output")?;
        stderr
            .write_all(&output.stderr)
            .context("failed to write script error output")?;

        if !output.status.success() {
            eyre::bail!(
                "script exited with {}",
                output.status.code().unwrap_or(-1)
            );
        }

        Ok(())
    }
}

/// Log every line the script writes
async fn log_lines(reader: impl AsyncRead + Unpin) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::info!("Script output: {line}");
    }
}

/// Give the cryptic "exec format error" a friendlier message
fn transform_exec_error(error: std::io::Error) -> eyre::Report {
    if error.raw_os_error() == Some(EXEC_FORMAT_ERROR) {
        return eyre::eyre!("the script or program is in the wrong format");
    }

    eyre::Report::new(error).wrap_err("failed to start script")
}

/// Split a command string into its parts, honoring single and double
/// quotes and backslash escapes
fn parse_command_line(command: &str) -> eyre::Result<Vec<String>> {
    #[derive(Clone, Copy)]
    enum State {
        Start,
        Quotes(char),
        Arg,
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut state = State::Start;
    let mut escape_next = false;

    for character in command.chars() {
        if let State::Quotes(quote) = state {
            if character == quote {
                args.push(std::mem::take(&mut current));
                state = State::Start;
            } else {
                current.push(character);
            }
            continue;
        }

        if escape_next {
            current.push(character);
            escape_next = false;
            continue;
        }

        if character == '\\' {
            escape_next = true;
            state = State::Arg;
            continue;
        }

        if character == '"' || character == '\'' {
            state = State::Quotes(character);
            continue;
        }

        match state {
            State::Arg => {
                if character == ' ' || character == '\t' {
                    args.push(std::mem::take(&mut current));
                    state = State::Start;
                } else {
                    current.push(character);
                }
            }
            State::Start => {
                if character != ' ' && character != '\t' {
                    state = State::Arg;
                    current.push(character);
                }
            }
            State::Quotes(_) => unreachable!(),
        }
    }

    if let State::Quotes(_) = state {
        eyre::bail!("unclosed quote in command line: {command}");
    }

    if !current.is_empty() {
        args.push(current);
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::{Script, parse_command_line};

    #[test]
    fn test_parse_command_line() {
        let args = parse_command_line("changer --flag value").unwrap();
        assert_eq!(args, vec!["changer", "--flag", "value"]);
    }

    #[test]
    fn test_parse_command_line_quotes() {
        let args = parse_command_line(r#"changer "two words" 'single quoted'"#).unwrap();
        assert_eq!(args, vec!["changer", "two words", "single quoted"]);
    }

    #[test]
    fn test_parse_command_line_escapes() {
        let args = parse_command_line(r"changer a\ b").unwrap();
        assert_eq!(args, vec!["changer", "a b"]);
    }

    #[test]
    fn test_parse_command_line_extra_whitespace() {
        let args = parse_command_line("  changer \t value  ").unwrap();
        assert_eq!(args, vec!["changer", "value"]);
    }

    #[test]
    fn test_parse_command_line_unclosed_quote() {
        assert!(parse_command_line(r#"changer "unclosed"#).is_err());
    }

    #[test]
    fn test_parse_script_missing_executable() {
        let error = Script::parse("definitely-not-a-real-executable-42")
            .unwrap_err()
            .to_string();
        assert!(error.contains("could not find executable"));
    }

    #[tokio::test]
    async fn test_run_script_sets_environment() {
        let dir = tempfile::tempdir().unwrap();

        let script = Script::parse("sh -c 'printf %s \"$REPOSITORY\" > repo.txt'").unwrap();
        script.run(dir.path(), "owner/repo").await.unwrap();

        let content = tokio::fs::read_to_string(dir.path().join("repo.txt"))
            .await
            .unwrap();
        assert_eq!(content, "owner/repo");
    }

    #[tokio::test]
    async fn test_run_script_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();

        let script = Script::parse("sh -c 'exit 3'").unwrap();
        let error = script.run(dir.path(), "owner/repo").await.unwrap_err();
        assert!(error.to_string().contains("exited with 3"));
    }

    #[tokio::test]
    async fn test_run_with_output() {
        let dir = tempfile::tempdir().unwrap();

        let script = Script::parse("sh -c 'echo out; echo err >&2'").unwrap();

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        script
            .run_with_output(dir.path(), "owner/repo", &mut stdout, &mut stderr)
            .await
            .unwrap();

        assert_eq!(stdout, b"out\n");
        assert_eq!(stderr, b"err\n");
    }
}
