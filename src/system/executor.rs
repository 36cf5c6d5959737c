// src/system/executor.rs

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::{Child, Command};

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    #[error("Command '{0}' exited with a non-zero error code.")]
    NonZeroExitStatus(String),
    #[error("Command '{command}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("Command '{0}' was interrupted by the user.")]
    Interrupted(String),
}

/// Executes a one-shot command with inherited stdio and waits for it.
///
/// A leading `-` makes a non-zero exit status non-fatal. Ctrl+C kills the
/// child and yields `ExecutionError::Interrupted`. There is no timeout: a
/// command that never exits blocks the caller.
pub async fn execute_command(
    command_line: &str,
    cwd: &Path,
    env_vars: &HashMap<String, String>,
) -> Result<(), ExecutionError> {
    let trimmed_command = command_line.trim();
    let (final_command_line, ignore_errors) = match trimmed_command.strip_prefix('-') {
        Some(rest) => (rest.trim(), true),
        None => (trimmed_command, false),
    };

    let Some((program, args)) = split_command(final_command_line)? else {
        return Ok(()); // An empty command is a success, not an error.
    };

    let mut command = build_command(&program, &args, cwd, env_vars);
    command.stdout(Stdio::inherit()).stderr(Stdio::inherit());

    let mut child = spawn_with_fallback(command, final_command_line, cwd, env_vars)?;
    log::debug!("Spawned '{}' (PID: {:?}).", final_command_line, child.id());

    let status = wait_or_interrupt(&mut child, final_command_line).await?;
    if !status.success() && !ignore_errors {
        return Err(ExecutionError::NonZeroExitStatus(
            final_command_line.to_string(),
        ));
    }
    Ok(())
}

/// Executes a command and captures its standard output.
/// Stderr is passed through to the user's terminal.
pub async fn execute_and_capture_output(
    command_line: &str,
    cwd: &Path,
    env_vars: &HashMap<String, String>,
) -> Result<String, ExecutionError> {
    let trimmed_command = command_line.trim();
    let Some((program, args)) = split_command(trimmed_command)? else {
        return Ok(String::new());
    };

    let output = build_command(&program, &args, cwd, env_vars)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .await
        .map_err(|e| ExecutionError::CommandFailed(trimmed_command.to_string(), e))?;

    if !output.status.success() {
        return Err(ExecutionError::NonZeroExitStatus(
            trimmed_command.to_string(),
        ));
    }

    String::from_utf8(output.stdout).map_err(|e| ExecutionError::InvalidUtf8Output {
        command: trimmed_command.to_string(),
        source: e,
    })
}

/// Splits a command line into program and arguments, shell-style.
fn split_command(command_line: &str) -> Result<Option<(String, Vec<String>)>, ExecutionError> {
    if command_line.is_empty() {
        return Ok(None);
    }
    let mut parts = shlex::split(command_line)
        .ok_or_else(|| ExecutionError::CommandParse(command_line.to_string()))?
        .into_iter();
    Ok(parts.next().map(|program| (program, parts.collect())))
}

pub(crate) fn build_command(
    program: &str,
    args: &[String],
    cwd: &Path,
    env_vars: &HashMap<String, String>,
) -> Command {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(dunce::simplified(cwd))
        .envs(env_vars);
    command
}

/// Spawns `command`. On Windows, built-ins like `echo` are not executables,
/// so a `NotFound` is retried through `cmd /C`.
fn spawn_with_fallback(
    mut command: Command,
    command_line: &str,
    cwd: &Path,
    env_vars: &HashMap<String, String>,
) -> Result<Child, ExecutionError> {
    match command.spawn() {
        Ok(child) => Ok(child),
        Err(e) if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") => {
            log::debug!("Command '{}' not found. Retrying with cmd /C.", command_line);
            Command::new("cmd")
                .arg("/C")
                .arg(command_line)
                .current_dir(dunce::simplified(cwd))
                .envs(env_vars)
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .spawn()
                .map_err(|e| ExecutionError::CommandFailed(command_line.to_string(), e))
        }
        Err(e) => Err(ExecutionError::CommandFailed(command_line.to_string(), e)),
    }
}

async fn wait_or_interrupt(
    child: &mut Child,
    command_line: &str,
) -> Result<ExitStatus, ExecutionError> {
    tokio::select! {
        status = child.wait() => {
            status.map_err(|e| ExecutionError::CommandFailed(command_line.to_string(), e))
        }
        _ = tokio::signal::ctrl_c() => {
            log::debug!("Interrupt received, killing child process (PID: {:?})...", child.id());
            if let Err(e) = child.kill().await {
                log::warn!("Failed to kill child process: {}", e);
            }
            Err(ExecutionError::Interrupted(command_line.to_string()))
        }
    }
}
