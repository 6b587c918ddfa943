//! Process execution for build-tool commands.
//!
//! Builds can run for a long time, so every command takes a [`CancellationToken`] and the
//! default runner kills the child when it fires.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("i/o error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {status}.\nstderr:\n{stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    #[error("`{command}` was cancelled")]
    Cancelled { command: String },
}

impl CommandError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CommandError::Cancelled { .. })
    }
}

pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        cwd: &Path,
        program: &str,
        args: &[&str],
        cancellation: &CancellationToken,
    ) -> Result<CommandOutput, CommandError>;
}

/// Spawns real processes, polling for exit so a cancelled command can be killed.
#[derive(Debug, Default, Clone)]
pub struct DefaultCommandRunner;

impl CommandRunner for DefaultCommandRunner {
    fn run(
        &self,
        cwd: &Path,
        program: &str,
        args: &[&str],
        cancellation: &CancellationToken,
    ) -> Result<CommandOutput, CommandError> {
        let command = format!("{program} {}", args.join(" "));
        if cancellation.is_cancelled() {
            return Err(CommandError::Cancelled { command });
        }
        tracing::debug!(
            target: "blaze.sync",
            command = %command,
            cwd = %cwd.display(),
            "running build tool command"
        );

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let io_error = |source: io::Error| CommandError::Io {
            program: program.to_string(),
            source,
        };
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = match wait_or_kill(&mut child, cancellation).map_err(io_error)? {
            Some(status) => status,
            None => {
                // Drain the pipes so the reader threads exit.
                let _ = stdout.join();
                let _ = stderr.join();
                tracing::debug!(
                    target: "blaze.sync",
                    command = %command,
                    "killed cancelled command"
                );
                return Err(CommandError::Cancelled { command });
            }
        };

        let stdout = join_reader(stdout).map_err(io_error)?;
        let stderr = join_reader(stderr).map_err(io_error)?;
        if !status.success() {
            return Err(CommandError::Failed {
                command,
                status,
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Wait for `child` to exit. Returns `None` if `cancellation` fired and the child was killed.
fn wait_or_kill(
    child: &mut Child,
    cancellation: &CancellationToken,
) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if cancellation.is_cancelled() {
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

type Reader = thread::JoinHandle<io::Result<String>>;

fn spawn_reader(stream: Option<impl Read + Send + 'static>) -> Reader {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            stream.read_to_end(&mut buf)?;
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join_reader(handle: Reader) -> io::Result<String> {
    handle
        .join()
        .map_err(|_| io::Error::other("output reader thread panicked"))?
}
