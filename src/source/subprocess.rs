use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::watch;

use super::multiplexer::StreamMultiplexer;
use super::signals::{self, TerminationSignals};
use crate::error::ProcessingError;

pub type ExitCode = i32;

/// Reported when the child was killed by a signal and has no exit code
pub const SIGNALED_EXIT_CODE: ExitCode = 255;

/// Exit code of a wrapped command, once it has one.
#[derive(Debug, Clone)]
pub struct ExitWatch(watch::Receiver<Option<ExitCode>>);

impl ExitWatch {
    /// None while the command is still running.
    pub fn code(&self) -> Option<ExitCode> {
        *self.0.borrow()
    }

    pub async fn wait(&mut self) -> ExitCode {
        match self.0.wait_for(Option::is_some).await {
            Ok(code) => (*code).unwrap_or(SIGNALED_EXIT_CODE),
            Err(_) => {
                tracing::warn!("lost track of command exit status");
                SIGNALED_EXIT_CODE
            }
        }
    }
}

/// A running wrapped command.
///
/// stdout and stderr are exposed as separate line sources; the exit code is
/// published through `exit`. Callers must drain both sources before
/// waiting on `exit` so no trailing output is lost.
pub struct Subprocess {
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
    pub exit: ExitWatch,
    pid: Option<u32>,
}

impl Subprocess {
    /// Start `command` (program followed by its arguments) and begin
    /// forwarding termination signals to it.
    pub fn spawn(command: &[String]) -> Result<Self, ProcessingError> {
        let rendered = command.join(" ");
        let (program, args) = command.split_first().ok_or_else(|| ProcessingError::Spawn {
            command: rendered.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessingError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;
        let pid = child.id();
        let signals = TerminationSignals::install()?;
        tracing::debug!(command = %rendered, pid = ?pid, "spawned command");

        let (exit_tx, exit) = watch::channel(None);
        tokio::spawn(supervise(child, signals, exit_tx));

        Ok(Subprocess {
            stdout,
            stderr,
            exit: ExitWatch(exit),
            pid,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Register stdout then stderr with `mux` and hand back the exit watch.
    pub fn attach(self, mux: &mut StreamMultiplexer) -> ExitWatch {
        mux.add_source(self.stdout);
        mux.add_source(self.stderr);
        self.exit
    }
}

fn missing_pipe(name: &str) -> ProcessingError {
    ProcessingError::IoError(std::io::Error::other(format!("child {} was not captured", name)))
}

/// Waits for the child while passing on any signal we receive.
async fn supervise(
    mut child: Child,
    mut signals: TerminationSignals,
    exit_tx: watch::Sender<Option<ExitCode>>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(signo) = signals.recv() => {
                match child.id() {
                    Some(pid) => {
                        tracing::info!(signal = signo, pid, "passing signal to command");
                        if let Err(e) = signals::forward(pid, signo) {
                            tracing::warn!(signal = signo, error = %e, "failed to pass signal on");
                        }
                    }
                    None => tracing::debug!(signal = signo, "command already exited"),
                }
            }
        }
    };

    let code = match status {
        Ok(status) => exit_code(status),
        Err(e) => {
            tracing::warn!(error = %e, "failed waiting for command");
            SIGNALED_EXIT_CODE
        }
    };
    tracing::debug!(code, "command exited");
    // Receivers may be gone if the caller bailed out early
    let _ = exit_tx.send(Some(code));
}

fn exit_code(status: ExitStatus) -> ExitCode {
    status.code().unwrap_or(SIGNALED_EXIT_CODE)
}
