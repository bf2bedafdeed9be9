use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::refresh::domain::identity_index::{IdentityIndex, RebuildProgress};

#[derive(Error, Debug)]
pub enum RebuildError {
    #[error("rebuild command is empty")]
    EmptyCommand,
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to poll `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
    },
    #[error("`{program}` still running after {timeout:?}, killed")]
    TimedOut { program: String, timeout: Duration },
    #[error("failed to clear enrollment flag {path}: {source}")]
    ClearFlag {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

struct RunningRebuild {
    program: String,
    child: Child,
    started: Instant,
}

/// Enrollment is signalled by a flag file dropped next to the index; the
/// rebuild is an external command run as a child process and polled with
/// `try_wait`, so the caller never waits on it. The flag is removed only once
/// the command succeeds, so a failed rebuild is retried on the next check.
pub struct FlagFileIdentityIndex {
    flag: PathBuf,
    command: Vec<String>,
    timeout: Duration,
    running: Option<RunningRebuild>,
}

impl FlagFileIdentityIndex {
    pub fn new(flag: &Path, command: Vec<String>, timeout: Duration) -> Result<Self, RebuildError> {
        if command.is_empty() {
            return Err(RebuildError::EmptyCommand);
        }
        Ok(Self {
            flag: flag.to_path_buf(),
            command,
            timeout,
            running: None,
        })
    }

    fn clear_flag(&self) -> Result<(), RebuildError> {
        match std::fs::remove_file(&self.flag) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RebuildError::ClearFlag {
                path: self.flag.clone(),
                source: e,
            }),
        }
    }
}

impl IdentityIndex for FlagFileIdentityIndex {
    fn has_new_enrollment(&mut self) -> Result<bool, Box<dyn std::error::Error>> {
        Ok(self.flag.try_exists()?)
    }

    fn start_rebuild(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.running.is_some() {
            return Ok(());
        }
        let (program, args) = self
            .command
            .split_first()
            .ok_or(RebuildError::EmptyCommand)?;
        log::debug!("Starting index rebuild: {}", self.command.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| RebuildError::Spawn {
                program: program.clone(),
                source: e,
            })?;
        self.running = Some(RunningRebuild {
            program: program.clone(),
            child,
            started: Instant::now(),
        });
        Ok(())
    }

    fn poll_rebuild(&mut self) -> Result<RebuildProgress, Box<dyn std::error::Error>> {
        let Some(mut running) = self.running.take() else {
            return Ok(RebuildProgress::Idle);
        };

        let status = match running.child.try_wait() {
            Ok(Some(status)) => status,
            Ok(None) if running.started.elapsed() < self.timeout => {
                self.running = Some(running);
                return Ok(RebuildProgress::Running);
            }
            Ok(None) => {
                if let Err(e) = running.child.kill() {
                    log::warn!("Could not kill `{}`: {e}", running.program);
                }
                let _ = running.child.wait();
                return Err(RebuildError::TimedOut {
                    program: running.program,
                    timeout: self.timeout,
                }
                .into());
            }
            Err(e) => {
                return Err(RebuildError::Wait {
                    program: running.program,
                    source: e,
                }
                .into())
            }
        };

        if !status.success() {
            return Err(RebuildError::Failed {
                program: running.program,
                status,
            }
            .into());
        }
        log::debug!(
            "Index rebuild finished in {:.1}s",
            running.started.elapsed().as_secs_f64()
        );
        self.clear_flag()?;
        Ok(RebuildProgress::Completed)
    }
}
