//! One pipeline stage: a spawned child process.
//!
//! Each stage's stderr is forwarded to the log at error severity as it
//! arrives, one line at a time, tagged with the stage title. The kill token
//! is sticky: cancelling after the child has exited is a no-op.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::StageFailure;
use crate::plan::Stage;

/// Handle on one spawned stage.
#[derive(Debug)]
pub struct ProcessHandle {
    pub title: &'static str,
    pub(crate) stdin: Option<ChildStdin>,
    pub(crate) stdout: Option<ChildStdout>,
    child: Child,
    kill: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl ProcessHandle {
    /// Spawn `stage`. `piped_stdin` is true for every stage but the head of
    /// a pipeline; the head reads its inputs from the filesystem.
    pub fn spawn(stage: &Stage, piped_stdin: bool) -> std::io::Result<Self> {
        let mut cmd = Command::new(&stage.executable);
        cmd.args(&stage.args)
            .stdin(if piped_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &stage.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn()?;
        debug!(stage = stage.title, executable = %stage.executable, "spawned");

        if let Some(stderr) = child.stderr.take() {
            let title = stage.title;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    error!(stage = title, "{line}");
                }
            });
        }

        Ok(Self {
            title: stage.title,
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            child,
            kill: CancellationToken::new(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Token that terminates this stage when cancelled.
    pub fn kill_token(&self) -> CancellationToken {
        self.kill.clone()
    }

    /// Flag that flips once the stage has reached a terminal state.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    /// Wait for the stage to reach a terminal state, honoring the kill
    /// token.
    ///
    /// Resolves exactly once per handle. A cancelled token translates into
    /// a kill; if the child has already exited the cancellation is a no-op
    /// and the real exit status is reported.
    pub(crate) async fn supervise(mut self) -> Result<(), StageFailure> {
        let status = tokio::select! {
            status = self.child.wait() => status,
            _ = self.kill.cancelled() => {
                let _ = self.child.start_kill();
                self.child.wait().await
            }
        };
        self.closed.store(true, Ordering::SeqCst);

        match status {
            Ok(status) if status.success() => {
                debug!(stage = self.title, "exited cleanly");
                Ok(())
            }
            Ok(status) => {
                let failure = StageFailure::from_status(status);
                error!(stage = self.title, %failure, "stage failed");
                Err(failure)
            }
            Err(err) => {
                error!(stage = self.title, error = %err, "wait failed");
                Err(StageFailure::Io(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stage(executable: &str, args: &[&str]) -> Stage {
        Stage {
            title: "alignment-view",
            executable: executable.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: None,
        }
    }

    #[tokio::test]
    async fn clean_exit_resolves_ok() {
        let handle = ProcessHandle::spawn(&stage("/bin/echo", &["hello"]), false).unwrap();
        let closed = handle.closed_flag();
        handle.supervise().await.unwrap();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failure() {
        let handle = ProcessHandle::spawn(&stage("/bin/sh", &["-c", "exit 3"]), false).unwrap();
        match handle.supervise().await {
            Err(StageFailure::Exit { code: 3 }) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn kill_token_terminates_the_stage() {
        let handle = ProcessHandle::spawn(&stage("/bin/sleep", &["30"]), false).unwrap();
        let token = handle.kill_token();
        token.cancel();
        match handle.supervise().await {
            Err(StageFailure::Signal { .. }) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn kill_after_exit_is_a_noop() {
        let handle = ProcessHandle::spawn(&stage("/bin/echo", &["done"]), false).unwrap();
        let token = handle.kill_token();
        // Give the child time to exit before the cancellation arrives.
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        handle.supervise().await.unwrap();
    }

    #[tokio::test]
    async fn missing_executable_fails_to_spawn() {
        let err = ProcessHandle::spawn(&stage("/nonexistent/tool", &[]), false).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
