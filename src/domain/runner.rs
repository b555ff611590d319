use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::NetError;

/// A completed child process, whatever its exit status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Execution {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// First non-blank stderr line, usually the tool's own diagnosis.
    pub fn stderr_line(&self) -> Option<&str> {
        self.stderr.lines().map(str::trim).find(|l| !l.is_empty())
    }

    fn failure_reason(&self) -> String {
        match self.stderr_line() {
            Some(line) => line.to_string(),
            None => match self.exit_code {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            },
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` to completion or until `timeout` elapses. Fails only when
    /// the process cannot be started or overruns its deadline.
    async fn execute(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Execution, NetError>;

    /// Like `execute`, but a non-zero exit is a `CommandFailed` and only
    /// stdout is returned.
    async fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<String, NetError> {
        let execution = self.execute(program, args, timeout).await?;
        if execution.success() {
            Ok(execution.stdout)
        } else {
            let reason = execution.failure_reason();
            debug!(program = %program, reason = %reason, "command exited unsuccessfully");
            Err(NetError::CommandFailed {
                program: program.to_string(),
                reason,
                source: None,
            })
        }
    }
}

/// Runs real OS processes through `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn execute(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Execution, NetError> {
        debug!(program = %program, ?args, ?timeout, "spawning");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                debug!(program = %program, error = %e, "spawn failed");
                NetError::spawn(program, e)
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let outcome = tokio::time::timeout(timeout, async {
            tokio::try_join!(child.wait(), drain(stdout), drain(stderr))
        })
        .await;

        match outcome {
            Ok(Ok((status, out, err))) => Ok(Execution {
                exit_code: status.code(),
                stdout: String::from_utf8_lossy(&out).to_string(),
                stderr: String::from_utf8_lossy(&err).to_string(),
            }),
            Ok(Err(e)) => Err(NetError::CommandFailed {
                program: program.to_string(),
                reason: e.to_string(),
                source: Some(e),
            }),
            Err(_) => {
                warn!(program = %program, ?timeout, "command timed out, killing");
                if let Err(e) = child.kill().await {
                    debug!(program = %program, error = %e, "kill after timeout failed");
                }
                Err(NetError::CommandTimeout {
                    program: program.to_string(),
                    timeout,
                })
            }
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Scripted {
        Output(Execution),
        Timeout,
    }

    /// Answers commands from a script keyed by `"program arg1 arg2"`.
    /// Anything unscripted behaves like a missing binary.
    #[derive(Default)]
    pub struct ScriptedRunner {
        script: HashMap<String, Scripted>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn ok(self, command: &str, stdout: &str) -> Self {
            self.exit(command, 0, stdout, "")
        }

        pub fn exit(mut self, command: &str, code: i32, stdout: &str, stderr: &str) -> Self {
            self.script.insert(
                command.to_string(),
                Scripted::Output(Execution {
                    exit_code: Some(code),
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                }),
            );
            self
        }

        pub fn timeout(mut self, command: &str) -> Self {
            self.script.insert(command.to_string(), Scripted::Timeout);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn execute(
            &self,
            program: &str,
            args: &[&str],
            timeout: Duration,
        ) -> Result<Execution, NetError> {
            let key = std::iter::once(program)
                .chain(args.iter().copied())
                .collect::<Vec<_>>()
                .join(" ");
            self.calls.lock().unwrap().push(key.clone());
            match self.script.get(&key) {
                Some(Scripted::Output(execution)) => Ok(execution.clone()),
                Some(Scripted::Timeout) => Err(NetError::CommandTimeout {
                    program: program.to_string(),
                    timeout,
                }),
                None => Err(NetError::spawn(
                    program,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
                )),
            }
        }
    }
}
