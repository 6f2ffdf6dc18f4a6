//! Launcher-backed command channel

use async_trait::async_trait;
use ferrorep_types::{
    CommandChannel, CommandOutput, CommandStream, Error, OutputLine, OutputStream, Result,
};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

/// Lines buffered between the pipes and the consumer before the command stalls
const LINE_BUFFER: usize = 256;

/// Channel that runs every command through `launcher... <command>`
#[derive(Debug, Clone)]
pub struct ShellChannel {
    name: String,
    launcher: Vec<String>,
}

impl ShellChannel {
    /// Create a channel from a launcher program and its leading arguments
    pub fn new<S: Into<String>>(name: S, launcher: Vec<String>) -> Result<Self> {
        if launcher.is_empty() {
            return Err(Error::config("channel launcher must name a program"));
        }
        Ok(Self {
            name: name.into(),
            launcher,
        })
    }

    /// Local root shell through `su -c`
    pub fn root() -> Self {
        Self {
            name: "root-shell".to_string(),
            launcher: vec!["su".to_string(), "-c".to_string()],
        }
    }

    /// Plain `sh -c` with the caller's own rights
    pub fn local() -> Self {
        Self {
            name: "local-shell".to_string(),
            launcher: vec!["sh".to_string(), "-c".to_string()],
        }
    }

    /// Launcher program and arguments
    pub fn launcher(&self) -> &[String] {
        &self.launcher
    }

    fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.launcher[0]);
        cmd.args(&self.launcher[1..])
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn spawn(&self, command: &str) -> Result<Child> {
        debug!(channel = %self.name, command, "spawning command");
        self.command(command).spawn().map_err(|e| {
            error!(channel = %self.name, "failed to launch {}: {}", self.launcher[0], e);
            Error::channel(format!("{}: failed to launch {}: {}", self.name, self.launcher[0], e))
        })
    }

    fn exit_code(&self, status: ExitStatus) -> Result<i32> {
        status.code().ok_or_else(|| {
            error!(channel = %self.name, "command terminated by signal");
            Error::channel(format!("{}: command terminated by signal", self.name))
        })
    }
}

/// Forward one pipe line by line; keeps draining after the consumer hangs up
async fn pump<R>(reader: R, stream: OutputStream, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut forwarding = true;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if !forwarding {
                    continue;
                }
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let line = OutputLine {
                    stream,
                    text: String::from_utf8_lossy(&buf).into_owned(),
                };
                if tx.send(line).await.is_err() {
                    forwarding = false;
                }
            }
        }
    }
}

#[async_trait]
impl CommandChannel for ShellChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute_with_output(&self, command: &str) -> Result<CommandOutput> {
        let child = self.spawn(command)?;
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::channel(format!("{}: {}", self.name, e)))?;
        Ok(CommandOutput {
            exit_code: self.exit_code(output.status)?,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn execute_streaming(&self, command: &str) -> Result<CommandStream> {
        let mut child = self.spawn(command)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::channel("stdout pipe unavailable"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::channel("stderr pipe unavailable"))?;

        let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
        let (exit_tx, exit_rx) = oneshot::channel();

        let out_task = tokio::spawn(pump(stdout, OutputStream::Stdout, line_tx.clone()));
        let err_task = tokio::spawn(pump(stderr, OutputStream::Stderr, line_tx));

        let channel = self.clone();
        tokio::spawn(async move {
            let _ = tokio::join!(out_task, err_task);
            let status = match child.wait().await {
                Ok(status) => channel.exit_code(status),
                Err(e) => Err(Error::channel(format!("{}: {}", channel.name, e))),
            };
            if let Ok(code) = &status {
                debug!(channel = %channel.name, code, "command exited");
            }
            let _ = exit_tx.send(status);
        });

        Ok(CommandStream::new(line_rx, exit_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrorep_types::{ErrorKind, ProbeKind};

    #[tokio::test]
    async fn test_execute_with_output_collects_both_streams() {
        let channel = ShellChannel::local();
        let output = channel
            .execute_with_output("echo out; echo err >&2; exit 3")
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_streaming_preserves_per_stream_order() {
        let channel = ShellChannel::local();
        let mut stream = channel
            .execute_streaming("for i in 1 2 3; do echo line$i; done; echo oops >&2")
            .await
            .unwrap();

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(line) = stream.next_line().await {
            match line.stream {
                OutputStream::Stdout => stdout.push(line.text),
                OutputStream::Stderr => stderr.push(line.text),
            }
        }
        assert_eq!(stdout, vec!["line1", "line2", "line3"]);
        assert_eq!(stderr, vec!["oops"]);
        assert_eq!(stream.wait().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_collected_output_keeps_nul_separators() {
        let temp = tempfile::TempDir::new().unwrap();
        let odd = temp.path().join("two\nlines");
        std::fs::write(&odd, b"1234567").unwrap();
        let command = format!(
            "stat --printf '%s %n\\0' -- {}",
            crate::shell_quote(&odd.to_string_lossy())
        );

        let output = ShellChannel::local()
            .execute_with_output(&command)
            .await
            .unwrap();
        assert!(output.success());
        let expected = format!("7 {}", odd.display());
        let records: Vec<&str> = output.stdout.split('\0').filter(|r| !r.is_empty()).collect();
        assert_eq!(records, vec![expected.as_str()]);
    }

    #[tokio::test]
    async fn test_wait_drains_unread_output() {
        let channel = ShellChannel::local();
        let stream = channel
            .execute_streaming("seq 1 5000; exit 4")
            .await
            .unwrap();
        assert_eq!(stream.wait().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_missing_launcher_is_channel_error() {
        let channel = ShellChannel::new(
            "broken",
            vec!["/nonexistent/ferrorep-launcher".to_string()],
        )
        .unwrap();
        let error = channel.execute("true").await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Channel);
        assert!(!channel.probe(ProbeKind::Liveness).await);
    }

    #[tokio::test]
    async fn test_signal_kill_is_channel_error() {
        let channel = ShellChannel::local();
        let stream = channel.execute_streaming("kill -9 $$").await.unwrap();
        let error = stream.wait().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Channel);
    }

    #[tokio::test]
    async fn test_local_shell_liveness() {
        assert!(ShellChannel::local().probe(ProbeKind::Liveness).await);
    }

    #[test]
    fn test_empty_launcher_rejected() {
        assert!(ShellChannel::new("empty", Vec::new()).is_err());
    }
}
