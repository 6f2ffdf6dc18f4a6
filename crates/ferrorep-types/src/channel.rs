//! The privileged command channel abstraction
//!
//! The engine never knows whether a local root shell or a brokered service sits
//! behind a channel. It only relies on each command's own output arriving in
//! order.

use crate::{CommandOutput, Error, OutputLine, ProbeKind, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// Streamed output of a running command plus its eventual exit code
#[derive(Debug)]
pub struct CommandStream {
    lines: mpsc::Receiver<OutputLine>,
    exit: oneshot::Receiver<Result<i32>>,
}

impl CommandStream {
    /// Assemble a stream from its line and exit-status halves
    pub fn new(lines: mpsc::Receiver<OutputLine>, exit: oneshot::Receiver<Result<i32>>) -> Self {
        Self { lines, exit }
    }

    /// A finished stream replaying canned lines
    pub fn from_lines<I>(lines: I, exit_code: i32) -> Self
    where
        I: IntoIterator<Item = OutputLine>,
    {
        let lines: Vec<OutputLine> = lines.into_iter().collect();
        let (line_tx, line_rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            // capacity covers every line
            let _ = line_tx.try_send(line);
        }
        let (exit_tx, exit_rx) = oneshot::channel();
        let _ = exit_tx.send(Ok(exit_code));
        Self::new(line_rx, exit_rx)
    }

    /// Next output line, `None` once both output streams are closed
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }

    /// Wait for the command to exit
    ///
    /// Remaining lines are discarded.
    pub async fn wait(mut self) -> Result<i32> {
        self.lines.close();
        while self.lines.recv().await.is_some() {}
        match self.exit.await {
            Ok(status) => status,
            Err(_) => Err(Error::channel("command stream closed before reporting an exit status")),
        }
    }
}

/// A way to run shell-style commands with elevated rights
#[async_trait]
pub trait CommandChannel: Send + Sync + std::fmt::Debug {
    /// Human-readable name used in logs
    fn name(&self) -> &str;

    /// Run a command and collect all of its output
    async fn execute_with_output(&self, command: &str) -> Result<CommandOutput>;

    /// Run a command and stream its output line by line
    async fn execute_streaming(&self, command: &str) -> Result<CommandStream>;

    /// Run a command and return only its exit code
    async fn execute(&self, command: &str) -> Result<i32> {
        Ok(self.execute_with_output(command).await?.exit_code)
    }

    /// Check whether the channel can be used for a run
    async fn probe(&self, kind: ProbeKind) -> bool {
        match kind {
            ProbeKind::Root => match self.execute_with_output("id -u").await {
                Ok(output) => output.success() && output.stdout.trim() == "0",
                Err(_) => false,
            },
            ProbeKind::Liveness => matches!(self.execute("true").await, Ok(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct CannedChannel {
        uid: &'static str,
    }

    #[async_trait]
    impl CommandChannel for CannedChannel {
        fn name(&self) -> &str {
            "canned"
        }

        async fn execute_with_output(&self, command: &str) -> Result<CommandOutput> {
            let stdout = if command == "id -u" { self.uid } else { "" };
            Ok(CommandOutput {
                exit_code: 0,
                stdout: format!("{stdout}\n"),
                stderr: String::new(),
            })
        }

        async fn execute_streaming(&self, _command: &str) -> Result<CommandStream> {
            Ok(CommandStream::from_lines(Vec::new(), 0))
        }
    }

    #[tokio::test]
    async fn test_stream_replays_lines_in_order() {
        let mut stream = CommandStream::from_lines(
            vec![OutputLine::stdout("a"), OutputLine::stderr("b")],
            3,
        );
        assert_eq!(stream.next_line().await, Some(OutputLine::stdout("a")));
        assert_eq!(stream.next_line().await, Some(OutputLine::stderr("b")));
        assert_eq!(stream.next_line().await, None);
        assert_eq!(stream.wait().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_wait_without_exit_status_is_channel_error() {
        let (_line_tx, line_rx) = mpsc::channel(1);
        let (exit_tx, exit_rx) = oneshot::channel::<Result<i32>>();
        drop(exit_tx);
        drop(_line_tx);
        let stream = CommandStream::new(line_rx, exit_rx);
        let error = stream.wait().await.unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::Channel);
    }

    #[tokio::test]
    async fn test_default_root_probe_checks_uid() {
        assert!(CannedChannel { uid: "0" }.probe(ProbeKind::Root).await);
        assert!(!CannedChannel { uid: "1000" }.probe(ProbeKind::Root).await);
        assert!(CannedChannel { uid: "1000" }.probe(ProbeKind::Liveness).await);
    }
}
