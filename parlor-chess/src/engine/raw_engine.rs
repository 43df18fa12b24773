use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::trace;
use vampirc_uci::UciMessage;

use super::error::EngineError;

#[derive(Debug)]
pub struct RawEngine {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl RawEngine {
    pub fn new(path: &Path, args: &[String]) -> Result<Self, EngineError> {
        let mut child = Command::new(path)
            .kill_on_drop(true)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .args(args)
            .spawn()
            .map_err(|e| {
                EngineError::Unavailable(format!("failed to launch {}: {}", path.display(), e))
            })?;
        let stdin = child.stdin.take()
            .ok_or_else(|| EngineError::Unavailable("engine stdin not captured".to_owned()))?;
        let stdout = child.stdout.take()
            .ok_or_else(|| EngineError::Unavailable("engine stdout not captured".to_owned()))?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    pub async fn send(&mut self, message: &UciMessage) -> Result<(), EngineError> {
        let line = format!("{}\n", message);
        trace!(line = line.trim_end(), "engine <");
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Next non-blank line as a UCI message, or `None` once the engine closed
    /// its output.
    pub async fn recv(&mut self) -> Result<Option<UciMessage>, EngineError> {
        loop {
            let mut line = String::new();
            if self.stdout.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            trace!(line, "engine >");
            return Ok(Some(vampirc_uci::parse_one(line)));
        }
    }

    pub async fn wait(&mut self) -> Result<(), EngineError> {
        self.child.wait().await?;
        Ok(())
    }

    pub async fn kill(&mut self) -> Result<(), EngineError> {
        self.child.kill().await?;
        Ok(())
    }

    pub fn start_kill(&mut self) {
        // Already exited is the only failure here.
        self.child.start_kill().ok();
    }
}
