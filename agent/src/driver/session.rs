// Interactive line-oriented session transport for OLT CLIs
use async_trait::async_trait;
use ponpulse_common::{AgentError, CliTransportConfig, Result};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// The opaque interactive channel a vendor driver talks through:
/// connect, send a line, collect output until the device prompts again.
#[async_trait]
pub trait LineSession: Send {
    async fn connect(&mut self, cancel: &CancellationToken) -> Result<()>;

    /// Send one command line and return everything the device printed up to
    /// (but not including) the next prompt.
    async fn execute(&mut self, cancel: &CancellationToken, command: &str) -> Result<String>;

    async fn close(&mut self) -> Result<()>;
}

/// TCP-backed session with a login exchange and prompt-terminated reads.
pub struct TcpLineSession {
    equipment_id: String,
    config: CliTransportConfig,
    io_timeout: Duration,
    stream: Option<TcpStream>,
}

const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(15);

impl TcpLineSession {
    pub fn new(equipment_id: impl Into<String>, config: CliTransportConfig) -> Self {
        Self {
            equipment_id: equipment_id.into(),
            config,
            io_timeout: DEFAULT_IO_TIMEOUT,
            stream: None,
        }
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    fn transport_err(&self, detail: impl Into<String>) -> AgentError {
        AgentError::Transport {
            equipment: self.equipment_id.clone(),
            detail: detail.into(),
        }
    }

    /// A device prompt is the last non-empty line ending in `>` or `#`
    /// (optionally followed by a space). Both vendors here follow it.
    fn ends_with_prompt(buffer: &str) -> bool {
        let tail = buffer.rsplit('\n').next().unwrap_or(buffer);
        let tail = tail.trim_end();
        tail.ends_with('>') || tail.ends_with('#')
    }

    fn wants_login(buffer: &str) -> bool {
        let lowered = buffer.to_ascii_lowercase();
        let tail = lowered.trim_end();
        tail.ends_with("login:") || tail.ends_with("username:") || tail.ends_with("user name:")
    }

    fn wants_password(buffer: &str) -> bool {
        buffer.to_ascii_lowercase().trim_end().ends_with("password:")
    }

    async fn read_chunk(&mut self, cancel: &CancellationToken, buffer: &mut String) -> Result<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| AgentError::Transport {
                equipment: self.equipment_id.clone(),
                detail: "session not connected".into(),
            })?;
        let mut chunk = [0u8; 4096];
        let read = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            read = tokio::time::timeout(self.io_timeout, stream.read(&mut chunk)) => match read {
                Ok(Ok(0)) => {
                    return Err(AgentError::Transport {
                        equipment: self.equipment_id.clone(),
                        detail: "connection closed by device".into(),
                    })
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    return Err(AgentError::Transport {
                        equipment: self.equipment_id.clone(),
                        detail: format!("read failed: {e}"),
                    })
                }
                Err(_) => {
                    return Err(AgentError::Transport {
                        equipment: self.equipment_id.clone(),
                        detail: format!("read timed out after {:?}", self.io_timeout),
                    })
                }
            },
        };
        buffer.push_str(&String::from_utf8_lossy(&chunk[..read]));
        Ok(read)
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        let equipment = self.equipment_id.clone();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| AgentError::Transport {
                equipment: equipment.clone(),
                detail: "session not connected".into(),
            })?;
        stream
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .map_err(|e| AgentError::Transport {
                equipment,
                detail: format!("write failed: {e}"),
            })
    }

    /// Read until the device prompts again, answering login/password
    /// challenges along the way.
    async fn read_to_prompt(&mut self, cancel: &CancellationToken, login: bool) -> Result<String> {
        let mut buffer = String::new();
        loop {
            self.read_chunk(cancel, &mut buffer).await?;
            if login && Self::wants_login(&buffer) {
                let username = self.config.username.clone();
                self.send_line(&username).await?;
                buffer.push('\n');
                continue;
            }
            if login && Self::wants_password(&buffer) {
                let password = self.config.password.clone();
                self.send_line(&password).await?;
                buffer.push('\n');
                continue;
            }
            if Self::ends_with_prompt(&buffer) {
                return Ok(buffer);
            }
        }
    }
}

#[async_trait]
impl LineSession for TcpLineSession {
    async fn connect(&mut self, cancel: &CancellationToken) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        debug!(equipment = %self.equipment_id, %addr, "connecting CLI session");

        let stream = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            connected = tokio::time::timeout(self.io_timeout, TcpStream::connect(&addr)) => match connected {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return Err(self.transport_err(format!("connect to {addr} failed: {e}"))),
                Err(_) => return Err(self.transport_err(format!("connect to {addr} timed out"))),
            },
        };
        stream
            .set_nodelay(true)
            .map_err(|e| self.transport_err(format!("set_nodelay: {e}")))?;
        self.stream = Some(stream);

        let banner = self.read_to_prompt(cancel, true).await?;
        trace!(equipment = %self.equipment_id, "login complete, banner {} bytes", banner.len());
        Ok(())
    }

    async fn execute(&mut self, cancel: &CancellationToken, command: &str) -> Result<String> {
        trace!(equipment = %self.equipment_id, %command, "cli execute");
        self.send_line(command).await?;
        let raw = self.read_to_prompt(cancel, false).await?;

        // Strip the echoed command and the trailing prompt line.
        let mut lines: Vec<&str> = raw.lines().collect();
        if lines
            .first()
            .map(|l| l.trim() == command.trim())
            .unwrap_or(false)
        {
            lines.remove(0);
        }
        if lines
            .last()
            .map(|l| {
                let t = l.trim_end();
                t.ends_with('>') || t.ends_with('#')
            })
            .unwrap_or(false)
        {
            lines.pop();
        }
        Ok(lines.join("\n"))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            // Polite logout; the device may already have dropped us.
            let _ = stream.write_all(b"quit\r\n").await;
            let _ = stream.shutdown().await;
            debug!(equipment = %self.equipment_id, "cli session closed");
        }
        Ok(())
    }
}
