//! Request/response channel over an already-open instrument stream.
//!
//! The channel never opens or configures the link; it receives a boxed duplex
//! stream (a serial port in production, `tokio::io::duplex` in tests) and
//! enforces the protocol ordering: one response line per command, consumed in
//! the order the commands were written.

use super::protocol::{parse_response, Command};
use crate::config::InstrumentConfig;
use crate::error::{AppResult, DaqError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, trace, warn};

/// Anything that can carry the instrument's byte stream.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Boxed instrument stream.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Channel behaviour that is independent of the transport.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Boot-banner lines drained during [`InstrumentChannel::connect`]
    pub banner_lines: usize,
    /// Bound on each response wait; `None` waits indefinitely
    pub read_timeout: Option<Duration>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            banner_lines: 3,
            read_timeout: None,
        }
    }
}

impl From<&InstrumentConfig> for ChannelSettings {
    fn from(config: &InstrumentConfig) -> Self {
        Self {
            banner_lines: config.banner_lines,
            read_timeout: config.read_timeout,
        }
    }
}

/// Protocol layer for the bench instrument.
///
/// Owned by exactly one caller at a time (`&mut self` on every operation), which
/// matches the half-duplex instrument: there is never more than one sweep in flight.
pub struct InstrumentChannel {
    port: BufReader<DynSerial>,
    settings: ChannelSettings,
    /// Commands written whose response line has not been read yet, oldest first
    outstanding: Vec<Command>,
    /// Set after a transport failure; the stream position is unknown from then on
    poisoned: bool,
}

impl InstrumentChannel {
    /// Take ownership of an open stream and drain the firmware boot banner.
    ///
    /// # Errors
    /// `HandshakeUnderrun` if the stream closes before `banner_lines` lines arrive,
    /// `Transport` on any read failure.
    pub async fn connect(stream: DynSerial, settings: ChannelSettings) -> AppResult<Self> {
        let mut channel = Self {
            port: BufReader::new(stream),
            settings,
            outstanding: Vec::new(),
            poisoned: false,
        };
        channel.drain_banner().await?;
        Ok(channel)
    }

    async fn drain_banner(&mut self) -> AppResult<()> {
        let expected = self.settings.banner_lines;
        for received in 0..expected {
            let mut line = String::new();
            let n = self
                .read_raw_line(&mut line, "reading boot banner")
                .await?;
            if n == 0 {
                self.poisoned = true;
                return Err(DaqError::HandshakeUnderrun { expected, received });
            }
            info!(banner = %line.trim_end(), "Instrument banner");
        }
        debug!(lines = expected, "Instrument handshake complete");
        Ok(())
    }

    /// Write one command. Its response must later be consumed with
    /// [`read_value`](Self::read_value) or [`discard_response`](Self::discard_response).
    pub async fn send(&mut self, command: Command) -> AppResult<()> {
        self.ensure_usable()?;
        let wire = command.encode();
        trace!(command = %wire, "Sending instrument command");

        let port = self.port.get_mut();
        let result = async {
            port.write_all(wire.as_bytes()).await?;
            port.flush().await
        }
        .await;

        if let Err(e) = result {
            self.poisoned = true;
            return Err(DaqError::transport(format!("writing {}", wire), e));
        }
        self.outstanding.push(command);
        Ok(())
    }

    /// Read the response to `command` and return its value token.
    ///
    /// `command` must be the oldest command still awaiting a response.
    pub async fn read_value(&mut self, command: Command) -> AppResult<f64> {
        let line = self.next_response(command).await?;
        parse_response(&line).map_err(|reason| DaqError::MalformedResponse {
            command: command.encode(),
            line: line.trim_end().to_string(),
            reason,
        })
    }

    /// Read and drop the response to `command` (set-voltage echoes carry no data).
    pub async fn discard_response(&mut self, command: Command) -> AppResult<()> {
        let line = self.next_response(command).await?;
        trace!(command = %command, echo = %line.trim_end(), "Discarded echo line");
        Ok(())
    }

    /// Send a command and read its value.
    pub async fn query(&mut self, command: Command) -> AppResult<f64> {
        self.send(command).await?;
        self.read_value(command).await
    }

    /// Number of commands whose response has not been read.
    pub fn pending_responses(&self) -> usize {
        self.outstanding.len()
    }

    /// True once a transport failure made the stream position unknown.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Read and drop every outstanding response so the next command starts aligned.
    ///
    /// Used after a malformed line: the link itself is still fine, but replies to
    /// the rest of the interrupted point are already on their way.
    pub async fn resync(&mut self) -> AppResult<()> {
        let pending = self.outstanding.len();
        if pending > 0 {
            warn!(pending, "Draining outstanding instrument responses");
        }
        while let Some(&command) = self.outstanding.first() {
            self.discard_response(command).await?;
        }
        Ok(())
    }

    async fn next_response(&mut self, command: Command) -> AppResult<String> {
        self.ensure_usable()?;
        match self.outstanding.first() {
            Some(expected) if *expected == command => {}
            Some(expected) => {
                return Err(DaqError::Configuration(format!(
                    "response read out of order: expected reply to {}, asked for {}",
                    expected, command
                )))
            }
            None => {
                return Err(DaqError::Configuration(format!(
                    "no outstanding request for {}",
                    command
                )))
            }
        }

        let context = format!("reading {} response", command);
        let mut line = String::new();
        let n = self.read_raw_line(&mut line, &context).await?;
        if n == 0 {
            self.poisoned = true;
            return Err(DaqError::UnexpectedEof { context });
        }
        self.outstanding.remove(0);
        trace!(command = %command, response = %line.trim_end(), "Received instrument response");
        Ok(line)
    }

    async fn read_raw_line(&mut self, line: &mut String, context: &str) -> AppResult<usize> {
        let read = match self.settings.read_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.port.read_line(line)).await
            {
                Ok(result) => result,
                Err(_) => {
                    self.poisoned = true;
                    return Err(DaqError::ReadTimeout {
                        command: context.to_string(),
                        timeout,
                    });
                }
            },
            None => self.port.read_line(line).await,
        };

        read.map_err(|e| {
            self.poisoned = true;
            DaqError::transport(context, e)
        })
    }

    fn ensure_usable(&self) -> AppResult<()> {
        if self.poisoned {
            return Err(DaqError::transport(
                "using instrument channel",
                std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "channel unusable after an earlier transport failure",
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, DuplexStream};

    async fn connected(banner: &str) -> (InstrumentChannel, DuplexStream) {
        let (mut host, device) = tokio::io::duplex(256);
        host.write_all(banner.as_bytes()).await.unwrap();
        let channel = InstrumentChannel::connect(Box::new(device), ChannelSettings::default())
            .await
            .unwrap();
        (channel, host)
    }

    #[tokio::test]
    async fn handshake_drains_three_banner_lines() {
        let (mut channel, mut host) = connected("IV bench\nfw 1.2\nready\n").await;

        host.write_all(b"I 0.25\n").await.unwrap();
        let value = channel.query(Command::ReadCurrent).await.unwrap();
        assert_eq!(value, 0.25);

        let mut buf = vec![0u8; 16];
        let n = host.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"<I1>");
    }

    #[tokio::test]
    async fn handshake_underrun_is_fatal() {
        let (mut host, device) = tokio::io::duplex(64);
        host.write_all(b"IV bench\n").await.unwrap();
        drop(host);

        let err = InstrumentChannel::connect(Box::new(device), ChannelSettings::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            DaqError::HandshakeUnderrun {
                expected: 3,
                received: 1
            }
        ));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn responses_are_consumed_in_command_order() {
        let (mut channel, mut host) = connected("a\nb\nc\n").await;

        channel.send(Command::SetVoltage(0.5)).await.unwrap();
        channel.send(Command::ReadCurrent).await.unwrap();
        channel.send(Command::ReadVoltage).await.unwrap();
        assert_eq!(channel.pending_responses(), 3);

        host.write_all(b"S 0.5\nI 0.002\nV 0.49\n").await.unwrap();
        channel
            .discard_response(Command::SetVoltage(0.5))
            .await
            .unwrap();
        assert_eq!(channel.read_value(Command::ReadCurrent).await.unwrap(), 0.002);
        assert_eq!(channel.read_value(Command::ReadVoltage).await.unwrap(), 0.49);
        assert_eq!(channel.pending_responses(), 0);
    }

    #[tokio::test]
    async fn out_of_order_read_is_rejected() {
        let (mut channel, _host) = connected("a\nb\nc\n").await;
        channel.send(Command::ReadCurrent).await.unwrap();
        assert!(channel.read_value(Command::ReadVoltage).await.is_err());
        assert_eq!(channel.pending_responses(), 1);
    }

    #[tokio::test]
    async fn short_line_is_malformed_and_resync_drains_the_rest() {
        let (mut channel, mut host) = connected("a\nb\nc\n").await;

        channel.send(Command::ReadCurrent).await.unwrap();
        channel.send(Command::ReadVoltage).await.unwrap();
        host.write_all(b"I\nV 1.0\n").await.unwrap();

        let err = channel.read_value(Command::ReadCurrent).await.unwrap_err();
        assert!(err.is_malformed_response());
        assert!(!channel.is_poisoned());
        assert_eq!(channel.pending_responses(), 1);

        channel.resync().await.unwrap();
        assert_eq!(channel.pending_responses(), 0);

        host.write_all(b"I 7\n").await.unwrap();
        assert_eq!(channel.query(Command::ReadCurrent).await.unwrap(), 7.0);
    }

    #[tokio::test]
    async fn eof_mid_response_poisons_the_channel() {
        let (mut channel, host) = connected("a\nb\nc\n").await;
        channel.send(Command::ReadCurrent).await.unwrap();
        drop(host);

        let err = channel.read_value(Command::ReadCurrent).await.unwrap_err();
        assert!(matches!(err, DaqError::UnexpectedEof { .. }));
        assert!(channel.is_poisoned());
        assert!(channel.send(Command::ReadVoltage).await.unwrap_err().is_transport());
    }

    #[tokio::test]
    async fn bounded_read_times_out() {
        let (mut host, device) = tokio::io::duplex(64);
        host.write_all(b"a\nb\nc\n").await.unwrap();
        let settings = ChannelSettings {
            banner_lines: 3,
            read_timeout: Some(Duration::from_millis(20)),
        };
        let mut channel = InstrumentChannel::connect(Box::new(device), settings)
            .await
            .unwrap();

        let err = channel.query(Command::ReadVoltage).await.unwrap_err();
        assert!(matches!(err, DaqError::ReadTimeout { .. }));
        assert!(err.is_transport());
        drop(host);
    }
}
