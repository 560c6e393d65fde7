//! Hardware-backed signal source speaking SCPI over TCP.
//!
//! SCPI (Standard Commands for Programmable Instruments) is the standard
//! command set for oscilloscopes and similar bench instruments; most modern
//! scopes expose it on a raw TCP socket. This source performs a
//! `*CLS`/`*IDN?` handshake on connect, pushes display/trigger settings on
//! configuration changes, and queries one waveform record per acquisition
//! tick.
//!
//! The source fails closed: a missing, empty, or unparseable instrument
//! response yields `SourceUnavailable` for that tick. It never substitutes
//! synthetic samples — simulation is only ever the explicitly configured
//! synthetic source.

use crate::acquisition::AcquisitionConfig;
use crate::core::{SampleBatch, SignalSource};
use crate::error::{AppResult, SigError};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// SCPI instrument source. One TCP connection, line-oriented commands.
pub struct ScpiSource {
    addr: String,
    reader: Option<BufReader<OwnedReadHalf>>,
    writer: Option<OwnedWriteHalf>,
    identity: Option<String>,
}

impl ScpiSource {
    /// Create a source for the instrument at `addr` (e.g. `192.168.1.50:5025`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            reader: None,
            writer: None,
            identity: None,
        }
    }

    /// Identity string reported by `*IDN?`, once connected.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    fn connected(&self) -> bool {
        self.writer.is_some()
    }

    async fn write_line(&mut self, command: &str) -> AppResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SigError::SourceUnavailable("not connected".into()))?;
        timeout(
            IO_TIMEOUT,
            writer.write_all(format!("{command}\n").as_bytes()),
        )
        .await
        .map_err(|_| SigError::SourceUnavailable(format!("write timeout for '{command}'")))??;
        Ok(())
    }

    async fn query(&mut self, command: &str) -> AppResult<String> {
        self.write_line(command).await?;
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| SigError::SourceUnavailable("not connected".into()))?;
        let mut line = String::new();
        let n = timeout(IO_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| SigError::SourceUnavailable(format!("read timeout for '{command}'")))??;
        if n == 0 {
            return Err(SigError::SourceUnavailable(
                "instrument closed the connection".into(),
            ));
        }
        Ok(line.trim().to_string())
    }

    fn parse_waveform(raw: &str) -> AppResult<Vec<f64>> {
        // ASCII encoding: comma-separated voltages, possibly behind an IEEE
        // block header like `#41024<data>` (digit count, then length digits).
        let data = if let Some(rest) = raw.strip_prefix('#') {
            match rest.chars().next().and_then(|c| c.to_digit(10)) {
                Some(ndigits) => rest.get(1 + ndigits as usize..).unwrap_or(""),
                None => {
                    return Err(SigError::SourceUnavailable(
                        "malformed block header in waveform data".into(),
                    ))
                }
            }
        } else {
            raw
        };
        let values: Result<Vec<f64>, _> = data
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<f64>)
            .collect();
        match values {
            Ok(v) if !v.is_empty() => Ok(v),
            Ok(_) => Err(SigError::SourceUnavailable(
                "instrument returned an empty waveform".into(),
            )),
            Err(e) => Err(SigError::SourceUnavailable(format!(
                "malformed waveform data: {e}"
            ))),
        }
    }

    fn drop_connection(&mut self) {
        self.reader = None;
        self.writer = None;
    }
}

#[async_trait]
impl SignalSource for ScpiSource {
    fn name(&self) -> &str {
        "scpi"
    }

    async fn connect(&mut self) -> bool {
        if self.connected() {
            return true;
        }
        let stream = match timeout(IO_TIMEOUT, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(addr = %self.addr, error = %e, "SCPI connect failed");
                return false;
            }
            Err(_) => {
                warn!(addr = %self.addr, "SCPI connect timed out");
                return false;
            }
        };
        let (read_half, write_half) = stream.into_split();
        self.reader = Some(BufReader::new(read_half));
        self.writer = Some(write_half);

        // Clear status, then verify the instrument answers.
        if self.write_line("*CLS").await.is_err() {
            self.drop_connection();
            return false;
        }
        match self.query("*IDN?").await {
            Ok(idn) if !idn.is_empty() => {
                info!(addr = %self.addr, identity = %idn, "SCPI instrument connected");
                self.identity = Some(idn);
                true
            }
            Ok(_) | Err(_) => {
                warn!(addr = %self.addr, "SCPI instrument did not identify");
                self.drop_connection();
                false
            }
        }
    }

    async fn disconnect(&mut self) {
        if self.connected() {
            info!(addr = %self.addr, "SCPI instrument disconnected");
        }
        self.drop_connection();
        self.identity = None;
    }

    async fn acquire(&mut self, config: &AcquisitionConfig) -> AppResult<SampleBatch> {
        if !self.connected() {
            return Err(SigError::SourceUnavailable("not connected".into()));
        }

        let raw = match self.query("WAVeform:DATA?").await {
            Ok(raw) => raw,
            Err(e) => {
                // A dead socket stays dead; force a reconnect next start.
                self.drop_connection();
                return Err(e);
            }
        };
        let amplitudes = Self::parse_waveform(&raw)?;

        let sample_rate = config.sample_rate_hz();
        let time_s: Vec<f64> = (0..amplitudes.len())
            .map(|i| i as f64 / sample_rate)
            .collect();
        Ok(SampleBatch {
            time_s,
            channels: vec![amplitudes],
        })
    }

    async fn apply_config(&mut self, config: &AcquisitionConfig) -> AppResult<()> {
        if !self.connected() {
            return Err(SigError::SourceUnavailable("not connected".into()));
        }
        // Waveform reads come from channel 1 in ASCII; a scope left at a
        // binary transfer default would fail the parser on every tick.
        self.write_line("DATA:SOUrce CHANnel1").await?;
        self.write_line("WAVeform:FORMat ASCii").await?;
        self.write_line(&format!("HORizontal:SCAle {}", config.time_per_div_s()))
            .await?;
        // Four divisions above and below center.
        self.write_line(&format!("CHANnel1:SCAle {}", config.amplitude_v / 4.0))
            .await?;
        self.write_line("TRIGger:A:EDGE:SOUrce CHANnel1").await?;
        self.write_line("TRIGger:A:EDGE:SLOpe POSitive").await?;
        self.write_line("TRIGger:A:LEVel 0.0").await?;
        self.write_line("ACQuire:MODE NORMal").await?;
        Ok(())
    }
}
