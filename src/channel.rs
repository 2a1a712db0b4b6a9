//! Serial channel abstraction and tokio-serial implementation
//!
//! The RTU transport drives a [`SerialChannel`] rather than a port directly,
//! which keeps its state machine testable against a scripted channel. The
//! `read` contract is non-blocking: 0 means nothing available right now.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, trace, warn};

use crate::constants::{DEFAULT_BAUD_RATE, SUPPORTED_BAUD_RATES};
use crate::error::{ModbusError, ModbusResult};

/// Byte-stream serial channel
pub trait SerialChannel: Send {
    /// Write bytes, returning how many were accepted
    fn write(&mut self, data: &[u8]) -> impl Future<Output = ModbusResult<usize>> + Send;

    /// Non-blocking read: returns 0 when no data is currently available
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = ModbusResult<usize>> + Send;

    /// Close the channel
    fn close(&mut self) -> impl Future<Output = ModbusResult<()>> + Send;

    /// Whether the channel is currently open
    fn is_open(&self) -> bool;
}

/// Serial channel over a tokio-serial port
pub struct TokioSerialChannel {
    port: Option<SerialStream>,
    path: String,
    baud_rate: u32,
}

impl TokioSerialChannel {
    /// Open a serial port
    ///
    /// Unsupported baud rates fall back to 9600 with a warning. Open failure
    /// is fatal: the caller gets `TransportOpen` and no channel.
    pub fn open(path: &str, baud_rate: u32) -> ModbusResult<Self> {
        let baud_rate = if SUPPORTED_BAUD_RATES.contains(&baud_rate) {
            baud_rate
        } else {
            warn!(
                requested = baud_rate,
                fallback = DEFAULT_BAUD_RATE,
                "unsupported baud rate, falling back"
            );
            DEFAULT_BAUD_RATE
        };

        let port = tokio_serial::new(path, baud_rate)
            .timeout(Duration::from_millis(10))
            .open_native_async()
            .map_err(|e| ModbusError::transport_open(format!("open {path}: {e}")))?;

        debug!(path, baud_rate, "serial port opened");
        Ok(Self {
            port: Some(port),
            path: path.to_string(),
            baud_rate,
        })
    }

    /// Path this channel was opened on
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Effective baud rate after any fallback
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl SerialChannel for TokioSerialChannel {
    async fn write(&mut self, data: &[u8]) -> ModbusResult<usize> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| ModbusError::write("serial port closed"))?;
        port.write_all(data)
            .await
            .map_err(|e| ModbusError::write(format!("serial write: {e}")))?;
        trace!(bytes = data.len(), "serial write");
        Ok(data.len())
    }

    async fn read(&mut self, buf: &mut [u8]) -> ModbusResult<usize> {
        let port = match self.port.as_mut() {
            Some(port) => port,
            None => return Ok(0),
        };
        // Poll with a 1ms window so callers see the non-blocking contract:
        // nothing buffered reads as 0 bytes.
        match tokio::time::timeout(Duration::from_millis(1), port.read(buf)).await {
            Ok(Ok(n)) => {
                if n > 0 {
                    trace!(bytes = n, "serial read");
                }
                Ok(n)
            }
            Ok(Err(e)) => {
                trace!(error = %e, "serial read error, treating as no data");
                Ok(0)
            }
            Err(_) => Ok(0),
        }
    }

    async fn close(&mut self) -> ModbusResult<()> {
        if self.port.take().is_some() {
            debug!(path = %self.path, "serial port closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}
