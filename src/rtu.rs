//! RTU transport: synchronous request/response over a serial channel
//!
//! One exchange owns the channel end to end: a single async mutex spans
//! drain, write and the whole receive phase, so concurrent callers serialize
//! cleanly and response bytes can never interleave between exchanges.
//!
//! The receive phase polls the non-blocking channel with a fixed spacing and
//! a deadline computed once at call entry, mirroring the byte-at-a-time
//! pacing of a real RS485 line.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::channel::{SerialChannel, TokioSerialChannel};
use crate::constants::{
    EXCEPTION_FLAG, MAX_FRAME_SIZE, RESPONSE_BUFFER_SIZE, RTU_READ_POLL_INTERVAL,
    WRITE_RESPONSE_FRAME_LEN,
};
use crate::error::{ModbusError, ModbusResult};
use crate::frame;
use crate::master::ModbusMaster;
use crate::protocol::{ModbusRequest, ModbusResponse};

/// Modbus RTU master over a serial channel
pub struct RtuTransport<C: SerialChannel> {
    channel: Mutex<C>,
}

impl RtuTransport<TokioSerialChannel> {
    /// Open a serial port and wrap it in an RTU transport
    pub fn open(path: &str, baud_rate: u32) -> ModbusResult<Self> {
        Ok(Self::with_channel(TokioSerialChannel::open(
            path, baud_rate,
        )?))
    }
}

impl<C: SerialChannel> RtuTransport<C> {
    /// Build a transport over an already-open channel
    pub fn with_channel(channel: C) -> Self {
        Self {
            channel: Mutex::new(channel),
        }
    }

    /// Close the underlying channel
    pub async fn close(&self) -> ModbusResult<()> {
        self.channel.lock().await.close().await
    }

    /// Discard any bytes buffered on the line before a new exchange
    ///
    /// Noise from a previous aborted exchange or bus chatter would otherwise
    /// be parsed as the head of our response.
    async fn drain_input(channel: &mut C) -> ModbusResult<()> {
        let mut scratch = [0u8; RESPONSE_BUFFER_SIZE];
        let mut discarded = 0usize;
        loop {
            let n = channel.read(&mut scratch).await?;
            if n == 0 {
                break;
            }
            discarded += n;
        }
        if discarded > 0 {
            warn!(bytes = discarded, "discarded stale bytes before request");
        }
        Ok(())
    }

    /// Accumulate exactly `want` bytes into `buf[filled..]` before `deadline`
    async fn read_exact_deadline(
        channel: &mut C,
        buf: &mut [u8],
        filled: &mut usize,
        want: usize,
        deadline: Instant,
        timeout: Duration,
    ) -> ModbusResult<()> {
        let target = *filled + want;
        while *filled < target {
            let n = channel.read(&mut buf[*filled..target]).await?;
            if n > 0 {
                *filled += n;
                continue;
            }
            if Instant::now() >= deadline {
                return Err(ModbusError::timeout(
                    "rtu response",
                    timeout.as_millis() as u64,
                ));
            }
            tokio::time::sleep(RTU_READ_POLL_INTERVAL).await;
        }
        Ok(())
    }
}

impl<C: SerialChannel> ModbusMaster for RtuTransport<C> {
    async fn send_request(
        &self,
        request: &ModbusRequest,
        timeout: Duration,
    ) -> ModbusResult<ModbusResponse> {
        let request_frame = frame::build_request(request)?;
        let deadline = Instant::now() + timeout;

        let mut channel = self.channel.lock().await;

        Self::drain_input(&mut channel).await?;

        let written = channel.write(&request_frame).await?;
        if written != request_frame.len() {
            return Err(ModbusError::write(format!(
                "short serial write: {written} of {} bytes",
                request_frame.len()
            )));
        }
        trace!(
            slave = request.slave_id,
            bytes = written,
            "rtu request written"
        );

        let mut buf = [0u8; MAX_FRAME_SIZE];
        let mut filled = 0usize;

        // Address + function code tell us the shape of the rest.
        Self::read_exact_deadline(&mut channel, &mut buf, &mut filled, 2, deadline, timeout)
            .await?;
        let function_code = buf[1];

        if function_code & EXCEPTION_FLAG != 0 {
            // Exception code byte, then the CRC trailer.
            Self::read_exact_deadline(&mut channel, &mut buf, &mut filled, 3, deadline, timeout)
                .await?;
        } else if frame::expected_frame_length(function_code, 0)
            == Some(WRITE_RESPONSE_FRAME_LEN)
        {
            Self::read_exact_deadline(&mut channel, &mut buf, &mut filled, 6, deadline, timeout)
                .await?;
        } else {
            // Read response: the byte-count field sizes the remainder.
            Self::read_exact_deadline(&mut channel, &mut buf, &mut filled, 1, deadline, timeout)
                .await?;
            let total = frame::expected_frame_length(function_code, buf[2])
                .ok_or_else(|| ModbusError::unsupported_in_response(function_code))?;
            let remaining = total - filled;
            Self::read_exact_deadline(
                &mut channel,
                &mut buf,
                &mut filled,
                remaining,
                deadline,
                timeout,
            )
            .await?;
        }

        drop(channel);

        debug!(
            slave = request.slave_id,
            function = function_code,
            len = filled,
            "rtu response assembled"
        );
        frame::parse_response(&buf[..filled])
    }
}
