//! # Modbus Master - RTU Serial and UDP Datagram Transports
//!
//! **License:** MIT
//!
//! A Modbus master engine in pure Rust for industrial field-bus polling:
//! one frame codec, two transport state machines, and a typed device
//! adapter on top.
//!
//! ## Features
//!
//! - **Shared RTU framing**: one codec for both transports, CRC16/Modbus
//! - **RTU serial master**: synchronous exchange with bounded-deadline reads
//! - **UDP datagram master**: concurrent queries with pending-exchange
//!   correlation, rate limiting and communication counters
//! - **Typed adapter**: u16/u32/block register access bound to one slave
//! - **Testable seams**: serial channel and message bus traits
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Master |
//! |------|----------|--------|
//! | 0x03 | Read Holding Registers | ✅ |
//! | 0x04 | Read Input Registers | ✅ |
//! | 0x06 | Write Single Register | ✅ |
//! | 0x10 | Write Multiple Registers | ✅ |
//!
//! Coil function codes are named in the type system but not encoded; slave
//! behavior is out of scope.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modbus_master::{ModbusMaster, ModbusResult, RtuTransport};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let master = RtuTransport::open("/dev/ttyUSB0", 9600)?;
//!
//!     let values = master
//!         .read_holding_registers(1, 0, 10, Duration::from_secs(1))
//!         .await?;
//!     println!("Read registers: {:?}", values);
//!
//!     master
//!         .write_single_register(1, 100, 0x1234, Duration::from_secs(1))
//!         .await?;
//!
//!     master.close().await?;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus protocol constants based on official specification
pub mod constants;

/// Modbus protocol definitions and message handling
pub mod protocol;

/// RTU frame codec: request building, response parsing, CRC16
pub mod frame;

/// Master contract: send_request primitive and derived register operations
pub mod master;

// ============================================================================
// Transports and collaborator seams
// ============================================================================

/// Serial channel abstraction and tokio-serial implementation
pub mod channel;

/// Datagram message bus abstraction and UDP implementation
pub mod bus;

/// RTU transport over a serial channel
pub mod rtu;

/// UDP datagram transport with pending-exchange correlation
pub mod udp;

/// Typed device adapter over any master transport
pub mod adapter;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use modbus_master::tokio) ===
pub use tokio;

// === Core master API ===
pub use master::ModbusMaster;
pub use rtu::RtuTransport;
pub use udp::{CommunicationStatus, UdpTransport};

// === Error handling ===
pub use error::{ModbusError, ModbusResult};

// === Core types ===
pub use protocol::{ExceptionCode, ModbusFunction, ModbusRequest, ModbusResponse, SlaveId};

// === Collaborator seams ===
pub use bus::{InboundHandler, MessageBus, UdpMessageBus};
pub use channel::{SerialChannel, TokioSerialChannel};

// === Typed access ===
pub use adapter::DeviceAdapter;

// === Protocol limits (commonly needed constants) ===
pub use constants::{MAX_READ_REGISTERS, MAX_WRITE_REGISTERS};

/// Default timeout for operations (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("Modbus Master v{} - RTU serial and UDP datagram transports", VERSION)
}
