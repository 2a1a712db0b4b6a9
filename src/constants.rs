//! Modbus protocol constants based on official specification
//!
//! Frame limits are inherited from the RS485 ADU limit of 256 bytes; register
//! limits are calculated to fit within that constraint.

use std::time::Duration;

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Maximum RTU ADU size per Modbus specification
/// Format: Slave Address (1) + PDU (up to 253) + CRC (2) = 256 bytes
pub const MAX_FRAME_SIZE: usize = 256;

/// Minimum parseable frame: address + function + CRC
pub const MIN_FRAME_SIZE: usize = 4;

/// Exception frame length: address + function + error code + CRC
pub const EXCEPTION_FRAME_LEN: usize = 5;

/// Write acknowledgement frame length: address + function + echoed
/// address/value or address/quantity + CRC
pub const WRITE_RESPONSE_FRAME_LEN: usize = 8;

/// Read response overhead: address + function + byte count + CRC
pub const READ_RESPONSE_OVERHEAD: usize = 5;

/// Buffer size for receiving frames (theoretical max 256, margin for bus
/// payloads that carry trailing padding)
pub const RESPONSE_BUFFER_SIZE: usize = 512;

// ============================================================================
// Register Operation Limits
// ============================================================================

/// Maximum number of registers for FC03/FC04 (Read Holding/Input Registers)
///
/// Response PDU: 1 (FC) + 1 (byte count) + N × 2 ≤ 253 → N ≤ 125
pub const MAX_READ_REGISTERS: usize = 125;

/// Maximum number of registers for FC16 (Write Multiple Registers)
///
/// Request PDU: 1 (FC) + 2 (address) + 2 (quantity) + 1 (byte count)
/// + N × 2 ≤ 253 → N ≤ 123
pub const MAX_WRITE_REGISTERS: usize = 123;

/// Valid slave address range for a master request
pub const MIN_SLAVE_ADDRESS: u8 = 1;
pub const MAX_SLAVE_ADDRESS: u8 = 247;

// ============================================================================
// Timing
// ============================================================================

/// Spacing between non-blocking read attempts during the RTU receive phase
pub const RTU_READ_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default minimum interval between datagram queries (device protection)
pub const DEFAULT_MIN_POLLING_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Serial Line
// ============================================================================

/// Baud rates the serial channel accepts; anything else falls back to
/// [`DEFAULT_BAUD_RATE`]
pub const SUPPORTED_BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

/// Fallback baud rate for unsupported requests
pub const DEFAULT_BAUD_RATE: u32 = 9600;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Exception flag bit in a response function code
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Server Device Failure
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;

/// Acknowledge
pub const EXCEPTION_ACKNOWLEDGE: u8 = 0x05;

/// Server Device Busy
pub const EXCEPTION_SERVER_DEVICE_BUSY: u8 = 0x06;

/// Memory Parity Error
pub const EXCEPTION_MEMORY_PARITY_ERROR: u8 = 0x08;

/// Gateway Path Unavailable
pub const EXCEPTION_GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;

/// Gateway Target Device Failed to Respond
pub const EXCEPTION_GATEWAY_TARGET_FAILED: u8 = 0x0B;
