//! Core error types and result handling
//!
//! Every failure a master operation can surface is a [`ModbusError`] variant.
//! Errors propagate synchronously to the caller of `send_request` or a
//! derived helper; the datagram receive path filters bad input silently and
//! never constructs one of these.

use thiserror::Error;

/// Result type alias for Modbus operations
pub type ModbusResult<T> = std::result::Result<T, ModbusError>;

/// Modbus master error taxonomy
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModbusError {
    /// Channel open or bus subscription failed at construction time (fatal)
    #[error("Transport open error: {message}")]
    TransportOpen { message: String },

    /// Transport failed to push the full frame
    #[error("Write error: {message}")]
    Write { message: String },

    /// No complete valid frame within the deadline
    #[error("Response timeout: {operation} ({timeout_ms}ms)")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Frame checksum invalid
    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// Function code the codec cannot encode
    #[error("Unsupported function code: 0x{code:02X}")]
    UnsupportedFunction { code: u8 },

    /// Function code seen in a response the codec cannot decode
    #[error("Unsupported function code in response: 0x{code:02X}")]
    UnsupportedFunctionInResponse { code: u8 },

    /// Decoded data length inconsistent with what was requested
    #[error("Invalid response size: expected {expected} bytes, got {actual}")]
    InvalidResponseSize { expected: usize, actual: usize },

    /// Slave returned a Modbus exception response
    #[error("Modbus exception: function 0x{function:02X}, code 0x{code:02X}")]
    Exception { function: u8, code: u8 },

    /// Register count or value-array length out of protocol-legal bounds
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl ModbusError {
    /// Create a transport open error
    pub fn transport_open(message: impl Into<String>) -> Self {
        ModbusError::TransportOpen {
            message: message.into(),
        }
    }

    /// Create a write error
    pub fn write(message: impl Into<String>) -> Self {
        ModbusError::Write {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        ModbusError::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a CRC mismatch error
    pub fn crc_mismatch(expected: u16, actual: u16) -> Self {
        ModbusError::CrcMismatch { expected, actual }
    }

    /// Create an unsupported function code error
    pub fn unsupported_function(code: u8) -> Self {
        ModbusError::UnsupportedFunction { code }
    }

    /// Create an unsupported response function code error
    pub fn unsupported_in_response(code: u8) -> Self {
        ModbusError::UnsupportedFunctionInResponse { code }
    }

    /// Create an invalid response size error
    pub fn invalid_response_size(expected: usize, actual: usize) -> Self {
        ModbusError::InvalidResponseSize { expected, actual }
    }

    /// Create a Modbus exception error
    pub fn exception(function: u8, code: u8) -> Self {
        ModbusError::Exception { function, code }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ModbusError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Whether this error represents a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, ModbusError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModbusError::crc_mismatch(0xC40B, 0xC40C);
        assert_eq!(
            err.to_string(),
            "CRC mismatch: expected 0xC40B, got 0xC40C"
        );

        let err = ModbusError::timeout("read response", 1000);
        assert_eq!(err.to_string(), "Response timeout: read response (1000ms)");

        let err = ModbusError::exception(0x03, 0x02);
        assert_eq!(
            err.to_string(),
            "Modbus exception: function 0x03, code 0x02"
        );
    }

    #[test]
    fn test_is_timeout() {
        assert!(ModbusError::timeout("x", 1).is_timeout());
        assert!(!ModbusError::write("x").is_timeout());
    }
}
