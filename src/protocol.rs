//! Modbus protocol definitions: function codes, requests, responses
//!
//! Requests are immutable values constructed per call. Responses carry the
//! echoed function code, the raw data bytes (empty for exceptions and write
//! acknowledgements) and the exception code if the slave flagged one.

use crate::constants::*;
use crate::error::{ModbusError, ModbusResult};

/// Modbus slave/unit identifier (1-247)
pub type SlaveId = u8;

/// Modbus function codes
///
/// The full set is enumerated for completeness; the codec only encodes and
/// decodes the four register-oriented codes. Coil-oriented codes fail with
/// `UnsupportedFunction` when used in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModbusFunction {
    /// Read Coils (0x01)
    ReadCoils,
    /// Read Discrete Inputs (0x02)
    ReadDiscreteInputs,
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters,
    /// Read Input Registers (0x04)
    ReadInputRegisters,
    /// Write Single Coil (0x05)
    WriteSingleCoil,
    /// Write Single Register (0x06)
    WriteSingleRegister,
    /// Write Multiple Coils (0x0F)
    WriteMultipleCoils,
    /// Write Multiple Registers (0x10)
    WriteMultipleRegisters,
}

impl ModbusFunction {
    /// Get the raw function code byte
    pub fn to_u8(self) -> u8 {
        match self {
            ModbusFunction::ReadCoils => FC_READ_COILS,
            ModbusFunction::ReadDiscreteInputs => FC_READ_DISCRETE_INPUTS,
            ModbusFunction::ReadHoldingRegisters => FC_READ_HOLDING_REGISTERS,
            ModbusFunction::ReadInputRegisters => FC_READ_INPUT_REGISTERS,
            ModbusFunction::WriteSingleCoil => FC_WRITE_SINGLE_COIL,
            ModbusFunction::WriteSingleRegister => FC_WRITE_SINGLE_REGISTER,
            ModbusFunction::WriteMultipleCoils => FC_WRITE_MULTIPLE_COILS,
            ModbusFunction::WriteMultipleRegisters => FC_WRITE_MULTIPLE_REGISTERS,
        }
    }

    /// Parse a raw function code byte
    pub fn try_from_u8(code: u8) -> Option<Self> {
        match code {
            FC_READ_COILS => Some(ModbusFunction::ReadCoils),
            FC_READ_DISCRETE_INPUTS => Some(ModbusFunction::ReadDiscreteInputs),
            FC_READ_HOLDING_REGISTERS => Some(ModbusFunction::ReadHoldingRegisters),
            FC_READ_INPUT_REGISTERS => Some(ModbusFunction::ReadInputRegisters),
            FC_WRITE_SINGLE_COIL => Some(ModbusFunction::WriteSingleCoil),
            FC_WRITE_SINGLE_REGISTER => Some(ModbusFunction::WriteSingleRegister),
            FC_WRITE_MULTIPLE_COILS => Some(ModbusFunction::WriteMultipleCoils),
            FC_WRITE_MULTIPLE_REGISTERS => Some(ModbusFunction::WriteMultipleRegisters),
            _ => None,
        }
    }

    /// Whether the frame codec can encode requests for this function
    pub fn is_codable(self) -> bool {
        matches!(
            self,
            ModbusFunction::ReadHoldingRegisters
                | ModbusFunction::ReadInputRegisters
                | ModbusFunction::WriteSingleRegister
                | ModbusFunction::WriteMultipleRegisters
        )
    }

    /// Whether this is one of the two register read functions
    pub fn is_read(self) -> bool {
        matches!(
            self,
            ModbusFunction::ReadHoldingRegisters | ModbusFunction::ReadInputRegisters
        )
    }

    /// Human-readable description
    pub fn description(self) -> &'static str {
        match self {
            ModbusFunction::ReadCoils => "Read Coils",
            ModbusFunction::ReadDiscreteInputs => "Read Discrete Inputs",
            ModbusFunction::ReadHoldingRegisters => "Read Holding Registers",
            ModbusFunction::ReadInputRegisters => "Read Input Registers",
            ModbusFunction::WriteSingleCoil => "Write Single Coil",
            ModbusFunction::WriteSingleRegister => "Write Single Register",
            ModbusFunction::WriteMultipleCoils => "Write Multiple Coils",
            ModbusFunction::WriteMultipleRegisters => "Write Multiple Registers",
        }
    }
}

/// Modbus exception codes carried by an exception response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetDeviceFailed,
    /// Code outside the standard set, preserved verbatim
    Other(u8),
}

impl ExceptionCode {
    /// Parse a raw exception code byte
    pub fn from_u8(code: u8) -> Self {
        match code {
            EXCEPTION_ILLEGAL_FUNCTION => ExceptionCode::IllegalFunction,
            EXCEPTION_ILLEGAL_DATA_ADDRESS => ExceptionCode::IllegalDataAddress,
            EXCEPTION_ILLEGAL_DATA_VALUE => ExceptionCode::IllegalDataValue,
            EXCEPTION_SERVER_DEVICE_FAILURE => ExceptionCode::ServerDeviceFailure,
            EXCEPTION_ACKNOWLEDGE => ExceptionCode::Acknowledge,
            EXCEPTION_SERVER_DEVICE_BUSY => ExceptionCode::ServerDeviceBusy,
            EXCEPTION_MEMORY_PARITY_ERROR => ExceptionCode::MemoryParityError,
            EXCEPTION_GATEWAY_PATH_UNAVAILABLE => ExceptionCode::GatewayPathUnavailable,
            EXCEPTION_GATEWAY_TARGET_FAILED => ExceptionCode::GatewayTargetDeviceFailed,
            other => ExceptionCode::Other(other),
        }
    }

    /// Get the raw exception code byte
    pub fn to_u8(self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => EXCEPTION_ILLEGAL_FUNCTION,
            ExceptionCode::IllegalDataAddress => EXCEPTION_ILLEGAL_DATA_ADDRESS,
            ExceptionCode::IllegalDataValue => EXCEPTION_ILLEGAL_DATA_VALUE,
            ExceptionCode::ServerDeviceFailure => EXCEPTION_SERVER_DEVICE_FAILURE,
            ExceptionCode::Acknowledge => EXCEPTION_ACKNOWLEDGE,
            ExceptionCode::ServerDeviceBusy => EXCEPTION_SERVER_DEVICE_BUSY,
            ExceptionCode::MemoryParityError => EXCEPTION_MEMORY_PARITY_ERROR,
            ExceptionCode::GatewayPathUnavailable => EXCEPTION_GATEWAY_PATH_UNAVAILABLE,
            ExceptionCode::GatewayTargetDeviceFailed => EXCEPTION_GATEWAY_TARGET_FAILED,
            ExceptionCode::Other(code) => code,
        }
    }
}

/// Modbus request, constructed once per call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusRequest {
    /// Slave/unit address (1-247)
    pub slave_id: SlaveId,
    /// Function code
    pub function: ModbusFunction,
    /// Starting register address
    pub address: u16,
    /// Register count (reads and multi-writes)
    pub quantity: u16,
    /// Register values (write operations only)
    pub values: Vec<u16>,
}

impl ModbusRequest {
    /// Create a read request (FC03/FC04)
    pub fn new_read(
        slave_id: SlaveId,
        function: ModbusFunction,
        address: u16,
        quantity: u16,
    ) -> Self {
        Self {
            slave_id,
            function,
            address,
            quantity,
            values: Vec::new(),
        }
    }

    /// Create a write single register request (FC06)
    pub fn new_write_single(slave_id: SlaveId, address: u16, value: u16) -> Self {
        Self {
            slave_id,
            function: ModbusFunction::WriteSingleRegister,
            address,
            quantity: 1,
            values: vec![value],
        }
    }

    /// Create a write multiple registers request (FC16)
    pub fn new_write_multiple(slave_id: SlaveId, address: u16, values: Vec<u16>) -> Self {
        Self {
            slave_id,
            function: ModbusFunction::WriteMultipleRegisters,
            address,
            quantity: values.len() as u16,
            values,
        }
    }
}

/// Modbus response as decoded from a wire frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusResponse {
    /// Echoed slave/unit address
    pub slave_id: SlaveId,
    /// Function code (exception flag already stripped)
    pub function: ModbusFunction,
    /// Raw data bytes; empty for exceptions and write acknowledgements
    pub data: Vec<u8>,
    /// Exception code if the slave flagged one
    pub exception: Option<ExceptionCode>,
}

impl ModbusResponse {
    /// Create a successful response
    pub fn new_success(slave_id: SlaveId, function: ModbusFunction, data: Vec<u8>) -> Self {
        Self {
            slave_id,
            function,
            data,
            exception: None,
        }
    }

    /// Create an exception response
    pub fn new_exception(slave_id: SlaveId, function: ModbusFunction, code: u8) -> Self {
        Self {
            slave_id,
            function,
            data: Vec::new(),
            exception: Some(ExceptionCode::from_u8(code)),
        }
    }

    /// Whether the slave flagged an exception
    pub fn is_exception(&self) -> bool {
        self.exception.is_some()
    }

    /// Convert a flagged exception into a [`ModbusError`], if any
    pub fn get_exception(&self) -> Option<ModbusError> {
        self.exception
            .map(|code| ModbusError::exception(self.function.to_u8(), code.to_u8()))
    }

    /// Decode the data bytes as big-endian 16-bit registers
    ///
    /// Fails with `InvalidResponseSize` if the data length is odd.
    pub fn registers(&self) -> ModbusResult<Vec<u16>> {
        if self.data.len() % 2 != 0 {
            return Err(ModbusError::invalid_response_size(
                self.data.len() + 1,
                self.data.len(),
            ));
        }
        Ok(self
            .data
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }
}
