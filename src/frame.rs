//! RTU frame codec: request building, response parsing, CRC16
//!
//! Wire format: `[slave][function][payload][crc_lo][crc_hi]`. The CRC is
//! CRC16/Modbus (polynomial 0xA001 reflected, initial 0xFFFF) computed over
//! every preceding byte and appended low byte first. Both transports share
//! this codec; the frame layout is identical on serial and datagram paths.

use crc::{Crc, CRC_16_MODBUS};
use tracing::debug;

use crate::constants::*;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusFunction, ModbusRequest, ModbusResponse};

const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the CRC16/Modbus checksum of a byte slice
pub fn crc16(data: &[u8]) -> u16 {
    CRC_MODBUS.checksum(data)
}

/// Append the CRC to a frame, low byte first
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16(frame);
    frame.push((crc & 0xFF) as u8);
    frame.push((crc >> 8) as u8);
}

/// Verify the trailing CRC of a complete frame
///
/// Frames shorter than [`MIN_FRAME_SIZE`] never verify.
pub fn verify_crc(frame: &[u8]) -> bool {
    if frame.len() < MIN_FRAME_SIZE {
        return false;
    }
    let (body, trailer) = frame.split_at(frame.len() - 2);
    let received = u16::from_le_bytes([trailer[0], trailer[1]]);
    crc16(body) == received
}

/// Encode a request into a complete wire frame
///
/// Only the four register-oriented function codes are codable; anything else
/// fails with `UnsupportedFunction`. Identical requests produce identical
/// frames.
pub fn build_request(request: &ModbusRequest) -> ModbusResult<Vec<u8>> {
    let mut frame = Vec::with_capacity(MAX_FRAME_SIZE);
    frame.push(request.slave_id);
    frame.push(request.function.to_u8());

    match request.function {
        ModbusFunction::ReadHoldingRegisters | ModbusFunction::ReadInputRegisters => {
            frame.extend_from_slice(&request.address.to_be_bytes());
            frame.extend_from_slice(&request.quantity.to_be_bytes());
        }
        ModbusFunction::WriteSingleRegister => {
            let value = request
                .values
                .first()
                .copied()
                .ok_or_else(|| ModbusError::invalid_argument("write single needs one value"))?;
            frame.extend_from_slice(&request.address.to_be_bytes());
            frame.extend_from_slice(&value.to_be_bytes());
        }
        ModbusFunction::WriteMultipleRegisters => {
            frame.extend_from_slice(&request.address.to_be_bytes());
            frame.extend_from_slice(&request.quantity.to_be_bytes());
            frame.push((request.values.len() * 2) as u8);
            for value in &request.values {
                frame.extend_from_slice(&value.to_be_bytes());
            }
        }
        other => return Err(ModbusError::unsupported_function(other.to_u8())),
    }

    append_crc(&mut frame);
    debug!(
        slave = request.slave_id,
        function = request.function.to_u8(),
        len = frame.len(),
        "built request frame"
    );
    Ok(frame)
}

/// Expected total frame length given a response function code
///
/// `byte_count` is the third frame byte; it only matters for read responses.
/// Returns `None` for function codes the codec cannot decode.
pub fn expected_frame_length(function_code: u8, byte_count: u8) -> Option<usize> {
    if function_code & EXCEPTION_FLAG != 0 {
        return Some(EXCEPTION_FRAME_LEN);
    }
    match function_code {
        FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => {
            Some(READ_RESPONSE_OVERHEAD + byte_count as usize)
        }
        FC_WRITE_SINGLE_REGISTER | FC_WRITE_MULTIPLE_REGISTERS => Some(WRITE_RESPONSE_FRAME_LEN),
        _ => None,
    }
}

/// Decode a complete wire frame into a response
///
/// The CRC is checked before anything else; a bad checksum means no other
/// field can be trusted, so parsing stops there. Exception frames must be
/// exactly 5 bytes, write acknowledgements exactly 8, read responses exactly
/// `5 + byte_count`. The data of a read response is the `byte_count` bytes
/// immediately after the byte-count field.
pub fn parse_response(frame: &[u8]) -> ModbusResult<ModbusResponse> {
    if frame.len() < MIN_FRAME_SIZE {
        return Err(ModbusError::invalid_response_size(
            MIN_FRAME_SIZE,
            frame.len(),
        ));
    }

    if !verify_crc(frame) {
        let expected = crc16(&frame[..frame.len() - 2]);
        let actual = u16::from_le_bytes([frame[frame.len() - 2], frame[frame.len() - 1]]);
        return Err(ModbusError::crc_mismatch(expected, actual));
    }

    let slave_id = frame[0];
    let function_code = frame[1];

    if function_code & EXCEPTION_FLAG != 0 {
        if frame.len() != EXCEPTION_FRAME_LEN {
            return Err(ModbusError::invalid_response_size(
                EXCEPTION_FRAME_LEN,
                frame.len(),
            ));
        }
        let base_code = function_code & !EXCEPTION_FLAG;
        let function = ModbusFunction::try_from_u8(base_code)
            .ok_or_else(|| ModbusError::unsupported_in_response(function_code))?;
        debug!(
            slave = slave_id,
            function = base_code,
            exception = frame[2],
            "parsed exception response"
        );
        return Ok(ModbusResponse::new_exception(slave_id, function, frame[2]));
    }

    match function_code {
        FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => {
            let byte_count = frame[2] as usize;
            let expected = READ_RESPONSE_OVERHEAD + byte_count;
            if frame.len() != expected {
                return Err(ModbusError::invalid_response_size(expected, frame.len()));
            }
            let function = ModbusFunction::try_from_u8(function_code)
                .ok_or_else(|| ModbusError::unsupported_in_response(function_code))?;
            let data = frame[3..3 + byte_count].to_vec();
            Ok(ModbusResponse::new_success(slave_id, function, data))
        }
        FC_WRITE_SINGLE_REGISTER | FC_WRITE_MULTIPLE_REGISTERS => {
            if frame.len() != WRITE_RESPONSE_FRAME_LEN {
                return Err(ModbusError::invalid_response_size(
                    WRITE_RESPONSE_FRAME_LEN,
                    frame.len(),
                ));
            }
            let function = ModbusFunction::try_from_u8(function_code)
                .ok_or_else(|| ModbusError::unsupported_in_response(function_code))?;
            Ok(ModbusResponse::new_success(slave_id, function, Vec::new()))
        }
        other => Err(ModbusError::unsupported_in_response(other)),
    }
}
