//! Master contract: the `send_request` primitive and derived register operations
//!
//! Transports implement only [`ModbusMaster::send_request`]; the typed
//! read/write helpers are provided methods written once against that
//! primitive, so both transports expose identical high-level behavior.

use std::future::Future;
use std::time::Duration;

use crate::constants::MAX_WRITE_REGISTERS;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusFunction, ModbusRequest, ModbusResponse, SlaveId};

/// Modbus master transport contract
///
/// `send_request` takes `&self`: the datagram transport accepts concurrent
/// callers, the serial transport serializes them internally.
pub trait ModbusMaster: Send + Sync {
    /// Perform one request/response exchange
    fn send_request(
        &self,
        request: &ModbusRequest,
        timeout: Duration,
    ) -> impl Future<Output = ModbusResult<ModbusResponse>> + Send;

    /// Read holding registers (FC03)
    fn read_holding_registers(
        &self,
        slave_id: SlaveId,
        address: u16,
        count: u16,
        timeout: Duration,
    ) -> impl Future<Output = ModbusResult<Vec<u16>>> + Send
    where
        Self: Sized,
    {
        async move {
            let request = ModbusRequest::new_read(
                slave_id,
                ModbusFunction::ReadHoldingRegisters,
                address,
                count,
            );
            let response = self.send_request(&request, timeout).await?;
            decode_read_response(&response, count)
        }
    }

    /// Read input registers (FC04)
    fn read_input_registers(
        &self,
        slave_id: SlaveId,
        address: u16,
        count: u16,
        timeout: Duration,
    ) -> impl Future<Output = ModbusResult<Vec<u16>>> + Send
    where
        Self: Sized,
    {
        async move {
            let request = ModbusRequest::new_read(
                slave_id,
                ModbusFunction::ReadInputRegisters,
                address,
                count,
            );
            let response = self.send_request(&request, timeout).await?;
            decode_read_response(&response, count)
        }
    }

    /// Write a single register (FC06)
    fn write_single_register(
        &self,
        slave_id: SlaveId,
        address: u16,
        value: u16,
        timeout: Duration,
    ) -> impl Future<Output = ModbusResult<()>> + Send
    where
        Self: Sized,
    {
        async move {
            let request = ModbusRequest::new_write_single(slave_id, address, value);
            let response = self.send_request(&request, timeout).await?;
            if let Some(err) = response.get_exception() {
                return Err(err);
            }
            Ok(())
        }
    }

    /// Write multiple registers (FC16)
    ///
    /// The value count is validated before any I/O: an empty slice or more
    /// than 123 registers fails with `InvalidArgument` without touching the
    /// transport.
    fn write_multiple_registers(
        &self,
        slave_id: SlaveId,
        address: u16,
        values: &[u16],
        timeout: Duration,
    ) -> impl Future<Output = ModbusResult<()>> + Send
    where
        Self: Sized,
    {
        async move {
            if values.is_empty() || values.len() > MAX_WRITE_REGISTERS {
                return Err(ModbusError::invalid_argument(format!(
                    "register count {} out of range 1-{}",
                    values.len(),
                    MAX_WRITE_REGISTERS
                )));
            }
            let request = ModbusRequest::new_write_multiple(slave_id, address, values.to_vec());
            let response = self.send_request(&request, timeout).await?;
            if let Some(err) = response.get_exception() {
                return Err(err);
            }
            Ok(())
        }
    }
}

fn decode_read_response(response: &ModbusResponse, count: u16) -> ModbusResult<Vec<u16>> {
    if let Some(err) = response.get_exception() {
        return Err(err);
    }
    let expected = count as usize * 2;
    if response.data.len() != expected {
        return Err(ModbusError::invalid_response_size(
            expected,
            response.data.len(),
        ));
    }
    response.registers()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted master: pops canned results and records every request
    struct MockMaster {
        responses: Mutex<Vec<ModbusResult<ModbusResponse>>>,
        requests: Mutex<Vec<ModbusRequest>>,
    }

    impl MockMaster {
        fn new(responses: Vec<ModbusResult<ModbusResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl ModbusMaster for MockMaster {
        async fn send_request(
            &self,
            request: &ModbusRequest,
            _timeout: Duration,
        ) -> ModbusResult<ModbusResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| panic!("no scripted response"))
        }
    }

    #[tokio::test]
    async fn test_read_holding_decodes_registers() {
        let master = MockMaster::new(vec![Ok(ModbusResponse::new_success(
            1,
            ModbusFunction::ReadHoldingRegisters,
            vec![0x00, 0x0A, 0x01, 0x02],
        ))]);
        let regs = master
            .read_holding_registers(1, 0, 2, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(regs, vec![0x000A, 0x0102]);

        let recorded = master.requests.lock().unwrap();
        assert_eq!(recorded[0].function, ModbusFunction::ReadHoldingRegisters);
        assert_eq!(recorded[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_read_size_mismatch() {
        // Response carries 2 bytes but 2 registers (4 bytes) were requested
        let master = MockMaster::new(vec![Ok(ModbusResponse::new_success(
            1,
            ModbusFunction::ReadHoldingRegisters,
            vec![0x00, 0x0A],
        ))]);
        let err = master
            .read_holding_registers(1, 0, 2, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err, ModbusError::invalid_response_size(4, 2));
    }

    #[tokio::test]
    async fn test_read_exception_becomes_error() {
        let master = MockMaster::new(vec![Ok(ModbusResponse::new_exception(
            1,
            ModbusFunction::ReadHoldingRegisters,
            0x02,
        ))]);
        let err = master
            .read_holding_registers(1, 0x1000, 1, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err, ModbusError::exception(0x03, 0x02));
    }

    #[tokio::test]
    async fn test_write_single_exception() {
        let master = MockMaster::new(vec![Ok(ModbusResponse::new_exception(
            1,
            ModbusFunction::WriteSingleRegister,
            0x03,
        ))]);
        let err = master
            .write_single_register(1, 0, 42, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err, ModbusError::exception(0x06, 0x03));
    }

    #[tokio::test]
    async fn test_write_multiple_validates_before_io() {
        let master = MockMaster::new(vec![]);

        let err = master
            .write_multiple_registers(1, 0, &[], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ModbusError::InvalidArgument { .. }));

        let too_many = vec![0u16; 124];
        let err = master
            .write_multiple_registers(1, 0, &too_many, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ModbusError::InvalidArgument { .. }));

        // Neither call reached the transport
        assert_eq!(master.request_count(), 0);
    }

    #[tokio::test]
    async fn test_write_multiple_ok() {
        let master = MockMaster::new(vec![Ok(ModbusResponse::new_success(
            1,
            ModbusFunction::WriteMultipleRegisters,
            Vec::new(),
        ))]);
        master
            .write_multiple_registers(1, 0x10, &[1, 2, 3], Duration::from_millis(100))
            .await
            .unwrap();
        let recorded = master.requests.lock().unwrap();
        assert_eq!(recorded[0].values, vec![1, 2, 3]);
        assert_eq!(recorded[0].quantity, 3);
    }
}
