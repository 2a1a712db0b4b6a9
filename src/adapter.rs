//! Typed device adapter over any master transport
//!
//! Binds a slave id and a default timeout once, then exposes u16/u32 and
//! register-block reads and writes with range validation up front. 32-bit
//! values span two consecutive registers, high word first.

use std::time::Duration;

use crate::constants::{MAX_READ_REGISTERS, MAX_SLAVE_ADDRESS, MIN_SLAVE_ADDRESS};
use crate::error::{ModbusError, ModbusResult};
use crate::master::ModbusMaster;
use crate::protocol::SlaveId;

/// Register-level view of one slave device
pub struct DeviceAdapter<M: ModbusMaster> {
    master: M,
    slave_id: SlaveId,
    timeout: Duration,
}

impl<M: ModbusMaster> DeviceAdapter<M> {
    /// Bind a master to one slave address
    pub fn new(master: M, slave_id: SlaveId, timeout: Duration) -> ModbusResult<Self> {
        if !(MIN_SLAVE_ADDRESS..=MAX_SLAVE_ADDRESS).contains(&slave_id) {
            return Err(ModbusError::invalid_argument(format!(
                "slave address {slave_id} out of range {MIN_SLAVE_ADDRESS}-{MAX_SLAVE_ADDRESS}"
            )));
        }
        Ok(Self {
            master,
            slave_id,
            timeout,
        })
    }

    /// Slave address this adapter is bound to
    pub fn slave_id(&self) -> SlaveId {
        self.slave_id
    }

    /// Replace the default timeout for subsequent operations
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Read one holding register
    pub async fn read_u16(&self, address: u16) -> ModbusResult<u16> {
        let registers = self
            .master
            .read_holding_registers(self.slave_id, address, 1, self.timeout)
            .await?;
        Ok(registers[0])
    }

    /// Read two consecutive holding registers as a u32, high word first
    pub async fn read_u32(&self, address: u16) -> ModbusResult<u32> {
        let registers = self
            .master
            .read_holding_registers(self.slave_id, address, 2, self.timeout)
            .await?;
        Ok(((registers[0] as u32) << 16) | registers[1] as u32)
    }

    /// Read a block of holding registers (1-125)
    pub async fn read_registers(&self, address: u16, count: u16) -> ModbusResult<Vec<u16>> {
        if count == 0 || count as usize > MAX_READ_REGISTERS {
            return Err(ModbusError::invalid_argument(format!(
                "register count {count} out of range 1-{MAX_READ_REGISTERS}"
            )));
        }
        self.master
            .read_holding_registers(self.slave_id, address, count, self.timeout)
            .await
    }

    /// Write one register
    pub async fn write_u16(&self, address: u16, value: u16) -> ModbusResult<()> {
        self.master
            .write_single_register(self.slave_id, address, value, self.timeout)
            .await
    }

    /// Write a u32 across two consecutive registers, high word first
    pub async fn write_u32(&self, address: u16, value: u32) -> ModbusResult<()> {
        let words = [(value >> 16) as u16, value as u16];
        self.master
            .write_multiple_registers(self.slave_id, address, &words, self.timeout)
            .await
    }

    /// Write a block of registers
    pub async fn write_registers(&self, address: u16, values: &[u16]) -> ModbusResult<()> {
        self.master
            .write_multiple_registers(self.slave_id, address, values, self.timeout)
            .await
    }
}
