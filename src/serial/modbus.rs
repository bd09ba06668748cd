//! Ordinary Modbus register access over the RPC serial port.
//!
//! The scanner only speaks the extended broadcast protocol; this module
//! addresses one device directly and reads its holding registers, including
//! the string registers devices pad with `0x00`/`0xFF` filler.

use crate::error::{RpcError, RpcResult};
use crate::serial::SerialRpcPort;
use crate::serial::frame;

/// Read-holding-registers function code.
const READ_HOLDING_REGISTERS: u8 = 0x03;

pub struct ModbusDevice {
    addr: u8,
    port: SerialRpcPort,
}

impl ModbusDevice {
    pub fn new(addr: u8, port: SerialRpcPort) -> Self {
        Self { addr, port }
    }

    fn read_request(&self, first_reg: u16, reg_count: u16) -> Vec<u8> {
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&first_reg.to_be_bytes());
        payload.extend_from_slice(&reg_count.to_be_bytes());
        frame::embed(self.addr, READ_HOLDING_REGISTERS, &payload)
    }

    /// RTU read response: address, function, byte count, data, CRC.
    fn predicted_response_size(reg_count: u16) -> usize {
        5 + 2 * usize::from(reg_count)
    }

    /// Read `reg_count` holding registers starting at `first_reg`, returning
    /// the raw register bytes.
    pub async fn read_registers(&self, first_reg: u16, reg_count: u16) -> RpcResult<Vec<u8>> {
        let request = self.read_request(first_reg, reg_count);
        let raw = self
            .port
            .transfer(&request, Self::predicted_response_size(reg_count))
            .await?;
        let payload = frame::extract(&raw, self.addr, READ_HOLDING_REGISTERS)?;

        let expected = 2 * usize::from(reg_count);
        match payload.split_first() {
            Some((&count, data)) if usize::from(count) == expected && data.len() == expected => {
                Ok(data.to_vec())
            }
            _ => Err(RpcError::invalid_response(format!(
                "bad register read payload: {}",
                hex::encode_upper(&payload)
            ))),
        }
    }

    /// Read a string stored across `reg_count` registers. Filler bytes are
    /// stripped before decoding, and surrounding whitespace is trimmed.
    pub async fn read_string(&self, first_reg: u16, reg_count: u16) -> RpcResult<String> {
        let data = self.read_registers(first_reg, reg_count).await?;
        Ok(clean_register_string(&data))
    }
}

/// Devices pad string registers with `0x00` and `0xFF`; only the remaining
/// bytes carry text.
fn clean_register_string(data: &[u8]) -> String {
    let meaningful: Vec<u8> = data
        .iter()
        .copied()
        .filter(|&b| b != 0x00 && b != 0xFF)
        .collect();
    String::from_utf8_lossy(&meaningful).trim().to_owned()
}
