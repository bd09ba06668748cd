//! Extended-Modbus bus scanner.
//!
//! Devices supporting the extended scan protocol answer on the broadcast
//! address with their serial number and slave id, one device per `scan`
//! command, until the bus reports the end of the scan.

use crate::error::{RpcError, RpcResult};
use crate::serial::SerialRpcPort;
use crate::serial::frame;

/// Broadcast address every extended-scan capable device listens on.
pub const SCAN_ADDR: u8 = 0xFD;
/// Extended-scan function code.
pub const SCAN_FN: u8 = 0x60;

/// Replies can carry up to a whole bus worth of noise before the frame.
const SCAN_RESPONSE_SIZE: usize = 1000;

/// Extended-scan sub-commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScanCommand {
    Init = 0x01,
    Scan = 0x02,
    Reply = 0x03,
    End = 0x04,
}

/// One device discovered on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSeen {
    pub slave_id: u8,
    pub serial_number: u32,
}

pub struct BusScanner {
    port: SerialRpcPort,
}

impl BusScanner {
    pub fn new(port: SerialRpcPort) -> Self {
        Self { port }
    }

    fn build_request(command: ScanCommand) -> Vec<u8> {
        frame::embed(SCAN_ADDR, SCAN_FN, &[command as u8])
    }

    async fn communicate(&self, request: &[u8]) -> RpcResult<Vec<u8>> {
        let raw = self.port.transfer(request, SCAN_RESPONSE_SIZE).await?;
        Ok(frame::trim_gateway_noise(&raw).to_vec())
    }

    /// Broadcast the scan-init command. Devices do not answer it, so a
    /// silent bus is the expected outcome.
    pub async fn init_scan(&self) -> RpcResult<()> {
        log::debug!(target: "busbridge::scanner", "init bus scan");
        match self.communicate(&Self::build_request(ScanCommand::Init)).await {
            Ok(_) | Err(RpcError::NoResponse) | Err(RpcError::InvalidResponse { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Ask the next unanswered device to identify itself. `None` once the
    /// bus reports the scan is over.
    pub async fn next_device(&self) -> RpcResult<Option<DeviceSeen>> {
        let raw = self.communicate(&Self::build_request(ScanCommand::Scan)).await?;
        let payload = frame::extract(&raw, SCAN_ADDR, SCAN_FN)?;

        match payload.first().copied() {
            Some(code) if code == ScanCommand::Reply as u8 => {
                let device = Self::parse_device_data(&payload[1..])?;
                log::debug!(
                    target: "busbridge::scanner",
                    "scanned: slave {} sn {}",
                    device.slave_id,
                    device.serial_number
                );
                Ok(Some(device))
            }
            Some(code) if code == ScanCommand::End as u8 => {
                log::debug!(target: "busbridge::scanner", "scan finished");
                Ok(None)
            }
            _ => Err(RpcError::invalid_response(format!(
                "scan payload {} should begin with reply or end",
                hex::encode_upper(&payload)
            ))),
        }
    }

    /// Scan one port configuration end to end.
    pub async fn scan_bus(&self) -> RpcResult<Vec<DeviceSeen>> {
        self.init_scan().await?;
        let mut devices = Vec::new();
        while let Some(device) = self.next_device().await? {
            devices.push(device);
        }
        Ok(devices)
    }

    /// Device data is a big-endian u32 serial number followed by the slave id.
    fn parse_device_data(data: &[u8]) -> RpcResult<DeviceSeen> {
        if data.len() < 5 {
            return Err(RpcError::invalid_response(format!(
                "device data too short: {} bytes",
                data.len()
            )));
        }
        Ok(DeviceSeen {
            slave_id: data[4],
            serial_number: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
        })
    }
}
