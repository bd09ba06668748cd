//! Bus-scan orchestration and the overall-state snapshot.
//!
//! The manager sweeps every configured port across the allowed line
//! parameter combinations, records the devices the scanner finds, and
//! pushes a fresh state snapshot through the [`StateHandle`] after each
//! combination so subscribers always see the latest picture.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::{RpcError, RpcResult};
use crate::rpc::client::RpcClient;
use crate::rpc::state::StateHandle;
use crate::serial::port::{ALLOWED_BAUD_RATES, ALLOWED_PARITIES, ALLOWED_STOP_BITS, DATA_BITS};
use crate::serial::scanner::BusScanner;
use crate::serial::{Parity, PortSettings, SerialRpcPort};

#[derive(Debug, Clone, Serialize)]
pub struct SerialParams {
    pub slave_id: u8,
    pub baud_rate: u32,
    pub parity: Parity,
    pub data_bits: u8,
    pub stop_bits: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    #[serde(rename = "type")]
    pub device_type: String,
    pub serial: String,
    pub port: String,
    pub is_polled: bool,
    pub is_online: bool,
    pub is_in_bootloader: bool,
    pub error: Option<String>,
    pub cfg: SerialParams,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BusScanState {
    pub progress: Option<u32>,
    pub scanning: bool,
    pub error: Option<String>,
    pub devices: Vec<DeviceInfo>,
}

pub struct DeviceManager {
    client: Arc<RpcClient>,
    state: StateHandle,
    ports: Vec<String>,
}

impl DeviceManager {
    pub fn new(client: Arc<RpcClient>, state: StateHandle, ports: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            client,
            state,
            ports,
        })
    }

    /// Walk every port across all allowed line parameters, collecting
    /// extended-scan hits. A silent combination is normal; any other fault
    /// aborts the scan and lands in the published state.
    pub async fn scan_serial_bus(&self) -> RpcResult<Value> {
        let mut state = BusScanState {
            scanning: true,
            ..BusScanState::default()
        };
        self.publish_state(&state);

        let result = self.sweep(&mut state).await;

        state.scanning = false;
        if let Err(e) = &result {
            state.error = Some(e.to_string());
        }
        self.publish_state(&state);
        result.map(|()| json!(true))
    }

    async fn sweep(&self, state: &mut BusScanState) -> RpcResult<()> {
        for port in &self.ports {
            for baud_rate in ALLOWED_BAUD_RATES {
                for parity in ALLOWED_PARITIES {
                    for stop_bits in ALLOWED_STOP_BITS {
                        let settings = PortSettings {
                            path: port.clone(),
                            baud_rate,
                            parity,
                            stop_bits,
                            ..PortSettings::new(port)
                        };
                        log::debug!(
                            target: "busbridge::manager",
                            "scanning {port}: {baud_rate}-{parity}-{stop_bits}"
                        );
                        let scanner =
                            BusScanner::new(SerialRpcPort::new(self.client.clone(), settings));
                        match scanner.scan_bus().await {
                            Ok(devices) => {
                                for device in devices {
                                    state.devices.push(DeviceInfo {
                                        device_type: "Scanned device".to_owned(),
                                        serial: device.serial_number.to_string(),
                                        port: port.clone(),
                                        is_polled: false,
                                        is_online: false,
                                        is_in_bootloader: false,
                                        error: None,
                                        cfg: SerialParams {
                                            slave_id: device.slave_id,
                                            baud_rate,
                                            parity,
                                            data_bits: DATA_BITS,
                                            stop_bits,
                                        },
                                    });
                                }
                            }
                            Err(RpcError::NoResponse) => {
                                log::debug!(
                                    target: "busbridge::manager",
                                    "no extended-modbus devices on {port}: {baud_rate}-{parity}-{stop_bits}"
                                );
                            }
                            Err(e) => return Err(e),
                        }
                        self.publish_state(state);
                    }
                }
            }
        }
        Ok(())
    }

    fn publish_state(&self, state: &BusScanState) {
        match serde_json::to_vec(state) {
            Ok(snapshot) => self.state.publish(snapshot),
            Err(e) => log::warn!(target: "busbridge::manager", "state snapshot failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_snapshot_shape() {
        let state = BusScanState {
            progress: None,
            scanning: true,
            error: None,
            devices: vec![DeviceInfo {
                device_type: "Scanned device".to_owned(),
                serial: "4265607340".to_owned(),
                port: "/dev/ttyRS485-1".to_owned(),
                is_polled: false,
                is_online: false,
                is_in_bootloader: false,
                error: None,
                cfg: SerialParams {
                    slave_id: 0x15,
                    baud_rate: 9600,
                    parity: Parity::None,
                    data_bits: 8,
                    stop_bits: 2,
                },
            }],
        };
        let value: Value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["scanning"], json!(true));
        assert_eq!(value["devices"][0]["type"], json!("Scanned device"));
        assert_eq!(value["devices"][0]["cfg"]["parity"], json!("N"));
        assert_eq!(value["devices"][0]["cfg"]["data_bits"], json!(8));
    }
}
