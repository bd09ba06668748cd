//! Serial line parameters carried in gateway call payloads.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Baud rates the scanner sweeps over.
pub const ALLOWED_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];
/// Parities the scanner sweeps over.
pub const ALLOWED_PARITIES: [Parity; 3] = [Parity::None, Parity::Even, Parity::Odd];
/// Stop-bit counts the scanner sweeps over.
pub const ALLOWED_STOP_BITS: [u8; 2] = [1, 2];

/// Data bits are fixed on this bus.
pub const DATA_BITS: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    #[serde(rename = "N")]
    None,
    #[serde(rename = "E")]
    Even,
    #[serde(rename = "O")]
    Odd,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Parity::None => "N",
            Parity::Even => "E",
            Parity::Odd => "O",
        };
        f.write_str(letter)
    }
}

/// One port configuration, the way the gateway expects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    pub path: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: u8,
    /// How long the gateway waits for the device to answer on the line.
    pub response_timeout: Duration,
}

impl PortSettings {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_owned(),
            baud_rate: 9600,
            parity: Parity::None,
            stop_bits: 2,
            response_timeout: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_serializes_as_a_single_letter() {
        assert_eq!(serde_json::to_string(&Parity::None).unwrap(), "\"N\"");
        assert_eq!(serde_json::to_string(&Parity::Even).unwrap(), "\"E\"");
        assert_eq!(serde_json::to_string(&Parity::Odd).unwrap(), "\"O\"");
    }

    #[test]
    fn defaults_match_the_bus_conventions() {
        let settings = PortSettings::new("/dev/ttyRS485-1");
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.stop_bits, 2);
        assert_eq!(settings.response_timeout, Duration::from_millis(500));
    }
}
