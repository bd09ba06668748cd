//! Runtime settings, loadable from a TOML file and overridable on the
//! command line.

use std::path::Path;

use serde::Deserialize;

use crate::error::{RpcError, RpcResult};

/// Name segment of this process's request-topic tree.
pub const APP_NAME: &str = "busbridge";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Broker endpoint as `host:port`; either side may be omitted.
    pub broker: String,
    /// Topic the latest overall-state snapshot is retained on.
    pub state_topic: String,
    /// Admission-control bound on concurrently-handled requests.
    pub max_tasks: usize,
    /// Serial ports the bus scan sweeps.
    pub ports: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: "127.0.0.1:1883".to_owned(),
            state_topic: format!("/rpc/v1/{APP_NAME}/bus_scan/state"),
            max_tasks: 10,
            ports: vec![
                "/dev/ttyRS485-1".to_owned(),
                "/dev/ttyRS485-2".to_owned(),
            ],
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> RpcResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RpcError::invalid_request(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| RpcError::invalid_request(format!("bad config {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_daemon_conventions() {
        let settings = Settings::default();
        assert_eq!(settings.broker, "127.0.0.1:1883");
        assert_eq!(settings.max_tasks, 10);
        assert_eq!(settings.state_topic, "/rpc/v1/busbridge/bus_scan/state");
        assert_eq!(settings.ports.len(), 2);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let settings: Settings = toml::from_str(r#"broker = "10.0.0.2:2883""#).unwrap();
        assert_eq!(settings.broker, "10.0.0.2:2883");
        assert_eq!(settings.max_tasks, 10);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Settings>("unknown_knob = 1").is_err());
    }
}
