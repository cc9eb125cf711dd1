//! Gateway channel configuration.

use serde::{Deserialize, Serialize};

use crux_net_core::replay::{DEFAULT_MAX_AGE_MS, DEFAULT_REPLAY_WINDOW};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Sender: ECIES-encrypt packets to the recipient's registered key.
    pub encrypt: bool,
    /// Receiver: drop packets without a sender certificate.
    pub require_certificate: bool,
    /// Receiver: remembered message ids per sender. Zero disables.
    pub replay_window: usize,
    /// Receiver: oldest accepted `createdAt` in milliseconds. Zero disables.
    pub max_age_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            encrypt: false,
            require_certificate: false,
            replay_window: DEFAULT_REPLAY_WINDOW,
            max_age_ms: DEFAULT_MAX_AGE_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: GatewayConfig = serde_json::from_str(r#"{"encrypt": true}"#).unwrap();
        assert!(config.encrypt);
        assert!(!config.require_certificate);
        assert_eq!(config.replay_window, DEFAULT_REPLAY_WINDOW);
        assert_eq!(config.max_age_ms, DEFAULT_MAX_AGE_MS);
    }
}
