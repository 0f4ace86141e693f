//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};

/// Tunables for a [`crate::Client`].
///
/// Durations serialize as whole seconds.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use jellyfish_lighting_rs::ClientConfig;
///
/// let config = ClientConfig::default().with_disconnect_timeout(Duration::from_secs(30));
/// assert_eq!(config.connect_timeout(), Duration::from_secs(5));
/// assert_eq!(config.disconnect_timeout(), Duration::from_secs(10));
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde_as(as = "DurationSeconds<u64>")]
    connect_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    disconnect_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    scan_interval: Duration,
    refresh_after_command: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            connect_timeout: Self::CONNECT_TIMEOUT,
            disconnect_timeout: Self::MIN_DISCONNECT_TIMEOUT,
            scan_interval: Self::SCAN_INTERVAL,
            refresh_after_command: true,
        }
    }
}

impl ClientConfig {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    const MIN_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    const MAX_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    const SCAN_INTERVAL: Duration = Duration::from_secs(15);

    pub fn new() -> Self {
        Self::default()
    }

    /// Hard limit for opening a session.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Hard limit for closing a session, always within 5-10 seconds.
    pub fn disconnect_timeout(&self) -> Duration {
        self.disconnect_timeout
            .clamp(Self::MIN_DISCONNECT_TIMEOUT, Self::MAX_DISCONNECT_TIMEOUT)
    }

    /// How often the owner of the client is expected to call
    /// [`refresh_all`](crate::Client::refresh_all). The client never polls by itself.
    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    /// Whether commands read back the run state of the zones they touched.
    pub fn refresh_after_command(&self) -> bool {
        self.refresh_after_command
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub fn with_refresh_after_command(mut self, enabled: bool) -> Self {
        self.refresh_after_command = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.disconnect_timeout(), Duration::from_secs(5));
        assert_eq!(config.scan_interval(), Duration::from_secs(15));
        assert!(config.refresh_after_command());
    }

    #[test]
    fn test_disconnect_timeout_is_clamped() {
        let short = ClientConfig::new().with_disconnect_timeout(Duration::from_secs(1));
        assert_eq!(short.disconnect_timeout(), Duration::from_secs(5));
        let long = ClientConfig::new().with_disconnect_timeout(Duration::from_secs(60));
        assert_eq!(long.disconnect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: ClientConfig =
            serde_json::from_value(json!({"connect_timeout": 2, "refresh_after_command": false}))
                .unwrap();
        assert_eq!(config.connect_timeout(), Duration::from_secs(2));
        assert_eq!(config.scan_interval(), Duration::from_secs(15));
        assert!(!config.refresh_after_command());
    }

    #[test]
    fn test_serialize_as_seconds() {
        let value = serde_json::to_value(ClientConfig::default()).unwrap();
        assert_eq!(value["scan_interval"], json!(15));
    }
}
