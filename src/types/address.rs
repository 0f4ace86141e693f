//! Controller address.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Host identifier of one controller (an IP address or a hostname).
///
/// Fixed for the lifetime of the client that was built with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerAddress(String);

impl ControllerAddress {
    pub fn new(host: impl Into<String>) -> Self {
        ControllerAddress(host.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControllerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ControllerAddress {
    fn from(host: &str) -> Self {
        ControllerAddress::new(host)
    }
}

impl From<String> for ControllerAddress {
    fn from(host: String) -> Self {
        ControllerAddress(host)
    }
}
