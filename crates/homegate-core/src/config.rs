// ── Runtime service configuration ──
//
// Plain values handed to `DeviceService::new`. The core never reads
// config files; homegate-config builds one of these from TOML + env.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_COMMISSIONING_WINDOW: Duration = Duration::from_secs(180);

/// Externally supplied readiness flags reported in the status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub ready_for_device_operation: bool,
    pub ready_for_pairing: bool,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            ready_for_device_operation: true,
            ready_for_pairing: true,
        }
    }
}

impl Readiness {
    /// Pairing requires device operation readiness as well.
    pub fn pairing_ready(self) -> bool {
        self.ready_for_pairing && self.ready_for_device_operation
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Initial readiness flags.
    pub readiness: Readiness,
    /// Window length used when a commissioning window is opened with
    /// a zero timeout.
    pub default_commissioning_window: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            readiness: Readiness::default(),
            default_commissioning_window: DEFAULT_COMMISSIONING_WINDOW,
        }
    }
}
