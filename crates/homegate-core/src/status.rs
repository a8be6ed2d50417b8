// ── Status snapshot ──
//
// Point-in-time summary of discovery and pairing readiness plus one
// opaque fragment per subsystem. A plain owned value: building one deep
// copies everything it reports.
//
// On the wire each fragment carries its subsystem name under `__name`.
// The tag is stripped on parse and written fresh on serialize.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

const SUBSYSTEM_NAME_KEY: &str = "__name";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(into = "StatusDocument", try_from = "StatusDocument")]
pub struct ServiceStatus {
    pub supported_device_classes: BTreeSet<String>,
    pub discovery_running: bool,
    pub discovering_device_classes: BTreeSet<String>,
    pub discovery_timeout_seconds: u32,
    pub finding_orphaned_devices: bool,
    pub ready_for_device_operation: bool,
    pub ready_for_pairing: bool,
    /// Subsystem name -> status fragment (without the `__name` tag).
    pub subsystems: BTreeMap<String, Map<String, Value>>,
}

impl ServiceStatus {
    /// Strict parse: a missing top-level key, a non-object fragment or a
    /// fragment without `__name` fails the whole document.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ── Wire document ────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusDocument {
    supported_device_classes: Vec<String>,
    discovery_running: bool,
    discovering_device_classes: Vec<String>,
    discovery_timeout_seconds: u32,
    finding_orphaned_devices: bool,
    #[serde(rename = "isReadyForDeviceOperation")]
    ready_for_device_operation: bool,
    #[serde(rename = "isReadyForPairing")]
    ready_for_pairing: bool,
    subsystems: Vec<Map<String, Value>>,
}

impl From<ServiceStatus> for StatusDocument {
    fn from(status: ServiceStatus) -> Self {
        let subsystems = status
            .subsystems
            .into_iter()
            .map(|(name, mut fragment)| {
                fragment.insert(SUBSYSTEM_NAME_KEY.into(), Value::String(name));
                fragment
            })
            .collect();

        Self {
            supported_device_classes: status.supported_device_classes.into_iter().collect(),
            discovery_running: status.discovery_running,
            discovering_device_classes: status.discovering_device_classes.into_iter().collect(),
            discovery_timeout_seconds: status.discovery_timeout_seconds,
            finding_orphaned_devices: status.finding_orphaned_devices,
            ready_for_device_operation: status.ready_for_device_operation,
            ready_for_pairing: status.ready_for_pairing,
            subsystems,
        }
    }
}

impl TryFrom<StatusDocument> for ServiceStatus {
    type Error = String;

    fn try_from(doc: StatusDocument) -> Result<Self, Self::Error> {
        let mut subsystems = BTreeMap::new();
        for (idx, mut fragment) in doc.subsystems.into_iter().enumerate() {
            let name = match fragment.remove(SUBSYSTEM_NAME_KEY) {
                Some(Value::String(name)) => name,
                Some(_) => return Err(format!("subsystems[{idx}].{SUBSYSTEM_NAME_KEY} is not a string")),
                None => return Err(format!("subsystems[{idx}] has no {SUBSYSTEM_NAME_KEY}")),
            };
            if subsystems.insert(name.clone(), fragment).is_some() {
                return Err(format!("duplicate subsystem {name}"));
            }
        }

        Ok(Self {
            supported_device_classes: doc.supported_device_classes.into_iter().collect(),
            discovery_running: doc.discovery_running,
            discovering_device_classes: doc.discovering_device_classes.into_iter().collect(),
            discovery_timeout_seconds: doc.discovery_timeout_seconds,
            finding_orphaned_devices: doc.finding_orphaned_devices,
            ready_for_device_operation: doc.ready_for_device_operation,
            ready_for_pairing: doc.ready_for_pairing,
            subsystems,
        })
    }
}
