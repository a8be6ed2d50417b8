// ── Found-device details ──
//
// What a subsystem knows about a candidate before it is configured.
// Field names are part of the event wire contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::resource::{
    RESOURCE_FIRMWARE_VERSION, RESOURCE_HARDWARE_VERSION, RESOURCE_MANUFACTURER, RESOURCE_MODEL,
};
use super::uri;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceFoundDetails {
    pub uuid: String,
    pub manufacturer: String,
    pub model: String,
    pub hardware_version: String,
    pub firmware_version: String,
    pub device_class: String,
    #[serde(default = "default_class_version")]
    pub device_class_version: u8,
    /// Name of the driver that reported the candidate.
    pub driver: String,
    #[serde(default)]
    pub subsystem: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Endpoint id -> profile.
    #[serde(default)]
    pub endpoint_profiles: BTreeMap<String, String>,
}

fn default_class_version() -> u8 {
    1
}

impl DeviceFoundDetails {
    pub fn new(uuid: impl Into<String>, device_class: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            device_class: device_class.into(),
            device_class_version: default_class_version(),
            driver: driver.into(),
            ..Self::default()
        }
    }

    pub fn with_identity(mut self, manufacturer: &str, model: &str) -> Self {
        manufacturer.clone_into(&mut self.manufacturer);
        model.clone_into(&mut self.model);
        self
    }

    pub fn with_versions(mut self, hardware: &str, firmware: &str) -> Self {
        hardware.clone_into(&mut self.hardware_version);
        firmware.clone_into(&mut self.firmware_version);
        self
    }

    pub fn with_subsystem(mut self, subsystem: &str) -> Self {
        self.subsystem = Some(subsystem.to_owned());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn with_endpoint(mut self, id: &str, profile: &str) -> Self {
        self.endpoint_profiles.insert(id.to_owned(), profile.to_owned());
        self
    }

    /// `(uri, value)` pairs the device will start life with. Discovery
    /// filters are evaluated against these.
    pub fn initial_values(&self) -> Vec<(String, String)> {
        let common = [
            (RESOURCE_MANUFACTURER, &self.manufacturer),
            (RESOURCE_MODEL, &self.model),
            (RESOURCE_HARDWARE_VERSION, &self.hardware_version),
            (RESOURCE_FIRMWARE_VERSION, &self.firmware_version),
        ];
        let resources = common
            .into_iter()
            .map(|(id, value)| (uri::resource_uri(&self.uuid, None, id), value.clone()));
        let metadata = self
            .metadata
            .iter()
            .map(|(key, value)| (uri::metadata_uri(&self.uuid, None, key), value.clone()));
        resources.chain(metadata).collect()
    }
}
