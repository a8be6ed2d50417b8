// ── Endpoint domain type ──
//
// A functional unit of a device (one light of a dual switch, the
// thermostat half of a combo sensor). Owns its resources and metadata.

use serde::{Deserialize, Serialize};

use super::metadata::Metadata;
use super::resource::Resource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    pub uri: String,
    pub profile: String,
    pub profile_version: u8,
    pub enabled: bool,
    pub resources: Vec<Resource>,
    #[serde(rename = "metadatas")]
    pub metadata: Vec<Metadata>,
}

impl Endpoint {
    pub(crate) fn new(id: &str, uri: String, profile: &str, profile_version: u8) -> Self {
        Self {
            id: id.to_owned(),
            uri,
            profile: profile.to_owned(),
            profile_version,
            enabled: true,
            resources: Vec::new(),
            metadata: Vec::new(),
        }
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub(crate) fn resource_mut(&mut self, id: &str) -> Option<&mut Resource> {
        self.resources.iter_mut().find(|r| r.id == id)
    }

    pub fn metadata_value(&self, id: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|m| m.id == id)
            .and_then(|m| m.value.as_deref())
    }
}
