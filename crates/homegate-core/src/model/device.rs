// ── Device domain type ──
//
// A paired device and everything it owns. URIs of every nested entity
// derive from the device uuid; `validate` re-derives them all and is
// run on every load and after every driver configuration pass.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

use super::endpoint::Endpoint;
use super::found::DeviceFoundDetails;
use super::metadata::{self, Metadata};
use super::resource::{
    RESOURCE_FIRMWARE_VERSION, RESOURCE_HARDWARE_VERSION, RESOURCE_MANUFACTURER, RESOURCE_MODEL,
    RESOURCE_TYPE_STRING, RESOURCE_TYPE_VERSION, Resource, ResourceMode,
};
use super::uri::{self, check_derived};

/// Canonical device type, serialized with the gateway's JSON keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub uuid: String,
    pub uri: String,
    pub device_class: String,
    pub device_class_version: u8,
    #[serde(rename = "deviceDriver")]
    pub managing_driver: String,
    #[serde(rename = "deviceEndpoints")]
    pub endpoints: Vec<Endpoint>,
    #[serde(rename = "deviceResources")]
    pub resources: Vec<Resource>,
    #[serde(rename = "metadatas")]
    pub metadata: Vec<Metadata>,
}

impl Device {
    pub fn new(
        uuid: &str,
        device_class: &str,
        device_class_version: u8,
        managing_driver: &str,
    ) -> Self {
        Self {
            uuid: uuid.to_owned(),
            uri: uri::device_uri(uuid),
            device_class: device_class.to_owned(),
            device_class_version,
            managing_driver: managing_driver.to_owned(),
            endpoints: Vec::new(),
            resources: Vec::new(),
            metadata: Vec::new(),
        }
    }

    /// Skeleton device for a candidate: common resources, metadata, and
    /// one empty endpoint per reported profile. The driver fills in the rest.
    pub(crate) fn from_found(details: &DeviceFoundDetails) -> Self {
        let mut device = Self::new(
            &details.uuid,
            &details.device_class,
            details.device_class_version,
            &details.driver,
        );

        let common = [
            (RESOURCE_MANUFACTURER, &details.manufacturer, RESOURCE_TYPE_STRING),
            (RESOURCE_MODEL, &details.model, RESOURCE_TYPE_STRING),
            (RESOURCE_HARDWARE_VERSION, &details.hardware_version, RESOURCE_TYPE_VERSION),
            (RESOURCE_FIRMWARE_VERSION, &details.firmware_version, RESOURCE_TYPE_VERSION),
        ];
        for (id, value, resource_type) in common {
            if let Some(resource) = device.put_resource(None, id, resource_type, ResourceMode::READABLE) {
                resource.value = Some(value.clone());
            }
        }
        for (key, value) in &details.metadata {
            device.put_metadata(None, key, Some(value.clone()));
        }
        for (id, profile) in &details.endpoint_profiles {
            device.add_endpoint(id, profile, 1);
        }
        device
    }

    // ── JSON ─────────────────────────────────────────────────────────

    /// Strict parse: any missing field or mismatched URI fails the whole load.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let device: Self = serde_json::from_str(json)?;
        device.validate()?;
        Ok(device)
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |what: &str| CoreError::Parse {
            message: format!("device {}: {what}", self.uuid),
        };
        if self.uuid.is_empty() || self.uuid.contains('/') {
            return Err(invalid("invalid uuid"));
        }
        if self.device_class.is_empty() {
            return Err(invalid("missing device class"));
        }
        if self.managing_driver.is_empty() {
            return Err(invalid("missing managing driver"));
        }

        check_derived(&self.uri, &uri::device_uri(&self.uuid))?;
        self.validate_owned(None, &self.resources, &self.metadata)?;
        for endpoint in &self.endpoints {
            check_derived(&endpoint.uri, &uri::endpoint_uri(&self.uuid, &endpoint.id))?;
            self.validate_owned(Some(&endpoint.id), &endpoint.resources, &endpoint.metadata)?;
        }
        Ok(())
    }

    fn validate_owned(
        &self,
        endpoint_id: Option<&str>,
        resources: &[Resource],
        metadata: &[Metadata],
    ) -> Result<(), CoreError> {
        for resource in resources {
            check_derived(&resource.uri, &uri::resource_uri(&self.uuid, endpoint_id, &resource.id))?;
        }
        for entry in metadata {
            check_derived(&entry.uri, &uri::metadata_uri(&self.uuid, endpoint_id, &entry.id))?;
        }
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn endpoint(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    pub(crate) fn endpoint_mut(&mut self, id: &str) -> Option<&mut Endpoint> {
        self.endpoints.iter_mut().find(|e| e.id == id)
    }

    /// Device-level resource by id.
    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn metadata_value(&self, id: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|m| m.id == id)
            .and_then(|m| m.value.as_deref())
    }

    /// Resource lookup with inheritance: an id missing on an existing
    /// endpoint falls back to the device-level resource.
    pub fn find_resource(&self, endpoint_id: Option<&str>, id: &str) -> Option<&Resource> {
        match endpoint_id {
            Some(ep) => {
                let endpoint = self.endpoint(ep)?;
                endpoint.resource(id).or_else(|| self.resource(id))
            }
            None => self.resource(id),
        }
    }

    pub(crate) fn find_resource_mut(
        &mut self,
        endpoint_id: Option<&str>,
        id: &str,
    ) -> Option<&mut Resource> {
        if let Some(ep) = endpoint_id {
            let pos = self.endpoints.iter().position(|e| e.id == ep)?;
            let on_endpoint = self.endpoints[pos].resources.iter().any(|r| r.id == id);
            if on_endpoint {
                return self.endpoints[pos].resource_mut(id);
            }
        }
        self.resources.iter_mut().find(|r| r.id == id)
    }

    /// Every resource, device-level first, then per endpoint.
    pub fn all_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources
            .iter()
            .chain(self.endpoints.iter().flat_map(|e| e.resources.iter()))
    }

    pub fn all_metadata(&self) -> impl Iterator<Item = &Metadata> {
        self.metadata
            .iter()
            .chain(self.endpoints.iter().flat_map(|e| e.metadata.iter()))
    }

    /// Device-level metadata test; `value` is compared ignoring ASCII case,
    /// `None` only requires the key to exist.
    pub fn has_metadata(&self, key: &str, value: Option<&str>) -> bool {
        self.metadata.iter().any(|m| {
            m.id == key
                && value.is_none_or(|wanted| {
                    m.value
                        .as_deref()
                        .is_some_and(|have| have.eq_ignore_ascii_case(wanted))
                })
        })
    }

    // ── Mutators ─────────────────────────────────────────────────────

    /// Add (or replace) an endpoint with a derived URI.
    pub fn add_endpoint(&mut self, id: &str, profile: &str, profile_version: u8) -> &mut Endpoint {
        let endpoint = Endpoint::new(id, uri::endpoint_uri(&self.uuid, id), profile, profile_version);
        let pos = if let Some(pos) = self.endpoints.iter().position(|e| e.id == id) {
            self.endpoints[pos] = endpoint;
            pos
        } else {
            self.endpoints.push(endpoint);
            self.endpoints.len() - 1
        };
        &mut self.endpoints[pos]
    }

    /// Add (or replace) a resource on the device or one of its endpoints.
    /// `None` when the endpoint does not exist.
    pub fn put_resource(
        &mut self,
        endpoint_id: Option<&str>,
        id: &str,
        resource_type: &str,
        mode: ResourceMode,
    ) -> Option<&mut Resource> {
        let resource = Resource::new(id, uri::resource_uri(&self.uuid, endpoint_id, id), resource_type, mode);
        let list = match endpoint_id {
            Some(ep) => &mut self.endpoint_mut(ep)?.resources,
            None => &mut self.resources,
        };
        let pos = if let Some(pos) = list.iter().position(|r| r.id == id) {
            list[pos] = resource;
            pos
        } else {
            list.push(resource);
            list.len() - 1
        };
        list.get_mut(pos)
    }

    /// Upsert metadata. `None` when the endpoint does not exist, otherwise
    /// whether the stored value changed.
    pub fn put_metadata(
        &mut self,
        endpoint_id: Option<&str>,
        id: &str,
        value: Option<String>,
    ) -> Option<bool> {
        let uri = uri::metadata_uri(&self.uuid, endpoint_id, id);
        let list = match endpoint_id {
            Some(ep) => &mut self.endpoint_mut(ep)?.metadata,
            None => &mut self.metadata,
        };
        Some(metadata::upsert(list, id, uri, value))
    }

    pub(crate) fn remove_endpoint(&mut self, id: &str) -> Option<Endpoint> {
        let pos = self.endpoints.iter().position(|e| e.id == id)?;
        Some(self.endpoints.remove(pos))
    }
}
