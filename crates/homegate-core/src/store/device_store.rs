// ── Device store ──
//
// Live devices keyed by uuid. Reads hand out owned deep copies so callers
// can mutate or drop results freely. Writes happen only from service
// operations that hold the orchestrator lock.

use crate::model::uri::ParsedUri;
use crate::model::{Device, Endpoint, Metadata, Resource};
use crate::stream::DeviceStream;

use super::collection::EntityCollection;

pub struct DeviceStore {
    devices: EntityCollection<Device>,
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStore {
    pub fn new() -> Self {
        Self {
            devices: EntityCollection::new(),
        }
    }

    // ── Reads (deep copies) ──────────────────────────────────────────

    pub fn get(&self, uuid: &str) -> Option<Device> {
        self.devices.get(uuid).map(|d| (*d).clone())
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.devices.get(uuid).is_some()
    }

    /// Every device, ordered by uuid.
    pub fn all(&self) -> Vec<Device> {
        self.filter(|_| true)
    }

    pub fn filter(&self, predicate: impl Fn(&Device) -> bool) -> Vec<Device> {
        self.devices
            .snapshot()
            .iter()
            .filter(|d| predicate(d))
            .map(|d| (**d).clone())
            .collect()
    }

    pub fn endpoint(&self, uuid: &str, endpoint_id: &str) -> Option<Endpoint> {
        self.devices
            .get(uuid)
            .and_then(|d| d.endpoint(endpoint_id).cloned())
    }

    /// Resolve a resource URI (with endpoint-to-device inheritance).
    pub fn resource(&self, parsed: &ParsedUri) -> Option<(Device, Resource)> {
        let ParsedUri::Resource { uuid, endpoint, id } = parsed else {
            return None;
        };
        let device = self.devices.get(uuid)?;
        let resource = device.find_resource(endpoint.as_deref(), id)?.clone();
        Some(((*device).clone(), resource))
    }

    pub fn resources_where(&self, predicate: impl Fn(&Resource) -> bool) -> Vec<Resource> {
        self.devices
            .snapshot()
            .iter()
            .flat_map(|d| d.all_resources().filter(|r| predicate(r)).cloned().collect::<Vec<_>>())
            .collect()
    }

    pub fn metadata_where(&self, predicate: impl Fn(&Metadata) -> bool) -> Vec<Metadata> {
        self.devices
            .snapshot()
            .iter()
            .flat_map(|d| d.all_metadata().filter(|m| predicate(m)).cloned().collect::<Vec<_>>())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn subscribe(&self) -> DeviceStream {
        DeviceStream::new(self.devices.subscribe())
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Insert or replace. Returns `true` if the uuid was new.
    pub(crate) fn insert(&self, device: Device) -> bool {
        self.devices.upsert(device.uuid.clone(), device)
    }

    pub(crate) fn remove(&self, uuid: &str) -> Option<Device> {
        self.devices.remove(uuid).map(|d| (*d).clone())
    }

    pub(crate) fn update<R>(&self, uuid: &str, f: impl FnOnce(&mut Device) -> R) -> Option<R> {
        self.devices.modify(uuid, f)
    }
}
