// ── Device service ──
//
// The gateway's device-management facade: owns the driver registry, the
// device store, the event bus, readiness flags and the discovery session
// set. Discovery and commissioning operations live in `discovery`; this
// module carries construction, status, the resource/metadata surface and
// device lookups.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::{Readiness, ServiceConfig};
use crate::discovery::DiscoveryState;
use crate::driver::{DeviceDriver, DriverRegistry};
use crate::error::{ChannelChangeError, CoreError};
use crate::event::{EventBus, EventKind, ServiceEvent, StatusChangeReason};
use crate::model::resource::CachingPolicy;
use crate::model::uri::{self, ParsedUri};
use crate::model::{Device, Endpoint, Metadata, Resource, ResourceMode};
use crate::status::ServiceStatus;
use crate::store::DeviceStore;
use crate::stream::DeviceStream;

/// Name of the subsystem that owns zigbee channel changes.
pub const ZIGBEE_SUBSYSTEM: &str = "zigbee";

const ZIGBEE_CHANNELS: std::ops::RangeInclusive<u8> = 11..=26;

// ── DeviceService ────────────────────────────────────────────────────

/// Entry point for gateway consumers.
///
/// Cheaply cloneable via `Arc<ServiceInner>`. Every mutating operation
/// serializes on one orchestrator lock and emits its events before
/// releasing it. Reads go straight to the store.
#[derive(Clone)]
pub struct DeviceService {
    pub(crate) inner: Arc<ServiceInner>,
}

pub(crate) struct ServiceInner {
    pub(crate) config: ServiceConfig,
    pub(crate) registry: DriverRegistry,
    pub(crate) store: DeviceStore,
    pub(crate) events: EventBus,
    pub(crate) readiness: watch::Sender<Readiness>,
    pub(crate) discovery: Mutex<DiscoveryState>,
}

impl DeviceService {
    pub fn new(config: ServiceConfig, registry: DriverRegistry) -> Self {
        let (readiness, _) = watch::channel(config.readiness);
        let events = EventBus::new();
        info!(
            drivers = registry.drivers().len(),
            subsystems = registry.subsystems().len(),
            commissioner = registry.commissioner().is_some(),
            "device service created"
        );
        Self {
            inner: Arc::new(ServiceInner {
                config,
                registry,
                store: DeviceStore::new(),
                events,
                readiness,
                discovery: Mutex::new(DiscoveryState::default()),
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &DeviceStore {
        &self.inner.store
    }

    /// Subscribe to the device collection.
    pub fn devices(&self) -> DeviceStream {
        self.inner.store.subscribe()
    }

    /// Subscribe to service events. Receivers only see events emitted
    /// after they subscribed, and see all of them in emission order.
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Arc<ServiceEvent>> {
        self.inner.events.subscribe()
    }

    pub fn readiness(&self) -> Readiness {
        *self.inner.readiness.borrow()
    }

    /// Watch readiness changes.
    pub fn watch_readiness(&self) -> watch::Receiver<Readiness> {
        self.inner.readiness.subscribe()
    }

    // ── Status ───────────────────────────────────────────────────────

    /// Update the readiness flags. Emits `StatusChanged` when they differ
    /// from the current ones.
    pub async fn set_readiness(&self, readiness: Readiness) {
        let state = self.inner.discovery.lock().await;
        let changed = self.inner.readiness.send_if_modified(|current| {
            if *current == readiness {
                return false;
            }
            *current = readiness;
            true
        });
        if changed {
            info!(
                device_operation = readiness.ready_for_device_operation,
                pairing = readiness.ready_for_pairing,
                "readiness changed"
            );
            self.inner.events.emit(EventKind::StatusChanged {
                status: self.build_status(&state),
                reason: StatusChangeReason::Readiness,
            });
        }
    }

    pub async fn get_status(&self) -> ServiceStatus {
        let state = self.inner.discovery.lock().await;
        self.build_status(&state)
    }

    fn build_status(&self, state: &DiscoveryState) -> ServiceStatus {
        let readiness = self.readiness();
        let running = state.is_running();
        ServiceStatus {
            supported_device_classes: self.inner.registry.supported_device_classes(),
            discovery_running: running,
            discovering_device_classes: state.active_classes(),
            discovery_timeout_seconds: u32::from(state.timeout_secs()),
            finding_orphaned_devices: state.any_recovery(),
            ready_for_device_operation: readiness.ready_for_device_operation,
            ready_for_pairing: readiness.pairing_ready(),
            subsystems: self
                .inner
                .registry
                .subsystems()
                .iter()
                .map(|subsystem| (subsystem.name().to_owned(), subsystem.status()))
                .collect(),
        }
    }

    // ── Resources ────────────────────────────────────────────────────

    /// Read a resource value. Resources with caching policy `Never` are
    /// read through the owning driver and the fresh value is stored.
    pub async fn read_resource(&self, uri: &str) -> Result<Option<String>, CoreError> {
        let parsed = parse_resource_uri(uri)?;
        let _state = self.inner.discovery.lock().await;
        let (device, resource) = self.resolve_resource(&parsed, uri)?;
        if !resource.mode.is_readable() {
            return Err(CoreError::ResourceNotReadable { uri: uri.to_owned() });
        }
        if resource.caching_policy != CachingPolicy::Never {
            return Ok(resource.value);
        }

        let driver = self.driver_for(&device)?;
        let value = driver
            .read_resource(&device, &resource)
            .map_err(|err| CoreError::driver(driver.name(), &err))?;
        self.record_resource_value(&parsed, value.clone());
        Ok(value)
    }

    /// Write a resource through its driver and store the value. A URI
    /// containing `*` writes every matching resource; the first failure
    /// is returned after all writes were attempted.
    pub async fn write_resource(&self, uri: &str, value: Option<&str>) -> Result<(), CoreError> {
        let _state = self.inner.discovery.lock().await;
        if !uri::is_pattern(uri) {
            return self.write_one(uri, value);
        }

        let pattern = uri::pattern_regex(uri)?;
        let targets: Vec<String> = self
            .inner
            .store
            .resources_where(|r| pattern.is_match(&r.uri))
            .into_iter()
            .map(|r| r.uri)
            .collect();
        if targets.is_empty() {
            return Err(CoreError::not_found("resource", uri));
        }

        let mut first_err = None;
        for target in &targets {
            if let Err(err) = self.write_one(target, value) {
                warn!(uri = %target, error = %err, "pattern write failed");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub async fn execute_resource(&self, uri: &str, arg: Option<&str>) -> Result<Option<String>, CoreError> {
        let parsed = parse_resource_uri(uri)?;
        let _state = self.inner.discovery.lock().await;
        let (device, resource) = self.resolve_resource(&parsed, uri)?;
        if !resource.mode.is_executable() {
            return Err(CoreError::ResourceNotExecutable { uri: uri.to_owned() });
        }
        let driver = self.driver_for(&device)?;
        driver
            .execute_resource(&device, &resource, arg)
            .map_err(|err| CoreError::driver(driver.name(), &err))
    }

    /// Replace a resource's mode. The sensitive flag is sticky.
    pub async fn change_resource_mode(&self, uri: &str, mode: ResourceMode) -> Result<(), CoreError> {
        let parsed = parse_resource_uri(uri)?;
        let _state = self.inner.discovery.lock().await;
        let (_, resource) = self.resolve_resource(&parsed, uri)?;
        if resource.mode.is_sensitive() && !mode.is_sensitive() {
            return Err(CoreError::invalid_argument(format!(
                "sensitive flag cannot be cleared on {uri}"
            )));
        }

        let updated = self.update_resource(&parsed, |r| {
            r.mode = mode;
            true
        });
        if let Some(resource) = updated {
            debug!(uri = %resource.uri, ?mode, "resource mode changed");
            self.inner.events.emit(EventKind::ResourceUpdated {
                resource,
                metadata: None,
            });
        }
        Ok(())
    }

    /// Resources whose URI matches a `*` wildcard pattern.
    pub fn get_resources_by_uri_pattern(&self, pattern: &str) -> Result<Vec<Resource>, CoreError> {
        let regex = uri::pattern_regex(pattern)?;
        Ok(self.inner.store.resources_where(|r| regex.is_match(&r.uri)))
    }

    fn write_one(&self, uri: &str, value: Option<&str>) -> Result<(), CoreError> {
        let parsed = parse_resource_uri(uri)?;
        let (device, resource) = self.resolve_resource(&parsed, uri)?;
        if !resource.mode.is_writable() {
            return Err(CoreError::ResourceNotWritable { uri: uri.to_owned() });
        }
        let driver = self.driver_for(&device)?;
        driver
            .write_resource(&device, &resource, value)
            .map_err(|err| CoreError::driver(driver.name(), &err))?;
        self.record_resource_value(&parsed, value.map(str::to_owned));
        Ok(())
    }

    fn resolve_resource(&self, parsed: &ParsedUri, uri: &str) -> Result<(Device, Resource), CoreError> {
        self.inner
            .store
            .resource(parsed)
            .ok_or_else(|| CoreError::not_found("resource", uri))
    }

    /// Store a value; emits `ResourceUpdated` when it changed.
    fn record_resource_value(&self, parsed: &ParsedUri, value: Option<String>) {
        if let Some(resource) = self.update_resource(parsed, |r| r.record_value(value)) {
            self.inner.events.emit(EventKind::ResourceUpdated {
                resource,
                metadata: None,
            });
        }
    }

    /// Apply `f` to the stored resource. Returns a copy of it when `f`
    /// reports a change.
    fn update_resource(&self, parsed: &ParsedUri, f: impl FnOnce(&mut Resource) -> bool) -> Option<Resource> {
        let ParsedUri::Resource { uuid, endpoint, id } = parsed else {
            return None;
        };
        self.inner
            .store
            .update(uuid, |device| {
                let resource = device.find_resource_mut(endpoint.as_deref(), id)?;
                f(resource).then(|| resource.clone())
            })
            .flatten()
    }

    // ── Metadata ─────────────────────────────────────────────────────

    /// Metadata value by URI. An unknown key yields `None`; an unknown
    /// device or endpoint is an error.
    pub fn get_metadata(&self, uri: &str) -> Result<Option<String>, CoreError> {
        let (uuid, endpoint, id) = parse_metadata_uri(uri)?;
        let device = self
            .inner
            .store
            .get(&uuid)
            .ok_or_else(|| CoreError::not_found("device", &uuid))?;
        let value = match endpoint.as_deref() {
            Some(ep) => device
                .endpoint(ep)
                .ok_or_else(|| CoreError::not_found("endpoint", ep))?
                .metadata_value(&id),
            None => device.metadata_value(&id),
        };
        Ok(value.map(str::to_owned))
    }

    /// Upsert a metadata value. Emits `MetadataUpdated` when it changed.
    pub async fn set_metadata(&self, uri: &str, value: Option<&str>) -> Result<(), CoreError> {
        let (uuid, endpoint, id) = parse_metadata_uri(uri)?;
        let _state = self.inner.discovery.lock().await;
        let derived = uri::metadata_uri(&uuid, endpoint.as_deref(), &id);

        let updated = self
            .inner
            .store
            .update(&uuid, |device| -> Result<Option<Metadata>, CoreError> {
                let changed = device
                    .put_metadata(endpoint.as_deref(), &id, value.map(str::to_owned))
                    .ok_or_else(|| CoreError::not_found("endpoint", endpoint.clone().unwrap_or_default()))?;
                Ok(changed
                    .then(|| device.all_metadata().find(|m| m.uri == derived).cloned())
                    .flatten())
            })
            .ok_or_else(|| CoreError::not_found("device", &uuid))??;

        if let Some(metadata) = updated {
            self.inner.events.emit(EventKind::MetadataUpdated { metadata });
        }
        Ok(())
    }

    /// Metadata entries whose URI matches a `*` wildcard pattern.
    pub fn get_metadata_by_uri_pattern(&self, pattern: &str) -> Result<Vec<Metadata>, CoreError> {
        let regex = uri::pattern_regex(pattern)?;
        Ok(self.inner.store.metadata_where(|m| regex.is_match(&m.uri)))
    }

    // ── Device lookups ───────────────────────────────────────────────

    pub fn get_device(&self, uuid: &str) -> Option<Device> {
        self.inner.store.get(uuid)
    }

    /// Device owning any URI (device, endpoint, resource or metadata).
    pub fn get_device_by_uri(&self, uri: &str) -> Result<Option<Device>, CoreError> {
        let parsed = uri::parse(uri)?;
        Ok(self.inner.store.get(parsed.device_uuid()))
    }

    pub fn get_all_devices(&self) -> Vec<Device> {
        self.inner.store.all()
    }

    /// Devices carrying device-level metadata `key`, optionally with a
    /// value equal to `value` ignoring ASCII case.
    pub fn get_devices_by_metadata(&self, key: &str, value: Option<&str>) -> Vec<Device> {
        self.inner.store.filter(|d| d.has_metadata(key, value))
    }

    /// Devices with at least one endpoint of `profile`.
    pub fn get_devices_by_profile(&self, profile: &str) -> Vec<Device> {
        self.inner
            .store
            .filter(|d| d.endpoints.iter().any(|e| e.profile == profile))
    }

    pub fn get_devices_by_device_class(&self, device_class: &str) -> Vec<Device> {
        self.inner.store.filter(|d| d.device_class == device_class)
    }

    pub fn get_devices_by_device_driver(&self, driver: &str) -> Vec<Device> {
        self.inner.store.filter(|d| d.managing_driver == driver)
    }

    /// Devices managed by any driver belonging to `subsystem`.
    pub fn get_devices_by_subsystem(&self, subsystem: &str) -> Vec<Device> {
        let drivers: Vec<String> = self
            .inner
            .registry
            .drivers_for_subsystem(subsystem)
            .iter()
            .map(|d| d.name().to_owned())
            .collect();
        self.inner
            .store
            .filter(|d| drivers.iter().any(|name| *name == d.managing_driver))
    }

    // ── Endpoint lookups ─────────────────────────────────────────────

    pub fn get_endpoint(&self, uuid: &str, endpoint_id: &str) -> Option<Endpoint> {
        self.inner.store.endpoint(uuid, endpoint_id)
    }

    pub fn get_endpoint_by_uri(&self, uri: &str) -> Result<Option<Endpoint>, CoreError> {
        match uri::parse(uri)? {
            ParsedUri::Endpoint { uuid, endpoint } => Ok(self.inner.store.endpoint(&uuid, &endpoint)),
            _ => Err(CoreError::invalid_argument(format!("not an endpoint uri: {uri}"))),
        }
    }

    pub fn get_endpoints_by_profile(&self, profile: &str) -> Vec<Endpoint> {
        self.inner
            .store
            .all()
            .into_iter()
            .flat_map(|d| d.endpoints)
            .filter(|e| e.profile == profile)
            .collect()
    }

    // ── Removal ──────────────────────────────────────────────────────

    /// Remove a device and tell its driver. Emits `DeviceRemoved`.
    pub async fn remove_device(&self, uuid: &str) -> Result<Device, CoreError> {
        let _state = self.inner.discovery.lock().await;
        let device = self
            .inner
            .store
            .remove(uuid)
            .ok_or_else(|| CoreError::not_found("device", uuid))?;

        match self.inner.registry.driver(&device.managing_driver) {
            Some(driver) => driver.device_removed(&device),
            None => warn!(uuid, driver = %device.managing_driver, "removed device has no registered driver"),
        }
        info!(uuid, device_class = %device.device_class, "device removed");
        self.inner.events.emit(EventKind::DeviceRemoved {
            uuid: device.uuid.clone(),
            device_class: device.device_class.clone(),
        });
        Ok(device)
    }

    /// Remove one endpoint from a device. Emits `EndpointRemoved`.
    pub async fn remove_endpoint(&self, uuid: &str, endpoint_id: &str) -> Result<Endpoint, CoreError> {
        let _state = self.inner.discovery.lock().await;
        let (endpoint, device_class) = self
            .inner
            .store
            .update(uuid, |device| {
                device
                    .remove_endpoint(endpoint_id)
                    .map(|endpoint| (endpoint, device.device_class.clone()))
            })
            .ok_or_else(|| CoreError::not_found("device", uuid))?
            .ok_or_else(|| CoreError::not_found("endpoint", endpoint_id))?;

        self.inner.events.emit(EventKind::EndpointRemoved {
            endpoint: endpoint.clone(),
            device_uuid: uuid.to_owned(),
            device_class,
        });
        Ok(endpoint)
    }

    // ── Zigbee ───────────────────────────────────────────────────────

    /// Move the zigbee network to `channel` (0 lets the subsystem pick).
    /// Returns the channel the network is on afterwards, or would be on
    /// for a dry run.
    pub async fn change_zigbee_channel(&self, channel: u8, dry_run: bool) -> Result<u8, CoreError> {
        if channel != 0 && !ZIGBEE_CHANNELS.contains(&channel) {
            return Err(ChannelChangeError::InvalidChannel.into());
        }
        let _state = self.inner.discovery.lock().await;
        let subsystem = self
            .inner
            .registry
            .subsystem(ZIGBEE_SUBSYSTEM)
            .ok_or_else(|| CoreError::not_found("subsystem", ZIGBEE_SUBSYSTEM))?;

        let current_channel = subsystem.change_channel(channel, dry_run)?;
        if !dry_run {
            info!(targeted = channel, current = current_channel, "zigbee channel changed");
            self.inner.events.emit(EventKind::ZigbeeChannelChanged {
                channel_changed: true,
                current_channel,
                targeted_channel: channel,
            });
        }
        Ok(current_channel)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn driver_for(&self, device: &Device) -> Result<&Arc<dyn DeviceDriver>, CoreError> {
        self.inner
            .registry
            .driver(&device.managing_driver)
            .ok_or_else(|| CoreError::not_found("driver", &device.managing_driver))
    }
}

fn parse_resource_uri(uri: &str) -> Result<ParsedUri, CoreError> {
    match uri::parse(uri)? {
        parsed @ ParsedUri::Resource { .. } => Ok(parsed),
        _ => Err(CoreError::invalid_argument(format!("not a resource uri: {uri}"))),
    }
}

/// Split a metadata URI into (uuid, endpoint, key).
fn parse_metadata_uri(uri: &str) -> Result<(String, Option<String>, String), CoreError> {
    match uri::parse(uri)? {
        ParsedUri::Metadata { uuid, endpoint, id } => Ok((uuid, endpoint, id)),
        _ => Err(CoreError::MetadataNotAccessible { uri: uri.to_owned() }),
    }
}
