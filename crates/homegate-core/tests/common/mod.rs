// Shared fakes for the homegate-core integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

use homegate_core::{
    CachingPolicy, ChannelChangeError, Commissioner, CommissioningInfo, Device, DeviceDriver,
    DeviceFoundDetails, DeviceService, DriverError, DriverRegistry, Resource, ResourceMode,
    ServiceConfig, ServiceEvent, Subsystem,
};

pub const BOOL_TYPE: &str = "com.homegate.bool";
pub const NUMBER_TYPE: &str = "com.homegate.number";

// ── Driver ──────────────────────────────────────────────────────────

/// Scriptable driver that records every call it receives.
pub struct MockDriver {
    name: &'static str,
    classes: Vec<String>,
    subsystem: Option<&'static str>,
    never_reject: bool,
    recovery: bool,
    fail_start: bool,
    fail_configure: bool,
    calls: Mutex<Vec<String>>,
    read_value: Mutex<Option<String>>,
}

impl MockDriver {
    pub fn new(name: &'static str, classes: &[&str]) -> Self {
        Self {
            name,
            classes: classes.iter().map(|c| (*c).to_owned()).collect(),
            subsystem: None,
            never_reject: false,
            recovery: false,
            fail_start: false,
            fail_configure: false,
            calls: Mutex::new(Vec::new()),
            read_value: Mutex::new(None),
        }
    }

    pub fn with_subsystem(mut self, subsystem: &'static str) -> Self {
        self.subsystem = Some(subsystem);
        self
    }

    pub fn never_rejecting(mut self) -> Self {
        self.never_reject = true;
        self
    }

    pub fn recovering(mut self) -> Self {
        self.recovery = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_configure(mut self) -> Self {
        self.fail_configure = true;
        self
    }

    pub fn set_read_value(&self, value: &str) {
        *self.read_value.lock().unwrap() = Some(value.to_owned());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn start(&self, verb: &str, device_class: &str) -> Result<(), DriverError> {
        if self.fail_start {
            return Err(DriverError::failed("radio offline"));
        }
        self.record(format!("{verb}:{device_class}"));
        Ok(())
    }
}

impl DeviceDriver for MockDriver {
    fn name(&self) -> &str {
        self.name
    }

    fn subsystem(&self) -> Option<&str> {
        self.subsystem
    }

    fn supported_device_classes(&self) -> Vec<String> {
        self.classes.clone()
    }

    fn never_reject(&self) -> bool {
        self.never_reject
    }

    fn supports_recovery(&self) -> bool {
        self.recovery
    }

    fn discover_devices(&self, device_class: &str) -> Result<(), DriverError> {
        self.start("discover", device_class)
    }

    fn recover_devices(&self, device_class: &str) -> Result<(), DriverError> {
        self.start("recover", device_class)
    }

    fn stop_discovering(&self, device_class: &str) {
        self.record(format!("stop:{device_class}"));
    }

    /// Device level: `identify` (execute), `secret` (write-only,
    /// sensitive), `temperature` (read-through). Per endpoint: `onOff`.
    fn configure_device(&self, device: &mut Device, _details: &DeviceFoundDetails) -> Result<(), DriverError> {
        if self.fail_configure {
            return Err(DriverError::failed("interview timed out"));
        }
        device.put_resource(None, "identify", NUMBER_TYPE, ResourceMode::EXECUTABLE);
        device.put_resource(
            None,
            "secret",
            NUMBER_TYPE,
            ResourceMode::WRITEABLE | ResourceMode::SENSITIVE,
        );
        if let Some(temperature) = device.put_resource(None, "temperature", NUMBER_TYPE, ResourceMode::READABLE) {
            temperature.caching_policy = CachingPolicy::Never;
        }

        let endpoints: Vec<String> = device.endpoints.iter().map(|e| e.id.clone()).collect();
        for endpoint in &endpoints {
            device.put_resource(
                Some(endpoint),
                "onOff",
                BOOL_TYPE,
                ResourceMode::READABLE | ResourceMode::WRITEABLE,
            );
        }
        Ok(())
    }

    fn read_resource(&self, _device: &Device, resource: &Resource) -> Result<Option<String>, DriverError> {
        self.record(format!("read:{}", resource.uri));
        Ok(self.read_value.lock().unwrap().clone())
    }

    fn write_resource(&self, _device: &Device, resource: &Resource, value: Option<&str>) -> Result<(), DriverError> {
        self.record(format!("write:{}={}", resource.uri, value.unwrap_or_default()));
        Ok(())
    }

    fn execute_resource(
        &self,
        _device: &Device,
        resource: &Resource,
        arg: Option<&str>,
    ) -> Result<Option<String>, DriverError> {
        self.record(format!("execute:{}", resource.uri));
        Ok(Some(format!("executed {}", arg.unwrap_or_default())))
    }

    fn device_removed(&self, device: &Device) {
        self.record(format!("removed:{}", device.uuid));
    }
}

// ── Subsystem ───────────────────────────────────────────────────────

pub struct MockZigbee;

impl Subsystem for MockZigbee {
    fn name(&self) -> &str {
        "zigbee"
    }

    fn status(&self) -> Map<String, Value> {
        let mut status = Map::new();
        status.insert("networkUp".into(), json!(true));
        status.insert("channel".into(), json!(25));
        status
    }

    /// Channel 0 resolves to 15; channel 13 reports a change in progress.
    fn change_channel(&self, channel: u8, _dry_run: bool) -> Result<u8, ChannelChangeError> {
        match channel {
            0 => Ok(15),
            13 => Err(ChannelChangeError::InProgress),
            other => Ok(other),
        }
    }
}

// ── Commissioner ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockCommissioner {
    calls: Mutex<Vec<String>>,
}

impl MockCommissioner {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Commissioner for MockCommissioner {
    fn subsystem(&self) -> &str {
        "matter"
    }

    fn commission(&self, setup_payload: &str, timeout: Duration) -> Result<(), DriverError> {
        self.record(format!("commission:{setup_payload}:{}", timeout.as_secs()));
        Ok(())
    }

    fn pair(&self, node_id: u64, timeout: Duration) -> Result<(), DriverError> {
        self.record(format!("pair:{node_id}:{}", timeout.as_secs()));
        Ok(())
    }

    fn open_commissioning_window(
        &self,
        node_id: Option<&str>,
        timeout: Duration,
    ) -> Result<CommissioningInfo, DriverError> {
        self.record(format!("window:{}:{}", node_id.unwrap_or("local"), timeout.as_secs()));
        Ok(CommissioningInfo {
            manual_code: "34970112332".into(),
            qr_code: "MT:Y.K9042C00KA0648G00".into(),
        })
    }

    fn stop_commissioning(&self) {
        self.record("stop".into());
    }
}

// ── Service helpers ─────────────────────────────────────────────────

pub fn service_with(drivers: &[Arc<MockDriver>]) -> DeviceService {
    service_with_config(drivers, ServiceConfig::default())
}

pub fn service_with_config(drivers: &[Arc<MockDriver>], config: ServiceConfig) -> DeviceService {
    let mut registry = DriverRegistry::new();
    for driver in drivers {
        registry.register_driver(Arc::clone(driver) as Arc<dyn DeviceDriver>).unwrap();
    }
    registry.register_subsystem(Arc::new(MockZigbee)).unwrap();
    DeviceService::new(config, registry)
}

/// Candidate for the `zig` driver with one `light` endpoint.
pub fn candidate(uuid: &str, device_class: &str) -> DeviceFoundDetails {
    DeviceFoundDetails::new(uuid, device_class, "zig")
        .with_identity("Acme", "S2")
        .with_versions("1", "2.4.0")
        .with_subsystem("zigbee")
        .with_endpoint("1", "light")
}

/// Run a candidate through discovery and configuration.
pub async fn pair(service: &DeviceService, details: &DeviceFoundDetails) -> Device {
    service
        .discover_start(&[details.device_class.as_str()], None, 0, false)
        .await
        .unwrap();
    assert!(service.device_found(details).await.unwrap());
    service.configure_device(details).await.unwrap()
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<Arc<ServiceEvent>>) -> Vec<Arc<ServiceEvent>> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn names(events: &[Arc<ServiceEvent>]) -> Vec<&'static str> {
    events.iter().map(|e| e.name()).collect()
}
