// ── Collaborator traits and the driver registry ──
//
// Subsystem drivers, subsystem status providers and the commissioner are
// external collaborators. The registry is built by the embedding process
// and moved into `DeviceService::new`; there is no global registration.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ChannelChangeError, CoreError};
use crate::model::{Device, DeviceFoundDetails, Resource};

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("{operation} is not supported")]
    Unsupported { operation: String },
    #[error("{message}")]
    Failed { message: String },
}

impl DriverError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    fn unsupported(operation: &str) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }
}

// ── DeviceDriver ─────────────────────────────────────────────────────

/// A driver that finds and manages devices of one or more classes.
pub trait DeviceDriver: Send + Sync {
    fn name(&self) -> &str;

    /// Subsystem this driver runs on, if any.
    fn subsystem(&self) -> Option<&str> {
        None
    }

    fn supported_device_classes(&self) -> Vec<String>;

    /// Drivers that never reject may run before the gateway is ready
    /// for device operation.
    fn never_reject(&self) -> bool {
        false
    }

    fn supports_recovery(&self) -> bool {
        false
    }

    fn discover_devices(&self, device_class: &str) -> Result<(), DriverError>;

    fn recover_devices(&self, _device_class: &str) -> Result<(), DriverError> {
        Err(DriverError::unsupported("recovery"))
    }

    fn stop_discovering(&self, device_class: &str);

    /// Populate endpoint resources on a freshly built device. The device
    /// already carries its common resources, metadata and endpoints.
    fn configure_device(
        &self,
        _device: &mut Device,
        _details: &DeviceFoundDetails,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    fn read_resource(&self, _device: &Device, _resource: &Resource) -> Result<Option<String>, DriverError> {
        Err(DriverError::unsupported("read"))
    }

    fn write_resource(
        &self,
        _device: &Device,
        _resource: &Resource,
        _value: Option<&str>,
    ) -> Result<(), DriverError> {
        Err(DriverError::unsupported("write"))
    }

    fn execute_resource(
        &self,
        _device: &Device,
        _resource: &Resource,
        _arg: Option<&str>,
    ) -> Result<Option<String>, DriverError> {
        Err(DriverError::unsupported("execute"))
    }

    fn device_removed(&self, _device: &Device) {}
}

// ── Subsystem ────────────────────────────────────────────────────────

/// A radio subsystem (zigbee, matter, ...) reporting opaque status.
pub trait Subsystem: Send + Sync {
    fn name(&self) -> &str;

    /// Status fragment. Must be a JSON object; the `__name` key is reserved.
    fn status(&self) -> serde_json::Map<String, serde_json::Value>;

    /// Move the network to `channel` (0 lets the subsystem pick).
    /// Returns the resulting channel.
    fn change_channel(&self, _channel: u8, _dry_run: bool) -> Result<u8, ChannelChangeError> {
        Err(ChannelChangeError::NotAllowed)
    }
}

// ── Commissioner ─────────────────────────────────────────────────────

/// Pairing codes returned when a commissioning window opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissioningInfo {
    pub manual_code: String,
    pub qr_code: String,
}

/// Single-target pairing (Matter commissioning and friends).
pub trait Commissioner: Send + Sync {
    /// Subsystem name; also the label of the commissioning session.
    fn subsystem(&self) -> &str;

    fn commission(&self, setup_payload: &str, timeout: Duration) -> Result<(), DriverError>;

    fn pair(&self, node_id: u64, timeout: Duration) -> Result<(), DriverError>;

    fn open_commissioning_window(
        &self,
        node_id: Option<&str>,
        timeout: Duration,
    ) -> Result<CommissioningInfo, DriverError>;

    fn stop_commissioning(&self);
}

// ── DriverRegistry ───────────────────────────────────────────────────

/// Explicitly constructed set of collaborators.
#[derive(Default, Clone)]
pub struct DriverRegistry {
    drivers: Vec<Arc<dyn DeviceDriver>>,
    subsystems: Vec<Arc<dyn Subsystem>>,
    commissioner: Option<Arc<dyn Commissioner>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver. Names must be unique.
    pub fn register_driver(&mut self, driver: Arc<dyn DeviceDriver>) -> Result<(), CoreError> {
        if driver.name().is_empty() {
            return Err(CoreError::invalid_argument("driver name is empty"));
        }
        if self.driver(driver.name()).is_some() {
            return Err(CoreError::invalid_argument(format!(
                "driver {} already registered",
                driver.name()
            )));
        }
        self.drivers.push(driver);
        Ok(())
    }

    pub fn register_subsystem(&mut self, subsystem: Arc<dyn Subsystem>) -> Result<(), CoreError> {
        if self.subsystem(subsystem.name()).is_some() {
            return Err(CoreError::invalid_argument(format!(
                "subsystem {} already registered",
                subsystem.name()
            )));
        }
        self.subsystems.push(subsystem);
        Ok(())
    }

    pub fn set_commissioner(&mut self, commissioner: Arc<dyn Commissioner>) {
        self.commissioner = Some(commissioner);
    }

    pub fn driver(&self, name: &str) -> Option<&Arc<dyn DeviceDriver>> {
        self.drivers.iter().find(|d| d.name() == name)
    }

    pub fn drivers(&self) -> &[Arc<dyn DeviceDriver>] {
        &self.drivers
    }

    /// Drivers claiming `device_class`, in registration order.
    pub fn drivers_for_class(&self, device_class: &str) -> Vec<Arc<dyn DeviceDriver>> {
        self.drivers
            .iter()
            .filter(|d| d.supported_device_classes().iter().any(|c| c == device_class))
            .cloned()
            .collect()
    }

    pub fn drivers_for_subsystem(&self, subsystem: &str) -> Vec<Arc<dyn DeviceDriver>> {
        self.drivers
            .iter()
            .filter(|d| d.subsystem() == Some(subsystem))
            .cloned()
            .collect()
    }

    pub fn subsystem(&self, name: &str) -> Option<&Arc<dyn Subsystem>> {
        self.subsystems.iter().find(|s| s.name() == name)
    }

    pub fn subsystems(&self) -> &[Arc<dyn Subsystem>] {
        &self.subsystems
    }

    pub fn commissioner(&self) -> Option<&Arc<dyn Commissioner>> {
        self.commissioner.as_ref()
    }

    /// Union of every class any driver supports.
    pub fn supported_device_classes(&self) -> BTreeSet<String> {
        self.drivers
            .iter()
            .flat_map(|d| d.supported_device_classes())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Named(&'static str, &'static [&'static str]);

    impl DeviceDriver for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn supported_device_classes(&self) -> Vec<String> {
            self.1.iter().map(|c| (*c).to_owned()).collect()
        }
        fn discover_devices(&self, _device_class: &str) -> Result<(), DriverError> {
            Ok(())
        }
        fn stop_discovering(&self, _device_class: &str) {}
    }

    #[test]
    fn duplicate_driver_names_are_rejected() {
        let mut registry = DriverRegistry::new();
        registry.register_driver(Arc::new(Named("a", &["light"]))).unwrap();
        assert!(registry.register_driver(Arc::new(Named("a", &["sensor"]))).is_err());
    }

    #[test]
    fn resolves_drivers_by_class() {
        let mut registry = DriverRegistry::new();
        registry.register_driver(Arc::new(Named("a", &["light", "sensor"]))).unwrap();
        registry.register_driver(Arc::new(Named("b", &["sensor"]))).unwrap();

        assert_eq!(registry.drivers_for_class("sensor").len(), 2);
        assert_eq!(registry.drivers_for_class("light").len(), 1);
        assert!(registry.drivers_for_class("camera").is_empty());
        assert_eq!(
            registry.supported_device_classes().into_iter().collect::<Vec<_>>(),
            vec!["light".to_owned(), "sensor".to_owned()]
        );
    }

    #[test]
    fn default_driver_hooks_are_unsupported() {
        let driver = Named("a", &[]);
        let device = Device::new("x", "light", 1, "a");
        let resource = Resource::new("r", "/x/r/r".into(), "t", crate::model::ResourceMode::READABLE);
        assert!(matches!(
            driver.read_resource(&device, &resource),
            Err(DriverError::Unsupported { .. })
        ));
    }
}
