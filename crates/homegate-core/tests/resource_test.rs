#![allow(clippy::unwrap_used)]
// Integration tests for the resource, metadata and lookup surface.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio_stream::StreamExt;

use homegate_core::{ChannelChangeError, CoreError, DeviceService, EventKind, ResourceMode};

use common::{MockDriver, candidate, drain, names, pair, service_with};

async fn setup() -> (DeviceService, Arc<MockDriver>) {
    let driver = Arc::new(MockDriver::new("zig", &["light", "sensor"]).with_subsystem("zigbee"));
    let service = service_with(&[Arc::clone(&driver)]);
    pair(&service, &candidate("d1", "light").with_metadata("room", "Kitchen")).await;
    pair(&service, &candidate("d2", "light").with_metadata("room", "Hall")).await;
    pair(&service, &candidate("d3", "sensor")).await;
    (service, driver)
}

// ── Read ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_read_write_only_resource_fails() {
    let (service, _) = setup().await;

    let err = service.read_resource("/d1/r/secret").await.unwrap_err();

    assert!(matches!(err, CoreError::ResourceNotReadable { ref uri } if uri == "/d1/r/secret"));
    assert_eq!(err.code(), Some(1));
}

#[tokio::test]
async fn test_read_returns_cached_value() {
    let (service, driver) = setup().await;

    let value = service.read_resource("/d1/r/manufacturer").await.unwrap();

    assert_eq!(value.as_deref(), Some("Acme"));
    assert!(!driver.calls().iter().any(|c| c.starts_with("read:")));
}

#[tokio::test]
async fn test_uncached_read_goes_through_driver() {
    let (service, driver) = setup().await;
    let mut rx = service.subscribe();
    driver.set_read_value("21.5");

    let value = service.read_resource("/d1/r/temperature").await.unwrap();

    assert_eq!(value.as_deref(), Some("21.5"));
    assert!(driver.calls().contains(&"read:/d1/r/temperature".to_owned()));
    let stored = service.get_device("d1").unwrap();
    let temperature = stored.resource("temperature").unwrap();
    assert_eq!(temperature.value.as_deref(), Some("21.5"));
    assert!(temperature.date_of_last_sync_millis > 0);
    assert_eq!(names(&drain(&mut rx)), vec!["resource-updated"]);

    service.read_resource("/d1/r/temperature").await.unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_endpoint_uri_inherits_device_resource() {
    let (service, _) = setup().await;

    let value = service.read_resource("/d1/ep/1/r/model").await.unwrap();
    assert_eq!(value.as_deref(), Some("S2"));

    let missing = service.read_resource("/d1/ep/9/r/model").await;
    assert!(matches!(missing, Err(CoreError::NotFound { .. })));
}

#[tokio::test]
async fn test_non_resource_uri_is_invalid() {
    let (service, _) = setup().await;
    assert!(matches!(
        service.read_resource("/d1/m/room").await,
        Err(CoreError::InvalidArgument { .. })
    ));
    assert!(matches!(
        service.read_resource("d1/r/model").await,
        Err(CoreError::InvalidArgument { .. })
    ));
}

// ── Write / execute ─────────────────────────────────────────────────

#[tokio::test]
async fn test_write_stores_value_and_emits_once() {
    let (service, driver) = setup().await;
    let mut rx = service.subscribe();

    service.write_resource("/d1/ep/1/r/onOff", Some("true")).await.unwrap();
    service.write_resource("/d1/ep/1/r/onOff", Some("true")).await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(names(&events), vec!["resource-updated"]);
    let EventKind::ResourceUpdated { resource, .. } = &events[0].kind else {
        panic!("expected resource-updated, got {:?}", events[0].kind);
    };
    assert_eq!(resource.uri, "/d1/ep/1/r/onOff");
    assert_eq!(resource.value.as_deref(), Some("true"));

    assert_eq!(
        service.read_resource("/d1/ep/1/r/onOff").await.unwrap().as_deref(),
        Some("true")
    );
    let writes = driver.calls().into_iter().filter(|c| c.starts_with("write:")).count();
    assert_eq!(writes, 2);
}

#[tokio::test]
async fn test_write_read_only_resource_fails() {
    let (service, _) = setup().await;
    let err = service.write_resource("/d1/r/model", Some("X")).await.unwrap_err();
    assert!(matches!(err, CoreError::ResourceNotWritable { .. }));
    assert_eq!(err.code(), Some(2));
}

#[tokio::test]
async fn test_pattern_write_hits_every_match() {
    let (service, _) = setup().await;

    service.write_resource("/*/ep/1/r/onOff", Some("false")).await.unwrap();

    for uuid in ["d1", "d2", "d3"] {
        let endpoint = service.get_endpoint(uuid, "1").unwrap();
        assert_eq!(endpoint.resource("onOff").unwrap().value.as_deref(), Some("false"));
    }

    let none = service.write_resource("/*/ep/7/r/onOff", Some("false")).await;
    assert!(matches!(none, Err(CoreError::NotFound { .. })));
}

#[tokio::test]
async fn test_execute_returns_driver_response() {
    let (service, _) = setup().await;

    let response = service.execute_resource("/d1/r/identify", Some("5")).await.unwrap();
    assert_eq!(response.as_deref(), Some("executed 5"));

    let err = service.execute_resource("/d1/r/model", None).await.unwrap_err();
    assert!(matches!(err, CoreError::ResourceNotExecutable { .. }));
    assert_eq!(err.code(), Some(3));
}

#[tokio::test]
async fn test_sensitive_flag_is_sticky() {
    let (service, _) = setup().await;
    let mut rx = service.subscribe();

    let cleared = service.change_resource_mode("/d1/r/secret", ResourceMode::WRITEABLE).await;
    assert!(matches!(cleared, Err(CoreError::InvalidArgument { .. })));

    let mode = ResourceMode::READABLE | ResourceMode::WRITEABLE | ResourceMode::SENSITIVE;
    service.change_resource_mode("/d1/r/secret", mode).await.unwrap();

    assert_eq!(names(&drain(&mut rx)), vec!["resource-updated"]);
    assert_eq!(service.read_resource("/d1/r/secret").await.unwrap(), None);
}

// ── Metadata ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_metadata() {
    let (service, _) = setup().await;

    assert_eq!(service.get_metadata("/d1/m/room").unwrap().as_deref(), Some("Kitchen"));
    assert_eq!(service.get_metadata("/d1/m/floor").unwrap(), None);
    assert!(matches!(
        service.get_metadata("/nope/m/room"),
        Err(CoreError::NotFound { .. })
    ));
    assert!(matches!(
        service.get_metadata("/d1/ep/9/m/room"),
        Err(CoreError::NotFound { .. })
    ));

    let err = service.get_metadata("/d1/r/model").unwrap_err();
    assert!(matches!(err, CoreError::MetadataNotAccessible { .. }));
    assert_eq!(err.code(), Some(200));
}

#[tokio::test]
async fn test_set_metadata_emits_on_change() {
    let (service, _) = setup().await;
    let mut rx = service.subscribe();

    service.set_metadata("/d1/ep/1/m/label", Some("Lamp")).await.unwrap();
    service.set_metadata("/d1/ep/1/m/label", Some("Lamp")).await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(names(&events), vec!["metadata-updated"]);
    let EventKind::MetadataUpdated { metadata } = &events[0].kind else {
        panic!("expected metadata-updated, got {:?}", events[0].kind);
    };
    assert_eq!(metadata.uri, "/d1/ep/1/m/label");
    assert_eq!(service.get_metadata("/d1/ep/1/m/label").unwrap().as_deref(), Some("Lamp"));

    let missing = service.set_metadata("/d1/ep/9/m/label", Some("Lamp")).await;
    assert!(matches!(missing, Err(CoreError::NotFound { .. })));
}

#[tokio::test]
async fn test_uri_pattern_lookups() {
    let (service, _) = setup().await;

    let rooms = service.get_metadata_by_uri_pattern("/*/m/room").unwrap();
    assert_eq!(rooms.len(), 2);

    let on_off = service.get_resources_by_uri_pattern("/d1/ep/*/r/*").unwrap();
    assert_eq!(on_off.len(), 1);
    assert_eq!(on_off[0].id, "onOff");

    let device_level = service.get_resources_by_uri_pattern("/d1/r/*").unwrap();
    assert_eq!(device_level.len(), 7);

    assert!(service.get_resources_by_uri_pattern("/d1/r/mod.l").unwrap().is_empty());
}

// ── Lookups ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_device_lookups() {
    let (service, _) = setup().await;
    let uuids = |devices: Vec<homegate_core::Device>| devices.into_iter().map(|d| d.uuid).collect::<Vec<_>>();

    assert_eq!(uuids(service.get_all_devices()), vec!["d1", "d2", "d3"]);
    assert_eq!(uuids(service.get_devices_by_metadata("room", Some("KITCHEN"))), vec!["d1"]);
    assert_eq!(uuids(service.get_devices_by_metadata("room", None)), vec!["d1", "d2"]);
    assert_eq!(uuids(service.get_devices_by_profile("light")), vec!["d1", "d2", "d3"]);
    assert_eq!(uuids(service.get_devices_by_device_class("sensor")), vec!["d3"]);
    assert_eq!(uuids(service.get_devices_by_device_driver("zig")).len(), 3);
    assert_eq!(uuids(service.get_devices_by_subsystem("zigbee")).len(), 3);
    assert!(service.get_devices_by_subsystem("matter").is_empty());

    let owner = service.get_device_by_uri("/d2/ep/1/r/onOff").unwrap().unwrap();
    assert_eq!(owner.uuid, "d2");
    let endpoint = service.get_endpoint_by_uri("/d2/ep/1").unwrap().unwrap();
    assert_eq!(endpoint.uri, "/d2/ep/1");
    assert_eq!(service.get_endpoints_by_profile("light").len(), 3);
    assert!(service.get_endpoint_by_uri("/d2/r/model").is_err());
}

#[tokio::test]
async fn test_lookups_return_independent_copies() {
    let (service, _) = setup().await;

    let mut copy = service.get_device("d1").unwrap();
    copy.endpoints.clear();
    copy.metadata.clear();

    let stored = service.get_device("d1").unwrap();
    assert_eq!(stored.endpoints.len(), 1);
    assert_eq!(stored.metadata_value("room"), Some("Kitchen"));
}

#[tokio::test]
async fn test_device_stream_sees_pairing() {
    let driver = Arc::new(MockDriver::new("zig", &["light"]));
    let service = service_with(&[driver]);
    let mut devices = service.devices();
    assert!(devices.current().is_empty());

    {
        let mut next = tokio_test::task::spawn(devices.changed());
        tokio_test::assert_pending!(next.poll());
    }

    pair(&service, &candidate("d1", "light")).await;
    let snapshot = devices.changed().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].uuid, "d1");
}

#[tokio::test]
async fn test_filtered_device_stream_skips_unrelated_changes() {
    let driver = Arc::new(MockDriver::new("zig", &["light", "sensor"]));
    let service = service_with(&[driver]);
    let mut sensors = std::pin::pin!(service.devices().matching(|d| d.device_class == "sensor"));
    assert!(sensors.next().await.unwrap().is_empty());

    pair(&service, &candidate("d1", "light")).await;
    pair(&service, &candidate("d2", "sensor")).await;
    let update = sensors.next().await.unwrap();
    assert_eq!(update.iter().map(|d| d.uuid.as_str()).collect::<Vec<_>>(), vec!["d2"]);

    service.remove_device("d1").await.unwrap();
    {
        let mut next = tokio_test::task::spawn(sensors.next());
        tokio_test::assert_pending!(next.poll());
    }

    service.remove_device("d2").await.unwrap();
    assert!(sensors.next().await.unwrap().is_empty());
}

// ── Removal ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_remove_endpoint() {
    let (service, _) = setup().await;
    let mut rx = service.subscribe();

    let endpoint = service.remove_endpoint("d1", "1").await.unwrap();

    assert_eq!(endpoint.uri, "/d1/ep/1");
    assert_eq!(
        drain(&mut rx)[0].kind,
        EventKind::EndpointRemoved {
            endpoint,
            device_uuid: "d1".into(),
            device_class: "light".into(),
        }
    );
    assert!(service.get_endpoint("d1", "1").is_none());
    assert!(matches!(
        service.remove_endpoint("d1", "1").await,
        Err(CoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_remove_device_notifies_driver() {
    let (service, driver) = setup().await;
    let mut rx = service.subscribe();

    let removed = service.remove_device("d2").await.unwrap();

    assert_eq!(removed.uuid, "d2");
    assert!(driver.calls().contains(&"removed:d2".to_owned()));
    assert_eq!(
        drain(&mut rx)[0].kind,
        EventKind::DeviceRemoved {
            uuid: "d2".into(),
            device_class: "light".into(),
        }
    );
    assert!(service.get_device("d2").is_none());
    assert!(matches!(service.remove_device("d2").await, Err(CoreError::NotFound { .. })));
}

// ── Zigbee channel ──────────────────────────────────────────────────

#[tokio::test]
async fn test_zigbee_channel_change() {
    let (service, _) = setup().await;
    let mut rx = service.subscribe();

    let err = service.change_zigbee_channel(5, false).await.unwrap_err();
    assert!(matches!(err, CoreError::ChannelChange(ChannelChangeError::InvalidChannel)));
    assert_eq!(err.code(), Some(102));

    assert_eq!(service.change_zigbee_channel(20, true).await.unwrap(), 20);
    assert!(drain(&mut rx).is_empty());

    assert_eq!(service.change_zigbee_channel(0, false).await.unwrap(), 15);
    assert_eq!(
        drain(&mut rx)[0].kind,
        EventKind::ZigbeeChannelChanged {
            channel_changed: true,
            current_channel: 15,
            targeted_channel: 0,
        }
    );

    let busy = service.change_zigbee_channel(13, false).await.unwrap_err();
    assert_eq!(busy.code(), Some(103));
}

#[tokio::test]
async fn test_zigbee_channel_change_needs_subsystem() {
    let service = DeviceService::new(Default::default(), homegate_core::DriverRegistry::new());
    let result = service.change_zigbee_channel(15, false).await;
    assert!(matches!(result, Err(CoreError::NotFound { .. })));
}
