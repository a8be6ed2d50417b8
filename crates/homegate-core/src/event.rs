// ── Service events ──
//
// One immutable, typed record per lifecycle transition. Events are
// queued to every subscriber from inside the mutating call, while the
// orchestrator lock is held, so every receiver sees transition order.
// Subscriber queues are unbounded: a slow reader never loses events.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::model::{DeviceFoundDetails, Endpoint, Metadata, Resource};
use crate::status::ServiceStatus;

/// Kind of session a candidate was reported in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DiscoveryType {
    #[default]
    None,
    Discovery,
    Recovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusChangeReason {
    Readiness,
}

/// An event with its sequence number and emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEvent {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl ServiceEvent {
    /// Wire name of the event (`discovery-started`, ...).
    pub fn name(&self) -> &'static str {
        (&self.kind).into()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EventKind {
    // ── Session lifecycle ──
    DiscoveryStarted {
        device_classes: Vec<String>,
        timeout: u16,
    },
    RecoveryStarted {
        device_classes: Vec<String>,
        timeout: u16,
    },
    DiscoveryStopped {
        device_class: String,
    },
    RecoveryStopped {
        device_class: String,
    },

    // ── Candidates ──
    DeviceDiscovered {
        details: DeviceFoundDetails,
        session_discovery_type: DiscoveryType,
    },
    DeviceRejected {
        details: DeviceFoundDetails,
        session_discovery_type: DiscoveryType,
    },
    DeviceConfigurationStarted {
        uuid: String,
        device_class: String,
        session_discovery_type: DiscoveryType,
    },
    DeviceConfigurationCompleted {
        uuid: String,
        device_class: String,
        session_discovery_type: DiscoveryType,
    },
    DeviceConfigurationFailed {
        uuid: String,
        device_class: String,
        session_discovery_type: DiscoveryType,
    },
    DeviceAdded {
        uuid: String,
        uri: String,
        device_class: String,
        device_class_version: u8,
    },
    DeviceRecovered {
        uuid: String,
        uri: String,
        device_class: String,
        device_class_version: u8,
    },

    // ── Device model ──
    DeviceRemoved {
        uuid: String,
        device_class: String,
    },
    EndpointRemoved {
        endpoint: Endpoint,
        device_uuid: String,
        device_class: String,
    },
    ResourceUpdated {
        resource: Resource,
        metadata: Option<String>,
    },
    MetadataUpdated {
        metadata: Metadata,
    },

    // ── Subsystems / status ──
    ZigbeeChannelChanged {
        channel_changed: bool,
        current_channel: u8,
        targeted_channel: u8,
    },
    StatusChanged {
        status: ServiceStatus,
        reason: StatusChangeReason,
    },
}

// ── EventBus ─────────────────────────────────────────────────────────

/// Observer list of per-subscriber queues, keyed by subscription id.
/// Closed queues are pruned on the next emit.
pub(crate) struct EventBus {
    subscribers: DashMap<u64, mpsc::UnboundedSender<Arc<ServiceEvent>>>,
    next_id: AtomicU64,
    next_subscriber: AtomicU64,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            next_subscriber: AtomicU64::new(1),
        }
    }

    pub(crate) fn emit(&self, kind: EventKind) {
        let event = Arc::new(ServiceEvent {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            kind,
        });
        debug!(
            event = event.name(),
            id = event.id,
            subscribers = self.subscriber_count(),
            "emitting event"
        );
        self.subscribers.retain(|subscriber, tx| {
            let open = tx.send(Arc::clone(&event)).is_ok();
            if !open {
                debug!(subscriber, "dropping closed event subscriber");
            }
            open
        });
    }

    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<Arc<ServiceEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, tx);
        rx
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn discovery_started_uses_wire_names() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(EventKind::DiscoveryStarted {
            device_classes: vec!["sensor".into()],
            timeout: 30,
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.name(), "discovery-started");
        let json = serde_json::to_value(&*event).unwrap();
        assert_eq!(json["type"], "discovery-started");
        assert_eq!(json["device-classes"][0], "sensor");
        assert_eq!(json["timeout"], 30);
    }

    #[test]
    fn ids_increase_in_emission_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(EventKind::DiscoveryStopped { device_class: "a".into() });
        bus.emit(EventKind::RecoveryStopped { device_class: "b".into() });
        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert!(first.id < second.id);
        assert_eq!(second.name(), "recovery-stopped");
    }

    #[test]
    fn candidate_events_carry_discovery_type() {
        let kind = EventKind::DeviceRejected {
            details: DeviceFoundDetails::new("abc", "sensor", "drv"),
            session_discovery_type: DiscoveryType::Recovery,
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["session-discovery-type"], "recovery");
        assert_eq!(json["details"]["device-class"], "sensor");
    }

    #[test]
    fn emitting_without_receivers_is_harmless() {
        let bus = EventBus::new();
        bus.emit(EventKind::DeviceRemoved {
            uuid: "x".into(),
            device_class: "light".into(),
        });
    }

    #[test]
    fn unread_subscriber_keeps_every_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        for n in 0..1_000 {
            bus.emit(EventKind::DiscoveryStopped {
                device_class: format!("class{n}"),
            });
        }

        let mut seen = 0;
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.id, seen + 1);
            seen += 1;
        }
        assert_eq!(seen, 1_000);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(EventKind::DiscoveryStopped { device_class: "a".into() });
        assert_eq!(bus.subscriber_count(), 1);
        drop(kept);
    }
}
