// ── Resource domain type ──
//
// An addressable, typed value exposed by a device or endpoint. The mode
// bitmask gates every read, write and execute at the service boundary.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Common device-level resources populated from found-device details.
pub const RESOURCE_MANUFACTURER: &str = "manufacturer";
pub const RESOURCE_MODEL: &str = "model";
pub const RESOURCE_HARDWARE_VERSION: &str = "hardwareVersion";
pub const RESOURCE_FIRMWARE_VERSION: &str = "firmwareVersion";

pub const RESOURCE_TYPE_STRING: &str = "com.homegate.string";
pub const RESOURCE_TYPE_VERSION: &str = "com.homegate.version";

// ── ResourceMode ─────────────────────────────────────────────────────

bitflags::bitflags! {
    /// Access and behaviour flags of a resource. Serialized as the raw bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceMode: u8 {
        const READABLE = 1;
        const WRITEABLE = 1 << 1;
        const EXECUTABLE = 1 << 2;
        const DYNAMIC = 1 << 3;
        const DYNAMIC_CAPABLE = 1 << 4;
        const EMIT_EVENTS = 1 << 5;
        const LAZY_SAVE_NEXT = 1 << 6;
        /// Value must never be logged or exposed in clear. Cannot be cleared.
        const SENSITIVE = 1 << 7;
    }
}

impl ResourceMode {
    pub const fn is_readable(self) -> bool {
        self.contains(Self::READABLE)
    }

    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITEABLE)
    }

    pub const fn is_executable(self) -> bool {
        self.contains(Self::EXECUTABLE)
    }

    pub const fn is_sensitive(self) -> bool {
        self.contains(Self::SENSITIVE)
    }
}

impl Default for ResourceMode {
    fn default() -> Self {
        Self::empty()
    }
}

impl Serialize for ResourceMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for ResourceMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u8::deserialize(deserializer).map(Self::from_bits_retain)
    }
}

// ── CachingPolicy ────────────────────────────────────────────────────

/// Whether reads are served from the stored value or go to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachingPolicy {
    Never,
    #[default]
    Always,
}

// ── Resource ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub uri: String,
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub mode: ResourceMode,
    pub caching_policy: CachingPolicy,
    pub date_of_last_sync_millis: u64,
}

impl Resource {
    pub(crate) fn new(
        id: &str,
        uri: String,
        resource_type: &str,
        mode: ResourceMode,
    ) -> Self {
        Self {
            id: id.to_owned(),
            uri,
            value: None,
            resource_type: resource_type.to_owned(),
            mode,
            caching_policy: CachingPolicy::default(),
            date_of_last_sync_millis: 0,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_caching(mut self, caching_policy: CachingPolicy) -> Self {
        self.caching_policy = caching_policy;
        self
    }

    /// Store a fresh value and stamp the sync time. Returns whether the
    /// value changed.
    pub(crate) fn record_value(&mut self, value: Option<String>) -> bool {
        self.date_of_last_sync_millis = now_millis();
        if self.value == value {
            return false;
        }
        self.value = value;
        true
    }
}

pub(crate) fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
