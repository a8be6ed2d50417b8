//! Device discovery, commissioning and device model for the homegate
//! smart-home gateway.
//!
//! - **[`DeviceService`]**: the facade. Starts and stops discovery
//!   sessions per device class, accepts or rejects candidates against
//!   discovery filters, configures accepted candidates into [`Device`]s,
//!   and exposes the resource and metadata surface. All mutation
//!   serializes on one orchestrator lock; each transition emits a typed
//!   [`ServiceEvent`] to every subscriber before the lock is released.
//!
//! - **[`StateMachine`]**: a small append-only FSM with per-state exit
//!   guards and notifications. Every discovery session runs one.
//!
//! - **[`DeviceStore`]**: `DashMap`-backed storage with `watch` snapshots,
//!   vended to consumers as a [`DeviceStream`].
//!
//! - **Collaborators** ([`driver`]): [`DeviceDriver`], [`Subsystem`] and
//!   [`Commissioner`] are implemented by the protocol layers (zigbee,
//!   matter, ...) and registered in a [`DriverRegistry`].
//!
//! - **Status** ([`ServiceStatus`]): the JSON snapshot of discovery state,
//!   readiness and per-subsystem fragments.

pub mod config;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod event;
pub mod fsm;
pub mod model;
pub mod service;
pub mod status;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{Readiness, ServiceConfig};
pub use discovery::{DiscoveryFilter, SessionState};
pub use driver::{Commissioner, CommissioningInfo, DeviceDriver, DriverError, DriverRegistry, Subsystem};
pub use error::{ChannelChangeError, CoreError};
pub use event::{DiscoveryType, EventKind, ServiceEvent, StatusChangeReason};
pub use fsm::{StateHooks, StateMachine, TransitionError};
pub use service::DeviceService;
pub use status::ServiceStatus;
pub use store::DeviceStore;
pub use stream::DeviceStream;

pub use model::{
    CachingPolicy, Device, DeviceFoundDetails, Endpoint, Metadata, ParsedUri, Resource, ResourceMode,
};
