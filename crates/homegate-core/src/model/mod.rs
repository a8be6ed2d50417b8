// ── Domain model ──
//
// Devices own endpoints, resources and metadata outright. Every read
// the service hands out is an owned clone.

pub mod device;
pub mod endpoint;
pub mod found;
pub mod metadata;
pub mod resource;
pub mod uri;

pub use device::Device;
pub use endpoint::Endpoint;
pub use found::DeviceFoundDetails;
pub use metadata::Metadata;
pub use resource::{CachingPolicy, Resource, ResourceMode};
pub use uri::ParsedUri;
