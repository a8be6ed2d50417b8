// ── Core error types ──
//
// Caller-facing errors from homegate-core. Driver failures and FSM
// transition failures are translated into domain variants here so
// consumers only ever match on `CoreError`.

use thiserror::Error;

use crate::driver::DriverError;

/// Client-visible code for a read on a non-readable resource.
pub const RESOURCE_NOT_READABLE_CODE: u32 = 1;
/// Client-visible code for a write on a non-writable resource.
pub const RESOURCE_NOT_WRITABLE_CODE: u32 = 2;
/// Client-visible code for executing a non-executable resource.
pub const RESOURCE_NOT_EXECUTABLE_CODE: u32 = 3;
/// Client-visible code for metadata that cannot be reached.
pub const METADATA_NOT_ACCESSIBLE_CODE: u32 = 200;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Argument errors ──────────────────────────────────────────────
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Entity not found: {entity_type} with id {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    // ── Resource access errors ───────────────────────────────────────
    #[error("Resource is not readable: {uri}")]
    ResourceNotReadable { uri: String },

    #[error("Resource is not writable: {uri}")]
    ResourceNotWritable { uri: String },

    #[error("Resource is not executable: {uri}")]
    ResourceNotExecutable { uri: String },

    #[error("Metadata is not accessible: {uri}")]
    MetadataNotAccessible { uri: String },

    // ── Session / state machine errors ───────────────────────────────
    #[error("Transition {from} -> {to} vetoed for session {session}")]
    TransitionFailed {
        session: String,
        from: String,
        to: String,
    },

    #[error("Invalid target state {state} for session {session}")]
    InvalidState { session: String, state: String },

    #[error("Session {session} is busy")]
    SessionBusy { session: String },

    #[error("Configuration of device {uuid} failed: {reason}")]
    ConfigurationFailed { uuid: String, reason: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Channel change failed: {0}")]
    ChannelChange(#[from] ChannelChangeError),

    // ── Collaborator errors ──────────────────────────────────────────
    #[error("Operation not supported: {operation} (requires {required})")]
    Unsupported { operation: String, required: String },

    #[error("Driver {driver} failed: {message}")]
    Driver { driver: String, message: String },
}

impl CoreError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn not_found(entity_type: &str, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            identifier: identifier.into(),
        }
    }

    pub(crate) fn driver(driver: &str, err: &DriverError) -> Self {
        Self::Driver {
            driver: driver.into(),
            message: err.to_string(),
        }
    }

    /// Stable numeric code for client bindings, where one is defined.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::ResourceNotReadable { .. } => Some(RESOURCE_NOT_READABLE_CODE),
            Self::ResourceNotWritable { .. } => Some(RESOURCE_NOT_WRITABLE_CODE),
            Self::ResourceNotExecutable { .. } => Some(RESOURCE_NOT_EXECUTABLE_CODE),
            Self::MetadataNotAccessible { .. } => Some(METADATA_NOT_ACCESSIBLE_CODE),
            Self::ChannelChange(err) => Some(err.code()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            message: err.to_string(),
        }
    }
}

// ── Zigbee channel change ────────────────────────────────────────────

/// Failure reasons for a zigbee channel change, each with a distinct code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelChangeError {
    #[error("channel change failed")]
    Failed,
    #[error("channel change not allowed")]
    NotAllowed,
    #[error("invalid channel")]
    InvalidChannel,
    #[error("channel change already in progress")]
    InProgress,
    #[error("unable to calculate a channel")]
    UnableToCalculate,
}

impl ChannelChangeError {
    pub fn code(self) -> u32 {
        match self {
            Self::Failed => 100,
            Self::NotAllowed => 101,
            Self::InvalidChannel => 102,
            Self::InProgress => 103,
            Self::UnableToCalculate => 104,
        }
    }
}
