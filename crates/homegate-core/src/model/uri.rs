// ── Entity URI scheme ──
//
// Every URI is a pure function of parent identity plus local id:
//
//   device    /<uuid>
//   endpoint  /<uuid>/ep/<endpoint>
//   resource  /<uuid>[/ep/<endpoint>]/r/<id>
//   metadata  /<uuid>[/ep/<endpoint>]/m/<id>

use regex::Regex;

use crate::error::CoreError;

const ENDPOINT_MARKER: &str = "ep";
const RESOURCE_MARKER: &str = "r";
const METADATA_MARKER: &str = "m";

pub fn device_uri(uuid: &str) -> String {
    format!("/{uuid}")
}

pub fn endpoint_uri(uuid: &str, endpoint_id: &str) -> String {
    format!("/{uuid}/{ENDPOINT_MARKER}/{endpoint_id}")
}

pub fn resource_uri(uuid: &str, endpoint_id: Option<&str>, id: &str) -> String {
    format!("{}/{RESOURCE_MARKER}/{id}", owner_uri(uuid, endpoint_id))
}

pub fn metadata_uri(uuid: &str, endpoint_id: Option<&str>, id: &str) -> String {
    format!("{}/{METADATA_MARKER}/{id}", owner_uri(uuid, endpoint_id))
}

fn owner_uri(uuid: &str, endpoint_id: Option<&str>) -> String {
    endpoint_id.map_or_else(|| device_uri(uuid), |ep| endpoint_uri(uuid, ep))
}

/// Compare a stored URI against its re-derived form (ASCII case-insensitive).
pub(crate) fn check_derived(stored: &str, derived: &str) -> Result<(), CoreError> {
    if stored.eq_ignore_ascii_case(derived) {
        Ok(())
    } else {
        Err(CoreError::Parse {
            message: format!("uri {stored} does not match derived uri {derived}"),
        })
    }
}

// ── Parsing ──────────────────────────────────────────────────────────

/// A URI broken back into the identity fields it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedUri {
    Device {
        uuid: String,
    },
    Endpoint {
        uuid: String,
        endpoint: String,
    },
    Resource {
        uuid: String,
        endpoint: Option<String>,
        id: String,
    },
    Metadata {
        uuid: String,
        endpoint: Option<String>,
        id: String,
    },
}

impl ParsedUri {
    pub fn device_uuid(&self) -> &str {
        match self {
            Self::Device { uuid }
            | Self::Endpoint { uuid, .. }
            | Self::Resource { uuid, .. }
            | Self::Metadata { uuid, .. } => uuid,
        }
    }

    pub fn endpoint_id(&self) -> Option<&str> {
        match self {
            Self::Device { .. } => None,
            Self::Endpoint { endpoint, .. } => Some(endpoint),
            Self::Resource { endpoint, .. } | Self::Metadata { endpoint, .. } => {
                endpoint.as_deref()
            }
        }
    }
}

pub fn parse(uri: &str) -> Result<ParsedUri, CoreError> {
    let invalid = || CoreError::invalid_argument(format!("malformed uri: {uri}"));

    let rest = uri.strip_prefix('/').ok_or_else(invalid)?;
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(invalid());
    }

    let owned = |s: &&str| (*s).to_owned();
    let parsed = match parts.as_slice() {
        [uuid] => ParsedUri::Device { uuid: owned(uuid) },
        [uuid, ENDPOINT_MARKER, ep] => ParsedUri::Endpoint {
            uuid: owned(uuid),
            endpoint: owned(ep),
        },
        [uuid, RESOURCE_MARKER, id] => ParsedUri::Resource {
            uuid: owned(uuid),
            endpoint: None,
            id: owned(id),
        },
        [uuid, METADATA_MARKER, id] => ParsedUri::Metadata {
            uuid: owned(uuid),
            endpoint: None,
            id: owned(id),
        },
        [uuid, ENDPOINT_MARKER, ep, RESOURCE_MARKER, id] => ParsedUri::Resource {
            uuid: owned(uuid),
            endpoint: Some(owned(ep)),
            id: owned(id),
        },
        [uuid, ENDPOINT_MARKER, ep, METADATA_MARKER, id] => ParsedUri::Metadata {
            uuid: owned(uuid),
            endpoint: Some(owned(ep)),
            id: owned(id),
        },
        _ => return Err(invalid()),
    };
    Ok(parsed)
}

// ── Wildcard patterns ────────────────────────────────────────────────

pub(crate) fn is_pattern(uri: &str) -> bool {
    uri.contains('*')
}

/// Compile a `*`-wildcard URI pattern into an anchored regex. Everything
/// other than `*` matches literally.
pub fn pattern_regex(pattern: &str) -> Result<Regex, CoreError> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$"))
        .map_err(|e| CoreError::invalid_argument(format!("bad uri pattern {pattern}: {e}")))
}
