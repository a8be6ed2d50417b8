use serde::{Deserialize, Serialize};

/// A free-form key/value attached to a device or endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: String,
    pub uri: String,
    pub value: Option<String>,
}

impl Metadata {
    pub(crate) fn new(id: &str, uri: String, value: Option<String>) -> Self {
        Self {
            id: id.to_owned(),
            uri,
            value,
        }
    }
}

/// Upsert into an owned metadata list. Returns whether anything changed.
pub(crate) fn upsert(list: &mut Vec<Metadata>, id: &str, uri: String, value: Option<String>) -> bool {
    match list.iter_mut().find(|m| m.id == id) {
        Some(existing) if existing.value == value => false,
        Some(existing) => {
            existing.value = value;
            true
        }
        None => {
            list.push(Metadata::new(id, uri, value));
            true
        }
    }
}
