use std::fmt;

use serde::Serialize;

/// Length of a hex-encoded 12-byte analysis id.
pub const OBJECT_ID_LEN: usize = 24;

/// Identifier of an analysis document: 12 bytes, hex-encoded, stored lower-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Accepts exactly 24 ASCII hex digits in either case. Anything else,
    /// including 12-byte binary strings, is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() != OBJECT_ID_LEN || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
