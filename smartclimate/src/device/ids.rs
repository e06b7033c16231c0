//! Device identifiers.

use serde::{Deserialize, Serialize};

/// Stable identifier of the physical device.
///
/// This is the only key thermal state is stored and looked up under. It does
/// not change when the controlling entity is renamed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysicalId(String);

impl PhysicalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-name-safe form of the identifier.
    ///
    /// ASCII letters, digits and `-` pass through; every other byte is
    /// percent-encoded (`%3A`), so distinct identifiers never share a stem
    /// and the result is never a hidden or relative path. The empty
    /// identifier maps to `_`, which no other identifier can produce.
    pub fn file_stem(&self) -> String {
        if self.0.is_empty() {
            return "_".to_string();
        }
        let mut stem = String::with_capacity(self.0.len());
        for byte in self.0.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                stem.push(byte as char);
            } else {
                stem.push_str(&format!("%{:02X}", byte));
            }
        }
        stem
    }
}

impl std::fmt::Display for PhysicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PhysicalId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PhysicalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Display identifier of the controlling entity (a label only).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayId(String);

impl DisplayId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DisplayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
