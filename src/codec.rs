//! Opaque payload encoding.
//!
//! Workflow inputs and step outputs are stored as JSON text. The store never
//! looks inside a payload; callers pick the shape.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;

/// Serialized workflow input or step output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Payload(String);

impl Payload {
    /// Serialize any `serde` value into a payload.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self(serde_json::to_string(value)?))
    }

    /// Deserialize the payload into the caller's type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.0)?)
    }

    /// Wrap text that was already serialized (e.g. read back from storage).
    pub fn from_raw(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
