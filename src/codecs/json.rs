//! JSON Serializer using `serde_json`

use crate::traits::CacheSerializer;
use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// JSON Serializer using `serde_json`
///
/// Default serializer of the multi-level cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl CacheSerializer for JsonSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn deserialize<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        Ok(serde_json::from_str(text)?)
    }

    fn name(&self) -> &'static str {
        "serde_json"
    }
}
