//! Built-in serializers for raw bytes and UTF-8 strings.

use std::str;

use crate::error::{Error, Result};
use crate::serializer::traits::Serializer;

/// Identity serializer for raw byte vectors.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytesSerializer;

impl Serializer<Vec<u8>> for BytesSerializer {
    fn serialize(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &'static str {
        "bytes"
    }
}

/// UTF-8 serializer for strings.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringSerializer;

impl Serializer<String> for StringSerializer {
    fn serialize(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<String> {
        str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| Error::Deserialize {
                type_name: "String",
                reason: e.to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "string"
    }
}
