//! Byte strings that keep their native shape in every codec.
//!
//! Textual formats (JSON) carry a [`BinaryString`] as standard base64; binary
//! formats (CBOR) carry it as a byte string. The choice follows the
//! serializer's `is_human_readable()` flag.

use std::fmt;
use std::ops::Deref;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BinaryString(pub Vec<u8>);

impl BinaryString {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for BinaryString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BinaryString({})", STANDARD.encode(&self.0))
    }
}

impl Deref for BinaryString {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for BinaryString {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for BinaryString {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for BinaryString {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for BinaryString {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl Serialize for BinaryString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&STANDARD.encode(&self.0))
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for BinaryString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(BinaryVisitor)
        } else {
            deserializer.deserialize_byte_buf(BinaryVisitor)
        }
    }
}

struct BinaryVisitor;

impl<'de> Visitor<'de> for BinaryVisitor {
    type Value = BinaryString;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a byte string or a base64 encoded string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        STANDARD
            .decode(v)
            .map(BinaryString)
            .map_err(|e| E::custom(format!("invalid base64: {e}")))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(BinaryString(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(BinaryString(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(b) = seq.next_element::<u8>()? {
            bytes.push(b);
        }
        Ok(BinaryString(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_uses_standard_base64() {
        let b = BinaryString::from("auxblob");
        assert_eq!(serde_json::to_string(&b).unwrap(), "\"YXV4YmxvYg==\"");

        let back: BinaryString = serde_json::from_str("\"YXV4YmxvYg==\"").unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn cbor_uses_byte_string() {
        let b = BinaryString::new(vec![0xde, 0xad]);
        let mut buf = Vec::new();
        ciborium::into_writer(&b, &mut buf).unwrap();
        // major type 2 (byte string), length 2
        assert_eq!(buf, vec![0x42, 0xde, 0xad]);
    }

    #[test]
    fn rejects_bad_base64() {
        let err = serde_json::from_str::<BinaryString>("\"not base64!\"").unwrap_err();
        assert!(err.to_string().contains("invalid base64"));
    }
}
