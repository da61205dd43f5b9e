//! Conceptual Message Wrapper (CMW) collections
//!
//! A [`Collection`] merges independently typed evidence items under string
//! labels. In JSON a collection is an object carrying its kind in the
//! `__cmwc_t` member, and each [`Monad`] item is the record
//! `["<media-type>", "<base64url value>"]`, optionally followed by a numeric
//! content indicator. Item order is insertion order.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{Result, TokenError};

/// Member name that carries a collection's kind
pub const COLLECTION_TYPE_KEY: &str = "__cmwc_t";

/// A single typed evidence item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monad {
    media_type: String,
    value: Vec<u8>,
    indicator: Option<u64>,
}

impl Monad {
    pub fn new(media_type: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            media_type: media_type.into(),
            value: value.into(),
            indicator: None,
        }
    }

    pub fn with_indicator(mut self, indicator: u64) -> Self {
        self.indicator = Some(indicator);
        self
    }

    /// The content indicator bitmap, when the record carries one
    pub fn indicator(&self) -> Option<u64> {
        self.indicator
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// Either a monad or a nested collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmw {
    Monad(Monad),
    Collection(Collection),
}

impl Cmw {
    pub fn as_monad(&self) -> Option<&Monad> {
        match self {
            Cmw::Monad(m) => Some(m),
            Cmw::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Cmw::Collection(c) => Some(c),
            Cmw::Monad(_) => None,
        }
    }
}

impl From<Monad> for Cmw {
    fn from(m: Monad) -> Self {
        Cmw::Monad(m)
    }
}

impl From<Collection> for Cmw {
    fn from(c: Collection) -> Self {
        Cmw::Collection(c)
    }
}

/// Ordered, labelled set of CMW items
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    kind: String,
    items: Vec<(String, Cmw)>,
}

impl Collection {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            items: Vec::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Append an item. Labels are unique within a collection.
    pub fn add_item(&mut self, label: impl Into<String>, item: impl Into<Cmw>) -> Result<()> {
        let label = label.into();
        if label.is_empty() || label == COLLECTION_TYPE_KEY {
            return Err(TokenError::InvalidCmw(format!(
                "reserved or empty label {label:?}"
            )));
        }
        if self.get(&label).is_some() {
            return Err(TokenError::DuplicateLabel(label));
        }
        self.items.push((label, item.into()));
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Cmw> {
        self.items
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, item)| item)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(l, _)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

impl Serialize for Monad {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = if self.indicator.is_some() { 3 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.media_type)?;
        seq.serialize_element(&URL_SAFE_NO_PAD.encode(&self.value))?;
        if let Some(indicator) = self.indicator {
            seq.serialize_element(&indicator)?;
        }
        seq.end()
    }
}

impl Serialize for Cmw {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Cmw::Monad(m) => m.serialize(serializer),
            Cmw::Collection(c) => c.serialize(serializer),
        }
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.items.len() + 1))?;
        map.serialize_entry(COLLECTION_TYPE_KEY, &self.kind)?;
        for (label, item) in &self.items {
            map.serialize_entry(label, item)?;
        }
        map.end()
    }
}

fn monad_from_seq<'de, A: SeqAccess<'de>>(mut seq: A) -> std::result::Result<Monad, A::Error> {
    let media_type: String = seq
        .next_element()?
        .ok_or_else(|| <A::Error as de::Error>::invalid_length(0, &"a [type, value] record"))?;
    let encoded: String = seq
        .next_element()?
        .ok_or_else(|| <A::Error as de::Error>::invalid_length(1, &"a [type, value] record"))?;
    let indicator: Option<u64> = seq.next_element()?;
    if seq.next_element::<IgnoredAny>()?.is_some() {
        return Err(<A::Error as de::Error>::custom(
            "CMW record has too many elements",
        ));
    }

    let value = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|e| <A::Error as de::Error>::custom(format!("invalid CMW value encoding: {e}")))?;
    Ok(Monad {
        media_type,
        value,
        indicator,
    })
}

fn collection_from_map<'de, A: MapAccess<'de>>(
    mut map: A,
) -> std::result::Result<Collection, A::Error> {
    let mut kind: Option<String> = None;
    let mut collection = Collection::default();
    while let Some(label) = map.next_key::<String>()? {
        if label == COLLECTION_TYPE_KEY {
            if kind.is_some() {
                return Err(<A::Error as de::Error>::duplicate_field(COLLECTION_TYPE_KEY));
            }
            kind = Some(map.next_value()?);
            continue;
        }
        let item: Cmw = map.next_value()?;
        collection
            .add_item(label, item)
            .map_err(<A::Error as de::Error>::custom)?;
    }

    collection.kind =
        kind.ok_or_else(|| <A::Error as de::Error>::missing_field(COLLECTION_TYPE_KEY))?;
    Ok(collection)
}

struct MonadVisitor;

impl<'de> Visitor<'de> for MonadVisitor {
    type Value = Monad;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a CMW record")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> std::result::Result<Monad, A::Error> {
        monad_from_seq(seq)
    }
}

struct CollectionVisitor;

impl<'de> Visitor<'de> for CollectionVisitor {
    type Value = Collection;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a CMW collection")
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> std::result::Result<Collection, A::Error> {
        collection_from_map(map)
    }
}

struct CmwVisitor;

impl<'de> Visitor<'de> for CmwVisitor {
    type Value = Cmw;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a CMW record or collection")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> std::result::Result<Cmw, A::Error> {
        monad_from_seq(seq).map(Cmw::Monad)
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> std::result::Result<Cmw, A::Error> {
        collection_from_map(map).map(Cmw::Collection)
    }
}

impl<'de> Deserialize<'de> for Monad {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_seq(MonadVisitor)
    }
}

impl<'de> Deserialize<'de> for Collection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(CollectionVisitor)
    }
}

impl<'de> Deserialize<'de> for Cmw {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(CmwVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KIND: &str = "tag:github.com,2025:veraison/ratsd/cmw";

    #[test]
    fn monad_is_a_two_element_record() {
        let m = Monad::new("application/test", b"hello".to_vec());
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"["application/test","aGVsbG8"]"#);
    }

    #[test]
    fn collection_keeps_insertion_order() {
        let mut c = Collection::new(KIND);
        c.add_item("zeta", Monad::new("a/z", b"z".to_vec())).unwrap();
        c.add_item("alpha", Monad::new("a/a", b"a".to_vec())).unwrap();

        let json = String::from_utf8(c.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            format!(r#"{{"__cmwc_t":"{KIND}","zeta":["a/z","eg"],"alpha":["a/a","YQ"]}}"#)
        );

        let decoded = Collection::from_json(json.as_bytes()).unwrap();
        assert_eq!(decoded.labels().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        assert_eq!(decoded, c);
    }

    #[test]
    fn duplicate_label_is_rejected() {
        let mut c = Collection::new(KIND);
        c.add_item("tsm", Monad::new("a/b", vec![1])).unwrap();
        let err = c.add_item("tsm", Monad::new("a/b", vec![2])).unwrap_err();
        assert!(matches!(err, TokenError::DuplicateLabel(l) if l == "tsm"));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn reserved_label_is_rejected() {
        let mut c = Collection::new(KIND);
        assert!(c
            .add_item(COLLECTION_TYPE_KEY, Monad::new("a/b", vec![1]))
            .is_err());
        assert!(c.add_item("", Monad::new("a/b", vec![1])).is_err());
    }

    #[test]
    fn decodes_nested_collections_and_indicators() {
        let json = br#"{
            "__cmwc_t": "outer",
            "inner": {"__cmwc_t": "inner-kind", "x": ["a/x", "AQI", 4]},
            "plain": ["a/p", "AA"]
        }"#;

        let c = Collection::from_json(json).unwrap();
        assert_eq!(c.kind(), "outer");

        let inner = c.get("inner").and_then(Cmw::as_collection).unwrap();
        assert_eq!(inner.kind(), "inner-kind");
        let x = inner.get("x").and_then(Cmw::as_monad).unwrap();
        assert_eq!(x.media_type(), "a/x");
        assert_eq!(x.value(), &[1, 2]);
        assert_eq!(x.indicator(), Some(4));

        let plain = c.get("plain").and_then(Cmw::as_monad).unwrap();
        assert_eq!(plain.value(), &[0]);
        assert_eq!(plain.indicator(), None);
    }

    #[test]
    fn indicator_survives_reencoding() {
        let json = br#"{"__cmwc_t":"k","x":["a/x","AQI",4],"y":["a/y","AA"]}"#;
        let c = Collection::from_json(json).unwrap();
        assert_eq!(c.to_json().unwrap(), json.to_vec());

        let m = Monad::new("a/b", vec![1]).with_indicator(2);
        assert_eq!(serde_json::to_string(&m).unwrap(), r#"["a/b","AQ",2]"#);
    }

    #[test]
    fn collection_kind_is_required_once() {
        let err = Collection::from_json(br#"{"x": ["a/x", "AA"]}"#).unwrap_err();
        assert!(err.to_string().contains("__cmwc_t"), "{err}");

        let err = Collection::from_json(br#"{"__cmwc_t": "a", "__cmwc_t": "b"}"#).unwrap_err();
        assert!(err.to_string().contains("__cmwc_t"), "{err}");

        let nested = br#"{"__cmwc_t": "outer", "inner": {"x": ["a/x", "AA"]}}"#;
        assert!(Collection::from_json(nested).is_err());
    }

    #[test]
    fn malformed_records_fail() {
        assert!(Collection::from_json(br#"{"a": ["only-type"]}"#).is_err());
        assert!(Collection::from_json(br#"{"a": ["t", "AA", 1, 2]}"#).is_err());
        assert!(Collection::from_json(br#"{"a": ["t", "!!"]}"#).is_err());
        assert!(Collection::from_json(br#"["t", "AA"]"#).is_err());
    }
}
