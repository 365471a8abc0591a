//! JSON encoding helpers.
//!
//! Byte fields may arrive either as base64 text or as already-decoded bytes
//! (a JSON array of numbers, or an index-keyed object as produced by serializing
//! a typed array). [`deserialize_bytes`] accepts all of them, so the rest of the
//! code only ever sees `Vec<u8>`. On output, bytes are always base64.

use {
    base64::{Engine, prelude::BASE64_STANDARD},
    serde::{
        Deserializer, Serialize,
        de::{self, MapAccess, SeqAccess, Visitor},
    },
    std::fmt,
};

/// Serializes `value` as compact JSON with object keys in sorted order.
///
/// Structs keep their field order; maps (including `serde_json::Value` objects)
/// are sorted, so the output is stable for a given value.
#[inline]
pub fn to_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_vec(&value)
}

#[inline]
pub fn deserialize_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    deserializer.deserialize_any(BytesVisitor)
}

struct BytesVisitor;

impl<'de> Visitor<'de> for BytesVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "base64 string or byte array")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        BASE64_STANDARD.decode(v).map_err(E::custom)
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(v.to_vec())
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(bytes)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut indexed = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((index, byte)) = map.next_entry::<String, u8>()? {
            let index: usize = index
                .parse()
                .map_err(|err| de::Error::custom(format!("invalid byte index `{index}`: {err}")))?;
            indexed.push((index, byte));
        }
        indexed.sort_unstable_by_key(|&(index, _)| index);
        for (expected, &(index, _)) in indexed.iter().enumerate() {
            if index != expected {
                return Err(de::Error::custom(format!(
                    "byte index {expected} is missing"
                )));
            }
        }
        Ok(indexed.into_iter().map(|(_, byte)| byte).collect())
    }
}

/// `#[serde(with = "base64_bytes")]` for `Vec<u8>` fields.
pub mod base64_bytes {
    use {
        base64::{Engine, prelude::BASE64_STANDARD},
        serde::{Deserializer, Serializer},
    };

    #[inline]
    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(value))
    }

    #[inline]
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        super::deserialize_bytes(deserializer)
    }
}
