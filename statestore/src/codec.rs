//! JSON payload encoding for actor state.
//!
//! The document store rejects empty strings and empty binary values anywhere in
//! a payload, so encoding replaces them with reserved placeholders and decoding
//! puts the empty values back. Substitution works on the serde data model, so
//! it reaches every string and byte sequence regardless of nesting: struct
//! fields, sequence and set elements, map values, enum payloads.
//!
//! Byte sequences are stored as base64 text. They are only recognised as such
//! when the state type serializes them as bytes and reads base64 text back,
//! which is what [`Binary`](crate::binary::Binary) does. A plain `Vec<u8>` is a
//! sequence of integers to serde and is stored as one.
//!
//! Struct fields serializing to `null` are left out of the payload. Sequence
//! elements and map values that are `null` are kept.

use std::sync::LazyLock;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{
    Deserialize, Serialize,
    de::DeserializeOwned,
    ser::{self, Error as _},
};
use serde_json::{Map, Value};

// Do not change these placeholder values. They are persisted in place of empty
// string and byte values, and collision with genuine data is an accepted risk.
pub const EMPTY_STRING_PLACEHOLDER: &str = "OrbitEmptyString.2f748e4e-c8ef-4129-8dbc-206fe8e72e64";
pub const EMPTY_BYTES_PLACEHOLDER: &[u8] =
    b"OrbitEmptyByteArray.a643e4a1-96dc-45b3-9606-479bae6bb3f2";

static EMPTY_BYTES_TEXT: LazyLock<String> = LazyLock::new(|| STANDARD.encode(EMPTY_BYTES_PLACEHOLDER));

type Result<T, E = serde_json::Error> = std::result::Result<T, E>;

/// Stored text of [`EMPTY_BYTES_PLACEHOLDER`], i.e. its base64 encoding.
pub fn empty_bytes_placeholder_text() -> &'static str {
    EMPTY_BYTES_TEXT.as_str()
}

/// Encode `state` into a payload value with placeholders applied.
pub fn encode<S: Serialize + ?Sized>(state: &S) -> Result<Value> {
    state.serialize(PayloadSerializer)
}

/// Encode `state` into payload text.
pub fn encode_to_string<S: Serialize + ?Sized>(state: &S) -> Result<String> {
    serde_json::to_string(&encode(state)?)
}

/// Decode payload text into a fresh value.
pub fn decode<S: DeserializeOwned>(payload: &str) -> Result<S> {
    let mut value: Value = serde_json::from_str(payload)?;
    restore(&mut value);

    serde_json::from_value(value)
}

/// Apply payload text onto an existing state object.
///
/// Top-level fields present in the payload replace the fields of `target`,
/// fields absent from it keep their current value. The result is written in
/// place, so fields that never deserialize (`#[serde(skip)]`) are not touched
/// for types deriving `Deserialize`; hand-written impls without in-place
/// support replace the whole value. `target` is left untouched unless the
/// whole decode succeeds.
pub fn decode_into<S>(payload: &str, target: &mut S) -> Result<()>
where
    S: Serialize + DeserializeOwned,
{
    let stored: Value = serde_json::from_str(payload)?;

    let mut merged = match (encode(&*target)?, stored) {
        (Value::Object(mut current), Value::Object(stored)) => {
            current.extend(stored);
            Value::Object(current)
        }
        (_, stored) => stored,
    };
    restore(&mut merged);

    // Dry run first; in-place decoding may stop halfway through `target`.
    S::deserialize(&merged)?;
    S::deserialize_in_place(merged, target)
}

/// Replace placeholders in a decoded payload tree with the empty values they stand for.
pub fn restore(value: &mut Value) {
    match value {
        Value::String(s) if s == EMPTY_STRING_PLACEHOLDER || *s == *EMPTY_BYTES_TEXT => {
            s.clear()
        }
        Value::Array(items) => items.iter_mut().for_each(restore),
        Value::Object(map) => map.values_mut().for_each(restore),
        _ => {}
    }
}

fn map_key<T: Serialize + ?Sized>(key: &T) -> Result<String> {
    match serde_json::to_value(key)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde_json::Error::custom(format!(
            "map key must be a string, found {other}"
        ))),
    }
}

struct PayloadSerializer;

struct SerializeVec {
    vec: Vec<Value>,
}

struct SerializeTupleVariant {
    variant: &'static str,
    vec: Vec<Value>,
}

struct SerializeMap {
    map: Map<String, Value>,
    next_key: Option<String>,
}

struct SerializeStruct {
    map: Map<String, Value>,
}

struct SerializeStructVariant {
    variant: &'static str,
    map: Map<String, Value>,
}

// Implementations

impl ser::Serializer for PayloadSerializer {
    type Ok = Value;
    type Error = serde_json::Error;

    type SerializeSeq = SerializeVec;
    type SerializeTuple = SerializeVec;
    type SerializeTupleStruct = SerializeVec;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeStruct;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> Result<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_char(self, v: char) -> Result<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value> {
        if v.is_empty() {
            Ok(Value::String(EMPTY_STRING_PLACEHOLDER.to_string()))
        } else {
            Ok(Value::String(v.to_string()))
        }
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value> {
        if v.is_empty() {
            Ok(Value::String(EMPTY_BYTES_TEXT.clone()))
        } else {
            Ok(Value::String(STANDARD.encode(v)))
        }
    }

    fn serialize_none(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T>(self, value: &T) -> Result<Value>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Value>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value>
    where
        T: ?Sized + Serialize,
    {
        let mut map = Map::new();
        map.insert(variant.to_string(), value.serialize(PayloadSerializer)?);

        Ok(Value::Object(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeVec> {
        Ok(SerializeVec {
            vec: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SerializeVec> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SerializeVec> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SerializeTupleVariant> {
        Ok(SerializeTupleVariant {
            variant,
            vec: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<SerializeMap> {
        Ok(SerializeMap {
            map: Map::new(),
            next_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<SerializeStruct> {
        Ok(SerializeStruct { map: Map::new() })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<SerializeStructVariant> {
        Ok(SerializeStructVariant {
            variant,
            map: Map::new(),
        })
    }
}

impl ser::SerializeSeq for SerializeVec {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.vec.push(value.serialize(PayloadSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Array(self.vec))
    }
}

impl ser::SerializeTuple for SerializeVec {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SerializeVec {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.vec.push(value.serialize(PayloadSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        let mut map = Map::new();
        map.insert(self.variant.to_string(), Value::Array(self.vec));

        Ok(Value::Object(map))
    }
}

impl ser::SerializeMap for SerializeMap {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        // Keys are attribute names, not values; they pass through unchanged.
        self.next_key = Some(map_key(key)?);
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| serde_json::Error::custom("serialize_value called before serialize_key"))?;

        self.map.insert(key, value.serialize(PayloadSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Object(self.map))
    }
}

impl ser::SerializeStruct for SerializeStruct {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let value = value.serialize(PayloadSerializer)?;
        if !value.is_null() {
            self.map.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Object(self.map))
    }
}

impl ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let value = value.serialize(PayloadSerializer)?;
        if !value.is_null() {
            self.map.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn end(self) -> Result<Value> {
        let mut outer = Map::new();
        outer.insert(self.variant.to_string(), Value::Object(self.map));

        Ok(Value::Object(outer))
    }
}
