//! Serialization of record payloads to and from stored text.
//!
//! The store never interprets inputs or outputs; it only needs them to
//! round-trip through a text column. Dedup compares the encoded text, so a
//! codec should produce the same text for equal values.

use serde::Serialize;
use serde::ser::{self, Error as _};
use serde_json::Value;

use crate::error::Result;

/// Encodes payloads into the text stored in the table and back.
pub trait Codec {
    fn encode(&self, value: &Value) -> Result<String>;
    fn decode(&self, text: &str) -> Result<Value>;
}

/// Compact JSON. Object keys come out sorted, so equal values encode to
/// identical text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, text: &str) -> Result<Value> {
        Ok(serde_json::from_str(text)?)
    }
}

// ---------------------------------------------------------------------------
// Finite-number check
// ---------------------------------------------------------------------------

/// Reject NaN and infinities anywhere in `value`.
///
/// serde_json writes non-finite floats as `null` instead of failing, so a
/// payload carrying one would be stored as something else.
pub fn ensure_finite<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    value.serialize(FiniteCheck)?;
    Ok(())
}

/// Serializer that discards everything except non-finite floats.
#[derive(Clone, Copy)]
struct FiniteCheck;

type Checked = std::result::Result<(), serde_json::Error>;

fn check_float(v: f64) -> Checked {
    if v.is_finite() {
        Ok(())
    } else {
        Err(serde_json::Error::custom(format!(
            "{v} is not representable in JSON"
        )))
    }
}

macro_rules! accept_scalars {
    ($($method:ident: $ty:ty),* $(,)?) => {
        $(fn $method(self, _v: $ty) -> Checked { Ok(()) })*
    };
}

impl ser::Serializer for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    accept_scalars! {
        serialize_bool: bool,
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_i128: i128,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_u128: u128,
        serialize_char: char,
        serialize_str: &str,
        serialize_bytes: &[u8],
    }

    fn serialize_f32(self, v: f32) -> Checked {
        check_float(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Checked {
        check_float(v)
    }

    fn serialize_none(self) -> Checked {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Checked {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Checked {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Checked {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> Checked {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple(self, _len: usize) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_map(self, _len: Option<usize>) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Checked {
        key.serialize(FiniteCheck)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    #[test]
    fn round_trips_every_json_shape() {
        let codec = JsonCodec;
        let values = [
            json!(null),
            json!(true),
            json!(-17),
            json!(3.5),
            json!("héllo \"quoted\"\n"),
            json!([1, "two", null, [3]]),
            json!({"q": 1, "nested": {"list": [false, {}]}}),
        ];

        for value in values {
            let text = codec.encode(&value).unwrap();
            assert_eq!(codec.decode(&text).unwrap(), value);
        }
    }

    #[test]
    fn floats_round_trip_bit_exact() {
        let codec = JsonCodec;
        let mut awkward = vec![
            1.0715660391465826e-75,
            0.1 + 0.2,
            f64::MIN_POSITIVE,
            5e-324,
            f64::MAX,
            -2.2250738585072014e-308,
        ];
        // xorshift over raw bit patterns, keeping finite values
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        while awkward.len() < 5000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let f = f64::from_bits(state);
            if f.is_finite() {
                awkward.push(f);
            }
        }

        for f in awkward {
            let value = json!(f);
            let back = codec.decode(&codec.encode(&value).unwrap()).unwrap();
            assert_eq!(back.as_f64().map(f64::to_bits), Some(f.to_bits()), "{f:e}");
        }
    }

    #[test]
    fn ensure_finite_rejects_nested_non_finite_floats() {
        #[derive(Serialize)]
        enum Reading {
            Pair(f32, f64),
        }

        assert!(ensure_finite(&json!({"ok": [1.5, null, "x"]})).is_ok());
        assert!(ensure_finite(&Some(2.5_f64)).is_ok());

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = ensure_finite(&vec![1.0, bad]).unwrap_err();
            assert!(matches!(err, Error::Serialization(_)), "got {err:?}");
        }
        assert!(ensure_finite(&Reading::Pair(f32::NAN, 1.0)).is_err());
        assert!(ensure_finite(&std::collections::BTreeMap::from([("k", f64::INFINITY)])).is_err());
    }

    #[test]
    fn key_order_does_not_change_encoding() {
        let codec = JsonCodec;
        let a: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        assert_eq!(codec.encode(&a).unwrap(), codec.encode(&b).unwrap());
    }

    #[test]
    fn malformed_text_is_a_serialization_error() {
        let err = JsonCodec.decode("not json {{").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)), "got {err:?}");
    }
}
