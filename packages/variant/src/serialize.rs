//! JSON projection of variants, used for renderer payloads and `$EJSON`.

use crate::{Variant, VariantKind};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

impl Serialize for Variant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.kind() {
            // undefined has no JSON form; it degrades to null on the wire
            VariantKind::Undefined | VariantKind::Null => serializer.serialize_unit(),
            VariantKind::Boolean(b) => serializer.serialize_bool(*b),
            VariantKind::Number(n) => serializer.serialize_f64(*n),
            VariantKind::LongInt(n) => serializer.serialize_i64(*n),
            VariantKind::ULongInt(n) => serializer.serialize_u64(*n),
            VariantKind::String(s) => serializer.serialize_str(s),
            VariantKind::ByteSeq(b) => serializer.serialize_bytes(b),
            VariantKind::Array(items) => {
                let items = items.borrow();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            VariantKind::Tuple(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            VariantKind::Object(map) => {
                let map = map.borrow();
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
            VariantKind::Set(data) => {
                let data = data.borrow();
                let mut seq = serializer.serialize_seq(Some(data.len()))?;
                for item in data.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            // reference kinds have no data projection
            VariantKind::Dynamic(_) => serializer.serialize_str("<dynamic>"),
            VariantKind::Native(_) => serializer.serialize_str("<native>"),
        }
    }
}

impl Variant {
    /// Canonical JSON text for this variant. Containers are rendered
    /// depth-first in insertion order, so two deeply-equal data variants
    /// stringify identically.
    pub fn stringify(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("null"))
    }

    /// Build a variant from parsed JSON. Objects become object variants in
    /// the document's key order, arrays become array variants.
    pub fn from_json(value: &serde_json::Value) -> Variant {
        use serde_json::Value;
        match value {
            Value::Null => Variant::null(),
            Value::Bool(b) => Variant::boolean(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Variant::longint(i)
                } else if let Some(u) = n.as_u64() {
                    Variant::ulongint(u)
                } else {
                    Variant::number(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Variant::string(s.as_str()),
            Value::Array(items) => Variant::array(items.iter().map(Variant::from_json).collect()),
            Value::Object(map) => {
                Variant::object_with(map.iter().map(|(k, v)| (k.clone(), Variant::from_json(v))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stringify_preserves_insertion_order() {
        let obj = Variant::object_with([
            ("b", Variant::longint(2)),
            ("a", Variant::longint(1)),
        ]);
        assert_eq!(obj.stringify(), r#"{"b":2,"a":1}"#);
    }

    #[test]
    fn json_round_trip() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"id":"t","interval":20,"active":"on"}"#).unwrap();
        let v = Variant::from_json(&json);
        assert_eq!(v.object_get("interval").unwrap().coerce_i64().unwrap(), 20);
        let back: serde_json::Value = serde_json::from_str(&v.stringify()).unwrap();
        assert_eq!(json, back);
    }
}
