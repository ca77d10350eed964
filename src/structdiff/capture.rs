//! Capturing serializer.
//!
//! Turns any `Serialize` value into a [`Node`] tree that keeps the
//! distinctions the diff needs and `serde_json::Value` loses: records versus
//! string-keyed maps, and `None` versus `Some`.

use serde::Serialize;
use serde::ser;
use serde_json::{Map, Number, Value};

use crate::error::DiffError;

/// Name of the record member listing fields that must be sent even when zero.
pub const FORCE_SEND_FIELDS: &str = "force_send_fields";

/// Captured shape of a serialized value.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// `None`, unit and unit structs.
    Null,
    /// Booleans, numbers, strings and unit enum variants.
    Scalar(Value),
    /// `Some(inner)`.
    Some(Box<Self>),
    /// Sequences and tuples.
    Seq(Vec<Self>),
    /// String-keyed maps in serialization order.
    Map(Vec<(String, Self)>),
    /// Structs.
    Struct(Record),
    /// Anything compared only for deep equality.
    Opaque(Value),
}

/// A captured struct.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Rust type name.
    pub name: &'static str,
    /// Serialized fields in declaration order; skipped fields are absent.
    pub fields: Vec<(&'static str, Node)>,
    /// Field names listed in the sparse marker.
    pub force_send: Vec<String>,
    /// Whether the type carries the sparse marker.
    pub sparse: bool,
}

impl Record {
    /// Returns a field's value as seen by the diff.
    ///
    /// In a sparse record a zero-valued field counts as absent unless it is
    /// listed in the marker. `Null` always counts as absent.
    pub fn effective(&self, field: &str) -> Option<&Node> {
        let node = self
            .fields
            .iter()
            .find_map(|(name, node)| (*name == field).then_some(node))?;
        if matches!(node, Node::Null) {
            return None;
        }
        if self.sparse && node.is_zero() && !self.force_send.iter().any(|f| f == field) {
            return None;
        }
        Some(node)
    }
}

impl Node {
    /// Returns true for the zero value of the node's kind.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Scalar(Value::Bool(b)) => !b,
            Self::Scalar(Value::Number(n)) => n.as_f64() == Some(0.0),
            Self::Scalar(Value::String(s)) => s.is_empty(),
            Self::Scalar(v) | Self::Opaque(v) => v.is_null(),
            Self::Seq(items) => items.is_empty(),
            Self::Map(entries) => entries.is_empty(),
            Self::Some(_) | Self::Struct(_) => false,
        }
    }

    /// Short description of the node's shape.
    pub fn kind(&self) -> String {
        match self {
            Self::Null => "null".into(),
            Self::Scalar(_) => "scalar".into(),
            Self::Some(_) => "option".into(),
            Self::Seq(_) => "sequence".into(),
            Self::Map(_) => "map".into(),
            Self::Struct(record) => format!("struct {}", record.name),
            Self::Opaque(_) => "opaque value".into(),
        }
    }

    /// Converts the captured tree back into JSON.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Scalar(v) | Self::Opaque(v) => v.clone(),
            Self::Some(inner) => inner.to_value(),
            Self::Seq(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            Self::Struct(record) => Value::Object(
                record
                    .fields
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), v.to_value()))
                    .collect(),
            ),
        }
    }

    fn string_list(&self) -> Vec<String> {
        match self {
            Self::Some(inner) => inner.string_list(),
            Self::Seq(items) => items
                .iter()
                .filter_map(|item| match item {
                    Self::Scalar(Value::String(s)) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Captures a value.
///
/// # Errors
///
/// Returns [`DiffError::Capture`] if the value's `Serialize` impl fails.
pub fn capture<T: Serialize + ?Sized>(value: &T) -> Result<Node, DiffError> {
    value.serialize(Capture)
}

fn scalar(value: impl Into<Value>) -> Node {
    Node::Scalar(value.into())
}

fn tagged(variant: &str, inner: Value) -> Node {
    let mut map = Map::new();
    map.insert(variant.to_string(), inner);
    Node::Opaque(Value::Object(map))
}

struct Capture;

impl ser::Serializer for Capture {
    type Ok = Node;
    type Error = DiffError;
    type SerializeSeq = SeqCapture;
    type SerializeTuple = SeqCapture;
    type SerializeTupleStruct = SeqCapture;
    type SerializeTupleVariant = TupleVariantCapture;
    type SerializeMap = MapCapture;
    type SerializeStruct = StructCapture;
    type SerializeStructVariant = StructVariantCapture;

    fn serialize_bool(self, v: bool) -> Result<Node, DiffError> {
        Ok(scalar(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Node, DiffError> {
        Ok(scalar(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Node, DiffError> {
        Ok(scalar(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Node, DiffError> {
        Ok(scalar(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Node, DiffError> {
        Ok(scalar(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Node, DiffError> {
        Ok(scalar(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Node, DiffError> {
        Ok(scalar(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Node, DiffError> {
        Ok(scalar(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Node, DiffError> {
        Ok(scalar(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Node, DiffError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Node, DiffError> {
        Ok(Node::Scalar(Number::from_f64(v).map_or(Value::Null, Value::Number)))
    }

    fn serialize_char(self, v: char) -> Result<Node, DiffError> {
        Ok(scalar(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Node, DiffError> {
        Ok(scalar(v))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Node, DiffError> {
        Ok(Node::Opaque(Value::Array(
            v.iter().map(|b| Value::from(*b)).collect(),
        )))
    }

    fn serialize_none(self) -> Result<Node, DiffError> {
        Ok(Node::Null)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Node, DiffError> {
        Ok(Node::Some(Box::new(value.serialize(Self)?)))
    }

    fn serialize_unit(self) -> Result<Node, DiffError> {
        Ok(Node::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Node, DiffError> {
        Ok(Node::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Node, DiffError> {
        Ok(scalar(variant))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Node, DiffError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Node, DiffError> {
        let inner = value.serialize(Self)?;
        Ok(tagged(variant, inner.to_value()))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqCapture, DiffError> {
        Ok(SeqCapture {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqCapture, DiffError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqCapture, DiffError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<TupleVariantCapture, DiffError> {
        Ok(TupleVariantCapture {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapCapture, DiffError> {
        Ok(MapCapture {
            entries: Vec::with_capacity(len.unwrap_or(0)),
            pending_key: None,
        })
    }

    fn serialize_struct(self, name: &'static str, len: usize) -> Result<StructCapture, DiffError> {
        Ok(StructCapture {
            record: Record {
                name,
                fields: Vec::with_capacity(len),
                force_send: Vec::new(),
                sparse: false,
            },
            skipped: Vec::new(),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<StructVariantCapture, DiffError> {
        Ok(StructVariantCapture {
            variant,
            fields: Map::new(),
        })
    }
}

struct SeqCapture {
    items: Vec<Node>,
}

impl ser::SerializeSeq for SeqCapture {
    type Ok = Node;
    type Error = DiffError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), DiffError> {
        self.items.push(value.serialize(Capture)?);
        Ok(())
    }

    fn end(self) -> Result<Node, DiffError> {
        Ok(Node::Seq(self.items))
    }
}

impl ser::SerializeTuple for SeqCapture {
    type Ok = Node;
    type Error = DiffError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), DiffError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Node, DiffError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqCapture {
    type Ok = Node;
    type Error = DiffError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), DiffError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Node, DiffError> {
        ser::SerializeSeq::end(self)
    }
}

struct TupleVariantCapture {
    variant: &'static str,
    items: Vec<Node>,
}

impl ser::SerializeTupleVariant for TupleVariantCapture {
    type Ok = Node;
    type Error = DiffError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), DiffError> {
        self.items.push(value.serialize(Capture)?);
        Ok(())
    }

    fn end(self) -> Result<Node, DiffError> {
        let items = self.items.iter().map(Node::to_value).collect();
        Ok(tagged(self.variant, Value::Array(items)))
    }
}

struct MapCapture {
    entries: Vec<(Node, Node)>,
    pending_key: Option<Node>,
}

impl ser::SerializeMap for MapCapture {
    type Ok = Node;
    type Error = DiffError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), DiffError> {
        self.pending_key = Some(key.serialize(Capture)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), DiffError> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| DiffError::Capture("map value serialized before its key".into()))?;
        self.entries.push((key, value.serialize(Capture)?));
        Ok(())
    }

    fn end(self) -> Result<Node, DiffError> {
        let all_strings = self
            .entries
            .iter()
            .all(|(k, _)| matches!(k, Node::Scalar(Value::String(_))));

        if all_strings {
            let entries = self
                .entries
                .into_iter()
                .filter_map(|(k, v)| match k {
                    Node::Scalar(Value::String(s)) => Some((s, v)),
                    _ => None,
                })
                .collect();
            return Ok(Node::Map(entries));
        }

        // Keys are not strings: keep a stable pair list for equality only.
        let mut pairs: Vec<(String, Value)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.to_value().to_string(), v.to_value()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Node::Opaque(Value::Array(
            pairs
                .into_iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k), v]))
                .collect(),
        )))
    }
}

struct StructCapture {
    record: Record,
    skipped: Vec<&'static str>,
}

impl ser::SerializeStruct for StructCapture {
    type Ok = Node;
    type Error = DiffError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), DiffError> {
        let node = value.serialize(Capture)?;
        if key == FORCE_SEND_FIELDS {
            self.record.sparse = true;
            self.record.force_send = node.string_list();
        } else {
            self.record.fields.push((key, node));
        }
        Ok(())
    }

    fn skip_field(&mut self, key: &'static str) -> Result<(), DiffError> {
        if key == FORCE_SEND_FIELDS {
            self.record.sparse = true;
        } else {
            self.skipped.push(key);
        }
        Ok(())
    }

    fn end(self) -> Result<Node, DiffError> {
        // A force-sent field that serde skipped would vanish from the diff.
        if let Some(name) = self
            .record
            .force_send
            .iter()
            .find(|f| self.skipped.iter().any(|s| *s == f.as_str()))
        {
            return Err(DiffError::Capture(format!(
                "force-sent field '{name}' is skipped by serialization"
            )));
        }
        Ok(Node::Struct(self.record))
    }
}

struct StructVariantCapture {
    variant: &'static str,
    fields: Map<String, Value>,
}

impl ser::SerializeStructVariant for StructVariantCapture {
    type Ok = Node;
    type Error = DiffError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), DiffError> {
        let node = value.serialize(Capture)?;
        self.fields.insert(key.to_string(), node.to_value());
        Ok(())
    }

    fn end(self) -> Result<Node, DiffError> {
        Ok(tagged(self.variant, Value::Object(self.fields)))
    }
}
