//! Typed, recursive field values.
//!
//! Records are trees of [`Field`]s whose [`Value`]s are only known at runtime.
//! The value set is closed: every consumer (coercion, fingerprinting, column
//! appends) matches on it exhaustively.

pub mod types;

use std::cmp::Ordering;

pub use types::{FieldType, ValueType};

use crate::error::{Error, Result};

/// A field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Binary(Vec<u8>),
    List(List),
    Struct(Struct),
}

/// A named value inside a struct or at the top level of a record.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An ordered sequence of fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Struct {
    pub fields: Vec<Field>,
}

impl Struct {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn struct_type(&self) -> ValueType {
        ValueType::Struct(
            self.fields
                .iter()
                .map(|f| FieldType::new(f.name.clone(), f.value.value_type()))
                .collect(),
        )
    }
}

/// An ordered sequence of values; elements may differ in type until coerced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct List {
    pub values: Vec<Value>,
}

impl List {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// The coerced type of all elements (`Null` for an empty list).
    pub fn element_type(&self) -> ValueType {
        self.values
            .iter()
            .fold(ValueType::Null, |acc, v| acc.coerce(&v.value_type()))
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from!(
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
    Vec<u8> => Binary,
    List => List,
    Struct => Struct,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

// Integer accessors accept narrower widths of the same family and Bool as 0/1.
macro_rules! integer_accessor {
    ($name:ident, $ty:ty, [$($variant:ident),*]) => {
        pub fn $name(&self) -> Result<Option<$ty>> {
            match self {
                Value::Null => Ok(None),
                Value::Bool(b) => Ok(Some(<$ty>::from(*b))),
                $(Value::$variant(v) => Ok(Some(<$ty>::from(*v))),)*
                other => Err(other.not_convertible(stringify!($ty))),
            }
        }
    };
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, Value::List(_) | Value::Struct(_))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::I8(_) => ValueType::I8,
            Value::I16(_) => ValueType::I16,
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::U8(_) => ValueType::U8,
            Value::U16(_) => ValueType::U16,
            Value::U32(_) => ValueType::U32,
            Value::U64(_) => ValueType::U64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::String(_) => ValueType::String,
            Value::Binary(_) => ValueType::Binary,
            Value::List(list) => ValueType::List(Box::new(list.element_type())),
            Value::Struct(s) => s.struct_type(),
        }
    }

    fn not_convertible(&self, target: &str) -> Error {
        Error::MalformedValue {
            path: String::new(),
            reason: format!("{} value cannot be read as {target}", self.value_type()),
        }
    }

    integer_accessor!(as_i8, i8, [I8]);
    integer_accessor!(as_i16, i16, [I8, I16]);
    integer_accessor!(as_i32, i32, [I8, I16, I32]);
    integer_accessor!(as_i64, i64, [I8, I16, I32, I64]);
    integer_accessor!(as_u8, u8, [U8]);
    integer_accessor!(as_u16, u16, [U8, U16]);
    integer_accessor!(as_u32, u32, [U8, U16, U32]);
    integer_accessor!(as_u64, u64, [U8, U16, U32, U64]);

    pub fn as_f32(&self) -> Result<Option<f32>> {
        match self {
            Value::Null => Ok(None),
            Value::F32(v) => Ok(Some(*v)),
            other => Err(other.not_convertible("f32")),
        }
    }

    pub fn as_f64(&self) -> Result<Option<f64>> {
        match self {
            Value::Null => Ok(None),
            Value::F32(v) => Ok(Some(f64::from(*v))),
            Value::F64(v) => Ok(Some(*v)),
            other => Err(other.not_convertible("f64")),
        }
    }

    pub fn as_bool(&self) -> Result<Option<bool>> {
        match self {
            Value::Null => Ok(None),
            Value::Bool(v) => Ok(Some(*v)),
            other => Err(other.not_convertible("bool")),
        }
    }

    pub fn as_str(&self) -> Result<Option<&str>> {
        match self {
            Value::Null => Ok(None),
            Value::String(v) => Ok(Some(v)),
            other => Err(other.not_convertible("string")),
        }
    }

    pub fn as_binary(&self) -> Result<Option<&[u8]>> {
        match self {
            Value::Null => Ok(None),
            Value::Binary(v) => Ok(Some(v)),
            other => Err(other.not_convertible("binary")),
        }
    }

    /// Renders the value as text when its column falls back to `String`.
    ///
    /// Integers are decimal, floats use the shortest representation that
    /// parses back to the same value (`1.5`, `1`, `NaN`, `inf`), binary is
    /// lowercase hex and nested values are compact JSON. `Null` renders as an
    /// empty string, but columns keep nulls as nulls and never call this.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(v) => v.to_string(),
            Value::I8(v) => v.to_string(),
            Value::I16(v) => v.to_string(),
            Value::I32(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::U8(v) => v.to_string(),
            Value::U16(v) => v.to_string(),
            Value::U32(v) => v.to_string(),
            Value::U64(v) => v.to_string(),
            Value::F32(v) => v.to_string(),
            Value::F64(v) => v.to_string(),
            Value::String(v) => v.clone(),
            Value::Binary(v) => to_hex(v),
            Value::List(_) | Value::Struct(_) => self.to_json().to_string(),
        }
    }

    /// Converts the value to JSON. Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Null => Json::Null,
            Value::Bool(v) => Json::from(*v),
            Value::I8(v) => Json::from(*v),
            Value::I16(v) => Json::from(*v),
            Value::I32(v) => Json::from(*v),
            Value::I64(v) => Json::from(*v),
            Value::U8(v) => Json::from(*v),
            Value::U16(v) => Json::from(*v),
            Value::U32(v) => Json::from(*v),
            Value::U64(v) => Json::from(*v),
            Value::F32(v) => float_json(f64::from(*v)),
            Value::F64(v) => float_json(*v),
            Value::String(v) => Json::from(v.as_str()),
            Value::Binary(v) => Json::from(to_hex(v)),
            Value::List(list) => Json::Array(list.values.iter().map(Value::to_json).collect()),
            Value::Struct(s) => Json::Object(
                s.fields
                    .iter()
                    .map(|f| (f.name.clone(), f.value.to_json()))
                    .collect(),
            ),
        }
    }

    // Ordering groups values by family first, so it stays a total order even
    // across types that never share a column.
    fn family_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::I8(_) | Value::I16(_) | Value::I32(_) | Value::I64(_) => 2,
            Value::U8(_) | Value::U16(_) | Value::U32(_) | Value::U64(_) => 3,
            Value::F32(_) | Value::F64(_) => 4,
            Value::String(_) => 5,
            Value::Binary(_) => 6,
            Value::List(_) => 7,
            Value::Struct(_) => 8,
        }
    }

    fn signed_key(&self) -> Option<i64> {
        match self {
            Value::I8(v) => Some(i64::from(*v)),
            Value::I16(v) => Some(i64::from(*v)),
            Value::I32(v) => Some(i64::from(*v)),
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    fn unsigned_key(&self) -> Option<u64> {
        match self {
            Value::U8(v) => Some(u64::from(*v)),
            Value::U16(v) => Some(u64::from(*v)),
            Value::U32(v) => Some(u64::from(*v)),
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    fn float_key(&self) -> Option<f64> {
        match self {
            Value::F32(v) => Some(f64::from(*v)),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Total order over values.
    ///
    /// Numbers of one family compare numerically whatever their width,
    /// strings and binary compare bytewise, lists and structs compare
    /// lexicographically. Values of unrelated types order by type family,
    /// with `Null` first.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => compare_values(&a.values, &b.values),
            (Value::Struct(a), Value::Struct(b)) => compare_fields(&a.fields, &b.fields),
            _ => {
                if let (Some(a), Some(b)) = (self.signed_key(), other.signed_key()) {
                    return a.cmp(&b);
                }
                if let (Some(a), Some(b)) = (self.unsigned_key(), other.unsigned_key()) {
                    return a.cmp(&b);
                }
                if let (Some(a), Some(b)) = (self.float_key(), other.float_key()) {
                    return a.total_cmp(&b);
                }
                self.family_rank().cmp(&other.family_rank())
            }
        }
    }
}

fn compare_values(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.compare(y))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

fn compare_fields(a: &[Field], b: &[Field]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.name.cmp(&y.name).then_with(|| x.value.compare(&y.value)))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

fn float_json(v: f64) -> serde_json::Value {
    serde_json::Number::from_f64(v).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        // Writing to a String cannot fail.
        let _ = write!(out, "{b:02x}");
    }
    out
}
