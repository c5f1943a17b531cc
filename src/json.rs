//! Records from JSON documents.
//!
//! Objects become structs, arrays become lists, integers become `I64` (or
//! `U64` above `i64::MAX`) and every other number becomes `F64`.

use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::record::Record;
use crate::value::{Field, List, Struct, Value};

/// Converts a JSON object into a record. The record is not normalized.
pub fn record_from_json(json: &Json) -> Result<Record> {
    let Json::Object(object) = json else {
        return Err(Error::NotAnObject(json_kind(json).to_string()));
    };
    let mut record = Record::with_capacity(object.len());
    for (name, value) in object {
        record.add_field(Field::new(name.as_str(), value_from_json(value)));
    }
    Ok(record)
}

pub fn value_from_json(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(v) = n.as_i64() {
                Value::I64(v)
            } else if let Some(v) = n.as_u64() {
                Value::U64(v)
            } else {
                n.as_f64().map_or(Value::Null, Value::F64)
            }
        }
        Json::String(s) => Value::String(s.clone()),
        Json::Array(values) => Value::List(List::new(values.iter().map(value_from_json).collect())),
        Json::Object(object) => Value::Struct(Struct::new(
            object
                .iter()
                .map(|(name, value)| Field::new(name.as_str(), value_from_json(value)))
                .collect(),
        )),
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}
