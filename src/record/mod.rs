//! Hierarchical records as handed over by producers.
//!
//! A [`Record`] is built field by field in any order, normalized once, and
//! then moved into a repository. Normalization is tracked so calling it again
//! is free.

pub mod fingerprint;
pub mod normalize;

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::value::{Field, List, Struct, Value};

static NULL: Value = Value::Null;

/// One telemetry record: a tree of named fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Vec<Field>,
    normalized: bool,
}

macro_rules! field_setter {
    ($($name:ident($ty:ty)),* $(,)?) => {
        $(
            pub fn $name(&mut self, name: impl Into<String>, value: $ty) {
                self.add_field(Field::new(name, value));
            }
        )*
    };
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
            normalized: false,
        }
    }

    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
        self.normalized = false;
    }

    field_setter!(
        bool_field(bool),
        i8_field(i8),
        i16_field(i16),
        i32_field(i32),
        i64_field(i64),
        u8_field(u8),
        u16_field(u16),
        u32_field(u32),
        u64_field(u64),
        f32_field(f32),
        f64_field(f64),
        binary_field(Vec<u8>),
        list_field(List),
        struct_field(Struct),
    );

    pub fn string_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.add_field(Field::new(name, value.into()));
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Sorts all struct levels by field name. Idempotent.
    pub fn normalize(&mut self) {
        if self.normalized {
            return;
        }
        normalize::normalize_fields(&mut self.fields);
        self.normalized = true;
    }

    /// Raw schema fingerprint of the record. Call [`Record::normalize`] first.
    pub fn schema_id(&self) -> String {
        fingerprint::schema_id(&self.fields)
    }

    /// Fingerprint with numeric widths collapsed; repositories bucket on it.
    pub fn routing_key(&self) -> String {
        fingerprint::routing_key(&self.fields)
    }

    /// Looks up a value by child indices: a struct level picks a field, a
    /// list level picks an element.
    pub fn value_by_path(&self, path: &[usize]) -> Result<&Value> {
        let out_of_range = |depth: usize, len: usize| Error::PathOutOfRange {
            path: path.to_vec(),
            depth,
            len,
        };

        let (&first, rest) = path.split_first().ok_or_else(|| out_of_range(0, self.fields.len()))?;
        let mut value = &self
            .fields
            .get(first)
            .ok_or_else(|| out_of_range(0, self.fields.len()))?
            .value;

        for (i, &index) in rest.iter().enumerate() {
            let depth = i + 1;
            value = match value {
                Value::Struct(s) => {
                    &s.fields
                        .get(index)
                        .ok_or_else(|| out_of_range(depth, s.fields.len()))?
                        .value
                }
                Value::List(list) => list
                    .values
                    .get(index)
                    .ok_or_else(|| out_of_range(depth, list.values.len()))?,
                _ => return Err(out_of_range(depth, 0)),
            };
        }
        Ok(value)
    }

    /// Compares two records on a list of index paths, returning the first
    /// ordering that is not `Equal`. A path that does not resolve on one side
    /// compares as `Null` there.
    pub fn compare(&self, other: &Record, sort_by: &[Vec<usize>]) -> Ordering {
        sort_by
            .iter()
            .map(|path| {
                let a = self.value_by_path(path).unwrap_or(&NULL);
                let b = other.value_by_path(path).unwrap_or(&NULL);
                a.compare(b)
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}
