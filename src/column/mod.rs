//! Columnar accumulators backing a record builder.
//!
//! A builder owns one [`Columns`] group for the record root. Every column is
//! one of four kinds: a scalar leaf, a string leaf with dictionary statistics,
//! a list with one element column, or a struct with a nested group. Leaf
//! columns carry a running type that only ever widens.

pub mod dictionary;
pub mod list;
pub mod primitive;
pub mod structure;

use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::buffer::NullBuffer;
use arrow::datatypes::{DataType, Field as ArrowField, Fields};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use dictionary::{DictionaryColumn, DictionaryStats};
pub use list::ListColumn;
pub use primitive::{PrimitiveColumn, PrimitiveData};
pub use structure::{Columns, StructColumn};

use crate::allocator::ArrayAllocator;
use crate::config::DictionaryConfig;
use crate::error::{Error, Result};
use crate::value::{Field, List, Struct, Value, ValueType};

/// What a column needs while it is being finalized.
pub struct FinishContext<'a> {
    pub allocator: &'a mut ArrayAllocator,
    pub dictionaries: &'a DictionaryConfig,
}

/// Read-only description of a column, as exported by `metadata()`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub data_type: String,
    /// Arrow type of the column as last built; string columns show the
    /// latest dictionary decision.
    pub arrow_type: String,
    pub len: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ColumnMetadata>,
}

#[derive(Clone, Debug)]
pub enum Column {
    Primitive(PrimitiveColumn),
    String(DictionaryColumn),
    List(ListColumn),
    Struct(StructColumn),
}

/// Dotted path of field `name` below `prefix`.
pub(crate) fn child_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Validity bitmap from per-slot flags; `None` when every slot is valid.
pub(crate) fn null_buffer(validity: impl Iterator<Item = bool>) -> Option<NullBuffer> {
    let validity: Vec<bool> = validity.collect();
    if validity.iter().all(|&valid| valid) {
        None
    } else {
        Some(NullBuffer::from(validity))
    }
}

/// Converts `value` so it can be stored under `target`: anything meeting a
/// `String` target is rendered as text, and lists and structs are converted
/// element by element. Numeric widening is left to the columns.
pub(crate) fn coerce_value(value: Value, target: &ValueType) -> Value {
    match (value, target) {
        (Value::Null, _) => Value::Null,
        (value @ Value::String(_), ValueType::String) => value,
        (value, ValueType::String) => Value::String(value.to_text()),
        (Value::List(list), ValueType::List(element)) => Value::List(List::new(
            list.values
                .into_iter()
                .map(|v| coerce_value(v, element))
                .collect(),
        )),
        (Value::Struct(s), ValueType::Struct(types)) => Value::Struct(Struct::new(
            s.fields
                .into_iter()
                .map(|field| match types.iter().find(|t| t.name == field.name) {
                    Some(t) => Field {
                        value: coerce_value(field.value, &t.data_type),
                        name: field.name,
                    },
                    None => field,
                })
                .collect(),
        )),
        (value, _) => value,
    }
}

fn shape_mismatch(path: &str, expected: &ValueType, found: &ValueType) -> Error {
    Error::ShapeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

impl Column {
    /// A column of `len` nulls whose type is not known yet.
    pub fn untyped(name: impl Into<String>, path: impl Into<String>, len: usize) -> Self {
        Column::Primitive(PrimitiveColumn::nulls(name, path, len))
    }

    // An empty column of the shape of `data_type`, back-filled with nulls.
    fn with_shape(name: &str, path: &str, data_type: &ValueType, len: usize) -> Self {
        match data_type {
            ValueType::List(_) => Column::List(ListColumn::nulls(name, path, len)),
            ValueType::Struct(_) => Column::Struct(StructColumn::nulls(name, path, len)),
            _ => Column::untyped(name, path, len),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Column::Primitive(c) => c.name(),
            Column::String(c) => c.name(),
            Column::List(c) => c.name(),
            Column::Struct(c) => c.name(),
        }
    }

    /// Dotted field path; list elements share the path of their list.
    pub fn path(&self) -> &str {
        match self {
            Column::Primitive(c) => c.path(),
            Column::String(c) => c.path(),
            Column::List(c) => c.path(),
            Column::Struct(c) => c.path(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Primitive(c) => c.len(),
            Column::String(c) => c.len(),
            Column::List(c) => c.len(),
            Column::Struct(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The running type of the column.
    pub fn value_type(&self) -> ValueType {
        match self {
            Column::Primitive(c) => c.value_type(),
            Column::String(_) => ValueType::String,
            Column::List(c) => c.value_type(),
            Column::Struct(c) => c.value_type(),
        }
    }

    /// Fails with [`Error::ShapeMismatch`] when a value of `data_type` would
    /// put a nested value into a scalar column or the other way round.
    pub fn check(&self, data_type: &ValueType) -> Result<()> {
        match (self, data_type) {
            (_, ValueType::Null) => Ok(()),
            (Column::Primitive(c), _) if c.is_untyped() => Ok(()),
            (Column::Primitive(_) | Column::String(_), t) if !t.is_nested() => Ok(()),
            (Column::List(c), ValueType::List(element)) => c.values().check(element),
            (Column::Struct(c), ValueType::Struct(fields)) => c.columns().check(fields),
            (column, t) => Err(shape_mismatch(column.path(), &column.value_type(), t)),
        }
    }

    pub fn append_null(&mut self) {
        match self {
            Column::Primitive(c) => c.append_null(),
            Column::String(c) => c.append_null(),
            Column::List(c) => c.append_null(),
            Column::Struct(c) => c.append_null(),
        }
    }

    /// Appends one slot, widening the column or re-materializing it as text
    /// when the value requires it.
    pub fn append(&mut self, value: Value) -> Result<()> {
        if value.is_null() {
            self.append_null();
            return Ok(());
        }

        match self {
            Column::Primitive(c) => {
                let data_type = value.value_type();
                if data_type.is_nested() {
                    if !c.is_untyped() {
                        return Err(shape_mismatch(c.path(), &c.value_type(), &data_type));
                    }
                    let nested = Column::with_shape(c.name(), c.path(), &data_type, c.len());
                    *self = nested;
                    return self.append(value);
                }

                let target = c.value_type().coerce(&data_type);
                if target == ValueType::String {
                    if !c.is_untyped() {
                        debug!(
                            path = %c.path(),
                            from = %c.value_type(),
                            "Re-materializing column as text"
                        );
                    }
                    let text = DictionaryColumn::from_text(c.name(), c.path(), c.to_text());
                    *self = Column::String(text);
                    return self.append(value);
                }
                c.append(&value, &target)
            }
            Column::String(c) => c.append(&value),
            Column::List(c) => c.append(value),
            Column::Struct(c) => c.append(value),
        }
    }

    /// Reorders rows: row `i` afterwards is row `indices[i]` before.
    pub fn take(&mut self, indices: &[usize]) {
        match self {
            Column::Primitive(c) => c.take(indices),
            Column::String(c) => c.take(indices),
            Column::List(c) => c.take(indices),
            Column::Struct(c) => c.take(indices),
        }
    }

    /// The value at `path` below this column for each of `rows`. A `None` row
    /// or a path that does not resolve yields `Null`.
    pub fn key_values(&self, path: &[usize], rows: &[Option<usize>]) -> Vec<Value> {
        match self {
            Column::Primitive(c) if path.is_empty() => rows
                .iter()
                .map(|row| row.map_or(Value::Null, |r| c.value(r)))
                .collect(),
            Column::String(c) if path.is_empty() => rows
                .iter()
                .map(|row| row.map_or(Value::Null, |r| c.value(r)))
                .collect(),
            Column::List(c) => c.key_values(path, rows),
            Column::Struct(c) => c.key_values(path, rows),
            _ => vec![Value::Null; rows.len()],
        }
    }

    /// The value stored in `row`.
    pub fn value(&self, row: usize) -> Value {
        self.key_values(&[], &[Some(row)])
            .pop()
            .unwrap_or(Value::Null)
    }

    /// Resolves the rest of a dotted path below this column. List levels
    /// select their first element.
    pub fn resolve(&self, names: &[&str], out: &mut Vec<usize>) -> bool {
        match self {
            Column::List(c) => {
                out.push(0);
                c.values().resolve(names, out)
            }
            Column::Struct(c) if !names.is_empty() => c.columns().resolve(names, out),
            _ => names.is_empty(),
        }
    }

    /// Drops every buffered slot. Types and statistics are kept.
    pub fn clear(&mut self) {
        match self {
            Column::Primitive(c) => c.clear(),
            Column::String(c) => c.clear(),
            Column::List(c) => c.clear(),
            Column::Struct(c) => c.clear(),
        }
    }

    /// Moves the buffered slots into an Arrow array. The column keeps its type
    /// and statistics.
    pub fn finish(&mut self, ctx: &mut FinishContext<'_>) -> Result<(ArrowField, ArrayRef)> {
        let array = match self {
            Column::Primitive(c) => {
                let array = c.finish();
                ctx.allocator.track(array.as_ref())?;
                array
            }
            Column::String(c) => {
                let array = c.finish(ctx.dictionaries.thresholds_for(c.path()))?;
                ctx.allocator.track(array.as_ref())?;
                array
            }
            Column::List(c) => c.finish(ctx)?,
            Column::Struct(c) => c.finish(ctx)?,
        };
        let field = ArrowField::new(self.name(), array.data_type().clone(), true);
        Ok((field, array))
    }

    /// The Arrow type the column is written as.
    pub fn arrow_data_type(&self) -> DataType {
        match self {
            Column::Primitive(c) => c.value_type().arrow_data_type(),
            Column::String(c) if c.is_dictionary_encoded() => {
                DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
            }
            Column::String(_) => DataType::Utf8,
            Column::List(c) => DataType::List(Arc::new(ArrowField::new(
                list::ITEM,
                c.values().arrow_data_type(),
                true,
            ))),
            Column::Struct(c) => DataType::Struct(Fields::from(
                c.columns()
                    .columns()
                    .iter()
                    .map(|child| ArrowField::new(child.name(), child.arrow_data_type(), true))
                    .collect::<Vec<_>>(),
            )),
        }
    }

    pub fn metadata(&self) -> ColumnMetadata {
        let children = match self {
            Column::List(c) => vec![c.values().metadata()],
            Column::Struct(c) => c.columns().metadata(),
            Column::Primitive(_) | Column::String(_) => Vec::new(),
        };
        ColumnMetadata {
            name: self.name().to_string(),
            data_type: self.value_type().to_string(),
            arrow_type: self.arrow_data_type().to_string(),
            len: self.len(),
            children,
        }
    }

    pub fn collect_dictionary_stats(&self, out: &mut Vec<DictionaryStats>) {
        match self {
            Column::Primitive(_) => {}
            Column::String(c) => out.push(c.stats()),
            Column::List(c) => c.values().collect_dictionary_stats(out),
            Column::Struct(c) => c.columns().collect_dictionary_stats(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_column_receiving_string_holds_only_text() {
        let mut column = Column::untyped("x", "x", 0);
        column.append(Value::I64(1)).unwrap();
        column.append(Value::Null).unwrap();
        column.append(Value::from("two")).unwrap();

        let Column::String(text) = &column else {
            panic!("expected a string column");
        };
        assert_eq!(text.len(), 3);
        assert_eq!(column.value(0), Value::from("1"));
        assert_eq!(column.value(1), Value::Null);
        assert_eq!(column.value(2), Value::from("two"));
        assert_eq!(column.value_type(), ValueType::String);
    }

    #[test]
    fn test_signed_and_unsigned_fall_back_to_text() {
        let mut column = Column::untyped("x", "x", 0);
        column.append(Value::I8(-1)).unwrap();
        column.append(Value::U8(1)).unwrap();
        assert_eq!(column.value_type(), ValueType::String);
        assert_eq!(column.value(0), Value::from("-1"));
    }

    #[test]
    fn test_untyped_column_takes_a_nested_shape() {
        let mut column = Column::untyped("l", "l", 2);
        column
            .append(Value::List(List::new(vec![Value::U8(1)])))
            .unwrap();
        assert!(matches!(column, Column::List(_)));
        assert_eq!(column.len(), 3);
        assert_eq!(column.value(0), Value::Null);
        assert_eq!(column.value_type().to_string(), "[U8]");
    }

    #[test]
    fn test_typed_scalar_rejects_nested_values() {
        let mut column = Column::untyped("x", "x", 0);
        column.append(Value::I64(1)).unwrap();
        let err = column.append(Value::Struct(Struct::default())).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert_eq!(column.len(), 1);
    }

    #[test]
    fn test_check() {
        let mut column = Column::untyped("l", "l", 0);
        column
            .append(Value::List(List::new(vec![Value::Struct(Struct::new(vec![
                Field::new("a", 1i64),
            ]))])))
            .unwrap();

        let same = ValueType::List(Box::new(ValueType::Struct(vec![])));
        column.check(&same).unwrap();
        column.check(&ValueType::Null).unwrap();
        // Elements rendered as text cannot go into a struct element column.
        let text = ValueType::List(Box::new(ValueType::String));
        assert!(column.check(&text).is_err());
        assert!(column.check(&ValueType::I64).is_err());
    }

    #[test]
    fn test_coerce_value() {
        let target = ValueType::List(Box::new(ValueType::Struct(vec![
            crate::value::FieldType::new("a", ValueType::String),
        ])));
        let value = Value::List(List::new(vec![Value::Struct(Struct::new(vec![
            Field::new("a", 1i8),
            Field::new("b", 2i8),
        ]))]));
        let expected = Value::List(List::new(vec![Value::Struct(Struct::new(vec![
            Field::new("a", "1"),
            Field::new("b", 2i8),
        ]))]));
        assert_eq!(coerce_value(value, &target), expected);
    }

    #[test]
    fn test_metadata() {
        let mut column = Column::untyped("s", "s", 0);
        column
            .append(Value::Struct(Struct::new(vec![
                Field::new("n", 1u32),
                Field::new("t", "x"),
            ])))
            .unwrap();
        let metadata = column.metadata();
        assert_eq!(metadata.data_type, "{n:U32,t:Str}");
        assert_eq!(metadata.len, 1);
        assert_eq!(metadata.children.len(), 2);
        assert_eq!(metadata.children[1].name, "t");

        let mut stats = Vec::new();
        column.collect_dictionary_stats(&mut stats);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].path, "s.t");
    }
}
