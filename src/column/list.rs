//! List columns.
//!
//! A list column keeps one length per row and a single child column holding
//! the elements of every row back to back. Elements are coerced to the
//! list's element type before they reach the child, so a list mixing numbers
//! and strings stores all of them as text.

use std::sync::Arc;

use arrow::array::{ArrayRef, ListArray};
use arrow::buffer::OffsetBuffer;
use arrow::error::ArrowError;

use super::{coerce_value, null_buffer, Column, FinishContext};
use crate::error::{Error, Result};
use crate::value::{List, Value, ValueType};

/// Name of the element column, matching Arrow's default list item field.
pub const ITEM: &str = "item";

#[derive(Clone, Debug)]
pub struct ListColumn {
    name: String,
    path: String,
    lengths: Vec<Option<usize>>,
    values: Box<Column>,
}

impl ListColumn {
    /// A list column holding `len` null lists.
    pub fn nulls(name: impl Into<String>, path: impl Into<String>, len: usize) -> Self {
        let path = path.into();
        Self {
            name: name.into(),
            values: Box::new(Column::untyped(ITEM, path.clone(), 0)),
            path,
            lengths: vec![None; len],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The element column.
    pub fn values(&self) -> &Column {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn value_type(&self) -> ValueType {
        ValueType::List(Box::new(self.values.value_type()))
    }

    pub fn append_null(&mut self) {
        self.lengths.push(None);
    }

    pub fn append(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Null => self.append_null(),
            Value::List(list) => {
                let element = list.element_type();
                let len = list.values.len();
                for v in list.values {
                    self.values.append(coerce_value(v, &element))?;
                }
                self.lengths.push(Some(len));
            }
            other => {
                return Err(Error::ShapeMismatch {
                    path: self.path.clone(),
                    expected: self.value_type().to_string(),
                    found: other.value_type().to_string(),
                })
            }
        }
        Ok(())
    }

    // Start of each row's elements in the child, plus the end of the last row.
    fn offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.lengths.len() + 1);
        let mut end = 0;
        offsets.push(end);
        for len in &self.lengths {
            end += len.unwrap_or(0);
            offsets.push(end);
        }
        offsets
    }

    pub fn take(&mut self, indices: &[usize]) {
        let offsets = self.offsets();
        let mut element_indices = Vec::with_capacity(offsets[offsets.len() - 1]);
        let mut lengths = Vec::with_capacity(indices.len());
        for &row in indices {
            element_indices.extend(offsets[row]..offsets[row + 1]);
            lengths.push(self.lengths[row]);
        }
        self.lengths = lengths;
        self.values.take(&element_indices);
    }

    /// Values at `path` for each of `rows`. The first path index selects an
    /// element; an empty path yields whole lists.
    pub fn key_values(&self, path: &[usize], rows: &[Option<usize>]) -> Vec<Value> {
        let offsets = self.offsets();
        let present = |row: &Option<usize>| row.filter(|&r| self.lengths[r].is_some());

        let Some((&index, rest)) = path.split_first() else {
            let spans: Vec<Option<usize>> = rows
                .iter()
                .map(|row| present(row).map(|r| offsets[r + 1] - offsets[r]))
                .collect();
            let element_rows: Vec<Option<usize>> = rows
                .iter()
                .filter_map(present)
                .flat_map(|r| (offsets[r]..offsets[r + 1]).map(Some))
                .collect();
            let mut elements = self.values.key_values(&[], &element_rows).into_iter();
            return spans
                .into_iter()
                .map(|span| match span {
                    Some(n) => Value::List(List::new(elements.by_ref().take(n).collect())),
                    None => Value::Null,
                })
                .collect();
        };

        let element_rows: Vec<Option<usize>> = rows
            .iter()
            .map(|row| {
                present(row).and_then(|r| {
                    let start = offsets[r];
                    (index < offsets[r + 1] - start).then_some(start + index)
                })
            })
            .collect();
        self.values.key_values(rest, &element_rows)
    }

    pub fn clear(&mut self) {
        self.lengths.clear();
        self.values.clear();
    }

    pub fn finish(&mut self, ctx: &mut FinishContext<'_>) -> Result<ArrayRef> {
        let (field, values) = self.values.finish(ctx)?;

        let total: usize = self.lengths.iter().flatten().sum();
        if i32::try_from(total).is_err() {
            return Err(ArrowError::ComputeError(format!(
                "list column {} holds {total} elements, more than i32 offsets address",
                self.path
            ))
            .into());
        }
        let offsets =
            OffsetBuffer::<i32>::from_lengths(self.lengths.iter().map(|l| l.unwrap_or(0)));
        let nulls = null_buffer(self.lengths.drain(..).map(|l| l.is_some()));

        Ok(Arc::new(ListArray::try_new(
            Arc::new(field),
            offsets,
            values,
            nulls,
        )?))
    }
}
