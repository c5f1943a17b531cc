//! Struct columns and column groups.
//!
//! [`Columns`] is one struct level: a set of columns kept sorted by name, all
//! of the same length. Rows are appended by merging the row's (sorted) fields
//! into the columns by name, so a field the group has not seen yet creates a
//! column back-filled with nulls, and a column the row does not mention gets
//! a null.

use std::sync::Arc;

use arrow::array::{ArrayRef, StructArray};
use arrow::datatypes::{Field as ArrowField, Fields};

use super::{child_path, null_buffer, Column, ColumnMetadata, DictionaryStats, FinishContext};
use crate::error::{Error, Result};
use crate::value::{Field, FieldType, Struct, Value, ValueType};

#[derive(Clone, Debug, Default)]
pub struct Columns {
    path: String,
    columns: Vec<Column>,
    len: usize,
}

impl Columns {
    /// An empty group for the struct level at `path` (empty for the root).
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_nulls(path, 0)
    }

    /// A group with no columns that already counts `len` rows.
    pub fn with_nulls(path: impl Into<String>, len: usize) -> Self {
        Self {
            path: path.into(),
            columns: Vec::new(),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.position(name).ok().map(|i| &self.columns[i])
    }

    fn position(&self, name: &str) -> std::result::Result<usize, usize> {
        self.columns.binary_search_by(|c| c.name().cmp(name))
    }

    /// The running types of the columns, in name order.
    pub fn field_types(&self) -> Vec<FieldType> {
        self.columns
            .iter()
            .map(|c| FieldType::new(c.name(), c.value_type()))
            .collect()
    }

    /// Verifies that a row of `fields` can be appended without a shape
    /// conflict. Nothing is modified.
    pub fn check(&self, fields: &[FieldType]) -> Result<()> {
        for field in fields {
            if let Some(column) = self.get(&field.name) {
                column.check(&field.data_type)?;
            }
        }
        Ok(())
    }

    /// Appends one row. `fields` must have unique names.
    pub fn append_fields(&mut self, fields: Vec<Field>) -> Result<()> {
        let mut appended = vec![false; self.columns.len()];
        for field in fields {
            let index = match self.position(&field.name) {
                Ok(index) => index,
                Err(index) => {
                    let path = child_path(&self.path, &field.name);
                    self.columns
                        .insert(index, Column::untyped(field.name.clone(), path, self.len));
                    appended.insert(index, false);
                    index
                }
            };
            self.columns[index].append(field.value)?;
            appended[index] = true;
        }

        for (column, appended) in self.columns.iter_mut().zip(appended) {
            if !appended {
                column.append_null();
            }
        }
        self.len += 1;
        Ok(())
    }

    pub fn append_null_row(&mut self) {
        for column in &mut self.columns {
            column.append_null();
        }
        self.len += 1;
    }

    pub fn take(&mut self, indices: &[usize]) {
        for column in &mut self.columns {
            column.take(indices);
        }
    }

    /// Values at `path` for each of `rows`; the first index picks a column.
    pub fn key_values(&self, path: &[usize], rows: &[Option<usize>]) -> Vec<Value> {
        match path.split_first() {
            Some((&index, rest)) if index < self.columns.len() => {
                self.columns[index].key_values(rest, rows)
            }
            _ => vec![Value::Null; rows.len()],
        }
    }

    /// Resolves dotted names to an index path, appending to `out`.
    pub fn resolve(&self, names: &[&str], out: &mut Vec<usize>) -> bool {
        let Some((name, rest)) = names.split_first() else {
            return false;
        };
        match self.position(name) {
            Ok(index) => {
                out.push(index);
                self.columns[index].resolve(rest, out)
            }
            Err(_) => false,
        }
    }

    /// Drops every buffered row, keeping columns and their types.
    pub fn clear(&mut self) {
        for column in &mut self.columns {
            column.clear();
        }
        self.len = 0;
    }

    /// Finalizes every column, leaving the group empty but typed.
    pub fn finish(
        &mut self,
        ctx: &mut FinishContext<'_>,
    ) -> Result<(Vec<ArrowField>, Vec<ArrayRef>)> {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays = Vec::with_capacity(self.columns.len());
        for column in &mut self.columns {
            let (field, array) = column.finish(ctx)?;
            fields.push(field);
            arrays.push(array);
        }
        self.len = 0;
        Ok((fields, arrays))
    }

    pub fn metadata(&self) -> Vec<ColumnMetadata> {
        self.columns.iter().map(Column::metadata).collect()
    }

    pub fn collect_dictionary_stats(&self, out: &mut Vec<DictionaryStats>) {
        for column in &self.columns {
            column.collect_dictionary_stats(out);
        }
    }
}

#[derive(Clone, Debug)]
pub struct StructColumn {
    name: String,
    path: String,
    validity: Vec<bool>,
    columns: Columns,
}

impl StructColumn {
    /// A struct column holding `len` null structs.
    pub fn nulls(name: impl Into<String>, path: impl Into<String>, len: usize) -> Self {
        let path = path.into();
        Self {
            name: name.into(),
            columns: Columns::with_nulls(path.clone(), len),
            path,
            validity: vec![false; len],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.validity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validity.is_empty()
    }

    pub fn value_type(&self) -> ValueType {
        ValueType::Struct(self.columns.field_types())
    }

    pub fn append_null(&mut self) {
        self.validity.push(false);
        self.columns.append_null_row();
    }

    pub fn append(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Null => self.append_null(),
            Value::Struct(s) => {
                self.columns.append_fields(s.fields)?;
                self.validity.push(true);
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

    pub fn take(&mut self, indices: &[usize]) {
        self.validity = indices.iter().map(|&i| self.validity[i]).collect();
        self.columns.take(indices);
    }

    pub fn key_values(&self, path: &[usize], rows: &[Option<usize>]) -> Vec<Value> {
        let rows: Vec<Option<usize>> = rows
            .iter()
            .map(|row| row.filter(|&r| self.validity[r]))
            .collect();
        if !path.is_empty() {
            return self.columns.key_values(path, &rows);
        }

        let mut children: Vec<_> = self
            .columns
            .columns()
            .iter()
            .map(|c| (c.name(), c.key_values(&[], &rows).into_iter()))
            .collect();
        rows.iter()
            .map(|row| {
                if row.is_none() {
                    // Keep the child iterators aligned.
                    for (_, values) in &mut children {
                        values.next();
                    }
                    return Value::Null;
                }
                Value::Struct(Struct::new(
                    children
                        .iter_mut()
                        .map(|(name, values)| {
                            Field::new(*name, values.next().unwrap_or(Value::Null))
                        })
                        .collect(),
                ))
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.validity.clear();
        self.columns.clear();
    }

    pub fn finish(&mut self, ctx: &mut FinishContext<'_>) -> Result<ArrayRef> {
        let len = self.validity.len();
        let (fields, arrays) = self.columns.finish(ctx)?;
        let nulls = null_buffer(self.validity.drain(..));
        if fields.is_empty() {
            return Ok(Arc::new(StructArray::new_empty_fields(len, nulls)));
        }
        Ok(Arc::new(StructArray::try_new(
            Fields::from(fields),
            arrays,
            nulls,
        )?))
    }
}
