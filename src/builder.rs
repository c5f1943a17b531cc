//! Per-schema columnar accumulation.
//!
//! A [`RecordBuilder`] receives every record sharing one routing key and
//! keeps them as a tree of columns until [`RecordBuilder::build`] turns the
//! buffered rows into a `RecordBatch`. Building drains the buffers but keeps
//! the columns, their types and their dictionary statistics, so the next
//! batch of the same shape starts warm.

use std::cmp::Ordering;
use std::sync::Arc;

use arrow::array::{RecordBatch, RecordBatchOptions};
use arrow::datatypes::Schema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::allocator::ArrayAllocator;
use crate::column::{Column, ColumnMetadata, Columns, DictionaryStats, FinishContext};
use crate::config::DictionaryConfig;
use crate::error::Result;
use crate::record::{fingerprint, Record};
use crate::value::Value;

/// Serializable summary of one builder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordBuilderMetadata {
    pub schema_id: String,
    pub record_count: usize,
    pub columns: Vec<ColumnMetadata>,
    pub dictionary_stats: Vec<DictionaryStats>,
}

#[derive(Debug)]
pub struct RecordBuilder {
    routing_key: String,
    columns: Columns,
}

impl RecordBuilder {
    pub fn new(routing_key: impl Into<String>) -> Self {
        Self {
            routing_key: routing_key.into(),
            columns: Columns::new(""),
        }
    }

    /// Appends one record as a row.
    ///
    /// The record is checked against the existing columns before anything is
    /// written, so a failed append leaves the builder untouched.
    pub fn add_record(&mut self, mut record: Record) -> Result<()> {
        record.normalize();
        let fields = record.into_fields();
        self.columns.check(&fingerprint::field_types(&fields))?;
        self.columns.append_fields(fields)
    }

    /// Rows buffered since the last build.
    pub fn record_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Fingerprint of the columns' current (widened) types.
    pub fn schema_id(&self) -> String {
        fingerprint::render(&self.columns.field_types())
    }

    pub fn columns(&self) -> &[Column] {
        self.columns.columns()
    }

    /// Every top-level scalar column, in name order.
    pub fn default_sort_keys(&self) -> Vec<Vec<usize>> {
        self.columns()
            .iter()
            .enumerate()
            .filter(|(_, column)| !column.value_type().is_nested())
            .map(|(index, _)| vec![index])
            .collect()
    }

    /// Index path of a dotted field path such as `resource.service_name`, or
    /// `None` when this builder has no such column.
    pub fn resolve_sort_key(&self, dotted: &str) -> Option<Vec<usize>> {
        let names: Vec<&str> = dotted.split('.').collect();
        let mut path = Vec::with_capacity(names.len());
        self.columns.resolve(&names, &mut path).then_some(path)
    }

    /// Sorts the buffered rows by `sort_keys`, compared in order.
    ///
    /// The permutation is computed once from the key values and applied to
    /// every column, so rows stay aligned across the whole tree.
    pub fn optimize(&mut self, sort_keys: &[Vec<usize>]) {
        let len = self.record_count();
        if len < 2 || sort_keys.is_empty() {
            return;
        }

        let rows: Vec<Option<usize>> = (0..len).map(Some).collect();
        let keys: Vec<Vec<Value>> = sort_keys
            .iter()
            .map(|path| self.columns.key_values(path, &rows))
            .collect();

        let mut indices: Vec<usize> = (0..len).collect();
        indices.sort_by(|&a, &b| {
            keys.iter()
                .map(|key| key[a].compare(&key[b]))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        if indices.iter().enumerate().all(|(i, &row)| i == row) {
            return;
        }

        debug!(
            schema_id = %self.schema_id(),
            rows = len,
            keys = sort_keys.len(),
            "Reordering builder rows"
        );
        self.columns.take(&indices);
    }

    /// Finalizes the buffered rows into a `RecordBatch` and empties the
    /// buffers.
    ///
    /// A column failing to finalize (for instance when the allocator refuses
    /// it) discards the buffered rows of every column, so the builder is
    /// empty and consistent either way.
    pub fn build(
        &mut self,
        allocator: &mut ArrayAllocator,
        dictionaries: &DictionaryConfig,
    ) -> Result<RecordBatch> {
        let rows = self.record_count();
        let mut ctx = FinishContext {
            allocator,
            dictionaries,
        };
        let (fields, arrays) = match self.columns.finish(&mut ctx) {
            Ok(finished) => finished,
            Err(e) => {
                warn!(
                    schema_id = %self.schema_id(),
                    rows,
                    error = %e,
                    "Discarding rows of a failed build"
                );
                self.columns.clear();
                return Err(e);
            }
        };

        let schema = Arc::new(Schema::new(fields));
        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        Ok(RecordBatch::try_new_with_options(schema, arrays, &options)?)
    }

    pub fn dictionary_stats(&self) -> Vec<DictionaryStats> {
        let mut stats = Vec::new();
        self.columns.collect_dictionary_stats(&mut stats);
        stats
    }

    pub fn metadata(&self) -> RecordBuilderMetadata {
        RecordBuilderMetadata {
            schema_id: self.schema_id(),
            record_count: self.record_count(),
            columns: self.columns.metadata(),
            dictionary_stats: self.dictionary_stats(),
        }
    }
}
