//! String columns with cardinality tracking.
//!
//! Whether a string column is written as `Dictionary(Int32, Utf8)` or as plain
//! `Utf8` is decided when it is finalized, from statistics gathered since the
//! column was created. The statistics survive builds so the decision becomes
//! more accurate the longer a builder lives.
//!
//! Distinct values are only remembered until the cardinality passes the
//! path's `max_card`. From then on the column can never be dictionary encoded
//! again, so the set is dropped and the cardinality stops growing.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray, StringDictionaryBuilder};
use arrow::datatypes::Int32Type;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DictionaryThresholds;
use crate::error::{Error, Result};
use crate::value::Value;

/// Per-path statistics of a string column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DictionaryStats {
    pub path: String,
    pub cardinality: usize,
    pub total_row_count: usize,
    pub average_value_length: f64,
}

#[derive(Clone, Debug)]
pub struct DictionaryColumn {
    name: String,
    path: String,
    data: Vec<Option<String>>,
    dictionary: HashSet<String>,
    cardinality: usize,
    // `max_card` of the path, known after the first build.
    max_card: Option<usize>,
    saturated: bool,
    dictionary_encoded: bool,
    total_value_length: usize,
    total_row_count: usize,
}

impl DictionaryColumn {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            data: Vec::new(),
            dictionary: HashSet::new(),
            cardinality: 0,
            max_card: None,
            saturated: false,
            dictionary_encoded: false,
            total_value_length: 0,
            total_row_count: 0,
        }
    }

    /// A column holding already rendered slots, as produced when a scalar
    /// column is re-materialized as text.
    pub fn from_text(
        name: impl Into<String>,
        path: impl Into<String>,
        slots: Vec<Option<String>>,
    ) -> Self {
        let mut column = Self::new(name, path);
        column.data.reserve(slots.len());
        for slot in slots {
            column.push(slot);
        }
        column
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of distinct non-null values seen, frozen once it exceeds the
    /// path's `max_card`.
    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    /// True once the cardinality exceeded `max_card` and distinct values are
    /// no longer tracked.
    pub fn is_saturated(&self) -> bool {
        self.saturated
    }

    /// Whether the last build wrote this column dictionary encoded.
    pub fn is_dictionary_encoded(&self) -> bool {
        self.dictionary_encoded
    }

    /// Number of non-null values seen.
    pub fn total_row_count(&self) -> usize {
        self.total_row_count
    }

    /// Mean length in characters of the non-null values seen, 0 when none.
    pub fn average_value_length(&self) -> f64 {
        if self.total_row_count == 0 {
            return 0.0;
        }
        self.total_value_length as f64 / self.total_row_count as f64
    }

    pub fn stats(&self) -> DictionaryStats {
        DictionaryStats {
            path: self.path.clone(),
            cardinality: self.cardinality(),
            total_row_count: self.total_row_count,
            average_value_length: self.average_value_length(),
        }
    }

    fn push(&mut self, slot: Option<String>) {
        if let Some(s) = &slot {
            self.total_row_count += 1;
            self.total_value_length += s.chars().count();
            if !self.saturated && !self.dictionary.contains(s) {
                self.dictionary.insert(s.clone());
                self.cardinality += 1;
                self.check_saturation();
            }
        }
        self.data.push(slot);
    }

    fn check_saturation(&mut self) {
        if self.max_card.is_some_and(|max_card| self.cardinality > max_card) {
            debug!(
                path = %self.path,
                cardinality = self.cardinality,
                "Cardinality above max_card, no longer tracking distinct values"
            );
            self.saturated = true;
            self.dictionary = HashSet::new();
        }
    }

    pub fn append_null(&mut self) {
        self.data.push(None);
    }

    /// Appends a value; scalars other than strings are stored as their text.
    pub fn append(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.append_null(),
            Value::String(s) => self.push(Some(s.clone())),
            Value::List(_) | Value::Struct(_) => {
                return Err(Error::ShapeMismatch {
                    path: self.path.clone(),
                    expected: "Str".to_string(),
                    found: value.value_type().to_string(),
                })
            }
            scalar => self.push(Some(scalar.to_text())),
        }
        Ok(())
    }

    pub fn value(&self, row: usize) -> Value {
        self.data
            .get(row)
            .and_then(Clone::clone)
            .map_or(Value::Null, Value::String)
    }

    pub fn take(&mut self, indices: &[usize]) {
        let mut old = std::mem::take(&mut self.data);
        self.data.extend(indices.iter().map(|&i| old[i].take()));
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Moves the buffered strings into an array, dictionary encoded when the
    /// statistics pass `thresholds`.
    pub fn finish(&mut self, thresholds: &DictionaryThresholds) -> Result<ArrayRef> {
        if self.max_card.is_none() {
            self.max_card = Some(thresholds.max_card);
            self.check_saturation();
        }
        self.dictionary_encoded = !self.saturated && thresholds.should_encode(&self.stats());
        if self.dictionary_encoded {
            debug!(
                path = %self.path,
                cardinality = self.cardinality(),
                total_row_count = self.total_row_count,
                "Dictionary encoding string column"
            );
            let mut builder = StringDictionaryBuilder::<Int32Type>::with_capacity(
                self.data.len(),
                self.cardinality(),
                self.total_value_length,
            );
            for slot in self.data.drain(..) {
                match slot {
                    Some(s) => {
                        builder.append(s)?;
                    }
                    None => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        } else {
            Ok(Arc::new(self.data.drain(..).collect::<StringArray>()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use arrow::datatypes::DataType;

    #[test]
    fn test_stats() {
        let mut column = DictionaryColumn::new("s", "s");
        assert_eq!(column.average_value_length(), 0.0);

        for s in ["x", "x", "y"] {
            column.append(&Value::from(s)).unwrap();
        }
        column.append_null();

        assert_eq!(column.cardinality(), 2);
        assert_eq!(column.total_row_count(), 3);
        assert_eq!(column.average_value_length(), 1.0);
        assert_eq!(column.len(), 4);
    }

    #[test]
    fn test_length_counts_characters() {
        let mut column = DictionaryColumn::new("s", "s");
        column.append(&Value::from("héllo")).unwrap();
        assert_eq!(column.average_value_length(), 5.0);
    }

    #[test]
    fn test_scalars_are_stored_as_text() {
        let mut column = DictionaryColumn::new("s", "s");
        column.append(&Value::I64(12)).unwrap();
        column.append(&Value::Bool(true)).unwrap();
        assert_eq!(column.value(0), Value::from("12"));
        assert_eq!(column.value(1), Value::from("true"));
        assert!(column.append(&Value::List(Default::default())).is_err());
    }

    #[test]
    fn test_finish_dictionary_encodes_low_cardinality() {
        let mut column = DictionaryColumn::new("s", "s");
        for i in 0..20 {
            column.append(&Value::from(if i % 2 == 0 { "a" } else { "b" })).unwrap();
        }
        let array = column.finish(&DictionaryThresholds::default()).unwrap();
        assert_eq!(
            array.data_type(),
            &DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
        );
        assert_eq!(array.len(), 20);
        assert!(column.is_empty());
        // Statistics outlive the build.
        assert_eq!(column.total_row_count(), 20);
    }

    #[test]
    fn test_finish_keeps_high_cardinality_plain() {
        let mut column = DictionaryColumn::new("s", "s");
        for i in 0..20 {
            column.append(&Value::from(format!("v{i}"))).unwrap();
        }
        column.append_null();
        let array = column.finish(&DictionaryThresholds::default()).unwrap();
        assert_eq!(array.data_type(), &DataType::Utf8);
        assert_eq!(array.null_count(), 1);
    }

    #[test]
    fn test_high_cardinality_stops_tracking() {
        let thresholds = DictionaryThresholds::default();
        let mut column = DictionaryColumn::new("trace_id", "trace_id");
        for i in 0..300 {
            column.append(&Value::from(format!("t{i}"))).unwrap();
        }
        // The limit is unknown before the first build.
        assert!(!column.is_saturated());
        assert_eq!(column.cardinality(), 300);

        column.finish(&thresholds).unwrap();
        assert!(column.is_saturated());
        assert!(!column.is_dictionary_encoded());
        assert!(column.dictionary.is_empty());

        for i in 300..600 {
            column.append(&Value::from(format!("t{i}"))).unwrap();
        }
        assert_eq!(column.cardinality(), 300);
        assert_eq!(column.total_row_count(), 600);
        assert!(column.dictionary.is_empty());
        let array = column.finish(&thresholds).unwrap();
        assert_eq!(array.data_type(), &DataType::Utf8);
        assert_eq!(array.len(), 300);
    }

    #[test]
    fn test_saturation_after_first_build() {
        let thresholds = DictionaryThresholds {
            max_card: 2,
            ..Default::default()
        };
        let mut column = DictionaryColumn::new("s", "s");
        column.append(&Value::from("a")).unwrap();
        column.finish(&thresholds).unwrap();
        assert!(!column.is_saturated());

        for s in ["a", "b", "c", "d"] {
            column.append(&Value::from(s)).unwrap();
        }
        assert!(column.is_saturated());
        assert_eq!(column.cardinality(), 3);
        assert!(column.dictionary.is_empty());
    }

    #[test]
    fn test_from_text() {
        let column =
            DictionaryColumn::from_text("s", "s", vec![Some("1".into()), None, Some("1".into())]);
        assert_eq!(column.len(), 3);
        assert_eq!(column.cardinality(), 1);
        assert_eq!(column.total_row_count(), 2);
    }
}
