//! Routing of records to per-schema builders.
//!
//! Records are bucketed by their routing key (the schema fingerprint with
//! numeric widths collapsed), so every builder only ever sees rows it can
//! hold by widening. Builders are created on first use and stay alive across
//! builds.
//!
//! # Thread Safety
//!
//! `RecordRepository` is `Send` but not shareable; wrap it in a lock or use
//! [`SharedRecordRepository`](crate::shared::SharedRecordRepository).

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use arrow::array::RecordBatch;
use tracing::{debug, info};

use crate::allocator::ArrayAllocator;
use crate::builder::{RecordBuilder, RecordBuilderMetadata};
use crate::config::Config;
use crate::error::Result;
use crate::record::Record;

#[derive(Debug)]
pub struct RecordRepository {
    config: Config,
    builders: HashMap<String, RecordBuilder>,
    allocator: ArrayAllocator,
}

impl Default for RecordRepository {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// Sort keys for one builder: the configured dotted paths it can resolve, or
/// its top-level scalar columns when none are configured.
pub(crate) fn sort_keys_for(config: &Config, builder: &RecordBuilder) -> Vec<Vec<usize>> {
    if config.sort_by.is_empty() {
        return builder.default_sort_keys();
    }
    config
        .sort_by
        .iter()
        .filter_map(|dotted| builder.resolve_sort_key(dotted))
        .collect()
}

/// Builds every non-empty builder in routing key order.
pub(crate) fn build_all<'a>(
    builders: impl Iterator<Item = &'a mut RecordBuilder>,
    config: &Config,
    allocator: &mut ArrayAllocator,
) -> Result<BTreeMap<String, RecordBatch>> {
    allocator.reset();

    let mut pending: Vec<&mut RecordBuilder> = builders.filter(|b| !b.is_empty()).collect();
    pending.sort_by(|a, b| a.routing_key().cmp(b.routing_key()));

    let mut batches = BTreeMap::new();
    let mut rows = 0;
    for builder in pending {
        let schema_id = builder.schema_id();
        let batch = builder.build(allocator, &config.dictionaries)?;
        rows += batch.num_rows();
        batches.insert(schema_id, batch);
    }

    info!(
        batches = batches.len(),
        rows,
        bytes = allocator.allocated_bytes(),
        "Built record batches"
    );
    Ok(batches)
}

impl RecordRepository {
    pub fn new(config: Config) -> Self {
        let allocator = ArrayAllocator::new(config.memory_limit);
        Self {
            config,
            builders: HashMap::new(),
            allocator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Normalizes `record` and appends it to the builder of its routing key.
    pub fn add_record(&mut self, mut record: Record) -> Result<()> {
        record.normalize();
        let routing_key = record.routing_key();
        let builder = match self.builders.entry(routing_key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(routing_key = %entry.key(), "Creating record builder");
                let builder = RecordBuilder::new(entry.key().clone());
                entry.insert(builder)
            }
        };
        builder.add_record(record)
    }

    /// Number of builders holding at least one row.
    pub fn record_builder_count(&self) -> usize {
        self.builders.values().filter(|b| !b.is_empty()).count()
    }

    /// Sorts the rows of every builder by the configured keys.
    pub fn optimize(&mut self) {
        for builder in self.builders.values_mut() {
            let keys = sort_keys_for(&self.config, builder);
            builder.optimize(&keys);
        }
    }

    /// Drains every non-empty builder into a batch, keyed by the builder's
    /// effective schema id.
    ///
    /// Builders are processed in routing key order. On error the builders
    /// processed before the failing one have already been drained and their
    /// batches are lost.
    pub fn build(&mut self) -> Result<BTreeMap<String, RecordBatch>> {
        build_all(
            self.builders.values_mut(),
            &self.config,
            &mut self.allocator,
        )
    }

    /// Summaries of the non-empty builders, ordered by schema id.
    pub fn metadata(&self) -> Vec<RecordBuilderMetadata> {
        let mut metadata: Vec<RecordBuilderMetadata> = self
            .builders
            .values()
            .filter(|b| !b.is_empty())
            .map(RecordBuilder::metadata)
            .collect();
        metadata.sort_by(|a, b| a.schema_id.cmp(&b.schema_id));
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::value::{Field, List, Struct, Value};
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{DataType, Int64Type};

    fn x_record<T: Into<Value>>(x: T) -> Record {
        let mut record = Record::new();
        record.add_field(Field::new("x", x));
        record
    }

    #[test]
    fn test_widths_share_a_builder() {
        let mut repository = RecordRepository::default();
        repository.add_record(x_record(1i8)).unwrap();
        repository.add_record(x_record(2i64)).unwrap();
        assert_eq!(repository.record_builder_count(), 1);

        let batches = repository.build().unwrap();
        assert_eq!(batches.len(), 1);
        let batch = &batches["x:I64"];
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Int64);
        assert_eq!(repository.record_builder_count(), 0);
    }

    #[test]
    fn test_distinct_shapes_get_distinct_builders() {
        let mut repository = RecordRepository::default();
        repository.add_record(x_record(1i64)).unwrap();
        repository.add_record(x_record(1u64)).unwrap();
        repository.add_record(x_record("s")).unwrap();
        repository
            .add_record(x_record(List::new(vec![Value::I64(1)])))
            .unwrap();
        assert_eq!(repository.record_builder_count(), 4);

        let batches = repository.build().unwrap();
        let keys: Vec<&str> = batches.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["x:I64", "x:Str", "x:U64", "x:[I64]"]);
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let mut repository = RecordRepository::default();
        let mut a = Record::new();
        a.i64_field("b", 1);
        a.string_field("a", "x");
        let mut b = Record::new();
        b.string_field("a", "y");
        b.i64_field("b", 2);
        repository.add_record(a).unwrap();
        repository.add_record(b).unwrap();
        assert_eq!(repository.record_builder_count(), 1);
    }

    #[test]
    fn test_build_twice() {
        let mut repository = RecordRepository::default();
        repository.add_record(x_record(1i64)).unwrap();
        assert_eq!(repository.build().unwrap().len(), 1);
        assert!(repository.build().unwrap().is_empty());

        repository.add_record(x_record(2i64)).unwrap();
        let batches = repository.build().unwrap();
        assert_eq!(
            batches["x:I64"]
                .column(0)
                .as_primitive::<Int64Type>()
                .values()
                .to_vec(),
            vec![2]
        );
    }

    #[test]
    fn test_optimize_with_configured_keys() {
        let config = Config {
            sort_by: vec!["resource.service".to_string(), "ts".to_string()],
            ..Default::default()
        };
        let mut repository = RecordRepository::new(config);
        for (service, ts) in [("b", 1i64), ("a", 2), ("a", 1)] {
            let mut record = Record::new();
            record.struct_field("resource", Struct::new(vec![Field::new("service", service)]));
            record.i64_field("ts", ts);
            repository.add_record(record).unwrap();
        }
        repository.optimize();

        let batches = repository.build().unwrap();
        let batch = batches.values().next().unwrap();
        let ts = batch.column_by_name("ts").unwrap().as_primitive::<Int64Type>();
        assert_eq!(ts.values().to_vec(), vec![1, 2, 1]);
    }

    #[test]
    fn test_memory_limit() {
        let config = Config {
            memory_limit: Some(8),
            ..Default::default()
        };
        let mut repository = RecordRepository::new(config);
        for i in 0..100 {
            repository.add_record(x_record(i as i64)).unwrap();
        }
        let err = repository.build().unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { limit: 8, .. }));
    }

    #[test]
    fn test_failed_build_clears_the_builder() {
        let config = Config {
            memory_limit: Some(1200),
            ..Default::default()
        };
        let mut repository = RecordRepository::new(config);
        for i in 0..100i64 {
            let mut record = Record::new();
            record.i64_field("a", i);
            record.i64_field("b", i);
            repository.add_record(record).unwrap();
        }
        // The first column fits, the second one does not.
        let err = repository.build().unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { limit: 1200, .. }));
        assert_eq!(repository.record_builder_count(), 0);

        let mut record = Record::new();
        record.i64_field("a", 7);
        record.i64_field("b", 8);
        repository.add_record(record).unwrap();
        let metadata = repository.metadata();
        assert_eq!(metadata[0].record_count, 1);
        for column in &metadata[0].columns {
            assert_eq!(column.len, 1, "column {}", column.name);
        }

        let batches = repository.build().unwrap();
        let batch = &batches["a:I64,b:I64"];
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(
            batch.column(1).as_primitive::<Int64Type>().values().to_vec(),
            vec![8]
        );
    }

    #[test]
    fn test_metadata() {
        let mut repository = RecordRepository::default();
        repository.add_record(x_record("a")).unwrap();
        repository.add_record(x_record("a")).unwrap();
        repository.add_record(x_record(1u8)).unwrap();

        let metadata = repository.metadata();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata[0].schema_id, "x:Str");
        assert_eq!(metadata[0].record_count, 2);
        assert_eq!(metadata[0].dictionary_stats[0].cardinality, 1);
        assert_eq!(metadata[1].schema_id, "x:U8");

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json[1]["columns"][0]["data_type"], "U8");
        assert_eq!(json[1]["columns"][0]["arrow_type"], "UInt8");
        assert_eq!(json[0]["columns"][0]["arrow_type"], "Utf8");
    }

    #[test]
    fn test_dictionary_decision_uses_config() {
        let mut repository = RecordRepository::default();
        for _ in 0..10 {
            repository.add_record(x_record("same")).unwrap();
        }
        let batches = repository.build().unwrap();
        let column = batches["x:Str"].column(0);
        assert!(matches!(column.data_type(), DataType::Dictionary(_, _)));
        assert_eq!(column.len(), 10);
    }
}
