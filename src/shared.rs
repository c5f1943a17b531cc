//! A record repository that can be fed from several threads.
//!
//! # Thread Safety
//!
//! Builders live in a `DashMap`, whose sharded locking lets appends for
//! different routing keys proceed in parallel while appends for the same key
//! are serialized by the shard lock. [`SharedRecordRepository::build`] is a
//! point-in-time drain: callers must stop appending while it runs, otherwise
//! rows added concurrently may land in either this batch or the next one.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use arrow::array::RecordBatch;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::allocator::ArrayAllocator;
use crate::builder::{RecordBuilder, RecordBuilderMetadata};
use crate::config::Config;
use crate::error::Result;
use crate::record::Record;
use crate::repository::{build_all, sort_keys_for};

#[derive(Debug)]
pub struct SharedRecordRepository {
    config: Config,
    builders: DashMap<String, RecordBuilder>,
    allocator: Mutex<ArrayAllocator>,
}

impl Default for SharedRecordRepository {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl SharedRecordRepository {
    pub fn new(config: Config) -> Self {
        let allocator = Mutex::new(ArrayAllocator::new(config.memory_limit));
        Self {
            config,
            builders: DashMap::new(),
            allocator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn add_record(&self, mut record: Record) -> Result<()> {
        record.normalize();
        let routing_key = record.routing_key();
        let mut builder = match self.builders.entry(routing_key) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => {
                debug!(routing_key = %entry.key(), "Creating record builder");
                let builder = RecordBuilder::new(entry.key().clone());
                entry.insert(builder)
            }
        };
        builder.add_record(record)
    }

    pub fn record_builder_count(&self) -> usize {
        self.builders.iter().filter(|b| !b.is_empty()).count()
    }

    pub fn optimize(&self) {
        for mut builder in self.builders.iter_mut() {
            let keys = sort_keys_for(&self.config, &builder);
            builder.optimize(&keys);
        }
    }

    /// Drains every non-empty builder, as [`RecordRepository::build`] does.
    ///
    /// [`RecordRepository::build`]: crate::repository::RecordRepository::build
    pub fn build(&self) -> Result<BTreeMap<String, RecordBatch>> {
        let mut allocator = self.allocator.lock().unwrap_or_else(PoisonError::into_inner);
        let mut guards: Vec<_> = self.builders.iter_mut().collect();
        build_all(
            guards.iter_mut().map(|guard| guard.value_mut()),
            &self.config,
            &mut allocator,
        )
    }

    pub fn metadata(&self) -> Vec<RecordBuilderMetadata> {
        let mut metadata: Vec<RecordBuilderMetadata> = self
            .builders
            .iter()
            .filter(|b| !b.is_empty())
            .map(|b| b.metadata())
            .collect();
        metadata.sort_by(|a, b| a.schema_id.cmp(&b.schema_id));
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_parallel_appends() {
        let repository = Arc::new(SharedRecordRepository::default());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let repository = Arc::clone(&repository);
                thread::spawn(move || {
                    for i in 0..250 {
                        let mut record = Record::new();
                        if t % 2 == 0 {
                            record.i64_field("n", i);
                        } else {
                            record.string_field("s", format!("{t}-{i}"));
                        }
                        repository.add_record(record).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(repository.record_builder_count(), 2);
        let batches = repository.build().unwrap();
        assert_eq!(batches["n:I64"].num_rows(), 500);
        assert_eq!(batches["s:Str"].num_rows(), 500);
        assert_eq!(repository.record_builder_count(), 0);
    }
}
