//! recolumn - compiles hierarchical telemetry records into per-schema Arrow
//! record batches.
//!
//! Producers hand over [`Record`]s whose fields may appear in any order and
//! whose shapes vary from record to record. A [`RecordRepository`] normalizes
//! each record, routes it by schema fingerprint to a [`RecordBuilder`], and
//! accumulates it column by column. [`RecordRepository::build`] then returns
//! one `RecordBatch` per schema, ready for Parquet or any other Arrow
//! consumer.
//!
//! # Modules
//!
//! - [`value`] - typed field values and the coercion lattice
//! - [`record`] - records, normalization, fingerprints and path lookups
//! - [`column`] - columnar accumulators, including dictionary statistics
//! - [`builder`] / [`repository`] / [`shared`] - per-schema accumulation
//! - [`json`] - records from JSON documents
//! - [`parquet`] - Parquet output with a manifest
//!
//! # Example
//!
//! ```
//! use recolumn::{Record, RecordRepository};
//!
//! let mut repository = RecordRepository::default();
//! let mut record = Record::new();
//! record.string_field("name", "GET /");
//! record.u64_field("duration_ns", 1200);
//! repository.add_record(record).unwrap();
//!
//! let batches = repository.build().unwrap();
//! assert_eq!(batches["duration_ns:U64,name:Str"].num_rows(), 1);
//! ```

pub mod allocator;
pub mod builder;
pub mod column;
pub mod config;
pub mod error;
pub mod json;
pub mod parquet;
pub mod record;
pub mod repository;
pub mod shared;
pub mod value;

pub use allocator::ArrayAllocator;
pub use builder::{RecordBuilder, RecordBuilderMetadata};
pub use column::{ColumnMetadata, DictionaryStats};
pub use config::{Config, DictionaryConfig, DictionaryThresholds};
pub use error::{Error, Result};
pub use record::Record;
pub use repository::RecordRepository;
pub use shared::SharedRecordRepository;
pub use value::{Field, FieldType, List, Struct, Value, ValueType};
