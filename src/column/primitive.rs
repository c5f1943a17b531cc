//! Scalar columns for numbers, booleans and binary payloads.
//!
//! A column starts untyped (only nulls) and settles on the type of the first
//! non-null value it receives. Later values may widen it within one numeric
//! family, in which case every stored slot is converted in place. Strings
//! never land here: a column that would have to become `String` is turned
//! into a [`DictionaryColumn`](super::DictionaryColumn) by its owner.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BinaryArray, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array,
    Int64Array, Int8Array, NullArray, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use tracing::debug;

use crate::error::{Error, Result};
use crate::value::{Value, ValueType};

/// Typed storage behind a [`PrimitiveColumn`].
#[derive(Clone, Debug, PartialEq)]
pub enum PrimitiveData {
    Null(usize),
    Bool(Vec<Option<bool>>),
    I8(Vec<Option<i8>>),
    I16(Vec<Option<i16>>),
    I32(Vec<Option<i32>>),
    I64(Vec<Option<i64>>),
    U8(Vec<Option<u8>>),
    U16(Vec<Option<u16>>),
    U32(Vec<Option<u32>>),
    U64(Vec<Option<u64>>),
    F32(Vec<Option<f32>>),
    F64(Vec<Option<f64>>),
    Binary(Vec<Option<Vec<u8>>>),
}

// Runs `$body` with `$v` bound to the slot vector of any typed variant.
macro_rules! with_slots {
    ($data:expr, $v:ident => $body:expr, null($n:ident) => $null:expr) => {
        match $data {
            PrimitiveData::Null($n) => $null,
            PrimitiveData::Bool($v) => $body,
            PrimitiveData::I8($v) => $body,
            PrimitiveData::I16($v) => $body,
            PrimitiveData::I32($v) => $body,
            PrimitiveData::I64($v) => $body,
            PrimitiveData::U8($v) => $body,
            PrimitiveData::U16($v) => $body,
            PrimitiveData::U32($v) => $body,
            PrimitiveData::U64($v) => $body,
            PrimitiveData::F32($v) => $body,
            PrimitiveData::F64($v) => $body,
            PrimitiveData::Binary($v) => $body,
        }
    };
}

impl PrimitiveData {
    /// Empty storage for `data_type`, or `None` when it is not a scalar kept here.
    fn empty(data_type: &ValueType, capacity: usize) -> Option<Self> {
        Some(match data_type {
            ValueType::Null => PrimitiveData::Null(0),
            ValueType::Bool => PrimitiveData::Bool(Vec::with_capacity(capacity)),
            ValueType::I8 => PrimitiveData::I8(Vec::with_capacity(capacity)),
            ValueType::I16 => PrimitiveData::I16(Vec::with_capacity(capacity)),
            ValueType::I32 => PrimitiveData::I32(Vec::with_capacity(capacity)),
            ValueType::I64 => PrimitiveData::I64(Vec::with_capacity(capacity)),
            ValueType::U8 => PrimitiveData::U8(Vec::with_capacity(capacity)),
            ValueType::U16 => PrimitiveData::U16(Vec::with_capacity(capacity)),
            ValueType::U32 => PrimitiveData::U32(Vec::with_capacity(capacity)),
            ValueType::U64 => PrimitiveData::U64(Vec::with_capacity(capacity)),
            ValueType::F32 => PrimitiveData::F32(Vec::with_capacity(capacity)),
            ValueType::F64 => PrimitiveData::F64(Vec::with_capacity(capacity)),
            ValueType::Binary => PrimitiveData::Binary(Vec::with_capacity(capacity)),
            ValueType::String | ValueType::List(_) | ValueType::Struct(_) => return None,
        })
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            PrimitiveData::Null(_) => ValueType::Null,
            PrimitiveData::Bool(_) => ValueType::Bool,
            PrimitiveData::I8(_) => ValueType::I8,
            PrimitiveData::I16(_) => ValueType::I16,
            PrimitiveData::I32(_) => ValueType::I32,
            PrimitiveData::I64(_) => ValueType::I64,
            PrimitiveData::U8(_) => ValueType::U8,
            PrimitiveData::U16(_) => ValueType::U16,
            PrimitiveData::U32(_) => ValueType::U32,
            PrimitiveData::U64(_) => ValueType::U64,
            PrimitiveData::F32(_) => ValueType::F32,
            PrimitiveData::F64(_) => ValueType::F64,
            PrimitiveData::Binary(_) => ValueType::Binary,
        }
    }

    pub fn len(&self) -> usize {
        with_slots!(self, v => v.len(), null(n) => *n)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push_null(&mut self) {
        with_slots!(self, v => v.push(None), null(n) => *n += 1)
    }

    /// Appends a value already known to fit this storage type.
    fn push(&mut self, value: &Value) -> Result<()> {
        match self {
            PrimitiveData::Null(n) if value.is_null() => *n += 1,
            PrimitiveData::Null(_) => {
                return Err(Error::MalformedValue {
                    path: String::new(),
                    reason: format!("{} value in an untyped column", value.value_type()),
                })
            }
            PrimitiveData::Bool(v) => v.push(value.as_bool()?),
            PrimitiveData::I8(v) => v.push(value.as_i8()?),
            PrimitiveData::I16(v) => v.push(value.as_i16()?),
            PrimitiveData::I32(v) => v.push(value.as_i32()?),
            PrimitiveData::I64(v) => v.push(value.as_i64()?),
            PrimitiveData::U8(v) => v.push(value.as_u8()?),
            PrimitiveData::U16(v) => v.push(value.as_u16()?),
            PrimitiveData::U32(v) => v.push(value.as_u32()?),
            PrimitiveData::U64(v) => v.push(value.as_u64()?),
            PrimitiveData::F32(v) => v.push(value.as_f32()?),
            PrimitiveData::F64(v) => v.push(value.as_f64()?),
            PrimitiveData::Binary(v) => v.push(value.as_binary()?.map(<[u8]>::to_vec)),
        }
        Ok(())
    }

    pub fn value(&self, row: usize) -> Value {
        fn slot<T: Clone + Into<Value>>(v: &[Option<T>], row: usize) -> Value {
            v.get(row)
                .and_then(Clone::clone)
                .map_or(Value::Null, Into::into)
        }
        with_slots!(self, v => slot(v, row), null(_n) => Value::Null)
    }

    /// Converts every stored slot to `target`.
    fn widen(&self, target: &ValueType) -> Result<Self> {
        let mut widened = Self::empty(target, self.len()).ok_or_else(|| Error::MalformedValue {
            path: String::new(),
            reason: format!("cannot store {target} in a scalar column"),
        })?;
        for row in 0..self.len() {
            widened.push(&self.value(row))?;
        }
        Ok(widened)
    }

    /// Reorders rows: row `i` of the result is row `indices[i]` of `self`.
    fn take(&mut self, indices: &[usize]) {
        with_slots!(
            self,
            v => {
                let mut old = std::mem::take(v);
                v.extend(indices.iter().map(|&i| old[i].take()));
            },
            null(_n) => {}
        )
    }

    fn clear(&mut self) {
        with_slots!(self, v => v.clear(), null(n) => *n = 0)
    }

    /// Moves the stored slots into an Arrow array, keeping allocated capacity.
    fn finish(&mut self) -> ArrayRef {
        match self {
            PrimitiveData::Null(n) => Arc::new(NullArray::new(std::mem::take(n))),
            PrimitiveData::Bool(v) => Arc::new(v.drain(..).collect::<BooleanArray>()),
            PrimitiveData::I8(v) => Arc::new(v.drain(..).collect::<Int8Array>()),
            PrimitiveData::I16(v) => Arc::new(v.drain(..).collect::<Int16Array>()),
            PrimitiveData::I32(v) => Arc::new(v.drain(..).collect::<Int32Array>()),
            PrimitiveData::I64(v) => Arc::new(v.drain(..).collect::<Int64Array>()),
            PrimitiveData::U8(v) => Arc::new(v.drain(..).collect::<UInt8Array>()),
            PrimitiveData::U16(v) => Arc::new(v.drain(..).collect::<UInt16Array>()),
            PrimitiveData::U32(v) => Arc::new(v.drain(..).collect::<UInt32Array>()),
            PrimitiveData::U64(v) => Arc::new(v.drain(..).collect::<UInt64Array>()),
            PrimitiveData::F32(v) => Arc::new(v.drain(..).collect::<Float32Array>()),
            PrimitiveData::F64(v) => Arc::new(v.drain(..).collect::<Float64Array>()),
            PrimitiveData::Binary(v) => Arc::new(v.drain(..).collect::<BinaryArray>()),
        }
    }
}

/// A leaf column with a running target type.
#[derive(Clone, Debug)]
pub struct PrimitiveColumn {
    name: String,
    path: String,
    data: PrimitiveData,
}

impl PrimitiveColumn {
    /// An untyped column holding `len` nulls.
    pub fn nulls(name: impl Into<String>, path: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            data: PrimitiveData::Null(len),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn data(&self) -> &PrimitiveData {
        &self.data
    }

    pub fn value_type(&self) -> ValueType {
        self.data.value_type()
    }

    /// True until the first non-null value arrives.
    pub fn is_untyped(&self) -> bool {
        matches!(self.data, PrimitiveData::Null(_))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn append_null(&mut self) {
        self.data.push_null();
    }

    /// Appends a scalar, widening the column first when `target` (the join of
    /// the column type and the value type) is wider than what is stored.
    pub fn append(&mut self, value: &Value, target: &ValueType) -> Result<()> {
        if *target != self.data.value_type() {
            if !self.is_untyped() {
                debug!(
                    path = %self.path,
                    from = %self.data.value_type(),
                    to = %target,
                    "Widening column"
                );
            }
            self.data = self.data.widen(target).map_err(|e| e.at_path(&self.path))?;
        }
        self.data.push(value).map_err(|e| e.at_path(&self.path))
    }

    pub fn value(&self, row: usize) -> Value {
        self.data.value(row)
    }

    /// Every slot rendered as text, nulls kept.
    pub fn to_text(&self) -> Vec<Option<String>> {
        (0..self.len())
            .map(|row| {
                let value = self.value(row);
                (!value.is_null()).then(|| value.to_text())
            })
            .collect()
    }

    pub fn take(&mut self, indices: &[usize]) {
        self.data.take(indices);
    }

    /// Drops every slot, keeping the type.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn finish(&mut self) -> ArrayRef {
        self.data.finish()
    }
}
