//! Type tags for values and the coercion lattice over them.
//!
//! A [`ValueType`] is what a value looks like with its payload stripped. Two
//! types are joined with [`ValueType::coerce`], which widens numbers within
//! one family and falls back to `String` whenever no lossless join exists.
//! The join is commutative and associative, so folding any number of types
//! in any order gives the same answer.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field as ArrowField, Fields};

/// The type of a [`Value`](super::Value).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
    Binary,
    /// Element type of a list, already coerced across its elements.
    List(Box<ValueType>),
    /// Fields of a struct, in the order they were found.
    Struct(Vec<FieldType>),
}

/// A named member of a [`ValueType::Struct`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub name: String,
    pub data_type: ValueType,
}

impl FieldType {
    pub fn new(name: impl Into<String>, data_type: ValueType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum NumericFamily {
    Signed,
    Unsigned,
    Float,
}

impl ValueType {
    fn numeric(&self) -> Option<(NumericFamily, u8)> {
        use NumericFamily::*;
        match self {
            ValueType::I8 => Some((Signed, 8)),
            ValueType::I16 => Some((Signed, 16)),
            ValueType::I32 => Some((Signed, 32)),
            ValueType::I64 => Some((Signed, 64)),
            ValueType::U8 => Some((Unsigned, 8)),
            ValueType::U16 => Some((Unsigned, 16)),
            ValueType::U32 => Some((Unsigned, 32)),
            ValueType::U64 => Some((Unsigned, 64)),
            ValueType::F32 => Some((Float, 32)),
            ValueType::F64 => Some((Float, 64)),
            _ => None,
        }
    }

    /// True for signed and unsigned integers (not floats, not bool).
    pub fn is_integer(&self) -> bool {
        matches!(
            self.numeric(),
            Some((NumericFamily::Signed | NumericFamily::Unsigned, _))
        )
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, ValueType::List(_) | ValueType::Struct(_))
    }

    /// Joins two types into the narrowest type able to hold both.
    ///
    /// - identical types and `Null` with anything keep the other side;
    /// - numbers widen within the signed, unsigned and float families;
    /// - `Bool` joins an integer type as that integer type;
    /// - lists join element-wise, structs join as the union of their fields;
    /// - every other combination becomes `String`.
    pub fn coerce(&self, other: &ValueType) -> ValueType {
        match (self, other) {
            (a, b) if a == b => a.clone(),
            (ValueType::Null, t) | (t, ValueType::Null) => t.clone(),
            (ValueType::List(a), ValueType::List(b)) => ValueType::List(Box::new(a.coerce(b))),
            (ValueType::Struct(a), ValueType::Struct(b)) => ValueType::Struct(union_fields(a, b)),
            (ValueType::Bool, t) | (t, ValueType::Bool) if t.is_integer() => t.clone(),
            (a, b) => match (a.numeric(), b.numeric()) {
                (Some((fa, wa)), Some((fb, wb))) if fa == fb => {
                    if wa >= wb {
                        a.clone()
                    } else {
                        b.clone()
                    }
                }
                _ => ValueType::String,
            },
        }
    }

    /// Collapses every numeric width to the widest member of its family.
    ///
    /// Two types with the same family form can always be widened into each
    /// other, which is what makes it usable as a routing key.
    pub fn family(&self) -> ValueType {
        match self {
            ValueType::I8 | ValueType::I16 | ValueType::I32 | ValueType::I64 => ValueType::I64,
            ValueType::U8 | ValueType::U16 | ValueType::U32 | ValueType::U64 => ValueType::U64,
            ValueType::F32 | ValueType::F64 => ValueType::F64,
            ValueType::List(element) => ValueType::List(Box::new(element.family())),
            ValueType::Struct(fields) => ValueType::Struct(
                fields
                    .iter()
                    .map(|f| FieldType::new(f.name.clone(), f.data_type.family()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Short tag used in schema fingerprints for scalar types.
    pub fn tag(&self) -> &'static str {
        match self {
            ValueType::Null => "Nul",
            ValueType::Bool => "Bol",
            ValueType::I8 => "I8",
            ValueType::I16 => "I16",
            ValueType::I32 => "I32",
            ValueType::I64 => "I64",
            ValueType::U8 => "U8",
            ValueType::U16 => "U16",
            ValueType::U32 => "U32",
            ValueType::U64 => "U64",
            ValueType::F32 => "F32",
            ValueType::F64 => "F64",
            ValueType::String => "Str",
            ValueType::Binary => "Bin",
            ValueType::List(_) => "List",
            ValueType::Struct(_) => "Struct",
        }
    }

    /// The Arrow type a column of this type finalizes to (without dictionary
    /// encoding, which is decided at build time).
    pub fn arrow_data_type(&self) -> DataType {
        match self {
            ValueType::Null => DataType::Null,
            ValueType::Bool => DataType::Boolean,
            ValueType::I8 => DataType::Int8,
            ValueType::I16 => DataType::Int16,
            ValueType::I32 => DataType::Int32,
            ValueType::I64 => DataType::Int64,
            ValueType::U8 => DataType::UInt8,
            ValueType::U16 => DataType::UInt16,
            ValueType::U32 => DataType::UInt32,
            ValueType::U64 => DataType::UInt64,
            ValueType::F32 => DataType::Float32,
            ValueType::F64 => DataType::Float64,
            ValueType::String => DataType::Utf8,
            ValueType::Binary => DataType::Binary,
            ValueType::List(element) => DataType::List(Arc::new(ArrowField::new(
                "item",
                element.arrow_data_type(),
                true,
            ))),
            ValueType::Struct(fields) => DataType::Struct(Fields::from(
                fields
                    .iter()
                    .map(|f| ArrowField::new(f.name.as_str(), f.data_type.arrow_data_type(), true))
                    .collect::<Vec<_>>(),
            )),
        }
    }
}

fn union_fields(a: &[FieldType], b: &[FieldType]) -> Vec<FieldType> {
    let mut merged: BTreeMap<&str, ValueType> = BTreeMap::new();
    for field in a.iter().chain(b) {
        match merged.get_mut(field.name.as_str()) {
            Some(existing) => *existing = existing.coerce(&field.data_type),
            None => {
                merged.insert(field.name.as_str(), field.data_type.clone());
            }
        }
    }
    merged
        .into_iter()
        .map(|(name, data_type)| FieldType::new(name, data_type))
        .collect()
}

/// Writes a field name, escaping the characters the fingerprint grammar uses.
pub(crate) fn write_name(f: &mut impl fmt::Write, name: &str) -> fmt::Result {
    for c in name.chars() {
        if matches!(c, '\\' | ':' | ',' | '{' | '}' | '[' | ']') {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    Ok(())
}

/// Writes `name:Type` pairs separated by commas.
pub(crate) fn write_fields(f: &mut impl fmt::Write, fields: &[FieldType]) -> fmt::Result {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            f.write_char(',')?;
        }
        write_name(f, &field.name)?;
        f.write_char(':')?;
        write!(f, "{}", field.data_type)?;
    }
    Ok(())
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::List(element) => write!(f, "[{element}]"),
            ValueType::Struct(fields) => {
                f.write_str("{")?;
                write_fields(f, fields)?;
                f.write_str("}")
            }
            scalar => f.write_str(scalar.tag()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalars() -> Vec<ValueType> {
        vec![
            ValueType::Null,
            ValueType::Bool,
            ValueType::I8,
            ValueType::I16,
            ValueType::I32,
            ValueType::I64,
            ValueType::U8,
            ValueType::U16,
            ValueType::U32,
            ValueType::U64,
            ValueType::F32,
            ValueType::F64,
            ValueType::String,
            ValueType::Binary,
        ]
    }

    fn all_types() -> Vec<ValueType> {
        let mut types = scalars();
        types.push(ValueType::List(Box::new(ValueType::I8)));
        types.push(ValueType::List(Box::new(ValueType::U32)));
        types.push(ValueType::Struct(vec![FieldType::new("a", ValueType::I8)]));
        types.push(ValueType::Struct(vec![
            FieldType::new("a", ValueType::String),
            FieldType::new("b", ValueType::Bool),
        ]));
        types
    }

    #[test]
    fn test_coerce_is_commutative() {
        for a in all_types() {
            for b in all_types() {
                assert_eq!(a.coerce(&b), b.coerce(&a), "coerce({a}, {b})");
            }
        }
    }

    #[test]
    fn test_coerce_is_associative() {
        let types = all_types();
        for a in &types {
            for b in &types {
                for c in &types {
                    assert_eq!(
                        a.coerce(b).coerce(c),
                        a.coerce(&b.coerce(c)),
                        "coerce({a}, {b}, {c})"
                    );
                }
            }
        }
    }

    #[test]
    fn test_coerce_widens_within_family() {
        assert_eq!(ValueType::I8.coerce(&ValueType::I16), ValueType::I16);
        assert_eq!(ValueType::I64.coerce(&ValueType::I32), ValueType::I64);
        assert_eq!(ValueType::U8.coerce(&ValueType::U64), ValueType::U64);
        assert_eq!(ValueType::F32.coerce(&ValueType::F64), ValueType::F64);
    }

    #[test]
    fn test_coerce_from_u8() {
        assert_eq!(ValueType::U8.coerce(&ValueType::I8), ValueType::String);
        assert_eq!(ValueType::U8.coerce(&ValueType::U8), ValueType::U8);
        assert_eq!(ValueType::U8.coerce(&ValueType::I16), ValueType::String);
        assert_eq!(ValueType::U8.coerce(&ValueType::U16), ValueType::U16);
        assert_eq!(ValueType::U8.coerce(&ValueType::I32), ValueType::String);
        assert_eq!(ValueType::U8.coerce(&ValueType::U32), ValueType::U32);
        assert_eq!(ValueType::U8.coerce(&ValueType::I64), ValueType::String);
        assert_eq!(ValueType::U8.coerce(&ValueType::U64), ValueType::U64);
        assert_eq!(ValueType::U8.coerce(&ValueType::Bool), ValueType::U8);
        assert_eq!(ValueType::U8.coerce(&ValueType::String), ValueType::String);
    }

    #[test]
    fn test_coerce_falls_back_to_string() {
        assert_eq!(ValueType::I64.coerce(&ValueType::F64), ValueType::String);
        assert_eq!(ValueType::Bool.coerce(&ValueType::F32), ValueType::String);
        assert_eq!(ValueType::Binary.coerce(&ValueType::U8), ValueType::String);
        let list = ValueType::List(Box::new(ValueType::I64));
        let strukt = ValueType::Struct(vec![FieldType::new("a", ValueType::I64)]);
        assert_eq!(list.coerce(&strukt), ValueType::String);
        assert_eq!(list.coerce(&ValueType::I64), ValueType::String);
    }

    #[test]
    fn test_coerce_null_is_identity() {
        for t in all_types() {
            assert_eq!(ValueType::Null.coerce(&t), t);
        }
    }

    #[test]
    fn test_struct_union() {
        let a = ValueType::Struct(vec![
            FieldType::new("f1", ValueType::I8),
            FieldType::new("f2", ValueType::I8),
        ]);
        let b = ValueType::Struct(vec![
            FieldType::new("f1", ValueType::String),
            FieldType::new("f3", ValueType::String),
        ]);
        assert_eq!(a.coerce(&b).to_string(), "{f1:Str,f2:I8,f3:Str}");
    }

    #[test]
    fn test_family_collapses_widths() {
        let t = ValueType::Struct(vec![
            FieldType::new("a", ValueType::I8),
            FieldType::new("b", ValueType::List(Box::new(ValueType::U16))),
            FieldType::new("c", ValueType::F32),
            FieldType::new("d", ValueType::Bool),
        ]);
        assert_eq!(t.family().to_string(), "{a:I64,b:[U64],c:F64,d:Bol}");
    }

    #[test]
    fn test_display_escapes_names() {
        let t = ValueType::Struct(vec![FieldType::new("a:b", ValueType::I8)]);
        assert_eq!(t.to_string(), "{a\\:b:I8}");
    }
}
