//! Schema fingerprints.
//!
//! A fingerprint is `name:Type` for each field in order, comma separated, with
//! lists rendered as `[T]` and structs as `{a:T,b:U}`. It only depends on the
//! shape of a normalized record, never on its values. Field names carrying
//! one of the grammar characters are backslash-escaped, so two different
//! shapes can never render to the same string.

use crate::value::types::write_fields;
use crate::value::{Field, FieldType};

/// Renders a list of field types as a fingerprint.
pub fn render(fields: &[FieldType]) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_fields(&mut out, fields);
    out
}

/// Field types of `fields`, pre-coercion.
pub fn field_types(fields: &[Field]) -> Vec<FieldType> {
    fields
        .iter()
        .map(|f| FieldType::new(f.name.clone(), f.value.value_type()))
        .collect()
}

/// The raw fingerprint: numeric widths are kept as they are.
pub fn schema_id(fields: &[Field]) -> String {
    render(&field_types(fields))
}

/// The fingerprint with numeric widths collapsed per family. Records sharing
/// it can be appended to the same columns by widening.
pub fn routing_key(fields: &[Field]) -> String {
    let collapsed: Vec<FieldType> = fields
        .iter()
        .map(|f| FieldType::new(f.name.clone(), f.value.value_type().family()))
        .collect();
    render(&collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{List, Struct, Value};

    #[test]
    fn test_schema_id_of_nested_fields() {
        let fields = vec![
            Field::new(
                "a",
                Struct::new(vec![
                    Field::new("b", ""),
                    Field::new("z", List::new(vec![Value::I8(1), Value::I64(2)])),
                ]),
            ),
            Field::new("b", ""),
        ];
        assert_eq!(schema_id(&fields), "a:{b:Str,z:[I64]},b:Str");
    }

    #[test]
    fn test_routing_key_collapses_widths() {
        let narrow = vec![Field::new("x", 1i8), Field::new("y", 1u16)];
        let wide = vec![Field::new("x", 1i64), Field::new("y", 1u64)];
        assert_ne!(schema_id(&narrow), schema_id(&wide));
        assert_eq!(routing_key(&narrow), routing_key(&wide));
        assert_eq!(routing_key(&narrow), "x:I64,y:U64");
    }

    #[test]
    fn test_names_with_delimiters_do_not_collide() {
        // Without escaping both would render as `a:I64,b:I64`.
        let tricky = vec![Field::new("a:I64,b", 1i64)];
        let plain = vec![Field::new("a", 1i64), Field::new("b", 1i64)];
        assert_ne!(schema_id(&tricky), schema_id(&plain));
    }

    #[test]
    fn test_values_do_not_matter() {
        let a = vec![Field::new("s", "hello"), Field::new("n", 1i32)];
        let b = vec![Field::new("s", "world"), Field::new("n", -9i32)];
        assert_eq!(schema_id(&a), schema_id(&b));
    }
}
