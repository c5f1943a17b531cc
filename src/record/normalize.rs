//! Canonical field ordering.
//!
//! Every struct in a record (the root, nested structs, and structs inside
//! lists at any depth) is sorted by field name in byte order. Running it a
//! second time changes nothing.

use crate::value::{Field, Value};

/// Sorts `fields` and everything below them. Duplicate names keep the field
/// appended last.
pub fn normalize_fields(fields: &mut Vec<Field>) {
    for field in fields.iter_mut() {
        normalize_value(&mut field.value);
    }

    // Stable, so duplicates keep their insertion order until deduplicated.
    fields.sort_by(|a, b| a.name.cmp(&b.name));

    if fields.windows(2).any(|w| w[0].name == w[1].name) {
        dedup_keep_last(fields);
    }
}

/// Normalizes the structs contained in `value`; scalars are left untouched.
pub fn normalize_value(value: &mut Value) {
    match value {
        Value::Struct(s) => normalize_fields(&mut s.fields),
        Value::List(list) => list.values.iter_mut().for_each(normalize_value),
        _ => {}
    }
}

fn dedup_keep_last(fields: &mut Vec<Field>) {
    let mut unique: Vec<Field> = Vec::with_capacity(fields.len());
    for field in fields.drain(..) {
        match unique.last_mut() {
            Some(last) if last.name == field.name => *last = field,
            _ => unique.push(field),
        }
    }
    *fields = unique;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{List, Struct};

    fn names(fields: &[Field]) -> Vec<&str> {
        fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_sorts_nested_structs_inside_lists() {
        let mut fields = vec![
            Field::new("z", 1i64),
            Field::new(
                "events",
                List::new(vec![Value::Struct(Struct::new(vec![
                    Field::new("name", "x"),
                    Field::new("attributes", Struct::default()),
                ]))]),
            ),
        ];
        normalize_fields(&mut fields);

        assert_eq!(names(&fields), vec!["events", "z"]);
        let Value::List(events) = &fields[0].value else {
            panic!("expected a list");
        };
        let Value::Struct(event) = &events.values[0] else {
            panic!("expected a struct");
        };
        assert_eq!(names(&event.fields), vec!["attributes", "name"]);
    }

    #[test]
    fn test_byte_order_puts_uppercase_first() {
        let mut fields = vec![Field::new("b", 1i64), Field::new("B", 2i64), Field::new("a", 3i64)];
        normalize_fields(&mut fields);
        assert_eq!(names(&fields), vec!["B", "a", "b"]);
    }

    #[test]
    fn test_duplicates_keep_last() {
        let mut fields = vec![
            Field::new("a", 1i64),
            Field::new("b", 2i64),
            Field::new("a", 3i64),
        ];
        normalize_fields(&mut fields);
        assert_eq!(names(&fields), vec!["a", "b"]);
        assert_eq!(fields[0].value, Value::I64(3));
    }
}
