//! Dirty-state detection: do the form's values differ from what is stored?
//!
//! Comparison is per field kind so that cosmetic differences introduced by
//! the UI (re-joined lists, re-spaced dimensions, trailing whitespace) do not
//! block navigation.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::record::{AnnotationRecord, EditedValues};
use crate::schema::{split_list, FieldKind, FieldSchema, FieldSpec, FieldValue};

/// Returns `true` as soon as one interactive field or flag differs.
pub fn is_modified(schema: &FieldSchema, stored: &AnnotationRecord, edited: &EditedValues) -> bool {
    schema.interactive().any(|spec| field_differs(spec, stored, edited))
        || schema.flaggable().any(|spec| flag_differs(spec, stored, edited))
}

/// Every interactive field key whose value or flag differs, in schema order.
pub fn changed_fields<'a>(
    schema: &'a FieldSchema,
    stored: &AnnotationRecord,
    edited: &EditedValues,
) -> Vec<&'a str> {
    schema
        .interactive()
        .filter(|spec| {
            field_differs(spec, stored, edited) || (spec.has_flag && flag_differs(spec, stored, edited))
        })
        .map(|spec| spec.key.as_str())
        .collect()
}

fn field_differs(spec: &FieldSpec, stored: &AnnotationRecord, edited: &EditedValues) -> bool {
    let stored_value = spec.load(&stored.fields);
    let edited_text = edited.fields.get(&spec.key).map(String::as_str).unwrap_or("");
    !values_equal(spec.kind, &stored_value, edited_text)
}

fn flag_differs(spec: &FieldSpec, stored: &AnnotationRecord, edited: &EditedValues) -> bool {
    let stored_flag = stored.field_flags.get(&spec.key).copied().unwrap_or(false);
    let edited_flag = edited.flags.get(&spec.key).copied().unwrap_or(false);
    stored_flag != edited_flag
}

/// Compare a stored value with the UI text for the same field.
pub fn values_equal(kind: FieldKind, stored: &FieldValue, edited: &str) -> bool {
    match kind {
        FieldKind::Text => stored.display().trim() == edited.trim(),
        FieldKind::Dimensions => strip_whitespace(&stored.display()) == strip_whitespace(edited),
        FieldKind::List => {
            let stored_items: BTreeSet<String> = match stored {
                FieldValue::List(items) => items.iter().cloned().collect(),
                other => split_list(&other.display()).into_iter().collect(),
            };
            let edited_items: BTreeSet<String> = split_list(edited).into_iter().collect();
            stored_items == edited_items
        }
        FieldKind::Json => json_equal(stored, edited),
    }
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn json_equal(stored: &FieldValue, edited: &str) -> bool {
    let edited_trimmed = edited.trim();
    let stored_value = match stored {
        FieldValue::Json(v) => v.clone(),
        other => other.to_json(),
    };
    match (&stored_value, edited_trimmed) {
        (Value::Null, "") => true,
        (Value::Object(map), "") => map.is_empty(),
        (Value::String(s), text) => s.trim() == text,
        (v, text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed) => &parsed == v,
            Err(_) => false,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
