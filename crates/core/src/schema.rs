//! Declarative field schema shared by persistence and the (external) form UI.
//!
//! A [`FieldSchema`] is pure data: an ordered list of [`FieldSpec`] entries
//! describing each annotated attribute, how it is persisted, how it is shown
//! as text, and whether it carries a per-field error checkbox. The store
//! layer, the dirty-state detector, and the session orchestrator all read the
//! same schema so that storage keys and comparison rules never drift apart.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::is_reserved_key;
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Separator used when a list field is shown as a single line of text.
pub const LIST_DISPLAY_SEPARATOR: &str = ", ";

/// Separator between the numbers of a dimensions field (`"0.6 * 0.4 * 0.02"`).
pub const DIMENSION_SEPARATOR: char = '*';

// ---------------------------------------------------------------------------
// Field kinds
// ---------------------------------------------------------------------------

/// How a field is persisted and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Plain scalar string.
    Text,
    /// `*`-delimited numeric string, compared with whitespace removed.
    Dimensions,
    /// Array of strings, shown as a comma-separated line, compared as a set.
    List,
    /// Arbitrary JSON object or array, shown pretty-printed.
    Json,
}

/// A typed field value, produced from the raw persisted JSON by
/// [`FieldSpec::load`] or from UI text by [`FieldSpec::parse_display`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Json(Value),
}

impl FieldValue {
    /// The text the UI shows for this value.
    pub fn display(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::List(items) => items.join(LIST_DISPLAY_SEPARATOR),
            Self::Json(Value::Null) => String::new(),
            Self::Json(Value::String(s)) => s.clone(),
            Self::Json(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
        }
    }

    /// The JSON form written to the store.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
            Self::Json(v) => v.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// FieldSpec
// ---------------------------------------------------------------------------

/// One annotated attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Storage key inside the record's `fields` map.
    pub key: String,
    /// Human-readable label. Defaults to the key when empty.
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_kind")]
    pub kind: FieldKind,
    /// Whether the annotator can flag this field as erroneous.
    #[serde(default)]
    pub has_flag: bool,
    /// Computed or display-only fields set this to `false`; they are neither
    /// saved from the form nor compared by the dirty-state detector.
    #[serde(default = "default_interactive")]
    pub interactive: bool,
}

fn default_kind() -> FieldKind {
    FieldKind::Text
}

fn default_interactive() -> bool {
    true
}

impl FieldSpec {
    pub fn new(key: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            kind,
            has_flag: true,
            interactive: true,
        }
    }

    /// Mark the field as computed (not editable, not compared).
    pub fn computed(mut self) -> Self {
        self.interactive = false;
        self.has_flag = false;
        self
    }

    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.key
        } else {
            &self.label
        }
    }

    /// Read this field from a record's raw field map. Absent values load as
    /// the empty value of the field's kind.
    pub fn load(&self, fields: &BTreeMap<String, Value>) -> FieldValue {
        let raw = fields.get(&self.key).unwrap_or(&Value::Null);
        match self.kind {
            FieldKind::Text | FieldKind::Dimensions => FieldValue::Text(scalar_text(raw)),
            FieldKind::List => FieldValue::List(list_items(raw)),
            FieldKind::Json => match raw {
                Value::Null => FieldValue::Json(Value::Null),
                other => FieldValue::Json(other.clone()),
            },
        }
    }

    /// Convert the UI's text for this field into a typed value.
    pub fn parse_display(&self, text: &str) -> FieldValue {
        match self.kind {
            FieldKind::Text | FieldKind::Dimensions => FieldValue::Text(text.to_string()),
            FieldKind::List => FieldValue::List(split_list(text)),
            FieldKind::Json => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return FieldValue::Json(Value::Object(serde_json::Map::new()));
                }
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(v) => FieldValue::Json(v),
                    Err(_) => FieldValue::Json(Value::String(text.to_string())),
                }
            }
        }
    }
}

/// Render a scalar JSON value as text; arrays are joined like list fields.
fn scalar_text(raw: &Value) -> String {
    match raw {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(_) => list_items(raw).join(LIST_DISPLAY_SEPARATOR),
        other => other.to_string(),
    }
}

fn list_items(raw: &Value) -> Vec<String> {
    match raw {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => split_list(s),
        other => vec![other.to_string()],
    }
}

/// Split a comma-separated line into trimmed, non-empty items.
pub fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// FieldSchema
// ---------------------------------------------------------------------------

/// Ordered list of annotated attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSchema {
    pub fields: Vec<FieldSpec>,
}

impl FieldSchema {
    /// Build and validate a schema.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, CoreError> {
        let schema = Self { fields };
        schema.validate()?;
        Ok(schema)
    }

    /// The default object-attribute schema: category, description, material,
    /// dimensions, mass and placement, all flaggable.
    pub fn object_attributes() -> Self {
        Self {
            fields: vec![
                FieldSpec::new("category", "Category", FieldKind::Text),
                FieldSpec::new("description", "Description", FieldKind::Text),
                FieldSpec::new("material", "Material", FieldKind::Text),
                FieldSpec::new("dimensions", "Dimensions", FieldKind::Dimensions),
                FieldSpec::new("mass", "Mass", FieldKind::Text),
                FieldSpec::new("placement", "Placement", FieldKind::List),
            ],
        }
    }

    /// Parse a schema from its JSON representation (an array of field specs).
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let fields: Vec<FieldSpec> = serde_json::from_str(json)
            .map_err(|e| CoreError::Validation(format!("Invalid field schema: {e}")))?;
        Self::new(fields)
    }

    /// Reject empty schemas, empty or duplicate keys, and keys the record
    /// format reserves for metadata and flags.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.fields.is_empty() {
            return Err(CoreError::Validation(
                "Field schema must declare at least one field".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for spec in &self.fields {
            if spec.key.trim().is_empty() {
                return Err(CoreError::Validation(
                    "Field schema contains an empty key".to_string(),
                ));
            }
            if is_reserved_key(&spec.key) {
                return Err(CoreError::Validation(format!(
                    "Field key '{}' is reserved for record metadata",
                    spec.key
                )));
            }
            if !seen.insert(spec.key.as_str()) {
                return Err(CoreError::Validation(format!(
                    "Field schema contains duplicate key '{}'",
                    spec.key
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Fields the annotator can edit.
    pub fn interactive(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.interactive)
    }

    /// Editable fields that carry an error checkbox.
    pub fn flaggable(&self) -> impl Iterator<Item = &FieldSpec> {
        self.interactive().filter(|f| f.has_flag)
    }

    pub fn kind_of(&self, key: &str) -> Option<FieldKind> {
        self.get(key).map(|f| f.kind)
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::object_attributes()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn default_schema_is_valid() {
        let schema = FieldSchema::object_attributes();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.kind_of("placement"), Some(FieldKind::List));
        assert_eq!(schema.kind_of("dimensions"), Some(FieldKind::Dimensions));
        assert_eq!(schema.flaggable().count(), 6);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let result = FieldSchema::new(vec![
            FieldSpec::new("a", "A", FieldKind::Text),
            FieldSpec::new("a", "A again", FieldKind::Text),
        ]);
        assert!(matches!(result, Err(CoreError::Validation(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn metadata_keys_are_rejected() {
        for key in ["score", "uid", "owner", "annotated", "updated_at", "modified", "id", "model_id", "chk_category"] {
            let result = FieldSchema::new(vec![
                FieldSpec::new("category", "Category", FieldKind::Text),
                FieldSpec::new(key, "Clash", FieldKind::Text),
            ]);
            assert!(
                matches!(result, Err(CoreError::Validation(ref msg)) if msg.contains("reserved")),
                "{key} accepted"
            );
        }
        assert!(FieldSchema::from_json_str(r#"[{"key": "category"}, {"key": "score"}]"#).is_err());
    }

    #[test]
    fn empty_schema_is_rejected() {
        assert!(FieldSchema::new(Vec::new()).is_err());
    }

    #[test]
    fn schema_parses_from_json_with_defaults() {
        let schema = FieldSchema::from_json_str(
            r#"[
                {"key": "object_name", "has_flag": true},
                {"key": "overall_description", "kind": "list"},
                {"key": "status", "interactive": false}
            ]"#,
        )
        .unwrap();
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.fields[0].kind, FieldKind::Text);
        assert_eq!(schema.fields[0].display_label(), "object_name");
        assert_eq!(schema.fields[1].kind, FieldKind::List);
        assert!(!schema.fields[1].has_flag);
        assert_eq!(schema.interactive().count(), 2);
    }

    #[test]
    fn list_field_loads_array_and_displays_joined() {
        let spec = FieldSpec::new("placement", "Placement", FieldKind::List);
        let value = spec.load(&fields(json!({"placement": ["floor", " wall "]})));
        assert_eq!(value, FieldValue::List(vec!["floor".into(), "wall".into()]));
        assert_eq!(value.display(), "floor, wall");
    }

    #[test]
    fn list_field_accepts_legacy_string_storage() {
        let spec = FieldSpec::new("placement", "Placement", FieldKind::List);
        let value = spec.load(&fields(json!({"placement": "floor, table,"})));
        assert_eq!(value, FieldValue::List(vec!["floor".into(), "table".into()]));
    }

    #[test]
    fn list_field_parses_display_text_back_to_array() {
        let spec = FieldSpec::new("placement", "Placement", FieldKind::List);
        let value = spec.parse_display(" floor ,, wall");
        assert_eq!(value.to_json(), json!(["floor", "wall"]));
    }

    #[test]
    fn absent_text_loads_as_empty() {
        let spec = FieldSpec::new("category", "Category", FieldKind::Text);
        assert_eq!(spec.load(&BTreeMap::new()), FieldValue::Text(String::new()));
    }

    #[test]
    fn numeric_text_is_rendered_as_string() {
        let spec = FieldSpec::new("mass", "Mass", FieldKind::Text);
        assert_eq!(spec.load(&fields(json!({"mass": 2.5}))).display(), "2.5");
    }

    #[test]
    fn json_field_falls_back_to_raw_text_when_unparseable() {
        let spec = FieldSpec::new("extra", "Extra", FieldKind::Json);
        assert_eq!(spec.parse_display("{not json"), FieldValue::Json(json!("{not json")));
        assert_eq!(spec.parse_display(r#"{"a": 1}"#), FieldValue::Json(json!({"a": 1})));
        assert_eq!(spec.parse_display("  "), FieldValue::Json(json!({})));
    }
}
