//! Line-delimited JSON codec for annotation records.
//!
//! Each entry is an object mapping one record id to its attributes:
//!
//! ```text
//! {"commercial-articulated-basket-02f5": {"annotated": false, "uid": "", "score": 1,
//!   "category": "basket", "placement": ["floor"], "chk_category": false}}
//! ```
//!
//! Metadata keys (`annotated`, `uid`/`owner`, `score`, `updated_at`) and
//! `chk_<field>` error flags are lifted into typed record fields; every other
//! key is kept as a field value. Sources may be JSONL (one entry per line) or
//! a single JSON array of entries, and entries may also use the flat
//! `{"id": "...", ...}` / `{"model_id": "...", ...}` shape produced by other
//! exporters.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::record::{AnnotationRecord, SCORE_CLEAN, SCORE_FLAGGED};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

pub const KEY_ANNOTATED: &str = "annotated";
/// Owner key written on export.
pub const KEY_OWNER: &str = "uid";
/// Owner key accepted on import.
pub const KEY_OWNER_ALIAS: &str = "owner";
pub const KEY_SCORE: &str = "score";
pub const KEY_UPDATED_AT: &str = "updated_at";
/// Legacy per-record "modified" marker; read and discarded.
pub const KEY_LEGACY_MODIFIED: &str = "modified";
/// Prefix of per-field error checkbox keys.
pub const FLAG_KEY_PREFIX: &str = "chk_";

/// Keys naming the record in the flat entry shape.
const FLAT_ID_KEYS: &[&str] = &["id", "model_id"];

/// Fields whose relative values are joined with an image base path on import.
pub const IMAGE_FIELD_PREFIX: &str = "image_url";

/// Whether `key` is taken by record metadata or flags and so cannot name a
/// field.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(FLAG_KEY_PREFIX)
        || FLAT_ID_KEYS.contains(&key)
        || [
            KEY_ANNOTATED,
            KEY_OWNER,
            KEY_OWNER_ALIAS,
            KEY_SCORE,
            KEY_UPDATED_AT,
            KEY_LEGACY_MODIFIED,
        ]
        .contains(&key)
}

/// Storage key of the error checkbox for `field`.
pub fn flag_key(field: &str) -> String {
    format!("{FLAG_KEY_PREFIX}{field}")
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Physical layout of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// One entry object per line.
    Lines,
    /// A single JSON array of entry objects.
    Array,
}

impl SourceFormat {
    /// A source whose first non-whitespace character is `[` is an array.
    pub fn detect(text: &str) -> Self {
        match text.trim_start().chars().next() {
            Some('[') => Self::Array,
            _ => Self::Lines,
        }
    }
}

/// Result of decoding a whole source.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub format: SourceFormat,
    pub records: Vec<AnnotationRecord>,
    /// Entries that failed to decode and were left out.
    pub skipped: usize,
}

/// Decode every entry of a JSONL or JSON-array source.
///
/// Malformed entries are logged and counted in [`ParsedSource::skipped`]. The
/// only hard failure is an array source that is not valid JSON as a whole,
/// since no individual entry can be recovered from it.
pub fn parse_source(text: &str) -> Result<ParsedSource, CoreError> {
    let format = SourceFormat::detect(text);
    let mut records = Vec::new();
    let mut skipped = 0;

    match format {
        SourceFormat::Lines => {
            for (idx, line) in text.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(line)
                    .map_err(|e| CoreError::Validation(format!("invalid JSON: {e}")))
                    .and_then(decode_entry)
                {
                    Ok(mut decoded) => records.append(&mut decoded),
                    Err(e) => {
                        tracing::warn!(line = idx + 1, error = %e, "Skipping malformed record");
                        skipped += 1;
                    }
                }
            }
        }
        SourceFormat::Array => {
            let entries: Vec<Value> = serde_json::from_str(text).map_err(|e| {
                CoreError::Validation(format!("Source is not a valid JSON array: {e}"))
            })?;
            for (idx, entry) in entries.into_iter().enumerate() {
                match decode_entry(entry) {
                    Ok(mut decoded) => records.append(&mut decoded),
                    Err(e) => {
                        tracing::warn!(entry = idx, error = %e, "Skipping malformed record");
                        skipped += 1;
                    }
                }
            }
        }
    }

    Ok(ParsedSource {
        format,
        records,
        skipped,
    })
}

/// Decode one entry object, which may describe several records in the
/// `{"<id>": {...}, "<id2>": {...}}` shape.
pub fn decode_entry(entry: Value) -> Result<Vec<AnnotationRecord>, CoreError> {
    let Value::Object(mut obj) = entry else {
        return Err(CoreError::Validation("entry is not a JSON object".into()));
    };

    for key in FLAT_ID_KEYS {
        if let Some(Value::String(id)) = obj.get(*key) {
            let id = id.clone();
            obj.remove(*key);
            return Ok(vec![decode_record(&id, obj)?]);
        }
    }

    if obj.is_empty() {
        return Err(CoreError::Validation("entry is empty".into()));
    }

    obj.into_iter()
        .map(|(id, attrs)| match attrs {
            Value::Object(attrs) => decode_record(&id, attrs),
            _ => Err(CoreError::Validation(format!(
                "attributes of '{id}' are not a JSON object"
            ))),
        })
        .collect()
}

/// Build a record from its id and attribute object.
pub fn decode_record(id: &str, attrs: Map<String, Value>) -> Result<AnnotationRecord, CoreError> {
    if id.trim().is_empty() {
        return Err(CoreError::Validation("record id is empty".into()));
    }

    let mut record = AnnotationRecord::new(id);
    let mut owner_seen = false;

    for (key, value) in attrs {
        match key.as_str() {
            KEY_ANNOTATED => {
                record.annotated = value.as_bool().ok_or_else(|| {
                    CoreError::Validation(format!("'{id}': annotated must be a boolean"))
                })?;
            }
            KEY_OWNER | KEY_OWNER_ALIAS => {
                let owner = match value {
                    Value::Null => String::new(),
                    Value::String(s) => s,
                    _ => {
                        return Err(CoreError::Validation(format!(
                            "'{id}': owner must be a string"
                        )))
                    }
                };
                // `uid` wins over `owner` when both are present and differ.
                if !owner_seen || key == KEY_OWNER {
                    record.owner = owner;
                }
                owner_seen = true;
            }
            KEY_SCORE => {
                record.score = match value.as_i64() {
                    Some(s) if s == i64::from(SCORE_CLEAN) => SCORE_CLEAN,
                    Some(s) if s == i64::from(SCORE_FLAGGED) => SCORE_FLAGGED,
                    _ => {
                        return Err(CoreError::Validation(format!(
                            "'{id}': score must be 0 or 1"
                        )))
                    }
                };
            }
            KEY_UPDATED_AT => {
                record.updated_at = match value {
                    Value::Null => None,
                    Value::String(s) => Some(parse_timestamp(id, &s)?),
                    _ => {
                        return Err(CoreError::Validation(format!(
                            "'{id}': updated_at must be an RFC 3339 string"
                        )))
                    }
                };
            }
            KEY_LEGACY_MODIFIED => {}
            _ => {
                if let Some(field) = key.strip_prefix(FLAG_KEY_PREFIX) {
                    let flagged = value.as_bool().ok_or_else(|| {
                        CoreError::Validation(format!("'{id}': {key} must be a boolean"))
                    })?;
                    record.field_flags.insert(field.to_string(), flagged);
                } else {
                    record.fields.insert(key, value);
                }
            }
        }
    }

    Ok(record)
}

fn parse_timestamp(id: &str, raw: &str) -> Result<Timestamp, CoreError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| CoreError::Validation(format!("'{id}': invalid updated_at '{raw}': {e}")))
}

/// Join relative `image_url*` values with `base_path`.
pub fn prefix_image_paths(record: &mut AnnotationRecord, base_path: &str) {
    let base = base_path.trim_end_matches('/');
    for (key, value) in record.fields.iter_mut() {
        if !key.starts_with(IMAGE_FIELD_PREFIX) {
            continue;
        }
        if let Value::String(path) = value {
            if !path.is_empty() && !path.starts_with('/') {
                *path = format!("{base}/{path}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a record as its `{"<id>": {...}}` entry.
pub fn encode_entry(record: &AnnotationRecord) -> Value {
    let mut attrs = Map::new();
    attrs.insert(KEY_ANNOTATED.into(), Value::Bool(record.annotated));
    attrs.insert(KEY_OWNER.into(), Value::String(record.owner.clone()));
    attrs.insert(KEY_SCORE.into(), Value::from(record.score));
    if let Some(updated_at) = record.updated_at {
        attrs.insert(KEY_UPDATED_AT.into(), Value::String(updated_at.to_rfc3339()));
    }
    for (key, value) in &record.fields {
        attrs.insert(key.clone(), value.clone());
    }
    for (field, flagged) in &record.field_flags {
        attrs.insert(flag_key(field), Value::Bool(*flagged));
    }

    let mut entry = Map::new();
    entry.insert(record.id.clone(), Value::Object(attrs));
    Value::Object(entry)
}

/// Encode records as JSONL, one entry per line, with a trailing newline.
pub fn encode_lines<'a>(records: impl IntoIterator<Item = &'a AnnotationRecord>) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&encode_entry(record).to_string());
        out.push('\n');
    }
    out
}

/// Encode records as a pretty-printed JSON array of entries.
pub fn encode_array<'a>(
    records: impl IntoIterator<Item = &'a AnnotationRecord>,
) -> Result<String, serde_json::Error> {
    let entries: Vec<Value> = records.into_iter().map(encode_entry).collect();
    serde_json::to_string_pretty(&entries)
}

/// Encode records in the given layout.
pub fn encode<'a>(
    format: SourceFormat,
    records: impl IntoIterator<Item = &'a AnnotationRecord>,
) -> Result<String, serde_json::Error> {
    match format {
        SourceFormat::Lines => Ok(encode_lines(records)),
        SourceFormat::Array => encode_array(records),
    }
}

/// Group flags by field, for callers that only need the set ones.
pub fn flagged_fields(flags: &BTreeMap<String, bool>) -> Vec<&str> {
    flags
        .iter()
        .filter(|&(_, &flagged)| flagged)
        .map(|(field, _)| field.as_str())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_jsonl_with_metadata_and_flags() {
        let text = r#"{"a": {"annotated": true, "uid": "alice", "score": 0, "category": "chair", "chk_category": true}}
{"b": {"category": ""}}"#;
        let parsed = parse_source(text).unwrap();
        assert_eq!(parsed.format, SourceFormat::Lines);
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.records.len(), 2);

        let a = &parsed.records[0];
        assert_eq!(a.id, "a");
        assert!(a.annotated);
        assert_eq!(a.owner, "alice");
        assert_eq!(a.score, 0);
        assert_eq!(a.fields.get("category"), Some(&json!("chair")));
        assert_eq!(a.field_flags.get("category"), Some(&true));
        assert!(!a.fields.contains_key("chk_category"));

        let b = &parsed.records[1];
        assert!(!b.annotated);
        assert!(b.is_unowned());
        assert_eq!(b.score, 1);
    }

    #[test]
    fn malformed_lines_are_skipped_and_counted() {
        let text = "{\"a\": {}}\nnot json\n[1,2]\n{\"b\": \"scalar\"}\n{\"c\": {\"score\": 7}}\n\n{\"d\": {}}\n";
        let parsed = parse_source(text).unwrap();
        let ids: Vec<_> = parsed.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);
        assert_eq!(parsed.skipped, 4);
    }

    #[test]
    fn array_source_is_detected_and_parsed() {
        let text = r#"[{"a": {"category": "lamp"}}, {"b": {"annotated": "yes"}}, {"c": {}}]"#;
        let parsed = parse_source(text).unwrap();
        assert_eq!(parsed.format, SourceFormat::Array);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn broken_array_source_is_an_error() {
        assert!(parse_source("[{\"a\": {}").is_err());
    }

    #[test]
    fn flat_entries_use_id_or_model_id() {
        let records = decode_entry(json!({"model_id": "m1", "owner": "bob", "category": "cup"})).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "m1");
        assert_eq!(records[0].owner, "bob");
        assert!(!records[0].fields.contains_key("model_id"));

        let records = decode_entry(json!({"id": "m2"})).unwrap();
        assert_eq!(records[0].id, "m2");
    }

    #[test]
    fn uid_wins_over_owner_alias() {
        let r = decode_record(
            "x",
            json!({"owner": "bob", "uid": "alice"}).as_object().unwrap().clone(),
        )
        .unwrap();
        assert_eq!(r.owner, "alice");
    }

    #[test]
    fn legacy_modified_key_is_dropped() {
        let r = decode_record("x", json!({"modified": true}).as_object().unwrap().clone()).unwrap();
        assert!(r.fields.is_empty());
    }

    #[test]
    fn encoded_entry_carries_every_core_field() {
        let mut r = AnnotationRecord::new("x").with_field("placement", json!(["floor"]));
        r.owner = "alice".into();
        r.annotated = true;
        r.score = 0;
        r.field_flags.insert("placement".into(), true);
        r.updated_at = Some(chrono::Utc::now());

        let entry = encode_entry(&r);
        let attrs = &entry["x"];
        assert_eq!(attrs["uid"], json!("alice"));
        assert_eq!(attrs["annotated"], json!(true));
        assert_eq!(attrs["score"], json!(0));
        assert_eq!(attrs["placement"], json!(["floor"]));
        assert_eq!(attrs["chk_placement"], json!(true));
        assert!(attrs["updated_at"].is_string());

        let decoded = decode_entry(entry).unwrap().remove(0);
        assert_eq!(decoded.owner, r.owner);
        assert_eq!(decoded.field_flags, r.field_flags);
        assert_eq!(decoded.fields, r.fields);
    }

    #[test]
    fn relative_image_paths_get_base_prefix() {
        let mut r = AnnotationRecord::new("x")
            .with_field("image_url", json!("renders/x.gif"))
            .with_field("image_url_side", json!("/abs/x.png"))
            .with_field("category", json!("renders/not-an-image"));
        prefix_image_paths(&mut r, "/data/");
        assert_eq!(r.fields["image_url"], json!("/data/renders/x.gif"));
        assert_eq!(r.fields["image_url_side"], json!("/abs/x.png"));
        assert_eq!(r.fields["category"], json!("renders/not-an-image"));
    }

    #[test]
    fn flagged_fields_lists_only_set_flags() {
        let flags: BTreeMap<String, bool> =
            [("a".to_string(), true), ("b".to_string(), false)].into_iter().collect();
        assert_eq!(flagged_fields(&flags), vec!["a"]);
    }
}
