//! Row model for the `annotations` table.

use std::collections::BTreeMap;

use annotator_core::record::AnnotationRecord;
use annotator_core::types::Timestamp;
use serde_json::Value;
use sqlx::FromRow;

use crate::error::DbError;

/// A row from the `annotations` table. The JSON columns are kept as text so a
/// single corrupt row can be skipped instead of failing the whole query.
#[derive(Debug, Clone, FromRow)]
pub struct AnnotationRow {
    pub id: String,
    pub annotated: bool,
    pub owner: String,
    pub score: i32,
    pub fields: String,
    pub field_flags: String,
    pub updated_at: Option<Timestamp>,
}

impl AnnotationRow {
    pub fn into_record(self) -> Result<AnnotationRecord, DbError> {
        let fields: BTreeMap<String, Value> =
            serde_json::from_str(&self.fields).map_err(|source| DbError::Decode {
                id: self.id.clone(),
                column: "fields",
                source,
            })?;
        let field_flags: BTreeMap<String, bool> =
            serde_json::from_str(&self.field_flags).map_err(|source| DbError::Decode {
                id: self.id.clone(),
                column: "field_flags",
                source,
            })?;
        Ok(AnnotationRecord {
            id: self.id,
            annotated: self.annotated,
            owner: self.owner,
            score: self.score,
            fields,
            field_flags,
            updated_at: self.updated_at,
        })
    }
}

/// Per-owner record count.
#[derive(Debug, Clone, FromRow)]
pub struct OwnerCount {
    pub owner: String,
    pub count: i64,
}

/// Aggregate progress counters.
#[derive(Debug, Clone, FromRow)]
pub struct ProgressCounts {
    pub total: i64,
    pub annotated: i64,
    pub flagged: i64,
}
