//! Repository for the `annotations` table.

use std::collections::BTreeMap;

use annotator_core::types::Timestamp;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};

use crate::models::annotation::{AnnotationRow, OwnerCount, ProgressCounts};

/// Column list for annotations queries.
const COLUMNS: &str = "id, annotated, owner, score, fields, field_flags, updated_at";

/// Values written by a save.
pub struct SaveRow<'a> {
    pub id: &'a str,
    pub user: &'a str,
    pub fields: &'a BTreeMap<String, Value>,
    pub field_flags: &'a str,
    pub score: i32,
    pub updated_at: Timestamp,
}

/// Provides queries over annotation records.
pub struct AnnotationRepo;

impl AnnotationRepo {
    /// All rows in import order.
    pub async fn list(pool: &SqlitePool) -> Result<Vec<AnnotationRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM annotations ORDER BY rowid ASC");
        sqlx::query_as::<_, AnnotationRow>(&query)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        id: &str,
    ) -> Result<Option<AnnotationRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM annotations WHERE id = ?");
        sqlx::query_as::<_, AnnotationRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Set the owner of an unowned record. Returns the number of rows
    /// changed: 0 when the record is missing or already owned.
    pub async fn claim(pool: &SqlitePool, id: &str, user: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE annotations SET owner = ? WHERE id = ? AND owner = ''")
            .bind(user)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Write a save in one statement, guarded by ownership. Schema fields are
    /// merged into the stored JSON object with `json_set`, so extra keys on
    /// the record survive. Returns the number of rows changed.
    pub async fn save(pool: &SqlitePool, save: &SaveRow<'_>) -> Result<u64, sqlx::Error> {
        let fields_expr = if save.fields.is_empty() {
            "fields".to_string()
        } else {
            let pairs = vec!["?, json(?)"; save.fields.len()].join(", ");
            format!("json_set(fields, {pairs})")
        };
        let query = format!(
            "UPDATE annotations SET
                fields = {fields_expr},
                field_flags = ?,
                score = ?,
                annotated = 1,
                owner = CASE WHEN owner = '' THEN ? ELSE owner END,
                updated_at = ?
             WHERE id = ? AND (owner = '' OR owner = ?)"
        );

        let mut q = sqlx::query(&query);
        for (key, value) in save.fields {
            q = q.bind(json_path(key)).bind(value.to_string());
        }
        let result = q
            .bind(save.field_flags)
            .bind(save.score)
            .bind(save.user)
            .bind(save.updated_at)
            .bind(save.id)
            .bind(save.user)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn exists(conn: &mut SqliteConnection, id: &str) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM annotations WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(found.is_some())
    }

    pub async fn insert(conn: &mut SqliteConnection, row: &AnnotationRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO annotations (id, annotated, owner, score, fields, field_flags, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(row.annotated)
        .bind(&row.owner)
        .bind(row.score)
        .bind(&row.fields)
        .bind(&row.field_flags)
        .bind(row.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Replace the field values of an existing record, leaving ownership,
    /// flags, score and annotation state alone.
    pub async fn update_fields(
        conn: &mut SqliteConnection,
        id: &str,
        fields: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE annotations SET fields = ? WHERE id = ?")
            .bind(fields)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Unconditionally set the owner. Administrative use only.
    pub async fn set_owner(
        conn: &mut SqliteConnection,
        id: &str,
        owner: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE annotations SET owner = ? WHERE id = ?")
            .bind(owner)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_all(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM annotations")
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn progress(pool: &SqlitePool) -> Result<ProgressCounts, sqlx::Error> {
        sqlx::query_as::<_, ProgressCounts>(
            "SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN annotated THEN 1 ELSE 0 END), 0) AS annotated,
                COALESCE(SUM(CASE WHEN annotated AND score = 0 THEN 1 ELSE 0 END), 0) AS flagged
             FROM annotations",
        )
        .fetch_one(pool)
        .await
    }

    pub async fn count_by_owner(pool: &SqlitePool) -> Result<Vec<OwnerCount>, sqlx::Error> {
        sqlx::query_as::<_, OwnerCount>(
            "SELECT owner, COUNT(*) AS count FROM annotations
             WHERE owner != ''
             GROUP BY owner
             ORDER BY owner ASC",
        )
        .fetch_all(pool)
        .await
    }
}

/// JSON path addressing a top-level key, quoted so keys with dots work.
fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', "\\\""))
}
