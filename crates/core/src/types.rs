/// Stable record key (`type-subtype-category-modelID` or a free-form model id).
pub type RecordId = String;

/// Annotator identity. The empty string means "no user".
pub type UserId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
