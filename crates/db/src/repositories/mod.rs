//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods that
//! accept `&SqlitePool` (or a connection, for calls made inside a transaction)
//! as the first argument.

pub mod annotation_repo;

pub use annotation_repo::AnnotationRepo;
