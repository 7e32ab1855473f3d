//! Row structs for the SQLite backend.

pub mod annotation;
