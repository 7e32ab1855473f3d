//! Domain logic for the object-attribute annotation service.
//!
//! Everything here is free of HTTP and SQL: the record model and its field
//! schema, the ownership rules (visibility and claim-on-view), the dirty-state
//! detector, the navigation state machine, and the [`store::RecordStore`]
//! trait that the persistence backends in `annotator-db` implement.

pub mod assets;
pub mod assignment;
pub mod claim;
pub mod codec;
pub mod dirty;
pub mod error;
pub mod navigation;
pub mod record;
pub mod schema;
pub mod session;
pub mod store;
pub mod types;
pub mod visibility;
