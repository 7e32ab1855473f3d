//! Request handlers.
//!
//! Session handlers drive the annotator's [`AnnotationSession`] through the
//! [`SessionRegistry`]; the rest read the store directly. Errors map via
//! [`AppError`].
//!
//! [`AnnotationSession`]: annotator_core::session::AnnotationSession
//! [`SessionRegistry`]: annotator_core::session::SessionRegistry
//! [`AppError`]: crate::error::AppError

pub mod admin;
pub mod auth;
pub mod records;
pub mod session;
