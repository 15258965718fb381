//! Core types and traits for the linkhop link registry.
//!
//! This crate provides the domain types shared by every storage backend,
//! the registry façade and the HTTP gateway, together with the [`Backend`]
//! capability trait the three storage variants implement.

pub mod backend;
pub mod error;
pub mod link;
pub mod shortcode;

pub use backend::Backend;
pub use error::{CoreError, Result, StorageError};
pub use link::{BatchReport, LinkRecord, NewLink, User, UserId, SYNTHETIC_OWNER};
pub use shortcode::ShortCode;
