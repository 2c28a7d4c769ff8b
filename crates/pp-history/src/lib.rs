//! Provenance history for PermaPass identities.
//!
//! Reconstructs the ordered version history of a passport by walking the
//! backward-linked chain of change pointers a registry program keeps per
//! identity. The walk itself is schema-agnostic; each registry contributes a
//! [`ChangeSchema`] describing its events.
//!
//! # Key Types
//!
//! - [`HistoryWalker`]: the iterative chain walk
//! - [`TokenUriSchema`], [`DidAttributeSchema`]: the registry event schemas
//! - [`EventClass`]: content-bearing vs pointer-only vs irrelevant

pub mod error;
pub mod schema;
pub mod walker;

pub use error::{HistoryError, HistoryResult};
pub use schema::{
    attribute_name, ChangeSchema, DidAttributeSchema, EventClass, TokenUriSchema,
    PASSPORT_ATTRIBUTE,
};
pub use walker::HistoryWalker;
