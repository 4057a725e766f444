//! Core data models for the photo vault.
//!
//! Records map to SQLite rows via `sqlx::FromRow` and serialize to the
//! camelCase JSON shapes callers expect via `serde`.

pub mod access;
pub mod asset;
pub mod object;
pub mod owner;
