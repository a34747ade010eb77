//! Core data models for the gallery service.
//!
//! Records and stored objects map to database rows via `sqlx::FromRow`
//! and serialize as JSON via `serde`, so the same types travel through the
//! SQLite backend, the Supabase REST backend and the HTTP handlers.

pub mod image_record;
pub mod object_key;
pub mod storage_object;
pub mod style;
