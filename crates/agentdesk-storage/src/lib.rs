// Postgres storage layer with sqlx
//
// This crate provides database implementations for core traits:
// - PgDocumentStore: implements DocumentStore over a JSONB documents table,
//   with live queries driven by LISTEN/NOTIFY

pub mod document_store;
pub mod models;
pub mod repositories;

pub use document_store::{PgDocumentStore, CHANGE_CHANNEL};
pub use models::*;
pub use repositories::*;
