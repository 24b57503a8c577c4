//! Durable key-value storage on SQLite.
//!
//! Keys are `(namespace, key)` pairs and values are JSON documents. The only
//! capabilities callers rely on are point get/set and an ordered scan of a
//! namespace, so another embedded engine could replace SQLite here.

mod kv;
mod schema;
mod types;

pub use schema::Database;
pub use types::{DatabaseError, KvEntry};
