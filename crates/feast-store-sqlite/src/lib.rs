//! SQLite backend for the Fork & Feast recipe store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Ancestry queries load parent links,
//! never documents, with a depth-bounded recursive CTE and hand them to the
//! algorithms in [`feast_core::ancestry`]. History is read one revision at a
//! time through [`SqliteLog`].

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteLog, SqliteStore};

#[cfg(test)]
mod tests;
