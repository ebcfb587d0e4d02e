//! Core types and trait definitions for the Fork & Feast recipe store.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it. The diff and merge engines are pure
//! functions over [`document::RecipeDocument`]s; storage lives behind
//! [`store::RecipeStore`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod ancestry;
pub mod diff;
pub mod document;
pub mod error;
pub mod merge;
pub mod pull;
pub mod revision;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::{Categorize, Error, ErrorKind, Result};
