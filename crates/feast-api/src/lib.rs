//! JSON REST API for Fork & Feast.
//!
//! Exposes an axum [`Router`] backed by any [`feast_core::store::RecipeStore`].
//! Auth, TLS, and transport concerns are the caller's responsibility. Store
//! errors are mapped onto status codes by their
//! [`ErrorKind`](feast_core::ErrorKind).
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", feast_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod pulls;
pub mod recipes;
pub mod revisions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use feast_core::store::RecipeStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: RecipeStore + 'static,
{
  Router::new()
    // Recipes
    .route("/recipes", get(recipes::list::<S>).post(recipes::create::<S>))
    .route("/recipes/{id}", get(recipes::get_one::<S>))
    .route("/recipes/{id}/history", get(recipes::history::<S>))
    .route("/recipes/{id}/commits", post(recipes::commit::<S>))
    .route("/recipes/{id}/forks", post(recipes::fork::<S>))
    // Revisions
    .route("/revisions/{id}", get(revisions::get_one::<S>))
    .route(
      "/revisions/{id}/comments",
      get(revisions::comments::<S>).post(revisions::comment::<S>),
    )
    .route("/revisions/{a}/ancestor/{b}", get(revisions::ancestor::<S>))
    .route("/contents/{content_id}", get(revisions::content::<S>))
    // Pull requests
    .route("/pulls", get(pulls::list::<S>).post(pulls::open::<S>))
    .route("/pulls/{id}", get(pulls::get_one::<S>))
    .route("/pulls/{id}/diff", get(pulls::diff::<S>))
    .route("/pulls/{id}/merge", post(pulls::merge::<S>))
    .route("/pulls/{id}/close", post(pulls::close::<S>))
    .route("/pulls/{id}/comments", post(pulls::comment::<S>))
    .with_state(store)
}
