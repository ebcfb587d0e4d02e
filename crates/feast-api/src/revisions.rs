//! Handlers for `/revisions` and `/contents` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/revisions/:id` | 404 if not found |
//! | `GET`  | `/revisions/:id/comments` | Oldest first |
//! | `POST` | `/revisions/:id/comments` | Body: [`NewComment`]; anchors refer to the diff against the first parent |
//! | `GET`  | `/revisions/:a/ancestor/:b` | Lowest common ancestor |
//! | `GET`  | `/contents/:content_id` | The stored document |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use feast_core::{
  document::{ContentId, RecipeDocument},
  pull::{Comment, NewComment},
  revision::Revision,
  store::RecipeStore,
};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /revisions/:id`
pub async fn get_one<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Revision>, ApiError> {
  let revision = store
    .get_revision(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("revision {id} not found")))?;
  Ok(Json(revision))
}

/// `GET /revisions/:id/comments`
pub async fn comments<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Comment>>, ApiError> {
  let comments = store.revision_comments(id).await.map_err(ApiError::store)?;
  Ok(Json(comments))
}

/// `POST /revisions/:id/comments`
pub async fn comment<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<NewComment>,
) -> Result<impl IntoResponse, ApiError> {
  let comment = store
    .add_revision_comment(id, body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(comment)))
}

/// `GET /revisions/:a/ancestor/:b`
pub async fn ancestor<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Path((a, b)): Path<(Uuid, Uuid)>,
) -> Result<Json<Revision>, ApiError> {
  let revision = store.common_ancestor(a, b).await.map_err(ApiError::store)?;
  Ok(Json(revision))
}

/// `GET /contents/:content_id`
pub async fn content<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Path(raw): Path<String>,
) -> Result<Json<RecipeDocument>, ApiError> {
  let content_id = ContentId::parse(&raw)
    .ok_or_else(|| ApiError::BadRequest(format!("malformed content id {raw:?}")))?;
  let document = store
    .get_document(content_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(document))
}
