//! Handlers for `/pulls` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/pulls` | Optional `?status=open\|merged\|closed`, `?target=`, `?author=`; newest first |
//! | `POST` | `/pulls` | Body: [`NewPullRequest`]; returns 201 |
//! | `GET`  | `/pulls/:id` | Includes comments |
//! | `GET`  | `/pulls/:id/diff` | Base against source |
//! | `POST` | `/pulls/:id/merge` | Body: `{"merged_by":"..."}`; returns the merge revision |
//! | `POST` | `/pulls/:id/close` | Body: `{"closed_by":"..."}` |
//! | `POST` | `/pulls/:id/comments` | Body: [`NewComment`] |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use feast_core::{
  diff::Diff,
  pull::{NewComment, NewPullRequest, PullRequest, PullState},
  revision::Revision,
  store::{PullQuery, RecipeStore},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status: Option<PullState>,
  /// Target lineage.
  pub target: Option<Uuid>,
  pub author: Option<String>,
}

impl From<ListParams> for PullQuery {
  fn from(p: ListParams) -> Self {
    PullQuery {
      status:            p.status,
      target_lineage_id: p.target,
      author:            p.author,
    }
  }
}

/// `GET /pulls[?status=<state>][&target=<lineage>][&author=<user>]`
pub async fn list<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<PullRequest>>, ApiError> {
  let pulls = store
    .list_pull_requests(params.into())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(pulls))
}

// ─── Open ─────────────────────────────────────────────────────────────────────

/// `POST /pulls`
pub async fn open<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewPullRequest>,
) -> Result<impl IntoResponse, ApiError> {
  let pull = store.open_pull_request(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(pull)))
}

// ─── Read ─────────────────────────────────────────────────────────────────────

/// `GET /pulls/:id`
pub async fn get_one<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<PullRequest>, ApiError> {
  let pull = store
    .get_pull_request(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("pull request {id} not found")))?;
  Ok(Json(pull))
}

/// `GET /pulls/:id/diff`
pub async fn diff<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Diff>, ApiError> {
  let diff = store.get_diff(id).await.map_err(ApiError::store)?;
  Ok(Json(diff))
}

// ─── Resolve ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MergeBody {
  pub merged_by: String,
}

/// `POST /pulls/:id/merge`
pub async fn merge<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<MergeBody>,
) -> Result<Json<Revision>, ApiError> {
  let revision = store
    .merge_pull_request(id, body.merged_by)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(revision))
}

#[derive(Debug, Deserialize)]
pub struct CloseBody {
  pub closed_by: String,
}

/// `POST /pulls/:id/close`
pub async fn close<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CloseBody>,
) -> Result<Json<PullRequest>, ApiError> {
  let pull = store
    .close_pull_request(id, body.closed_by)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(pull))
}

// ─── Comments ─────────────────────────────────────────────────────────────────

/// `POST /pulls/:id/comments`
pub async fn comment<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<NewComment>,
) -> Result<impl IntoResponse, ApiError> {
  let comment = store.add_comment(id, body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(comment)))
}
