//! Handlers for `/recipes` endpoints. A recipe is addressed by its lineage id.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/recipes` | Optional `?owner=` and `?forked_from=` |
//! | `POST` | `/recipes` | Body: [`NewRecipe`]; returns 201 + lineage and root |
//! | `GET`  | `/recipes/:id` | 404 if not found |
//! | `GET`  | `/recipes/:id/history` | First-parent history, newest first; `?limit=` |
//! | `POST` | `/recipes/:id/commits` | Body: [`CommitBody`]; 409 on a stale parent |
//! | `POST` | `/recipes/:id/forks` | Body: [`ForkBody`]; returns 201 + the fork |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use feast_core::{
  document::RecipeDocument,
  revision::{Lineage, NewRecipe, NewRevision, Revision},
  store::{LineageQuery, RecipeStore},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /recipes[?owner=<user>][&forked_from=<lineage>]`
pub async fn list<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Query(query): Query<LineageQuery>,
) -> Result<Json<Vec<Lineage>>, ApiError> {
  let lineages = store.list_lineages(query).await.map_err(ApiError::store)?;
  Ok(Json(lineages))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Created {
  pub lineage:  Lineage,
  pub revision: Revision,
}

/// `POST /recipes`
pub async fn create<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewRecipe>,
) -> Result<impl IntoResponse, ApiError> {
  let (lineage, revision) =
    store.create_recipe(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(Created { lineage, revision })))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /recipes/:id`
pub async fn get_one<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Lineage>, ApiError> {
  let lineage = store
    .get_lineage(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("recipe {id} not found")))?;
  Ok(Json(lineage))
}

// ─── History ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub limit: Option<usize>,
}

/// `GET /recipes/:id/history[?limit=<n>]`
pub async fn history<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Arc<Revision>>>, ApiError> {
  let history = store.history(id).await.map_err(ApiError::store)?;
  let revisions = history
    .take(params.limit.unwrap_or(usize::MAX))
    .collect::<Result<Vec<_>, _>>()
    .map_err(ApiError::store)?;
  Ok(Json(revisions))
}

// ─── Commit ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /recipes/:id/commits`.
#[derive(Debug, Deserialize)]
pub struct CommitBody {
  /// The head the edit was made against.
  pub parent_id: Uuid,
  pub document:  RecipeDocument,
  pub author:    String,
  pub message:   String,
}

/// `POST /recipes/:id/commits`
pub async fn commit<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CommitBody>,
) -> Result<impl IntoResponse, ApiError> {
  let revision = store
    .commit_revision(NewRevision::new(
      id,
      body.parent_id,
      body.document,
      body.author,
      body.message,
    ))
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(revision)))
}

// ─── Fork ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ForkBody {
  pub owner:       String,
  /// Defaults to the recipe's current head.
  pub revision_id: Option<Uuid>,
}

/// `POST /recipes/:id/forks`
pub async fn fork<S: RecipeStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ForkBody>,
) -> Result<impl IntoResponse, ApiError> {
  let revision_id = match body.revision_id {
    Some(revision_id) => revision_id,
    None => {
      store
        .get_lineage(id)
        .await
        .map_err(ApiError::store)?
        .ok_or_else(|| ApiError::NotFound(format!("recipe {id} not found")))?
        .head_revision_id
    }
  };
  let fork = store
    .fork_recipe(id, revision_id, body.owner)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(fork)))
}
