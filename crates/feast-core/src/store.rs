//! The `RecipeStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (`feast-store-memory`,
//! `feast-store-sqlite`). The JSON API and the server depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  ancestry::{History, RevisionLookup},
  diff::Diff,
  document::{ContentId, RecipeDocument},
  error::Categorize,
  pull::{Comment, NewComment, NewPullRequest, PullRequest, PullState},
  revision::{Lineage, NewRecipe, NewRevision, Revision},
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Settings shared by every backend.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
  /// Generations an ancestry search may walk before giving up with
  /// [`crate::Error::DepthExceeded`].
  #[serde(default = "StoreConfig::default_max_ancestry_depth")]
  pub max_ancestry_depth: usize,
}

impl StoreConfig {
  fn default_max_ancestry_depth() -> usize { 10_000 }
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self { max_ancestry_depth: Self::default_max_ancestry_depth() }
  }
}

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`RecipeStore::list_lineages`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineageQuery {
  pub owner:       Option<String>,
  /// Only lineages forked directly from this one.
  pub forked_from: Option<Uuid>,
}

impl LineageQuery {
  pub fn matches(&self, lineage: &Lineage) -> bool {
    self.owner.as_ref().is_none_or(|o| *o == lineage.owner)
      && self.forked_from.is_none_or(|id| {
        lineage.forked_from.is_some_and(|f| f.lineage_id == id)
      })
  }
}

/// Parameters for [`RecipeStore::list_pull_requests`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullQuery {
  pub status:            Option<PullState>,
  pub target_lineage_id: Option<Uuid>,
  pub author:            Option<String>,
}

impl PullQuery {
  pub fn matches(&self, pull: &PullRequest) -> bool {
    self.status.is_none_or(|s| s == pull.state())
      && self.target_lineage_id.is_none_or(|id| id == pull.target_lineage_id)
      && self.author.as_ref().is_none_or(|a| *a == pull.author)
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a recipe store backend.
///
/// Documents and revisions are append-only. The only mutable state is each
/// lineage's head pointer, which moves by compare-and-swap, and each pull
/// request's status, which moves once from open to merged or closed.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait RecipeStore: Send + Sync {
  type Error: std::error::Error + Categorize + Send + Sync + 'static;

  /// The revision lookup a [`History`] walks.
  type Log: RevisionLookup + Send + Sync;

  // ── Content ───────────────────────────────────────────────────────────

  /// Store a document under its content id. Storing the same content twice
  /// returns the same id and keeps one copy.
  fn put_document(
    &self,
    document: RecipeDocument,
  ) -> impl Future<Output = Result<ContentId, Self::Error>> + Send + '_;

  fn get_document(
    &self,
    content_id: ContentId,
  ) -> impl Future<Output = Result<RecipeDocument, Self::Error>> + Send + '_;

  // ── Lineages ──────────────────────────────────────────────────────────

  /// Create a recipe: a new lineage whose root revision holds `input.document`.
  fn create_recipe(
    &self,
    input: NewRecipe,
  ) -> impl Future<Output = Result<(Lineage, Revision), Self::Error>> + Send + '_;

  /// Retrieve a lineage by UUID. Returns `None` if not found.
  fn get_lineage(
    &self,
    lineage_id: Uuid,
  ) -> impl Future<Output = Result<Option<Lineage>, Self::Error>> + Send + '_;

  fn list_lineages(
    &self,
    query: LineageQuery,
  ) -> impl Future<Output = Result<Vec<Lineage>, Self::Error>> + Send + '_;

  /// Fork `lineage_id` at `revision_id`, which must be in its history. The
  /// source lineage is not modified.
  fn fork_recipe(
    &self,
    lineage_id: Uuid,
    revision_id: Uuid,
    owner: String,
  ) -> impl Future<Output = Result<Lineage, Self::Error>> + Send + '_;

  // ── Revisions ─────────────────────────────────────────────────────────

  /// Append a revision and advance the lineage head to it, provided the head
  /// is still `input.parent_id`. On conflict nothing is written.
  fn commit_revision(
    &self,
    input: NewRevision,
  ) -> impl Future<Output = Result<Revision, Self::Error>> + Send + '_;

  /// Retrieve a revision by UUID. Returns `None` if not found.
  fn get_revision(
    &self,
    revision_id: Uuid,
  ) -> impl Future<Output = Result<Option<Revision>, Self::Error>> + Send + '_;

  /// First-parent history of the lineage's current head.
  fn history(
    &self,
    lineage_id: Uuid,
  ) -> impl Future<Output = Result<History<Self::Log>, Self::Error>> + Send + '_;

  fn common_ancestor(
    &self,
    a: Uuid,
    b: Uuid,
  ) -> impl Future<Output = Result<Revision, Self::Error>> + Send + '_;

  // ── Pull requests ─────────────────────────────────────────────────────

  fn open_pull_request(
    &self,
    input: NewPullRequest,
  ) -> impl Future<Output = Result<PullRequest, Self::Error>> + Send + '_;

  /// Retrieve a pull request by UUID. Returns `None` if not found.
  fn get_pull_request(
    &self,
    pull_id: Uuid,
  ) -> impl Future<Output = Result<Option<PullRequest>, Self::Error>> + Send + '_;

  /// Pull requests matching `query`, newest first.
  fn list_pull_requests(
    &self,
    query: PullQuery,
  ) -> impl Future<Output = Result<Vec<PullRequest>, Self::Error>> + Send + '_;

  /// The changes the pull request proposes: its base against its source.
  fn get_diff(
    &self,
    pull_id: Uuid,
  ) -> impl Future<Output = Result<Diff, Self::Error>> + Send + '_;

  /// Merge into the target lineage and mark the pull request merged, as one
  /// atomic step. Returns the merge revision.
  fn merge_pull_request(
    &self,
    pull_id: Uuid,
    merged_by: String,
  ) -> impl Future<Output = Result<Revision, Self::Error>> + Send + '_;

  fn close_pull_request(
    &self,
    pull_id: Uuid,
    closed_by: String,
  ) -> impl Future<Output = Result<PullRequest, Self::Error>> + Send + '_;

  // ── Comments ──────────────────────────────────────────────────────────

  /// Comment on a pull request in any state.
  fn add_comment(
    &self,
    pull_id: Uuid,
    input: NewComment,
  ) -> impl Future<Output = Result<Comment, Self::Error>> + Send + '_;

  /// Comment on a revision. Anchors refer to the diff against its first
  /// parent.
  fn add_revision_comment(
    &self,
    revision_id: Uuid,
    input: NewComment,
  ) -> impl Future<Output = Result<Comment, Self::Error>> + Send + '_;

  /// Comments on a revision, oldest first.
  fn revision_comments(
    &self,
    revision_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Comment>, Self::Error>> + Send + '_;
}

/// The diff a revision's comment anchors refer to: its first parent against
/// itself, or the revision against itself for a root.
pub fn revision_diff<L: RevisionLookup>(
  log: L,
  revision: &Revision,
) -> crate::Result<Diff> {
  let base = match revision.parent_id {
    Some(parent) => log.fetch(parent)?.document.clone(),
    None => revision.document.clone(),
  };
  Ok(crate::diff::diff(&base, &revision.document))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn store_config_defaults_when_fields_are_missing() {
    let config: StoreConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.max_ancestry_depth, 10_000);
  }

  #[test]
  fn pull_query_filters_on_every_given_field() {
    let pull = NewPullRequest {
      source_lineage_id:  Uuid::new_v4(),
      source_revision_id: Uuid::new_v4(),
      target_lineage_id:  Uuid::new_v4(),
      author:             "plantbased".into(),
      title:              "Vegan version".into(),
      description:        String::new(),
    }
    .into_pull_request(Uuid::new_v4());

    assert!(PullQuery::default().matches(&pull));
    assert!(
      PullQuery {
        status: Some(PullState::Open),
        author: Some("plantbased".into()),
        ..Default::default()
      }
      .matches(&pull)
    );
    assert!(
      !PullQuery { status: Some(PullState::Merged), ..Default::default() }
        .matches(&pull)
    );
  }
}
