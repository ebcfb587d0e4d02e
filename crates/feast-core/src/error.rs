//! Error types for `feast-core`.
//!
//! Every error carries the ids needed to reconstruct its cause. Backends wrap
//! this type and report a coarse [`ErrorKind`] through [`Categorize`] so that
//! callers (the JSON API in particular) can decide between retrying,
//! refetching, and giving up without matching on backend-specific variants.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
  diff::Field,
  document::ContentId,
  pull::PullState,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("lineage not found: {0}")]
  LineageNotFound(Uuid),

  #[error("revision not found: {0}")]
  RevisionNotFound(Uuid),

  #[error("pull request not found: {0}")]
  PullRequestNotFound(Uuid),

  #[error("content not found: {0}")]
  ContentNotFound(ContentId),

  /// The caller's parent revision is no longer the lineage head.
  #[error(
    "lineage {lineage} has moved: expected head {expected}, found {actual}"
  )]
  Conflict {
    lineage:  Uuid,
    expected: Uuid,
    actual:   Uuid,
  },

  /// The target lineage changed the same fields as the pull request.
  #[error(
    "pull request {pull} conflicts with target head {target_head} on {}",
    join_fields(.fields)
  )]
  MergeConflict {
    pull:        Uuid,
    target_head: Uuid,
    fields:      Vec<Field>,
  },

  #[error(
    "revision {source_revision} shares no history with lineage {target_lineage}"
  )]
  Diverged {
    source_revision: Uuid,
    target_lineage:  Uuid,
  },

  #[error("revisions {0} and {1} have no common ancestor")]
  NoCommonAncestor(Uuid, Uuid),

  #[error("ancestry search exceeded the depth limit of {limit}")]
  DepthExceeded { limit: usize },

  #[error("revision {revision} is not in the history of lineage {lineage}")]
  RevisionNotInLineage { lineage: Uuid, revision: Uuid },

  #[error(
    "revision {source_revision} is already part of lineage {target_lineage}"
  )]
  NothingToMerge {
    source_revision: Uuid,
    target_lineage:  Uuid,
  },

  #[error("pull request {pull} is {state}")]
  InvalidState { pull: Uuid, state: PullState },

  /// `target` is the pull request or revision being commented on.
  #[error("comment anchor {entry} does not match the diff of {target}")]
  InvalidAnchor { target: Uuid, entry: usize },

  #[error("diff does not apply: {field} differs from the diff's base")]
  StaleDiff { field: Field },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn join_fields(fields: &[Field]) -> String {
  fields
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join(", ")
}

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse error class shared by every store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// A lineage, revision, pull request or content blob does not exist.
  NotFound,
  /// Optimistic-concurrency failure; refetch the head and retry.
  Conflict,
  /// The pull request is not in a state that permits the operation.
  InvalidState,
  /// The revision graph does not support the operation.
  Structural,
  /// The request references things that do not fit together.
  Invalid,
  /// Backend or encoding failure.
  Internal,
}

impl ErrorKind {
  pub fn is_retryable(self) -> bool { matches!(self, Self::Conflict) }
}

/// Implemented by every `RecipeStore::Error`.
pub trait Categorize {
  fn kind(&self) -> ErrorKind;
}

impl Categorize for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::LineageNotFound(_)
      | Self::RevisionNotFound(_)
      | Self::PullRequestNotFound(_)
      | Self::ContentNotFound(_) => ErrorKind::NotFound,
      Self::Conflict { .. } | Self::MergeConflict { .. } => ErrorKind::Conflict,
      Self::InvalidState { .. } => ErrorKind::InvalidState,
      Self::Diverged { .. }
      | Self::NoCommonAncestor(..)
      | Self::DepthExceeded { .. } => ErrorKind::Structural,
      Self::RevisionNotInLineage { .. }
      | Self::NothingToMerge { .. }
      | Self::InvalidAnchor { .. }
      | Self::StaleDiff { .. } => ErrorKind::Invalid,
      Self::Serialization(_) => ErrorKind::Internal,
    }
  }
}
