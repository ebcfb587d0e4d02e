//! Revisions and lineages, the version history of a recipe.
//!
//! A revision is an immutable snapshot of a document plus its provenance.
//! Revisions are append-only: they are created by commits, merges and recipe
//! creation, and never updated or deleted. A lineage is one recipe's line of
//! development; the only mutable thing about it is which revision is its head.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  ancestry::Parents,
  document::{ContentId, RecipeDocument},
};

// ─── Revision ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
  pub revision_id:  Uuid,
  /// The lineage this revision was committed on.
  pub lineage_id:   Uuid,
  pub content_id:   ContentId,
  /// Shared with every other revision that has the same content.
  pub document:     Arc<RecipeDocument>,
  /// `None` only for the root revision of a recipe.
  pub parent_id:    Option<Uuid>,
  /// For merge commits, the pull request's source revision.
  pub merged_from:  Option<Uuid>,
  pub author:       String,
  /// Server-assigned; never changes after creation.
  pub committed_at: DateTime<Utc>,
  pub message:      String,
}

impl Revision {
  /// Build a fresh revision; the id and timestamp are assigned here.
  /// `content_id` must be the id of `document`.
  pub fn new(
    lineage_id: Uuid,
    parent_id: Option<Uuid>,
    (content_id, document): (ContentId, Arc<RecipeDocument>),
    author: String,
    message: String,
  ) -> Self {
    Self {
      revision_id: Uuid::new_v4(),
      lineage_id,
      content_id,
      document,
      parent_id,
      merged_from: None,
      author,
      committed_at: Utc::now(),
      message,
    }
  }

  pub fn with_merged_from(mut self, source: Uuid) -> Self {
    self.merged_from = Some(source);
    self
  }

  pub fn parents(&self) -> Parents {
    Parents { parent_id: self.parent_id, merged_from: self.merged_from }
  }

  pub fn is_root(&self) -> bool { self.parent_id.is_none() }

  pub fn is_merge(&self) -> bool { self.merged_from.is_some() }
}

// ─── Lineage ─────────────────────────────────────────────────────────────────

/// Where a forked lineage came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkPoint {
  pub lineage_id:  Uuid,
  pub revision_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lineage {
  pub lineage_id:       Uuid,
  pub name:             String,
  pub owner:            String,
  /// For a fork this is the source revision it was forked at; the fork
  /// shares that revision until its first commit.
  pub root_revision_id: Uuid,
  pub head_revision_id: Uuid,
  pub forked_from:      Option<ForkPoint>,
  pub created_at:       DateTime<Utc>,
}

impl Lineage {
  /// A new lineage whose root and head are `root`.
  pub fn new(name: String, owner: String, root: Uuid) -> Self {
    Self {
      lineage_id: Uuid::new_v4(),
      name,
      owner,
      root_revision_id: root,
      head_revision_id: root,
      forked_from: None,
      created_at: Utc::now(),
    }
  }

  /// The lineage of a brand-new recipe, together with its root revision.
  pub fn create(
    name: String,
    owner: String,
    content: (ContentId, Arc<RecipeDocument>),
    message: String,
  ) -> (Self, Revision) {
    let lineage_id = Uuid::new_v4();
    let root = Revision::new(lineage_id, None, content, owner.clone(), message);
    let lineage = Self {
      lineage_id,
      ..Self::new(name, owner, root.revision_id)
    };
    (lineage, root)
  }

  /// A fork of `source` at `revision_id`. Nothing about `source` changes.
  pub fn fork_of(source: &Lineage, revision_id: Uuid, owner: String) -> Self {
    Self {
      forked_from: Some(ForkPoint {
        lineage_id: source.lineage_id,
        revision_id,
      }),
      ..Self::new(source.name.clone(), owner, revision_id)
    }
  }

  pub fn is_fork(&self) -> bool { self.forked_from.is_some() }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::RecipeStore::create_recipe`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecipe {
  /// Defaults to the document's title.
  #[serde(default)]
  pub name:     Option<String>,
  pub owner:    String,
  pub document: RecipeDocument,
  #[serde(default = "NewRecipe::default_message")]
  pub message:  String,
}

impl NewRecipe {
  pub fn new(owner: impl Into<String>, document: RecipeDocument) -> Self {
    Self {
      name: None,
      owner: owner.into(),
      document,
      message: Self::default_message(),
    }
  }

  fn default_message() -> String { "Initial recipe creation".to_owned() }

  /// The lineage name this recipe will be created under.
  pub fn lineage_name(&self) -> String {
    self
      .name
      .clone()
      .unwrap_or_else(|| self.document.title.clone())
  }
}

/// Input to [`crate::store::RecipeStore::commit_revision`].
///
/// `parent_id` is the head the author edited; the commit is rejected if the
/// lineage has moved on since.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRevision {
  pub lineage_id: Uuid,
  pub parent_id:  Uuid,
  pub document:   RecipeDocument,
  pub author:     String,
  pub message:    String,
}

impl NewRevision {
  pub fn new(
    lineage_id: Uuid,
    parent_id: Uuid,
    document: RecipeDocument,
    author: impl Into<String>,
    message: impl Into<String>,
  ) -> Self {
    Self {
      lineage_id,
      parent_id,
      document,
      author: author.into(),
      message: message.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn merge_revision_lists_both_parents_in_order() {
    let doc = RecipeDocument::new("Toast", "");
    let content = (doc.content_id().unwrap(), Arc::new(doc));
    let (lineage, parent, source) =
      (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let rev = Revision::new(lineage, Some(parent), content, "a".into(), "m".into())
      .with_merged_from(source);

    assert!(rev.is_merge());
    assert_eq!(rev.parents().iter().collect::<Vec<_>>(), [parent, source]);
  }

  #[test]
  fn fork_points_back_at_its_source() {
    let source = Lineage::new("Toast".into(), "breadmaster".into(), Uuid::new_v4());
    let at = source.head_revision_id;
    let fork = Lineage::fork_of(&source, at, "glutenfreebaker".into());

    assert_ne!(fork.lineage_id, source.lineage_id);
    assert_eq!(fork.head_revision_id, at);
    assert_eq!(fork.root_revision_id, at);
    assert_eq!(fork.forked_from, Some(ForkPoint {
      lineage_id:  source.lineage_id,
      revision_id: at,
    }));
    assert_eq!(fork.name, "Toast");
  }

  #[test]
  fn created_lineage_starts_at_its_root() {
    let content = RecipeDocument::new("Toast", "").into_content().unwrap();
    let (lineage, root) = Lineage::create(
      "Toast".into(),
      "breadmaster".into(),
      content,
      "Initial recipe creation".into(),
    );
    assert!(root.is_root());
    assert_eq!(root.lineage_id, lineage.lineage_id);
    assert_eq!(lineage.head_revision_id, root.revision_id);
    assert_eq!(lineage.root_revision_id, root.revision_id);
    assert!(!lineage.is_fork());
  }

  #[test]
  fn recipe_name_defaults_to_title() {
    let input = NewRecipe::new("breadmaster", RecipeDocument::new("Toast", ""));
    assert_eq!(input.lineage_name(), "Toast");
    assert_eq!(input.message, "Initial recipe creation");
  }
}
