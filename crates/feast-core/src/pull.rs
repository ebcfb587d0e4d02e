//! Pull requests and review comments.
//!
//! A pull request proposes merging one lineage's revision into another
//! lineage. Its status moves `open → merged` or `open → closed` and never
//! back; comments can be added at any time, including after it is resolved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  diff::{Diff, Field},
};

// ─── Status ──────────────────────────────────────────────────────────────────

/// The status discriminant, without its payload.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PullState {
  Open,
  Merged,
  Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PullStatus {
  Open,
  Merged {
    /// The revision the merge created on the target lineage.
    revision_id: Uuid,
    merged_by:   String,
    at:          DateTime<Utc>,
  },
  Closed {
    closed_by: String,
    at:        DateTime<Utc>,
  },
}

impl PullStatus {
  pub fn state(&self) -> PullState {
    match self {
      Self::Open => PullState::Open,
      Self::Merged { .. } => PullState::Merged,
      Self::Closed { .. } => PullState::Closed,
    }
  }

  pub fn is_open(&self) -> bool { matches!(self, Self::Open) }
}

// ─── Comments ────────────────────────────────────────────────────────────────

/// Points a comment at one entry of the pull request's diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAnchor {
  /// Index into the diff's entries.
  pub entry: usize,
  pub field: Field,
}

impl CommentAnchor {
  pub fn matches(&self, diff: &Diff) -> bool {
    diff
      .get(self.entry)
      .is_some_and(|entry| *entry.field() == self.field)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
  pub comment_id: Uuid,
  pub author:     String,
  pub body:       String,
  pub anchor:     Option<CommentAnchor>,
  pub created_at: DateTime<Utc>,
}

/// Input to the comment operations of [`crate::store::RecipeStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
  pub author: String,
  pub body:   String,
  #[serde(default)]
  pub anchor: Option<CommentAnchor>,
}

impl NewComment {
  pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
    Self { author: author.into(), body: body.into(), anchor: None }
  }

  pub fn anchored(mut self, anchor: CommentAnchor) -> Self {
    self.anchor = Some(anchor);
    self
  }

  /// Check the anchor, if any, against the diff of `target`.
  pub fn check_anchor(&self, target: Uuid, diff: &Diff) -> Result<()> {
    match &self.anchor {
      Some(anchor) if !anchor.matches(diff) => {
        Err(Error::InvalidAnchor { target, entry: anchor.entry })
      }
      _ => Ok(()),
    }
  }

  pub fn into_comment(self) -> Comment {
    Comment {
      comment_id: Uuid::new_v4(),
      author:     self.author,
      body:       self.body,
      anchor:     self.anchor,
      created_at: Utc::now(),
    }
  }
}

// ─── Pull request ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
  pub pull_id:            Uuid,
  pub title:              String,
  pub description:        String,
  pub author:             String,
  pub source_lineage_id:  Uuid,
  pub source_revision_id: Uuid,
  pub target_lineage_id:  Uuid,
  /// Latest revision shared by the source revision and the target head when
  /// the pull request was opened.
  pub base_revision_id:   Uuid,
  pub status:             PullStatus,
  pub comments:           Vec<Comment>,
  pub created_at:         DateTime<Utc>,
}

impl PullRequest {
  pub fn state(&self) -> PullState { self.status.state() }

  /// [`Error::InvalidState`] unless the pull request is still open.
  pub fn ensure_open(&self) -> Result<()> {
    if self.status.is_open() {
      Ok(())
    } else {
      Err(Error::InvalidState { pull: self.pull_id, state: self.state() })
    }
  }

  /// Record the merge that created `revision_id`.
  pub fn mark_merged(&mut self, revision_id: Uuid, merged_by: String) -> Result<()> {
    self.ensure_open()?;
    self.status = PullStatus::Merged { revision_id, merged_by, at: Utc::now() };
    Ok(())
  }

  pub fn mark_closed(&mut self, closed_by: String) -> Result<()> {
    self.ensure_open()?;
    self.status = PullStatus::Closed { closed_by, at: Utc::now() };
    Ok(())
  }
}

/// Input to [`crate::store::RecipeStore::open_pull_request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPullRequest {
  pub source_lineage_id:  Uuid,
  pub source_revision_id: Uuid,
  pub target_lineage_id:  Uuid,
  pub author:             String,
  pub title:              String,
  #[serde(default)]
  pub description:        String,
}

impl NewPullRequest {
  /// The pull request this input opens, given the computed base.
  pub fn into_pull_request(self, base_revision_id: Uuid) -> PullRequest {
    PullRequest {
      pull_id: Uuid::new_v4(),
      title: self.title,
      description: self.description,
      author: self.author,
      source_lineage_id: self.source_lineage_id,
      source_revision_id: self.source_revision_id,
      target_lineage_id: self.target_lineage_id,
      base_revision_id,
      status: PullStatus::Open,
      comments: Vec::new(),
      created_at: Utc::now(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{diff::diff, document::RecipeDocument};

  fn open_pull() -> PullRequest {
    NewPullRequest {
      source_lineage_id:  Uuid::new_v4(),
      source_revision_id: Uuid::new_v4(),
      target_lineage_id:  Uuid::new_v4(),
      author:             "glutenfreebaker".into(),
      title:              "Add gluten-free flour alternative".into(),
      description:        String::new(),
    }
    .into_pull_request(Uuid::new_v4())
  }

  #[test]
  fn merged_is_terminal() {
    let mut pull = open_pull();
    pull.mark_merged(Uuid::new_v4(), "breadmaster".into()).unwrap();
    assert_eq!(pull.state(), PullState::Merged);

    let again = pull.mark_merged(Uuid::new_v4(), "breadmaster".into());
    assert!(matches!(
      again,
      Err(Error::InvalidState { state: PullState::Merged, .. })
    ));
    assert!(pull.mark_closed("breadmaster".into()).is_err());
  }

  #[test]
  fn closed_is_terminal() {
    let mut pull = open_pull();
    pull.mark_closed("plantbased".into()).unwrap();
    assert!(matches!(
      pull.mark_closed("plantbased".into()),
      Err(Error::InvalidState { state: PullState::Closed, .. })
    ));
    assert!(pull.mark_merged(Uuid::new_v4(), "x".into()).is_err());
  }

  #[test]
  fn anchors_must_match_the_diff() {
    let pull = open_pull();
    let base = RecipeDocument::new("Toast", "");
    let d = diff(&base, &base.clone().with_tag("breakfast"));

    let good = NewComment::new("breadmaster", "Nice")
      .anchored(CommentAnchor { entry: 2, field: Field::Tag("breakfast".into()) });
    assert!(good.check_anchor(pull.pull_id, &d).is_ok());

    let wrong_field = NewComment::new("breadmaster", "Nice")
      .anchored(CommentAnchor { entry: 0, field: Field::Description });
    assert!(wrong_field.check_anchor(pull.pull_id, &d).is_err());

    let out_of_range = NewComment::new("breadmaster", "Nice")
      .anchored(CommentAnchor { entry: 9, field: Field::Title });
    assert!(matches!(
      out_of_range.check_anchor(pull.pull_id, &d),
      Err(Error::InvalidAnchor { entry: 9, .. })
    ));
  }

  #[test]
  fn state_round_trips_through_strings() {
    use std::str::FromStr;
    assert_eq!(PullState::Merged.to_string(), "merged");
    assert_eq!(PullState::from_str("closed").unwrap(), PullState::Closed);
  }
}
