//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings with nanosecond precision,
//! so that they sort lexically. Documents and comment anchors are stored as
//! compact JSON. UUIDs are stored as hyphenated lowercase strings.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use feast_core::{
  ancestry::Parents,
  document::{ContentId, RecipeDocument},
  pull::{Comment, CommentAnchor, PullRequest, PullState, PullStatus},
  revision::{ForkPoint, Lineage, Revision},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_content_id(s: &str) -> Result<ContentId> {
  ContentId::parse(s)
    .ok_or_else(|| Error::Decode(format!("malformed content id: {s:?}")))
}

/// A column that must be set for the row's current state.
fn required(value: Option<String>, column: &str) -> Result<String> {
  value.ok_or_else(|| Error::Decode(format!("{column} is unexpectedly NULL")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Columns selected for a revision, joined with its content.
pub const REVISION_SELECT: &str = "
  SELECT r.revision_id, r.lineage_id, r.content_id, c.document_json,
         r.parent_id, r.merged_from, r.author, r.committed_at, r.message
    FROM revisions r
    JOIN contents c ON c.content_id = r.content_id";

/// Raw strings read directly from a `revisions` row joined with `contents`.
pub struct RawRevision {
  pub revision_id:   String,
  pub lineage_id:    String,
  pub content_id:    String,
  pub document_json: String,
  pub parent_id:     Option<String>,
  pub merged_from:   Option<String>,
  pub author:        String,
  pub committed_at:  String,
  pub message:       String,
}

impl RawRevision {
  /// Read a row selected with [`REVISION_SELECT`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      revision_id:   row.get(0)?,
      lineage_id:    row.get(1)?,
      content_id:    row.get(2)?,
      document_json: row.get(3)?,
      parent_id:     row.get(4)?,
      merged_from:   row.get(5)?,
      author:        row.get(6)?,
      committed_at:  row.get(7)?,
      message:       row.get(8)?,
    })
  }

  pub fn into_revision(self) -> Result<Revision> {
    let document: RecipeDocument = serde_json::from_str(&self.document_json)?;
    Ok(Revision {
      revision_id:  decode_uuid(&self.revision_id)?,
      lineage_id:   decode_uuid(&self.lineage_id)?,
      content_id:   decode_content_id(&self.content_id)?,
      document:     Arc::new(document),
      parent_id:    decode_opt_uuid(self.parent_id)?,
      merged_from:  decode_opt_uuid(self.merged_from)?,
      author:       self.author,
      committed_at: decode_dt(&self.committed_at)?,
      message:      self.message,
    })
  }
}

/// A revision's id and parent links, read without touching `contents`.
pub struct RawParents {
  pub revision_id: String,
  pub parent_id:   Option<String>,
  pub merged_from: Option<String>,
}

impl RawParents {
  /// Read a `(revision_id, parent_id, merged_from)` row.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      revision_id: row.get(0)?,
      parent_id:   row.get(1)?,
      merged_from: row.get(2)?,
    })
  }

  pub fn into_parents(self) -> Result<(Uuid, Parents)> {
    Ok((decode_uuid(&self.revision_id)?, Parents {
      parent_id:   decode_opt_uuid(self.parent_id)?,
      merged_from: decode_opt_uuid(self.merged_from)?,
    }))
  }
}

pub const LINEAGE_SELECT: &str = "
  SELECT lineage_id, name, owner, root_revision_id, head_revision_id,
         forked_from_lineage, forked_from_revision, created_at
    FROM lineages";

/// Raw strings read directly from a `lineages` row.
pub struct RawLineage {
  pub lineage_id:           String,
  pub name:                 String,
  pub owner:                String,
  pub root_revision_id:     String,
  pub head_revision_id:     String,
  pub forked_from_lineage:  Option<String>,
  pub forked_from_revision: Option<String>,
  pub created_at:           String,
}

impl RawLineage {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      lineage_id:           row.get(0)?,
      name:                 row.get(1)?,
      owner:                row.get(2)?,
      root_revision_id:     row.get(3)?,
      head_revision_id:     row.get(4)?,
      forked_from_lineage:  row.get(5)?,
      forked_from_revision: row.get(6)?,
      created_at:           row.get(7)?,
    })
  }

  pub fn into_lineage(self) -> Result<Lineage> {
    let forked_from = match (self.forked_from_lineage, self.forked_from_revision)
    {
      (Some(lineage), Some(revision)) => Some(ForkPoint {
        lineage_id:  decode_uuid(&lineage)?,
        revision_id: decode_uuid(&revision)?,
      }),
      _ => None,
    };
    Ok(Lineage {
      lineage_id: decode_uuid(&self.lineage_id)?,
      name: self.name,
      owner: self.owner,
      root_revision_id: decode_uuid(&self.root_revision_id)?,
      head_revision_id: decode_uuid(&self.head_revision_id)?,
      forked_from,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const PULL_SELECT: &str = "
  SELECT pull_id, title, description, author, source_lineage_id,
         source_revision_id, target_lineage_id, base_revision_id, status,
         resolved_by, resolved_at, merge_revision_id, created_at
    FROM pull_requests";

/// Raw strings read directly from a `pull_requests` row.
pub struct RawPull {
  pub pull_id:            String,
  pub title:              String,
  pub description:        String,
  pub author:             String,
  pub source_lineage_id:  String,
  pub source_revision_id: String,
  pub target_lineage_id:  String,
  pub base_revision_id:   String,
  pub status:             String,
  pub resolved_by:        Option<String>,
  pub resolved_at:        Option<String>,
  pub merge_revision_id:  Option<String>,
  pub created_at:         String,
}

impl RawPull {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      pull_id:            row.get(0)?,
      title:              row.get(1)?,
      description:        row.get(2)?,
      author:             row.get(3)?,
      source_lineage_id:  row.get(4)?,
      source_revision_id: row.get(5)?,
      target_lineage_id:  row.get(6)?,
      base_revision_id:   row.get(7)?,
      status:             row.get(8)?,
      resolved_by:        row.get(9)?,
      resolved_at:        row.get(10)?,
      merge_revision_id:  row.get(11)?,
      created_at:         row.get(12)?,
    })
  }

  pub fn into_pull(self, comments: Vec<Comment>) -> Result<PullRequest> {
    let state: PullState = self.status.parse().map_err(|_| {
      Error::Decode(format!("unknown pull request status: {:?}", self.status))
    })?;
    let status = match state {
      PullState::Open => PullStatus::Open,
      PullState::Merged => PullStatus::Merged {
        revision_id: decode_uuid(&required(
          self.merge_revision_id,
          "merge_revision_id",
        )?)?,
        merged_by:   required(self.resolved_by, "resolved_by")?,
        at:          decode_dt(&required(self.resolved_at, "resolved_at")?)?,
      },
      PullState::Closed => PullStatus::Closed {
        closed_by: required(self.resolved_by, "resolved_by")?,
        at:        decode_dt(&required(self.resolved_at, "resolved_at")?)?,
      },
    };

    Ok(PullRequest {
      pull_id: decode_uuid(&self.pull_id)?,
      title: self.title,
      description: self.description,
      author: self.author,
      source_lineage_id: decode_uuid(&self.source_lineage_id)?,
      source_revision_id: decode_uuid(&self.source_revision_id)?,
      target_lineage_id: decode_uuid(&self.target_lineage_id)?,
      base_revision_id: decode_uuid(&self.base_revision_id)?,
      status,
      comments,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// The `status`, `resolved_by`, `resolved_at` and `merge_revision_id`
/// columns for a status.
pub fn encode_status(
  status: &PullStatus,
) -> (String, Option<String>, Option<String>, Option<String>) {
  let state = status.state().to_string();
  match status {
    PullStatus::Open => (state, None, None, None),
    PullStatus::Merged { revision_id, merged_by, at } => (
      state,
      Some(merged_by.clone()),
      Some(encode_dt(*at)),
      Some(encode_uuid(*revision_id)),
    ),
    PullStatus::Closed { closed_by, at } => {
      (state, Some(closed_by.clone()), Some(encode_dt(*at)), None)
    }
  }
}

/// Raw strings read directly from a `comments` row.
pub struct RawComment {
  pub comment_id:  String,
  pub author:      String,
  pub body:        String,
  pub anchor_json: Option<String>,
  pub created_at:  String,
}

impl RawComment {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      comment_id:  row.get(0)?,
      author:      row.get(1)?,
      body:        row.get(2)?,
      anchor_json: row.get(3)?,
      created_at:  row.get(4)?,
    })
  }

  pub fn into_comment(self) -> Result<Comment> {
    let anchor: Option<CommentAnchor> = self
      .anchor_json
      .as_deref()
      .map(serde_json::from_str)
      .transpose()?;
    Ok(Comment {
      comment_id: decode_uuid(&self.comment_id)?,
      author: self.author,
      body: self.body,
      anchor,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
