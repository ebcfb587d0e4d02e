//! [`SqliteStore`]: the SQLite implementation of [`RecipeStore`].
//!
//! Every operation runs as one closure on the connection thread. Operations
//! that write do so inside a single transaction, so a failure part-way leaves
//! nothing behind, and a lineage head only ever moves through
//! `UPDATE … WHERE head_revision_id = <expected>`.

use std::{
  path::Path,
  sync::{Arc, Mutex, PoisonError},
};

use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use feast_core::{
  Error as CoreError,
  ancestry::{self, History, ParentMap, RevisionLookup, RevisionMap},
  diff::{Diff, diff},
  document::{ContentId, RecipeDocument},
  merge,
  pull::{Comment, NewComment, NewPullRequest, PullRequest},
  revision::{Lineage, NewRecipe, NewRevision, Revision},
  store::{LineageQuery, PullQuery, RecipeStore, StoreConfig, revision_diff},
};

use crate::{
  Error, Result,
  encode::{
    LINEAGE_SELECT, PULL_SELECT, REVISION_SELECT, RawComment, RawLineage,
    RawParents, RawPull, RawRevision, decode_uuid, encode_dt, encode_status,
    encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A recipe store backed by a single SQLite file.
///
/// Cloning is cheap. Both connections are reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  /// Serves [`SqliteLog`] lookups, which are synchronous.
  reader: Arc<Mutex<Connection>>,
  config: StoreConfig,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init_schema(&conn).await?;
    let reader = Connection::open(path)?;
    Ok(Self { conn, reader: Arc::new(Mutex::new(reader)), config })
  }

  /// Open an in-memory store, mostly for tests.
  ///
  /// The database is a named shared-cache one, so the history reader sees
  /// the same data as the writer.
  pub async fn open_in_memory() -> Result<Self> {
    let uri = format!("file:feast-{}?mode=memory&cache=shared", Uuid::new_v4());
    let conn = tokio_rusqlite::Connection::open(&uri).await?;
    Self::init_schema(&conn).await?;
    let reader = Connection::open(&uri)?;
    reader.pragma_update(None, "read_uncommitted", true)?;
    Ok(Self {
      conn,
      reader: Arc::new(Mutex::new(reader)),
      config: StoreConfig::default(),
    })
  }

  pub fn with_config(mut self, config: StoreConfig) -> Self {
    self.config = config;
    self
  }

  async fn init_schema(conn: &tokio_rusqlite::Connection) -> Result<()> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  fn log(&self) -> SqliteLog { SqliteLog { reader: self.reader.clone() } }

  /// Run `op` on the connection thread.
  pub(crate) async fn run<T, F>(&self, op: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(op(conn))).await?
  }
}

// ─── History log ─────────────────────────────────────────────────────────────

/// Revisions looked up one at a time, so a [`History`] only reads the rows
/// its caller consumes.
///
/// A failed read is logged and treated as a missing revision.
#[derive(Clone)]
pub struct SqliteLog {
  reader: Arc<Mutex<Connection>>,
}

impl RevisionLookup for SqliteLog {
  fn revision(&self, id: Uuid) -> Option<Arc<Revision>> {
    let conn = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
    match select_revision(&conn, id) {
      Ok(found) => found.map(Arc::new),
      Err(e) => {
        tracing::warn!(revision = %id, "history read failed: {e}");
        None
      }
    }
  }
}

// ─── Row access ──────────────────────────────────────────────────────────────

fn insert_content(
  conn: &Connection,
  content_id: &ContentId,
  document: &RecipeDocument,
) -> Result<()> {
  conn.execute(
    "INSERT OR IGNORE INTO contents (content_id, document_json) VALUES (?1, ?2)",
    params![content_id.as_str(), serde_json::to_string(document)?],
  )?;
  Ok(())
}

fn insert_revision(conn: &Connection, revision: &Revision) -> Result<()> {
  insert_content(conn, &revision.content_id, &revision.document)?;
  conn.execute(
    "INSERT INTO revisions (
       revision_id, lineage_id, content_id, parent_id, merged_from,
       author, committed_at, message
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      encode_uuid(revision.revision_id),
      encode_uuid(revision.lineage_id),
      revision.content_id.as_str(),
      revision.parent_id.map(encode_uuid),
      revision.merged_from.map(encode_uuid),
      revision.author,
      encode_dt(revision.committed_at),
      revision.message,
    ],
  )?;
  Ok(())
}

fn insert_lineage(conn: &Connection, lineage: &Lineage) -> Result<()> {
  conn.execute(
    "INSERT INTO lineages (
       lineage_id, name, owner, root_revision_id, head_revision_id,
       forked_from_lineage, forked_from_revision, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      encode_uuid(lineage.lineage_id),
      lineage.name,
      lineage.owner,
      encode_uuid(lineage.root_revision_id),
      encode_uuid(lineage.head_revision_id),
      lineage.forked_from.map(|f| encode_uuid(f.lineage_id)),
      lineage.forked_from.map(|f| encode_uuid(f.revision_id)),
      encode_dt(lineage.created_at),
    ],
  )?;
  Ok(())
}

fn insert_pull(conn: &Connection, pull: &PullRequest) -> Result<()> {
  let (status, resolved_by, resolved_at, merge_revision_id) =
    encode_status(&pull.status);
  conn.execute(
    "INSERT INTO pull_requests (
       pull_id, title, description, author, source_lineage_id,
       source_revision_id, target_lineage_id, base_revision_id, status,
       resolved_by, resolved_at, merge_revision_id, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    params![
      encode_uuid(pull.pull_id),
      pull.title,
      pull.description,
      pull.author,
      encode_uuid(pull.source_lineage_id),
      encode_uuid(pull.source_revision_id),
      encode_uuid(pull.target_lineage_id),
      encode_uuid(pull.base_revision_id),
      status,
      resolved_by,
      resolved_at,
      merge_revision_id,
      encode_dt(pull.created_at),
    ],
  )?;
  Ok(())
}

/// Persist a status change; only an open pull request can change.
fn update_status(conn: &Connection, pull: &PullRequest) -> Result<()> {
  let (status, resolved_by, resolved_at, merge_revision_id) =
    encode_status(&pull.status);
  let changed = conn.execute(
    "UPDATE pull_requests
        SET status = ?2, resolved_by = ?3, resolved_at = ?4,
            merge_revision_id = ?5
      WHERE pull_id = ?1 AND status = 'open'",
    params![
      encode_uuid(pull.pull_id),
      status,
      resolved_by,
      resolved_at,
      merge_revision_id,
    ],
  )?;
  if changed == 0 {
    let current = require_pull(conn, pull.pull_id)?;
    return Err(
      CoreError::InvalidState { pull: pull.pull_id, state: current.state() }
        .into(),
    );
  }
  Ok(())
}

/// Where a comment is attached.
enum Thread {
  Pull(Uuid),
  Revision(Uuid),
}

fn insert_comment(conn: &Connection, thread: Thread, comment: &Comment) -> Result<()> {
  let (pull_id, revision_id) = match thread {
    Thread::Pull(id) => (Some(encode_uuid(id)), None),
    Thread::Revision(id) => (None, Some(encode_uuid(id))),
  };
  let anchor_json = comment
    .anchor
    .as_ref()
    .map(serde_json::to_string)
    .transpose()?;
  conn.execute(
    "INSERT INTO comments (
       comment_id, pull_id, revision_id, author, body, anchor_json, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    params![
      encode_uuid(comment.comment_id),
      pull_id,
      revision_id,
      comment.author,
      comment.body,
      anchor_json,
      encode_dt(comment.created_at),
    ],
  )?;
  Ok(())
}

fn select_comments(conn: &Connection, thread: Thread) -> Result<Vec<Comment>> {
  let (sql, id) = match thread {
    Thread::Pull(id) => (
      "SELECT comment_id, author, body, anchor_json, created_at
         FROM comments WHERE pull_id = ?1 ORDER BY created_at, rowid",
      id,
    ),
    Thread::Revision(id) => (
      "SELECT comment_id, author, body, anchor_json, created_at
         FROM comments WHERE revision_id = ?1 ORDER BY created_at, rowid",
      id,
    ),
  };
  let mut stmt = conn.prepare(sql)?;
  let raws = stmt
    .query_map(params![encode_uuid(id)], RawComment::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawComment::into_comment).collect()
}

fn select_lineage(conn: &Connection, lineage_id: Uuid) -> Result<Option<Lineage>> {
  conn
    .query_row(
      &format!("{LINEAGE_SELECT} WHERE lineage_id = ?1"),
      params![encode_uuid(lineage_id)],
      RawLineage::from_row,
    )
    .optional()?
    .map(RawLineage::into_lineage)
    .transpose()
}

fn require_lineage(conn: &Connection, lineage_id: Uuid) -> Result<Lineage> {
  select_lineage(conn, lineage_id)?
    .ok_or_else(|| CoreError::LineageNotFound(lineage_id).into())
}

fn select_revision(
  conn: &Connection,
  revision_id: Uuid,
) -> Result<Option<Revision>> {
  conn
    .query_row(
      &format!("{REVISION_SELECT} WHERE r.revision_id = ?1"),
      params![encode_uuid(revision_id)],
      RawRevision::from_row,
    )
    .optional()?
    .map(RawRevision::into_revision)
    .transpose()
}

fn require_revision(conn: &Connection, revision_id: Uuid) -> Result<Revision> {
  select_revision(conn, revision_id)?
    .ok_or_else(|| CoreError::RevisionNotFound(revision_id).into())
}

fn select_pull(conn: &Connection, pull_id: Uuid) -> Result<Option<PullRequest>> {
  let raw = conn
    .query_row(
      &format!("{PULL_SELECT} WHERE pull_id = ?1"),
      params![encode_uuid(pull_id)],
      RawPull::from_row,
    )
    .optional()?;
  match raw {
    Some(raw) => {
      let comments = select_comments(conn, Thread::Pull(pull_id))?;
      Ok(Some(raw.into_pull(comments)?))
    }
    None => Ok(None),
  }
}

fn require_pull(conn: &Connection, pull_id: Uuid) -> Result<PullRequest> {
  select_pull(conn, pull_id)?
    .ok_or_else(|| CoreError::PullRequestNotFound(pull_id).into())
}

fn collect_parents(
  conn: &Connection,
  sql: &str,
  params: impl rusqlite::Params,
) -> Result<ParentMap> {
  let mut stmt = conn.prepare(sql)?;
  let raws = stmt
    .query_map(params, RawParents::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawParents::into_parents).collect()
}

/// Parent links along the first-parent chain of `head`, at most `max_depth`
/// steps back.
pub(crate) fn first_parent_links(
  conn: &Connection,
  head: Uuid,
  max_depth: usize,
) -> Result<ParentMap> {
  collect_parents(
    conn,
    "WITH RECURSIVE chain(revision_id, depth) AS (
       VALUES (?1, 0)
       UNION ALL
       SELECT r.parent_id, chain.depth + 1 FROM revisions r
         JOIN chain ON r.revision_id = chain.revision_id
        WHERE r.parent_id IS NOT NULL AND chain.depth < ?2
     )
     SELECT r.revision_id, r.parent_id, r.merged_from
       FROM revisions r
       JOIN chain ON chain.revision_id = r.revision_id",
    params![encode_uuid(head), depth_param(max_depth)],
  )
}

/// Parent links of every revision within `max_depth` generations of `a` or
/// `b`, along both links. The walk itself decides whether it had to go
/// further.
pub(crate) fn ancestor_links(
  conn: &Connection,
  a: Uuid,
  b: Uuid,
  max_depth: usize,
) -> Result<ParentMap> {
  collect_parents(
    conn,
    "WITH RECURSIVE walk(revision_id, depth) AS (
       VALUES (?1, 0), (?2, 0)
       UNION
       SELECT r.parent_id, w.depth + 1 FROM revisions r
         JOIN walk w ON r.revision_id = w.revision_id
        WHERE r.parent_id IS NOT NULL AND w.depth < ?3
       UNION
       SELECT r.merged_from, w.depth + 1 FROM revisions r
         JOIN walk w ON r.revision_id = w.revision_id
        WHERE r.merged_from IS NOT NULL AND w.depth < ?3
     )
     SELECT r.revision_id, r.parent_id, r.merged_from
       FROM revisions r
      WHERE r.revision_id IN (SELECT revision_id FROM walk)",
    params![encode_uuid(a), encode_uuid(b), depth_param(max_depth)],
  )
}

fn depth_param(max_depth: usize) -> i64 {
  i64::try_from(max_depth).unwrap_or(i64::MAX)
}

/// Compare-and-swap a lineage head.
fn swap_head(
  conn: &Connection,
  lineage_id: Uuid,
  expected: Uuid,
  new: Uuid,
) -> Result<()> {
  let changed = conn.execute(
    "UPDATE lineages SET head_revision_id = ?3
      WHERE lineage_id = ?1 AND head_revision_id = ?2",
    params![encode_uuid(lineage_id), encode_uuid(expected), encode_uuid(new)],
  )?;
  if changed == 0 {
    let actual = require_lineage(conn, lineage_id)?.head_revision_id;
    return Err(
      CoreError::Conflict { lineage: lineage_id, expected, actual }.into(),
    );
  }
  Ok(())
}

// ─── Operations ──────────────────────────────────────────────────────────────

fn create_recipe(conn: &mut Connection, input: NewRecipe) -> Result<(Lineage, Revision)> {
  let name = input.lineage_name();
  let content = input.document.into_content()?;
  let (lineage, root) =
    Lineage::create(name, input.owner, content, input.message);

  let tx = conn.transaction()?;
  insert_lineage(&tx, &lineage)?;
  insert_revision(&tx, &root)?;
  tx.commit()?;
  Ok((lineage, root))
}

fn fork_recipe(
  conn: &Connection,
  lineage_id: Uuid,
  revision_id: Uuid,
  owner: String,
  max_depth: usize,
) -> Result<Lineage> {
  let source = require_lineage(conn, lineage_id)?;
  let chain = first_parent_links(conn, source.head_revision_id, max_depth)?;
  ancestry::find_in_history(
    &chain,
    lineage_id,
    source.head_revision_id,
    revision_id,
    max_depth,
  )?;

  let fork = Lineage::fork_of(&source, revision_id, owner);
  insert_lineage(conn, &fork)?;
  Ok(fork)
}

fn commit_revision(conn: &mut Connection, input: NewRevision) -> Result<Revision> {
  let tx = conn.transaction()?;
  // Check the head before inserting, so a stale parent is reported as a
  // conflict rather than tripping a constraint.
  let head = require_lineage(&tx, input.lineage_id)?.head_revision_id;
  if head != input.parent_id {
    return Err(
      CoreError::Conflict {
        lineage:  input.lineage_id,
        expected: input.parent_id,
        actual:   head,
      }
      .into(),
    );
  }
  let revision = Revision::new(
    input.lineage_id,
    Some(input.parent_id),
    input.document.into_content()?,
    input.author,
    input.message,
  );
  insert_revision(&tx, &revision)?;
  swap_head(&tx, input.lineage_id, input.parent_id, revision.revision_id)?;
  tx.commit()?;
  Ok(revision)
}

fn open_pull_request(
  conn: &mut Connection,
  input: NewPullRequest,
  max_depth: usize,
) -> Result<PullRequest> {
  let tx = conn.transaction()?;
  let source = require_lineage(&tx, input.source_lineage_id)?;
  let target = require_lineage(&tx, input.target_lineage_id)?;

  let chain = first_parent_links(&tx, source.head_revision_id, max_depth)?;
  ancestry::find_in_history(
    &chain,
    source.lineage_id,
    source.head_revision_id,
    input.source_revision_id,
    max_depth,
  )?;
  let graph = ancestor_links(
    &tx,
    input.source_revision_id,
    target.head_revision_id,
    max_depth,
  )?;
  let base =
    ancestry::merge_base(&graph, &input, target.head_revision_id, max_depth)?;

  let pull = input.into_pull_request(base);
  insert_pull(&tx, &pull)?;
  tx.commit()?;
  Ok(pull)
}

fn pull_diff(conn: &Connection, pull: &PullRequest) -> Result<Diff> {
  let base = require_revision(conn, pull.base_revision_id)?;
  let source = require_revision(conn, pull.source_revision_id)?;
  Ok(diff(&base.document, &source.document))
}

fn merge_pull_request(
  conn: &mut Connection,
  pull_id: Uuid,
  merged_by: String,
) -> Result<Revision> {
  let tx = conn.transaction()?;
  let mut pull = require_pull(&tx, pull_id)?;
  pull.ensure_open()?;
  let target = require_lineage(&tx, pull.target_lineage_id)?;
  let base = require_revision(&tx, pull.base_revision_id)?;
  let head = require_revision(&tx, target.head_revision_id)?;
  let source = require_revision(&tx, pull.source_revision_id)?;

  let merged = merge::resolve_pull(&pull, &base, &head, &source)?;
  let revision = Revision::new(
    target.lineage_id,
    Some(head.revision_id),
    merged.into_content()?,
    merged_by.clone(),
    merge::merge_message(&pull),
  )
  .with_merged_from(source.revision_id);
  pull.mark_merged(revision.revision_id, merged_by)?;

  insert_revision(&tx, &revision)?;
  swap_head(&tx, target.lineage_id, head.revision_id, revision.revision_id)?;
  update_status(&tx, &pull)?;
  tx.commit()?;
  Ok(revision)
}

fn close_pull_request(
  conn: &mut Connection,
  pull_id: Uuid,
  closed_by: String,
) -> Result<PullRequest> {
  let tx = conn.transaction()?;
  let mut pull = require_pull(&tx, pull_id)?;
  pull.mark_closed(closed_by)?;
  update_status(&tx, &pull)?;
  tx.commit()?;
  Ok(pull)
}

fn add_comment(conn: &Connection, pull_id: Uuid, input: NewComment) -> Result<Comment> {
  let pull = require_pull(conn, pull_id)?;
  if input.anchor.is_some() {
    input.check_anchor(pull_id, &pull_diff(conn, &pull)?)?;
  }
  let comment = input.into_comment();
  insert_comment(conn, Thread::Pull(pull_id), &comment)?;
  Ok(comment)
}

fn add_revision_comment(
  conn: &Connection,
  revision_id: Uuid,
  input: NewComment,
) -> Result<Comment> {
  let revision = require_revision(conn, revision_id)?;
  if input.anchor.is_some() {
    let parents: RevisionMap = revision
      .parent_id
      .map(|p| require_revision(conn, p))
      .transpose()?
      .into_iter()
      .collect();
    input.check_anchor(revision_id, &revision_diff(&parents, &revision)?)?;
  }
  let comment = input.into_comment();
  insert_comment(conn, Thread::Revision(revision_id), &comment)?;
  Ok(comment)
}

fn list_lineages(conn: &Connection, query: LineageQuery) -> Result<Vec<Lineage>> {
  let sql = format!(
    "{LINEAGE_SELECT}
      WHERE (?1 IS NULL OR owner = ?1)
        AND (?2 IS NULL OR forked_from_lineage = ?2)
      ORDER BY created_at, rowid"
  );
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(
      params![query.owner, query.forked_from.map(encode_uuid)],
      RawLineage::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawLineage::into_lineage).collect()
}

fn list_pull_requests(
  conn: &Connection,
  query: PullQuery,
) -> Result<Vec<PullRequest>> {
  let sql = format!(
    "{PULL_SELECT}
      WHERE (?1 IS NULL OR status = ?1)
        AND (?2 IS NULL OR target_lineage_id = ?2)
        AND (?3 IS NULL OR author = ?3)
      ORDER BY created_at DESC, rowid DESC"
  );
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(
      params![
        query.status.map(|s| s.to_string()),
        query.target_lineage_id.map(encode_uuid),
        query.author,
      ],
      RawPull::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  raws
    .into_iter()
    .map(|raw| {
      let pull_id = decode_uuid(&raw.pull_id)?;
      let comments = select_comments(conn, Thread::Pull(pull_id))?;
      raw.into_pull(comments)
    })
    .collect()
}

// ─── RecipeStore impl ────────────────────────────────────────────────────────

impl RecipeStore for SqliteStore {
  type Error = crate::Error;
  type Log = SqliteLog;

  // ── Content ───────────────────────────────────────────────────────────────

  async fn put_document(&self, document: RecipeDocument) -> Result<ContentId> {
    let content_id = document.content_id()?;
    let id = content_id.clone();
    self
      .run(move |conn| insert_content(conn, &id, &document))
      .await?;
    Ok(content_id)
  }

  async fn get_document(&self, content_id: ContentId) -> Result<RecipeDocument> {
    let id = content_id.clone();
    let json: Option<String> = self
      .run(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT document_json FROM contents WHERE content_id = ?1",
              params![id.as_str()],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    let json = json.ok_or(CoreError::ContentNotFound(content_id))?;
    Ok(serde_json::from_str(&json)?)
  }

  // ── Lineages ──────────────────────────────────────────────────────────────

  async fn create_recipe(&self, input: NewRecipe) -> Result<(Lineage, Revision)> {
    let (lineage, root) = self.run(move |conn| create_recipe(conn, input)).await?;
    tracing::info!(lineage = %lineage.lineage_id, "created recipe");
    Ok((lineage, root))
  }

  async fn get_lineage(&self, lineage_id: Uuid) -> Result<Option<Lineage>> {
    self.run(move |conn| select_lineage(conn, lineage_id)).await
  }

  async fn list_lineages(&self, query: LineageQuery) -> Result<Vec<Lineage>> {
    self.run(move |conn| list_lineages(conn, query)).await
  }

  async fn fork_recipe(
    &self,
    lineage_id: Uuid,
    revision_id: Uuid,
    owner: String,
  ) -> Result<Lineage> {
    let max_depth = self.config.max_ancestry_depth;
    let fork = self
      .run(move |conn| {
        fork_recipe(conn, lineage_id, revision_id, owner, max_depth)
      })
      .await?;
    tracing::info!(source = %lineage_id, fork = %fork.lineage_id, "forked recipe");
    Ok(fork)
  }

  // ── Revisions ─────────────────────────────────────────────────────────────

  async fn commit_revision(&self, input: NewRevision) -> Result<Revision> {
    let revision = self
      .run(move |conn| commit_revision(conn, input))
      .await
      .inspect_err(|e| {
        if let Error::Core(CoreError::Conflict { lineage, expected, actual }) = e {
          tracing::warn!(%lineage, %expected, %actual, "rejected stale commit");
        }
      })?;
    tracing::info!(
      lineage = %revision.lineage_id,
      revision = %revision.revision_id,
      "committed revision"
    );
    Ok(revision)
  }

  async fn get_revision(&self, revision_id: Uuid) -> Result<Option<Revision>> {
    self.run(move |conn| select_revision(conn, revision_id)).await
  }

  async fn history(&self, lineage_id: Uuid) -> Result<History<SqliteLog>> {
    let head = self
      .run(move |conn| Ok(require_lineage(conn, lineage_id)?.head_revision_id))
      .await?;
    Ok(History::new(self.log(), head))
  }

  async fn common_ancestor(&self, a: Uuid, b: Uuid) -> Result<Revision> {
    let max_depth = self.config.max_ancestry_depth;
    self
      .run(move |conn| {
        let graph = ancestor_links(conn, a, b, max_depth)?;
        let found = ancestry::lowest_common_ancestor(&graph, a, b, max_depth)?;
        require_revision(conn, found)
      })
      .await
  }

  // ── Pull requests ─────────────────────────────────────────────────────────

  async fn open_pull_request(&self, input: NewPullRequest) -> Result<PullRequest> {
    let max_depth = self.config.max_ancestry_depth;
    let pull = self
      .run(move |conn| open_pull_request(conn, input, max_depth))
      .await?;
    tracing::info!(
      pull = %pull.pull_id,
      base = %pull.base_revision_id,
      "opened pull request"
    );
    Ok(pull)
  }

  async fn get_pull_request(&self, pull_id: Uuid) -> Result<Option<PullRequest>> {
    self.run(move |conn| select_pull(conn, pull_id)).await
  }

  async fn list_pull_requests(&self, query: PullQuery) -> Result<Vec<PullRequest>> {
    self.run(move |conn| list_pull_requests(conn, query)).await
  }

  async fn get_diff(&self, pull_id: Uuid) -> Result<Diff> {
    self
      .run(move |conn| pull_diff(conn, &require_pull(conn, pull_id)?))
      .await
  }

  async fn merge_pull_request(
    &self,
    pull_id: Uuid,
    merged_by: String,
  ) -> Result<Revision> {
    let revision = self
      .run(move |conn| merge_pull_request(conn, pull_id, merged_by))
      .await
      .inspect_err(|e| tracing::warn!(pull = %pull_id, "merge failed: {e}"))?;
    tracing::info!(
      pull = %pull_id,
      lineage = %revision.lineage_id,
      revision = %revision.revision_id,
      "merged pull request"
    );
    Ok(revision)
  }

  async fn close_pull_request(
    &self,
    pull_id: Uuid,
    closed_by: String,
  ) -> Result<PullRequest> {
    let pull = self
      .run(move |conn| close_pull_request(conn, pull_id, closed_by))
      .await?;
    tracing::info!(pull = %pull_id, "closed pull request");
    Ok(pull)
  }

  // ── Comments ──────────────────────────────────────────────────────────────

  async fn add_comment(&self, pull_id: Uuid, input: NewComment) -> Result<Comment> {
    self.run(move |conn| add_comment(conn, pull_id, input)).await
  }

  async fn add_revision_comment(
    &self,
    revision_id: Uuid,
    input: NewComment,
  ) -> Result<Comment> {
    self
      .run(move |conn| add_revision_comment(conn, revision_id, input))
      .await
  }

  async fn revision_comments(&self, revision_id: Uuid) -> Result<Vec<Comment>> {
    self
      .run(move |conn| {
        require_revision(conn, revision_id)?;
        select_comments(conn, Thread::Revision(revision_id))
      })
      .await
  }
}
