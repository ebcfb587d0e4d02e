//! [`MemoryStore`]: the in-memory implementation of [`RecipeStore`].

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
  },
};

use feast_core::{
  Error, Result,
  ancestry::{self, History, ParentLookup, Parents, RevisionLookup},
  diff::{Diff, diff},
  document::{ContentId, RecipeDocument},
  merge,
  pull::{Comment, NewComment, NewPullRequest, PullRequest},
  revision::{Lineage, NewRecipe, NewRevision, Revision},
  store::{LineageQuery, PullQuery, RecipeStore, StoreConfig, revision_diff},
};
use uuid::Uuid;

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Every revision in the store at one point in time.
///
/// Cloning is O(1); later commits do not show up in an existing snapshot.
#[derive(Debug, Clone, Default)]
pub struct Snapshot(im::HashMap<Uuid, Arc<Revision>>);

impl RevisionLookup for Snapshot {
  fn revision(&self, id: Uuid) -> Option<Arc<Revision>> {
    self.0.get(&id).cloned()
  }
}

impl ParentLookup for Snapshot {
  fn parents(&self, id: Uuid) -> Option<Parents> {
    self.0.get(&id).map(|r| Revision::parents(r))
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

type Content = (ContentId, Arc<RecipeDocument>);

/// A recipe store held entirely in memory.
///
/// Map locks are only ever held for a lookup or an insert. Each lineage also
/// has a mutex that is held while its head is compared and swapped; when two
/// lineages are involved they are locked in ascending id order, and lineage
/// mutexes are always taken before any map lock.
#[derive(Default)]
pub struct MemoryStore {
  config:    StoreConfig,
  contents:  RwLock<im::HashMap<ContentId, Arc<RecipeDocument>>>,
  revisions: RwLock<Snapshot>,
  lineages:  RwLock<im::OrdMap<Uuid, Lineage>>,
  heads:     RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
  pulls:     RwLock<im::OrdMap<Uuid, PullRequest>>,
  comments:  RwLock<im::HashMap<Uuid, im::Vector<Comment>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
  lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
  lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn hold(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
  pub fn new(config: StoreConfig) -> Self {
    Self { config, ..Default::default() }
  }

  /// The current revision graph.
  pub fn snapshot(&self) -> Snapshot { read(&self.revisions).clone() }

  fn lineage(&self, lineage_id: Uuid) -> Result<Lineage> {
    read(&self.lineages)
      .get(&lineage_id)
      .cloned()
      .ok_or(Error::LineageNotFound(lineage_id))
  }

  fn head_lock(&self, lineage_id: Uuid) -> Result<Arc<Mutex<()>>> {
    read(&self.heads)
      .get(&lineage_id)
      .cloned()
      .ok_or(Error::LineageNotFound(lineage_id))
  }

  fn pull(&self, pull_id: Uuid) -> Result<PullRequest> {
    read(&self.pulls)
      .get(&pull_id)
      .cloned()
      .ok_or(Error::PullRequestNotFound(pull_id))
  }

  /// Store `content` unless it is already present; returns the shared copy.
  fn intern(&self, (content_id, document): Content) -> Content {
    let mut contents = write(&self.contents);
    if let Some(existing) = contents.get(&content_id) {
      return (content_id, existing.clone());
    }
    contents.insert(content_id.clone(), document.clone());
    (content_id, document)
  }

  fn append(&self, revision: Revision) {
    write(&self.revisions)
      .0
      .insert(revision.revision_id, Arc::new(revision));
  }

  fn add_lineage(&self, lineage: Lineage) {
    write(&self.heads).insert(lineage.lineage_id, Arc::default());
    write(&self.lineages).insert(lineage.lineage_id, lineage);
  }

  /// Caller must hold the lineage's head lock.
  fn set_head(&self, lineage_id: Uuid, head: Uuid) {
    if let Some(lineage) = write(&self.lineages).get_mut(&lineage_id) {
      lineage.head_revision_id = head;
    }
  }

  fn put_document_sync(&self, document: RecipeDocument) -> Result<ContentId> {
    let (content_id, _) = self.intern(document.into_content()?);
    Ok(content_id)
  }

  fn create_recipe_sync(&self, input: NewRecipe) -> Result<(Lineage, Revision)> {
    let name = input.lineage_name();
    let content = self.intern(input.document.into_content()?);
    let (lineage, root) =
      Lineage::create(name, input.owner, content, input.message);

    self.append(root.clone());
    self.add_lineage(lineage.clone());
    tracing::info!(
      lineage = %lineage.lineage_id,
      root = %root.revision_id,
      "created recipe"
    );
    Ok((lineage, root))
  }

  fn fork_recipe_sync(
    &self,
    lineage_id: Uuid,
    revision_id: Uuid,
    owner: String,
  ) -> Result<Lineage> {
    let source = self.lineage(lineage_id)?;
    // A head only ever moves to a descendant, so this stays true even if
    // the source lineage commits meanwhile.
    ancestry::find_in_history(
      self.snapshot(),
      lineage_id,
      source.head_revision_id,
      revision_id,
      self.config.max_ancestry_depth,
    )?;

    let fork = Lineage::fork_of(&source, revision_id, owner);
    self.add_lineage(fork.clone());
    tracing::info!(
      source = %lineage_id,
      fork = %fork.lineage_id,
      at = %revision_id,
      "forked recipe"
    );
    Ok(fork)
  }

  fn commit_revision_sync(&self, input: NewRevision) -> Result<Revision> {
    let head_lock = self.head_lock(input.lineage_id)?;
    let _guard = hold(&head_lock);

    let head = self.lineage(input.lineage_id)?.head_revision_id;
    if head != input.parent_id {
      tracing::warn!(
        lineage = %input.lineage_id,
        expected = %input.parent_id,
        actual = %head,
        "rejected stale commit"
      );
      return Err(Error::Conflict {
        lineage:  input.lineage_id,
        expected: input.parent_id,
        actual:   head,
      });
    }

    let content = self.intern(input.document.into_content()?);
    let revision = Revision::new(
      input.lineage_id,
      Some(input.parent_id),
      content,
      input.author,
      input.message,
    );
    self.append(revision.clone());
    self.set_head(input.lineage_id, revision.revision_id);
    tracing::info!(
      lineage = %input.lineage_id,
      revision = %revision.revision_id,
      "committed revision"
    );
    Ok(revision)
  }

  fn open_pull_request_sync(&self, input: NewPullRequest) -> Result<PullRequest> {
    let (first, second) = if input.source_lineage_id <= input.target_lineage_id {
      (input.source_lineage_id, input.target_lineage_id)
    } else {
      (input.target_lineage_id, input.source_lineage_id)
    };
    let first_lock = self.head_lock(first)?;
    let second_lock =
      (first != second).then(|| self.head_lock(second)).transpose()?;
    let _first = hold(&first_lock);
    let _second = second_lock.as_deref().map(hold);

    let source = self.lineage(input.source_lineage_id)?;
    let target = self.lineage(input.target_lineage_id)?;
    let log = self.snapshot();
    let depth = self.config.max_ancestry_depth;

    ancestry::find_in_history(
      &log,
      source.lineage_id,
      source.head_revision_id,
      input.source_revision_id,
      depth,
    )?;
    let base =
      ancestry::merge_base(&log, &input, target.head_revision_id, depth)?;

    let pull = input.into_pull_request(base);
    write(&self.pulls).insert(pull.pull_id, pull.clone());
    tracing::info!(
      pull = %pull.pull_id,
      base = %pull.base_revision_id,
      "opened pull request"
    );
    Ok(pull)
  }

  fn get_diff_sync(&self, pull_id: Uuid) -> Result<Diff> {
    let pull = self.pull(pull_id)?;
    let log = self.snapshot();
    let base = log.fetch(pull.base_revision_id)?;
    let source = log.fetch(pull.source_revision_id)?;
    Ok(diff(&base.document, &source.document))
  }

  fn merge_pull_request_sync(
    &self,
    pull_id: Uuid,
    merged_by: String,
  ) -> Result<Revision> {
    let target_id = self.pull(pull_id)?.target_lineage_id;
    let head_lock = self.head_lock(target_id)?;
    let _guard = hold(&head_lock);

    // Re-read under the lock: a concurrent merge or close may have won.
    let mut pull = self.pull(pull_id)?;
    let head_id = self.lineage(target_id)?.head_revision_id;
    let log = self.snapshot();
    let base = log.fetch(pull.base_revision_id)?;
    let head = log.fetch(head_id)?;
    let source = log.fetch(pull.source_revision_id)?;

    let merged = merge::resolve_pull(&pull, &base, &head, &source)
      .inspect_err(|e| tracing::warn!(pull = %pull_id, "merge failed: {e}"))?;
    let content = self.intern(merged.into_content()?);
    let revision = Revision::new(
      target_id,
      Some(head_id),
      content,
      merged_by.clone(),
      merge::merge_message(&pull),
    )
    .with_merged_from(source.revision_id);
    pull.mark_merged(revision.revision_id, merged_by)?;

    self.append(revision.clone());
    self.set_head(target_id, revision.revision_id);
    if let Some(stored) = write(&self.pulls).get_mut(&pull_id) {
      stored.status = pull.status;
    }
    tracing::info!(
      pull = %pull_id,
      lineage = %target_id,
      revision = %revision.revision_id,
      "merged pull request"
    );
    Ok(revision)
  }

  fn close_pull_request_sync(
    &self,
    pull_id: Uuid,
    closed_by: String,
  ) -> Result<PullRequest> {
    let target_id = self.pull(pull_id)?.target_lineage_id;
    let head_lock = self.head_lock(target_id)?;
    let _guard = hold(&head_lock);

    let mut pull = self.pull(pull_id)?;
    pull.mark_closed(closed_by)?;

    let mut pulls = write(&self.pulls);
    let stored = pulls
      .get_mut(&pull_id)
      .ok_or(Error::PullRequestNotFound(pull_id))?;
    stored.status = pull.status;
    tracing::info!(pull = %pull_id, "closed pull request");
    Ok(stored.clone())
  }

  fn add_comment_sync(&self, pull_id: Uuid, input: NewComment) -> Result<Comment> {
    if input.anchor.is_some() {
      input.check_anchor(pull_id, &self.get_diff_sync(pull_id)?)?;
    }
    let comment = input.into_comment();
    write(&self.pulls)
      .get_mut(&pull_id)
      .ok_or(Error::PullRequestNotFound(pull_id))?
      .comments
      .push(comment.clone());
    Ok(comment)
  }

  fn add_revision_comment_sync(
    &self,
    revision_id: Uuid,
    input: NewComment,
  ) -> Result<Comment> {
    let log = self.snapshot();
    let revision = log.fetch(revision_id)?;
    if input.anchor.is_some() {
      input.check_anchor(revision_id, &revision_diff(&log, &revision)?)?;
    }

    let comment = input.into_comment();
    let mut comments = write(&self.comments);
    let mut thread = comments.get(&revision_id).cloned().unwrap_or_default();
    thread.push_back(comment.clone());
    comments.insert(revision_id, thread);
    Ok(comment)
  }

  fn revision_comments_sync(&self, revision_id: Uuid) -> Result<Vec<Comment>> {
    self.snapshot().fetch(revision_id)?;
    Ok(
      read(&self.comments)
        .get(&revision_id)
        .map(|thread| thread.iter().cloned().collect())
        .unwrap_or_default(),
    )
  }
}

// ─── RecipeStore impl ────────────────────────────────────────────────────────

impl RecipeStore for MemoryStore {
  type Error = Error;
  type Log = Snapshot;

  async fn put_document(&self, document: RecipeDocument) -> Result<ContentId> {
    self.put_document_sync(document)
  }

  async fn get_document(&self, content_id: ContentId) -> Result<RecipeDocument> {
    read(&self.contents)
      .get(&content_id)
      .map(|doc| RecipeDocument::clone(doc))
      .ok_or(Error::ContentNotFound(content_id))
  }

  async fn create_recipe(&self, input: NewRecipe) -> Result<(Lineage, Revision)> {
    self.create_recipe_sync(input)
  }

  async fn get_lineage(&self, lineage_id: Uuid) -> Result<Option<Lineage>> {
    Ok(read(&self.lineages).get(&lineage_id).cloned())
  }

  async fn list_lineages(&self, query: LineageQuery) -> Result<Vec<Lineage>> {
    let mut lineages: Vec<Lineage> = read(&self.lineages)
      .values()
      .filter(|l| query.matches(l))
      .cloned()
      .collect();
    lineages.sort_by_key(|l| l.created_at);
    Ok(lineages)
  }

  async fn fork_recipe(
    &self,
    lineage_id: Uuid,
    revision_id: Uuid,
    owner: String,
  ) -> Result<Lineage> {
    self.fork_recipe_sync(lineage_id, revision_id, owner)
  }

  async fn commit_revision(&self, input: NewRevision) -> Result<Revision> {
    self.commit_revision_sync(input)
  }

  async fn get_revision(&self, revision_id: Uuid) -> Result<Option<Revision>> {
    Ok(self.snapshot().revision(revision_id).map(|r| Revision::clone(&r)))
  }

  async fn history(&self, lineage_id: Uuid) -> Result<History<Snapshot>> {
    let head = self.lineage(lineage_id)?.head_revision_id;
    Ok(History::new(self.snapshot(), head))
  }

  async fn common_ancestor(&self, a: Uuid, b: Uuid) -> Result<Revision> {
    let found = ancestry::common_ancestor(
      self.snapshot(),
      a,
      b,
      self.config.max_ancestry_depth,
    )?;
    Ok(Revision::clone(&found))
  }

  async fn open_pull_request(&self, input: NewPullRequest) -> Result<PullRequest> {
    self.open_pull_request_sync(input)
  }

  async fn get_pull_request(&self, pull_id: Uuid) -> Result<Option<PullRequest>> {
    Ok(read(&self.pulls).get(&pull_id).cloned())
  }

  async fn list_pull_requests(&self, query: PullQuery) -> Result<Vec<PullRequest>> {
    let mut pulls: Vec<PullRequest> = read(&self.pulls)
      .values()
      .filter(|p| query.matches(p))
      .cloned()
      .collect();
    pulls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(pulls)
  }

  async fn get_diff(&self, pull_id: Uuid) -> Result<Diff> {
    self.get_diff_sync(pull_id)
  }

  async fn merge_pull_request(
    &self,
    pull_id: Uuid,
    merged_by: String,
  ) -> Result<Revision> {
    self.merge_pull_request_sync(pull_id, merged_by)
  }

  async fn close_pull_request(
    &self,
    pull_id: Uuid,
    closed_by: String,
  ) -> Result<PullRequest> {
    self.close_pull_request_sync(pull_id, closed_by)
  }

  async fn add_comment(&self, pull_id: Uuid, input: NewComment) -> Result<Comment> {
    self.add_comment_sync(pull_id, input)
  }

  async fn add_revision_comment(
    &self,
    revision_id: Uuid,
    input: NewComment,
  ) -> Result<Comment> {
    self.add_revision_comment_sync(revision_id, input)
  }

  async fn revision_comments(&self, revision_id: Uuid) -> Result<Vec<Comment>> {
    self.revision_comments_sync(revision_id)
  }
}
