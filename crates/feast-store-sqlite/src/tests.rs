//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use feast_core::{
  Categorize, Error as CoreError, ErrorKind,
  diff::{Field, diff},
  document::{Ingredient, RecipeDocument, Step},
  pull::{CommentAnchor, NewComment, NewPullRequest, PullState, PullStatus},
  revision::{Lineage, NewRecipe, NewRevision, Revision},
  store::{LineageQuery, PullQuery, RecipeStore, StoreConfig},
};
use uuid::Uuid;

use crate::{
  Error, SqliteStore,
  store::{ancestor_links, first_parent_links},
};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn starter() -> RecipeDocument {
  RecipeDocument::new("Perfect Sourdough Starter", "A foolproof method")
    .with_tag("bread")
    .with_meta("difficulty", "Medium")
    .with_ingredient(Ingredient::new("All-purpose flour", "100g"))
    .with_ingredient(Ingredient::new("Water", "100ml").with_notes("lukewarm"))
    .with_step(Step::new("Day 1", "Mix flour and water."))
    .with_step(Step::new("Day 2-3", "Observe."))
}

async fn seeded(s: &SqliteStore) -> (Lineage, Revision) {
  s.create_recipe(NewRecipe::new("breadmaster", starter()))
    .await
    .unwrap()
}

async fn edit(
  s: &SqliteStore,
  lineage_id: Uuid,
  change: impl FnOnce(&mut RecipeDocument),
) -> Revision {
  let head = s
    .get_lineage(lineage_id)
    .await
    .unwrap()
    .unwrap()
    .head_revision_id;
  let head = s.get_revision(head).await.unwrap().unwrap();
  let mut document = RecipeDocument::clone(&head.document);
  change(&mut document);
  s.commit_revision(NewRevision::new(
    lineage_id,
    head.revision_id,
    document,
    "someone",
    "edit",
  ))
  .await
  .unwrap()
}

fn pull_input(fork: &Lineage, revision: Uuid, target: Uuid) -> NewPullRequest {
  NewPullRequest {
    source_lineage_id:  fork.lineage_id,
    source_revision_id: revision,
    target_lineage_id:  target,
    author:             fork.owner.clone(),
    title:              "More flour".into(),
    description:        String::new(),
  }
}

// ─── Content ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn documents_roundtrip_and_deduplicate() {
  let s = store().await;
  let a = s.put_document(starter()).await.unwrap();
  let b = s.put_document(starter()).await.unwrap();
  assert_eq!(a, b);
  assert_eq!(s.get_document(a).await.unwrap(), starter());
}

#[tokio::test]
async fn missing_document_is_not_found() {
  let s = store().await;
  let id = RecipeDocument::new("Toast", "").content_id().unwrap();
  let err = s.get_document(id).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::ContentNotFound(_))));
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ─── Lineages and revisions ──────────────────────────────────────────────────

#[tokio::test]
async fn create_and_read_back_a_recipe() {
  let s = store().await;
  let (lineage, root) = seeded(&s).await;

  let fetched = s.get_lineage(lineage.lineage_id).await.unwrap().unwrap();
  assert_eq!(fetched.name, "Perfect Sourdough Starter");
  assert_eq!(fetched.root_revision_id, root.revision_id);
  assert_eq!(fetched.head_revision_id, root.revision_id);
  assert_eq!(fetched.created_at, lineage.created_at);

  let fetched = s.get_revision(root.revision_id).await.unwrap().unwrap();
  assert_eq!(*fetched.document, starter());
  assert_eq!(fetched.content_id, root.content_id);
  assert_eq!(fetched.committed_at, root.committed_at);
  assert!(fetched.is_root());
}

#[tokio::test]
async fn unknown_ids_read_as_none() {
  let s = store().await;
  assert!(s.get_lineage(Uuid::new_v4()).await.unwrap().is_none());
  assert!(s.get_revision(Uuid::new_v4()).await.unwrap().is_none());
  assert!(s.get_pull_request(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn stale_commit_is_a_retryable_conflict() {
  let s = store().await;
  let (lineage, root) = seeded(&s).await;
  let winner = edit(&s, lineage.lineage_id, |d| d.title = "Starter".into()).await;

  let err = s
    .commit_revision(NewRevision::new(
      lineage.lineage_id,
      root.revision_id,
      starter().with_tag("late"),
      "someone",
      "too late",
    ))
    .await
    .unwrap_err();
  match &err {
    Error::Core(CoreError::Conflict { expected, actual, .. }) => {
      assert_eq!(*expected, root.revision_id);
      assert_eq!(*actual, winner.revision_id);
    }
    other => panic!("expected a conflict, got {other:?}"),
  }
  assert!(err.kind().is_retryable());

  let history: Vec<_> = s
    .history(lineage.lineage_id)
    .await
    .unwrap()
    .map(|r| r.unwrap().revision_id)
    .collect();
  assert_eq!(history, [winner.revision_id, root.revision_id]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_concurrent_commits_on_one_head_admit_exactly_one() {
  let s = Arc::new(store().await);
  let (lineage, root) = seeded(&s).await;

  let tasks: Vec<_> = ["110g", "90g"]
    .into_iter()
    .map(|amount| {
      let s = s.clone();
      let mut document = starter();
      document.ingredients[0].amount = amount.into();
      let input = NewRevision::new(
        lineage.lineage_id,
        root.revision_id,
        document,
        "someone",
        "edit",
      );
      tokio::spawn(async move { s.commit_revision(input).await })
    })
    .collect();

  let mut winners = Vec::new();
  for task in tasks {
    match task.await.unwrap() {
      Ok(rev) => winners.push(rev),
      Err(err) => {
        assert!(matches!(err, Error::Core(CoreError::Conflict { .. })));
        assert!(err.kind().is_retryable());
      }
    }
  }
  assert_eq!(winners.len(), 1);

  let history: Vec<_> = s
    .history(lineage.lineage_id)
    .await
    .unwrap()
    .map(|r| r.unwrap().revision_id)
    .collect();
  assert_eq!(history, [winners[0].revision_id, root.revision_id]);
}

#[tokio::test]
async fn history_reads_lazily_and_restarts() {
  let s = store().await;
  let (lineage, root) = seeded(&s).await;
  let one = edit(&s, lineage.lineage_id, |d| d.description = "one".into()).await;

  let mut history = s.history(lineage.lineage_id).await.unwrap();
  assert_eq!(history.next().unwrap().unwrap().revision_id, one.revision_id);

  // Commits after the history was taken do not show up in it.
  edit(&s, lineage.lineage_id, |d| d.description = "two".into()).await;
  assert_eq!(history.next().unwrap().unwrap().revision_id, root.revision_id);
  assert!(history.next().is_none());

  history.restart();
  assert_eq!(history.count(), 2);
}

#[tokio::test]
async fn history_walks_first_parents_newest_first() {
  let s = store().await;
  let (lineage, root) = seeded(&s).await;
  let one = edit(&s, lineage.lineage_id, |d| d.description = "one".into()).await;
  let two = edit(&s, lineage.lineage_id, |d| d.description = "two".into()).await;

  let ids: Vec<_> = s
    .history(lineage.lineage_id)
    .await
    .unwrap()
    .map(|r| r.unwrap().revision_id)
    .collect();
  assert_eq!(ids, [two.revision_id, one.revision_id, root.revision_id]);

  assert!(matches!(
    s.history(Uuid::new_v4()).await,
    Err(Error::Core(CoreError::LineageNotFound(_)))
  ));
}

#[tokio::test]
async fn forks_are_listed_by_origin_and_owner() {
  let s = store().await;
  let (lineage, root) = seeded(&s).await;
  let fork = s
    .fork_recipe(lineage.lineage_id, root.revision_id, "glutenfreebaker".into())
    .await
    .unwrap();
  assert_eq!(fork.root_revision_id, root.revision_id);

  let forks = s
    .list_lineages(LineageQuery {
      forked_from: Some(lineage.lineage_id),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(forks.len(), 1);
  assert_eq!(forks[0].forked_from.unwrap().revision_id, root.revision_id);

  let mine = s
    .list_lineages(LineageQuery {
      owner: Some("breadmaster".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(mine.len(), 1);
  assert_eq!(mine[0].lineage_id, lineage.lineage_id);
}

#[tokio::test]
async fn fork_at_a_revision_outside_the_lineage_fails() {
  let s = store().await;
  let (lineage, _) = seeded(&s).await;
  let (_, other_root) = seeded(&s).await;
  assert!(matches!(
    s.fork_recipe(lineage.lineage_id, other_root.revision_id, "x".into())
      .await,
    Err(Error::Core(CoreError::RevisionNotInLineage { .. }))
  ));
}

// ─── Pull requests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn merge_commits_atomically_and_records_status() {
  let s = store().await;
  let (lineage, root) = seeded(&s).await;
  let fork = s
    .fork_recipe(lineage.lineage_id, root.revision_id, "glutenfreebaker".into())
    .await
    .unwrap();
  let proposed = edit(&s, fork.lineage_id, |d| {
    d.ingredients[0].amount = "110g".into();
  })
  .await;
  let upstream = edit(&s, lineage.lineage_id, |d| {
    d.steps[1].instruction = "Observe closely.".into();
  })
  .await;

  let pull = s
    .open_pull_request(pull_input(&fork, proposed.revision_id, lineage.lineage_id))
    .await
    .unwrap();
  assert_eq!(pull.base_revision_id, root.revision_id);
  assert_eq!(s.get_diff(pull.pull_id).await.unwrap().stats().to_string(), "+1 -1");

  let merge = s
    .merge_pull_request(pull.pull_id, "breadmaster".into())
    .await
    .unwrap();
  assert_eq!(merge.parent_id, Some(upstream.revision_id));
  assert_eq!(merge.merged_from, Some(proposed.revision_id));
  assert_eq!(merge.document.ingredients[0].amount, "110g");
  assert_eq!(merge.document.steps[1].instruction, "Observe closely.");

  let pull = s.get_pull_request(pull.pull_id).await.unwrap().unwrap();
  assert!(matches!(
    pull.status,
    PullStatus::Merged { revision_id, .. } if revision_id == merge.revision_id
  ));

  let again = s
    .merge_pull_request(pull.pull_id, "breadmaster".into())
    .await
    .unwrap_err();
  assert!(matches!(
    again,
    Error::Core(CoreError::InvalidState { state: PullState::Merged, .. })
  ));

  let ancestor = s
    .common_ancestor(merge.revision_id, proposed.revision_id)
    .await
    .unwrap();
  assert_eq!(ancestor.revision_id, proposed.revision_id);
}

#[tokio::test]
async fn conflicting_merge_writes_nothing() {
  let s = store().await;
  let (lineage, root) = seeded(&s).await;
  let fork = s
    .fork_recipe(lineage.lineage_id, root.revision_id, "glutenfreebaker".into())
    .await
    .unwrap();
  let proposed = edit(&s, fork.lineage_id, |d| {
    d.ingredients[0].amount = "110g".into();
  })
  .await;
  let pull = s
    .open_pull_request(pull_input(&fork, proposed.revision_id, lineage.lineage_id))
    .await
    .unwrap();
  let upstream = edit(&s, lineage.lineage_id, |d| {
    d.ingredients[0].amount = "90g".into();
  })
  .await;

  let err = s
    .merge_pull_request(pull.pull_id, "breadmaster".into())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::MergeConflict { .. })));
  assert_eq!(err.kind(), ErrorKind::Conflict);
  assert!(err.kind().is_retryable());

  let head = s
    .get_lineage(lineage.lineage_id)
    .await
    .unwrap()
    .unwrap()
    .head_revision_id;
  assert_eq!(head, upstream.revision_id);
  let pull = s.get_pull_request(pull.pull_id).await.unwrap().unwrap();
  assert_eq!(pull.state(), PullState::Open);
}

#[tokio::test]
async fn merged_shortcuts_do_not_move_the_base_of_a_later_pull() {
  let s = store().await;
  let (main, root) = seeded(&s).await;
  let tagger = s
    .fork_recipe(main.lineage_id, root.revision_id, "tagger".into())
    .await
    .unwrap();
  let tagged = edit(&s, tagger.lineage_id, |d| {
    d.tags.insert("x".into());
  })
  .await;
  let more_flour = edit(&s, main.lineage_id, |d| {
    d.ingredients[0].amount = "110g".into();
  })
  .await;
  let writer = s
    .fork_recipe(main.lineage_id, more_flour.revision_id, "writer".into())
    .await
    .unwrap();
  let reworded = edit(&s, writer.lineage_id, |d| {
    d.description = "Reliable every time".into();
  })
  .await;
  edit(&s, main.lineage_id, |d| d.ingredients[0].amount = "120g".into()).await;
  edit(&s, main.lineage_id, |d| {
    d.tags.insert("p2".into());
  })
  .await;

  let first = s
    .open_pull_request(pull_input(&tagger, tagged.revision_id, main.lineage_id))
    .await
    .unwrap();
  let merged = s
    .merge_pull_request(first.pull_id, "breadmaster".into())
    .await
    .unwrap();

  let ancestor = s
    .common_ancestor(merged.revision_id, reworded.revision_id)
    .await
    .unwrap();
  assert_eq!(ancestor.revision_id, more_flour.revision_id);

  let second = s
    .open_pull_request(pull_input(&writer, reworded.revision_id, main.lineage_id))
    .await
    .unwrap();
  assert_eq!(second.base_revision_id, more_flour.revision_id);
  let result = s
    .merge_pull_request(second.pull_id, "breadmaster".into())
    .await
    .unwrap();
  assert_eq!(result.document.ingredients[0].amount, "120g");
  assert_eq!(result.document.description, "Reliable every time");
  assert!(result.document.tags.contains("x") && result.document.tags.contains("p2"));
}

#[tokio::test]
async fn closed_pull_requests_list_separately_newest_first() {
  let s = store().await;
  let (lineage, root) = seeded(&s).await;
  let fork = s
    .fork_recipe(lineage.lineage_id, root.revision_id, "glutenfreebaker".into())
    .await
    .unwrap();
  let proposed = edit(&s, fork.lineage_id, |d| d.title = "GF Starter".into()).await;

  let first = s
    .open_pull_request(pull_input(&fork, proposed.revision_id, lineage.lineage_id))
    .await
    .unwrap();
  let second = s
    .open_pull_request(pull_input(&fork, proposed.revision_id, lineage.lineage_id))
    .await
    .unwrap();
  let closed = s
    .close_pull_request(first.pull_id, "breadmaster".into())
    .await
    .unwrap();
  assert!(matches!(
    closed.status,
    PullStatus::Closed { ref closed_by, .. } if closed_by == "breadmaster"
  ));

  let all = s.list_pull_requests(PullQuery::default()).await.unwrap();
  let ids: Vec<_> = all.iter().map(|p| p.pull_id).collect();
  assert_eq!(ids, [second.pull_id, first.pull_id]);

  let open = s
    .list_pull_requests(PullQuery {
      status: Some(PullState::Open),
      target_lineage_id: Some(lineage.lineage_id),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(open.len(), 1);
  assert_eq!(open[0].pull_id, second.pull_id);

  assert!(matches!(
    s.merge_pull_request(first.pull_id, "breadmaster".into()).await,
    Err(Error::Core(CoreError::InvalidState { state: PullState::Closed, .. }))
  ));
}

#[tokio::test]
async fn pull_from_an_unrelated_recipe_has_diverged() {
  let s = store().await;
  let (lineage, _) = seeded(&s).await;
  let (other, other_root) = seeded(&s).await;
  let err = s
    .open_pull_request(pull_input(&other, other_root.revision_id, lineage.lineage_id))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::Diverged { .. })));
  assert_eq!(err.kind(), ErrorKind::Structural);
}

#[tokio::test]
async fn ancestry_depth_limit_applies() {
  let s = store()
    .await
    .with_config(StoreConfig { max_ancestry_depth: 2 });
  let (lineage, root) = seeded(&s).await;
  let fork = s
    .fork_recipe(lineage.lineage_id, root.revision_id, "glutenfreebaker".into())
    .await
    .unwrap();
  let mut left = root.revision_id;
  let mut right = root.revision_id;
  for i in 0..4 {
    left = edit(&s, lineage.lineage_id, |d| d.description = format!("l{i}"))
      .await
      .revision_id;
    right = edit(&s, fork.lineage_id, |d| d.description = format!("r{i}"))
      .await
      .revision_id;
  }

  assert!(matches!(
    s.common_ancestor(left, right).await,
    Err(Error::Core(CoreError::DepthExceeded { limit: 2 }))
  ));
}

#[tokio::test]
async fn ancestry_reads_stop_at_the_depth_limit() {
  let s = store()
    .await
    .with_config(StoreConfig { max_ancestry_depth: 3 });
  let (lineage, root) = seeded(&s).await;
  let mut heads = vec![root.revision_id];
  for i in 0..30 {
    let rev = edit(&s, lineage.lineage_id, |d| d.description = format!("v{i}")).await;
    heads.push(rev.revision_id);
  }
  let (head, previous) = (heads[30], heads[29]);

  let (links, chain) = s
    .run(move |conn| {
      Ok((ancestor_links(conn, head, head, 3)?, first_parent_links(conn, head, 3)?))
    })
    .await
    .unwrap();
  assert_eq!(links.len(), 4);
  assert_eq!(chain.len(), 4);

  // One step back is found long before the limit; the root is out of reach.
  let ancestor = s.common_ancestor(head, previous).await.unwrap();
  assert_eq!(ancestor.revision_id, previous);
  assert!(matches!(
    s.fork_recipe(lineage.lineage_id, root.revision_id, "late".into()).await,
    Err(Error::Core(CoreError::DepthExceeded { limit: 3 }))
  ));
  s.fork_recipe(lineage.lineage_id, previous, "early".into())
    .await
    .unwrap();
}

// ─── Comments ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn anchored_comments_survive_a_roundtrip() {
  let s = store().await;
  let (lineage, root) = seeded(&s).await;
  let fork = s
    .fork_recipe(lineage.lineage_id, root.revision_id, "glutenfreebaker".into())
    .await
    .unwrap();
  let proposed = edit(&s, fork.lineage_id, |d| d.title = "GF Starter".into()).await;
  let pull = s
    .open_pull_request(pull_input(&fork, proposed.revision_id, lineage.lineage_id))
    .await
    .unwrap();

  let diff = s.get_diff(pull.pull_id).await.unwrap();
  let entry = diff
    .entries()
    .iter()
    .position(|e| e.is_change())
    .unwrap();
  let anchor = CommentAnchor { entry, field: Field::Title };
  s.add_comment(
    pull.pull_id,
    NewComment::new("breadmaster", "Nice name").anchored(anchor.clone()),
  )
  .await
  .unwrap();

  let bad = NewComment::new("breadmaster", "?")
    .anchored(CommentAnchor { entry, field: Field::Description });
  let err = s.add_comment(pull.pull_id, bad).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::InvalidAnchor { .. })));
  assert_eq!(err.kind(), ErrorKind::Invalid);

  let pull = s.get_pull_request(pull.pull_id).await.unwrap().unwrap();
  assert_eq!(pull.comments.len(), 1);
  assert_eq!(pull.comments[0].anchor, Some(anchor));
}

#[tokio::test]
async fn revision_comments_anchor_against_the_parent() {
  let s = store().await;
  let (lineage, root) = seeded(&s).await;
  let rev = edit(&s, lineage.lineage_id, |d| d.title = "Starter".into()).await;
  let entry = diff(&root.document, &rev.document)
    .entries()
    .iter()
    .position(|e| e.is_change())
    .unwrap();

  s.add_revision_comment(
    rev.revision_id,
    NewComment::new("a", "retitled")
      .anchored(CommentAnchor { entry, field: Field::Title }),
  )
  .await
  .unwrap();
  s.add_revision_comment(root.revision_id, NewComment::new("b", "origin"))
    .await
    .unwrap();

  let comments = s.revision_comments(rev.revision_id).await.unwrap();
  assert_eq!(comments.len(), 1);
  assert_eq!(comments[0].body, "retitled");
  assert!(matches!(
    s.revision_comments(Uuid::new_v4()).await,
    Err(Error::Core(CoreError::RevisionNotFound(_)))
  ));
}

// ─── Persistence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn reopening_a_file_keeps_everything() {
  let path = std::env::temp_dir().join(format!("feast-{}.db", Uuid::new_v4()));
  let (lineage, rev) = {
    let s = SqliteStore::open(&path, StoreConfig::default()).await.unwrap();
    let (lineage, _) = seeded(&s).await;
    let rev = edit(&s, lineage.lineage_id, |d| {
      d.tags.insert("x".into());
    })
    .await;
    (lineage, rev)
  };

  let s = SqliteStore::open(&path, StoreConfig::default()).await.unwrap();
  let head = s
    .get_lineage(lineage.lineage_id)
    .await
    .unwrap()
    .unwrap()
    .head_revision_id;
  assert_eq!(head, rev.revision_id);
  assert!(
    s.get_revision(rev.revision_id)
      .await
      .unwrap()
      .unwrap()
      .document
      .tags
      .contains("x")
  );
  drop(s);
  let _ = std::fs::remove_file(&path);
}
