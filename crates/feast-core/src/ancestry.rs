//! Walking the revision graph.
//!
//! Backends hand the functions here a [`RevisionLookup`], usually a snapshot
//! of their revision table, so that traversals never hold a store lock. Walks
//! that only follow links take a [`ParentLookup`] instead, which a backend can
//! answer without loading any documents.

use std::{
  collections::{HashMap, hash_map::Entry},
  iter::FusedIterator,
  sync::Arc,
};

use uuid::Uuid;

use crate::{
  Error, Result,
  pull::NewPullRequest,
  revision::Revision,
};

// ─── Lookup ──────────────────────────────────────────────────────────────────

/// Read access to revisions by id.
pub trait RevisionLookup {
  fn revision(&self, id: Uuid) -> Option<Arc<Revision>>;

  /// Like [`Self::revision`], but a missing revision is an error.
  fn fetch(&self, id: Uuid) -> Result<Arc<Revision>> {
    self.revision(id).ok_or(Error::RevisionNotFound(id))
  }
}

impl<L: RevisionLookup + ?Sized> RevisionLookup for &L {
  fn revision(&self, id: Uuid) -> Option<Arc<Revision>> {
    (**self).revision(id)
  }
}

impl<L: RevisionLookup + ?Sized> RevisionLookup for Arc<L> {
  fn revision(&self, id: Uuid) -> Option<Arc<Revision>> {
    (**self).revision(id)
  }
}

/// A plain map of revisions, for backends that load the part of the graph an
/// operation needs up front.
#[derive(Debug, Clone, Default)]
pub struct RevisionMap(HashMap<Uuid, Arc<Revision>>);

impl RevisionMap {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, revision: Revision) {
    self.0.insert(revision.revision_id, Arc::new(revision));
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl RevisionLookup for RevisionMap {
  fn revision(&self, id: Uuid) -> Option<Arc<Revision>> {
    self.0.get(&id).cloned()
  }
}

impl FromIterator<Revision> for RevisionMap {
  fn from_iter<I: IntoIterator<Item = Revision>>(iter: I) -> Self {
    let mut map = Self::new();
    map.extend(iter);
    map
  }
}

impl Extend<Revision> for RevisionMap {
  fn extend<I: IntoIterator<Item = Revision>>(&mut self, iter: I) {
    for revision in iter {
      self.insert(revision);
    }
  }
}

/// A revision's parent links, without its document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Parents {
  pub parent_id:   Option<Uuid>,
  pub merged_from: Option<Uuid>,
}

impl Parents {
  /// First parent, then merge source.
  pub fn iter(&self) -> impl Iterator<Item = Uuid> + use<> {
    self.parent_id.into_iter().chain(self.merged_from)
  }
}

/// Parent links by revision id. Enough for every graph walk; only the
/// answer ever needs its document.
pub trait ParentLookup {
  fn parents(&self, id: Uuid) -> Option<Parents>;
}

impl<P: ParentLookup + ?Sized> ParentLookup for &P {
  fn parents(&self, id: Uuid) -> Option<Parents> { (**self).parents(id) }
}

impl<P: ParentLookup + ?Sized> ParentLookup for Arc<P> {
  fn parents(&self, id: Uuid) -> Option<Parents> { (**self).parents(id) }
}

impl ParentLookup for RevisionMap {
  fn parents(&self, id: Uuid) -> Option<Parents> {
    self.0.get(&id).map(|r| Revision::parents(r))
  }
}

/// Parent links loaded without documents.
#[derive(Debug, Clone, Default)]
pub struct ParentMap(HashMap<Uuid, Parents>);

impl ParentMap {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, id: Uuid, parents: Parents) { self.0.insert(id, parents); }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl ParentLookup for ParentMap {
  fn parents(&self, id: Uuid) -> Option<Parents> { self.0.get(&id).copied() }
}

impl FromIterator<(Uuid, Parents)> for ParentMap {
  fn from_iter<I: IntoIterator<Item = (Uuid, Parents)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

/// Revisions from a head back to its root along first parents, most recent
/// first.
///
/// The walk is lazy and always ends: every parent was committed before its
/// child. A revision missing from the lookup is yielded once as
/// [`Error::RevisionNotFound`], after which the iterator is exhausted.
#[derive(Debug, Clone)]
pub struct History<L> {
  log:  L,
  head: Uuid,
  next: Option<Uuid>,
}

impl<L> History<L> {
  pub fn new(log: L, head: Uuid) -> Self { Self { log, head, next: Some(head) } }

  pub fn head(&self) -> Uuid { self.head }

  /// Rewind to the head the history was created with.
  pub fn restart(&mut self) { self.next = Some(self.head); }
}

impl<L: RevisionLookup> Iterator for History<L> {
  type Item = Result<Arc<Revision>>;

  fn next(&mut self) -> Option<Self::Item> {
    let id = self.next.take()?;
    match self.log.revision(id) {
      Some(revision) => {
        self.next = revision.parent_id;
        Some(Ok(revision))
      }
      None => Some(Err(Error::RevisionNotFound(id))),
    }
  }
}

impl<L: RevisionLookup> FusedIterator for History<L> {}

/// Find `revision` in the first-parent history of `head`, looking at most
/// `max_depth` revisions back. Returns how many first-parent steps separate
/// the two.
pub fn find_in_history<P: ParentLookup>(
  graph: P,
  lineage_id: Uuid,
  head: Uuid,
  revision: Uuid,
  max_depth: usize,
) -> Result<usize> {
  let mut current = head;
  for depth in 0.. {
    if depth >= max_depth {
      return Err(Error::DepthExceeded { limit: max_depth });
    }
    if current == revision {
      return Ok(depth);
    }
    let parents = graph.parents(current).ok_or(Error::RevisionNotFound(current))?;
    match parents.parent_id {
      Some(parent) => current = parent,
      None => break,
    }
  }
  Err(Error::RevisionNotInLineage { lineage: lineage_id, revision })
}

// ─── Common ancestor ─────────────────────────────────────────────────────────

/// Every ancestor of one start found so far, with its distance in
/// generations.
struct Side {
  distance: HashMap<Uuid, usize>,
  edge:     Vec<Uuid>,
  depth:    usize,
}

impl Side {
  fn new(start: Uuid) -> Self {
    Self { distance: HashMap::from([(start, 0)]), edge: vec![start], depth: 0 }
  }

  fn is_done(&self) -> bool { self.edge.is_empty() }

  /// Expand one generation over both parent links. Returns `true` as soon as
  /// `other` turns up, which makes it the answer.
  fn advance<P: ParentLookup>(
    &mut self,
    graph: &P,
    other: Uuid,
    max_depth: usize,
  ) -> Result<bool> {
    let mut next = Vec::new();
    for id in self.edge.drain(..) {
      let parents = graph.parents(id).ok_or(Error::RevisionNotFound(id))?;
      for parent in parents.iter() {
        if self.depth == max_depth {
          return Err(Error::DepthExceeded { limit: max_depth });
        }
        if parent == other {
          return Ok(true);
        }
        if let Entry::Vacant(slot) = self.distance.entry(parent) {
          slot.insert(self.depth + 1);
          next.push(parent);
        }
      }
    }
    self.edge = next;
    self.depth += 1;
    Ok(false)
  }
}

/// Lowest common ancestor of `a` and `b`, following both parent links.
///
/// Both sides are walked a generation at a time, and the search ends early if
/// one start turns out to be an ancestor of the other. Otherwise every
/// ancestor of each side within `max_depth` generations is collected. Of the
/// revisions both sides share, the lowest are those that are not a
/// parent of another shared revision (a shared revision's parents are shared
/// too). If several remain, the one with the smallest combined distance from
/// `a` and `b` wins, then the smallest id.
pub fn lowest_common_ancestor<P: ParentLookup>(
  graph: P,
  a: Uuid,
  b: Uuid,
  max_depth: usize,
) -> Result<Uuid> {
  for id in [a, b] {
    graph.parents(id).ok_or(Error::RevisionNotFound(id))?;
  }
  if a == b {
    return Ok(a);
  }

  let mut ours = Side::new(a);
  let mut theirs = Side::new(b);
  while !(ours.is_done() && theirs.is_done()) {
    if ours.advance(&graph, b, max_depth)? {
      return Ok(b);
    }
    if theirs.advance(&graph, a, max_depth)? {
      return Ok(a);
    }
  }

  let shared: HashMap<Uuid, usize> = ours
    .distance
    .iter()
    .filter_map(|(id, near)| theirs.distance.get(id).map(|far| (*id, near + far)))
    .collect();
  let mut lowest = shared.clone();
  for id in shared.keys() {
    if let Some(parents) = graph.parents(*id) {
      for parent in parents.iter() {
        lowest.remove(&parent);
      }
    }
  }

  lowest
    .into_iter()
    .min_by_key(|&(id, distance)| (distance, id))
    .map(|(id, _)| id)
    .ok_or(Error::NoCommonAncestor(a, b))
}

/// [`lowest_common_ancestor`], resolved to the revision itself.
pub fn common_ancestor<L: RevisionLookup + ParentLookup>(
  log: L,
  a: Uuid,
  b: Uuid,
  max_depth: usize,
) -> Result<Arc<Revision>> {
  let found = lowest_common_ancestor(&log, a, b, max_depth)?;
  log.fetch(found)
}

/// The base a pull request is opened against: the common ancestor of its
/// source revision and the target head.
///
/// Unrelated histories (or a pull request from a lineage into itself) are
/// [`Error::Diverged`]; a source revision the target already contains is
/// [`Error::NothingToMerge`].
pub fn merge_base<P: ParentLookup>(
  graph: P,
  input: &NewPullRequest,
  target_head: Uuid,
  max_depth: usize,
) -> Result<Uuid> {
  let diverged = || Error::Diverged {
    source_revision: input.source_revision_id,
    target_lineage:  input.target_lineage_id,
  };
  if input.source_lineage_id == input.target_lineage_id {
    return Err(diverged());
  }

  match lowest_common_ancestor(
    graph,
    input.source_revision_id,
    target_head,
    max_depth,
  ) {
    Ok(base) if base == input.source_revision_id => Err(Error::NothingToMerge {
      source_revision: input.source_revision_id,
      target_lineage:  input.target_lineage_id,
    }),
    Ok(base) => Ok(base),
    Err(Error::NoCommonAncestor(..)) => Err(diverged()),
    Err(e) => Err(e),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::document::{ContentId, RecipeDocument};

  /// Builds small graphs by hand.
  struct Graph {
    map:     RevisionMap,
    lineage: Uuid,
    content: (ContentId, Arc<RecipeDocument>),
  }

  impl Graph {
    fn new() -> Self {
      Self {
        map:     RevisionMap::new(),
        lineage: Uuid::new_v4(),
        content: {
          let doc = RecipeDocument::new("Toast", "");
          (doc.content_id().unwrap(), Arc::new(doc))
        },
      }
    }

    fn commit(&mut self, parent: Option<Uuid>) -> Uuid {
      let rev = Revision::new(
        self.lineage,
        parent,
        self.content.clone(),
        "breadmaster".into(),
        "edit".into(),
      );
      let id = rev.revision_id;
      self.map.insert(rev);
      id
    }

    fn merge(&mut self, parent: Uuid, source: Uuid) -> Uuid {
      let rev = Revision::new(
        self.lineage,
        Some(parent),
        self.content.clone(),
        "breadmaster".into(),
        "merge".into(),
      )
      .with_merged_from(source);
      let id = rev.revision_id;
      self.map.insert(rev);
      id
    }

    fn chain(&mut self, from: Uuid, len: usize) -> Uuid {
      (0..len).fold(from, |parent, _| self.commit(Some(parent)))
    }
  }

  #[test]
  fn history_walks_first_parents_and_restarts() {
    let mut g = Graph::new();
    let root = g.commit(None);
    let side = g.commit(Some(root));
    let main = g.commit(Some(root));
    let merged = g.merge(main, side);

    let mut history = History::new(&g.map, merged);
    let ids: Vec<_> = history.by_ref().map(|r| r.unwrap().revision_id).collect();
    assert_eq!(ids, [merged, main, root]);
    assert!(history.next().is_none());

    history.restart();
    assert_eq!(history.count(), 3);
  }

  #[test]
  fn history_reports_a_missing_revision_once() {
    let g = Graph::new();
    let ghost = Uuid::new_v4();
    let mut history = History::new(&g.map, ghost);
    assert!(matches!(history.next(), Some(Err(Error::RevisionNotFound(id))) if id == ghost));
    assert!(history.next().is_none());
  }

  #[test]
  fn ancestor_of_two_branches_is_the_fork_point() {
    let mut g = Graph::new();
    let root = g.commit(None);
    let fork_point = g.chain(root, 3);
    let left = g.chain(fork_point, 2);
    let right = g.chain(fork_point, 5);

    let base = common_ancestor(&g.map, left, right, 100).unwrap();
    assert_eq!(base.revision_id, fork_point);
  }

  #[test]
  fn ancestor_of_a_revision_and_its_descendant_is_itself() {
    let mut g = Graph::new();
    let root = g.commit(None);
    let tip = g.chain(root, 4);
    assert_eq!(common_ancestor(&g.map, root, tip, 100).unwrap().revision_id, root);
    assert_eq!(common_ancestor(&g.map, tip, tip, 100).unwrap().revision_id, tip);
  }

  #[test]
  fn ancestry_follows_merge_sources() {
    let mut g = Graph::new();
    let root = g.commit(None);
    let feature = g.chain(root, 2);
    let main = g.chain(root, 2);
    let merged = g.merge(main, feature);
    let later = g.chain(feature, 1);

    // After the merge, `feature` itself is shared with main.
    let base = common_ancestor(&g.map, later, merged, 100).unwrap();
    assert_eq!(base.revision_id, feature);
  }

  #[test]
  fn unrelated_roots_have_no_common_ancestor() {
    let mut g = Graph::new();
    let a = g.commit(None);
    let b = g.commit(None);
    assert!(matches!(
      common_ancestor(&g.map, a, b, 100),
      Err(Error::NoCommonAncestor(..))
    ));
  }

  #[test]
  fn deep_searches_hit_the_limit() {
    let mut g = Graph::new();
    let root = g.commit(None);
    let left = g.chain(root, 20);
    let right = g.chain(root, 20);
    assert!(matches!(
      common_ancestor(&g.map, left, right, 5),
      Err(Error::DepthExceeded { limit: 5 })
    ));
    assert!(common_ancestor(&g.map, left, right, 20).is_ok());
  }

  #[test]
  fn unknown_start_is_not_found() {
    let mut g = Graph::new();
    let root = g.commit(None);
    let ghost = Uuid::new_v4();
    assert!(matches!(
      common_ancestor(&g.map, root, ghost, 10),
      Err(Error::RevisionNotFound(id)) if id == ghost
    ));
  }

  #[test]
  fn merge_base_classifies_degenerate_pulls() {
    let mut g = Graph::new();
    let root = g.commit(None);
    let target_head = g.chain(root, 2);
    let input = |source_revision_id, same_lineage: bool| NewPullRequest {
      source_lineage_id: Uuid::nil(),
      source_revision_id,
      target_lineage_id: if same_lineage { Uuid::nil() } else { Uuid::from_u128(1) },
      author: "glutenfreebaker".into(),
      title: "t".into(),
      description: String::new(),
    };

    let ahead = g.chain(root, 1);
    assert_eq!(
      merge_base(&g.map, &input(ahead, false), target_head, 10).unwrap(),
      root
    );
    assert!(matches!(
      merge_base(&g.map, &input(root, false), target_head, 10),
      Err(Error::NothingToMerge { .. })
    ));
    assert!(matches!(
      merge_base(&g.map, &input(ahead, true), target_head, 10),
      Err(Error::Diverged { .. })
    ));

    let stranger = g.commit(None);
    assert!(matches!(
      merge_base(&g.map, &input(stranger, false), target_head, 10),
      Err(Error::Diverged { .. })
    ));
  }

  #[test]
  fn find_in_history_ignores_other_branches() {
    let mut g = Graph::new();
    let root = g.commit(None);
    let head = g.chain(root, 3);
    let side = g.commit(Some(root));

    assert_eq!(find_in_history(&g.map, g.lineage, head, root, 10).unwrap(), 3);
    assert!(matches!(
      find_in_history(&g.map, g.lineage, head, side, 10),
      Err(Error::RevisionNotInLineage { .. })
    ));
  }

  #[test]
  fn merge_source_shortcuts_do_not_hide_the_lowest_ancestor() {
    // main: root - c - p1 - p2 - merged (merged_from: side)
    // side: root - side           later: c - later
    let mut g = Graph::new();
    let root = g.commit(None);
    let side = g.commit(Some(root));
    let c = g.commit(Some(root));
    let later = g.commit(Some(c));
    let p2 = g.chain(c, 2);
    let merged = g.merge(p2, side);

    // `root` is two generations from `merged` through `side`, but `c` sits
    // below it on the first-parent chain.
    assert_eq!(lowest_common_ancestor(&g.map, merged, later, 100).unwrap(), c);
    assert_eq!(lowest_common_ancestor(&g.map, later, merged, 100).unwrap(), c);
  }

  #[test]
  fn criss_cross_merges_pick_one_lowest_ancestor_deterministically() {
    let mut g = Graph::new();
    let root = g.commit(None);
    let x = g.commit(Some(root));
    let y = g.commit(Some(root));
    let left = g.merge(x, y);
    let right = g.merge(y, x);

    let found = lowest_common_ancestor(&g.map, left, right, 100).unwrap();
    assert!(found == x || found == y);
    assert_eq!(found, x.min(y));
    assert_eq!(lowest_common_ancestor(&g.map, right, left, 100).unwrap(), found);
  }

  #[test]
  fn parent_links_alone_are_enough_to_search() {
    let mut g = Graph::new();
    let root = g.commit(None);
    let left = g.chain(root, 2);
    let right = g.chain(root, 3);
    let links: ParentMap = [root, left, right]
      .into_iter()
      .chain(History::new(&g.map, left).map(|r| r.unwrap().revision_id))
      .chain(History::new(&g.map, right).map(|r| r.unwrap().revision_id))
      .map(|id| (id, g.map.parents(id).unwrap()))
      .collect();

    assert_eq!(links.len(), 6);
    assert_eq!(lowest_common_ancestor(&links, left, right, 10).unwrap(), root);
  }

  #[test]
  fn reaching_the_other_start_stops_the_search_early() {
    let mut g = Graph::new();
    let root = g.commit(None);
    let old = g.chain(root, 50);
    let head = g.chain(old, 2);
    // The full history is far deeper than the limit.
    assert_eq!(lowest_common_ancestor(&g.map, head, old, 3).unwrap(), old);
    assert_eq!(lowest_common_ancestor(&g.map, old, head, 3).unwrap(), old);
  }
}
