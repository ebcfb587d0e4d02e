//! Three-way merge of recipe documents.
//!
//! Both sides are diffed against their common base. A field touched by only
//! one side takes that side's value. A field touched by both sides merges
//! cleanly only when both arrived at the same value; otherwise it is reported
//! as a [`Conflict`] and the merged document keeps our value for it.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::{
  Error, Result,
  diff::{Change, Field, ItemKey, diff, ingredient_keys, step_keys},
  document::RecipeDocument,
  pull::PullRequest,
  revision::Revision,
};

/// A field both sides changed differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
  pub field:  Field,
  pub ours:   Change,
  pub theirs: Change,
}

#[derive(Debug, Clone)]
pub struct MergeResult {
  pub merged:    RecipeDocument,
  pub conflicts: Vec<Conflict>,
}

impl MergeResult {
  pub fn is_clean(&self) -> bool { self.conflicts.is_empty() }

  pub fn conflicting_fields(&self) -> Vec<Field> {
    self.conflicts.iter().map(|c| c.field.clone()).collect()
  }
}

/// Merge `theirs` into `ours`, both descended from `base`.
pub fn merge_documents(
  base: &RecipeDocument,
  ours: &RecipeDocument,
  theirs: &RecipeDocument,
) -> MergeResult {
  let ours_changes = diff(base, ours).touched();
  let theirs_changes = diff(base, theirs).touched();

  let mut accepted: BTreeSet<Field> = BTreeSet::new();
  let mut conflicts = Vec::new();
  for (field, theirs_change) in theirs_changes {
    match ours_changes.get(&field) {
      None => {
        accepted.insert(field);
      }
      // Both sides made the same edit.
      Some(ours_change) if ours_change.new == theirs_change.new => {}
      Some(ours_change) => conflicts.push(Conflict {
        field,
        ours: ours_change.clone(),
        theirs: theirs_change,
      }),
    }
  }

  let mut merged = ours.clone();
  let mut ingredient_edits = BTreeSet::new();
  let mut step_edits = BTreeSet::new();

  for field in accepted {
    match field {
      Field::Title => merged.title = theirs.title.clone(),
      Field::Description => merged.description = theirs.description.clone(),
      Field::Meta(key) => match theirs.metadata.get(&key) {
        Some(value) => {
          merged.metadata.insert(key, value.clone());
        }
        None => {
          merged.metadata.remove(&key);
        }
      },
      Field::Tag(tag) => {
        if theirs.tags.contains(&tag) {
          merged.tags.insert(tag);
        } else {
          merged.tags.remove(&tag);
        }
      }
      Field::Ingredient(key) => {
        ingredient_edits.insert(key);
      }
      Field::Step(key) => {
        step_edits.insert(key);
      }
    }
  }

  merged.ingredients = merge_list(
    &ours.ingredients,
    ingredient_keys(&ours.ingredients),
    &theirs.ingredients,
    ingredient_keys(&theirs.ingredients),
    &ingredient_edits,
  );
  merged.steps = merge_list(
    &ours.steps,
    step_keys(&ours.steps),
    &theirs.steps,
    step_keys(&theirs.steps),
    &step_edits,
  );

  MergeResult { merged, conflicts }
}

/// Rebuild one list: every item their side edited is taken out of ours and
/// re-inserted (if it still exists on their side) right after the nearest
/// item that precedes it on their side and survives in the result.
fn merge_list<T: Clone>(
  ours: &[T],
  ours_keys: Vec<ItemKey>,
  theirs: &[T],
  theirs_keys: Vec<ItemKey>,
  edits: &BTreeSet<ItemKey>,
) -> Vec<T> {
  let mut merged: Vec<(ItemKey, T)> = ours_keys
    .into_iter()
    .zip(ours.iter().cloned())
    .filter(|(key, _)| !edits.contains(key))
    .collect();

  let mut anchor: Option<ItemKey> = None;
  for (key, item) in theirs_keys.into_iter().zip(theirs) {
    if edits.contains(&key) {
      let at = anchor
        .as_ref()
        .and_then(|a| merged.iter().position(|(k, _)| k == a))
        .map_or(0, |p| p + 1);
      merged.insert(at, (key.clone(), item.clone()));
      anchor = Some(key);
    } else if merged.iter().any(|(k, _)| *k == key) {
      anchor = Some(key);
    }
  }

  merged.into_iter().map(|(_, item)| item).collect()
}

// ─── Pull requests ───────────────────────────────────────────────────────────

/// Produce the document a merge of `pull` commits on the target lineage.
///
/// `base` is the pull request's base revision, `head` the target lineage's
/// current head and `source` the proposed revision. Fails with
/// [`Error::InvalidState`] unless the pull request is open, and with
/// [`Error::MergeConflict`] when the target changed fields the pull request
/// also changes.
pub fn resolve_pull(
  pull: &PullRequest,
  base: &Revision,
  head: &Revision,
  source: &Revision,
) -> Result<RecipeDocument> {
  pull.ensure_open()?;
  let result = merge_documents(&base.document, &head.document, &source.document);
  if !result.is_clean() {
    return Err(Error::MergeConflict {
      pull:        pull.pull_id,
      target_head: head.revision_id,
      fields:      result.conflicting_fields(),
    });
  }
  Ok(result.merged)
}

/// Commit message for the revision a merge creates.
pub fn merge_message(pull: &PullRequest) -> String {
  format!("Merge pull request \"{}\"", pull.title)
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;
  use crate::{
    document::{Ingredient, Step},
    testing,
  };

  fn base() -> RecipeDocument {
    RecipeDocument::new("Perfect Sourdough Starter", "A foolproof method")
      .with_tag("bread")
      .with_ingredient(Ingredient::new("All-purpose flour", "100g"))
      .with_ingredient(Ingredient::new("Whole wheat flour", "50g"))
      .with_ingredient(Ingredient::new("Water", "150ml"))
      .with_step(Step::new("Day 1", "Mix flour and water."))
      .with_step(Step::new("Day 2-3", "Observe."))
  }

  #[test]
  fn unchanged_target_takes_their_document() {
    let base = base();
    let mut theirs = base.clone().with_tag("gluten-free");
    theirs.ingredients[0].amount = "110g".into();
    theirs
      .ingredients
      .insert(2, Ingredient::new("Xanthan gum", "1/4 tsp"));
    theirs.steps.swap(0, 1);

    let result = merge_documents(&base, &base, &theirs);
    assert!(result.is_clean());
    assert_eq!(result.merged, theirs);
  }

  #[test]
  fn disjoint_edits_keep_both_sides() {
    let base = base();
    let mut ours = base.clone();
    ours.steps[1].instruction = "Observe; bubbles are normal.".into();
    let mut theirs = base.clone();
    theirs.ingredients[0].amount = "110g".into();
    theirs.ingredients.push(Ingredient::new("Honey", "1 tsp"));

    let result = merge_documents(&base, &ours, &theirs);
    assert!(result.is_clean());
    assert_eq!(result.merged.steps, ours.steps);
    assert_eq!(result.merged.ingredients, theirs.ingredients);
  }

  #[test]
  fn same_ingredient_edited_on_both_sides_conflicts() {
    let base = base();
    let mut ours = base.clone();
    ours.ingredients[0].amount = "120g".into();
    let mut theirs = base.clone();
    theirs.ingredients[0].amount = "110g".into();

    let result = merge_documents(&base, &ours, &theirs);
    assert!(!result.is_clean());
    assert_eq!(result.conflicting_fields(), [Field::Ingredient(ItemKey::Name {
      name:       "all-purpose flour".into(),
      occurrence: 0,
    })]);
    // Ours wins where unresolved.
    assert_eq!(result.merged.ingredients[0].amount, "120g");
  }

  #[test]
  fn identical_edits_merge_cleanly() {
    let base = base();
    let mut edited = base.clone();
    edited.title = "Sourdough Starter".into();

    let result = merge_documents(&base, &edited, &edited);
    assert!(result.is_clean());
    assert_eq!(result.merged, edited);
  }

  #[test]
  fn their_removal_of_an_item_we_kept_applies() {
    let base = base();
    let ours = base.clone().with_tag("starter");
    let mut theirs = base.clone();
    theirs.ingredients.remove(1);

    let result = merge_documents(&base, &ours, &theirs);
    assert!(result.is_clean());
    assert_eq!(result.merged.ingredients.len(), 2);
    assert!(result.merged.tags.contains("starter"));
  }

  #[test]
  fn insertion_lands_after_its_surviving_predecessor() {
    let base = base();
    let mut ours = base.clone();
    ours.ingredients.remove(1);
    let mut theirs = base.clone();
    theirs
      .ingredients
      .insert(2, Ingredient::new("Xanthan gum", "1/4 tsp"));

    let result = merge_documents(&base, &ours, &theirs);
    assert!(result.is_clean());
    let items: Vec<_> =
      result.merged.ingredients.iter().map(|i| i.item.as_str()).collect();
    assert_eq!(items, ["All-purpose flour", "Xanthan gum", "Water"]);
  }

  proptest! {
    #[test]
    fn an_untouched_target_takes_their_document(
      base in testing::document(),
      theirs in testing::document(),
    ) {
      let result = merge_documents(&base, &base, &theirs);
      prop_assert!(result.is_clean());
      prop_assert_eq!(result.merged, theirs);
    }

    #[test]
    fn an_untouched_source_keeps_our_document(
      base in testing::document(),
      ours in testing::document(),
    ) {
      let result = merge_documents(&base, &ours, &base);
      prop_assert!(result.is_clean());
      prop_assert_eq!(result.merged, ours);
    }
  }
}
