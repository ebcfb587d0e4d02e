//! Document generators for property tests.
//!
//! Names come from small pools so that generated lists repeat items, differ
//! only in case or spacing, and leave step labels blank.

use proptest::{collection, option, prelude::*, sample::select};

use crate::document::{Ingredient, RecipeDocument, Step};

const ITEMS: &[&str] =
  &["All-purpose flour", "all-purpose  flour", "Water", "Salt", "Rye", ""];
const AMOUNTS: &[&str] = &["100g", "110g", "50ml", "a pinch"];
const LABELS: &[&str] = &["", "", "Day 1", "day 1 ", "Day 2-3", "Bake"];
const TEXTS: &[&str] = &["", "Mix.", "Observe.", "Feed twice daily."];
const TAGS: &[&str] = &["bread", "vegan", "starter", "x"];
const META_KEYS: &[&str] = &["difficulty", "servings", "time"];

fn pick(pool: &'static [&'static str]) -> impl Strategy<Value = String> {
  select(pool).prop_map(str::to_owned)
}

fn ingredient() -> impl Strategy<Value = Ingredient> {
  (pick(ITEMS), pick(AMOUNTS), option::of(pick(TEXTS)))
    .prop_map(|(item, amount, notes)| Ingredient { item, amount, notes })
}

fn step() -> impl Strategy<Value = Step> {
  (pick(LABELS), pick(TEXTS), option::of(pick(TEXTS)))
    .prop_map(|(label, instruction, notes)| Step { label, instruction, notes })
}

/// Any document, including ones with empty lists.
pub fn document() -> impl Strategy<Value = RecipeDocument> {
  (
    pick(&["Starter", "Levain", ""]),
    pick(TEXTS),
    collection::btree_set(pick(TAGS), 0..4),
    collection::btree_map(pick(META_KEYS), pick(AMOUNTS), 0..3),
    collection::vec(ingredient(), 0..6),
    collection::vec(step(), 0..5),
  )
    .prop_map(|(title, description, tags, metadata, ingredients, steps)| {
      RecipeDocument { title, description, tags, metadata, ingredients, steps }
    })
}
