//! Recipe documents: the immutable content every revision points at.
//!
//! Documents are content-addressed: the [`ContentId`] of a document is the
//! SHA-256 of its canonical JSON encoding. Tags and metadata live in sorted
//! collections, so two documents that differ only in tag insertion order hash
//! identically.

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
  sync::Arc,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Result;

// ─── Content id ──────────────────────────────────────────────────────────────

/// Lowercase hex SHA-256 of a document's canonical encoding.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
  /// Hash `document` into its content id.
  pub fn of(document: &RecipeDocument) -> Result<Self> {
    let canonical = serde_json::to_vec(document)?;
    let digest = Sha256::digest(&canonical);
    Ok(Self(hex::encode(digest)))
  }

  /// Accept a previously issued id; `None` unless it is 64 lowercase hex
  /// digits.
  pub fn parse(s: &str) -> Option<Self> {
    let valid = s.len() == 64
      && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    valid.then(|| Self(s.to_owned()))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ContentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Parts ───────────────────────────────────────────────────────────────────

/// One line of a recipe's ingredient list, e.g. "All-purpose flour, 100g".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
  pub item:   String,
  pub amount: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes:  Option<String>,
}

impl Ingredient {
  pub fn new(item: impl Into<String>, amount: impl Into<String>) -> Self {
    Self { item: item.into(), amount: amount.into(), notes: None }
  }

  pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
    self.notes = Some(notes.into());
    self
  }
}

/// One step of the method. `label` is the heading shown to cooks ("Day 1",
/// "Day 2-3"); it may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
  #[serde(default)]
  pub label:       String,
  pub instruction: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes:       Option<String>,
}

impl Step {
  pub fn new(label: impl Into<String>, instruction: impl Into<String>) -> Self {
    Self { label: label.into(), instruction: instruction.into(), notes: None }
  }
}

// ─── Document ────────────────────────────────────────────────────────────────

/// The full content of one recipe at one point in its history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDocument {
  pub title:       String,
  #[serde(default)]
  pub description: String,
  /// Unique and unordered.
  #[serde(default)]
  pub tags:        BTreeSet<String>,
  /// Scalar facts such as `difficulty`, `time` and `servings`.
  #[serde(default)]
  pub metadata:    BTreeMap<String, String>,
  #[serde(default)]
  pub ingredients: Vec<Ingredient>,
  #[serde(default)]
  pub steps:       Vec<Step>,
}

impl RecipeDocument {
  pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      title:       title.into(),
      description: description.into(),
      tags:        BTreeSet::new(),
      metadata:    BTreeMap::new(),
      ingredients: Vec::new(),
      steps:       Vec::new(),
    }
  }

  /// Add a tag; surrounding whitespace is dropped and blank tags are ignored.
  pub fn with_tag(mut self, tag: impl AsRef<str>) -> Self {
    let tag = tag.as_ref().trim();
    if !tag.is_empty() {
      self.tags.insert(tag.to_owned());
    }
    self
  }

  pub fn with_meta(
    mut self,
    key: impl Into<String>,
    value: impl Into<String>,
  ) -> Self {
    self.metadata.insert(key.into(), value.into());
    self
  }

  pub fn with_ingredient(mut self, ingredient: Ingredient) -> Self {
    self.ingredients.push(ingredient);
    self
  }

  pub fn with_step(mut self, step: Step) -> Self {
    self.steps.push(step);
    self
  }

  pub fn content_id(&self) -> Result<ContentId> { ContentId::of(self) }

  /// Hash the document and move it behind an `Arc` for sharing between
  /// revisions.
  pub fn into_content(self) -> Result<(ContentId, Arc<RecipeDocument>)> {
    Ok((self.content_id()?, Arc::new(self)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn starter() -> RecipeDocument {
    RecipeDocument::new("Perfect Sourdough Starter", "A foolproof method")
      .with_meta("difficulty", "Medium")
      .with_ingredient(
        Ingredient::new("All-purpose flour", "100g")
          .with_notes("Unbleached preferred"),
      )
      .with_step(Step::new("Day 1", "Mix flour and water"))
  }

  #[test]
  fn content_id_ignores_tag_insertion_order() {
    let a = starter().with_tag("bread").with_tag("fermentation");
    let b = starter().with_tag("fermentation").with_tag("bread");
    assert_eq!(a.content_id().unwrap(), b.content_id().unwrap());
  }

  #[test]
  fn content_id_changes_with_content() {
    let a = starter();
    let mut b = starter();
    b.ingredients[0].amount = "110g".into();
    assert_ne!(a.content_id().unwrap(), b.content_id().unwrap());
  }

  #[test]
  fn tags_are_trimmed_and_deduplicated() {
    let doc = starter().with_tag(" bread ").with_tag("bread").with_tag("  ");
    assert_eq!(doc.tags.len(), 1);
    assert!(doc.tags.contains("bread"));
  }

  #[test]
  fn parse_accepts_only_issued_ids() {
    let id = starter().content_id().unwrap();
    assert_eq!(ContentId::parse(id.as_str()), Some(id));
    assert_eq!(ContentId::parse("abc"), None);
    assert_eq!(ContentId::parse(&"G".repeat(64)), None);
  }

  #[test]
  fn missing_optional_fields_deserialize() {
    let doc: RecipeDocument =
      serde_json::from_str(r#"{"title":"Toast"}"#).unwrap();
    assert_eq!(doc.title, "Toast");
    assert!(doc.tags.is_empty() && doc.ingredients.is_empty());
  }
}
