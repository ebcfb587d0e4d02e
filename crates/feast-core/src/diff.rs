//! Structured diff between two recipe documents.
//!
//! Every part of a document is diffed on its own. Scalars compare directly,
//! metadata and tags walk their sorted keys, and ingredient and step lists are
//! aligned with a longest-common-subsequence over stable per-item keys
//! ([`ItemKey`]). The resulting [`Diff`] lists every field of both documents,
//! unchanged ones as [`DiffEntry::Context`], always in the same order: title,
//! description, metadata, tags, ingredients, steps. Entry indices are
//! therefore stable anchors for review comments.

use std::{
  collections::{BTreeMap, BTreeSet, HashMap},
  fmt,
};

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  document::{Ingredient, RecipeDocument, Step},
};

// ─── Keys and fields ─────────────────────────────────────────────────────────

/// Identity of an ingredient or step inside its list.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum ItemKey {
  /// Normalised name, plus how many earlier items share that name.
  Name { name: String, occurrence: u32 },
  /// Position in the list, for items without a usable name.
  Position { index: usize },
}

impl fmt::Display for ItemKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Name { name, occurrence: 0 } => f.write_str(name),
      Self::Name { name, occurrence } => write!(f, "{name}#{occurrence}"),
      Self::Position { index } => write!(f, "#{index}"),
    }
  }
}

/// Which part of a document an entry talks about.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(tag = "field", content = "key", rename_all = "snake_case")]
pub enum Field {
  Title,
  Description,
  Meta(String),
  Tag(String),
  Ingredient(ItemKey),
  Step(ItemKey),
}

impl fmt::Display for Field {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Title => f.write_str("title"),
      Self::Description => f.write_str("description"),
      Self::Meta(key) => write!(f, "metadata[{key}]"),
      Self::Tag(tag) => write!(f, "tag[{tag}]"),
      Self::Ingredient(key) => write!(f, "ingredient[{key}]"),
      Self::Step(key) => write!(f, "step[{key}]"),
    }
  }
}

/// The value a field holds on one side of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
  Text(String),
  Ingredient(Ingredient),
  Step(Step),
}

impl FieldValue {
  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_ingredient(&self) -> Option<&Ingredient> {
    match self {
      Self::Ingredient(i) => Some(i),
      _ => None,
    }
  }

  pub fn as_step(&self) -> Option<&Step> {
    match self {
      Self::Step(s) => Some(s),
      _ => None,
    }
  }
}

// ─── Entries ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffEntry {
  Context { field: Field, value: FieldValue },
  Added { field: Field, value: FieldValue },
  Removed { field: Field, value: FieldValue },
  Modified { field: Field, old: FieldValue, new: FieldValue },
}

impl DiffEntry {
  pub fn field(&self) -> &Field {
    match self {
      Self::Context { field, .. }
      | Self::Added { field, .. }
      | Self::Removed { field, .. }
      | Self::Modified { field, .. } => field,
    }
  }

  pub fn is_change(&self) -> bool { !matches!(self, Self::Context { .. }) }

  /// The value on the base side, if the field existed there.
  pub fn old_value(&self) -> Option<&FieldValue> {
    match self {
      Self::Context { value, .. } | Self::Removed { value, .. } => Some(value),
      Self::Modified { old, .. } => Some(old),
      Self::Added { .. } => None,
    }
  }

  /// The value on the revised side, if the field exists there.
  pub fn new_value(&self) -> Option<&FieldValue> {
    match self {
      Self::Context { value, .. } | Self::Added { value, .. } => Some(value),
      Self::Modified { new, .. } => Some(new),
      Self::Removed { .. } => None,
    }
  }
}

/// Net effect of a diff on one field. A moved list item shows up as a removal
/// and an addition under the same key; both collapse into one `Change`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
  pub old: Option<FieldValue>,
  pub new: Option<FieldValue>,
}

/// Summary counts, rendered `+N -M` where a modification counts on both
/// sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
  pub added:    usize,
  pub removed:  usize,
  pub modified: usize,
}

impl fmt::Display for DiffStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "+{} -{}",
      self.added + self.modified,
      self.removed + self.modified
    )
  }
}

// ─── Diff ────────────────────────────────────────────────────────────────────

/// Ordered, complete field-level comparison of two documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
  entries: Vec<DiffEntry>,
}

impl Diff {
  pub fn entries(&self) -> &[DiffEntry] { &self.entries }

  pub fn get(&self, index: usize) -> Option<&DiffEntry> {
    self.entries.get(index)
  }

  pub fn changes(&self) -> impl Iterator<Item = &DiffEntry> {
    self.entries.iter().filter(|e| e.is_change())
  }

  pub fn is_unchanged(&self) -> bool { self.changes().next().is_none() }

  pub fn stats(&self) -> DiffStats {
    let mut stats = DiffStats::default();
    for entry in &self.entries {
      match entry {
        DiffEntry::Added { .. } => stats.added += 1,
        DiffEntry::Removed { .. } => stats.removed += 1,
        DiffEntry::Modified { .. } => stats.modified += 1,
        DiffEntry::Context { .. } => {}
      }
    }
    stats
  }

  /// Every changed field with its net old and new value.
  pub fn touched(&self) -> BTreeMap<Field, Change> {
    let mut touched: BTreeMap<Field, Change> = BTreeMap::new();
    for entry in self.changes() {
      let change = touched
        .entry(entry.field().clone())
        .or_insert(Change { old: None, new: None });
      if let Some(old) = entry.old_value() {
        change.old = Some(old.clone());
      }
      if let Some(new) = entry.new_value() {
        change.new = Some(new.clone());
      }
    }
    touched
  }

  /// Replay the diff on top of `base`.
  ///
  /// `base` must be the document the diff was computed from: every context
  /// and old value is checked against it, and every part of it must be
  /// covered. Applying `diff(a, b)` to `a` yields `b`.
  pub fn apply(&self, base: &RecipeDocument) -> Result<RecipeDocument> {
    let mut title = None;
    let mut description = None;
    let mut metadata = BTreeMap::new();
    let mut meta_seen = BTreeSet::new();
    let mut tags = BTreeSet::new();
    let mut tags_seen = BTreeSet::new();
    let mut ingredients = Replay::new(&base.ingredients);
    let mut steps = Replay::new(&base.steps);

    for entry in &self.entries {
      let field = entry.field();
      let stale = || Error::StaleDiff { field: field.clone() };
      let (old, new) = (entry.old_value(), entry.new_value());

      match field {
        Field::Title => {
          title = Some(replace_text(&base.title, old, new).ok_or_else(stale)?);
        }
        Field::Description => {
          description =
            Some(replace_text(&base.description, old, new).ok_or_else(stale)?);
        }
        Field::Meta(key) => {
          let old = old.map(|v| v.as_text().ok_or_else(stale)).transpose()?;
          if old != base.metadata.get(key).map(String::as_str) {
            return Err(stale());
          }
          meta_seen.insert(key);
          if let Some(v) = new {
            let v = v.as_text().ok_or_else(stale)?;
            metadata.insert(key.clone(), v.to_owned());
          }
        }
        Field::Tag(tag) => {
          if old.is_some() != base.tags.contains(tag) {
            return Err(stale());
          }
          tags_seen.insert(tag);
          if new.is_some() {
            tags.insert(tag.clone());
          }
        }
        Field::Ingredient(_) => {
          let old = old
            .map(|v| v.as_ingredient().ok_or_else(stale))
            .transpose()?;
          let new = new
            .map(|v| v.as_ingredient().ok_or_else(stale))
            .transpose()?;
          if !ingredients.apply(old, new) {
            return Err(stale());
          }
        }
        Field::Step(_) => {
          let old = old.map(|v| v.as_step().ok_or_else(stale)).transpose()?;
          let new = new.map(|v| v.as_step().ok_or_else(stale)).transpose()?;
          if !steps.apply(old, new) {
            return Err(stale());
          }
        }
      }
    }

    let title = title.ok_or(Error::StaleDiff { field: Field::Title })?;
    let description =
      description.ok_or(Error::StaleDiff { field: Field::Description })?;
    if let Some(key) = base.metadata.keys().find(|k| !meta_seen.contains(k)) {
      return Err(Error::StaleDiff { field: Field::Meta(key.clone()) });
    }
    if let Some(tag) = base.tags.iter().find(|t| !tags_seen.contains(t)) {
      return Err(Error::StaleDiff { field: Field::Tag(tag.clone()) });
    }
    let ingredients = ingredients.finish().map_err(|index| Error::StaleDiff {
      field: Field::Ingredient(ItemKey::Position { index }),
    })?;
    let steps = steps.finish().map_err(|index| Error::StaleDiff {
      field: Field::Step(ItemKey::Position { index }),
    })?;

    Ok(RecipeDocument {
      title,
      description,
      tags,
      metadata,
      ingredients,
      steps,
    })
  }
}

fn replace_text(
  base: &str,
  old: Option<&FieldValue>,
  new: Option<&FieldValue>,
) -> Option<String> {
  let old = old?.as_text()?;
  let new = new?.as_text()?;
  (old == base).then(|| new.to_owned())
}

/// Walks one base list while a diff consumes and produces its items.
struct Replay<'a, T> {
  base: &'a [T],
  pos:  usize,
  out:  Vec<T>,
}

impl<'a, T: Clone + PartialEq> Replay<'a, T> {
  fn new(base: &'a [T]) -> Self {
    Self { base, pos: 0, out: Vec::with_capacity(base.len()) }
  }

  fn apply(&mut self, old: Option<&T>, new: Option<&T>) -> bool {
    if let Some(old) = old {
      if self.base.get(self.pos) != Some(old) {
        return false;
      }
      self.pos += 1;
    }
    if let Some(new) = new {
      self.out.push(new.clone());
    }
    true
  }

  /// The produced list, or the index of the first base item left unconsumed.
  fn finish(self) -> Result<Vec<T>, usize> {
    if self.pos == self.base.len() {
      Ok(self.out)
    } else {
      Err(self.pos)
    }
  }
}

// ─── Computing ───────────────────────────────────────────────────────────────

/// Compare `base` with `revised`. Pure and deterministic.
pub fn diff(base: &RecipeDocument, revised: &RecipeDocument) -> Diff {
  let mut entries = Vec::new();

  diff_text(Field::Title, &base.title, &revised.title, &mut entries);
  diff_text(
    Field::Description,
    &base.description,
    &revised.description,
    &mut entries,
  );
  diff_metadata(&base.metadata, &revised.metadata, &mut entries);
  diff_tags(&base.tags, &revised.tags, &mut entries);
  diff_list(
    &base.ingredients,
    &revised.ingredients,
    ingredient_keys,
    Field::Ingredient,
    FieldValue::Ingredient,
    &mut entries,
  );
  diff_list(
    &base.steps,
    &revised.steps,
    step_keys,
    Field::Step,
    FieldValue::Step,
    &mut entries,
  );

  Diff { entries }
}

fn diff_text(field: Field, old: &str, new: &str, out: &mut Vec<DiffEntry>) {
  if old == new {
    out.push(DiffEntry::Context { field, value: FieldValue::Text(new.into()) });
  } else {
    out.push(DiffEntry::Modified {
      field,
      old: FieldValue::Text(old.into()),
      new: FieldValue::Text(new.into()),
    });
  }
}

fn diff_metadata(
  old: &BTreeMap<String, String>,
  new: &BTreeMap<String, String>,
  out: &mut Vec<DiffEntry>,
) {
  let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
  for key in keys {
    let field = Field::Meta(key.clone());
    match (old.get(key), new.get(key)) {
      (Some(a), Some(b)) if a == b => {
        out.push(DiffEntry::Context { field, value: FieldValue::Text(b.clone()) })
      }
      (Some(a), Some(b)) => out.push(DiffEntry::Modified {
        field,
        old: FieldValue::Text(a.clone()),
        new: FieldValue::Text(b.clone()),
      }),
      (Some(a), None) => {
        out.push(DiffEntry::Removed { field, value: FieldValue::Text(a.clone()) })
      }
      (None, Some(b)) => {
        out.push(DiffEntry::Added { field, value: FieldValue::Text(b.clone()) })
      }
      (None, None) => {}
    }
  }
}

fn diff_tags(
  old: &BTreeSet<String>,
  new: &BTreeSet<String>,
  out: &mut Vec<DiffEntry>,
) {
  let all: BTreeSet<&String> = old.iter().chain(new.iter()).collect();
  for tag in all {
    let field = Field::Tag(tag.clone());
    let value = FieldValue::Text(tag.clone());
    out.push(match (old.contains(tag), new.contains(tag)) {
      (true, true) => DiffEntry::Context { field, value },
      (true, false) => DiffEntry::Removed { field, value },
      _ => DiffEntry::Added { field, value },
    });
  }
}

fn diff_list<T: Clone + PartialEq>(
  old: &[T],
  new: &[T],
  keys: fn(&[T]) -> Vec<ItemKey>,
  field: fn(ItemKey) -> Field,
  value: fn(T) -> FieldValue,
  out: &mut Vec<DiffEntry>,
) {
  let old_keys = keys(old);
  let new_keys = keys(new);

  for pair in align(&old_keys, &new_keys) {
    out.push(match pair {
      Pair::Both(i, j) if old[i] == new[j] => DiffEntry::Context {
        field: field(new_keys[j].clone()),
        value: value(new[j].clone()),
      },
      Pair::Both(i, j) => DiffEntry::Modified {
        field: field(new_keys[j].clone()),
        old:   value(old[i].clone()),
        new:   value(new[j].clone()),
      },
      Pair::Old(i) => DiffEntry::Removed {
        field: field(old_keys[i].clone()),
        value: value(old[i].clone()),
      },
      Pair::New(j) => DiffEntry::Added {
        field: field(new_keys[j].clone()),
        value: value(new[j].clone()),
      },
    });
  }
}

// ─── Item identity ───────────────────────────────────────────────────────────

/// Ingredients are identified by their item name.
pub fn ingredient_keys(items: &[Ingredient]) -> Vec<ItemKey> {
  item_keys(items.iter().map(|i| i.item.as_str()))
}

/// Steps are identified by their label, or by position when unlabelled.
pub fn step_keys(steps: &[Step]) -> Vec<ItemKey> {
  item_keys(steps.iter().map(|s| s.label.as_str()))
}

fn item_keys<'a>(names: impl Iterator<Item = &'a str>) -> Vec<ItemKey> {
  let mut seen: HashMap<String, u32> = HashMap::new();
  names
    .enumerate()
    .map(|(index, raw)| {
      let name = normalize(raw);
      if name.is_empty() {
        return ItemKey::Position { index };
      }
      let count = seen.entry(name.clone()).or_insert(0);
      let key = ItemKey::Name { name, occurrence: *count };
      *count += 1;
      key
    })
    .collect()
}

fn normalize(raw: &str) -> String {
  raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

// ─── Alignment ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pair {
  Both(usize, usize),
  Old(usize),
  New(usize),
}

/// Longest-common-subsequence alignment of two key lists. Where the choice is
/// free, removals come before additions.
fn align(old: &[ItemKey], new: &[ItemKey]) -> Vec<Pair> {
  let (n, m) = (old.len(), new.len());
  let width = m + 1;
  let mut lcs = vec![0u32; (n + 1) * width];

  for i in (0..n).rev() {
    for j in (0..m).rev() {
      lcs[i * width + j] = if old[i] == new[j] {
        lcs[(i + 1) * width + j + 1] + 1
      } else {
        lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
      };
    }
  }

  let mut pairs = Vec::with_capacity(n.max(m));
  let (mut i, mut j) = (0, 0);
  while i < n && j < m {
    if old[i] == new[j] {
      pairs.push(Pair::Both(i, j));
      i += 1;
      j += 1;
    } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
      pairs.push(Pair::Old(i));
      i += 1;
    } else {
      pairs.push(Pair::New(j));
      j += 1;
    }
  }
  pairs.extend((i..n).map(Pair::Old));
  pairs.extend((j..m).map(Pair::New));
  pairs
}
