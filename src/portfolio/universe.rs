//! # Asset Universe
//!
//! $$
//! \text{id} \leftrightarrow i \in \{0,\dots,N-1\}
//! $$
//!
//! Ordered, duplicate-free asset identifiers with a lookup table built once
//! per universe. Every vector and matrix in the crate is indexed by it.

use std::collections::HashMap;

use crate::error::Result;
use crate::error::invalid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetUniverse {
  ids: Vec<String>,
  index: HashMap<String, usize>,
}

impl AssetUniverse {
  /// Build a universe, rejecting empty or repeated identifiers.
  pub fn new<I, S>(ids: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
    if ids.is_empty() {
      return Err(invalid("asset universe must contain at least one asset"));
    }

    let mut index = HashMap::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
      if id.is_empty() {
        return Err(invalid(format!("empty asset identifier at position {i}")));
      }
      if index.insert(id.clone(), i).is_some() {
        return Err(invalid(format!("duplicate asset identifier {id:?}")));
      }
    }

    Ok(Self { ids, index })
  }

  pub fn len(&self) -> usize {
    self.ids.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  /// Position of `id`, if present.
  pub fn index_of(&self, id: &str) -> Option<usize> {
    self.index.get(id).copied()
  }

  /// Position of `id`, or an input error naming the unknown asset.
  pub fn require(&self, id: &str) -> Result<usize> {
    self
      .index_of(id)
      .ok_or_else(|| invalid(format!("asset {id:?} is not part of the universe")))
  }

  pub fn id(&self, index: usize) -> Option<&str> {
    self.ids.get(index).map(String::as_str)
  }

  pub fn ids(&self) -> &[String] {
    &self.ids
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.ids.iter().map(String::as_str)
  }
}
