//! Attribute maps carried by retain and insert steps.
//!
//! Values are arbitrary JSON. `false` is reserved: on a retain it means
//! "unset this key", and it is never stored on text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known attribute keys.
pub mod keys {
    pub const BOLD: &str = "b";
    pub const ITALIC: &str = "i";
    pub const UNDERLINE: &str = "u";
    pub const STRIKE: &str = "s";
    pub const FONT: &str = "f";
    pub const FONT_SIZE: &str = "fs";
    pub const COLOR: &str = "c";
    pub const BACKGROUND_COLOR: &str = "bc";
    pub const ENTITY_SENTINEL: &str = "ent";

    // Line attributes, stored on the line sentinel character.
    pub const LINE_SENTINEL: &str = "l";
    pub const LINE_INDENT: &str = "li";
    pub const LINE_ALIGN: &str = "la";
    /// `o` ordered, `u` unordered, `t` todo, `tc` checked todo.
    pub const LIST_TYPE: &str = "lt";
}

/// Private-use character placed at the start of a line to carry line attributes.
pub const LINE_SENTINEL_CHARACTER: char = '\u{E000}';

/// Private-use character standing in for an embedded entity (e.g. an image).
pub const ENTITY_SENTINEL_CHARACTER: char = '\u{E001}';

/// An ordered attribute map. Ordering keeps equality and encoding stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, Value>);

impl Attributes {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Merge `second` over `self`.
    ///
    /// When `self` belongs to an insert, a `false` in `second` simply drops
    /// the key: the inserted text never had it. Otherwise the `false` is
    /// kept so the merged retain still unsets the key when applied.
    pub fn compose(&self, second: &Attributes, first_is_insert: bool) -> Attributes {
        let mut merged = self.0.clone();
        for (key, value) in &second.0 {
            if first_is_insert && is_unset(value) {
                merged.remove(key);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }
        Attributes(merged)
    }

    /// Transform two concurrent attribute changes over the same characters.
    ///
    /// Keys touched by only one side survive on that side. Keys set to the
    /// same value on both sides need no further change. On conflict the
    /// first argument wins.
    pub fn transform(first: &Attributes, second: &Attributes) -> (Attributes, Attributes) {
        let mut first_prime = BTreeMap::new();
        let mut second_prime = BTreeMap::new();

        for (key, value) in &first.0 {
            match second.0.get(key) {
                None => {
                    first_prime.insert(key.clone(), value.clone());
                }
                Some(other) if other == value => {}
                Some(_) => {
                    first_prime.insert(key.clone(), value.clone());
                }
            }
        }
        for (key, value) in &second.0 {
            if !first.0.contains_key(key) {
                second_prime.insert(key.clone(), value.clone());
            }
        }

        (Attributes(first_prime), Attributes(second_prime))
    }

    /// Apply this change to a stored attribute set (`false` removes).
    pub fn apply_to(&self, target: &mut Attributes) {
        for (key, value) in &self.0 {
            if is_unset(value) {
                target.0.remove(key);
            } else {
                target.0.insert(key.clone(), value.clone());
            }
        }
    }

    /// Copy without the `false` markers, as stored on text.
    pub fn without_unset(&self) -> Attributes {
        Attributes(
            self.0
                .iter()
                .filter(|(_, v)| !is_unset(v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

fn is_unset(value: &Value) -> bool {
    matches!(value, Value::Bool(false))
}

impl From<BTreeMap<String, Value>> for Attributes {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
