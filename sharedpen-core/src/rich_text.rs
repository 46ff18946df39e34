//! Headless attributed document: plain text plus an annotation list of
//! attribute sets. This is the state an editor adapter keeps in sync with
//! the operations flowing through the client.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::annotation::{AnnotatedSpan, AnnotationList, Span};
use crate::attributes::{keys, Attributes, ENTITY_SENTINEL_CHARACTER, LINE_SENTINEL_CHARACTER};
use crate::error::{OtError, Result};
use crate::operation::{char_len, Op, TextOperation};

/// A local edit together with the operation that undoes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub operation: TextOperation,
    pub inverse: TextOperation,
}

/// Line alignment, stored under [`keys::LINE_ALIGN`] on a line sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

impl Alignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }
}

impl FromStr for Alignment {
    type Err = OtError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "left" => Ok(Alignment::Left),
            "center" => Ok(Alignment::Center),
            "right" => Ok(Alignment::Right),
            other => Err(OtError::InvalidAlignment(other.to_string())),
        }
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An embedded object (image, widget) represented in the text by
/// [`ENTITY_SENTINEL_CHARACTER`].
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub kind: String,
    pub info: BTreeMap<String, Value>,
}

const ENTITY_PREFIX: &str = "ent_";

impl Entity {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            info: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    pub fn to_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new().with(keys::ENTITY_SENTINEL, self.kind.as_str());
        for (key, value) in &self.info {
            attributes.insert(format!("{ENTITY_PREFIX}{key}"), value.clone());
        }
        attributes
    }

    /// `None` unless the attributes carry an entity kind.
    pub fn from_attributes(attributes: &Attributes) -> Option<Entity> {
        let kind = attributes.get(keys::ENTITY_SENTINEL)?.as_str()?;
        let info = attributes
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(ENTITY_PREFIX)
                    .map(|name| (name.to_string(), value.clone()))
            })
            .collect();
        Some(Entity {
            kind: kind.to_string(),
            info,
        })
    }
}

#[derive(Debug, Default)]
pub struct RichText {
    text: String,
    annotations: AnnotationList<Attributes>,
}

impl RichText {
    pub fn new() -> Self {
        Self::default()
    }

    /// A document holding unattributed `text`.
    pub fn with_text(text: &str) -> Result<Self> {
        let mut doc = Self::new();
        doc.apply(&TextOperation::new().insert(text))?;
        Ok(doc)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn annotations(&self) -> &AnnotationList<Attributes> {
        &self.annotations
    }

    /// Attribute runs covering `[start, end)`.
    pub fn attribute_spans(&self, start: usize, end: usize) -> Result<Vec<AnnotatedSpan<Attributes>>> {
        self.annotations
            .get_annotated_spans_for_span(Span::new(start, end.saturating_sub(start)))
    }

    /// Apply a (local or remote) operation.
    pub fn apply(&mut self, operation: &TextOperation) -> Result<()> {
        self.check_length(operation)?;

        let mut index = 0;
        for op in operation.ops() {
            match op {
                Op::Retain { chars, attributes } => {
                    if !attributes.is_empty() {
                        self.annotations.update_span(Span::new(index, *chars), |existing, _| {
                            let mut updated = existing.clone();
                            attributes.apply_to(&mut updated);
                            updated
                        })?;
                    }
                    index += chars;
                }
                Op::Insert { text, attributes } => {
                    let length = char_len(text);
                    let at = self.byte_offset(index);
                    self.text.insert_str(at, text);
                    self.annotations
                        .insert_annotated_span(Span::new(index, length), attributes.without_unset())?;
                    index += length;
                }
                Op::Delete(n) => {
                    let (from, to) = (self.byte_offset(index), self.byte_offset(index + n));
                    self.text.replace_range(from..to, "");
                    self.annotations.remove_span(Span::new(index, *n))?;
                }
            }
        }
        Ok(())
    }

    /// Inverse of `operation` against the current state, restoring removed
    /// text with its attributes and attribute changes with their previous
    /// values.
    pub fn invert_operation(&self, operation: &TextOperation) -> Result<TextOperation> {
        self.check_length(operation)?;

        let mut inverse = TextOperation::new();
        let mut pos = 0;
        for op in operation.ops() {
            match op {
                Op::Retain { chars, attributes } if attributes.is_empty() => {
                    inverse.push(Op::Retain {
                        chars: *chars,
                        attributes: Attributes::new(),
                    });
                    pos += chars;
                }
                Op::Retain { chars, attributes } => {
                    for span in self.annotations.get_annotated_spans_for_span(Span::new(pos, *chars))? {
                        inverse.push(Op::Retain {
                            chars: span.length,
                            attributes: restoring(attributes, &span.annotation),
                        });
                    }
                    pos += chars;
                }
                Op::Insert { text, .. } => inverse.push(Op::Delete(char_len(text))),
                Op::Delete(n) => {
                    for span in self.annotations.get_annotated_spans_for_span(Span::new(pos, *n))? {
                        inverse.push(Op::Insert {
                            text: self.slice(span.pos, span.pos + span.length),
                            attributes: span.annotation,
                        });
                    }
                    pos += n;
                }
            }
        }
        Ok(inverse)
    }

    pub fn insert(&mut self, index: usize, text: &str, attributes: Attributes) -> Result<Edit> {
        let len = self.len();
        self.check_range(index, index)?;
        let operation = TextOperation::new()
            .retain(index)
            .insert_with(text, attributes)
            .retain(len - index);
        self.commit(operation)
    }

    pub fn delete(&mut self, start: usize, end: usize) -> Result<Edit> {
        let len = self.len();
        self.check_range(start, end)?;
        let operation = TextOperation::new()
            .retain(start)
            .delete(end - start)
            .retain(len - end);
        self.commit(operation)
    }

    /// Set (or, with `false` values, unset) attributes on `[start, end)`.
    pub fn format(&mut self, start: usize, end: usize, attributes: Attributes) -> Result<Edit> {
        let len = self.len();
        self.check_range(start, end)?;
        let operation = TextOperation::new()
            .retain(start)
            .retain_with(end - start, attributes)
            .retain(len - end);
        self.commit(operation)
    }

    /// Unset `key` if every character in the range already has `value`,
    /// otherwise set it.
    pub fn toggle_attribute(
        &mut self,
        start: usize,
        end: usize,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<Edit> {
        let value = value.into();
        let all_set = self
            .attribute_spans(start, end)?
            .iter()
            .all(|span| span.annotation.get(key) == Some(&value));
        let change = if all_set {
            Attributes::new().with(key, false)
        } else {
            Attributes::new().with(key, value)
        };
        self.format(start, end, change)
    }

    /// Align every line touching `[start, end]`. Lines without a line
    /// sentinel get one.
    pub fn set_alignment(&mut self, start: usize, end: usize, alignment: Alignment) -> Result<Edit> {
        self.check_range(start, end)?;
        let chars: Vec<char> = self.text.chars().collect();

        let mut operation = TextOperation::new();
        let mut pos = 0;
        for line_start in line_starts(&chars, start, end) {
            operation = operation.retain(line_start - pos);
            pos = line_start;
            let align = Attributes::new().with(keys::LINE_ALIGN, alignment.as_str());
            if chars.get(line_start) == Some(&LINE_SENTINEL_CHARACTER) {
                operation = operation.retain_with(1, align);
                pos += 1;
            } else {
                operation = operation.insert_with(
                    LINE_SENTINEL_CHARACTER.to_string(),
                    align.with(keys::LINE_SENTINEL, true),
                );
            }
        }
        operation = operation.retain(chars.len() - pos);
        self.commit(operation)
    }

    pub fn insert_entity(&mut self, index: usize, entity: &Entity) -> Result<Edit> {
        self.insert(index, &ENTITY_SENTINEL_CHARACTER.to_string(), entity.to_attributes())
    }

    fn commit(&mut self, operation: TextOperation) -> Result<Edit> {
        let inverse = self.invert_operation(&operation)?;
        self.apply(&operation)?;
        Ok(Edit { operation, inverse })
    }

    fn check_length(&self, operation: &TextOperation) -> Result<()> {
        if operation.base_length() != self.len() {
            return Err(OtError::ApplyLengthMismatch {
                expected: operation.base_length(),
                actual: self.len(),
            });
        }
        Ok(())
    }

    fn check_range(&self, start: usize, end: usize) -> Result<()> {
        if start > end || end > self.len() {
            return Err(OtError::SpanOutOfBounds {
                pos: start,
                end,
                len: self.len(),
            });
        }
        Ok(())
    }

    fn byte_offset(&self, index: usize) -> usize {
        self.text
            .char_indices()
            .nth(index)
            .map_or(self.text.len(), |(offset, _)| offset)
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.text.chars().skip(start).take(end - start).collect()
    }
}

/// The attribute change that puts `current` back after `change` is applied.
fn restoring(change: &Attributes, current: &Attributes) -> Attributes {
    let mut inverse = Attributes::new();
    for (key, value) in change.iter() {
        let existing = current.get(key);
        if value == &Value::Bool(false) {
            if let Some(existing) = existing {
                inverse.insert(key.clone(), existing.clone());
            }
        } else if Some(value) != existing {
            inverse.insert(key.clone(), existing.cloned().unwrap_or(Value::Bool(false)));
        }
    }
    inverse
}

/// Start offsets of the lines overlapping `[start, end]`.
fn line_starts(chars: &[char], start: usize, end: usize) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut line_start = 0;
    for (i, ch) in chars.iter().enumerate() {
        if *ch == '\n' {
            if line_start <= end && i >= start {
                starts.push(line_start);
            }
            line_start = i + 1;
        }
    }
    if line_start <= end {
        starts.push(line_start);
    }
    starts
}
