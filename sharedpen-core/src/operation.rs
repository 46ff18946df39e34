//! Rich-text operations: sequences of retain / insert / delete steps.
//!
//! An operation walks the whole document from the start. Retains skip
//! characters (optionally changing their attributes), inserts add text at the
//! cursor, deletes drop characters. Lengths are counted in `char`s.
//!
//! ```text
//!  base  "hello world"
//!         ├─retain 6─┤├del 5┤
//!  op     retain 6, insert "there", delete 5
//!  target "hello there"
//! ```
//!
//! The two laws everything else depends on:
//!
//! - `apply(S, a.compose(b)) == apply(apply(S, a), b)`
//! - `(a', b') = a.transform(b)` ⇒ `apply(apply(S, a), b') == apply(apply(S, b), a')`

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::attributes::Attributes;
use crate::error::{OtError, Result};

/// A single step of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Skip `chars` characters, applying `attributes` to them.
    Retain { chars: usize, attributes: Attributes },
    /// Insert `text` carrying `attributes`.
    Insert { text: String, attributes: Attributes },
    /// Remove the next `n` characters.
    Delete(usize),
}

impl Op {
    pub fn is_retain(&self) -> bool {
        matches!(self, Op::Retain { .. })
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Op::Insert { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Op::Delete(_))
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Op::Retain { attributes, .. } | Op::Insert { attributes, .. } => Some(attributes),
            Op::Delete(_) => None,
        }
    }
}

/// An immutable-once-built rich-text operation.
///
/// Consecutive steps of the same kind are merged on construction (retains
/// and inserts only when their attributes are equal), and an insert pushed
/// right after a delete is moved in front of it, so equal edits always have
/// the same step list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextOperation {
    ops: Vec<Op>,
    base_length: usize,
    target_length: usize,
}

impl TextOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retain(self, n: usize) -> Self {
        self.retain_with(n, Attributes::new())
    }

    pub fn retain_with(mut self, n: usize, attributes: Attributes) -> Self {
        self.push_retain(n, attributes);
        self
    }

    pub fn insert(self, text: impl Into<String>) -> Self {
        self.insert_with(text, Attributes::new())
    }

    pub fn insert_with(mut self, text: impl Into<String>, attributes: Attributes) -> Self {
        self.push_insert(text.into(), attributes);
        self
    }

    pub fn delete(mut self, n: usize) -> Self {
        self.push_delete(n);
        self
    }

    /// Append a step, applying the merge rules.
    pub fn push(&mut self, op: Op) {
        match op {
            Op::Retain { chars, attributes } => self.push_retain(chars, attributes),
            Op::Insert { text, attributes } => self.push_insert(text, attributes),
            Op::Delete(n) => self.push_delete(n),
        }
    }

    fn push_retain(&mut self, n: usize, attributes: Attributes) {
        if n == 0 {
            return;
        }
        self.base_length += n;
        self.target_length += n;

        if let Some(Op::Retain { chars, attributes: last }) = self.ops.last_mut() {
            if *last == attributes {
                *chars += n;
                return;
            }
        }
        self.ops.push(Op::Retain { chars: n, attributes });
    }

    fn push_insert(&mut self, text: String, attributes: Attributes) {
        if text.is_empty() {
            return;
        }
        self.target_length += char_len(&text);

        if let Some(Op::Insert { text: last, attributes: last_attrs }) = self.ops.last_mut() {
            if *last_attrs == attributes {
                last.push_str(&text);
                return;
            }
        }

        let n = self.ops.len();
        if matches!(self.ops.last(), Some(Op::Delete(_))) {
            // Inserts go before deletes.
            if n >= 2 {
                if let Op::Insert { text: prev, attributes: prev_attrs } = &mut self.ops[n - 2] {
                    if *prev_attrs == attributes {
                        prev.push_str(&text);
                        return;
                    }
                }
            }
            self.ops.insert(n - 1, Op::Insert { text, attributes });
            return;
        }

        self.ops.push(Op::Insert { text, attributes });
    }

    fn push_delete(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.base_length += n;

        if let Some(Op::Delete(last)) = self.ops.last_mut() {
            *last += n;
            return;
        }
        self.ops.push(Op::Delete(n));
    }

    /// Reject a step that would overflow either length. A merged step never
    /// exceeds the lengths, so this covers merging as well.
    fn check_growth(&self, base: usize, target: usize) -> Result<()> {
        match (
            self.base_length.checked_add(base),
            self.target_length.checked_add(target),
        ) {
            (Some(_), Some(_)) => Ok(()),
            _ => Err(OtError::MalformedOperation(
                "operation length overflows".into(),
            )),
        }
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Characters the operation consumes.
    pub fn base_length(&self) -> usize {
        self.base_length
    }

    /// Characters the operation produces.
    pub fn target_length(&self) -> usize {
        self.target_length
    }

    /// True when applying the operation changes nothing.
    pub fn is_noop(&self) -> bool {
        match self.ops.as_slice() {
            [] => true,
            [Op::Retain { attributes, .. }] => attributes.is_empty(),
            _ => false,
        }
    }

    /// Apply to a plain string. Attributes are ignored here; see
    /// [`RichText`](crate::rich_text::RichText) for attributed documents.
    pub fn apply(&self, doc: &str) -> Result<String> {
        let len = char_len(doc);
        if self.base_length != len {
            return Err(OtError::ApplyLengthMismatch {
                expected: self.base_length,
                actual: len,
            });
        }

        let mut out = String::with_capacity(doc.len());
        let mut chars = doc.chars();
        for op in &self.ops {
            match op {
                Op::Retain { chars: n, .. } => out.extend(chars.by_ref().take(*n)),
                Op::Insert { text, .. } => out.push_str(text),
                Op::Delete(n) => chars.by_ref().take(*n).for_each(drop),
            }
        }
        Ok(out)
    }

    /// Build the operation that undoes `self`, given the string it was
    /// applied to. Attribute changes are not restored; that needs the
    /// annotation state (`RichText::invert_operation`).
    pub fn invert(&self, doc: &str) -> Result<TextOperation> {
        let len = char_len(doc);
        if self.base_length != len {
            return Err(OtError::ApplyLengthMismatch {
                expected: self.base_length,
                actual: len,
            });
        }

        let mut inverse = TextOperation::new();
        let mut chars = doc.chars();
        for op in &self.ops {
            match op {
                Op::Retain { chars: n, .. } => {
                    inverse.push_retain(*n, Attributes::new());
                    chars.by_ref().take(*n).for_each(drop);
                }
                Op::Insert { text, .. } => inverse.push_delete(char_len(text)),
                Op::Delete(n) => {
                    let removed: String = chars.by_ref().take(*n).collect();
                    inverse.push_insert(removed, Attributes::new());
                }
            }
        }
        Ok(inverse)
    }

    /// Combine `self` followed by `other` into a single operation.
    pub fn compose(&self, other: &TextOperation) -> Result<TextOperation> {
        if self.target_length != other.base_length {
            return Err(OtError::BaseLengthMismatch {
                expected: self.target_length,
                actual: other.base_length,
            });
        }

        let mut result = TextOperation::new();
        let mut ops1 = self.ops.iter().cloned();
        let mut ops2 = other.ops.iter().cloned();
        let mut op1 = ops1.next();
        let mut op2 = ops2.next();

        loop {
            match (op1.take(), op2.take()) {
                (None, None) => break,

                (Some(Op::Delete(n)), b) => {
                    result.push_delete(n);
                    op1 = ops1.next();
                    op2 = b;
                }
                (a, Some(Op::Insert { text, attributes })) => {
                    result.push_insert(text, attributes);
                    op1 = a;
                    op2 = ops2.next();
                }

                (None, Some(_)) | (Some(_), None) => {
                    return Err(OtError::BaseLengthMismatch {
                        expected: self.target_length,
                        actual: other.base_length,
                    });
                }

                (
                    Some(Op::Retain { chars: n, attributes: a }),
                    Some(Op::Retain { chars: m, attributes: b }),
                ) => {
                    result.push_retain(n.min(m), a.compose(&b, false));
                    op1 = if n > m {
                        Some(Op::Retain { chars: n - m, attributes: a })
                    } else {
                        ops1.next()
                    };
                    op2 = if m > n {
                        Some(Op::Retain { chars: m - n, attributes: b })
                    } else {
                        ops2.next()
                    };
                }

                (Some(Op::Insert { text, attributes }), Some(Op::Delete(m))) => {
                    let len = char_len(&text);
                    op1 = if len > m {
                        Some(Op::Insert { text: split_at_char(&text, m).1, attributes })
                    } else {
                        ops1.next()
                    };
                    op2 = if m > len { Some(Op::Delete(m - len)) } else { ops2.next() };
                }

                (
                    Some(Op::Insert { text, attributes: a }),
                    Some(Op::Retain { chars: m, attributes: b }),
                ) => {
                    let len = char_len(&text);
                    let (head, tail) = split_at_char(&text, len.min(m));
                    result.push_insert(head, a.compose(&b, true));
                    op1 = if len > m {
                        Some(Op::Insert { text: tail, attributes: a })
                    } else {
                        ops1.next()
                    };
                    op2 = if m > len {
                        Some(Op::Retain { chars: m - len, attributes: b })
                    } else {
                        ops2.next()
                    };
                }

                (Some(Op::Retain { chars: n, attributes }), Some(Op::Delete(m))) => {
                    result.push_delete(n.min(m));
                    op1 = if n > m {
                        Some(Op::Retain { chars: n - m, attributes })
                    } else {
                        ops1.next()
                    };
                    op2 = if m > n { Some(Op::Delete(m - n)) } else { ops2.next() };
                }
            }
        }

        Ok(result)
    }

    /// Transform two concurrent operations over the same document.
    ///
    /// Returns `(self', other')` such that applying `self` then `other'`
    /// equals applying `other` then `self'`. When both insert at the same
    /// offset, `self`'s text ends up first; when both set the same attribute
    /// to different values, `self`'s value wins. Peers only converge if they
    /// all agree on which operation goes first, so callers always pass the
    /// operation the server accepted first as `self`.
    pub fn transform(&self, other: &TextOperation) -> Result<(TextOperation, TextOperation)> {
        if self.base_length != other.base_length {
            return Err(OtError::BaseLengthMismatch {
                expected: self.base_length,
                actual: other.base_length,
            });
        }

        let mut a_prime = TextOperation::new();
        let mut b_prime = TextOperation::new();
        let mut ops1 = self.ops.iter().cloned();
        let mut ops2 = other.ops.iter().cloned();
        let mut op1 = ops1.next();
        let mut op2 = ops2.next();

        loop {
            match (op1.take(), op2.take()) {
                (None, None) => break,

                (Some(Op::Insert { text, attributes }), b) => {
                    b_prime.push_retain(char_len(&text), Attributes::new());
                    a_prime.push_insert(text, attributes);
                    op1 = ops1.next();
                    op2 = b;
                }
                (a, Some(Op::Insert { text, attributes })) => {
                    a_prime.push_retain(char_len(&text), Attributes::new());
                    b_prime.push_insert(text, attributes);
                    op1 = a;
                    op2 = ops2.next();
                }

                (None, Some(_)) | (Some(_), None) => {
                    return Err(OtError::BaseLengthMismatch {
                        expected: self.base_length,
                        actual: other.base_length,
                    });
                }

                (
                    Some(Op::Retain { chars: n, attributes: a }),
                    Some(Op::Retain { chars: m, attributes: b }),
                ) => {
                    let (a1, b1) = Attributes::transform(&a, &b);
                    let min = n.min(m);
                    a_prime.push_retain(min, a1);
                    b_prime.push_retain(min, b1);
                    op1 = if n > m {
                        Some(Op::Retain { chars: n - m, attributes: a })
                    } else {
                        ops1.next()
                    };
                    op2 = if m > n {
                        Some(Op::Retain { chars: m - n, attributes: b })
                    } else {
                        ops2.next()
                    };
                }

                // Both deleted the same characters; nothing left to do.
                (Some(Op::Delete(n)), Some(Op::Delete(m))) => {
                    op1 = if n > m { Some(Op::Delete(n - m)) } else { ops1.next() };
                    op2 = if m > n { Some(Op::Delete(m - n)) } else { ops2.next() };
                }

                (Some(Op::Delete(n)), Some(Op::Retain { chars: m, attributes })) => {
                    a_prime.push_delete(n.min(m));
                    op1 = if n > m { Some(Op::Delete(n - m)) } else { ops1.next() };
                    op2 = if m > n {
                        Some(Op::Retain { chars: m - n, attributes })
                    } else {
                        ops2.next()
                    };
                }

                (Some(Op::Retain { chars: n, attributes }), Some(Op::Delete(m))) => {
                    b_prime.push_delete(n.min(m));
                    op1 = if n > m {
                        Some(Op::Retain { chars: n - m, attributes })
                    } else {
                        ops1.next()
                    };
                    op2 = if m > n { Some(Op::Delete(m - n)) } else { ops2.next() };
                }
            }
        }

        Ok((a_prime, b_prime))
    }

    /// Whether `other`, typed right after `self`, belongs to the same undo
    /// step (e.g. consecutive keystrokes).
    pub fn should_be_composed_with(&self, other: &TextOperation) -> bool {
        if self.is_noop() || other.is_noop() {
            return true;
        }

        let (start_a, start_b) = (self.start_index(), other.start_index());
        match (self.simple_op(), other.simple_op()) {
            (Some(Op::Insert { text, .. }), Some(Op::Insert { .. })) => {
                start_a + char_len(text) == start_b
            }
            (Some(Op::Delete(_)), Some(Op::Delete(n))) => {
                start_b + n == start_a || start_a == start_b
            }
            _ => false,
        }
    }

    /// Same as [`should_be_composed_with`](Self::should_be_composed_with) but
    /// for two inverses, which run in the opposite direction.
    pub fn should_be_composed_with_inverted(&self, other: &TextOperation) -> bool {
        if self.is_noop() || other.is_noop() {
            return true;
        }

        let (start_a, start_b) = (self.start_index(), other.start_index());
        match (self.simple_op(), other.simple_op()) {
            (Some(Op::Insert { text, .. }), Some(Op::Insert { .. })) => {
                start_a + char_len(text) == start_b || start_a == start_b
            }
            (Some(Op::Delete(_)), Some(Op::Delete(n))) => start_b + n == start_a,
            _ => false,
        }
    }

    /// The single non-retain step, if the operation has the shape
    /// `[retain] step [retain]`.
    fn simple_op(&self) -> Option<&Op> {
        match self.ops.as_slice() {
            [op] => Some(op),
            [first, second] if first.is_retain() => Some(second),
            [first, second] if second.is_retain() => Some(first),
            [first, middle, last] if first.is_retain() && last.is_retain() => Some(middle),
            _ => None,
        }
    }

    fn start_index(&self) -> usize {
        match self.ops.first() {
            Some(Op::Retain { chars, .. }) => *chars,
            _ => 0,
        }
    }

    /// Encode in the wire format: positive integers retain, negative
    /// integers delete, strings insert, and an attribute object applies to
    /// the step that follows it.
    pub fn to_json(&self) -> Value {
        let mut out = Vec::with_capacity(self.ops.len());
        for op in &self.ops {
            if let Some(attributes) = op.attributes() {
                if !attributes.is_empty() {
                    out.push(Value::Object(
                        attributes.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    ));
                }
            }
            match op {
                Op::Retain { chars, .. } => out.push(Value::from(*chars)),
                Op::Insert { text, .. } => out.push(Value::from(text.as_str())),
                Op::Delete(n) => out.push(Value::from(-(*n as i64))),
            }
        }
        Value::Array(out)
    }

    /// Decode the wire format. `0` is accepted as an empty step.
    pub fn from_json(value: &Value) -> Result<TextOperation> {
        let Value::Array(items) = value else {
            return Err(OtError::MalformedOperation(format!("expected an array, got {value}")));
        };

        let mut operation = TextOperation::new();
        let mut pending: Option<Attributes> = None;

        for item in items {
            match item {
                Value::Object(map) => {
                    if pending.is_some() {
                        return Err(OtError::MalformedOperation(
                            "two attribute objects in a row".into(),
                        ));
                    }
                    pending = Some(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
                }
                Value::Number(number) => {
                    let n = number.as_i64().ok_or_else(|| {
                        OtError::MalformedOperation(format!("step {number} is not an integer"))
                    })?;
                    let attributes = pending.take().unwrap_or_default();
                    let chars = usize::try_from(n.unsigned_abs()).map_err(|_| {
                        OtError::MalformedOperation(format!("step {n} is too long"))
                    })?;
                    if n >= 0 {
                        operation.check_growth(chars, chars)?;
                        operation.push_retain(chars, attributes);
                    } else if attributes.is_empty() {
                        operation.check_growth(chars, 0)?;
                        operation.push_delete(chars);
                    } else {
                        return Err(OtError::MalformedOperation(
                            "attributes cannot precede a delete".into(),
                        ));
                    }
                }
                Value::String(text) => {
                    operation.check_growth(0, char_len(text))?;
                    operation.push_insert(text.clone(), pending.take().unwrap_or_default());
                }
                other => {
                    return Err(OtError::MalformedOperation(format!("unexpected step {other}")));
                }
            }
        }

        if pending.is_some() {
            return Err(OtError::MalformedOperation("trailing attribute object".into()));
        }
        Ok(operation)
    }
}

impl fmt::Display for TextOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ops.is_empty() {
            return write!(f, "noop");
        }
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match op {
                Op::Retain { chars, .. } => write!(f, "retain {chars}")?,
                Op::Insert { text, .. } => write!(f, "insert {text:?}")?,
                Op::Delete(n) => write!(f, "delete {n}")?,
            }
            if let Some(attributes) = op.attributes().filter(|a| !a.is_empty()) {
                let json: serde_json::Map<String, Value> =
                    attributes.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                write!(f, " {}", Value::Object(json))?;
            }
        }
        Ok(())
    }
}

impl Serialize for TextOperation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TextOperation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        TextOperation::from_json(&value).map_err(D::Error::custom)
    }
}

pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split after `n` characters.
pub(crate) fn split_at_char(s: &str, n: usize) -> (String, String) {
    let idx = s.char_indices().nth(n).map_or(s.len(), |(i, _)| i);
    (s[..idx].to_string(), s[idx..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::keys;
    use serde_json::json;

    fn bold() -> Attributes {
        Attributes::new().with(keys::BOLD, true)
    }

    #[test]
    fn test_builder_tracks_lengths() {
        let op = TextOperation::new().retain(3).insert("abc").delete(2).retain(1);
        assert_eq!(op.base_length(), 6);
        assert_eq!(op.target_length(), 7);
        assert_eq!(op.ops().len(), 4);
    }

    #[test]
    fn test_builder_merges_same_kind() {
        let op = TextOperation::new()
            .retain(2)
            .retain(3)
            .insert("a")
            .insert("b")
            .delete(1)
            .delete(4);
        assert_eq!(
            op.ops(),
            &[
                Op::Retain { chars: 5, attributes: Attributes::new() },
                Op::Insert { text: "ab".into(), attributes: Attributes::new() },
                Op::Delete(5),
            ]
        );
    }

    #[test]
    fn test_builder_keeps_differently_attributed_retains_apart() {
        let op = TextOperation::new().retain(2).retain_with(3, bold());
        assert_eq!(op.ops().len(), 2);
        assert_eq!(op.base_length(), 5);
    }

    #[test]
    fn test_builder_puts_insert_before_delete() {
        let op = TextOperation::new().retain(1).delete(2).insert("x");
        assert_eq!(
            op.ops(),
            &[
                Op::Retain { chars: 1, attributes: Attributes::new() },
                Op::Insert { text: "x".into(), attributes: Attributes::new() },
                Op::Delete(2),
            ]
        );

        let merged = TextOperation::new().insert("a").delete(1).insert("b");
        assert_eq!(merged.ops().len(), 2);
        assert_eq!(merged, TextOperation::new().insert("ab").delete(1));
    }

    #[test]
    fn test_builder_ignores_empty_steps() {
        let op = TextOperation::new().retain(0).insert("").delete(0);
        assert!(op.ops().is_empty());
        assert!(op.is_noop());
    }

    #[test]
    fn test_is_noop() {
        assert!(TextOperation::new().retain(4).is_noop());
        assert!(!TextOperation::new().retain_with(4, bold()).is_noop());
        assert!(!TextOperation::new().retain(1).insert("x").is_noop());
    }

    #[test]
    fn test_apply() {
        let op = TextOperation::new().retain(6).insert("there").delete(5);
        assert_eq!(op.apply("hello world").unwrap(), "hello there");
    }

    #[test]
    fn test_apply_counts_chars_not_bytes() {
        let op = TextOperation::new().retain(2).insert("ß").delete(1);
        assert_eq!(op.apply("héé").unwrap(), "héß");
    }

    #[test]
    fn test_apply_length_mismatch() {
        let op = TextOperation::new().retain(3);
        assert_eq!(
            op.apply("ab"),
            Err(OtError::ApplyLengthMismatch { expected: 3, actual: 2 })
        );
    }

    #[test]
    fn test_invert_round_trip() {
        let doc = "collaborate";
        let op = TextOperation::new().retain(2).delete(3).insert("XY").retain(6);
        let after = op.apply(doc).unwrap();
        let inverse = op.invert(doc).unwrap();
        assert_eq!(inverse.base_length(), op.target_length());
        assert_eq!(inverse.apply(&after).unwrap(), doc);
    }

    #[test]
    fn test_compose_matches_sequential_apply() {
        let doc = "abcdef";
        let a = TextOperation::new().retain(3).insert("XYZ").delete(3);
        let b = TextOperation::new().delete(1).retain(4).insert("!").retain(1);
        let ab = a.compose(&b).unwrap();
        assert_eq!(
            ab.apply(doc).unwrap(),
            b.apply(&a.apply(doc).unwrap()).unwrap()
        );
    }

    #[test]
    fn test_compose_insert_then_delete_cancels() {
        let a = TextOperation::new().retain(2).insert("xyz");
        let b = TextOperation::new().retain(2).delete(3);
        let ab = a.compose(&b).unwrap();
        assert!(ab.is_noop());
        assert_eq!(ab.base_length(), 2);
    }

    #[test]
    fn test_compose_attributes() {
        let a = TextOperation::new().insert_with("hi", bold());
        let b = TextOperation::new().retain_with(2, Attributes::new().with(keys::BOLD, false));
        assert_eq!(a.compose(&b).unwrap(), TextOperation::new().insert("hi"));

        let a = TextOperation::new().retain_with(2, bold());
        let b = TextOperation::new().retain_with(2, Attributes::new().with(keys::ITALIC, true));
        assert_eq!(
            a.compose(&b).unwrap(),
            TextOperation::new().retain_with(2, bold().with(keys::ITALIC, true))
        );
    }

    #[test]
    fn test_compose_length_mismatch() {
        let a = TextOperation::new().retain(2).insert("x");
        let b = TextOperation::new().retain(2);
        assert_eq!(
            a.compose(&b),
            Err(OtError::BaseLengthMismatch { expected: 3, actual: 2 })
        );
    }

    #[test]
    fn test_transform_concurrent_inserts_first_wins() {
        let doc = "abc";
        let a = TextOperation::new().insert("X").retain(3);
        let b = TextOperation::new().insert("Y").retain(3);
        let (a1, b1) = a.transform(&b).unwrap();

        let left = b1.apply(&a.apply(doc).unwrap()).unwrap();
        let right = a1.apply(&b.apply(doc).unwrap()).unwrap();
        assert_eq!(left, "XYabc");
        assert_eq!(right, "XYabc");
    }

    #[test]
    fn test_transform_overlapping_deletes() {
        let doc = "abcdefg";
        let a = TextOperation::new().retain(1).delete(4).retain(2);
        let b = TextOperation::new().retain(3).delete(3).retain(1);
        let (a1, b1) = a.transform(&b).unwrap();
        let left = b1.apply(&a.apply(doc).unwrap()).unwrap();
        let right = a1.apply(&b.apply(doc).unwrap()).unwrap();
        assert_eq!(left, "ag");
        assert_eq!(left, right);
    }

    #[test]
    fn test_transform_attribute_conflict() {
        let red = Attributes::new().with(keys::COLOR, "red");
        let blue = Attributes::new().with(keys::COLOR, "blue");
        let a = TextOperation::new().retain_with(3, red.clone());
        let b = TextOperation::new().retain_with(3, blue);
        let (a1, b1) = a.transform(&b).unwrap();
        assert_eq!(a1, TextOperation::new().retain_with(3, red));
        assert!(b1.is_noop());
    }

    #[test]
    fn test_transform_length_mismatch() {
        let a = TextOperation::new().retain(2);
        let b = TextOperation::new().retain(3);
        assert!(matches!(a.transform(&b), Err(OtError::BaseLengthMismatch { .. })));
    }

    #[test]
    fn test_should_be_composed_with() {
        let a = TextOperation::new().retain(3).insert("a").retain(2);
        let b = TextOperation::new().retain(4).insert("b").retain(2);
        assert!(a.should_be_composed_with(&b));
        let c = TextOperation::new().retain(1).insert("c").retain(6);
        assert!(!a.should_be_composed_with(&c));

        // Backspacing: each delete starts one before the previous.
        let d1 = TextOperation::new().retain(4).delete(1).retain(2);
        let d2 = TextOperation::new().retain(3).delete(1).retain(2);
        assert!(d1.should_be_composed_with(&d2));
        assert!(!d1.should_be_composed_with(&b));
    }

    #[test]
    fn test_should_be_composed_with_inverted() {
        // Inverses of two backspaces are two inserts, the later one first.
        let inv1 = TextOperation::new().retain(4).insert("e").retain(2);
        let inv2 = TextOperation::new().retain(3).insert("d").retain(3);
        assert!(inv2.should_be_composed_with_inverted(&inv1));

        // Inverses of two typed characters are two deletes.
        let del1 = TextOperation::new().retain(3).delete(1);
        let del2 = TextOperation::new().retain(4).delete(1);
        assert!(del2.should_be_composed_with_inverted(&del1));
        assert!(!del1.should_be_composed_with_inverted(&del2));
    }

    #[test]
    fn test_json_wire_format() {
        let op = TextOperation::new()
            .retain(2)
            .insert_with("hi", bold())
            .delete(3)
            .retain_with(1, Attributes::new().with(keys::ITALIC, false));
        let json = op.to_json();
        assert_eq!(json, json!([2, {"b": true}, "hi", -3, {"i": false}, 1]));
        assert_eq!(TextOperation::from_json(&json).unwrap(), op);

        let encoded = serde_json::to_string(&op).unwrap();
        let decoded: TextOperation = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, op);
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        for bad in [
            json!({"ops": []}),
            json!([1.5]),
            json!([{"b": true}]),
            json!([{"b": true}, -2]),
            json!([{"b": true}, {"i": true}, 1]),
            json!([null]),
        ] {
            assert!(
                matches!(TextOperation::from_json(&bad), Err(OtError::MalformedOperation(_))),
                "accepted {bad}"
            );
        }
        assert!(TextOperation::from_json(&json!([0])).unwrap().is_noop());
    }

    #[test]
    fn test_from_json_rejects_length_overflow() {
        let big = i64::MAX;
        for bad in [
            json!([big, big, big]),
            json!([-big, -big, -big]),
            json!([big, big, "x", "y"]),
            json!([i64::MIN, i64::MIN]),
        ] {
            assert!(
                matches!(TextOperation::from_json(&bad), Err(OtError::MalformedOperation(_))),
                "accepted {bad}"
            );
        }

        let op = TextOperation::from_json(&json!([big])).unwrap();
        assert_eq!(op.base_length(), big as usize);
    }

    #[test]
    fn test_display() {
        let op = TextOperation::new().retain(1).insert_with("x", bold()).delete(2);
        assert_eq!(op.to_string(), r#"retain 1, insert "x" {"b":true}, delete 2"#);
        assert_eq!(TextOperation::new().to_string(), "noop");
    }

    #[test]
    fn test_split_at_char() {
        assert_eq!(split_at_char("héllo", 2), ("hé".to_string(), "llo".to_string()));
        assert_eq!(split_at_char("ab", 5), ("ab".to_string(), String::new()));
    }
}
