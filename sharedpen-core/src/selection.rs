//! Cursor and selection offsets, and how they move under an operation.

use serde::{Deserialize, Deserializer, Serialize};

use crate::operation::{char_len, Op, TextOperation};

/// One selected range. `anchor == head` is a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub anchor: usize,
    pub head: usize,
}

impl Range {
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    pub fn cursor(position: usize) -> Self {
        Self::new(position, position)
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }

    pub fn start(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn end(&self) -> usize {
        self.anchor.max(self.head)
    }

    /// Map both ends through `op`.
    pub fn transform(&self, op: &TextOperation) -> Range {
        let anchor = transform_index(self.anchor, op);
        if self.is_empty() {
            return Range::cursor(anchor);
        }
        Range::new(anchor, transform_index(self.head, op))
    }
}

/// Map a character offset through `op`.
///
/// Text inserted before the offset pushes it right; deleted text before it
/// pulls it left. An offset inside a deleted run collapses to the start of
/// the deletion. Text inserted exactly at the offset also pushes it right.
fn transform_index(index: usize, op: &TextOperation) -> usize {
    let mut remaining = index;
    let mut new_index = index;

    for step in op.ops() {
        match step {
            Op::Retain { chars, .. } => {
                if *chars > remaining {
                    break;
                }
                remaining -= chars;
            }
            Op::Insert { text, .. } => new_index = new_index.saturating_add(char_len(text)),
            Op::Delete(n) => {
                new_index -= remaining.min(*n);
                if *n > remaining {
                    break;
                }
                remaining -= n;
            }
        }
    }
    new_index
}

/// An ordered set of ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub ranges: Vec<Range>,
}

impl Selection {
    pub fn new(ranges: Vec<Range>) -> Self {
        Self { ranges }
    }

    /// A single cursor.
    pub fn create_cursor(position: usize) -> Self {
        Self::new(vec![Range::cursor(position)])
    }

    pub fn something_selected(&self) -> bool {
        self.ranges.iter().any(|range| !range.is_empty())
    }

    /// A later selection simply replaces an earlier one.
    pub fn compose(&self, other: &Selection) -> Selection {
        other.clone()
    }

    /// Map every range through `op`, keeping count and order.
    pub fn transform(&self, op: &TextOperation) -> Selection {
        Selection::new(self.ranges.iter().map(|range| range.transform(op)).collect())
    }
}

impl<'de> Deserialize<'de> for Selection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Older peers send the bare range array.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Object { ranges: Vec<Range> },
            Bare(Vec<Range>),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Object { ranges } | Wire::Bare(ranges) => Selection::new(ranges),
        })
    }
}

/// Selection before and after an edit, carried through undo so the cursor
/// returns to where it was.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionMeta {
    pub before: Selection,
    pub after: Selection,
}

impl SelectionMeta {
    pub fn new(before: Selection, after: Selection) -> Self {
        Self { before, after }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transform_index_through_insert() {
        let op = TextOperation::new().retain(2).insert("abc").retain(3);
        assert_eq!(transform_index(1, &op), 1);
        assert_eq!(transform_index(2, &op), 5);
        assert_eq!(transform_index(4, &op), 7);
    }

    #[test]
    fn test_transform_index_saturates() {
        let op = TextOperation::new().insert("x").retain(1);
        assert_eq!(transform_index(usize::MAX, &op), usize::MAX);
    }

    #[test]
    fn test_transform_index_through_delete() {
        let op = TextOperation::new().retain(2).delete(3).retain(2);
        assert_eq!(transform_index(1, &op), 1);
        assert_eq!(transform_index(3, &op), 2);
        assert_eq!(transform_index(5, &op), 2);
        assert_eq!(transform_index(7, &op), 4);
    }

    #[test]
    fn test_range_transform_keeps_cursor_collapsed() {
        let op = TextOperation::new().insert("xy").retain(4);
        assert_eq!(Range::cursor(1).transform(&op), Range::cursor(3));
        assert_eq!(Range::new(4, 1).transform(&op), Range::new(6, 3));
    }

    #[test]
    fn test_selection_transform_preserves_order() {
        let selection = Selection::new(vec![Range::new(0, 2), Range::cursor(5)]);
        let op = TextOperation::new().retain(1).delete(2).retain(3);
        assert_eq!(
            selection.transform(&op),
            Selection::new(vec![Range::new(0, 1), Range::cursor(3)])
        );
    }

    #[test]
    fn test_something_selected() {
        assert!(!Selection::create_cursor(3).something_selected());
        assert!(Selection::new(vec![Range::cursor(0), Range::new(1, 2)]).something_selected());
        assert!(!Selection::default().something_selected());
    }

    #[test]
    fn test_wire_format() {
        let selection = Selection::new(vec![Range::new(1, 4)]);
        let value = serde_json::to_value(&selection).unwrap();
        assert_eq!(value, json!({"ranges": [{"anchor": 1, "head": 4}]}));
        assert_eq!(serde_json::from_value::<Selection>(value).unwrap(), selection);

        let bare: Selection = serde_json::from_value(json!([{"anchor": 2, "head": 2}])).unwrap();
        assert_eq!(bare, Selection::create_cursor(2));
    }
}
