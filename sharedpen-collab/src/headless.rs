//! In-memory [`EditorAdapter`] backed by a [`RichText`] document.
//!
//! Useful wherever there is no real editing widget: servers replaying a
//! document, bots, and tests. Edit helpers return the [`EditorEvent`] a UI
//! would have emitted, ready to hand to an [`EditorClient`](crate::EditorClient).

use std::collections::BTreeMap;

use sharedpen_core::{Alignment, Attributes, Edit, OtError, RichText, Selection, TextOperation};

use crate::adapter::EditorAdapter;
use crate::editor_client::EditorEvent;
use crate::protocol::ClientId;

/// A peer's selection as currently painted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSelection {
    pub client_id: ClientId,
    pub color: String,
    pub selection: Selection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HeadlessMark(u64);

#[derive(Debug)]
pub struct HeadlessEditor {
    doc: RichText,
    selection: Selection,
    remote: BTreeMap<HeadlessMark, RemoteSelection>,
    next_mark: u64,
}

impl HeadlessEditor {
    pub fn new() -> Self {
        Self {
            doc: RichText::new(),
            selection: Selection::create_cursor(0),
            remote: BTreeMap::new(),
            next_mark: 0,
        }
    }

    pub fn document(&self) -> &RichText {
        &self.doc
    }

    pub fn text(&self) -> &str {
        self.doc.text()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn remote_selections(&self) -> impl Iterator<Item = &RemoteSelection> {
        self.remote.values()
    }

    pub fn remote_selection(&self, client_id: &str) -> Option<&RemoteSelection> {
        self.remote.values().find(|remote| remote.client_id == client_id)
    }

    pub fn insert(&mut self, index: usize, text: &str) -> Result<EditorEvent, OtError> {
        self.insert_with(index, text, Attributes::new())
    }

    pub fn insert_with(
        &mut self,
        index: usize,
        text: &str,
        attributes: Attributes,
    ) -> Result<EditorEvent, OtError> {
        let edit = self.doc.insert(index, text, attributes)?;
        Ok(self.changed(edit))
    }

    pub fn delete(&mut self, start: usize, end: usize) -> Result<EditorEvent, OtError> {
        let edit = self.doc.delete(start, end)?;
        Ok(self.changed(edit))
    }

    pub fn format(&mut self, start: usize, end: usize, attributes: Attributes) -> Result<EditorEvent, OtError> {
        let edit = self.doc.format(start, end, attributes)?;
        Ok(self.changed(edit))
    }

    pub fn set_alignment(
        &mut self,
        start: usize,
        end: usize,
        alignment: Alignment,
    ) -> Result<EditorEvent, OtError> {
        let edit = self.doc.set_alignment(start, end, alignment)?;
        Ok(self.changed(edit))
    }

    /// Move the local selection, as a user clicking or dragging would.
    pub fn select(&mut self, selection: Selection) -> EditorEvent {
        self.selection = selection;
        EditorEvent::SelectionChange
    }

    fn changed(&mut self, edit: Edit) -> EditorEvent {
        self.follow(&edit.operation);
        EditorEvent::Change {
            operation: edit.operation,
            inverse: edit.inverse,
        }
    }

    /// Move every selection, local and remote, through an applied edit.
    fn follow(&mut self, operation: &TextOperation) {
        self.selection = self.selection.transform(operation);
        for remote in self.remote.values_mut() {
            remote.selection = remote.selection.transform(operation);
        }
    }
}

impl Default for HeadlessEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorAdapter for HeadlessEditor {
    type Mark = HeadlessMark;

    fn get_selection(&self) -> Selection {
        self.selection.clone()
    }

    fn set_selection(&mut self, selection: &Selection) {
        self.selection = selection.clone();
    }

    fn apply_operation(&mut self, operation: &TextOperation) -> Result<(), OtError> {
        self.doc.apply(operation)?;
        self.follow(operation);
        Ok(())
    }

    fn invert_operation(&self, operation: &TextOperation) -> Result<TextOperation, OtError> {
        self.doc.invert_operation(operation)
    }

    fn set_other_selection(&mut self, selection: &Selection, color: &str, client_id: &str) -> HeadlessMark {
        let mark = HeadlessMark(self.next_mark);
        self.next_mark += 1;
        self.remote.insert(
            mark,
            RemoteSelection {
                client_id: client_id.to_string(),
                color: color.to_string(),
                selection: selection.clone(),
            },
        );
        mark
    }

    fn clear_other_selection(&mut self, mark: HeadlessMark) {
        self.remote.remove(&mark);
    }
}
