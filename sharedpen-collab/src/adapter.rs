//! Seams between [`EditorClient`](crate::EditorClient) and the outside world.

use sharedpen_core::{OtError, Selection, TextOperation};

use crate::protocol::Revision;

/// The editing surface an [`EditorClient`](crate::EditorClient) drives.
///
/// Local edits flow the other way, as [`EditorEvent`](crate::EditorEvent)s
/// handed to the client.
pub trait EditorAdapter {
    /// Handle to a rendered remote selection.
    type Mark;

    fn get_selection(&self) -> Selection;

    fn set_selection(&mut self, selection: &Selection);

    /// Apply a remote (or undo/redo) operation to the editor contents.
    fn apply_operation(&mut self, operation: &TextOperation) -> Result<(), OtError>;

    /// Inverse of `operation` against the current contents, attributes
    /// included.
    fn invert_operation(&self, operation: &TextOperation) -> Result<TextOperation, OtError>;

    /// Render a peer's selection in `color`.
    fn set_other_selection(&mut self, selection: &Selection, color: &str, client_id: &str) -> Self::Mark;

    /// Remove a selection rendered by [`set_other_selection`](Self::set_other_selection).
    fn clear_other_selection(&mut self, mark: Self::Mark);
}

/// Outbound half of the connection to the server.
pub trait Transport {
    fn send_operation(&mut self, revision: Revision, operation: &TextOperation, selection: Option<&Selection>);

    fn send_selection(&mut self, selection: Option<&Selection>);
}
