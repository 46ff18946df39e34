//! Bounded undo/redo history that stays valid under remote edits.
//!
//! Entries are inverses of local edits. While an undo is being performed,
//! the inverse the caller records lands on the redo stack, and vice versa.
//! Remote operations are folded into both stacks so every entry applies to
//! the current document.

use std::collections::VecDeque;

use log::trace;

use crate::error::{OtError, Result, StackKind};
use crate::operation::TextOperation;
use crate::wrapped::{Metadata, WrappedOperation};

pub const DEFAULT_MAX_ITEMS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoState {
    Normal,
    Undoing,
    Redoing,
}

#[derive(Debug)]
pub struct UndoManager<M = ()> {
    max_items: usize,
    state: UndoState,
    dont_compose: bool,
    undo_stack: VecDeque<WrappedOperation<M>>,
    redo_stack: Vec<WrappedOperation<M>>,
}

impl<M: Metadata> UndoManager<M> {
    /// `max_items` of 0 falls back to [`DEFAULT_MAX_ITEMS`].
    pub fn new(max_items: usize) -> Self {
        Self {
            max_items: if max_items == 0 { DEFAULT_MAX_ITEMS } else { max_items },
            state: UndoState::Normal,
            dont_compose: false,
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
        }
    }

    /// Record the inverse of the edit just made.
    ///
    /// With `compose` set, the entry is merged into the top of the undo
    /// stack, unless that entry was itself produced by an undo or redo.
    pub fn add(&mut self, operation: WrappedOperation<M>, compose: bool) -> Result<()> {
        match self.state {
            UndoState::Undoing => {
                self.redo_stack.push(operation);
                self.dont_compose = true;
            }
            UndoState::Redoing => {
                self.undo_stack.push_back(operation);
                self.dont_compose = true;
            }
            UndoState::Normal => {
                match self.undo_stack.back_mut() {
                    Some(top) if compose && !self.dont_compose => {
                        *top = operation.compose(top)?;
                    }
                    _ => {
                        self.undo_stack.push_back(operation);
                        if self.undo_stack.len() > self.max_items {
                            self.undo_stack.pop_front();
                            trace!("undo history full, dropped oldest entry");
                        }
                    }
                }
                self.dont_compose = false;
                self.redo_stack.clear();
            }
        }
        Ok(())
    }

    /// Rebase both stacks over a remote operation applied to the current
    /// document. Entries that become no-ops are dropped.
    pub fn transform(&mut self, operation: &TextOperation) -> Result<()> {
        let undo = transform_stack(self.undo_stack.iter(), operation)?;
        let redo = transform_stack(self.redo_stack.iter(), operation)?;
        trace!(
            "rebased undo history over {operation}: {} undo, {} redo",
            undo.len(),
            redo.len()
        );
        self.undo_stack = undo.into();
        self.redo_stack = redo;
        Ok(())
    }

    /// Pop the latest undo entry and hand it to `apply`, which is expected
    /// to apply it and `add` its inverse (landing on the redo stack).
    pub fn perform_undo<R>(
        &mut self,
        apply: impl FnOnce(&mut Self, WrappedOperation<M>) -> Result<R>,
    ) -> Result<R> {
        let entry = self
            .undo_stack
            .pop_back()
            .ok_or(OtError::EmptyStack(StackKind::Undo))?;
        self.run(UndoState::Undoing, entry, apply)
    }

    /// Inverse of [`perform_undo`](Self::perform_undo).
    pub fn perform_redo<R>(
        &mut self,
        apply: impl FnOnce(&mut Self, WrappedOperation<M>) -> Result<R>,
    ) -> Result<R> {
        let entry = self
            .redo_stack
            .pop()
            .ok_or(OtError::EmptyStack(StackKind::Redo))?;
        self.run(UndoState::Redoing, entry, apply)
    }

    fn run<R>(
        &mut self,
        state: UndoState,
        entry: WrappedOperation<M>,
        apply: impl FnOnce(&mut Self, WrappedOperation<M>) -> Result<R>,
    ) -> Result<R> {
        self.state = state;
        let result = apply(self, entry);
        self.state = UndoState::Normal;
        result
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn is_undoing(&self) -> bool {
        self.state == UndoState::Undoing
    }

    pub fn is_redoing(&self) -> bool {
        self.state == UndoState::Redoing
    }

    pub fn state(&self) -> UndoState {
        self.state
    }

    /// Most recent undo entry.
    pub fn last_undo(&self) -> Option<&WrappedOperation<M>> {
        self.undo_stack.back()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }
}

impl<M: Metadata> Default for UndoManager<M> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITEMS)
    }
}

/// Most recent entry first, each against what is left of `operation` after
/// the entries above it.
fn transform_stack<'a, M: Metadata + 'a>(
    stack: impl DoubleEndedIterator<Item = &'a WrappedOperation<M>>,
    operation: &TextOperation,
) -> Result<Vec<WrappedOperation<M>>> {
    let mut remote = operation.clone();
    let mut rebased = Vec::new();
    for entry in stack.rev() {
        let (entry, rest) = entry.transform_against(&remote)?;
        if !entry.wrapped.is_noop() {
            rebased.push(entry);
        }
        remote = rest;
    }
    rebased.reverse();
    Ok(rebased)
}
