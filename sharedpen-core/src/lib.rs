//! # sharedpen-core — Operational transformation for rich text
//!
//! The algebra and data structures behind concurrent editing of one shared
//! rich-text document. Nothing here does I/O; the collaboration layer
//! (`sharedpen-collab`) drives these types from the network.
//!
//! ## Architecture
//!
//! ```text
//!  local edit ──► TextOperation ──► UndoManager (inverse, grouped)
//!                      │
//!       ┌──────────────┼──────────────────┐
//!       ▼              ▼                  ▼
//!    compose       transform           apply
//!   (buffering)  (concurrent ops)  (RichText / AnnotationList)
//!                      │
//!                      ▼
//!              Selection::transform (cursors follow edits)
//! ```
//!
//! ## Modules
//!
//! - [`operation`] — retain/insert/delete operations: apply, compose, transform, invert
//! - [`attributes`] — attribute maps and the well-known formatting keys
//! - [`selection`] — cursor/selection ranges and their transform
//! - [`wrapped`] — operations carrying metadata through the OT laws
//! - [`undo`] — bounded undo/redo stacks rebased over remote edits
//! - [`annotation`] — arena-backed run list mapping spans to attributes
//! - [`rich_text`] — headless attributed document with edit helpers
//! - [`events`] — typed observer

pub mod annotation;
pub mod attributes;
pub mod error;
pub mod events;
pub mod operation;
pub mod rich_text;
pub mod selection;
pub mod undo;
pub mod wrapped;

pub use annotation::{
    AnnotatedSpan, AnnotationChange, AnnotationList, NewAnnotatedSpan, NodeHandle,
    OldAnnotatedSpan, Span,
};
pub use attributes::{keys, Attributes, ENTITY_SENTINEL_CHARACTER, LINE_SENTINEL_CHARACTER};
pub use error::{OtError, Result, StackKind};
pub use events::{EventEmitter, SubscriptionId};
pub use operation::{Op, TextOperation};
pub use rich_text::{Alignment, Edit, Entity, RichText};
pub use selection::{Range, Selection, SelectionMeta};
pub use undo::{UndoManager, UndoState, DEFAULT_MAX_ITEMS};
pub use wrapped::{Metadata, WrappedOperation};
