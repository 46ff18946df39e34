//! An operation paired with metadata that follows it through every OT law.

use serde_json::{Map, Value};

use crate::error::Result;
use crate::operation::TextOperation;
use crate::selection::{Selection, SelectionMeta};

/// Side data that must compose, invert and transform together with the
/// operation it rides on.
pub trait Metadata: Clone {
    /// Metadata of `self` followed by `other`.
    fn compose(&self, other: &Self) -> Self;

    /// Metadata of the inverse operation.
    fn invert(&self) -> Self;

    /// Metadata after a concurrent `op` has been applied underneath.
    fn transform(&self, op: &TextOperation) -> Self;
}

impl Metadata for () {
    fn compose(&self, _other: &Self) -> Self {}

    fn invert(&self) -> Self {}

    fn transform(&self, _op: &TextOperation) -> Self {}
}

impl Metadata for Selection {
    fn compose(&self, other: &Self) -> Self {
        Selection::compose(self, other)
    }

    fn invert(&self) -> Self {
        self.clone()
    }

    fn transform(&self, op: &TextOperation) -> Self {
        Selection::transform(self, op)
    }
}

impl Metadata for SelectionMeta {
    fn compose(&self, other: &Self) -> Self {
        SelectionMeta::new(self.before.clone(), other.after.clone())
    }

    fn invert(&self) -> Self {
        SelectionMeta::new(self.after.clone(), self.before.clone())
    }

    fn transform(&self, op: &TextOperation) -> Self {
        SelectionMeta::new(self.before.transform(op), self.after.transform(op))
    }
}

/// Missing metadata yields to whichever side has some.
impl<M: Metadata> Metadata for Option<M> {
    fn compose(&self, other: &Self) -> Self {
        match (self, other) {
            (Some(a), Some(b)) => Some(a.compose(b)),
            (Some(a), None) => Some(a.clone()),
            (None, b) => b.clone(),
        }
    }

    fn invert(&self) -> Self {
        self.as_ref().map(Metadata::invert)
    }

    fn transform(&self, op: &TextOperation) -> Self {
        self.as_ref().map(|meta| meta.transform(op))
    }
}

/// Free-form JSON metadata: shallow merge on compose, carried unchanged
/// otherwise.
impl Metadata for Map<String, Value> {
    fn compose(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (key, value) in other {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    fn invert(&self) -> Self {
        self.clone()
    }

    fn transform(&self, _op: &TextOperation) -> Self {
        self.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrappedOperation<M = ()> {
    pub wrapped: TextOperation,
    pub meta: M,
}

impl<M: Metadata> WrappedOperation<M> {
    pub fn new(wrapped: TextOperation, meta: M) -> Self {
        Self { wrapped, meta }
    }

    pub fn apply(&self, doc: &str) -> Result<String> {
        self.wrapped.apply(doc)
    }

    pub fn invert(&self, doc: &str) -> Result<Self> {
        Ok(Self::new(self.wrapped.invert(doc)?, self.meta.invert()))
    }

    pub fn compose(&self, other: &Self) -> Result<Self> {
        Ok(Self::new(
            self.wrapped.compose(&other.wrapped)?,
            self.meta.compose(&other.meta),
        ))
    }

    /// Transform two concurrent wrapped operations; `self` wins ties.
    pub fn transform(&self, other: &Self) -> Result<(Self, Self)> {
        let (a, b) = self.wrapped.transform(&other.wrapped)?;
        Ok((
            Self::new(a, self.meta.transform(&other.wrapped)),
            Self::new(b, other.meta.transform(&self.wrapped)),
        ))
    }

    /// Transform against a bare concurrent operation, returning `self'` and
    /// the operation rebased over `self`.
    pub fn transform_against(&self, op: &TextOperation) -> Result<(Self, TextOperation)> {
        let (a, b) = self.wrapped.transform(op)?;
        Ok((Self::new(a, self.meta.transform(op)), b))
    }
}
