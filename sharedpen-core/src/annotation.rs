//! Run-length list of annotated character spans.
//!
//! The list covers `[0, len)` with a chain of nodes, each holding a length
//! and an annotation (typically an attribute set). Nodes live in a slab
//! arena and link to their successor by key, so no node owns another.
//!
//! ```text
//!   head ─► [3, {b}] ─► [5, {}] ─► [2, {i}] ─► ∅
//!            0..3        3..8       8..10
//! ```
//!
//! Every mutation replaces the affected nodes with a fresh segment,
//! merges it with equal neighbours, and reports the replaced and created
//! spans as an [`AnnotationChange`]. Adjacent nodes never carry equal
//! annotations, and node lengths always sum to `len()`.
//!
//! All operations walk the chain, so they are O(number of nodes).

use std::fmt;

use slab::Slab;

use crate::error::{OtError, Result};
use crate::events::{EventEmitter, SubscriptionId};

/// A half-open character range `[pos, pos + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub pos: usize,
    pub length: usize,
}

impl Span {
    pub fn new(pos: usize, length: usize) -> Self {
        Self { pos, length }
    }

    pub fn end(&self) -> usize {
        self.pos + self.length
    }
}

/// A read-only snapshot of an annotated run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedSpan<A> {
    pub pos: usize,
    pub length: usize,
    pub annotation: A,
}

/// A run removed by a mutation. Ownership of anything attached to the node
/// passes to the receiver, which is expected to dispose of it.
#[derive(Debug, PartialEq)]
pub struct OldAnnotatedSpan<A, O> {
    pub pos: usize,
    pub length: usize,
    pub annotation: A,
    pub attached: Option<O>,
}

/// A run created by a mutation. `handle` can be passed to
/// [`AnnotationList::attach`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnnotatedSpan<A> {
    pub pos: usize,
    pub length: usize,
    pub annotation: A,
    pub handle: NodeHandle,
}

/// Stable reference to a node. Goes stale once the node is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    key: usize,
    generation: u64,
}

/// The spans replaced and created by one mutation.
#[derive(Debug, PartialEq)]
pub struct AnnotationChange<A, O> {
    pub old: Vec<OldAnnotatedSpan<A, O>>,
    pub new: Vec<NewAnnotatedSpan<A>>,
}

impl<A, O> AnnotationChange<A, O> {
    fn empty() -> Self {
        Self {
            old: Vec::new(),
            new: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.old.is_empty() && self.new.is_empty()
    }
}

struct Node<A, O> {
    length: usize,
    annotation: A,
    attached: Option<O>,
    generation: u64,
    next: Option<usize>,
}

/// Where a span falls in the chain, as indices into the key walk.
struct Affected {
    /// Position of the first affected node (or of the insertion point).
    start_pos: usize,
    /// Affected nodes are `first..last`; empty for a zero-length span on a
    /// node boundary.
    first: usize,
    last: usize,
    /// Node ending exactly at the span start.
    pred: Option<usize>,
    pred_pos: usize,
    /// Node starting exactly at the span end.
    succ: Option<usize>,
}

pub struct AnnotationList<A, O = ()> {
    nodes: Slab<Node<A, O>>,
    head: Option<usize>,
    len: usize,
    next_generation: u64,
    changes: EventEmitter<AnnotationChange<A, O>>,
}

impl<A: Clone + PartialEq, O> AnnotationList<A, O> {
    pub fn new() -> Self {
        Self {
            nodes: Slab::new(),
            head: None,
            len: 0,
            next_generation: 0,
            changes: EventEmitter::new(),
        }
    }

    /// Total characters covered.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Register a listener for every non-empty change.
    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&AnnotationChange<A, O>) + Send + 'static,
    ) -> SubscriptionId {
        self.changes.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.changes.unsubscribe(id)
    }

    /// Insert `span.length` new characters at `span.pos`.
    pub fn insert_annotated_span(
        &mut self,
        span: Span,
        annotation: A,
    ) -> Result<AnnotationChange<A, O>> {
        if span.length == 0 {
            return Ok(AnnotationChange::empty());
        }

        self.wrap(Span::new(span.pos, 0), move |old_pos, old| {
            match old.into_iter().next() {
                None => vec![(span.length, annotation)],
                // Inserting inside a node splits it around the new run.
                Some((length, existing)) => vec![
                    (span.pos - old_pos, existing.clone()),
                    (span.length, annotation),
                    (old_pos + length - span.pos, existing),
                ],
            }
        })
    }

    /// Remove the characters covered by `span`.
    pub fn remove_span(&mut self, span: Span) -> Result<AnnotationChange<A, O>> {
        if span.length == 0 {
            return Ok(AnnotationChange::empty());
        }

        self.wrap(span, move |old_pos, old| {
            let old_end = old_pos + old.iter().map(|(length, _)| length).sum::<usize>();
            let mut runs = Vec::with_capacity(2);
            if let Some((_, annotation)) = old.first() {
                if span.pos > old_pos {
                    runs.push((span.pos - old_pos, annotation.clone()));
                }
            }
            if let Some((_, annotation)) = old.last() {
                if old_end > span.end() {
                    runs.push((old_end - span.end(), annotation.clone()));
                }
            }
            runs
        })
    }

    /// Replace the annotation of every run inside `span` with
    /// `update(old_annotation, run_length)`.
    pub fn update_span(
        &mut self,
        span: Span,
        mut update: impl FnMut(&A, usize) -> A,
    ) -> Result<AnnotationChange<A, O>> {
        if span.length == 0 {
            return Ok(AnnotationChange::empty());
        }

        self.wrap(span, move |old_pos, old| {
            let mut runs = Vec::with_capacity(old.len() + 2);
            let mut pos = old_pos;
            for (length, annotation) in old {
                let node_end = pos + length;
                let start = pos.max(span.pos);
                let end = node_end.min(span.end());
                if start > pos {
                    runs.push((start - pos, annotation.clone()));
                }
                if end > start {
                    runs.push((end - start, update(&annotation, end - start)));
                }
                if node_end > end {
                    runs.push((node_end - end, annotation));
                }
                pos = node_end;
            }
            runs
        })
    }

    /// Hand an external object to a node created by an earlier change. A
    /// stale handle gives the object back.
    pub fn attach(&mut self, handle: NodeHandle, object: O) -> std::result::Result<(), O> {
        match self.nodes.get_mut(handle.key) {
            Some(node) if node.generation == handle.generation => {
                node.attached = Some(object);
                Ok(())
            }
            _ => Err(object),
        }
    }

    /// Visit every run in order.
    pub fn for_each(&self, mut visit: impl FnMut(usize, &A, Option<&O>)) {
        let mut current = self.head;
        while let Some(key) = current {
            let node = &self.nodes[key];
            visit(node.length, &node.annotation, node.attached.as_ref());
            current = node.next;
        }
    }

    /// Runs touching `pos`: the one containing it, or the two meeting at it.
    pub fn get_spans_for_pos(&self, pos: usize) -> Result<Vec<Span>> {
        let keys = self.keys();
        let affected = self.affected(&keys, Span::new(pos, 0))?;

        if affected.last > affected.first {
            let start = &self.nodes[keys[affected.first]];
            return Ok(vec![Span::new(affected.start_pos, start.length)]);
        }

        let mut spans = Vec::with_capacity(2);
        if let Some(pred) = affected.pred {
            spans.push(Span::new(affected.pred_pos, self.nodes[keys[pred]].length));
        }
        if let Some(succ) = affected.succ {
            spans.push(Span::new(affected.start_pos, self.nodes[keys[succ]].length));
        }
        Ok(spans)
    }

    /// Annotated runs touching `pos`. On a boundary both neighbours are
    /// returned, left first.
    pub fn get_annotated_spans_for_pos(&self, pos: usize) -> Result<Vec<AnnotatedSpan<A>>> {
        let mut current_pos = 0;
        let mut current = self.head;
        let mut prev: Option<&Node<A, O>> = None;

        while let Some(node) = current.map(|key| &self.nodes[key]) {
            if current_pos + node.length > pos {
                break;
            }
            current_pos += node.length;
            prev = Some(node);
            current = node.next;
        }
        if current.is_none() && current_pos != pos {
            return Err(OtError::SpanOutOfBounds {
                pos,
                end: pos,
                len: self.len,
            });
        }

        let mut spans = Vec::with_capacity(2);
        if let Some(prev) = prev.filter(|_| current_pos == pos) {
            spans.push(AnnotatedSpan {
                pos: current_pos - prev.length,
                length: prev.length,
                annotation: prev.annotation.clone(),
            });
        }
        if let Some(key) = current {
            let node = &self.nodes[key];
            spans.push(AnnotatedSpan {
                pos: current_pos,
                length: node.length,
                annotation: node.annotation.clone(),
            });
        }
        Ok(spans)
    }

    /// Annotated runs overlapping `span`, clipped to it.
    pub fn get_annotated_spans_for_span(&self, span: Span) -> Result<Vec<AnnotatedSpan<A>>> {
        if span.length == 0 {
            return Ok(Vec::new());
        }

        let keys = self.keys();
        let affected = self.affected(&keys, span)?;
        let mut spans = Vec::with_capacity(affected.last - affected.first);
        let mut pos = affected.start_pos;
        for &key in &keys[affected.first..affected.last] {
            let node = &self.nodes[key];
            let start = pos.max(span.pos);
            let end = (pos + node.length).min(span.end());
            spans.push(AnnotatedSpan {
                pos: start,
                length: end - start,
                annotation: node.annotation.clone(),
            });
            pos += node.length;
        }
        Ok(spans)
    }

    /// Verify the structural invariants: no empty nodes, no equal
    /// neighbours, lengths summing to `len()`, and no unreachable nodes.
    pub fn check_invariants(&self) -> bool {
        let mut total = 0;
        let mut count = 0;
        let mut prev: Option<&A> = None;
        let mut current = self.head;

        while let Some(key) = current {
            let node = &self.nodes[key];
            if node.length == 0 || prev == Some(&node.annotation) {
                return false;
            }
            total += node.length;
            count += 1;
            prev = Some(&node.annotation);
            current = node.next;
        }

        total == self.len && count == self.nodes.len()
    }

    fn keys(&self) -> Vec<usize> {
        let mut keys = Vec::with_capacity(self.nodes.len());
        let mut current = self.head;
        while let Some(key) = current {
            keys.push(key);
            current = self.nodes[key].next;
        }
        keys
    }

    fn affected(&self, keys: &[usize], span: Span) -> Result<Affected> {
        let out_of_bounds = || OtError::SpanOutOfBounds {
            pos: span.pos,
            end: span.end(),
            len: self.len,
        };
        let length_at = |i: usize| self.nodes[keys[i]].length;
        let n = keys.len();

        let mut i = 0;
        let mut pos = 0;
        while i < n && span.pos >= pos + length_at(i) {
            pos += length_at(i);
            i += 1;
        }
        if i == n && !(span.length == 0 && span.pos == pos) {
            return Err(out_of_bounds());
        }

        let start_pos = pos;
        let first = i;
        let (pred, pred_pos) = if pos == span.pos && pos > 0 {
            (Some(i - 1), pos - length_at(i - 1))
        } else {
            (None, 0)
        };

        while i < n && span.end() > pos {
            pos += length_at(i);
            i += 1;
        }
        if span.end() > pos {
            return Err(out_of_bounds());
        }

        let succ = (pos == span.end() && i < n).then_some(i);
        Ok(Affected {
            start_pos,
            first,
            last: i,
            pred,
            pred_pos,
            succ,
        })
    }

    /// Replace the nodes under `span` with `operation(start_pos, old_runs)`,
    /// merge with equal neighbours, and publish the change.
    fn wrap<F>(&mut self, span: Span, operation: F) -> Result<AnnotationChange<A, O>>
    where
        F: FnOnce(usize, Vec<(usize, A)>) -> Vec<(usize, A)>,
    {
        let keys = self.keys();
        let affected = self.affected(&keys, span)?;

        let old_runs = keys[affected.first..affected.last]
            .iter()
            .map(|&key| {
                let node = &self.nodes[key];
                (node.length, node.annotation.clone())
            })
            .collect();
        let mut runs = merge_runs(operation(affected.start_pos, old_runs));

        let mut from = affected.first;
        let mut to = affected.last;
        let mut new_pos = affected.start_pos;

        if runs.is_empty() {
            // Removing everything between two equal neighbours joins them.
            if let (Some(p), Some(s)) = (affected.pred, affected.succ) {
                let (pred, succ) = (&self.nodes[keys[p]], &self.nodes[keys[s]]);
                if pred.annotation == succ.annotation {
                    runs.push((pred.length + succ.length, pred.annotation.clone()));
                    from = p;
                    to = s + 1;
                    new_pos = affected.pred_pos;
                }
            }
        } else {
            if let Some(p) = affected.pred {
                let pred = &self.nodes[keys[p]];
                if pred.annotation == runs[0].1 {
                    runs[0].0 += pred.length;
                    from = p;
                    new_pos = affected.pred_pos;
                }
            }
            if let Some(s) = affected.succ {
                let succ = &self.nodes[keys[s]];
                if let Some(last) = runs.last_mut().filter(|run| run.1 == succ.annotation) {
                    last.0 += succ.length;
                    to = s + 1;
                }
            }
        }

        let before = from.checked_sub(1).map(|i| keys[i]);
        let after = keys.get(to).copied();

        let mut old = Vec::with_capacity(to - from);
        let mut pos = if from < affected.first {
            affected.pred_pos
        } else {
            affected.start_pos
        };
        for &key in &keys[from..to] {
            let node = self.nodes.remove(key);
            self.len -= node.length;
            old.push(OldAnnotatedSpan {
                pos,
                length: node.length,
                annotation: node.annotation,
                attached: node.attached,
            });
            pos += node.length;
        }

        let mut new = Vec::with_capacity(runs.len());
        let mut new_keys = Vec::with_capacity(runs.len());
        let mut pos = new_pos;
        for (length, annotation) in runs {
            let generation = self.next_generation;
            self.next_generation += 1;
            let key = self.nodes.insert(Node {
                length,
                annotation: annotation.clone(),
                attached: None,
                generation,
                next: None,
            });
            self.len += length;
            new.push(NewAnnotatedSpan {
                pos,
                length,
                annotation,
                handle: NodeHandle { key, generation },
            });
            new_keys.push(key);
            pos += length;
        }

        for pair in new_keys.windows(2) {
            self.nodes[pair[0]].next = Some(pair[1]);
        }
        if let Some(&last) = new_keys.last() {
            self.nodes[last].next = after;
        }
        let first = new_keys.first().copied().or(after);
        match before {
            Some(key) => self.nodes[key].next = first,
            None => self.head = first,
        }

        let change = AnnotationChange { old, new };
        if !change.is_empty() {
            self.changes.emit(&change);
        }
        Ok(change)
    }
}

/// Drop empty runs and join neighbours with equal annotations.
fn merge_runs<A: PartialEq>(runs: Vec<(usize, A)>) -> Vec<(usize, A)> {
    let mut merged: Vec<(usize, A)> = Vec::with_capacity(runs.len());
    for (length, annotation) in runs {
        if length == 0 {
            continue;
        }
        match merged.last_mut() {
            Some(last) if last.1 == annotation => last.0 += length,
            _ => merged.push((length, annotation)),
        }
    }
    merged
}

impl<A: Clone + PartialEq, O> Default for AnnotationList<A, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: fmt::Debug, O> fmt::Debug for AnnotationList<A, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        let mut current = self.head;
        while let Some(key) = current {
            let node = &self.nodes[key];
            list.entry(&(node.length, &node.annotation));
            current = node.next;
        }
        list.finish()
    }
}
