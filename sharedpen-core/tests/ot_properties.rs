use proptest::prelude::*;
use sharedpen_core::{
    keys, AnnotationList, Attributes, Range, RichText, Span, TextOperation,
};

#[derive(Debug, Clone)]
enum Step {
    Retain(usize, u8),
    Insert(String, u8),
    Delete(usize),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1..8usize, 0..6u8).prop_map(|(n, a)| Step::Retain(n, a)),
        ("[a-zé]{1,5}", 0..6u8).prop_map(|(text, a)| Step::Insert(text, a)),
        (1..6usize).prop_map(Step::Delete),
    ]
}

fn arb_steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(arb_step(), 0..10)
}

fn arb_document() -> impl Strategy<Value = String> {
    "[a-cé \n]{0,40}"
}

fn attrs(code: u8) -> Attributes {
    match code {
        0 | 1 => Attributes::new(),
        2 => Attributes::new().with(keys::BOLD, true),
        3 => Attributes::new().with(keys::BOLD, false),
        4 => Attributes::new().with(keys::COLOR, "red"),
        _ => Attributes::new().with(keys::COLOR, "blue").with(keys::ITALIC, true),
    }
}

/// An operation over a `len`-char document; oversized steps are clamped.
fn build(len: usize, steps: &[Step]) -> TextOperation {
    let mut op = TextOperation::new();
    let mut remaining = len;
    for step in steps {
        match step {
            Step::Retain(n, a) => {
                let n = (*n).min(remaining);
                op = op.retain_with(n, attrs(*a));
                remaining -= n;
            }
            Step::Insert(text, a) => op = op.insert_with(text.as_str(), attrs(*a)),
            Step::Delete(n) => {
                let n = (*n).min(remaining);
                op = op.delete(n);
                remaining -= n;
            }
        }
    }
    op.retain(remaining)
}

/// An attributed document seeded from insert steps.
fn rich(seed: &[Step]) -> RichText {
    let mut doc = RichText::new();
    doc.apply(&build(0, seed)).unwrap();
    doc
}

fn runs(doc: &RichText) -> Vec<(usize, Attributes)> {
    let mut out = Vec::new();
    doc.annotations()
        .for_each(|length, attributes, _| out.push((length, attributes.clone())));
    out
}

proptest! {
    /// Both application orders of a transformed pair give the same string.
    #[test]
    fn prop_transform_converges(doc in arb_document(), a in arb_steps(), b in arb_steps()) {
        let len = doc.chars().count();
        let (a, b) = (build(len, &a), build(len, &b));
        let (a1, b1) = a.transform(&b).unwrap();

        let left = b1.apply(&a.apply(&doc).unwrap()).unwrap();
        let right = a1.apply(&b.apply(&doc).unwrap()).unwrap();
        prop_assert_eq!(left, right);
    }

    /// Convergence also holds for attributes on an attributed document.
    #[test]
    fn prop_transform_converges_with_attributes(seed in arb_steps(), a in arb_steps(), b in arb_steps()) {
        let mut left = rich(&seed);
        let mut right = rich(&seed);
        let (a, b) = (build(left.len(), &a), build(left.len(), &b));
        let (a1, b1) = a.transform(&b).unwrap();

        left.apply(&a).unwrap();
        left.apply(&b1).unwrap();
        right.apply(&b).unwrap();
        right.apply(&a1).unwrap();

        prop_assert_eq!(left.text(), right.text());
        prop_assert_eq!(runs(&left), runs(&right));
    }

    #[test]
    fn prop_compose_matches_sequential_apply(seed in arb_steps(), a in arb_steps(), b in arb_steps()) {
        let mut sequential = rich(&seed);
        let mut composed = rich(&seed);
        let a = build(sequential.len(), &a);
        let b = build(a.target_length(), &b);

        sequential.apply(&a).unwrap();
        sequential.apply(&b).unwrap();
        composed.apply(&a.compose(&b).unwrap()).unwrap();

        prop_assert_eq!(sequential.text(), composed.text());
        prop_assert_eq!(runs(&sequential), runs(&composed));
    }

    #[test]
    fn prop_invert_round_trip(doc in arb_document(), a in arb_steps()) {
        let op = build(doc.chars().count(), &a);
        let inverse = op.invert(&doc).unwrap();
        prop_assert_eq!(inverse.apply(&op.apply(&doc).unwrap()).unwrap(), doc);
    }

    /// The attribute-aware inverse restores text and formatting.
    #[test]
    fn prop_rich_text_invert_round_trip(seed in arb_steps(), a in arb_steps()) {
        let mut doc = rich(&seed);
        let (text, before) = (doc.text().to_string(), runs(&doc));
        let op = build(doc.len(), &a);

        let inverse = doc.invert_operation(&op).unwrap();
        doc.apply(&op).unwrap();
        doc.apply(&inverse).unwrap();

        prop_assert_eq!(doc.text(), text.as_str());
        prop_assert_eq!(runs(&doc), before);
    }

    /// Cursors stay inside the transformed document.
    #[test]
    fn prop_cursor_stays_in_bounds(doc in arb_document(), a in arb_steps(), at in 0..64usize) {
        let len = doc.chars().count();
        let op = build(len, &a);
        let cursor = Range::cursor(at % (len + 1)).transform(&op);
        prop_assert!(cursor.head <= op.target_length());
        prop_assert!(cursor.is_empty());
    }

    /// Random mutations keep the list merged and in step with a per-char model.
    #[test]
    fn prop_annotation_list_invariants(
        mutations in prop::collection::vec((0..3u8, 0..64usize, 1..6usize, 0..3u8), 0..40)
    ) {
        let mut list: AnnotationList<u8> = AnnotationList::new();
        let mut model: Vec<u8> = Vec::new();

        for (kind, pos, length, annotation) in mutations {
            match kind {
                0 => {
                    let pos = pos % (model.len() + 1);
                    list.insert_annotated_span(Span::new(pos, length), annotation).unwrap();
                    model.splice(pos..pos, std::iter::repeat(annotation).take(length));
                }
                1 if !model.is_empty() => {
                    let pos = pos % model.len();
                    let length = length.min(model.len() - pos);
                    list.remove_span(Span::new(pos, length)).unwrap();
                    model.drain(pos..pos + length);
                }
                2 if !model.is_empty() => {
                    let pos = pos % model.len();
                    let length = length.min(model.len() - pos);
                    list.update_span(Span::new(pos, length), |_, _| annotation).unwrap();
                    model[pos..pos + length].fill(annotation);
                }
                _ => {}
            }

            prop_assert!(list.check_invariants());
            let mut expanded = Vec::new();
            list.for_each(|length, annotation, _| {
                expanded.extend(std::iter::repeat(*annotation).take(length))
            });
            prop_assert_eq!(&expanded, &model);
        }
    }
}

#[test]
fn test_concurrent_insert_tie_break() {
    let a = TextOperation::new().insert("X").retain(3);
    let b = TextOperation::new().insert("Y").retain(3);
    let (a1, b1) = a.transform(&b).unwrap();
    assert_eq!(b1.apply(&a.apply("abc").unwrap()).unwrap(), "XYabc");
    assert_eq!(a1.apply(&b.apply("abc").unwrap()).unwrap(), "XYabc");
}
