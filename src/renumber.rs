//! Local renumbering (pass 2).
//!
//! Closes the gaps pass 1 leaves behind, independently in every section: the
//! labels still present (cited or defined) are mapped onto `1..=N` in their
//! existing order, and marks and definition openers are rewritten.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::document::{Document, Section};
use crate::markdown::scan;
use crate::output::{apply_replacements, mark, Replacement};
use crate::remove::PrunedDocument;

/// The relabelling applied to one section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenumberOutcome {
    pub section: String,
    /// Old label to new label, only for labels that changed
    pub mapping: BTreeMap<u32, u32>,
}

impl RenumberOutcome {
    pub fn changed(&self) -> bool {
        !self.mapping.is_empty()
    }
}

/// True when `labels` is exactly `1..=N`.
pub fn is_contiguous(labels: &BTreeSet<u32>) -> bool {
    labels.iter().zip(1u32..).all(|(label, expected)| *label == expected)
}

/// Renumbers one text. Returns the new text and the labels that changed.
///
/// # Examples
///
/// ```
/// use cite_lifecycle::renumber::renumber_text;
///
/// let (text, _) = renumber_text("A [^3] B [^10]\n\n[^3]: a\n[^10]: b\n");
/// assert_eq!(text, "A [^1] B [^2]\n\n[^1]: a\n[^2]: b\n");
/// ```
pub fn renumber_text(text: &str) -> (String, BTreeMap<u32, u32>) {
    let parsed = scan(text);
    let labels = parsed.labels();
    if is_contiguous(&labels) {
        return (text.to_string(), BTreeMap::new());
    }

    let mapping: BTreeMap<u32, u32> = labels
        .iter()
        .zip(1u32..)
        .filter(|(old, new)| **old != *new)
        .map(|(old, new)| (*old, new))
        .collect();

    let spans = parsed
        .marks
        .iter()
        .map(|m| (m.label, m.span))
        .chain(parsed.definitions.iter().map(|d| (d.label, d.label_span)));
    let edits: Vec<Replacement> = spans
        .filter_map(|(label, span)| mapping.get(&label).map(|new| Replacement::new(span, mark(*new))))
        .collect();

    (apply_replacements(text, &edits), mapping)
}

/// Renumbers one section in place. Usable on its own after external edits.
pub fn renumber_section(section: &mut Section) -> RenumberOutcome {
    let (text, mapping) = renumber_text(&section.text);
    if !mapping.is_empty() {
        debug!(section = %section.id, ?mapping, "renumbered");
        section.text = text;
    }
    RenumberOutcome {
        section: section.id.clone(),
        mapping,
    }
}

/// Runs pass 2 over every section of a pruned document.
pub fn renumber(pruned: PrunedDocument) -> (Document, Vec<RenumberOutcome>) {
    let mut document = pruned.into_document();
    let outcomes: Vec<RenumberOutcome> = document.iter_mut().map(renumber_section).collect();
    info!(
        sections = outcomes.iter().filter(|o| o.changed()).count(),
        "pass 2 finished"
    );
    (document, outcomes)
}
