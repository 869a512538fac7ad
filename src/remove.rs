//! Invalid-citation removal (pass 1).
//!
//! Strips every inline mark and every definition of the citations classified
//! `Invalid` from every section, header included. Labels are left as they
//! are: gaps are expected and closed by the renumbering pass, which only
//! accepts a [`PrunedDocument`].

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::document::Document;
use crate::markdown::{scan, Mark};
use crate::output::{apply_replacements, Replacement};

/// Citations to remove, per section id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidSet {
    labels: BTreeMap<String, BTreeSet<u32>>,
}

impl InvalidSet {
    pub fn insert(&mut self, section: &str, label: u32) {
        self.labels.entry(section.to_string()).or_default().insert(label);
    }

    pub fn contains(&self, section: &str, label: u32) -> bool {
        self.labels.get(section).is_some_and(|l| l.contains(&label))
    }

    pub fn labels(&self, section: &str) -> Option<&BTreeSet<u32>> {
        self.labels.get(section)
    }

    /// Number of citations in the set.
    pub fn len(&self) -> usize {
        self.labels.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A document on which pass 1 has completed for every section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunedDocument {
    document: Document,
}

impl PrunedDocument {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }
}

/// What pass 1 removed from one section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemovalCounts {
    pub marks: usize,
    pub definitions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalSummary {
    /// Distinct citations removed
    pub citations: usize,
    pub marks: usize,
    pub definitions: usize,
    /// Per-section counts, for sections that changed
    pub sections: BTreeMap<String, RemovalCounts>,
}

/// Runs pass 1 over the whole document.
pub fn remove_invalid(mut document: Document, invalid: &InvalidSet) -> (PrunedDocument, RemovalSummary) {
    let mut summary = RemovalSummary {
        citations: invalid.len(),
        ..RemovalSummary::default()
    };

    for section in document.iter_mut() {
        let Some(labels) = invalid.labels(&section.id) else {
            continue;
        };
        let (text, counts) = remove_labels(&section.text, labels);
        if counts == RemovalCounts::default() {
            continue;
        }
        debug!(
            section = %section.id,
            marks = counts.marks,
            definitions = counts.definitions,
            "removed invalid citations"
        );
        section.text = text;
        summary.marks += counts.marks;
        summary.definitions += counts.definitions;
        summary.sections.insert(section.id.clone(), counts);
    }

    info!(
        citations = summary.citations,
        marks = summary.marks,
        definitions = summary.definitions,
        "pass 1 finished"
    );
    (PrunedDocument { document }, summary)
}

/// Removes every mark and definition of `labels` from one text.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeSet;
/// use cite_lifecycle::remove::remove_labels;
///
/// let labels = BTreeSet::from([1]);
/// let (text, _) = remove_labels("Growth [^1], [^2].\n\n[^1]: gone\n[^2]: kept\n", &labels);
/// assert_eq!(text, "Growth [^2].\n\n[^2]: kept\n");
/// ```
pub fn remove_labels(text: &str, labels: &BTreeSet<u32>) -> (String, RemovalCounts) {
    let parsed = scan(text);
    let mut counts = RemovalCounts::default();

    let mut edits = rewrite_marks(text, &parsed.marks, |m| {
        if labels.contains(&m.label) {
            MarkEdit::Remove
        } else {
            MarkEdit::Keep(text[m.span.0..m.span.1].to_string())
        }
    });
    counts.marks = parsed.marks.iter().filter(|m| labels.contains(&m.label)).count();

    for block in parsed.definitions.iter().filter(|d| labels.contains(&d.label)) {
        edits.push(Replacement::delete(definition_removal_span(text, block.span)));
        counts.definitions += 1;
    }

    (apply_replacements(text, &edits), counts)
}

/// A run of marks separated only by blanks and at most one comma, e.g.
/// `[^1], [^2]` or `[^3][^4]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MarkCluster {
    pub marks: Vec<Mark>,
    pub span: (usize, usize),
    /// Text between the first two marks, reused when rejoining survivors
    pub separator: String,
}

fn is_cluster_gap(between: &str) -> bool {
    between.chars().all(|c| c == ' ' || c == '\t' || c == ',')
        && between.chars().filter(|c| *c == ',').count() <= 1
}

/// Groups marks into clusters of adjacent marks.
pub(crate) fn mark_clusters(text: &str, marks: &[Mark]) -> Vec<MarkCluster> {
    let mut clusters: Vec<MarkCluster> = Vec::new();

    for mark in marks {
        if let Some(current) = clusters.last_mut() {
            let between = &text[current.span.1..mark.span.0];
            if is_cluster_gap(between) {
                if current.marks.len() == 1 {
                    current.separator = between.to_string();
                }
                current.marks.push(*mark);
                current.span.1 = mark.span.1;
                continue;
            }
        }
        clusters.push(MarkCluster {
            marks: vec![*mark],
            span: mark.span,
            separator: String::new(),
        });
    }

    clusters
}

/// What to do with one inline mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MarkEdit {
    /// Keep the mark, written as the given text
    Keep(String),
    Remove,
}

/// Builds the edits for rewriting or removing marks, cleaning up the
/// separators and whitespace removed marks leave behind.
pub(crate) fn rewrite_marks<F>(text: &str, marks: &[Mark], edit: F) -> Vec<Replacement>
where
    F: Fn(&Mark) -> MarkEdit,
{
    let mut edits = Vec::new();

    for cluster in mark_clusters(text, marks) {
        let planned: Vec<(&Mark, MarkEdit)> = cluster.marks.iter().map(|m| (m, edit(m))).collect();
        let kept: Vec<String> = planned
            .iter()
            .filter_map(|(_, e)| match e {
                MarkEdit::Keep(t) => Some(t.clone()),
                MarkEdit::Remove => None,
            })
            .collect();

        if kept.len() == planned.len() {
            for (m, e) in &planned {
                if let MarkEdit::Keep(t) = e {
                    if *t != text[m.span.0..m.span.1] {
                        edits.push(Replacement::new(m.span, t.clone()));
                    }
                }
            }
        } else if !kept.is_empty() {
            edits.push(Replacement::new(cluster.span, kept.join(&cluster.separator)));
        } else {
            edits.push(Replacement::delete(cluster_removal_span(text, cluster.span)));
        }
    }

    edits
}

/// Widens a fully removed cluster's span over the whitespace that would
/// otherwise be left dangling.
fn cluster_removal_span(text: &str, (start, end): (usize, usize)) -> (usize, usize) {
    let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
    let before = &text[line_start..start];
    let blank_before = before.len() - before.trim_end_matches([' ', '\t']).len();

    if blank_before == before.len() {
        let rest = &text[end..];
        let blank_after = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        return (start, end + blank_after);
    }

    let after = text[end..].chars().next();
    let dangling = after.map_or(true, |c| c.is_whitespace() || ".,;:!?)]".contains(c));
    if blank_before > 0 && dangling {
        (start - blank_before, end)
    } else {
        (start, end)
    }
}

/// The span of a definition block plus, when the block stands alone between
/// blank lines, the blank line after it.
fn definition_removal_span(text: &str, (start, end): (usize, usize)) -> (usize, usize) {
    let preceded_by_blank = start == 0
        || text[..start - 1]
            .rsplit('\n')
            .next()
            .is_some_and(|line| line.trim().is_empty());

    let rest = &text[end..];
    let next_line = match rest.find('\n') {
        Some(i) => &rest[..=i],
        None => rest,
    };
    let followed_by_blank = !next_line.is_empty() && next_line.trim().is_empty();

    if preceded_by_blank && followed_by_blank {
        (start, end + next_line.len())
    } else {
        (start, end)
    }
}
