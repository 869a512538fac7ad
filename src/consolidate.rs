//! Global consolidation.
//!
//! Assembles the final document: every citation gets a global label in order
//! of its first inline appearance (header first, then sections in canonical
//! order), marks are rewritten, definitions move out of the sections into a
//! single trailing citations block, and definitions nobody cites are
//! dropped.
//!
//! A citation is identified by its section and local label, so `[^1]` in two
//! different sections are two different citations. The numbering map lives
//! only for the duration of one call.
//!
//! Consolidating already-consolidated output reproduces it byte for byte.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::MissingDefinitionPolicy;
use crate::document::Document;
use crate::markdown::{scan, ParsedText};
use crate::output::{
    apply_replacements, generate_output, mark, normalize_blank_lines, render_citations_block,
    strip_citations_block, Replacement,
};
use crate::remove::{rewrite_marks, MarkEdit};
use crate::validate::CitationKey;

/// One entry of the final numbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalCitation {
    pub label: u32,
    pub source: CitationKey,
    /// False when the citing section had no definition for it
    pub defined: bool,
}

/// The consolidated document and what happened on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Consolidated {
    pub text: String,
    pub citations: Vec<GlobalCitation>,
    /// Inline marks with no definition in their section
    pub missing_definitions: Vec<CitationKey>,
    /// Definitions that were never cited inline, and so were not listed
    pub dropped_definitions: Vec<CitationKey>,
}

impl Consolidated {
    /// Number of lines in the citations block.
    pub fn listed(&self) -> usize {
        self.citations.iter().filter(|c| c.defined).count()
    }
}

pub struct Consolidator {
    policy: MissingDefinitionPolicy,
}

impl Default for Consolidator {
    fn default() -> Self {
        Consolidator::new(MissingDefinitionPolicy::default())
    }
}

impl Consolidator {
    pub fn new(policy: MissingDefinitionPolicy) -> Self {
        Consolidator { policy }
    }

    pub fn consolidate(&self, document: &Document) -> Consolidated {
        let sections: Vec<(&str, &str, ParsedText)> = document
            .iter()
            .map(|s| (s.id.as_str(), s.text.as_str(), scan(&s.text)))
            .collect();

        // (section index, local label) -> global label
        let mut numbering: HashMap<(usize, u32), u32> = HashMap::new();
        let mut citations = Vec::new();
        let mut cited_in: Vec<usize> = Vec::new();
        let mut missing_definitions = Vec::new();

        for (index, (id, _, parsed)) in sections.iter().enumerate() {
            for m in &parsed.marks {
                if numbering.contains_key(&(index, m.label)) {
                    continue;
                }
                let defined = parsed.definition(m.label).is_some();
                if !defined {
                    let key = CitationKey::new(*id, m.label);
                    if missing_definitions.contains(&key) {
                        continue;
                    }
                    warn!(citation = %key, "inline mark has no definition");
                    missing_definitions.push(key);
                    if self.policy == MissingDefinitionPolicy::Drop {
                        continue;
                    }
                }
                let label = citations.len() as u32 + 1;
                numbering.insert((index, m.label), label);
                cited_in.push(index);
                citations.push(GlobalCitation {
                    label,
                    source: CitationKey::new(*id, m.label),
                    defined,
                });
            }
        }

        let mut bodies = Vec::with_capacity(sections.len());
        let mut dropped_definitions = Vec::new();
        for (index, (id, text, parsed)) in sections.iter().enumerate() {
            let mut edits = rewrite_marks(text, &parsed.marks, |m| {
                match numbering.get(&(index, m.label)) {
                    Some(global) => MarkEdit::Keep(mark(*global)),
                    None => MarkEdit::Remove,
                }
            });
            for block in &parsed.definitions {
                edits.push(Replacement::delete(block.span));
            }
            for label in parsed.definition_map().keys() {
                if !numbering.contains_key(&(index, *label)) {
                    dropped_definitions.push(CitationKey::new(*id, *label));
                }
            }

            let body = apply_replacements(text, &edits);
            bodies.push(normalize_blank_lines(strip_citations_block(&body)));
        }
        dropped_definitions.sort();

        let entries: Vec<(u32, &str)> = citations
            .iter()
            .zip(&cited_in)
            .filter_map(|(c, &index)| {
                let block = sections[index].2.definition(c.source.label)?;
                Some((c.label, block.body.as_str()))
            })
            .collect();

        let text = generate_output(&bodies, &render_citations_block(&entries));

        info!(
            citations = citations.len(),
            listed = entries.len(),
            dropped = dropped_definitions.len(),
            missing = missing_definitions.len(),
            "consolidation finished"
        );

        Consolidated {
            text,
            citations,
            missing_definitions,
            dropped_definitions,
        }
    }
}

/// Consolidates with the default missing-definition policy.
pub fn consolidate(document: &Document) -> Consolidated {
    Consolidator::default().consolidate(document)
}
