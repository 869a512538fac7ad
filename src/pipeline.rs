//! The full citation lifecycle for one document.
//!
//! Stages run strictly one after another, each over the whole document:
//! validate, remove (pass 1), renumber (pass 2), consolidate. Sections may be
//! edited externally between cleaning and consolidation, which is why the
//! two halves are also available separately.

use std::fmt;

use serde::Serialize;

use crate::classify::Probe;
use crate::consolidate::{Consolidated, Consolidator};
use crate::config::EngineConfig;
use crate::document::Document;
use crate::remove::{remove_invalid, RemovalSummary};
use crate::renumber::{renumber, RenumberOutcome};
use crate::validate::{ValidationReport, Validator};

/// Totals shown to the user after every run, zeros included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CitationCounts {
    pub total: usize,
    pub removed: usize,
    pub remaining: usize,
}

impl fmt::Display for CitationCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "citations: {} total, {} removed, {} remaining",
            self.total, self.removed, self.remaining
        )
    }
}

/// The result of validating and cleaning a document.
#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub report: ValidationReport,
    pub removal: RemovalSummary,
    pub renumbered: Vec<RenumberOutcome>,
    /// The sections after pass 2
    pub document: Document,
    pub counts: CitationCounts,
}

/// The result of the whole pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub clean: CleanOutcome,
    pub consolidated: Consolidated,
}

pub struct Pipeline<P> {
    validator: Validator<P>,
    consolidator: Consolidator,
}

impl<P: Probe> Pipeline<P> {
    pub fn new(validator: Validator<P>, config: &EngineConfig) -> Self {
        Pipeline {
            validator,
            consolidator: Consolidator::new(config.missing_definitions),
        }
    }

    /// Validates, then removes every invalid citation, then closes gaps.
    pub fn clean(&self, document: Document) -> CleanOutcome {
        let report = self.validator.validate(&document);
        let invalid = report.invalid_set();
        let (pruned, removal) = remove_invalid(document, &invalid);
        let (document, renumbered) = renumber(pruned);

        let total = report.summary.total;
        let counts = CitationCounts {
            total,
            removed: removal.citations,
            remaining: total - removal.citations,
        };

        CleanOutcome {
            report,
            removal,
            renumbered,
            document,
            counts,
        }
    }

    pub fn consolidate(&self, document: &Document) -> Consolidated {
        self.consolidator.consolidate(document)
    }

    /// Runs every stage and assembles the final document.
    pub fn run(&self, document: Document) -> PipelineOutcome {
        let clean = self.clean(document);
        let consolidated = self.consolidate(&clean.document);
        PipelineOutcome {
            clean,
            consolidated,
        }
    }
}
