//! cite-lifecycle: validate, prune, renumber and consolidate footnote
//! citations in Markdown documents split into sections.
//!
//! This library provides functionality to:
//! - Parse footnote marks (`[^N]`) and definitions (`[^N]: ...`)
//! - Classify citation URLs as valid, uncertain or invalid
//! - Remove invalid citations and close the label gaps they leave
//! - Merge all sections into one document with a single citations block

pub mod classify;
pub mod config;
pub mod consolidate;
pub mod document;
pub mod markdown;
pub mod output;
pub mod pipeline;
pub mod remove;
pub mod renumber;
pub mod validate;

pub use classify::{Classifier, HttpProbe, OfflineProbe, Probe, ValidationVerdict, VerdictStatus};
pub use config::{ConfigError, EngineConfig, MissingDefinitionPolicy};
pub use consolidate::{consolidate, Consolidated, Consolidator};
pub use document::{load_sections, write_sections, Document, LoadError, Section};
pub use markdown::{extract_definitions, extract_marks, scan, CitationDefinition, ParsedText};
pub use output::generate_output;
pub use pipeline::{CitationCounts, Pipeline, PipelineOutcome};
pub use remove::{remove_invalid, InvalidSet, PrunedDocument};
pub use renumber::renumber;
pub use validate::{CitationKey, ValidationReport, Validator};
