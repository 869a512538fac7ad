//! Citation validation.
//!
//! The validator reads every definition of every section, checks its
//! structure and dates, classifies its URL, and produces a report. It never
//! modifies the document; removal is driven from the report afterwards.
//!
//! Each distinct URL is classified once per run, on a bounded worker pool,
//! so a URL that recurs in several sections gets one verdict everywhere.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{Local, Months, NaiveDate};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::{Classifier, Probe, ValidationVerdict, VerdictStatus};
use crate::config::EngineConfig;
use crate::document::Document;
use crate::markdown::{scan, CitationDefinition, DateField};
use crate::remove::InvalidSet;

/// Identifies a citation: a local label only means something inside its
/// section.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CitationKey {
    pub section: String,
    pub label: u32,
}

impl CitationKey {
    pub fn new(section: impl Into<String>, label: u32) -> Self {
        CitationKey {
            section: section.into(),
            label,
        }
    }
}

impl fmt::Display for CitationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [^{}]", self.section, self.label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// What a finding is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// No resolvable URL at all
    Structural,
    DateMismatch,
    FutureDate,
    StaleDate,
    UnparseableDate,
    HallucinationPattern,
    NotFound,
    NetworkUncertainty,
    DuplicateUrl,
    DuplicateDefinition,
    MissingDefinition,
    UnreferencedDefinition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub kind: IssueKind,
    pub message: String,
}

impl Issue {
    fn error(kind: IssueKind, message: impl Into<String>) -> Self {
        Issue {
            severity: Severity::Error,
            kind,
            message: message.into(),
        }
    }

    fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Issue {
            severity: Severity::Warning,
            kind,
            message: message.into(),
        }
    }
}

/// Findings for one defined citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationReport {
    pub key: CitationKey,
    pub url: Option<String>,
    pub status: VerdictStatus,
    pub verdict: Option<ValidationVerdict>,
    pub issues: Vec<Issue>,
}

/// Distinct citations that resolve to the same URL. Reported, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateUrl {
    pub url: String,
    pub citations: Vec<CitationKey>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub valid: usize,
    pub uncertain: usize,
    pub invalid: usize,
    pub errors: usize,
    pub warnings: usize,
}

/// The validator's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// One entry per defined citation, in canonical order
    pub citations: Vec<CitationReport>,
    pub duplicates: Vec<DuplicateUrl>,
    /// Inline marks whose section has no definition for them
    pub missing_definitions: Vec<CitationKey>,
    pub summary: ReportSummary,
}

impl ValidationReport {
    /// Every finding, keyed by citation.
    pub fn issues_by_key(&self) -> BTreeMap<CitationKey, Vec<Issue>> {
        let mut map: BTreeMap<CitationKey, Vec<Issue>> = BTreeMap::new();
        for citation in &self.citations {
            if !citation.issues.is_empty() {
                map.entry(citation.key.clone())
                    .or_default()
                    .extend(citation.issues.iter().cloned());
            }
        }
        for key in &self.missing_definitions {
            map.entry(key.clone()).or_default().push(missing_definition_issue());
        }
        map
    }

    /// The citations classified `Invalid`, ready for removal.
    pub fn invalid_set(&self) -> InvalidSet {
        let mut set = InvalidSet::default();
        for citation in &self.citations {
            if citation.status == VerdictStatus::Invalid {
                set.insert(&citation.key.section, citation.key.label);
            }
        }
        set
    }

    pub fn citation(&self, key: &CitationKey) -> Option<&CitationReport> {
        self.citations.iter().find(|c| &c.key == key)
    }
}

fn missing_definition_issue() -> Issue {
    Issue::warning(
        IssueKind::MissingDefinition,
        "cited inline but never defined in its section",
    )
}

/// Validates citation definitions and classifies their URLs.
pub struct Validator<P> {
    classifier: Classifier<P>,
    config: EngineConfig,
    today: NaiveDate,
}

impl<P: Probe> Validator<P> {
    pub fn new(classifier: Classifier<P>, config: EngineConfig) -> Self {
        Validator {
            classifier,
            config,
            today: Local::now().date_naive(),
        }
    }

    /// Overrides the date used for future/stale checks.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn validate(&self, document: &Document) -> ValidationReport {
        let mut citations = Vec::new();
        let mut missing_definitions = Vec::new();

        for section in document.iter() {
            let parsed = scan(&section.text);

            let mut definition_counts: HashMap<u32, usize> = HashMap::new();
            for block in &parsed.definitions {
                *definition_counts.entry(block.label).or_default() += 1;
            }

            let mut seen = HashSet::new();
            for block in &parsed.definitions {
                if !seen.insert(block.label) {
                    continue;
                }
                let definition = CitationDefinition::from(block);
                let mut issues = self.check_dates(&definition);
                if let Some(&count) = definition_counts.get(&block.label).filter(|c| **c > 1) {
                    issues.push(Issue::warning(
                        IssueKind::DuplicateDefinition,
                        format!("defined {} times; the first definition is used", count),
                    ));
                }
                if !parsed.is_cited(block.label) {
                    issues.push(Issue::warning(
                        IssueKind::UnreferencedDefinition,
                        "defined but never cited; dropped at consolidation",
                    ));
                }
                citations.push(CitationReport {
                    key: CitationKey::new(&section.id, block.label),
                    url: definition.url,
                    status: VerdictStatus::Valid,
                    verdict: None,
                    issues,
                });
            }

            for label in parsed.inline_labels() {
                if parsed.definition(label).is_none() {
                    missing_definitions.push(CitationKey::new(&section.id, label));
                }
            }
            debug!(section = %section.id, definitions = seen.len(), "collected definitions");
        }

        let urls: BTreeSet<String> = citations.iter().filter_map(|c| c.url.clone()).collect();
        let verdicts = self.classify_all(urls.into_iter().collect());

        for citation in &mut citations {
            fold_verdict(citation, &verdicts);
        }

        let duplicates = find_duplicate_urls(&mut citations);

        let mut report = ValidationReport {
            citations,
            duplicates,
            missing_definitions,
            summary: ReportSummary::default(),
        };
        report.summary = summarize(&report);

        let s = report.summary;
        info!(
            total = s.total,
            valid = s.valid,
            uncertain = s.uncertain,
            invalid = s.invalid,
            "validation finished"
        );
        report
    }

    /// Classifies each URL once on a pool of `workers` threads.
    fn classify_all(&self, urls: Vec<String>) -> HashMap<String, ValidationVerdict> {
        let verdicts = Mutex::new(HashMap::with_capacity(urls.len()));
        let classify_one = |url: &String| {
            let verdict = self.classifier.classify(url);
            if verdict.status == VerdictStatus::Uncertain {
                warn!(%url, reason = %verdict.reason, "could not confirm URL");
            }
            record_verdict(&verdicts, url, verdict);
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("probe-{}", i))
            .build();
        match pool {
            Ok(pool) => pool.install(|| urls.par_iter().for_each(&classify_one)),
            Err(e) => {
                warn!("probe pool unavailable, probing sequentially: {}", e);
                urls.iter().for_each(&classify_one);
            }
        }

        verdicts.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_dates(&self, definition: &CitationDefinition) -> Vec<Issue> {
        let mut issues = Vec::new();
        let published = definition.published.as_ref().and_then(DateField::date);
        let updated = definition.updated.as_ref().and_then(DateField::date);

        for (name, field) in [("Published", &definition.published), ("Updated", &definition.updated)] {
            if let Some(DateField::Unparseable(raw)) = field {
                issues.push(Issue::warning(
                    IssueKind::UnparseableDate,
                    format!("{} date '{}' is not YYYY-MM-DD", name, raw),
                ));
            }
        }

        if let Some(published) = published {
            if published > self.today {
                issues.push(Issue::error(
                    IssueKind::FutureDate,
                    format!("Published date {} is in the future", published),
                ));
            } else if let Some(cutoff) = self
                .config
                .max_age_years
                .checked_mul(12)
                .and_then(|months| self.today.checked_sub_months(Months::new(months)))
            {
                if published < cutoff {
                    issues.push(Issue::warning(
                        IssueKind::StaleDate,
                        format!(
                            "Published date {} is more than {} years old",
                            published, self.config.max_age_years
                        ),
                    ));
                }
            }
        }

        if let Some(displayed) = definition.displayed_date {
            if (published.is_some() || updated.is_some())
                && Some(displayed) != published
                && Some(displayed) != updated
            {
                issues.push(Issue::warning(
                    IssueKind::DateMismatch,
                    format!(
                        "displayed date {} matches neither Published nor Updated",
                        displayed
                    ),
                ));
            }
        }

        issues
    }
}

/// Stores a verdict even if another worker panicked while holding the lock.
fn record_verdict(
    verdicts: &Mutex<HashMap<String, ValidationVerdict>>,
    url: &str,
    verdict: ValidationVerdict,
) {
    verdicts
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(url.to_string(), verdict);
}

fn fold_verdict(citation: &mut CitationReport, verdicts: &HashMap<String, ValidationVerdict>) {
    let Some(url) = &citation.url else {
        citation.status = VerdictStatus::Invalid;
        citation.issues.insert(
            0,
            Issue::error(
                IssueKind::Structural,
                "no source URL (expected a markdown link or a trailing 'URL:' field)",
            ),
        );
        return;
    };

    let verdict = verdicts.get(url).cloned().unwrap_or_else(|| ValidationVerdict {
        status: VerdictStatus::Uncertain,
        reason: "URL was not classified".to_string(),
        resolved_url: None,
        http_status: None,
        pattern: None,
    });

    citation.status = verdict.status;
    let issue = match verdict.status {
        VerdictStatus::Valid => None,
        VerdictStatus::Uncertain => Some(Issue::warning(
            IssueKind::NetworkUncertainty,
            verdict.reason.clone(),
        )),
        VerdictStatus::Invalid if verdict.pattern.is_some() => Some(Issue::error(
            IssueKind::HallucinationPattern,
            verdict.reason.clone(),
        )),
        VerdictStatus::Invalid => Some(Issue::error(IssueKind::NotFound, verdict.reason.clone())),
    };
    if let Some(issue) = issue {
        citation.issues.insert(0, issue);
    }
    citation.verdict = Some(verdict);
}

fn url_identity(url: &str) -> &str {
    url.trim().trim_end_matches('/')
}

fn find_duplicate_urls(citations: &mut [CitationReport]) -> Vec<DuplicateUrl> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, citation) in citations.iter().enumerate() {
        if let Some(url) = &citation.url {
            groups.entry(url_identity(url).to_string()).or_default().push(i);
        }
    }

    let mut duplicates = Vec::new();
    for (url, indices) in groups {
        if indices.len() < 2 {
            continue;
        }
        let keys: Vec<CitationKey> = indices.iter().map(|&i| citations[i].key.clone()).collect();
        for &i in &indices {
            let others: Vec<String> = keys
                .iter()
                .filter(|k| **k != citations[i].key)
                .map(ToString::to_string)
                .collect();
            citations[i].issues.push(Issue::warning(
                IssueKind::DuplicateUrl,
                format!("same URL as {}", others.join(", ")),
            ));
        }
        duplicates.push(DuplicateUrl {
            url,
            citations: keys,
        });
    }
    duplicates
}

fn summarize(report: &ValidationReport) -> ReportSummary {
    let mut summary = ReportSummary {
        total: report.citations.len(),
        ..ReportSummary::default()
    };
    for citation in &report.citations {
        match citation.status {
            VerdictStatus::Valid => summary.valid += 1,
            VerdictStatus::Uncertain => summary.uncertain += 1,
            VerdictStatus::Invalid => summary.invalid += 1,
        }
        for issue in &citation.issues {
            match issue.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
            }
        }
    }
    summary.warnings += report.missing_definitions.len();
    summary
}
