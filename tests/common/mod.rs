//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use cite_lifecycle::classify::ProbeOutcome;
use cite_lifecycle::{Classifier, Document, EngineConfig, Pipeline, Probe, Section, Validator};
use tempfile::TempDir;

/// Answers probes from a fixed table of HTTP statuses. URLs not in the
/// table answer 200.
#[derive(Default)]
pub struct StubProbe {
    statuses: HashMap<String, u16>,
}

impl StubProbe {
    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }
}

impl Probe for StubProbe {
    fn probe(&self, url: &str) -> ProbeOutcome {
        ProbeOutcome::Response {
            status: self.statuses.get(url).copied().unwrap_or(200),
            final_url: url.to_string(),
        }
    }
}

/// The date every validator in the tests treats as today.
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

pub fn validator(probe: StubProbe) -> Validator<StubProbe> {
    Validator::new(Classifier::new(probe), EngineConfig::default()).with_today(today())
}

pub fn pipeline(probe: StubProbe) -> Pipeline<StubProbe> {
    Pipeline::new(validator(probe), &EngineConfig::default())
}

/// Build a document from `(id, text)` pairs, without a header.
pub fn document(sections: &[(&str, &str)]) -> Document {
    Document::new(
        None,
        sections
            .iter()
            .map(|(id, text)| Section::new(*id, *text))
            .collect(),
    )
}

/// Write `(file name, content)` pairs into a fresh temporary directory.
pub fn section_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

pub fn read(dir: &TempDir, name: &str) -> String {
    let path: PathBuf = dir.path().join(name);
    fs::read_to_string(path).unwrap()
}
