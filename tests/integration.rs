//! Integration tests using TOML fixtures.
//!
//! This test harness loads test cases from TOML files in the `fixtures/` directory
//! and runs them against the cite-lifecycle library.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use cite_lifecycle::{
    consolidate, extract_definitions, extract_marks, remove_invalid, renumber, Document,
    InvalidSet, Section,
};

/// A test fixture loaded from a TOML file.
#[derive(Debug, Deserialize)]
struct Fixture {
    /// Name of the test case
    name: String,
    /// Optional header text, placed before every section
    #[serde(default)]
    header: Option<String>,
    /// Input sections (for clean and consolidate tests)
    #[serde(default)]
    sections: Vec<FixtureSection>,
    /// Input Markdown text (for parsing tests)
    #[serde(default)]
    markdown: String,
    /// Citations to remove (for clean tests)
    #[serde(default)]
    invalid: Vec<FixtureCitation>,
    /// Expected consolidated document
    #[serde(default)]
    expected: Option<String>,
    /// Expected sections after cleaning
    #[serde(default)]
    expected_sections: Vec<FixtureSection>,
    /// Expected inline labels in order (for parsing tests)
    #[serde(default)]
    expected_marks: Option<Vec<u32>>,
    /// Expected defined labels, sorted (for parsing tests)
    #[serde(default)]
    expected_definitions: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize)]
struct FixtureSection {
    id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct FixtureCitation {
    section: String,
    label: u32,
}

impl Fixture {
    fn document(&self) -> Document {
        Document::new(
            self.header
                .as_ref()
                .map(|h| Section::new(cite_lifecycle::document::HEADER_ID, h.as_str())),
            self.sections
                .iter()
                .map(|s| Section::new(s.id.as_str(), s.text.as_str()))
                .collect(),
        )
    }
}

/// Load all fixtures from a directory.
fn load_fixtures(dir: &Path) -> Vec<(String, Fixture)> {
    let mut fixtures = Vec::new();

    if !dir.exists() {
        return fixtures;
    }

    for entry in fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();

        if path.extension().map_or(false, |e| e == "toml") {
            let content = fs::read_to_string(&path).unwrap();
            let fixture: Fixture = toml::from_str(&content)
                .unwrap_or_else(|e| panic!("invalid fixture {}: {}", path.display(), e));
            let name = path.file_stem().unwrap().to_string_lossy().to_string();
            fixtures.push((name, fixture));
        }
    }

    fixtures.sort_by(|a, b| a.0.cmp(&b.0));
    fixtures
}

/// Run parsing tests - verify mark and definition extraction.
fn run_parsing_test(name: &str, fixture: &Fixture) {
    if let Some(expected) = &fixture.expected_marks {
        assert_eq!(
            &extract_marks(&fixture.markdown),
            expected,
            "Test '{}' marks mismatch",
            name
        );
    }

    if let Some(expected) = &fixture.expected_definitions {
        let mut labels: Vec<u32> = extract_definitions(&fixture.markdown).into_keys().collect();
        labels.sort_unstable();
        assert_eq!(&labels, expected, "Test '{}' definitions mismatch", name);
    }
}

/// Run clean tests - remove the listed citations, renumber, compare sections.
fn run_clean_test(name: &str, fixture: &Fixture) {
    let mut invalid = InvalidSet::default();
    for citation in &fixture.invalid {
        invalid.insert(&citation.section, citation.label);
    }

    let (pruned, _) = remove_invalid(fixture.document(), &invalid);
    let (document, _) = renumber(pruned);

    assert_eq!(
        document.sections.len(),
        fixture.expected_sections.len(),
        "Test '{}' section count mismatch",
        name
    );
    for (actual, expected) in document.sections.iter().zip(&fixture.expected_sections) {
        assert_eq!(actual.id, expected.id, "Test '{}' section order mismatch", name);
        assert_eq!(
            actual.text, expected.text,
            "Test '{}' section '{}' mismatch",
            name, expected.id
        );
    }
}

/// Run consolidation tests - merge sections and compare the document.
fn run_consolidate_test(name: &str, fixture: &Fixture) {
    let output = consolidate(&fixture.document());

    if let Some(expected) = &fixture.expected {
        assert_eq!(&output.text, expected, "Test '{}' output mismatch", name);
    }

    let again = consolidate(&Document::single(output.text.clone()));
    assert_eq!(again.text, output.text, "Test '{}' is not idempotent", name);
}

#[test]
fn test_parsing_fixtures() {
    let fixtures_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/parsing");
    let fixtures = load_fixtures(&fixtures_dir);
    assert!(!fixtures.is_empty());

    for (name, fixture) in fixtures {
        println!("Running parsing test: {}", fixture.name);
        run_parsing_test(&name, &fixture);
    }
}

#[test]
fn test_clean_fixtures() {
    let fixtures_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/clean");
    let fixtures = load_fixtures(&fixtures_dir);
    assert!(!fixtures.is_empty());

    for (name, fixture) in fixtures {
        println!("Running clean test: {}", fixture.name);
        run_clean_test(&name, &fixture);
    }
}

#[test]
fn test_consolidate_fixtures() {
    let fixtures_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/consolidate");
    let fixtures = load_fixtures(&fixtures_dir);
    assert!(!fixtures.is_empty());

    for (name, fixture) in fixtures {
        println!("Running consolidate test: {}", fixture.name);
        run_consolidate_test(&name, &fixture);
    }
}
