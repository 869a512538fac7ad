//! Markdown footnote citation parser.
//!
//! Extracts inline marks in the format `[^3]` and definition blocks in the
//! format `[^3]: body` from Markdown text, and parses the fields carried by a
//! definition body (source URL, displayed date, `Published:`/`Updated:`).
//!
//! Definitions are recognised by a line scanner with two states: outside a
//! definition, and inside a definition body. A body continues across
//! following non-blank lines until a blank line, the next definition opener,
//! or the end of the text. Marks are only collected from lines outside
//! definitions.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static OPENER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[\^(\d+)\]:").expect("definition opener regex"));

static MARK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\^(\d+)\]").expect("mark regex"));

static LEGACY_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bURL:\s*(https?://\S+)").expect("legacy url regex"));

static DISPLAY_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}),\s*([A-Za-z]{3})[A-Za-z]*\.?\s+(\d{1,2})\b").expect("display date regex")
});

static PUBLISHED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Published:\s*([^|\n]+)").expect("published regex"));

static UPDATED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Updated:\s*([^|\n]+)").expect("updated regex"));

/// An inline citation mark found outside definition bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    /// The numeric label (e.g., 3 for `[^3]`)
    pub label: u32,
    /// Start and end byte positions of `[^3]` in the original text
    pub span: (usize, usize),
}

/// A definition block: the opener line plus its continuation lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionBlock {
    /// The label being defined
    pub label: u32,
    /// The body text with the opener token removed, lines joined by `\n`
    pub body: String,
    /// Byte range covering every line of the block, trailing newline included
    pub span: (usize, usize),
    /// Byte range of the `[^N]` token on the opener line
    pub label_span: (usize, usize),
}

/// The result of scanning a text for citations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedText {
    /// Inline marks in textual order (duplicates included)
    pub marks: Vec<Mark>,
    /// Definition blocks in textual order (duplicates included)
    pub definitions: Vec<DefinitionBlock>,
}

impl ParsedText {
    /// Inline labels, deduplicated, in order of first appearance.
    pub fn inline_labels(&self) -> Vec<u32> {
        let mut seen = HashSet::new();
        self.marks
            .iter()
            .filter(|m| seen.insert(m.label))
            .map(|m| m.label)
            .collect()
    }

    /// The authoritative definition for a label. The first block wins.
    pub fn definition(&self, label: u32) -> Option<&DefinitionBlock> {
        self.definitions.iter().find(|d| d.label == label)
    }

    /// Map of label to body, first definition wins.
    pub fn definition_map(&self) -> HashMap<u32, String> {
        let mut map = HashMap::new();
        for def in &self.definitions {
            map.entry(def.label).or_insert_with(|| def.body.clone());
        }
        map
    }

    /// Every label present in the text, inline or defined, ascending.
    pub fn labels(&self) -> BTreeSet<u32> {
        self.marks
            .iter()
            .map(|m| m.label)
            .chain(self.definitions.iter().map(|d| d.label))
            .collect()
    }

    /// True when `label` has at least one inline mark.
    pub fn is_cited(&self, label: u32) -> bool {
        self.marks.iter().any(|m| m.label == label)
    }
}

enum ScanState {
    OutsideDefinition,
    InDefinitionBody(OpenBlock),
}

struct OpenBlock {
    label: u32,
    start: usize,
    end: usize,
    label_span: (usize, usize),
    lines: Vec<String>,
}

impl OpenBlock {
    fn close(self) -> DefinitionBlock {
        DefinitionBlock {
            label: self.label,
            body: self.lines.join("\n").trim().to_string(),
            span: (self.start, self.end),
            label_span: self.label_span,
        }
    }
}

/// Scans the given Markdown text for citation marks and definitions.
///
/// # Examples
///
/// ```
/// use cite_lifecycle::scan;
///
/// let parsed = scan("Revenue grew. [^2]\n\n[^2]: Source. URL: https://a.org/x\n");
/// assert_eq!(parsed.inline_labels(), vec![2]);
/// assert_eq!(parsed.definitions[0].label, 2);
/// ```
pub fn scan(text: &str) -> ParsedText {
    let mut parsed = ParsedText::default();
    let mut state = ScanState::OutsideDefinition;
    let mut offset = 0;

    for raw_line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += raw_line.len();
        let line = raw_line.trim_end_matches(['\n', '\r']);

        if let Some((label, token_len)) = definition_opener(line) {
            if let ScanState::InDefinitionBody(block) =
                std::mem::replace(&mut state, ScanState::OutsideDefinition)
            {
                parsed.definitions.push(block.close());
            }
            state = ScanState::InDefinitionBody(OpenBlock {
                label,
                start: line_start,
                end: offset,
                label_span: (line_start, line_start + token_len),
                lines: vec![line[token_len + 1..].trim().to_string()],
            });
            continue;
        }

        match &mut state {
            ScanState::InDefinitionBody(block) if !line.trim().is_empty() => {
                block.lines.push(line.trim().to_string());
                block.end = offset;
            }
            _ => {
                if let ScanState::InDefinitionBody(block) =
                    std::mem::replace(&mut state, ScanState::OutsideDefinition)
                {
                    parsed.definitions.push(block.close());
                }
                scan_marks(line, line_start, &mut parsed.marks);
            }
        }
    }

    if let ScanState::InDefinitionBody(block) = state {
        parsed.definitions.push(block.close());
    }

    parsed
}

/// Returns the label and the length of the `[^N]` token when the line opens a
/// definition.
fn definition_opener(line: &str) -> Option<(u32, usize)> {
    let cap = OPENER_RE.captures(line)?;
    let label = cap.get(1)?.as_str().parse().ok()?;
    Some((label, cap.get(0)?.len() - 1))
}

fn scan_marks(line: &str, line_start: usize, marks: &mut Vec<Mark>) {
    for cap in MARK_RE.captures_iter(line) {
        let Some(whole) = cap.get(0) else { continue };
        // `[^N]:` opens a definition, it never references one
        if line[whole.end()..].starts_with(':') {
            continue;
        }
        let Ok(label) = cap[1].parse::<u32>() else {
            continue;
        };
        marks.push(Mark {
            label,
            span: (line_start + whole.start(), line_start + whole.end()),
        });
    }
}

/// Extracts inline citation labels in order of first appearance.
///
/// Marks inside definition bodies are not counted.
///
/// # Examples
///
/// ```
/// use cite_lifecycle::extract_marks;
///
/// assert_eq!(extract_marks("A [^2] B [^1] C [^2]"), vec![2, 1]);
/// ```
pub fn extract_marks(text: &str) -> Vec<u32> {
    scan(text).inline_labels()
}

/// Extracts definitions as a map of label to body text. The first definition
/// of a label wins.
pub fn extract_definitions(text: &str) -> HashMap<u32, String> {
    scan(text).definition_map()
}

/// A machine date field from a definition body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateField {
    Date(NaiveDate),
    NotApplicable,
    Unparseable(String),
}

impl DateField {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            DateField::Date(d) => Some(*d),
            _ => None,
        }
    }
}

/// A parsed citation definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationDefinition {
    pub label: u32,
    pub body: String,
    /// Source URL from a markdown link, or from a legacy `URL:` field
    pub url: Option<String>,
    /// Leading `YYYY, Mon DD` date
    pub displayed_date: Option<NaiveDate>,
    pub published: Option<DateField>,
    pub updated: Option<DateField>,
}

impl CitationDefinition {
    /// Parses the fields of a definition body.
    ///
    /// The preferred format is
    /// `YYYY, Mon DD. [Title](URL). Publisher. Published: YYYY-MM-DD | Updated: YYYY-MM-DD`,
    /// where `Updated` may be `N/A`. Bodies without a markdown link may carry
    /// the URL in a trailing `URL: <url>` field instead.
    pub fn parse(label: u32, body: &str) -> Self {
        CitationDefinition {
            label,
            body: body.to_string(),
            url: extract_url(body),
            displayed_date: parse_displayed_date(body),
            published: parse_date_field(&PUBLISHED_RE, body),
            updated: parse_date_field(&UPDATED_RE, body),
        }
    }
}

impl From<&DefinitionBlock> for CitationDefinition {
    fn from(block: &DefinitionBlock) -> Self {
        CitationDefinition::parse(block.label, &block.body)
    }
}

fn extract_url(body: &str) -> Option<String> {
    if let Some(url) = first_link_url(body) {
        return Some(url.to_string());
    }
    LEGACY_URL_RE
        .captures_iter(body)
        .last()
        .map(|cap| cap[1].trim_end_matches(['.', ',', ';', ')']).to_string())
}

/// Finds the destination of the first inline link `[title](http...)`.
///
/// Titles may nest brackets (`[Q3 Report [PDF]]`) and destinations may hold
/// balanced parentheses (`https://en.wikipedia.org/wiki/Mercury_(planet)`).
fn first_link_url(body: &str) -> Option<&str> {
    let bytes = body.as_bytes();
    for (open, _) in body.match_indices('[') {
        let Some(close) = matching_bracket(bytes, open) else {
            continue;
        };
        if bytes.get(close + 1) != Some(&b'(') {
            continue;
        }
        if let Some(url) = link_destination(&body[close + 2..]) {
            return Some(url);
        }
    }
    None
}

/// Index of the `]` closing the `[` at `open`, counting nested pairs.
fn matching_bracket(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// The http(s) destination at the start of `rest`, which follows a link's
/// `(`. Ends at the unbalanced `)` or at whitespace before a link title.
fn link_destination(rest: &str) -> Option<&str> {
    let mut depth = 0usize;
    for (i, c) in rest.char_indices() {
        let end = match c {
            '(' => {
                depth += 1;
                continue;
            }
            ')' if depth > 0 => {
                depth -= 1;
                continue;
            }
            ')' => i,
            c if c.is_whitespace() && rest[i..].contains(')') => i,
            c if c.is_whitespace() => return None,
            _ => continue,
        };
        let url = &rest[..end];
        let scheme = ["https://", "http://"]
            .iter()
            .find(|scheme| url.starts_with(**scheme))?;
        return (url.len() > scheme.len()).then_some(url);
    }
    None
}

fn parse_displayed_date(body: &str) -> Option<NaiveDate> {
    let cap = DISPLAY_DATE_RE.captures(body.trim_start())?;
    let text = format!("{} {} {}", &cap[1], &cap[2], &cap[3]);
    NaiveDate::parse_from_str(&text, "%Y %b %d").ok()
}

fn parse_date_field(re: &Regex, body: &str) -> Option<DateField> {
    let cap = re.captures(body)?;
    let raw = cap[1].trim().trim_end_matches('.').trim();
    if raw.eq_ignore_ascii_case("n/a") {
        return Some(DateField::NotApplicable);
    }
    Some(match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => DateField::Date(date),
        Err(_) => DateField::Unparseable(raw.to_string()),
    })
}
