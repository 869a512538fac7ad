//! Text rewriting and final document output.
//!
//! This module applies span-based edits to section text and renders the
//! trailing citations block of a consolidated document.

/// Divider line that opens the trailing citations block.
pub const DIVIDER: &str = "---";

/// Heading of the trailing citations block.
pub const CITATIONS_HEADING: &str = "### Citations";

/// A single edit: replace the bytes in `span` with `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    /// Start and end byte positions in the original text
    pub span: (usize, usize),
    /// The replacement text (empty to delete)
    pub text: String,
}

impl Replacement {
    pub fn new(span: (usize, usize), text: impl Into<String>) -> Self {
        Replacement {
            span,
            text: text.into(),
        }
    }

    pub fn delete(span: (usize, usize)) -> Self {
        Replacement::new(span, String::new())
    }
}

/// Applies non-overlapping replacements to `text`.
///
/// # Implementation Note
///
/// Every replacement is computed against the original text, and they are
/// applied from the end of the text towards the beginning so earlier spans
/// stay valid. No replacement ever sees the output of another, so relabelling
/// `[^1]` to `[^2]` and `[^2]` to `[^1]` in one call cannot alias.
pub fn apply_replacements(text: &str, replacements: &[Replacement]) -> String {
    if replacements.is_empty() {
        return text.to_string();
    }

    let mut sorted: Vec<&Replacement> = replacements.iter().collect();
    sorted.sort_by(|a, b| b.span.0.cmp(&a.span.0));

    let mut result = text.to_string();
    for replacement in sorted {
        let (start, end) = replacement.span;
        result.replace_range(start..end, &replacement.text);
    }

    result
}

/// Formats an inline mark for `label`.
pub fn mark(label: u32) -> String {
    format!("[^{}]", label)
}

/// Collapses runs of blank lines into one and trims blank lines at both ends.
///
/// Whitespace-only lines count as blank and are emitted empty.
pub fn normalize_blank_lines(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        let blank = line.trim().is_empty();
        if blank && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(if blank { "" } else { line });
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Removes a trailing `---` / `### Citations` block left by an earlier
/// consolidation. Definition lines must already be gone.
pub fn strip_citations_block(text: &str) -> &str {
    let trimmed = text.trim_end();
    let Some(rest) = strip_last_line(trimmed, CITATIONS_HEADING) else {
        return text;
    };
    let rest = rest.trim_end();
    strip_last_line(rest, DIVIDER).unwrap_or(rest).trim_end()
}

fn strip_last_line<'a>(text: &'a str, expected: &str) -> Option<&'a str> {
    let start = text.rfind('\n').map_or(0, |i| i + 1);
    (text[start..].trim() == expected).then(|| &text[..start])
}

/// Renders the trailing citations block for `(global label, definition)` pairs.
///
/// Returns an empty string when there is nothing to list.
pub fn render_citations_block(entries: &[(u32, &str)]) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let mut block = format!("{}\n\n{}\n\n", DIVIDER, CITATIONS_HEADING);
    for (label, definition) in entries {
        block.push_str(&format!("{}: {}\n", mark(*label), definition));
    }
    block
}

/// Generates the final document from section bodies and the citations block.
pub fn generate_output(bodies: &[String], citations_block: &str) -> String {
    let mut output = bodies
        .iter()
        .filter(|b| !b.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n\n");

    if !citations_block.is_empty() {
        if !output.is_empty() {
            output.push_str("\n\n");
        }
        output.push_str(citations_block);
    } else if !output.is_empty() {
        output.push('\n');
    }

    output
}
