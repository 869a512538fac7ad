//! Sections, documents and directory loading.
//!
//! A document is an optional header followed by sections in canonical order.
//! The canonical order is computed by an explicit ordering function over
//! section ids; by default a numeric filename prefix (`03_market.md`) decides.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Id given to the header pseudo-section.
pub const HEADER_ID: &str = "header";

/// Errors that can occur when loading a document.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read directory '{}': {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read header '{}': {message}", .path.display())]
    Header { path: PathBuf, message: String },

    #[error("No Markdown sections found in '{}'", .0.display())]
    Empty(PathBuf),
}

/// One independently-authored block of Markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Stable identifier, the file stem for sections loaded from disk
    pub id: String,
    /// The raw Markdown text
    pub text: String,
    /// Where the section was loaded from, if anywhere
    pub path: Option<PathBuf>,
}

impl Section {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Section {
            id: id.into(),
            text: text.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Sort key derived from a section id: numbered ids first by number, then
/// everything else by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalKey {
    prefix: Option<u64>,
    name: String,
}

impl Ord for CanonicalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.prefix, other.prefix) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for CanonicalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The default canonical ordering key: the leading digits of the id.
///
/// # Examples
///
/// ```
/// use cite_lifecycle::document::canonical_key;
///
/// assert!(canonical_key("2_market") < canonical_key("10_outlook"));
/// assert!(canonical_key("10_outlook") < canonical_key("appendix"));
/// ```
pub fn canonical_key(id: &str) -> CanonicalKey {
    let digits: String = id.chars().take_while(|c| c.is_ascii_digit()).collect();
    CanonicalKey {
        prefix: digits.parse().ok(),
        name: id.to_string(),
    }
}

/// Compares two section ids in canonical order.
pub fn canonical_order(a: &str, b: &str) -> Ordering {
    canonical_key(a).cmp(&canonical_key(b))
}

/// A header plus canonically ordered sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub header: Option<Section>,
    pub sections: Vec<Section>,
}

impl Document {
    /// Builds a document, ordering sections with the default canonical order.
    pub fn new(header: Option<Section>, sections: Vec<Section>) -> Self {
        Document::ordered(header, sections, canonical_order)
    }

    /// Builds a document, ordering sections by ids with `order`.
    ///
    /// The sort is stable, so sections that compare equal keep the order
    /// they were given in.
    pub fn ordered<F>(header: Option<Section>, mut sections: Vec<Section>, order: F) -> Self
    where
        F: Fn(&str, &str) -> Ordering,
    {
        sections.sort_by(|a, b| order(&a.id, &b.id));
        Document { header, sections }
    }

    /// A document made of one section, as when re-reading a consolidated file.
    pub fn single(text: impl Into<String>) -> Self {
        Document {
            header: None,
            sections: vec![Section::new("document", text)],
        }
    }

    /// All sections in canonical order, header first.
    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.header.iter().chain(self.sections.iter())
    }

    /// Mutable access in canonical order, header first.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Section> {
        self.header.iter_mut().chain(self.sections.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.sections.len() + usize::from(self.header.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A section that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSection {
    pub path: PathBuf,
    pub reason: String,
}

/// The result of loading a directory: the document plus the sections skipped.
#[derive(Debug, Clone, Default)]
pub struct LoadedDocument {
    pub document: Document,
    pub skipped: Vec<SkippedSection>,
}

/// Loads every `.md` file in `dir` as a section, with an optional header file.
///
/// A section that cannot be read or is not valid UTF-8 is skipped and
/// recorded; the remaining sections still load. A header that cannot be
/// read is an error.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed, the header cannot be
/// read, or no section could be loaded at all.
pub fn load_sections(dir: &Path, header: Option<&Path>) -> Result<LoadedDocument, LoadError> {
    let entries = fs::read_dir(dir).map_err(|source| LoadError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;

    let header_path = header.and_then(|h| fs::canonicalize(h).ok());
    let mut sections = Vec::new();
    let mut skipped = Vec::new();

    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                warn!("skipping unreadable directory entry: {}", e);
                continue;
            }
        };
        if !path.is_file() || path.extension().map_or(true, |e| e != "md") {
            continue;
        }
        if header_path.is_some() && fs::canonicalize(&path).ok() == header_path {
            continue;
        }

        match read_section(&path) {
            Ok(section) if header.is_some() && section.id == HEADER_ID => {
                let reason = format!("section id '{}' is reserved for the header", HEADER_ID);
                warn!(path = %path.display(), %reason, "skipping section");
                skipped.push(SkippedSection { path, reason });
            }
            Ok(section) => {
                debug!(section = %section.id, bytes = section.text.len(), "loaded section");
                sections.push(section);
            }
            Err(reason) => {
                warn!(path = %path.display(), %reason, "skipping section");
                skipped.push(SkippedSection { path, reason });
            }
        }
    }

    let header = match header {
        Some(path) => {
            let section = read_section(path).map_err(|message| LoadError::Header {
                path: path.to_path_buf(),
                message,
            })?;
            Some(Section {
                id: HEADER_ID.to_string(),
                ..section
            })
        }
        None => None,
    };

    if sections.is_empty() && header.is_none() {
        return Err(LoadError::Empty(dir.to_path_buf()));
    }

    Ok(LoadedDocument {
        document: Document::new(header, sections),
        skipped,
    })
}

fn read_section(path: &Path) -> Result<Section, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let text = String::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {}", e))?;
    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(Section::new(id, text).with_path(path))
}

/// Writes every section that was loaded from disk back to its file.
pub fn write_sections(document: &Document) -> std::io::Result<usize> {
    let mut written = 0;
    for section in document.iter() {
        if let Some(path) = &section.path {
            fs::write(path, &section.text)?;
            written += 1;
        }
    }
    Ok(written)
}
