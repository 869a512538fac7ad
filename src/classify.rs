//! URL reachability classification.
//!
//! A URL is first checked against signatures of fabricated links (reserved
//! example domains, placeholder tokens, unresolved templates, stub paths).
//! A match is `Invalid` without touching the network. Anything else is
//! probed over HTTP and the response status decides the verdict.
//!
//! Probe failures are never errors: timeouts, refused connections and
//! DNS failures all resolve to `Uncertain` with the failure as the reason.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;

/// Tri-state reachability verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Valid,
    /// Could not be confirmed either way; kept and flagged, never removed
    Uncertain,
    Invalid,
}

/// The classification of one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    pub status: VerdictStatus,
    pub reason: String,
    /// Final URL after redirects, when a response was received
    pub resolved_url: Option<String>,
    pub http_status: Option<u16>,
    /// Name of the fabricated-link signature that matched, if any
    pub pattern: Option<&'static str>,
}

impl ValidationVerdict {
    fn from_pattern(name: &'static str) -> Self {
        ValidationVerdict {
            status: VerdictStatus::Invalid,
            reason: format!("matches fabricated-link pattern ({})", name),
            resolved_url: None,
            http_status: None,
            pattern: Some(name),
        }
    }

    fn from_outcome(outcome: ProbeOutcome) -> Self {
        match outcome {
            ProbeOutcome::Response { status, final_url } => {
                let verdict = status_verdict(status);
                let reason = match verdict {
                    VerdictStatus::Valid => format!("HTTP {}", status),
                    VerdictStatus::Invalid => format!("HTTP {}: page does not exist", status),
                    VerdictStatus::Uncertain => {
                        format!("HTTP {}: could not confirm the page", status)
                    }
                };
                ValidationVerdict {
                    status: verdict,
                    reason,
                    resolved_url: Some(final_url),
                    http_status: Some(status),
                    pattern: None,
                }
            }
            ProbeOutcome::Failed(message) => ValidationVerdict {
                status: VerdictStatus::Uncertain,
                reason: format!("request failed: {}", message),
                resolved_url: None,
                http_status: None,
                pattern: None,
            },
        }
    }
}

/// Maps an HTTP status to a verdict.
///
/// Only 404 and 410 prove a page is gone. Auth walls, rate limits, server
/// errors and anything unexpected are `Uncertain`.
pub fn status_verdict(status: u16) -> VerdictStatus {
    match status {
        200..=399 => VerdictStatus::Valid,
        404 | 410 => VerdictStatus::Invalid,
        _ => VerdictStatus::Uncertain,
    }
}

/// What a single network probe observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Response { status: u16, final_url: String },
    Failed(String),
}

/// Issues the network request for a URL.
pub trait Probe: Send + Sync {
    fn probe(&self, url: &str) -> ProbeOutcome;
}

/// Probes URLs over HTTP with a bounded timeout.
///
/// Sends `HEAD` first and falls back to `GET` for servers that reject it.
pub struct HttpProbe {
    agent: ureq::Agent,
}

impl HttpProbe {
    pub fn new(config: &EngineConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.probe_timeout())
            .user_agent(&config.user_agent)
            .redirects(5)
            .build();
        HttpProbe { agent }
    }

    fn request(&self, method: &str, url: &str) -> ProbeOutcome {
        let result = self
            .agent
            .request(method, url)
            .set("Accept", "text/html,application/xhtml+xml,*/*;q=0.8")
            .call();
        match result {
            Ok(resp) => ProbeOutcome::Response {
                status: resp.status(),
                final_url: resp.get_url().to_string(),
            },
            Err(ureq::Error::Status(status, resp)) => ProbeOutcome::Response {
                status,
                final_url: resp.get_url().to_string(),
            },
            Err(ureq::Error::Transport(transport)) => ProbeOutcome::Failed(transport.to_string()),
        }
    }
}

impl Probe for HttpProbe {
    fn probe(&self, url: &str) -> ProbeOutcome {
        match self.request("HEAD", url) {
            ProbeOutcome::Response {
                status: 405 | 501, ..
            } => self.request("GET", url),
            outcome => outcome,
        }
    }
}

/// A probe that never touches the network; every URL is `Uncertain`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineProbe;

impl Probe for OfflineProbe {
    fn probe(&self, _url: &str) -> ProbeOutcome {
        ProbeOutcome::Failed("network probing disabled".to_string())
    }
}

static HALLUCINATION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        (
            "reserved example domain",
            r"(?i)^https?://([a-z0-9-]+\.)*example\.(com|org|net)(:\d+)?([/?#]|$)",
        ),
        (
            "reserved top-level domain",
            r"(?i)^https?://([^/?#]*\.)?(example|test|invalid|localhost)(:\d+)?([/?#]|$)",
        ),
        (
            "placeholder token",
            r"(?i)(placeholder|your[-_](domain|site|url|link|website|article|company)|lorem[-_]?ipsum|url[-_]here|insert[-_]|(^|[/.=_-])x{3,}([/.?#=_-]|$))",
        ),
        ("unresolved template", r"(?i)[{}<>]|%7b|%7d|%3c|%3e"),
        (
            "generic path stub",
            r"(?i)/(path/to|sample-article|article-url|some-article|article-slug|link-here|page-url)([/?#.]|$)",
        ),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("hallucination pattern regex")))
    .collect()
});

/// Returns the name of the first fabricated-link signature `url` matches.
///
/// # Examples
///
/// ```
/// use cite_lifecycle::classify::hallucination_pattern;
///
/// assert_eq!(hallucination_pattern("https://example.com/fake"), Some("reserved example domain"));
/// assert_eq!(hallucination_pattern("https://techcrunch.com/article"), None);
/// ```
pub fn hallucination_pattern(url: &str) -> Option<&'static str> {
    HALLUCINATION_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(url))
        .map(|(name, _)| *name)
}

/// Classifies URLs. Holds no state besides its probe, so one instance can be
/// shared by any number of threads.
pub struct Classifier<P> {
    probe: P,
}

impl<P: Probe> Classifier<P> {
    pub fn new(probe: P) -> Self {
        Classifier { probe }
    }

    pub fn classify(&self, url: &str) -> ValidationVerdict {
        if let Some(name) = hallucination_pattern(url) {
            debug!(url, pattern = name, "fabricated link, not probing");
            return ValidationVerdict::from_pattern(name);
        }
        let verdict = ValidationVerdict::from_outcome(self.probe.probe(url));
        debug!(url, status = ?verdict.status, reason = %verdict.reason, "probed");
        verdict
    }
}

impl Classifier<HttpProbe> {
    /// A classifier that probes over HTTP using `config`'s timeout and agent.
    pub fn http(config: &EngineConfig) -> Self {
        Classifier::new(HttpProbe::new(config))
    }
}
