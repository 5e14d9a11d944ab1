//! Decision reference extraction from PR and commit text.

use std::sync::LazyLock;

use regex::Regex;

use crate::Reference;

/// `decern:<id>`, case-insensitive prefix.
static PREFIXED: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i:\bdecern:)\s*([A-Za-z0-9][A-Za-z0-9_-]*)"));
/// `DECERN-<id>` ticket style.
static TICKET: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"\bDECERN-([A-Za-z0-9][A-Za-z0-9_-]*)"));
/// `.../decisions/<id>` links.
static DECISION_URL: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"/decisions/([A-Za-z0-9][A-Za-z0-9_-]*)"));
/// `ADR-<digits>`.
static ADR: LazyLock<Regex> = LazyLock::new(|| pattern(r"\b(?i:adr)-[0-9]+\b"));

#[allow(clippy::expect_used)]
fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("reference patterns are valid")
}

/// Every reference in `text`, deduplicated in first-seen order.
///
/// The families are scanned in turn (prefixed, ticket, URL, ADR) and their
/// matches concatenated before deduplication.
#[must_use]
pub fn extract_references(text: &str) -> Vec<Reference> {
    let captured = [&*PREFIXED, &*TICKET, &*DECISION_URL]
        .into_iter()
        .flat_map(|family| {
            family
                .captures_iter(text)
                .filter_map(|captures| captures.get(1))
                .map(|id| id.as_str())
        });
    let adr_codes = ADR.find_iter(text).map(|code| code.as_str());

    let mut references: Vec<Reference> = Vec::new();
    for raw in captured.chain(adr_codes) {
        let reference = Reference::classify(raw);
        if !references.contains(&reference) {
            references.push(reference);
        }
    }
    references
}

/// Identifiers only, in the same order as [`extract_references`].
#[must_use]
pub fn extract_decision_ids(text: &str) -> Vec<String> {
    extract_references(text)
        .into_iter()
        .map(|reference| reference.as_str().to_owned())
        .collect()
}
