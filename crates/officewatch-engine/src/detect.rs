//! Invoice-text detection.
//!
//! Scans extracted document text for known SaaS product names and emits
//! [`CandidateFact`]s for the merge resolver. Detection is a pure
//! function of the input text: no side effects until a candidate is
//! merged, and identical text always yields the identical candidate set.

use std::collections::BTreeSet;

use aho_corasick::AhoCorasick;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// An unconfirmed subscription record produced by detection, pending
/// dedup/merge against the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFact {
    /// Canonical product name (table casing, not the document's).
    pub name: String,
    /// Best-effort cost estimate. 0.0 when no currency token was found.
    pub cost: f64,
    /// Category from the keyword table.
    pub category: String,
}

/// Keyword-to-category table standing in for real invoice NLP.
const KEYWORDS: &[(&str, &str)] = &[
    ("Zoom", "Communication"),
    ("Slack", "Communication"),
    ("Salesforce", "CRM"),
    ("GitHub", "DevTools"),
    ("Adobe", "Design"),
    ("AWS", "Cloud"),
    ("DigitalOcean", "Cloud"),
    ("Figma", "Design"),
    ("Notion", "Productivity"),
];

/// Currency tokens of the form `$12.99` / `$ 12.99`.
const PRICE_PATTERN: &str = r"\$\s?(\d+\.\d{2})";

/// Scans invoice text for known product names and currency tokens.
///
/// Cost resolution is deliberately coarse: every candidate gets the
/// **maximum** currency value found anywhere in the document, not a value
/// scoped to the keyword's vicinity. This is a known heuristic limitation
/// of the keyword matcher, kept as-is rather than silently "improved".
pub struct InvoiceDetector {
    keywords: AhoCorasick,
    price_re: Regex,
}

impl InvoiceDetector {
    /// Build the detector's keyword automaton and price pattern.
    pub fn new() -> EngineResult<Self> {
        let keywords = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(KEYWORDS.iter().map(|(name, _)| *name))
            .map_err(|e| EngineError::Pattern(e.to_string()))?;
        let price_re =
            Regex::new(PRICE_PATTERN).map_err(|e| EngineError::Pattern(e.to_string()))?;
        Ok(Self { keywords, price_re })
    }

    /// Detect known products in `text`.
    ///
    /// A name matches as a case-insensitive substring anywhere in the
    /// document. Zero candidates is a valid, non-error outcome.
    pub fn detect(&self, text: &str) -> Vec<CandidateFact> {
        let mut matched: BTreeSet<usize> = BTreeSet::new();
        for m in self.keywords.find_iter(text) {
            matched.insert(m.pattern().as_usize());
        }

        if matched.is_empty() {
            debug!("no known apps detected");
            return Vec::new();
        }

        let cost = self.max_price(text);

        matched
            .into_iter()
            .map(|idx| {
                let (name, category) = KEYWORDS[idx];
                CandidateFact {
                    name: name.to_string(),
                    cost,
                    category: category.to_string(),
                }
            })
            .collect()
    }

    /// The highest currency token in the document, or 0.0 when none match.
    fn max_price(&self, text: &str) -> f64 {
        self.price_re
            .captures_iter(text)
            .filter_map(|cap| cap.get(1))
            .filter_map(|m| m.as_str().parse::<f64>().ok())
            .fold(0.0, f64::max)
    }
}

// ── tests ────────────────────────────────────────────────────────────
