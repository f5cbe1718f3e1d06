use crate::domain::items::Item;
use crate::error::CoreError;

pub const DEFAULT_THRESHOLD: f64 = 0.4;

pub const DEFAULT_TERMS: &[&str] = &[
    "politics",
    "political",
    "election",
    "elections",
    "vote",
    "voting",
    "government",
    "president",
    "senate",
    "congress",
    "democrat",
    "democrats",
    "republican",
    "republicans",
    "liberal",
    "conservative",
];

pub const DEFAULT_DEFLECTION: &str =
    "I'd rather stay out of politics here, but thanks for sharing. Hope the rest of your day goes well!";

/// Steers generation away from items dominated by restricted terms.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    terms: Vec<String>,
    threshold: f64,
    deflection: String,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self {
            terms: DEFAULT_TERMS.iter().map(|term| term.to_string()).collect(),
            threshold: DEFAULT_THRESHOLD,
            deflection: DEFAULT_DEFLECTION.to_string(),
        }
    }
}

impl ContentFilter {
    pub fn new<I, S>(terms: I, threshold: f64) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CoreError::InvalidThreshold(threshold));
        }
        let terms = terms
            .into_iter()
            .map(|term| term.as_ref().trim().to_lowercase())
            .filter(|term| !term.is_empty())
            .collect();
        Ok(Self {
            terms,
            threshold,
            deflection: DEFAULT_DEFLECTION.to_string(),
        })
    }

    pub fn should_short_circuit(&self, item: &Item) -> Option<String> {
        self.check_text(&format!("{} {}", item.title, item.body))
    }

    /// Returns the deflection when restricted terms make up strictly more
    /// than `threshold` of the words in `text`.
    pub fn check_text(&self, text: &str) -> Option<String> {
        let (matches, words) = self.term_ratio(text);
        if words == 0 || matches == 0 {
            return None;
        }
        let ratio = matches as f64 / words as f64;
        (ratio > self.threshold).then(|| self.deflection.clone())
    }

    fn term_ratio(&self, text: &str) -> (usize, usize) {
        let mut matches = 0;
        let mut words = 0;
        for word in text.split_whitespace().filter_map(normalize_word) {
            words += 1;
            if self.terms.iter().any(|term| *term == word) {
                matches += 1;
            }
        }
        (matches, words)
    }
}

fn normalize_word(raw: &str) -> Option<String> {
    let trimmed = raw.trim_matches(|ch: char| !ch.is_alphanumeric());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}
