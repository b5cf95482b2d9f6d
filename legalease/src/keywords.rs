//! Keyword corpus and case-insensitive multi-phrase matching

use crate::errors::LegalEaseError;
use aho_corasick::{AhoCorasick, MatchKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which family of legal document a phrase points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordCategory {
    TermsOfUse,
    Privacy,
}

const TERMS_OF_USE_PHRASES: &[&str] = &[
    "terms and conditions",
    "terms of service",
    "terms of use",
    "user agreement",
    "end user license agreement",
    "eula",
    "terms & conditions",
    "terms & service",
    "legal terms",
    "service agreement",
    "subscription agreement",
    "member agreement",
    "membership agreement",
    "account agreement",
    "platform agreement",
    "license agreement",
    "agreement to terms",
    "legal notice",
];

const PRIVACY_PHRASES: &[&str] = &[
    "privacy policy",
    "privacy notice",
    "privacy statement",
    "data protection",
    "data collection",
    "personal data",
    "personal information",
    "information we collect",
    "how we use your information",
    "privacy practices",
    "cookie policy",
    "privacy & cookies",
    "privacy and cookies",
    "data privacy",
    "data sharing",
];

/// Immutable set of lower-cased phrases, each tagged with a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordCorpus {
    phrases: BTreeMap<String, KeywordCategory>,
}

impl Default for KeywordCorpus {
    fn default() -> Self {
        let mut phrases = BTreeMap::new();
        for phrase in TERMS_OF_USE_PHRASES {
            phrases.insert(phrase.to_string(), KeywordCategory::TermsOfUse);
        }
        for phrase in PRIVACY_PHRASES {
            phrases
                .entry(phrase.to_string())
                .or_insert(KeywordCategory::Privacy);
        }
        Self { phrases }
    }
}

impl KeywordCorpus {
    /// Build a corpus of uncategorised phrases (filed under terms-of-use)
    pub fn new<I, S>(phrases: I) -> Result<Self, LegalEaseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::empty().with_category(KeywordCategory::TermsOfUse, phrases)
    }

    pub fn empty() -> Self {
        Self {
            phrases: BTreeMap::new(),
        }
    }

    /// Add phrases under a category. First category a phrase was added
    /// under wins.
    pub fn with_category<I, S>(
        mut self,
        category: KeywordCategory,
        phrases: I,
    ) -> Result<Self, LegalEaseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for phrase in phrases {
            let normalized = phrase.as_ref().trim().to_lowercase();
            if normalized.is_empty() {
                return Err(LegalEaseError::InvalidEvent(
                    "keyword phrases must not be empty".to_string(),
                ));
            }
            self.phrases.entry(normalized).or_insert(category);
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn contains(&self, phrase: &str) -> bool {
        self.phrases.contains_key(&phrase.to_lowercase())
    }

    pub fn category_of(&self, phrase: &str) -> Option<KeywordCategory> {
        self.phrases.get(&phrase.to_lowercase()).copied()
    }

    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.phrases.keys().map(String::as_str)
    }
}

/// Result of matching one string against the corpus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    pub has_match: bool,
    pub matched: BTreeSet<String>,
    pub categories: BTreeSet<KeywordCategory>,
}

/// Multi-pattern matcher over a `KeywordCorpus`.
///
/// Observable results equal naive per-phrase containment against the
/// lower-cased input.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    corpus: KeywordCorpus,
    patterns: Vec<String>,
    automaton: Option<AhoCorasick>,
}

impl KeywordMatcher {
    pub fn new(corpus: KeywordCorpus) -> Result<Self, LegalEaseError> {
        let patterns: Vec<String> = corpus.phrases().map(str::to_string).collect();
        let automaton = if patterns.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .match_kind(MatchKind::Standard)
                    .build(patterns.iter().map(String::as_str))
                    .map_err(|e| {
                        LegalEaseError::Internal(format!("failed to build keyword matcher: {e}"))
                    })?,
            )
        };
        Ok(Self {
            corpus,
            patterns,
            automaton,
        })
    }

    pub fn corpus(&self) -> &KeywordCorpus {
        &self.corpus
    }

    /// Match `text` case-insensitively, returning every contained phrase.
    pub fn find(&self, text: &str) -> MatchOutcome {
        let Some(automaton) = self.automaton.as_ref() else {
            return MatchOutcome::default();
        };

        let lowered = text.to_lowercase();
        let mut matched = BTreeSet::new();
        let mut categories = BTreeSet::new();
        for m in automaton.find_overlapping_iter(&lowered) {
            let phrase = &self.patterns[m.pattern().as_usize()];
            if matched.insert(phrase.clone()) {
                if let Some(category) = self.corpus.category_of(phrase) {
                    categories.insert(category);
                }
            }
        }

        MatchOutcome {
            has_match: !matched.is_empty(),
            matched,
            categories,
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.find(text).has_match
    }
}
