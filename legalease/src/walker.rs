//! Depth-bounded text extraction over a host UI element tree

use crate::element::UIElement;
use crate::keywords::KeywordMatcher;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::time::Instant;
use tracing::{debug, instrument, warn};

pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Hard ceiling on `max_depth`; the walk recurses once per level
pub const MAX_DEPTH_CEILING: usize = 256;

/// Configuration for tree walking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkConfig {
    /// Nodes at this depth or deeper (root is depth 0) are skipped
    pub max_depth: usize,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Text contributed by a single node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextFragment {
    pub text: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub matched_keywords: BTreeSet<String>,
}

/// Counters collected during one walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    pub elements_visited: usize,
    pub max_depth_reached: usize,
    /// Subtrees skipped because they sat at or beyond `max_depth`
    pub truncated: usize,
    /// Elements skipped because their id was already visited in this walk
    pub revisits_skipped: usize,
    /// Children collections the host failed to produce
    pub errors: usize,
}

/// Output of one traversal, fixed once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub full_text: String,
    pub fragments: Vec<TextFragment>,
    pub matched_keywords: BTreeSet<String>,
    pub source_label: String,
    /// Title of the focused window, kept apart from the app label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    #[serde(skip)]
    pub timestamp: Instant,
    /// Wall-clock capture time in epoch milliseconds
    pub captured_at: i64,
}

impl ScanResult {
    /// Assemble a result from walked fragments, annotating each fragment and
    /// the whole text with keyword matches.
    pub fn build(
        fragments: Vec<TextFragment>,
        matcher: &KeywordMatcher,
        source_label: impl Into<String>,
        timestamp: Instant,
    ) -> Self {
        let fragments: Vec<TextFragment> = fragments
            .into_iter()
            .map(|mut fragment| {
                fragment.matched_keywords = matcher.find(&fragment.text).matched;
                fragment
            })
            .collect();

        let full_text = fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        // Phrases can straddle fragment boundaries, so match the joined text.
        let matched_keywords = matcher.find(&full_text).matched;

        Self {
            full_text,
            fragments,
            matched_keywords,
            source_label: source_label.into(),
            window_title: None,
            timestamp,
            captured_at: crate::utils::epoch_millis(),
        }
    }

    /// A result built from a single plain string (clipboard, selection)
    pub fn from_text(
        text: &str,
        matcher: &KeywordMatcher,
        source_label: impl Into<String>,
        timestamp: Instant,
    ) -> Self {
        let fragments = if text.is_empty() {
            Vec::new()
        } else {
            vec![TextFragment {
                text: text.to_string(),
                role: "text".to_string(),
                title: None,
                matched_keywords: BTreeSet::new(),
            }]
        };
        Self::build(fragments, matcher, source_label, timestamp)
    }

    pub fn with_window_title(mut self, title: Option<String>) -> Self {
        self.window_title = title.filter(|t| !t.is_empty());
        self
    }

    pub fn has_match(&self) -> bool {
        !self.matched_keywords.is_empty()
    }
}

struct WalkContext {
    max_depth: usize,
    fragments: Vec<TextFragment>,
    visited_ids: HashSet<String>,
    stats: WalkStats,
}

/// Pre-order, depth-bounded text extractor.
///
/// The walker never retains an element past its visit: each child handle is
/// moved into the recursive call and dropped when that call returns, so
/// refcounted hosts see their handles released one subtree at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextTreeWalker {
    config: WalkConfig,
}

impl TextTreeWalker {
    pub fn new(mut config: WalkConfig) -> Self {
        if config.max_depth > MAX_DEPTH_CEILING {
            warn!(
                requested = config.max_depth,
                ceiling = MAX_DEPTH_CEILING,
                "Clamping walk depth"
            );
            config.max_depth = MAX_DEPTH_CEILING;
        }
        Self { config }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self::new(WalkConfig { max_depth })
    }

    pub fn config(&self) -> WalkConfig {
        self.config
    }

    /// Walk `root` and return per-node fragments in pre-order.
    #[instrument(level = "debug", skip(self, root))]
    pub fn walk(&self, root: UIElement) -> (Vec<TextFragment>, WalkStats) {
        let mut context = WalkContext {
            max_depth: self.config.max_depth,
            fragments: Vec::new(),
            visited_ids: HashSet::new(),
            stats: WalkStats::default(),
        };

        visit(root, 0, &mut context);

        debug!(
            elements = context.stats.elements_visited,
            fragments = context.fragments.len(),
            max_depth_reached = context.stats.max_depth_reached,
            truncated = context.stats.truncated,
            errors = context.stats.errors,
            "tree walk finished"
        );

        (context.fragments, context.stats)
    }

    /// Walk `root` and assemble a `ScanResult`.
    pub fn scan(
        &self,
        root: UIElement,
        matcher: &KeywordMatcher,
        source_label: impl Into<String>,
    ) -> ScanResult {
        let (fragments, _) = self.walk(root);
        ScanResult::build(fragments, matcher, source_label, Instant::now())
    }
}

fn visit(element: UIElement, depth: usize, context: &mut WalkContext) {
    if depth >= context.max_depth {
        context.stats.truncated += 1;
        return;
    }

    if let Some(id) = element.id() {
        if !context.visited_ids.insert(id) {
            context.stats.revisits_skipped += 1;
            return;
        }
    }

    context.stats.elements_visited += 1;
    context.stats.max_depth_reached = context.stats.max_depth_reached.max(depth);

    let attributes = element.attributes();
    let text = attributes.text_content();
    if !text.is_empty() {
        context.fragments.push(TextFragment {
            text,
            role: if attributes.role.is_empty() {
                "unknown".to_string()
            } else {
                attributes.role
            },
            title: attributes.title.filter(|t| !t.is_empty()),
            matched_keywords: BTreeSet::new(),
        });
    }

    match element.children() {
        Ok(children) => {
            for child in children {
                visit(child, depth + 1, context);
            }
        }
        Err(e) => {
            debug!("Failed to get children: {}. Continuing with siblings.", e);
            context.stats.errors += 1;
        }
    }

    match element.visible_children() {
        Ok(children) => {
            for child in children {
                visit(child, depth + 1, context);
            }
        }
        Err(e) => {
            debug!("Failed to get visible children: {}. Continuing.", e);
            context.stats.errors += 1;
        }
    }
}
