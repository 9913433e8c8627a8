//! Tokenizing and highlighting.
//!
//! Scoring and highlighting have to agree on what a term is, so both use
//! [`tokenize`]: maximal runs of alphanumeric characters, lowercased.
//!
//! Highlighting finds every query term in the text with one Aho-Corasick
//! automaton (whole words only), cuts fragments of
//! roughly `fragment_size` bytes around the matches and wraps each match
//! in the configured tags. Fragments with more distinct terms come first.
//!
//! Non-ASCII text is searched in a lowercased copy that maps every byte
//! back to the character it came from, so highlighting folds case exactly
//! like [`tokenize`].

use crate::query::HighlightSpec;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use std::collections::HashSet;

/// Split text into lowercase terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Highlights the occurrences of a fixed set of terms.
#[derive(Debug, Clone)]
pub struct Highlighter {
    matcher: AhoCorasick,
    spec: HighlightSpec,
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    start: usize,
    end: usize,
    term: usize,
}

impl Highlighter {
    /// Build a highlighter for the terms of `queries`.
    ///
    /// Returns `None` when there is nothing to highlight.
    pub fn new<'a>(queries: impl IntoIterator<Item = &'a str>, spec: HighlightSpec) -> Option<Self> {
        let mut seen = HashSet::new();
        let terms: Vec<String> = queries
            .into_iter()
            .flat_map(tokenize)
            .filter(|t| seen.insert(t.clone()))
            .collect();
        if terms.is_empty() || spec.max_fragments == 0 {
            return None;
        }

        let matcher = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&terms)
            .ok()?;
        Some(Highlighter { matcher, spec })
    }

    /// Term occurrences in `text`, as byte ranges of `text`.
    fn hits(&self, text: &str) -> Vec<Hit> {
        if text.is_ascii() {
            return self
                .matcher
                .find_iter(text)
                .filter(|m| is_whole_word(text, m.start(), m.end()))
                .map(|m| Hit {
                    start: m.start(),
                    end: m.end(),
                    term: m.pattern().as_usize(),
                })
                .collect();
        }

        let folded = Folded::new(text);
        self.matcher
            .find_iter(&folded.lower)
            .filter_map(|m| {
                let (start, end) = folded.original(m.start(), m.end())?;
                is_whole_word(text, start, end).then_some(Hit {
                    start,
                    end,
                    term: m.pattern().as_usize(),
                })
            })
            .collect()
    }

    /// Highlighted fragments of `text`, best first.
    pub fn fragments(&self, text: &str) -> Vec<String> {
        let hits = self.hits(text);
        if hits.is_empty() {
            return Vec::new();
        }

        let mut fragments: Vec<(usize, usize, String)> = Vec::new();
        let mut next = 0;
        while next < hits.len() {
            let (start, end) = self.window(text, &hits[next]);
            let covered: Vec<&Hit> = hits[next..]
                .iter()
                .take_while(|h| h.end <= end)
                .collect();
            next += covered.len().max(1);

            let distinct = covered.iter().map(|h| h.term).collect::<HashSet<_>>().len();
            let text = self.render(text, start, end, &covered);
            fragments.push((distinct, covered.len(), text));
        }

        // Stable sort keeps document order among equally good fragments
        fragments.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        fragments
            .into_iter()
            .take(self.spec.max_fragments)
            .map(|(_, _, text)| text)
            .collect()
    }

    /// Fragment bounds around `hit`, widened to word boundaries.
    fn window(&self, text: &str, hit: &Hit) -> (usize, usize) {
        let size = self.spec.fragment_size.max(hit.end - hit.start);
        let slack = (size - (hit.end - hit.start)) / 2;

        let mut start = floor_boundary(text, hit.start.saturating_sub(slack));
        if start > 0 {
            // Do not start in the middle of a word
            if let Some(ws) = text[start..hit.start].find(char::is_whitespace) {
                start += ws;
            } else {
                start = hit.start;
            }
        }

        let mut end = floor_boundary(text, (start + size).min(text.len()).max(hit.end));
        if end < text.len() {
            if let Some(ws) = text[hit.end..end].rfind(char::is_whitespace) {
                end = hit.end + ws;
            }
        }
        (start, end)
    }

    fn render(&self, text: &str, start: usize, end: usize, hits: &[&Hit]) -> String {
        let mut out = String::with_capacity(end - start + hits.len() * 9);
        let mut pos = start;
        for hit in hits {
            out.push_str(&text[pos..hit.start]);
            out.push_str(&self.spec.pre_tag);
            out.push_str(&text[hit.start..hit.end]);
            out.push_str(&self.spec.post_tag);
            pos = hit.end;
        }
        out.push_str(&text[pos..end]);
        out.trim().to_string()
    }
}

/// Lowercased text with, per byte, the range of the source character.
struct Folded {
    lower: String,
    source: Vec<(usize, usize)>,
}

impl Folded {
    fn new(text: &str) -> Self {
        let mut lower = String::with_capacity(text.len());
        let mut source = Vec::with_capacity(text.len());
        for (start, c) in text.char_indices() {
            let end = start + c.len_utf8();
            let before = lower.len();
            lower.extend(c.to_lowercase());
            source.resize(source.len() + lower.len() - before, (start, end));
        }
        Folded { lower, source }
    }

    /// Source range of `lower[start..end]`, if it covers whole characters.
    fn original(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        if end <= start {
            return None;
        }
        let first = self.source[start];
        let last = self.source[end - 1];
        let starts_clean = start == 0 || self.source[start - 1] != first;
        let ends_clean = end == self.source.len() || self.source[end] != last;
        (starts_clean && ends_clean).then_some((first.0, last.1))
    }
}

fn floor_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn is_whole_word(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}
