//! Positional dedup and user suppression of reported matches.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::markup::{utf16_slice, utf16_to_byte};
use crate::matches::Match;
use crate::settings::{IgnoredRule, UserSettings};

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("TAG_RE: hardcoded regex is valid"));

const SPELLING_RULE_MARKERS: &[&str] = &["SPELLER_RULE", "MORFOLOGIK_RULE", "HUNSPELL"];

/// What the user asked not to be told about.
#[derive(Debug, Clone, Copy)]
pub struct SuppressionPolicy<'a> {
    pub dictionary: &'a [String],
    pub ignored_rules: &'a [IgnoredRule],
    /// Short language code of the checked text, e.g. `en`.
    pub language: &'a str,
    pub ignore_quoted_lines: bool,
    /// Flat text the matches refer to, needed for quoted-line suppression.
    pub text: Option<&'a str>,
}

impl<'a> SuppressionPolicy<'a> {
    pub fn from_settings(settings: &'a UserSettings, language: &'a str, text: Option<&'a str>) -> Self {
        Self {
            dictionary: &settings.dictionary,
            ignored_rules: &settings.ignored_rules,
            language,
            ignore_quoted_lines: settings.ignore_quoted_lines,
            text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveMatches {
    /// Matches after positional dedup, in service order.
    pub matches: Vec<Match>,
    /// Parallel to `matches`.
    pub suppressed: Vec<bool>,
    pub active_count: usize,
}

impl ActiveMatches {
    pub fn active(&self) -> impl Iterator<Item = &Match> {
        self.matches
            .iter()
            .zip(&self.suppressed)
            .filter(|(_, suppressed)| !**suppressed)
            .map(|(m, _)| m)
    }
}

/// Collapse matches reported at the same position as their neighbour.
///
/// Scans from the end and keeps a match only when its `(offset, length)`
/// differs from the last kept one, so only adjacent duplicates collapse.
pub fn dedup_positions(matches: &[Match]) -> Vec<Match> {
    let mut kept: Vec<Match> = Vec::with_capacity(matches.len());
    let mut prev: Option<(usize, usize)> = None;
    for m in matches.iter().rev() {
        if prev != Some(m.position()) {
            prev = Some(m.position());
            kept.push(m.clone());
        }
    }
    kept.reverse();
    kept
}

pub fn compute_active(matches: &[Match], policy: &SuppressionPolicy<'_>) -> ActiveMatches {
    let matches = dedup_positions(matches);
    let suppressed: Vec<bool> = matches.iter().map(|m| is_suppressed(m, policy)).collect();
    let active_count = suppressed.iter().filter(|s| !**s).count();
    ActiveMatches {
        matches,
        suppressed,
        active_count,
    }
}

pub fn is_spelling_error(m: &Match) -> bool {
    m.rule.issue_type.as_deref() == Some("misspelling")
        || m.rule.category.as_ref().is_some_and(|c| c.id == "TYPOS")
        || SPELLING_RULE_MARKERS.iter().any(|marker| m.rule.id.contains(marker))
}

fn is_suppressed(m: &Match, policy: &SuppressionPolicy<'_>) -> bool {
    if policy.ignore_quoted_lines && policy.text.is_some_and(|text| on_quoted_line(text, m.offset)) {
        return true;
    }
    if is_spelling_error(m) {
        let context = sanitize(&m.context.text);
        let word = utf16_slice(&context, m.context.offset, m.context.offset + m.length)
            .unwrap_or_default();
        known_word(word, policy.dictionary)
    } else {
        let rule_id = sanitize(&m.rule.id);
        policy
            .ignored_rules
            .iter()
            .any(|r| r.id == rule_id && r.language == policy.language)
    }
}

fn known_word(word: &str, dictionary: &[String]) -> bool {
    if word.is_empty() {
        return false;
    }
    if dictionary.iter().any(|w| w == word) {
        return true;
    }
    starts_uppercase(word) && {
        let lowered = lower_first_char(word);
        dictionary.iter().any(|w| *w == lowered)
    }
}

fn starts_uppercase(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

fn lower_first_char(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Strip anything tag-like from service-provided text.
fn sanitize(text: &str) -> String {
    TAG_RE.replace_all(text, "").into_owned()
}

fn on_quoted_line(text: &str, offset: usize) -> bool {
    let Some(byte) = utf16_to_byte(text, offset) else {
        return false;
    };
    let line_start = text[..byte].rfind('\n').map_or(0, |i| i + 1);
    text[line_start..]
        .split('\n')
        .next()
        .unwrap_or_default()
        .trim_start()
        .starts_with('>')
}
