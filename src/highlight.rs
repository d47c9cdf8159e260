// src/highlight.rs
//! Indeks mass-highlight: per kanał jeden regex (alternatywa nicków > 3 znaki, bez
//! rozróżniania wielkości liter). Przebudowywany w całości przy zmianie składu.

use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

/// Nicki o długości <= MIN_NICK_LEN nie wchodzą do wzorca (za dużo fałszywych trafień).
pub const MIN_NICK_LEN: usize = 3;

#[derive(Debug, Default)]
pub struct HighlightIndex {
    patterns: DashMap<String, Regex>,
}

impl HighlightIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buduje wzorzec od zera z aktualnej listy członków. Idempotentne.
    pub fn rebuild<I, S>(&self, channel: &str, members: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match build_pattern(members) {
            Some(re) => {
                self.patterns.insert(channel.to_string(), re);
            }
            None => {
                self.patterns.remove(channel);
            }
        }
        debug!(%channel, "highlight pattern rebuilt");
    }

    pub fn forget(&self, channel: &str) {
        self.patterns.remove(channel);
    }

    /// Liczba (rozłącznych) trafień wzorca w tekście; 0 gdy kanał nie ma wzorca.
    pub fn count_matches(&self, channel: &str, text: &str) -> usize {
        self.patterns
            .get(channel)
            .map(|re| re.find_iter(text).count())
            .unwrap_or(0)
    }

    pub fn has_pattern(&self, channel: &str) -> bool {
        self.patterns.contains_key(channel)
    }
}

fn build_pattern<I, S>(members: I) -> Option<Regex>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut nicks: Vec<String> = members
        .into_iter()
        .map(|n| n.as_ref().to_string())
        .filter(|n| n.chars().count() > MIN_NICK_LEN)
        .collect();
    if nicks.is_empty() {
        // pusty wzorzec pasowałby wszędzie
        return None;
    }
    // dłuższe najpierw, żeby "alice" nie ucinało "alice2"
    nicks.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    nicks.dedup();

    let alternation = nicks
        .iter()
        .map(|n| regex::escape(n))
        .collect::<Vec<_>>()
        .join("|");

    match RegexBuilder::new(&alternation).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(error=?e, "highlight pattern failed to compile");
            None
        }
    }
}
