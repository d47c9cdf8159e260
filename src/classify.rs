// src/classify.rs
//! Klasyfikatory floodu – czyste predykaty na wycinku okna.
//!
//! Progi są dokładne (parytet zachowania), nie do strojenia:
//! - flap:       6 x JOIN/PART/QUIT w < 240 s
//! - message:    5 wiadomości w <= 6 s
//! - repetition: 3 identyczne (bez formatowania) w < 60 s
//! - paste:      3 kolejne pary szybsze niż 30 znaków/s
//! - slap:       3 x `/me slaps` w < 30 s
//! - highlight:  > 10 trafień wzorca nicków w jednej wiadomości
//!
//! Dwa uśpione detektory (powtórzenia podciągów, CAPS) są domyślnie wyłączone.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DormantDetectors;
use crate::event::{Command, Event, is_action, strip_formatting};

pub const FLAP_EVENTS: usize = 6;
pub const FLAP_SPAN: Duration = Duration::from_secs(240);
pub const RATE_EVENTS: usize = 5;
pub const RATE_SPAN: Duration = Duration::from_secs(6);
pub const REPEAT_EVENTS: usize = 3;
pub const REPEAT_SPAN: Duration = Duration::from_secs(60);
pub const PASTE_EVENTS: usize = 4;
pub const PASTE_CHARS_PER_SEC: f64 = 30.0;
pub const SLAP_EVENTS: usize = 3;
pub const SLAP_SPAN: Duration = Duration::from_secs(30);
pub const HIGHLIGHT_LIMIT: usize = 10;
pub const SUBSTRING_REPEAT_LIMIT: usize = 10;
pub const CAPS_EVENTS: usize = 3;
pub const CAPS_LOWER_RATIO: f64 = 0.25;

/// Ile ostatnich wiadomości czatu dostają klasyfikatory.
pub const CHAT_LOOKBACK: usize = 5;

const SLAP_OFFSET: std::ops::Range<usize> = 8..13; // po "\x01ACTION "

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloodKind {
    /// Zrywające się połączenie – ban-forward zamiast kick/ban.
    ConnectionFlap,
    Message,
    MessageRepetition,
    /// uśpiony
    Repetition,
    Paste,
    Slap,
    Highlight,
    /// uśpiony
    Caps,
}

impl FloodKind {
    pub fn label(self) -> &'static str {
        match self {
            FloodKind::ConnectionFlap => "Connection flap",
            FloodKind::Message => "Message",
            FloodKind::MessageRepetition => "Message repetition",
            FloodKind::Repetition => "Repetition",
            FloodKind::Paste => "Paste",
            FloodKind::Slap => "Slap",
            FloodKind::Highlight => "Highlight",
            FloodKind::Caps => "CAPS",
        }
    }

    pub fn kick_reason(self) -> String {
        let mut reason = format!("{} flood detected.", self.label());
        if self == FloodKind::Paste {
            reason.push_str(" Use a pastebin like pastebin.ubuntu.com or gist.github.com.");
        }
        reason
    }
}

/// Wynik klasyfikacji: rodzaj + czy tylko "na sucho" (bez wysyłania kick/ban).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub kind: FloodKind,
    pub dummy: bool,
}

impl Detection {
    fn live(kind: FloodKind) -> Self {
        Self { kind, dummy: false }
    }
}

/* =========================================
   Pipeline (stała kolejność, pierwszy wygrywa)
   ========================================= */

/// JOIN/PART/QUIT – jedyny klasyfikator obecności.
pub fn classify_presence(recent: &[Event]) -> Option<Detection> {
    connection_flap(recent).then(|| Detection::live(FloodKind::ConnectionFlap))
}

/// MESSAGE/NOTICE. `highlight_hits` liczone leniwie, tylko gdy dojdziemy do tego kroku.
pub fn classify_chat(
    recent: &[Event],
    highlight_hits: impl FnOnce() -> usize,
    dormant: &DormantDetectors,
) -> Option<Detection> {
    if message_rate(recent) {
        return Some(Detection::live(FloodKind::Message));
    }
    if repeated_message(recent) {
        return Some(Detection::live(FloodKind::MessageRepetition));
    }
    if dormant.repetition.enabled
        && recent.last().is_some_and(|e| substring_repetition(&e.text))
    {
        return Some(Detection {
            kind: FloodKind::Repetition,
            dummy: dormant.repetition.dummy,
        });
    }
    if paste(recent) {
        return Some(Detection::live(FloodKind::Paste));
    }
    if slap(recent) {
        return Some(Detection::live(FloodKind::Slap));
    }
    if mass_highlight(highlight_hits()) {
        return Some(Detection::live(FloodKind::Highlight));
    }
    if dormant.caps.enabled && shouting(recent) {
        return Some(Detection {
            kind: FloodKind::Caps,
            dummy: dormant.caps.dummy,
        });
    }
    None
}

/* =========================================
   Predykaty
   ========================================= */

fn span(older: &Event, newer: &Event) -> Duration {
    newer.received_at.saturating_sub(older.received_at)
}

/// Ostatnie `n` eventów (albo None, gdy za mało).
fn tail(recent: &[Event], n: usize) -> Option<&[Event]> {
    recent.len().checked_sub(n).map(|start| &recent[start..])
}

pub fn connection_flap(recent: &[Event]) -> bool {
    tail(recent, FLAP_EVENTS)
        .is_some_and(|w| span(&w[0], &w[FLAP_EVENTS - 1]) < FLAP_SPAN)
}

pub fn message_rate(recent: &[Event]) -> bool {
    tail(recent, RATE_EVENTS)
        .is_some_and(|w| span(&w[0], &w[RATE_EVENTS - 1]) <= RATE_SPAN)
}

pub fn repeated_message(recent: &[Event]) -> bool {
    let Some(w) = tail(recent, REPEAT_EVENTS) else {
        return false;
    };
    let first = strip_formatting(&w[0].text);
    w[1..].iter().all(|e| strip_formatting(&e.text) == first)
        && span(&w[0], &w[REPEAT_EVENTS - 1]) < REPEAT_SPAN
}

/// Tekst `newer` dłuższy niż 30 znaków na każdą sekundę od `older`.
/// Zerowy odstęp liczy się jako "za szybko".
pub fn typed_too_fast(newer: &Event, older: &Event) -> bool {
    let elapsed = span(older, newer);
    if elapsed.is_zero() {
        return true;
    }
    newer.text.chars().count() as f64 > elapsed.as_secs_f64() * PASTE_CHARS_PER_SEC
}

pub fn paste(recent: &[Event]) -> bool {
    tail(recent, PASTE_EVENTS)
        .is_some_and(|w| w.windows(2).all(|pair| typed_too_fast(&pair[1], &pair[0])))
}

pub fn is_slap(e: &Event) -> bool {
    e.command == Command::Message
        && is_action(&e.text)
        && e.text.as_bytes().get(SLAP_OFFSET) == Some(b"slaps".as_slice())
}

pub fn slap(recent: &[Event]) -> bool {
    tail(recent, SLAP_EVENTS).is_some_and(|w| {
        w.iter().all(is_slap) && span(&w[0], &w[SLAP_EVENTS - 1]) < SLAP_SPAN
    })
}

pub fn mass_highlight(hits: usize) -> bool {
    hits > HIGHLIGHT_LIMIT
}

/// Serie powtórzeń w tekście: (długość jednostki, liczba powtórzeń).
/// Od lewej: w każdej pozycji najkrótsza jednostka, która zaraz się powtarza,
/// rozszerzana zachłannie; potem skok za serię.
pub fn repetition_runs(text: &str) -> Vec<(usize, usize)> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < n {
        let mut found = None;
        for unit in 1..=(n - i) / 2 {
            let head = &chars[i..i + unit];
            if head != &chars[i + unit..i + 2 * unit] {
                continue;
            }
            let mut reps = 2;
            while i + (reps + 1) * unit <= n && head == &chars[i + reps * unit..i + (reps + 1) * unit] {
                reps += 1;
            }
            found = Some((unit, reps));
            break;
        }
        match found {
            Some((unit, reps)) => {
                runs.push((unit, reps));
                i += unit * reps;
            }
            None => i += 1,
        }
    }
    runs
}

pub fn substring_repetition(text: &str) -> bool {
    repetition_runs(text)
        .iter()
        .any(|&(_, reps)| reps > SUBSTRING_REPEAT_LIMIT)
}

/// Mniej niż 25% małych liter ASCII.
pub fn too_many_caps(text: &str) -> bool {
    let total = text.chars().count();
    if total == 0 {
        return false;
    }
    let lower = text.chars().filter(|c| c.is_ascii_lowercase()).count();
    (lower as f64 / total as f64) < CAPS_LOWER_RATIO
}

pub fn shouting(recent: &[Event]) -> bool {
    tail(recent, CAPS_EVENTS).is_some_and(|w| w.iter().all(|e| too_many_caps(&e.text)))
}
