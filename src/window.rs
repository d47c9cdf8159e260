// src/window.rs
//! Okna zdarzeń per (kanał, nick) – ostatnie eventy w kolejności przyjścia.

use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::event::{Command, Event};

/// Ile eventów danej grupy (czat / obecność) trzymamy na klucz.
/// Najbardziej wymagający klasyfikator (flap) potrzebuje 6.
pub const RETAIN_PER_GROUP: usize = 6;

/// Okna bez ruchu dłużej niż to mogą zostać wyrzucone przez `prune`.
pub const IDLE_HORIZON: Duration = Duration::from_secs(600);

/// Event Window Store. Kanały są od siebie niezależne, więc wystarcza
/// blokowanie per-klucz (shard DashMapy), bez globalnego locka.
#[derive(Debug, Default)]
pub struct EventWindowStore {
    windows: DashMap<(String, String), VecDeque<Event>>,
}

impl EventWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dopisuje event na koniec okna i przycina je.
    /// Czas cofający się względem ostatniego wpisu jest wyrównywany do niego.
    pub fn record(&self, event: &Event) {
        let mut window = self
            .windows
            .entry((event.channel.clone(), event.nick.clone()))
            .or_default();

        let mut ev = event.clone();
        if let Some(last) = window.back() {
            if ev.received_at < last.received_at {
                debug!(
                    nick = %ev.nick,
                    channel = %ev.channel,
                    "out-of-order timestamp clamped to previous event"
                );
                ev.received_at = last.received_at;
            }
        }

        let group = ev.command.group();
        window.push_back(ev);

        // trzymamy RETAIN_PER_GROUP najnowszych z każdej grupy
        let in_group = window.iter().filter(|e| e.command.group() == group).count();
        if in_group > RETAIN_PER_GROUP {
            if let Some(pos) = window.iter().position(|e| e.command.group() == group) {
                window.remove(pos);
            }
        }
    }

    /// Do `max_needed` najnowszych eventów z `commands`, najstarszy pierwszy.
    pub fn recent(
        &self,
        channel: &str,
        nick: &str,
        commands: &[Command],
        max_needed: usize,
    ) -> Vec<Event> {
        let key = (channel.to_string(), nick.to_string());
        let Some(window) = self.windows.get(&key) else {
            return Vec::new();
        };

        let mut out: Vec<Event> = window
            .iter()
            .rev()
            .filter(|e| commands.contains(&e.command))
            .take(max_needed)
            .cloned()
            .collect();
        out.reverse();
        out
    }

    /// Usuwa okna, których najnowszy event jest starszy niż `now - IDLE_HORIZON`.
    pub fn prune(&self, now: Duration) -> usize {
        let Some(cutoff) = now.checked_sub(IDLE_HORIZON) else {
            return 0;
        };
        let before = self.windows.len();
        self.windows
            .retain(|_, w| w.back().map(|e| e.received_at >= cutoff).unwrap_or(false));
        before - self.windows.len()
    }

    /// Najnowszy znacznik czasu we wszystkich oknach (zegar eventów, nie procesu).
    pub fn newest(&self) -> Option<Duration> {
        self.windows
            .iter()
            .filter_map(|w| w.back().map(|e| e.received_at))
            .max()
    }

    /// `prune` względem najnowszego eventu – ten sam zegar co znaczniki w oknach.
    pub fn prune_idle(&self) -> usize {
        match self.newest() {
            Some(now) => self.prune(now),
            None => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
