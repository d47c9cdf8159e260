// src/feed.rs
//! Wejście binarki: jedna linia JSON = jedno zdarzenie z sieci.
//!
//! ```text
//! {"type":"privmsg","channel":"#x","prefix":"a!u@h","text":"hi","at":12.5}
//! {"type":"join","channels":"#x,#y","prefix":"a!u@h"}
//! {"type":"quit","prefix":"a!u@h"}
//! {"type":"kick","channel":"#x","nick":"a"}
//! {"type":"nick","prefix":"a!u@h","new_nick":"b"}
//! {"type":"mode","channel":"#x","nick":"a","mode":"+o"}
//! {"type":"names","channel":"#x","members":["@bot","a"]}
//! ```
//! `at` (sekundy) jest opcjonalne – bez niego liczymy czas od startu.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use crate::engine::{FloodGuard, Outcome};
use crate::error::FloodError;
use crate::event::{Command, Event, Hostmask};
use crate::state::MemoryNetwork;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Privmsg {
        channel: String,
        prefix: String,
        text: String,
        #[serde(default)]
        at: Option<f64>,
    },
    Notice {
        channel: String,
        prefix: String,
        text: String,
        #[serde(default)]
        at: Option<f64>,
    },
    Join {
        /// lista po przecinku
        channels: String,
        prefix: String,
        #[serde(default)]
        at: Option<f64>,
    },
    Part {
        channel: String,
        prefix: String,
        #[serde(default)]
        text: String,
        #[serde(default)]
        at: Option<f64>,
    },
    Quit {
        prefix: String,
        #[serde(default)]
        text: String,
        #[serde(default)]
        at: Option<f64>,
    },
    Kick {
        channel: String,
        nick: String,
    },
    Nick {
        prefix: String,
        new_nick: String,
    },
    Mode {
        channel: String,
        nick: String,
        mode: String,
    },
    Names {
        channel: String,
        members: Vec<String>,
    },
}

pub fn parse_line(line: &str) -> Result<Inbound, FloodError> {
    serde_json::from_str(line).map_err(|e| FloodError::Malformed(e.to_string()))
}

/// Spina stan sieci (transport) z silnikiem: najpierw to, co silnik ma zobaczyć
/// jeszcze ze starym składem, potem zmiana składu, na końcu przebudowa wzorców.
pub struct Feed {
    network: Arc<MemoryNetwork>,
    guard: Arc<FloodGuard>,
    started: Instant,
}

impl Feed {
    pub fn new(network: Arc<MemoryNetwork>, guard: Arc<FloodGuard>) -> Self {
        Self {
            network,
            guard,
            started: Instant::now(),
        }
    }

    /// Czas od startu feedu (zegar eventów bez `at`).
    pub fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn clock(&self, at: Option<f64>) -> Result<Duration, FloodError> {
        match at {
            None => Ok(self.now()),
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|e| FloodError::Malformed(format!("timestamp {secs}: {e}"))),
        }
    }

    pub fn apply(&self, msg: Inbound) -> Result<Vec<Outcome>, FloodError> {
        let mut outcomes = Vec::new();
        match msg {
            Inbound::Privmsg { channel, prefix, text, at } => {
                let who = Hostmask::parse(&prefix)?;
                let ev = Event::new(Command::Message, channel, &who, text, self.clock(at)?);
                outcomes.push(self.guard.on_event(&ev));
            }
            Inbound::Notice { channel, prefix, text, at } => {
                let who = Hostmask::parse(&prefix)?;
                let ev = Event::new(Command::Notice, channel, &who, text, self.clock(at)?);
                outcomes.push(self.guard.on_event(&ev));
            }
            Inbound::Join { channels, prefix, at } => {
                let who = Hostmask::parse(&prefix)?;
                let at = self.clock(at)?;
                for channel in channels.split(',').filter(|c| !c.is_empty()) {
                    self.network.join(channel, &who);
                    self.guard.on_join(channel);
                    let ev = Event::new(Command::Join, channel, &who, "", at);
                    outcomes.push(self.guard.on_event(&ev));
                }
            }
            Inbound::Part { channel, prefix, text, at } => {
                let who = Hostmask::parse(&prefix)?;
                let ev = Event::new(Command::Part, channel.as_str(), &who, text, self.clock(at)?);
                outcomes.push(self.guard.on_event(&ev));
                self.network.part(&channel, &who.nick);
                self.guard.on_part(&channel, &who.nick);
            }
            Inbound::Quit { prefix, text, at } => {
                let who = Hostmask::parse(&prefix)?;
                let at = self.clock(at)?;
                // QUIT nie ma kanału – rozpisujemy go na kanały, na których był nick
                for channel in self.network.channels_of(&who.nick) {
                    let ev = Event::new(Command::Quit, channel, &who, text.as_str(), at);
                    outcomes.push(self.guard.on_event(&ev));
                }
                self.network.quit(&who.nick);
                self.guard.on_quit(&who.nick);
            }
            Inbound::Kick { channel, nick } => {
                self.network.kick(&channel, &nick);
                self.guard.on_kick(&channel, &nick);
            }
            Inbound::Nick { prefix, new_nick } => {
                let who = Hostmask::parse(&prefix)?;
                self.network.rename(&who.nick, &new_nick);
                self.guard.on_nick_change(&who.nick, &new_nick);
            }
            Inbound::Mode { channel, nick, mode } => {
                self.network.apply_mode(&channel, &nick, &mode)?;
            }
            Inbound::Names { channel, members } => {
                debug!(%channel, count = members.len(), "names received");
                self.network.names(&channel, &members);
                self.guard.on_join(&channel);
            }
        }
        Ok(outcomes)
    }
}
