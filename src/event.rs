// src/event.rs
//! Znormalizowany event czatu (to, co transport podaje silnikowi) + drobne helpery IRC.

use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FloodError;

/* =========================================
   Typy
   ========================================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    /// PRIVMSG
    Message,
    Notice,
    Join,
    Part,
    Quit,
}

/// Grupa komend – okno trzyma osobny limit dla każdej grupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandGroup {
    Chat,
    Presence,
}

impl Command {
    pub const CHAT: &'static [Command] = &[Command::Message, Command::Notice];
    pub const PRESENCE: &'static [Command] = &[Command::Join, Command::Part, Command::Quit];

    pub fn group(self) -> CommandGroup {
        match self {
            Command::Message | Command::Notice => CommandGroup::Chat,
            Command::Join | Command::Part | Command::Quit => CommandGroup::Presence,
        }
    }
}

/// `nick!user@host`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hostmask {
    pub nick: String,
    pub user: String,
    pub host: String,
}

impl Hostmask {
    pub fn new(nick: impl Into<String>, user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            user: user.into(),
            host: host.into(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, FloodError> {
        let (nick, rest) = s
            .split_once('!')
            .ok_or_else(|| FloodError::InvalidHostmask(s.to_string()))?;
        let (user, host) = rest
            .split_once('@')
            .ok_or_else(|| FloodError::InvalidHostmask(s.to_string()))?;
        if nick.is_empty() || user.is_empty() || host.is_empty() {
            return Err(FloodError::InvalidHostmask(s.to_string()));
        }
        Ok(Self::new(nick, user, host))
    }
}

impl fmt::Display for Hostmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}@{}", self.nick, self.user, self.host)
    }
}

/// Niezmienny rekord zdarzenia. Silnik go nigdy nie modyfikuje.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub channel: String,
    pub nick: String,
    pub user: String,
    pub host: String,
    pub command: Command,
    #[serde(default)]
    pub text: String,
    /// Monotoniczny czas odbioru liczony od startu procesu/sesji.
    pub received_at: Duration,
}

impl Event {
    pub fn new(
        command: Command,
        channel: impl Into<String>,
        from: &Hostmask,
        text: impl Into<String>,
        received_at: Duration,
    ) -> Self {
        Self {
            channel: channel.into(),
            nick: from.nick.clone(),
            user: from.user.clone(),
            host: from.host.clone(),
            command,
            text: text.into(),
            received_at,
        }
    }

    pub fn hostmask(&self) -> Hostmask {
        Hostmask::new(&self.nick, &self.user, &self.host)
    }

    /// Tożsamość przekazywana do wyroczni uprawnień.
    pub fn prefix(&self) -> String {
        self.hostmask().to_string()
    }
}

/* =========================================
   Helpery IRC
   ========================================= */

// bold, italic, underline, reverse, reset, monospace, strike + kolory mIRC i hex
static RE_FORMATTING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\x03(?:\d{1,2}(?:,\d{1,2})?)?|\x04(?:[0-9a-fA-F]{6}(?:,[0-9a-fA-F]{6})?)?|[\x02\x0f\x11\x16\x1d\x1e\x1f]",
    )
    .expect("formatting regex")
});

pub fn strip_formatting(s: &str) -> String {
    RE_FORMATTING.replace_all(s, "").into_owned()
}

/// CTCP ACTION (`/me ...`).
pub fn is_action(text: &str) -> bool {
    text.len() >= 9 && text.starts_with("\x01ACTION ") && text.ends_with('\x01')
}

pub fn is_channel(name: &str) -> bool {
    matches!(name.chars().next(), Some('#' | '&' | '+' | '!'))
}
