// src/state.rs
//! Interfejsy "do odczytu" udostępniane przez transport (skład kanałów, tryby,
//! hostmaski) i wyrocznia uprawnień + implementacje w pamięci.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::error::FloodError;
use crate::event::Hostmask;

/// Status w kanale (+o / +h / +v).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Privileges {
    pub op: bool,
    pub halfop: bool,
    pub voice: bool,
}

impl Privileges {
    pub const NONE: Privileges = Privileges { op: false, halfop: false, voice: false };
    pub const OP: Privileges = Privileges { op: true, halfop: false, voice: false };
    pub const HALFOP: Privileges = Privileges { op: false, halfop: true, voice: false };
    pub const VOICE: Privileges = Privileges { op: false, halfop: false, voice: true };

    /// Z prefiksów NAMES (`@`, `%`, `+`, także multi-prefix `@+nick`).
    pub fn from_names_entry(entry: &str) -> (Self, &str) {
        let mut p = Privileges::NONE;
        let nick = entry.trim_start_matches(|c: char| match c {
            '@' => {
                p.op = true;
                true
            }
            '%' => {
                p.halfop = true;
                true
            }
            '+' => {
                p.voice = true;
                true
            }
            _ => false,
        });
        (p, nick)
    }

    pub fn can_moderate(&self) -> bool {
        self.op || self.halfop
    }

    pub fn is_special(&self) -> bool {
        self.op || self.halfop || self.voice
    }
}

/// Widok stanu sieci należący do transportu. Silnik tylko czyta.
pub trait NetworkState: Send + Sync {
    fn own_nick(&self) -> String;

    /// Kanały, na których jest bot.
    fn channels(&self) -> Vec<String>;

    /// `None` = nie śledzimy takiego kanału.
    fn members(&self, channel: &str) -> Option<Vec<String>>;

    /// `Err` gdy nie ma stanu kanału; nick spoza kanału → `Privileges::NONE`.
    fn privileges(&self, channel: &str, nick: &str) -> Result<Privileges, FloodError>;

    fn hostmask_of(&self, nick: &str) -> Option<Hostmask>;
}

/// Wyrocznia uprawnień (trusted / admin / `#kanal,op`).
pub trait CapabilityOracle: Send + Sync {
    fn has_capability(&self, identity: &str, capability: &str) -> bool;
}

/* =========================================
   MemoryNetwork – stan utrzymywany z eventów
   ========================================= */

#[derive(Debug)]
pub struct MemoryNetwork {
    own_nick: RwLock<String>,
    channels: DashMap<String, HashMap<String, Privileges>>,
    hostmasks: DashMap<String, Hostmask>,
}

impl MemoryNetwork {
    pub fn new(own_nick: impl Into<String>) -> Self {
        Self {
            own_nick: RwLock::new(own_nick.into()),
            channels: DashMap::new(),
            hostmasks: DashMap::new(),
        }
    }

    fn is_me(&self, nick: &str) -> bool {
        *self.own_nick.read().unwrap_or_else(PoisonError::into_inner) == nick
    }

    pub fn join(&self, channel: &str, who: &Hostmask) {
        self.hostmasks.insert(who.nick.clone(), who.clone());
        if self.is_me(&who.nick) {
            // świeży kanał – skład przyjdzie z NAMES
            self.channels.insert(channel.to_string(), HashMap::new());
        }
        if let Some(mut members) = self.channels.get_mut(channel) {
            members.insert(who.nick.clone(), Privileges::NONE);
        }
    }

    pub fn part(&self, channel: &str, nick: &str) {
        if self.is_me(nick) {
            self.channels.remove(channel);
            return;
        }
        if let Some(mut members) = self.channels.get_mut(channel) {
            members.remove(nick);
        }
        self.forget_if_gone(nick);
    }

    pub fn kick(&self, channel: &str, nick: &str) {
        self.part(channel, nick);
    }

    pub fn channels_of(&self, nick: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .channels
            .iter()
            .filter(|c| c.value().contains_key(nick))
            .map(|c| c.key().clone())
            .collect();
        out.sort();
        out
    }

    /// Zwraca kanały, na których był nick (przed usunięciem).
    pub fn quit(&self, nick: &str) -> Vec<String> {
        let mut was_in = Vec::new();
        for mut entry in self.channels.iter_mut() {
            if entry.value_mut().remove(nick).is_some() {
                was_in.push(entry.key().clone());
            }
        }
        self.hostmasks.remove(nick);
        was_in.sort();
        was_in
    }

    pub fn rename(&self, old: &str, new: &str) {
        if self.is_me(old) {
            *self.own_nick.write().unwrap_or_else(PoisonError::into_inner) = new.to_string();
        }
        for mut entry in self.channels.iter_mut() {
            if let Some(p) = entry.value_mut().remove(old) {
                entry.value_mut().insert(new.to_string(), p);
            }
        }
        if let Some((_, mut hm)) = self.hostmasks.remove(old) {
            hm.nick = new.to_string();
            self.hostmasks.insert(new.to_string(), hm);
        }
    }

    /// Pojedyncza zmiana trybu: `+o`, `-h`, `+v` ...
    pub fn apply_mode(&self, channel: &str, nick: &str, mode: &str) -> Result<(), FloodError> {
        let mut chars = mode.chars();
        let on = match chars.next() {
            Some('+') => true,
            Some('-') => false,
            _ => return Err(FloodError::Malformed(format!("mode {mode:?}"))),
        };
        let letter = chars.next();
        if chars.next().is_some() {
            return Err(FloodError::Malformed(format!("mode {mode:?}")));
        }

        let mut members = self
            .channels
            .get_mut(channel)
            .ok_or_else(|| FloodError::UnknownChannel(channel.to_string()))?;
        let Some(p) = members.get_mut(nick) else {
            debug!(%channel, %nick, "mode change for nick not in channel");
            return Ok(());
        };
        match letter {
            Some('o') => p.op = on,
            Some('h') => p.halfop = on,
            Some('v') => p.voice = on,
            _ => return Err(FloodError::Malformed(format!("mode {mode:?}"))),
        }
        Ok(())
    }

    /// Pełna lista członków (odpowiedź NAMES) – zastępuje dotychczasowy skład.
    pub fn names<I, S>(&self, channel: &str, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let members: HashMap<String, Privileges> = entries
            .into_iter()
            .filter_map(|e| {
                let (p, nick) = Privileges::from_names_entry(e.as_ref());
                (!nick.is_empty()).then(|| (nick.to_string(), p))
            })
            .collect();
        self.channels.insert(channel.to_string(), members);
    }

    fn forget_if_gone(&self, nick: &str) {
        let still_seen = self.channels.iter().any(|c| c.value().contains_key(nick));
        if !still_seen {
            self.hostmasks.remove(nick);
        }
    }
}

impl NetworkState for MemoryNetwork {
    fn own_nick(&self) -> String {
        self.own_nick
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn channels(&self) -> Vec<String> {
        let mut out: Vec<String> = self.channels.iter().map(|c| c.key().clone()).collect();
        out.sort();
        out
    }

    fn members(&self, channel: &str) -> Option<Vec<String>> {
        self.channels
            .get(channel)
            .map(|m| m.keys().cloned().collect())
    }

    fn privileges(&self, channel: &str, nick: &str) -> Result<Privileges, FloodError> {
        let members = self
            .channels
            .get(channel)
            .ok_or_else(|| FloodError::UnknownChannel(channel.to_string()))?;
        Ok(members.get(nick).copied().unwrap_or_default())
    }

    fn hostmask_of(&self, nick: &str) -> Option<Hostmask> {
        self.hostmasks.get(nick).map(|h| h.value().clone())
    }
}

/* =========================================
   StaticCapabilities – z konfiguracji
   ========================================= */

/// Uprawnienia przypisane do globów hostmasek (`*!*@trusted.example`).
/// `owner` daje wszystko.
#[derive(Debug, Default)]
pub struct StaticCapabilities {
    rules: Vec<(Regex, Vec<String>)>,
}

impl StaticCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: &HashMap<String, Vec<String>>) -> Self {
        let mut this = Self::new();
        for (glob, caps) in map {
            if let Err(e) = this.grant(glob, caps.iter().cloned()) {
                warn!(error=?e, %glob, "capability glob skipped");
            }
        }
        this
    }

    pub fn grant<I>(&mut self, glob: &str, caps: I) -> Result<(), FloodError>
    where
        I: IntoIterator<Item = String>,
    {
        let re = glob_to_regex(glob)?;
        self.rules.push((re, caps.into_iter().collect()));
        Ok(())
    }
}

impl CapabilityOracle for StaticCapabilities {
    fn has_capability(&self, identity: &str, capability: &str) -> bool {
        self.rules.iter().any(|(re, caps)| {
            re.is_match(identity) && caps.iter().any(|c| c == capability || c == "owner")
        })
    }
}

/// Glob hostmaski (`*`, `?`) → zakotwiczony regex bez rozróżniania wielkości liter.
pub fn glob_to_regex(glob: &str) -> Result<Regex, FloodError> {
    let mut pat = String::with_capacity(glob.len() + 8);
    pat.push('^');
    for c in glob.chars() {
        match c {
            '*' => pat.push_str(".*"),
            '?' => pat.push('.'),
            _ => pat.push_str(&regex::escape(&c.to_string())),
        }
    }
    pat.push('$');
    RegexBuilder::new(&pat)
        .case_insensitive(true)
        .build()
        .map_err(|e| FloodError::Malformed(format!("glob {glob:?}: {e}")))
}
