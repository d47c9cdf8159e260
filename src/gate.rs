// src/gate.rs
//! Bramka uprawnień i immunitetów – ostatnie słowo przed karą.
//!
//! Kolejność: (a) bot musi mieć +o/+h, (b) immunitet, (c) sprawca z +o/+h/+v,
//! (d) sprawca trusted / admin / `#kanal,op`. Każde przerwanie to no-op z logiem.

use tracing::{debug, warn};

use crate::error::FloodError;
use crate::event::Event;
use crate::ledger::LedgerGuard;
use crate::state::{CapabilityOracle, NetworkState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suppression {
    Immune,
    /// +o / +h / +v w kanale
    Privileged,
    /// z wyroczni: które uprawnienie zadziałało
    Trusted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    /// Bot nie ma opa – nic nie zrobimy.
    NotOpped,
    Suppressed(Suppression),
}

pub struct Gate<'a> {
    pub state: &'a dyn NetworkState,
    pub caps: &'a dyn CapabilityOracle,
}

impl Gate<'_> {
    /// Wywoływane pod lockiem rejestru (`ledger`), żeby immunitet nie zmienił się
    /// między sprawdzeniem a karą.
    pub fn check(&self, event: &Event, ledger: &LedgerGuard<'_>) -> Result<Verdict, FloodError> {
        let channel = event.channel.as_str();
        let nick = event.nick.as_str();

        let me = self.state.own_nick();
        if !self.state.privileges(channel, &me)?.can_moderate() {
            warn!(%nick, %channel, "flooded, but not opped");
            return Ok(Verdict::NotOpped);
        }

        if ledger.is_immune(nick) {
            debug!(%nick, "not punishing, they are immune");
            return Ok(Verdict::Suppressed(Suppression::Immune));
        }

        if self.state.privileges(channel, nick)?.is_special() {
            debug!(%nick, %channel, "flooded, but has special access");
            return Ok(Verdict::Suppressed(Suppression::Privileged));
        }

        let identity = event.prefix();
        let channel_op = format!("{channel},op");
        for cap in ["trusted", "admin", channel_op.as_str()] {
            if self.caps.has_capability(&identity, cap) {
                debug!(%nick, %channel, capability = %cap, "flooded, but is trusted");
                return Ok(Verdict::Suppressed(Suppression::Trusted(cap.to_string())));
            }
        }

        Ok(Verdict::Proceed)
    }
}
