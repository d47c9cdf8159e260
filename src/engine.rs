// src/engine.rs
//! FloodGuard – silnik jednej sieci. Cały stan (okna, wzorce highlight,
//! rejestr wykroczeń/immunitetów) należy do instancji; współpracownicy
//! (stan sieci, wyrocznia, sink, scheduler) są wstrzykiwani.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::classify::{self, CHAT_LOOKBACK, Detection, FLAP_EVENTS, FloodKind};
use crate::config::FloodConfig;
use crate::error::FloodError;
use crate::event::{Command, CommandGroup, Event, is_channel, strip_formatting};
use crate::gate::{Gate, Suppression, Verdict};
use crate::highlight::HighlightIndex;
use crate::ledger::Ledger;
use crate::punish::{Executor, Punishment};
use crate::scheduler::Scheduler;
use crate::sink::ModerationSink;
use crate::state::{CapabilityOracle, NetworkState};
use crate::window::EventWindowStore;

pub struct Collaborators {
    pub state: Arc<dyn NetworkState>,
    pub caps: Arc<dyn CapabilityOracle>,
    pub sink: Arc<dyn ModerationSink>,
    pub scheduler: Arc<dyn Scheduler>,
}

/// Co silnik zrobił z wykrytym floodem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Forwarded { mask: String },
    Punished(Punishment),
    NotOpped,
    Suppressed(Suppression),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nie kanał, kanał wyłączony albo event samego bota.
    Ignored,
    Clean,
    Flood { kind: FloodKind, action: Action },
    /// Wewnętrzny błąd – klasyfikacja tego jednego eventu porzucona.
    Abandoned,
}

pub struct FloodGuard {
    network: String,
    cfg: FloodConfig,
    windows: EventWindowStore,
    highlights: HighlightIndex,
    ledger: Ledger,
    state: Arc<dyn NetworkState>,
    caps: Arc<dyn CapabilityOracle>,
    sink: Arc<dyn ModerationSink>,
}

impl FloodGuard {
    pub fn new(network: impl Into<String>, cfg: FloodConfig, c: Collaborators) -> Self {
        Self {
            network: network.into(),
            cfg,
            windows: EventWindowStore::new(),
            highlights: HighlightIndex::new(),
            ledger: Ledger::new(c.scheduler),
            state: c.state,
            caps: c.caps,
            sink: c.sink,
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn config(&self) -> &FloodConfig {
        &self.cfg
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn windows(&self) -> &EventWindowStore {
        &self.windows
    }

    pub fn highlights(&self) -> &HighlightIndex {
        &self.highlights
    }

    /* =========================================
       Eventy czatu
       ========================================= */

    /// Główne wejście: zapis do okna, klasyfikacja, bramka, kara.
    /// Nie zmienia indeksu highlight – od tego są `on_join`/`on_part`/... .
    pub fn on_event(&self, event: &Event) -> Outcome {
        match self.process(event) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    error = %e,
                    network = %self.network,
                    channel = %event.channel,
                    nick = %event.nick,
                    "flood check abandoned"
                );
                Outcome::Abandoned
            }
        }
    }

    fn process(&self, event: &Event) -> Result<Outcome, FloodError> {
        if !is_channel(&event.channel) || !self.cfg.enabled_for(&event.channel) {
            return Ok(Outcome::Ignored);
        }
        if event.nick == self.state.own_nick() {
            return Ok(Outcome::Ignored);
        }

        self.windows.record(event);

        let detection = match event.command.group() {
            CommandGroup::Presence => {
                let recent =
                    self.windows
                        .recent(&event.channel, &event.nick, Command::PRESENCE, FLAP_EVENTS);
                classify::classify_presence(&recent)
            }
            CommandGroup::Chat => {
                let recent =
                    self.windows
                        .recent(&event.channel, &event.nick, Command::CHAT, CHAT_LOOKBACK);
                classify::classify_chat(
                    &recent,
                    || {
                        self.highlights
                            .count_matches(&event.channel, &strip_formatting(&event.text))
                    },
                    &self.cfg.dormant,
                )
            }
        };

        let Some(detection) = detection else {
            trace!(nick = %event.nick, channel = %event.channel, "clean");
            return Ok(Outcome::Clean);
        };

        let action = self.respond(event, detection)?;
        Ok(Outcome::Flood {
            kind: detection.kind,
            action,
        })
    }

    /// Bramka i kara pod jednym lockiem rejestru.
    fn respond(&self, event: &Event, detection: Detection) -> Result<Action, FloodError> {
        let mut ledger = self.ledger.lock();

        let gate = Gate {
            state: self.state.as_ref(),
            caps: self.caps.as_ref(),
        };
        let verdict = gate.check(event, &ledger)?;

        let exec = Executor {
            state: self.state.as_ref(),
            sink: self.sink.as_ref(),
            banmask: &self.cfg.banmask,
        };

        Ok(match verdict {
            Verdict::NotOpped => Action::NotOpped,
            Verdict::Suppressed(why) => Action::Suppressed(why),
            Verdict::Proceed if detection.kind == FloodKind::ConnectionFlap => Action::Forwarded {
                mask: exec.ban_forward(event, &self.cfg.forward_channel),
            },
            Verdict::Proceed => Action::Punished(exec.punish(event, detection, &mut ledger)),
        })
    }

    /* =========================================
       Zmiany składu → przebudowa wzorców highlight
       ========================================= */

    pub fn on_join(&self, channel: &str) {
        self.rebuild_highlights(Some(channel));
    }

    pub fn on_part(&self, channel: &str, nick: &str) {
        if nick == self.state.own_nick() {
            self.highlights.forget(channel);
            return;
        }
        self.rebuild_highlights(Some(channel));
    }

    pub fn on_kick(&self, channel: &str, kicked: &str) {
        self.on_part(channel, kicked);
    }

    /// QUIT nie jest związany z kanałem – przebudowa wszędzie.
    pub fn on_quit(&self, nick: &str) {
        if nick == self.state.own_nick() {
            return;
        }
        self.rebuild_highlights(None);
    }

    pub fn on_nick_change(&self, old: &str, new: &str) {
        debug!(%old, %new, "nick change");
        self.rebuild_highlights(None);
    }

    /// `None` = wszystkie kanały, na których jest bot.
    pub fn rebuild_highlights(&self, channel: Option<&str>) {
        let channels = match channel {
            Some(c) => vec![c.to_string()],
            None => self.state.channels(),
        };
        for name in channels {
            match self.state.members(&name) {
                Some(members) => self.highlights.rebuild(&name, members),
                None => self.highlights.forget(&name),
            }
        }
    }

    /// Sprzątanie bezczynnych okien; `now` musi być z zegara eventów.
    pub fn prune_windows(&self, now: Duration) -> usize {
        let dropped = self.windows.prune(now);
        self.log_pruned(dropped);
        dropped
    }

    /// Jak `prune_windows`, ale "teraz" = najnowszy zapisany event.
    /// Wołane cyklicznie przez binarkę.
    pub fn prune_idle_windows(&self) -> usize {
        let dropped = self.windows.prune_idle();
        self.log_pruned(dropped);
        dropped
    }

    fn log_pruned(&self, dropped: usize) {
        if dropped > 0 {
            debug!(dropped, network = %self.network, "idle windows pruned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::event::Hostmask;
    use crate::scheduler::VirtualScheduler;
    use crate::sink::ModAction;
    use crate::state::{MemoryNetwork, StaticCapabilities};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ModAction>>);

    impl ModerationSink for Recorder {
        fn send(&self, action: ModAction) {
            self.0.lock().unwrap().push(action);
        }
    }

    struct Rig {
        net: Arc<MemoryNetwork>,
        sink: Arc<Recorder>,
        guard: FloodGuard,
    }

    fn rig(cfg: FloodConfig) -> Rig {
        let net = Arc::new(MemoryNetwork::new("bot"));
        net.names("#x", ["@bot", "alice"]);
        let sink = Arc::new(Recorder::default());
        let guard = FloodGuard::new(
            "test",
            cfg,
            Collaborators {
                state: net.clone(),
                caps: Arc::new(StaticCapabilities::new()),
                sink: sink.clone(),
                scheduler: Arc::new(VirtualScheduler::new()),
            },
        );
        Rig { net, sink, guard }
    }

    fn say(nick: &str, channel: &str, text: &str, secs: u64) -> Event {
        let who = Hostmask::new(nick, "u", format!("{nick}.host"));
        Event::new(Command::Message, channel, &who, text, Duration::from_secs(secs))
    }

    #[test]
    fn ignores_private_disabled_and_own_messages() {
        let mut cfg = FloodConfig::default();
        cfg.channels.insert("#off".into(), false);
        let r = rig(cfg);
        assert_eq!(r.guard.on_event(&say("alice", "bot", "hi", 0)), Outcome::Ignored);
        assert_eq!(r.guard.on_event(&say("alice", "#OFF", "hi", 0)), Outcome::Ignored);
        assert_eq!(r.guard.on_event(&say("bot", "#x", "hi", 0)), Outcome::Ignored);
        assert!(r.guard.windows().is_empty());
    }

    #[test]
    fn unknown_channel_abandons_single_event() {
        let r = rig(FloodConfig::default());
        for t in 0..4 {
            assert_eq!(r.guard.on_event(&say("alice", "#ghost", &format!("m{t}"), t)), Outcome::Clean);
        }
        assert_eq!(r.guard.on_event(&say("alice", "#ghost", "m4", 4)), Outcome::Abandoned);
        // inne kanały działają dalej
        assert_eq!(r.guard.on_event(&say("alice", "#x", "hello", 5)), Outcome::Clean);
    }

    #[test]
    fn highlight_index_follows_membership() {
        let r = rig(FloodConfig::default());
        let crowd: Vec<String> = (0..12).map(|i| format!("user{i:02}")).collect();
        let mut names = vec!["@bot".to_string(), "alice".to_string()];
        names.extend(crowd.iter().cloned());
        r.net.names("#x", &names);
        r.guard.on_join("#x");

        let ping = crowd.join(" ");
        match r.guard.on_event(&say("alice", "#x", &ping, 0)) {
            Outcome::Flood { kind, action: Action::Punished(p) } => {
                assert_eq!(kind, FloodKind::Highlight);
                assert!(p.kicked);
            }
            other => panic!("unexpected {other:?}"),
        }

        // po wyjściu bota z kanału wzorzec znika
        r.net.part("#x", "bot");
        r.guard.on_part("#x", "bot");
        assert!(!r.guard.highlights().has_pattern("#x"));
        assert_eq!(r.sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn quit_and_nick_rebuild_every_channel() {
        let r = rig(FloodConfig::default());
        r.net.names("#y", ["@bot", "charlie"]);
        r.guard.rebuild_highlights(None);
        assert!(r.guard.highlights().has_pattern("#y"));

        r.net.quit("charlie");
        r.guard.on_quit("charlie");
        assert!(!r.guard.highlights().has_pattern("#y"));

        r.net.join("#y", &Hostmask::new("dave", "d", "h"));
        r.net.rename("dave", "davey");
        r.guard.on_nick_change("dave", "davey");
        assert_eq!(r.guard.highlights().count_matches("#y", "davey"), 1);
    }
}
