use std::sync::{Arc, Mutex};
use std::time::Duration;

use tigris_floodguard::{
    Collaborators, FloodGuard, Outcome,
    classify::FloodKind,
    config::FloodConfig,
    engine::Action,
    event::{Command, Event, Hostmask},
    gate::Suppression,
    ledger::{DECAY_INTERVAL, IMMUNITY_WINDOW},
    scheduler::VirtualScheduler,
    sink::{ModAction, ModerationSink},
    state::{MemoryNetwork, StaticCapabilities},
};

#[derive(Default)]
struct Recorder(Mutex<Vec<ModAction>>);

impl ModerationSink for Recorder {
    fn send(&self, action: ModAction) {
        self.0.lock().unwrap().push(action);
    }
}

impl Recorder {
    fn taken(&self) -> Vec<ModAction> {
        self.0.lock().unwrap().clone()
    }
}

struct World {
    sched: Arc<VirtualScheduler>,
    sink: Arc<Recorder>,
    guard: FloodGuard,
}

fn world(names: &[&str]) -> World {
    let net = Arc::new(MemoryNetwork::new("bot"));
    net.names("#x", names.iter().copied());
    let sched = Arc::new(VirtualScheduler::new());
    let sink = Arc::new(Recorder::default());
    let guard = FloodGuard::new(
        "testnet",
        FloodConfig::default(),
        Collaborators {
            state: net.clone(),
            caps: Arc::new(StaticCapabilities::new()),
            sink: sink.clone(),
            scheduler: sched.clone(),
        },
    );
    guard.rebuild_highlights(None);
    World { sched, sink, guard }
}

fn msg(nick: &str, host: &str, text: &str, secs: u64) -> Event {
    let who = Hostmask::new(nick, "u", host);
    Event::new(Command::Message, "#x", &who, text, Duration::from_secs(secs))
}

/// 5 różnych wiadomości co sekundę od `start`; zwraca wynik ostatniej.
fn burst(w: &World, nick: &str, host: &str, tag: &str, start: u64) -> Outcome {
    let mut last = Outcome::Clean;
    for i in 0..5 {
        last = w.guard.on_event(&msg(nick, host, &format!("{tag} line {i}"), start + i));
        if i < 4 {
            assert_eq!(last, Outcome::Clean, "early detection at message {i}");
        }
    }
    last
}

#[test]
fn five_quick_messages_kick_and_immunize() {
    let w = world(&["@bot", "alice"]);

    let out = burst(&w, "alice", "h1", "hi", 0);
    match out {
        Outcome::Flood { kind: FloodKind::Message, action: Action::Punished(p) } => {
            assert!(p.kicked);
            assert!(!p.banned);
            assert_eq!(p.strikes, 1);
        }
        other => panic!("unexpected {other:?}"),
    }

    assert_eq!(
        w.sink.taken(),
        vec![ModAction::Kick {
            channel: "#x".into(),
            nick: "alice".into(),
            reason: "Message flood detected.".into(),
        }]
    );
    assert_eq!(w.guard.ledger().strikes("h1"), 1);
    assert!(w.guard.ledger().is_immune("alice"));

    w.sched.advance(IMMUNITY_WINDOW);
    assert!(!w.guard.ledger().is_immune("alice"));
    assert_eq!(w.guard.ledger().strikes("h1"), 1);
}

#[test]
fn immunity_swallows_follow_up_detection() {
    let w = world(&["@bot", "alice"]);
    burst(&w, "alice", "h1", "hi", 0);

    // szósta wiadomość znowu łapie się na limit, ale sprawca jest chroniony
    let out = w.guard.on_event(&msg("alice", "h1", "one more", 5));
    assert_eq!(
        out,
        Outcome::Flood {
            kind: FloodKind::Message,
            action: Action::Suppressed(Suppression::Immune),
        }
    );
    assert_eq!(w.sink.taken().len(), 1);
    assert_eq!(w.guard.ledger().strikes("h1"), 1);
}

#[test]
fn repeat_offender_is_banned_on_fourth_punishment_then_decays() {
    let w = world(&["@bot", "alice"]);

    let mut punishments = Vec::new();
    for round in 0..4u64 {
        let out = burst(&w, "alice", "h1", &format!("r{round}"), round * 100);
        let Outcome::Flood { action: Action::Punished(p), .. } = out else {
            panic!("round {round}: unexpected {out:?}");
        };
        assert_eq!(p.strikes, round as u32 + 1);
        punishments.push(p);
        // immunitet mija, zanik jeszcze nie
        w.sched.advance(Duration::from_secs(10));
    }

    // trzecia kara: licznik przed nią = 2, czyli nie > 2 – sam kick, bez bana
    let third = punishments[2];
    assert_eq!(third.strikes - 1, 2);
    assert!(third.kicked);
    assert!(!third.banned);
    assert!(!third.repeat_offender);

    // czwarta kara: licznik przed nią = 3 > 2 – ban + kick
    let fourth = punishments[3];
    assert_eq!(fourth.strikes - 1, 3);
    assert!(fourth.banned && fourth.kicked && fourth.repeat_offender);
    assert!(punishments[..3].iter().all(|p| !p.banned));

    let sent = w.sink.taken();
    assert_eq!(sent.len(), 5);
    assert!(sent[..3].iter().all(|a| matches!(a, ModAction::Kick { .. })));
    assert_eq!(
        sent[3],
        ModAction::Ban { channel: "#x".into(), mask: "*!*@h1".into() }
    );
    assert!(matches!(sent[4], ModAction::Kick { .. }));

    // pierwszy zanik 300 s po pierwszym wykroczeniu (zegar stoi na 40 s)
    w.sched.advance(DECAY_INTERVAL - Duration::from_secs(40));
    assert_eq!(w.guard.ledger().strikes("h1"), 3);
    w.sched.advance(DECAY_INTERVAL);
    assert_eq!(w.guard.ledger().strikes("h1"), 2);
    w.sched.advance(DECAY_INTERVAL);
    assert_eq!(w.guard.ledger().strikes("h1"), 1);
    w.sched.advance(DECAY_INTERVAL);
    assert_eq!(w.guard.ledger().strikes("h1"), 0);
    assert_eq!(w.guard.ledger().snapshot().offenders(), 0);
    assert_eq!(w.sched.pending(), 0);
}

#[test]
fn channel_op_flooding_is_left_alone() {
    let w = world(&["@bot", "@opal"]);
    let out = burst(&w, "opal", "staff.host", "ops", 0);
    assert_eq!(
        out,
        Outcome::Flood {
            kind: FloodKind::Message,
            action: Action::Suppressed(Suppression::Privileged),
        }
    );
    assert!(w.sink.taken().is_empty());
    let books = w.guard.ledger().snapshot();
    assert_eq!(books.offenders(), 0);
    assert_eq!(books.immune_count(), 0);
    assert_eq!(w.sched.pending(), 0);
}

#[test]
fn bot_without_ops_does_nothing() {
    let w = world(&["+bot", "alice"]);
    let out = burst(&w, "alice", "h1", "hi", 0);
    assert_eq!(
        out,
        Outcome::Flood { kind: FloodKind::Message, action: Action::NotOpped }
    );
    assert!(w.sink.taken().is_empty());
    assert_eq!(w.guard.ledger().strikes("h1"), 0);
}

#[test]
fn repeated_text_with_formatting_is_one_message() {
    let w = world(&["@bot", "alice"]);
    assert_eq!(w.guard.on_event(&msg("alice", "h1", "buy now", 0)), Outcome::Clean);
    assert_eq!(w.guard.on_event(&msg("alice", "h1", "\x02buy now\x02", 20)), Outcome::Clean);
    let out = w.guard.on_event(&msg("alice", "h1", "\x0304buy now", 40));
    assert!(matches!(
        out,
        Outcome::Flood { kind: FloodKind::MessageRepetition, action: Action::Punished(_) }
    ));
}
