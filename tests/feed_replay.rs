use std::sync::{Arc, Mutex};

use tigris_floodguard::{
    Collaborators, FloodError, FloodGuard, Outcome,
    classify::FloodKind,
    config::FloodConfig,
    engine::Action,
    feed::{Feed, parse_line},
    gate::Suppression,
    scheduler::VirtualScheduler,
    sink::{ModAction, ModerationSink},
    state::{MemoryNetwork, NetworkState, StaticCapabilities},
};

#[derive(Default)]
struct Recorder(Mutex<Vec<ModAction>>);

impl ModerationSink for Recorder {
    fn send(&self, action: ModAction) {
        self.0.lock().unwrap().push(action);
    }
}

struct Replay {
    net: Arc<MemoryNetwork>,
    guard: Arc<FloodGuard>,
    sink: Arc<Recorder>,
    feed: Feed,
}

fn replay() -> Replay {
    let net = Arc::new(MemoryNetwork::new("bot"));
    let sink = Arc::new(Recorder::default());
    let guard = Arc::new(FloodGuard::new(
        "testnet",
        FloodConfig::default(),
        Collaborators {
            state: net.clone(),
            caps: Arc::new(StaticCapabilities::new()),
            sink: sink.clone(),
            scheduler: Arc::new(VirtualScheduler::new()),
        },
    ));
    let feed = Feed::new(net.clone(), guard.clone());
    Replay { net, guard, sink, feed }
}

impl Replay {
    fn line(&self, json: &str) -> Vec<Outcome> {
        self.feed.apply(parse_line(json).unwrap()).unwrap()
    }
}

#[test]
fn flapping_connection_is_ban_forwarded() {
    let r = replay();
    r.line(r##"{"type":"names","channel":"#x","members":["@bot"]}"##);

    let mut last = Vec::new();
    for i in 0..3 {
        let join = format!(
            r##"{{"type":"join","channels":"#x","prefix":"alice!u@h1","at":{}}}"##,
            i * 20
        );
        let part = format!(
            r##"{{"type":"part","channel":"#x","prefix":"alice!u@h1","at":{}}}"##,
            i * 20 + 10
        );
        assert_eq!(r.line(&join), vec![Outcome::Clean]);
        last = r.line(&part);
    }

    assert_eq!(
        last,
        vec![Outcome::Flood {
            kind: FloodKind::ConnectionFlap,
            action: Action::Forwarded { mask: "*!*@h1".into() },
        }]
    );
    assert_eq!(
        r.sink.0.lock().unwrap().as_slice(),
        &[ModAction::Mode {
            channel: "#x".into(),
            change: "+b".into(),
            arg: "*!*@h1$#fix_your_connection".into(),
        }]
    );
    // forward nie liczy się do recydywy
    assert_eq!(r.guard.ledger().strikes("h1"), 0);
    assert!(!r.guard.ledger().is_immune("alice"));
}

#[test]
fn quit_fans_out_before_membership_changes() {
    let r = replay();
    r.line(r##"{"type":"names","channel":"#x","members":["@bot","carol"]}"##);
    r.line(r##"{"type":"names","channel":"#y","members":["@bot"]}"##);
    r.line(r##"{"type":"join","channels":"#y","prefix":"carol!c@carol.host","at":1}"##);
    assert!(r.guard.highlights().has_pattern("#y"));

    let out = r.line(r##"{"type":"quit","prefix":"carol!c@carol.host","text":"bye","at":2}"##);
    assert_eq!(out, vec![Outcome::Clean, Outcome::Clean]);
    assert_eq!(r.guard.windows().len(), 2);

    assert!(r.net.channels_of("carol").is_empty());
    assert!(!r.guard.highlights().has_pattern("#x"));
    assert!(!r.guard.highlights().has_pattern("#y"));
}

#[test]
fn voice_granted_by_mode_spares_the_flooder() {
    let r = replay();
    r.line(r##"{"type":"names","channel":"#x","members":["@bot","dave"]}"##);
    r.line(r##"{"type":"mode","channel":"#x","nick":"dave","mode":"+v"}"##);
    assert!(r.net.privileges("#x", "dave").unwrap().voice);

    let mut last = Vec::new();
    for i in 0..5 {
        last = r.line(&format!(
            r##"{{"type":"privmsg","channel":"#x","prefix":"dave!d@h2","text":"msg {i}","at":{i}}}"##
        ));
    }
    assert_eq!(
        last,
        vec![Outcome::Flood {
            kind: FloodKind::Message,
            action: Action::Suppressed(Suppression::Privileged),
        }]
    );
    assert!(r.sink.0.lock().unwrap().is_empty());
}

#[test]
fn nick_change_moves_highlight_pattern() {
    let r = replay();
    r.line(r##"{"type":"names","channel":"#x","members":["@bot","erin"]}"##);
    assert_eq!(r.guard.highlights().count_matches("#x", "hey erin"), 1);

    r.line(r##"{"type":"nick","prefix":"erin!e@h3","new_nick":"erin_away"}"##);
    assert_eq!(r.guard.highlights().count_matches("#x", "hey erin_away"), 1);
    assert_eq!(r.guard.highlights().count_matches("#x", "hey erin"), 0);
}

#[test]
fn bot_leaving_forgets_channel() {
    let r = replay();
    r.line(r##"{"type":"names","channel":"#x","members":["@bot","frank"]}"##);
    r.line(r##"{"type":"kick","channel":"#x","nick":"bot"}"##);
    assert!(!r.guard.highlights().has_pattern("#x"));
    assert!(r.net.members("#x").is_none());
}

#[test]
fn bad_input_is_rejected_without_side_effects() {
    let r = replay();
    r.line(r##"{"type":"names","channel":"#x","members":["@bot"]}"##);

    let neg = parse_line(
        r##"{"type":"privmsg","channel":"#x","prefix":"a!u@h","text":"x","at":-1}"##,
    )
    .unwrap();
    assert!(matches!(r.feed.apply(neg), Err(FloodError::Malformed(_))));

    let huge = parse_line(
        r##"{"type":"privmsg","channel":"#x","prefix":"a!u@h","text":"x","at":1e30}"##,
    )
    .unwrap();
    assert!(matches!(r.feed.apply(huge), Err(FloodError::Malformed(_))));

    let no_host = parse_line(r##"{"type":"privmsg","channel":"#x","prefix":"nohost","text":"x"}"##)
        .unwrap();
    assert!(matches!(r.feed.apply(no_host), Err(FloodError::InvalidHostmask(_))));

    let mode = parse_line(r##"{"type":"mode","channel":"#x","nick":"bot","mode":"o"}"##).unwrap();
    assert!(matches!(r.feed.apply(mode), Err(FloodError::Malformed(_))));

    assert!(r.guard.windows().is_empty());
}

fn privmsg(nick: &str, text: &str, at: f64) -> String {
    format!(
        r##"{{"type":"privmsg","channel":"#x","prefix":"{nick}!u@{nick}.host","text":"{text}","at":{at}}}"##
    )
}

#[test]
fn pruning_uses_event_timestamps_not_uptime() {
    let r = replay();
    r.line(r##"{"type":"names","channel":"#x","members":["@bot","gina","hank"]}"##);

    for i in 0..4 {
        let out = r.line(&privmsg("gina", &format!("m{i}"), 100.0 + i as f64));
        assert_eq!(out, vec![Outcome::Clean]);
    }
    // cykliczne sprzątanie w trakcie serii nie gubi historii
    assert_eq!(r.guard.prune_idle_windows(), 0);
    let out = r.line(&privmsg("gina", "m4", 104.0));
    assert!(matches!(
        out.as_slice(),
        [Outcome::Flood { kind: FloodKind::Message, action: Action::Punished(p) }] if p.kicked
    ));
    assert_eq!(r.guard.ledger().strikes("gina.host"), 1);
}

#[test]
fn pruning_drops_windows_idle_on_absolute_clock() {
    let r = replay();
    r.line(r##"{"type":"names","channel":"#x","members":["@bot","gina","hank"]}"##);

    let epoch = 1_700_000_000.0;
    r.line(&privmsg("gina", "hello", epoch));
    r.line(&privmsg("hank", "hi", epoch + 601.0));
    assert_eq!(r.guard.windows().len(), 2);

    assert_eq!(r.guard.prune_idle_windows(), 1);
    assert_eq!(r.guard.windows().len(), 1);
}
