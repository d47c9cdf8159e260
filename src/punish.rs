// src/punish.rs
//! Wykonawca kar: ban-forward (flap) albo kick (+ ban dla recydywy),
//! potem aktualizacja rejestru wykroczeń i immunitetu.

use tracing::warn;

use crate::classify::Detection;
use crate::config::BanmaskPart;
use crate::event::{Event, Hostmask};
use crate::ledger::LedgerGuard;
use crate::sink::{ModAction, ModerationSink};
use crate::state::NetworkState;

/// Ban dopiero gdy host ma już więcej niż tyle strike'ów (przed bieżącym).
pub const BAN_AFTER_STRIKES: u32 = 2;

/// Maska bana wg stylu: `exact` = cała hostmaska, w p.p. wymienione części
/// zostają, reszta to `*`.
pub fn make_banmask(hostmask: &Hostmask, style: &[BanmaskPart]) -> String {
    if style.contains(&BanmaskPart::Exact) {
        return hostmask.to_string();
    }
    let keep = |part: BanmaskPart, value: &str| {
        if style.contains(&part) {
            value.to_string()
        } else {
            "*".to_string()
        }
    };
    format!(
        "{}!{}@{}",
        keep(BanmaskPart::Nick, &hostmask.nick),
        keep(BanmaskPart::User, &hostmask.user),
        keep(BanmaskPart::Host, &hostmask.host)
    )
}

/// Co zrobiono w ramach standardowej kary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Punishment {
    /// kick faktycznie wysłany
    pub kicked: bool,
    /// ban faktycznie wysłany
    pub banned: bool,
    /// recydywa – ban należał się (wysłany albo nie, zależnie od dummy)
    pub repeat_offender: bool,
    pub dummy: bool,
    /// licznik hosta po tej karze
    pub strikes: u32,
}

pub struct Executor<'a> {
    pub state: &'a dyn NetworkState,
    pub sink: &'a dyn ModerationSink,
    pub banmask: &'a [BanmaskPart],
}

impl Executor<'_> {
    /// Aktualna hostmaska sprawcy; jak transport jej nie zna – z eventu.
    fn hostmask_for(&self, event: &Event) -> Hostmask {
        self.state
            .hostmask_of(&event.nick)
            .unwrap_or_else(|| event.hostmask())
    }

    /// Ban z przekierowaniem (`+b mask$#kanal`). Nie dotyka rejestru ani immunitetu.
    pub fn ban_forward(&self, event: &Event, target: &str) -> String {
        let mask = make_banmask(&self.hostmask_for(event), self.banmask);
        self.sink.send(ModAction::Mode {
            channel: event.channel.clone(),
            change: "+b".into(),
            arg: format!("{mask}${target}"),
        });
        warn!(
            %mask,
            nick = %event.nick,
            channel = %event.channel,
            %target,
            "ban-forwarded flapping connection"
        );
        mask
    }

    /// Standardowa kara. Wołać pod tym samym lockiem co bramkę.
    pub fn punish(
        &self,
        event: &Event,
        detection: Detection,
        ledger: &mut LedgerGuard<'_>,
    ) -> Punishment {
        let channel = event.channel.as_str();
        let nick = event.nick.as_str();
        let kind = detection.kind.label();
        let dummy = detection.dummy;

        let repeat_offender = ledger.strikes(&event.host) > BAN_AFTER_STRIKES;
        let mut banned = false;
        if repeat_offender {
            let mask = make_banmask(&self.hostmask_for(event), self.banmask);
            if !dummy {
                self.sink.send(ModAction::Ban {
                    channel: channel.to_string(),
                    mask: mask.clone(),
                });
                banned = true;
            }
            warn!(%mask, %nick, %channel, dummy, "banned for repeated flooding");
        }

        if !dummy {
            self.sink.send(ModAction::Kick {
                channel: channel.to_string(),
                nick: nick.to_string(),
                reason: detection.kind.kick_reason(),
            });
        }
        warn!(%nick, %channel, flood = %kind, dummy, "kicked for flooding");

        let strikes = ledger.record_offense(&event.host);
        ledger.immunize(nick);

        Punishment {
            kicked: !dummy,
            banned,
            repeat_offender,
            dummy,
            strikes,
        }
    }
}
