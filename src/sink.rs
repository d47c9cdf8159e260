// src/sink.rs
//! Wyjście silnika: komendy moderacyjne typu fire-and-forget.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ModAction {
    /// `MODE <channel> +b <mask>`
    Ban { channel: String, mask: String },
    Kick {
        channel: String,
        nick: String,
        reason: String,
    },
    /// Dowolna zmiana trybu z argumentem (np. ban-forward `+b mask$#kanal`).
    Mode {
        channel: String,
        change: String,
        arg: String,
    },
}

impl ModAction {
    pub fn channel(&self) -> &str {
        match self {
            ModAction::Ban { channel, .. }
            | ModAction::Kick { channel, .. }
            | ModAction::Mode { channel, .. } => channel,
        }
    }
}

/// Transport wysyłający komendy. Brak ponowień – zgubiona komenda jest tylko logowana.
pub trait ModerationSink: Send + Sync {
    fn send(&self, action: ModAction);
}

/// Sink na kanale tokio; drugi koniec czyta writer w `run`.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<ModAction>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<ModAction>) -> Self {
        Self { tx }
    }
}

impl ModerationSink for ChannelSink {
    fn send(&self, action: ModAction) {
        if let Err(e) = self.tx.send(action) {
            warn!(action=?e.0, "moderation command dropped (sink closed)");
        }
    }
}
