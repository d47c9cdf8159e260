// src/lib.rs

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod feed;
pub mod gate;
pub mod highlight;
pub mod ledger;
pub mod logging;
pub mod punish;
pub mod scheduler;
pub mod sink;
pub mod state;
pub mod window;

pub use crate::engine::{Collaborators, FloodGuard, Outcome};
pub use crate::error::FloodError;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::FutureExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, warn};

use config::Settings;
use feed::Feed;
use scheduler::TokioScheduler;
use sink::{ChannelSink, ModAction};
use state::{MemoryNetwork, StaticCapabilities};

/// Co ile sprzątamy bezczynne okna.
const PRUNE_EVERY: Duration = Duration::from_secs(60);

/// Globalny kontekst aplikacji: konfiguracja, stan sieci i silnik.
pub struct AppContext {
    pub settings: Settings,
    pub network: Arc<MemoryNetwork>,
    pub guard: Arc<FloodGuard>,
    /// Drugi koniec sinka – zabiera go writer w `run` (tylko raz).
    actions: Mutex<Option<UnboundedReceiver<ModAction>>>,
}

impl AppContext {
    /// Bootstrap całej aplikacji:
    /// - logi
    /// - stan sieci + wyrocznia uprawnień z konfiguracji
    /// - silnik z timerem tokio i sinkiem na kanale
    pub async fn bootstrap(settings: Settings) -> Result<Arc<Self>> {
        // 1) logi
        logging::init(&settings);

        // 2) współpracownicy
        let network = Arc::new(MemoryNetwork::new(settings.network.nick.clone()));
        let caps = Arc::new(StaticCapabilities::from_map(&settings.flood.capabilities));
        let scheduler = Arc::new(TokioScheduler::current()?);
        let (tx, rx) = mpsc::unbounded_channel();

        // 3) silnik
        let guard = Arc::new(FloodGuard::new(
            settings.network.name.clone(),
            settings.flood.clone(),
            Collaborators {
                state: network.clone(),
                caps,
                sink: Arc::new(ChannelSink::new(tx)),
                scheduler,
            },
        ));

        info!(
            app = %settings.app.name,
            env = %settings.env,
            network = %settings.network.name,
            nick = %settings.network.nick,
            "floodguard ready"
        );

        Ok(Arc::new(Self {
            settings,
            network,
            guard,
            actions: Mutex::new(Some(rx)),
        }))
    }
}

/// Czyta zdarzenia (JSON lines) ze stdin, komendy moderacyjne pisze na stdout.
/// Kończy się na EOF.
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    let Some(rx) = ctx.actions.lock().await.take() else {
        anyhow::bail!("run() already started for this context");
    };
    let writer = tokio::spawn(write_actions(rx));

    spawn_prune_task(&ctx.guard);

    let feed = Feed::new(ctx.network.clone(), ctx.guard.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut lineno = 0usize;

    while let Some(line) = lines.next_line().await? {
        lineno += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let msg = match feed::parse_line(line) {
            Ok(m) => m,
            Err(e) => {
                warn!(lineno, error = %e, "skipping input line");
                continue;
            }
        };

        // panika w jednym evencie nie może zabić całej pętli
        let result = AssertUnwindSafe(async { feed.apply(msg) }).catch_unwind().await;
        match result {
            Ok(Ok(outcomes)) => debug!(lineno, ?outcomes, "applied"),
            Ok(Err(e)) => warn!(lineno, error = %e, "input rejected"),
            Err(_) => error!(lineno, "panic while handling input line"),
        }
    }

    info!(lines = lineno, "input closed, shutting down");

    // silnik trzyma nadawcę sinka – bez niego writer dostanie None
    drop(feed);
    drop(ctx);
    if let Err(e) = writer.await {
        error!(error = %e, "writer task failed");
    }
    Ok(())
}

/// Writer: każda komenda jako jedna linia JSON z `sent_at`.
async fn write_actions(mut rx: UnboundedReceiver<ModAction>) {
    let mut out = tokio::io::stdout();
    while let Some(action) = rx.recv().await {
        let mut value = match serde_json::to_value(&action) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, ?action, "cannot serialize action");
                continue;
            }
        };
        if let Some(obj) = value.as_object_mut() {
            obj.insert("sent_at".into(), chrono::Utc::now().to_rfc3339().into());
        }
        let line = format!("{value}\n");
        if let Err(e) = out.write_all(line.as_bytes()).await {
            error!(error = %e, "stdout closed");
            break;
        }
        if let Err(e) = out.flush().await {
            error!(error = %e, "stdout flush failed");
            break;
        }
    }
}

fn spawn_prune_task(guard: &Arc<FloodGuard>) {
    let weak = Arc::downgrade(guard);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_EVERY);
        loop {
            interval.tick().await;
            if let Some(strong) = weak.upgrade() {
                // znaczniki mogą pochodzić z `at` – nie z zegara procesu
                strong.prune_idle_windows();
            } else {
                break;
            }
        }
    });
}
