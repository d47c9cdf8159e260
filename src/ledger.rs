// src/ledger.rs
//! Rejestr wykroczeń (host -> liczba "strike'ów", z zanikiem) i immunitetów
//! (nick -> krótka ochrona po karze, żeby nie kopać/banować dwa razy).
//!
//! Obie mapy siedzą pod jednym mutexem: sprawdzenie immunitetu, decyzja o banie
//! i inkrementacja muszą być jedną atomową sekwencją względem callbacków zaniku.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, trace};

use crate::scheduler::Scheduler;

/// Co tyle zdejmujemy jeden strike.
pub const DECAY_INTERVAL: Duration = Duration::from_secs(300);
/// Tyle trwa immunitet po karze.
pub const IMMUNITY_WINDOW: Duration = Duration::from_secs(3);

/// Surowy stan. Niezmiennik: host jest w mapie tylko z licznikiem > 0.
#[derive(Debug, Default, Clone)]
pub struct Books {
    offenses: HashMap<String, u32>,
    immune: HashSet<String>,
}

impl Books {
    /// 0 = brak wpisu.
    pub fn strikes(&self, host: &str) -> u32 {
        self.offenses.get(host).copied().unwrap_or(0)
    }

    pub fn is_immune(&self, nick: &str) -> bool {
        self.immune.contains(nick)
    }

    pub fn offenders(&self) -> usize {
        self.offenses.len()
    }

    pub fn immune_count(&self) -> usize {
        self.immune.len()
    }
}

struct Shared {
    books: Mutex<Books>,
    scheduler: Arc<dyn Scheduler>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Books> {
        self.books.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Uchwyt do rejestru. Tani w klonowaniu; callbacki trzymają tylko `Weak`,
/// więc po zrzuceniu silnika nic już nie mutują.
#[derive(Clone)]
pub struct Ledger {
    shared: Arc<Shared>,
}

impl Ledger {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            shared: Arc::new(Shared {
                books: Mutex::new(Books::default()),
                scheduler,
            }),
        }
    }

    /// Zajmuje lock na całą sekwencję check-then-act.
    pub fn lock(&self) -> LedgerGuard<'_> {
        LedgerGuard {
            books: self.shared.lock(),
            shared: &self.shared,
        }
    }

    pub fn strikes(&self, host: &str) -> u32 {
        self.shared.lock().strikes(host)
    }

    pub fn is_immune(&self, nick: &str) -> bool {
        self.shared.lock().is_immune(nick)
    }

    /// Kopia stanu (do logów / testów).
    pub fn snapshot(&self) -> Books {
        self.shared.lock().clone()
    }

    /// Callback zaniku: >1 → -1 i kolejny zanik za DECAY_INTERVAL, inaczej usunięcie.
    pub fn decay(&self, host: &str) {
        decay(&self.shared, host);
    }

    /// Callback wygaśnięcia immunitetu – bezwarunkowo zdejmuje nick.
    pub fn expire_immunity(&self, nick: &str) {
        expire(&self.shared, nick);
    }
}

pub struct LedgerGuard<'a> {
    books: MutexGuard<'a, Books>,
    shared: &'a Arc<Shared>,
}

impl LedgerGuard<'_> {
    pub fn strikes(&self, host: &str) -> u32 {
        self.books.strikes(host)
    }

    pub fn is_immune(&self, nick: &str) -> bool {
        self.books.is_immune(nick)
    }

    /// Dolicza strike i zwraca nowy licznik. Zanik planujemy tylko przy
    /// zakładaniu wpisu – to zastępuje anulowanie timerów.
    pub fn record_offense(&mut self, host: &str) -> u32 {
        if !self.books.offenses.contains_key(host) {
            schedule_decay(self.shared, host.to_string());
        }
        let count = self.books.offenses.entry(host.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Zakłada immunitet i planuje jego wygaśnięcie.
    pub fn immunize(&mut self, nick: &str) {
        if self.books.immune.insert(nick.to_string()) {
            schedule_expiry(self.shared, nick.to_string());
        }
    }
}

fn schedule_decay(shared: &Arc<Shared>, host: String) {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    shared.scheduler.schedule_after(
        DECAY_INTERVAL,
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                decay(&shared, &host);
            }
        }),
    );
}

fn schedule_expiry(shared: &Arc<Shared>, nick: String) {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    shared.scheduler.schedule_after(
        IMMUNITY_WINDOW,
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                expire(&shared, &nick);
            }
        }),
    );
}

fn decay(shared: &Arc<Shared>, host: &str) {
    let mut books = shared.lock();
    match books.offenses.get_mut(host) {
        Some(count) if *count > 1 => {
            *count -= 1;
            debug!(%host, strikes = *count, "offense decayed");
            schedule_decay(shared, host.to_string());
        }
        Some(_) => {
            books.offenses.remove(host);
            debug!(%host, "offense record cleared");
        }
        None => trace!(%host, "decay for unknown host"),
    }
}

fn expire(shared: &Arc<Shared>, nick: &str) {
    if shared.lock().immune.remove(nick) {
        trace!(%nick, "immunity expired");
    }
}
