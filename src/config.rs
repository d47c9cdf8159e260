use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub env: String,
    pub app: App,
    pub network: Network,
    pub logging: Logging,
    pub flood: FloodConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct App {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Network {
    /// Etykieta sieci (logi); jeden silnik = jedna sieć.
    pub name: String,
    /// Własny nick bota.
    pub nick: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logging {
    pub json: Option<bool>,
    pub level: Option<String>,
}

/// Część banmaski zachowywana dosłownie; reszta to `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BanmaskPart {
    /// Cała hostmaska bez gwiazdek.
    Exact,
    Nick,
    User,
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Toggle {
    pub enabled: bool,
    /// Tylko wykrywanie + logi, bez wysyłania kick/ban.
    pub dummy: bool,
}

impl Default for Toggle {
    fn default() -> Self {
        Self { enabled: false, dummy: true }
    }
}

/// Uśpione heurystyki – domyślnie wyłączone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DormantDetectors {
    #[serde(default)]
    pub repetition: Toggle,
    #[serde(default)]
    pub caps: Toggle,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FloodConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Nadpisania per kanał (klucze bez rozróżniania wielkości liter).
    #[serde(default)]
    pub channels: HashMap<String, bool>,
    #[serde(default = "default_forward_channel")]
    pub forward_channel: String,
    #[serde(default = "default_banmask")]
    pub banmask: Vec<BanmaskPart>,
    #[serde(default)]
    pub dormant: DormantDetectors,
    /// glob hostmaski -> uprawnienia (trusted, admin, `#kanal,op`, owner)
    #[serde(default)]
    pub capabilities: HashMap<String, Vec<String>>,
}

fn default_true() -> bool {
    true
}

fn default_forward_channel() -> String {
    "#fix_your_connection".into()
}

fn default_banmask() -> Vec<BanmaskPart> {
    vec![BanmaskPart::Host]
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channels: HashMap::new(),
            forward_channel: default_forward_channel(),
            banmask: default_banmask(),
            dormant: DormantDetectors::default(),
            capabilities: HashMap::new(),
        }
    }
}

impl FloodConfig {
    /// Flaga kanału, a jak jej nie ma – globalna.
    pub fn enabled_for(&self, channel: &str) -> bool {
        self.channels
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(channel))
            .map(|(_, on)| *on)
            .unwrap_or(self.enabled)
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Które środowisko?
        let env = std::env::var("FLOODGUARD_ENV").unwrap_or_else(|_| "development".to_string());

        // Załaduj .env.<env> i .env (jeśli są)
        let _ = dotenvy::from_filename(format!(".env.{}", env));
        let _ = dotenvy::dotenv();

        Self::load_from(Path::new(&format!("config/{}.toml", env)), &env)
    }

    /// Warstwy: domyślne -> plik TOML -> zmienne środowiskowe FLOODGUARD_*
    pub fn load_from(toml: &Path, env: &str) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Self::defaults(env)))
            .merge(Toml::file(toml))
            // FLOODGUARD_FLOOD__FORWARD_CHANNEL => flood.forward_channel itd.
            .merge(Env::prefixed("FLOODGUARD_").split("__").ignore(&["env"]));

        let mut s: Settings = figment.extract()?;
        s.env = env.to_string();

        // pusta lista = nic by nie zostało z maski
        if s.flood.banmask.is_empty() {
            s.flood.banmask = default_banmask();
        }

        Ok(s)
    }

    pub fn defaults(env: &str) -> Self {
        Self {
            env: env.to_string(),
            app: App {
                name: "Tigris FloodGuard".into(),
            },
            network: Network {
                name: "default".into(),
                nick: "floodguard".into(),
            },
            logging: Logging {
                json: Some(false),
                level: Some("info".into()),
            },
            flood: FloodConfig::default(),
        }
    }
}
