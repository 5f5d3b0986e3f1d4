//! Runtime configuration: defaults, then $XDG_CONFIG_HOME/pulsegrid/config.json
//! (fallback ~/.config/pulsegrid/config.json), then PULSEGRID_* env vars, then CLI flags.

use std::{fs, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::loader::DEFAULT_HISTORY_LIMIT;
use crate::store::{BackfillPolicy, DEFAULT_WINDOW};
use crate::ws::FeedConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ws_url: String,
    pub api_url: String,
    pub history_limit: usize,
    pub window: usize,
    pub reconnect_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub backfill: BackfillPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080/ws".into(),
            api_url: "http://localhost:8080".into(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            window: DEFAULT_WINDOW,
            reconnect_delay_ms: 3000,
            reconnect_max_delay_ms: 3000,
            backfill: BackfillPolicy::Replace,
        }
    }
}

/// Values given on the command line; `None` keeps the lower layer's value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub ws_url: Option<String>,
    pub api_url: Option<String>,
    pub history_limit: Option<usize>,
    pub window: Option<usize>,
    pub reconnect_delay_ms: Option<u64>,
    pub merge_backfill: bool,
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("pulsegrid")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulsegrid")
    }
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Read the config file; a missing or unreadable file yields defaults.
pub fn load_file() -> Config {
    match fs::read_to_string(config_path()) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring malformed config file");
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}

pub fn save_file(cfg: &Config) -> Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(cfg)?;
    fs::write(path, data)?;
    Ok(())
}

impl Config {
    /// File, then environment, then CLI.
    pub fn resolve(cli: &Overrides) -> Self {
        let mut cfg = load_file();
        cfg.apply_env(|k| std::env::var(k).ok());
        cfg.apply_overrides(cli);
        cfg.normalize();
        cfg
    }

    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, get: F) {
        if let Some(v) = get("PULSEGRID_WS_URL").filter(|v| !v.is_empty()) {
            self.ws_url = v;
        }
        if let Some(v) = get("PULSEGRID_API_URL").filter(|v| !v.is_empty()) {
            self.api_url = v;
        }
        if let Some(v) = get("PULSEGRID_HISTORY_LIMIT").and_then(|v| v.parse().ok()) {
            self.history_limit = v;
        }
        if let Some(v) = get("PULSEGRID_WINDOW").and_then(|v| v.parse().ok()) {
            self.window = v;
        }
        if let Some(v) = get("PULSEGRID_RECONNECT_MS").and_then(|v| v.parse().ok()) {
            self.reconnect_delay_ms = v;
        }
    }

    pub fn apply_overrides(&mut self, o: &Overrides) {
        if let Some(v) = &o.ws_url {
            self.ws_url = v.clone();
        }
        if let Some(v) = &o.api_url {
            self.api_url = v.clone();
        }
        if let Some(v) = o.history_limit {
            self.history_limit = v;
        }
        if let Some(v) = o.window {
            self.window = v;
        }
        if let Some(v) = o.reconnect_delay_ms {
            self.reconnect_delay_ms = v;
        }
        if o.merge_backfill {
            self.backfill = BackfillPolicy::Merge;
        }
    }

    fn normalize(&mut self) {
        self.window = self.window.max(1);
        self.history_limit = self.history_limit.max(1);
        self.reconnect_max_delay_ms = self.reconnect_max_delay_ms.max(self.reconnect_delay_ms);
    }

    pub fn validate(&self) -> Result<()> {
        check_scheme(&self.ws_url, &["ws", "wss"], "live feed")?;
        check_scheme(&self.api_url, &["http", "https"], "history API")?;
        Ok(())
    }

    pub fn feed(&self) -> FeedConfig {
        FeedConfig {
            url: self.ws_url.clone(),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            reconnect_max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
        }
    }
}

fn check_scheme(raw: &str, allowed: &[&str], what: &'static str) -> Result<()> {
    let url = Url::parse(raw)?;
    if allowed.contains(&url.scheme()) {
        Ok(())
    } else {
        Err(Error::Scheme {
            scheme: url.scheme().to_string(),
            what,
        })
    }
}
