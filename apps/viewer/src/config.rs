use std::{fs, time::Duration};

use client_core::{ListMode, SyncOptions};
use serde::Deserialize;
use tracing::warn;

/// The server rejects nothing above this; it silently caps `limit`.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    pub page_size: usize,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub live_status_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".into(),
            page_size: 50,
            poll_interval_secs: 5,
            request_timeout_secs: 10,
            live_status_interval_secs: 5,
        }
    }
}

impl Settings {
    pub fn sync_options(&self, mode: ListMode) -> SyncOptions {
        let base = match mode {
            ListMode::Leaderboard => SyncOptions::leaderboard(),
            ListMode::Search => SyncOptions::search(),
        };
        base.with_page_size(self.page_size)
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs.max(1)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn live_status_interval(&self) -> Duration {
        Duration::from_secs(self.live_status_interval_secs.max(1))
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_url: Option<String>,
    page_size: Option<usize>,
    poll_interval_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    live_status_interval_secs: Option<u64>,
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string("viewer.toml").ok();
    resolve_settings(file.as_deref(), |key| std::env::var(key).ok())
}

/// Layers `viewer.toml` contents and then environment values over the defaults.
pub fn resolve_settings<F>(file: Option<&str>, env: F) -> Settings
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = Settings::default();

    if let Some(raw) = file {
        match toml::from_str::<FileSettings>(raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.api_url {
                    settings.api_url = v;
                }
                if let Some(v) = file_cfg.page_size {
                    settings.page_size = v;
                }
                if let Some(v) = file_cfg.poll_interval_secs {
                    settings.poll_interval_secs = v;
                }
                if let Some(v) = file_cfg.request_timeout_secs {
                    settings.request_timeout_secs = v;
                }
                if let Some(v) = file_cfg.live_status_interval_secs {
                    settings.live_status_interval_secs = v;
                }
            }
            Err(err) => warn!("ignoring unreadable viewer.toml: {err}"),
        }
    }

    if let Some(v) = env("LEADERBOARD_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = parse_env(&env, "APP__PAGE_SIZE") {
        settings.page_size = v;
    }
    if let Some(v) = parse_env(&env, "APP__POLL_INTERVAL_SECS") {
        settings.poll_interval_secs = v;
    }
    if let Some(v) = parse_env(&env, "APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = parse_env(&env, "APP__LIVE_STATUS_INTERVAL_SECS") {
        settings.live_status_interval_secs = v;
    }

    let page_size = settings.page_size;
    settings.set_page_size(page_size);
    settings
}

fn parse_env<F, T>(env: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = env(key)?;
    match raw.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %raw, "ignoring non-numeric setting");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
