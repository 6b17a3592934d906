use std::{collections::HashMap, fs, time::Duration};

use server_api::upstream::{UpstreamConfig, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub upstream_base_url: String,
    pub upstream_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "0.0.0.0:3000".into(),
            upstream_base_url: DEFAULT_BASE_URL.into(),
            upstream_timeout_ms: 10_000,
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

impl Settings {
    pub fn upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            base_url: self.upstream_base_url.clone(),
            timeout: Duration::from_millis(self.upstream_timeout_ms),
            user_agent: self.user_agent.clone(),
        }
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string("server.toml").ok();
    load_settings_from(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then `server.toml`, then the environment. Later sources win.
pub fn load_settings_from(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
            if let Some(v) = file_cfg.get("bind_addr") {
                settings.server_bind = v.clone();
            }
            if let Some(v) = file_cfg.get("upstream_base_url") {
                settings.upstream_base_url = v.clone();
            }
            if let Some(v) = file_cfg.get("upstream_timeout_ms") {
                if let Ok(parsed) = v.parse::<u64>() {
                    settings.upstream_timeout_ms = parsed;
                }
            }
            if let Some(v) = file_cfg.get("user_agent") {
                settings.user_agent = v.clone();
            }
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("KOPIS_BASE_URL") {
        settings.upstream_base_url = v;
    }
    if let Some(v) = env("APP__UPSTREAM_BASE_URL") {
        settings.upstream_base_url = v;
    }

    if let Some(v) = env("APP__UPSTREAM_TIMEOUT_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.upstream_timeout_ms = parsed;
        }
    }

    if let Some(v) = env("APP__USER_AGENT") {
        settings.user_agent = v;
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
