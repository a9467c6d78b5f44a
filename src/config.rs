// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : venue_session — callback-driven futures venue session adapter
Module  : config.rs

Summary : Drives the venue handshake, reconciles order/trade pushes into an
          ordered deduplicated stream, aggregates position query rounds,
          exposes Prometheus metrics, and records JSONL events.
=============================================================================
*/
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::handshake::ThrottleMode;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub gateway_name: String,

    // credentials
    pub user_id: String,
    pub password: String,
    pub broker_id: String,
    pub app_id: String,
    pub auth_code: String, // kosong = tanpa langkah authenticate

    // fronts
    pub td_address: String,
    pub md_address: String,

    // instrument query throttle
    pub throttle_mode: ThrottleMode,
    pub query_backoff: Duration,

    // periodic account/position polling
    pub timer_interval: Duration,
    pub query_every_n_ticks: u32,

    pub symbols: Vec<String>,
    pub record_file: Option<String>,
    pub metrics_port: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gateway_name: "CTP".to_string(),
            user_id: String::new(),
            password: String::new(),
            broker_id: String::new(),
            app_id: String::new(),
            auth_code: String::new(),
            td_address: String::new(),
            md_address: String::new(),
            throttle_mode: ThrottleMode::Blocking,
            query_backoff: Duration::from_secs(1),
            timer_interval: Duration::from_secs(1),
            query_every_n_ticks: 2,
            symbols: Vec::new(),
            record_file: None,
            metrics_port: 9898,
        }
    }
}

impl SessionConfig {
    pub fn auth_required(&self) -> bool { !self.auth_code.is_empty() }
}

/// Front addresses without a scheme default to plain tcp.
pub fn normalize_address(address: &str) -> String {
    if address.starts_with("tcp://") || address.starts_with("ssl://") || address.starts_with("socks") {
        address.to_string()
    } else {
        format!("tcp://{address}")
    }
}

pub fn parse_throttle_mode(raw: &str) -> Option<ThrottleMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "blocking" | "block" => Some(ThrottleMode::Blocking),
        "scheduled" | "timer" => Some(ThrottleMode::Scheduled),
        _ => None,
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

pub fn load() -> SessionConfig {
    // Pastikan .env dibaca
    let _ = dotenv();
    let defaults = SessionConfig::default();

    // SYMBOLS=rb2405,cu2405 (venue symbols are case sensitive, keep as given)
    let symbols: Vec<String> = env::var("SYMBOLS")
        .ok()
        .map(|s| {
            s.split(',')
                .map(|x| x.trim())
                .filter(|x| !x.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let throttle_mode = env::var("THROTTLE_MODE")
        .ok()
        .and_then(|s| parse_throttle_mode(&s))
        .unwrap_or(defaults.throttle_mode);

    SessionConfig {
        gateway_name: env_or("GATEWAY_NAME", &defaults.gateway_name),
        user_id: env_or("USER_ID", ""),
        password: env_or("PASSWORD", ""),
        broker_id: env_or("BROKER_ID", ""),
        app_id: env_or("APP_ID", ""),
        auth_code: env_or("AUTH_CODE", ""),
        td_address: normalize_address(&env_or("TD_ADDRESS", "127.0.0.1:10201")),
        md_address: normalize_address(&env_or("MD_ADDRESS", "127.0.0.1:10211")),
        throttle_mode,
        query_backoff: Duration::from_millis(env_parse("QUERY_BACKOFF_MS", 1000)),
        timer_interval: Duration::from_millis(env_parse("TIMER_MS", 1000)),
        query_every_n_ticks: env_parse("QUERY_EVERY_N_TICKS", defaults.query_every_n_ticks).max(1),
        symbols,
        record_file: env::var("RECORD_FILE").ok().filter(|s| !s.is_empty()),
        metrics_port: env_parse("METRICS_PORT", defaults.metrics_port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("180.168.146.187:10201", "tcp://180.168.146.187:10201")]
    #[case("tcp://10.0.0.1:1", "tcp://10.0.0.1:1")]
    #[case("ssl://10.0.0.1:1", "ssl://10.0.0.1:1")]
    #[case("socks5://proxy:1080", "socks5://proxy:1080")]
    fn addresses_get_a_scheme(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_address(raw), expected);
    }

    #[test]
    fn throttle_mode_names() {
        assert_eq!(parse_throttle_mode("Scheduled"), Some(ThrottleMode::Scheduled));
        assert_eq!(parse_throttle_mode(" blocking "), Some(ThrottleMode::Blocking));
        assert_eq!(parse_throttle_mode("later"), None);
    }

    #[test]
    fn auth_step_only_with_code() {
        let mut cfg = SessionConfig::default();
        assert!(!cfg.auth_required());
        cfg.auth_code = "0000000000000000".into();
        assert!(cfg.auth_required());
    }
}
