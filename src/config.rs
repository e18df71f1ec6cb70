use std::path::PathBuf;
use std::time::Duration;

use crate::gateway::heartbeat::{CONNECT_TIMEOUT, HEARTBEAT_INTERVAL, INITIAL_BACKOFF, MAX_BACKOFF};
use crate::gateway::session::GatewayConfig;

pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?encoding=json&v=9";
pub const DEFAULT_API_URL: &str = "https://discord.com";
pub const DEFAULT_CDN_URL: &str = "https://cdn.discordapp.com";

pub struct Config {
    pub auth_token: String,
    pub guild_id: String,
    pub channel_id: String,
    pub sounds_dir: PathBuf,
    pub static_dir: PathBuf,
    pub port: u16,
    pub bind: String,
    pub gateway_url: String,
    pub api_url: String,
    pub cdn_url: String,
    pub heartbeat_interval: Duration,
    pub retry_budget: u32,
    pub auto_save: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let auth_token = std::env::var("AUTH_TOKEN").expect("AUTH_TOKEN is required");
        let guild_id =
            std::env::var("SOUNDRELAY_GUILD_ID").expect("SOUNDRELAY_GUILD_ID is required");
        let channel_id =
            std::env::var("SOUNDRELAY_CHANNEL_ID").expect("SOUNDRELAY_CHANNEL_ID is required");

        let sounds_dir = std::env::var("SOUNDS_DIR")
            .ok()
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./sounds"));
        let static_dir = std::env::var("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let heartbeat_interval = std::env::var("SOUNDRELAY_HEARTBEAT_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&secs: &u64| secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(HEARTBEAT_INTERVAL);

        Self {
            auth_token,
            guild_id,
            channel_id,
            sounds_dir,
            static_dir,
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            bind: std::env::var("SOUNDRELAY_BIND").unwrap_or_else(|_| "127.0.0.1".to_string()),
            gateway_url: std::env::var("SOUNDRELAY_GATEWAY_URL")
                .unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string()),
            api_url: std::env::var("SOUNDRELAY_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            cdn_url: std::env::var("SOUNDRELAY_CDN_URL")
                .unwrap_or_else(|_| DEFAULT_CDN_URL.to_string()),
            heartbeat_interval,
            retry_budget: std::env::var("SOUNDRELAY_RETRY_BUDGET")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &u32| n > 0)
                .unwrap_or(5),
            auto_save: std::env::var("SOUNDRELAY_AUTO_SAVE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            url: self.gateway_url.clone(),
            token: self.auth_token.clone(),
            guild_id: self.guild_id.clone(),
            heartbeat_interval: self.heartbeat_interval,
            connect_timeout: CONNECT_TIMEOUT,
            retry_budget: self.retry_budget,
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "AUTH_TOKEN",
            "SOUNDRELAY_GUILD_ID",
            "SOUNDRELAY_CHANNEL_ID",
            "SOUNDS_DIR",
            "STATIC_DIR",
            "PORT",
            "SOUNDRELAY_BIND",
            "SOUNDRELAY_GATEWAY_URL",
            "SOUNDRELAY_API_URL",
            "SOUNDRELAY_CDN_URL",
            "SOUNDRELAY_HEARTBEAT_INTERVAL",
            "SOUNDRELAY_RETRY_BUDGET",
            "SOUNDRELAY_AUTO_SAVE",
        ] {
            std::env::remove_var(var);
        }
    }

    fn set_required() {
        std::env::set_var("AUTH_TOKEN", "tok");
        std::env::set_var("SOUNDRELAY_GUILD_ID", "g1");
        std::env::set_var("SOUNDRELAY_CHANNEL_ID", "c1");
    }

    #[test]
    #[serial]
    fn test_default_config() {
        clear_env();
        set_required();
        let config = Config::from_env();
        assert_eq!(config.auth_token, "tok");
        assert_eq!(config.port, 3000);
        assert_eq!(config.bind, "127.0.0.1");
        assert_eq!(config.sounds_dir, PathBuf::from("./sounds"));
        assert_eq!(config.gateway_url, DEFAULT_GATEWAY_URL);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.retry_budget, 5);
        assert!(config.auto_save);
    }

    #[test]
    #[serial]
    fn test_overrides_from_env() {
        clear_env();
        set_required();
        std::env::set_var("PORT", "8080");
        std::env::set_var("SOUNDS_DIR", "/tmp/sounds");
        std::env::set_var("SOUNDRELAY_HEARTBEAT_INTERVAL", "3");
        std::env::set_var("SOUNDRELAY_RETRY_BUDGET", "2");
        std::env::set_var("SOUNDRELAY_AUTO_SAVE", "false");
        let config = Config::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.sounds_dir, PathBuf::from("/tmp/sounds"));
        assert!(!config.auto_save);

        let gateway = config.gateway();
        assert_eq!(gateway.heartbeat_interval, Duration::from_secs(3));
        assert_eq!(gateway.retry_budget, 2);
        assert_eq!(gateway.guild_id, "g1");
    }

    #[test]
    #[serial]
    fn test_invalid_numbers_fall_back_to_defaults() {
        clear_env();
        set_required();
        std::env::set_var("PORT", "not_a_number");
        std::env::set_var("SOUNDRELAY_RETRY_BUDGET", "0");
        let config = Config::from_env();
        assert_eq!(config.port, 3000);
        assert_eq!(config.retry_budget, 5);
    }

    #[test]
    #[serial]
    #[should_panic(expected = "AUTH_TOKEN is required")]
    fn test_missing_token_panics() {
        clear_env();
        Config::from_env();
    }
}
