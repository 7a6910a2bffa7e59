use serde::Deserialize;

/// Top-level server configuration, loaded from `flock.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub web_root: String,
    pub limits: LimitsConfig,
    pub rooms: RoomsConfig,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            web_root: "web".to_string(),
            limits: LimitsConfig::default(),
            rooms: RoomsConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes, rate limits).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    pub ws_rate_limit_per_sec: f64,
    pub player_message_buffer: usize,
    pub chat_max_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 200,
            ws_rate_limit_per_sec: 50.0,
            player_message_buffer: 256,
            chat_max_len: 1024,
        }
    }
}

/// Room lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub idle_timeout_secs: u64,
    pub idle_check_interval_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 3600,
            idle_check_interval_secs: 60,
        }
    }
}

/// Game session spawning configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path to the session binary launched per room.
    pub bin_path: String,
    /// Inclusive port range sessions are assigned from.
    pub port_range_start: u16,
    pub port_range_end: u16,
    /// Fresh-port attempts per launch before giving up.
    pub launch_retries: u32,
    /// High-score store file handed to each session.
    pub scores_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bin_path: "flock-session".to_string(),
            port_range_start: 42000,
            port_range_end: 42999,
            launch_retries: 3,
            scores_path: "flock-scores.json".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate configuration, logging warnings for issues.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::error!(
                addr = %self.listen_addr,
                "listen_addr is not a valid socket address"
            );
            std::process::exit(1);
        }

        if self.limits.max_ws_connections == 0 {
            tracing::error!("limits.max_ws_connections must be > 0");
            std::process::exit(1);
        }
        if self.limits.ws_rate_limit_per_sec <= 0.0 {
            tracing::error!("limits.ws_rate_limit_per_sec must be > 0");
            std::process::exit(1);
        }
        if self.limits.player_message_buffer == 0 {
            tracing::error!("limits.player_message_buffer must be > 0");
            std::process::exit(1);
        }
        if self.limits.chat_max_len == 0 {
            tracing::error!("limits.chat_max_len must be > 0");
            std::process::exit(1);
        }

        if self.rooms.idle_timeout_secs == 0 {
            tracing::error!("rooms.idle_timeout_secs must be > 0");
            std::process::exit(1);
        }
        if self.rooms.idle_check_interval_secs == 0 {
            tracing::error!("rooms.idle_check_interval_secs must be > 0");
            std::process::exit(1);
        }

        if self.session.port_range_start > self.session.port_range_end {
            tracing::error!(
                start = self.session.port_range_start,
                end = self.session.port_range_end,
                "session.port_range_start must be <= session.port_range_end"
            );
            std::process::exit(1);
        }
        if self.session.launch_retries == 0 {
            tracing::error!("session.launch_retries must be > 0");
            std::process::exit(1);
        }
        if self.session.bin_path.is_empty() {
            tracing::error!("session.bin_path must not be empty");
            std::process::exit(1);
        }
    }

    /// Load config from `flock.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("flock.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from flock.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse flock.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No flock.toml found, using defaults");
                ServerConfig::default()
            },
        };

        // Environment variable overrides
        if let Ok(addr) = std::env::var("FLOCK_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(root) = std::env::var("FLOCK_WEB_ROOT")
            && !root.is_empty()
        {
            config.web_root = root;
        }
        if let Ok(bin) = std::env::var("FLOCK_SESSION_BIN")
            && !bin.is_empty()
        {
            config.session.bin_path = bin;
        }
        if let Ok(path) = std::env::var("FLOCK_SCORES_PATH")
            && !path.is_empty()
        {
            config.session.scores_path = path;
        }
        if let Ok(val) = std::env::var("FLOCK_MAX_WS_CONNECTIONS")
            && let Ok(n) = val.parse::<usize>()
        {
            config.limits.max_ws_connections = n;
        }
        if let Ok(val) = std::env::var("FLOCK_WS_RATE_LIMIT")
            && let Ok(n) = val.parse::<f64>()
        {
            config.limits.ws_rate_limit_per_sec = n;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.web_root, "web");
        assert_eq!(cfg.session.bin_path, "flock-session");
        assert!(cfg.session.port_range_start < cfg.session.port_range_end);
    }

    #[test]
    fn parse_minimal_toml() {
        let toml_str = r#"
listen_addr = "127.0.0.1:9090"
web_root = "/var/www"
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9090");
        assert_eq!(cfg.web_root, "/var/www");
        // Untouched sections keep their defaults
        assert_eq!(cfg.limits.max_ws_connections, 200);
    }

    #[test]
    fn parse_session_toml() {
        let toml_str = r#"
[session]
bin_path = "/usr/local/bin/flock-session"
port_range_start = 50000
port_range_end = 50100
launch_retries = 5
scores_path = "/var/lib/flock/scores.json"
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.session.bin_path, "/usr/local/bin/flock-session");
        assert_eq!(cfg.session.port_range_start, 50000);
        assert_eq!(cfg.session.port_range_end, 50100);
        assert_eq!(cfg.session.launch_retries, 5);
        assert_eq!(cfg.session.scores_path, "/var/lib/flock/scores.json");
    }

    #[test]
    fn parse_limits_toml() {
        let toml_str = r#"
[limits]
max_ws_connections = 500
ws_rate_limit_per_sec = 100.0
player_message_buffer = 512
chat_max_len = 256

[rooms]
idle_timeout_secs = 7200
idle_check_interval_secs = 120
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.limits.max_ws_connections, 500);
        assert!((cfg.limits.ws_rate_limit_per_sec - 100.0).abs() < f64::EPSILON);
        assert_eq!(cfg.limits.player_message_buffer, 512);
        assert_eq!(cfg.limits.chat_max_len, 256);
        assert_eq!(cfg.rooms.idle_timeout_secs, 7200);
        assert_eq!(cfg.rooms.idle_check_interval_secs, 120);
    }

    #[test]
    fn validate_accepts_valid_config() {
        let cfg = ServerConfig::default();
        cfg.validate();
    }

    #[test]
    fn validate_rejects_invalid_addr() {
        let cfg = ServerConfig {
            listen_addr: "not-an-address".to_string(),
            ..ServerConfig::default()
        };
        // validate() calls process::exit, so we test the underlying check
        assert!(cfg.listen_addr.parse::<std::net::SocketAddr>().is_err());
    }

    #[test]
    fn inverted_port_range_detected() {
        let cfg = ServerConfig {
            session: SessionConfig {
                port_range_start: 43000,
                port_range_end: 42000,
                ..SessionConfig::default()
            },
            ..ServerConfig::default()
        };
        assert!(cfg.session.port_range_start > cfg.session.port_range_end);
    }
}
