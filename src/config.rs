use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub time: TimeConfig,
    pub sweep: SweepConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin allowed by CORS. "*" allows any origin (the legacy deployment
    /// served the admin panel from a separate host and allowed everything).
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    /// Language for outbound bot messages ("ru" or "en").
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeConfig {
    /// Offset in hours of the operations team's home timezone from true UTC.
    /// Stored canonical instants are anchored to this offset; "now" inside the
    /// sweeps is computed against it. Defaults to 3 (Moscow).
    pub home_offset_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    /// Interval of the report and report-periodic sweeps (seconds).
    pub report_interval_seconds: u64,
    /// Interval of the one-shot reminder sweep (seconds).
    pub reminder_interval_seconds: u64,
    /// Interval of the periodic-event sweep (seconds).
    pub periodic_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for the event-mutation endpoints.
    pub events_per_second: u32,
    /// Burst size for the event-mutation endpoints.
    pub events_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL").unwrap_or_else(|_| "*".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/studio.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            telegram: TelegramConfig {
                bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
                language: env::var("BOT_LANGUAGE").unwrap_or_else(|_| "ru".to_string()),
            },
            time: TimeConfig {
                home_offset_hours: env::var("TIME_HOME_OFFSET_HOURS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("TIME_HOME_OFFSET_HOURS".to_string()))?,
            },
            sweep: SweepConfig {
                report_interval_seconds: env::var("SWEEP_REPORT_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "10800".to_string())
                    .parse()
                    .unwrap_or(10800),
                reminder_interval_seconds: env::var("SWEEP_REMINDER_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
                periodic_interval_seconds: env::var("SWEEP_PERIODIC_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
            },
            rate_limit: RateLimitConfig {
                events_per_second: env::var("RATE_LIMIT_EVENTS_PER_SECOND")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                events_burst: env::var("RATE_LIMIT_EVENTS_BURST")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "*".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/studio.db".to_string(),
                max_connections: 5,
            },
            telegram: TelegramConfig {
                bot_token: None,
                language: "ru".to_string(),
            },
            time: TimeConfig {
                home_offset_hours: 3,
            },
            sweep: SweepConfig {
                report_interval_seconds: 10800,
                reminder_interval_seconds: 60,
                periodic_interval_seconds: 60,
            },
            rate_limit: RateLimitConfig {
                events_per_second: 5,
                events_burst: 20,
            },
        }
    }
}
