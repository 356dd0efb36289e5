use std::time::Duration;

/// Error raised when an environment variable holds an unusable value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Interval between keep-alive pings on observer sockets (default: `30`).
    pub ws_ping_interval_secs: u64,
    /// Buffer size of the task change feed (default: `1024`).
    pub event_bus_capacity: usize,
    /// Converter executable (default: `easyeda2kicad`).
    pub converter_program: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `HOST`                  | `0.0.0.0`               |
    /// | `PORT`                  | `3000`                  |
    /// | `CORS_ORIGINS`          | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                    |
    /// | `WS_PING_INTERVAL_SECS` | `30`                    |
    /// | `EVENT_BUS_CAPACITY`    | `1024`                  |
    /// | `CONVERTER_PROGRAM`     | `easyeda2kicad`         |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_var(&lookup, "PORT", 3000u16)?;

        let cors_origins: Vec<String> = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = parse_var(&lookup, "REQUEST_TIMEOUT_SECS", 30u64)?;
        let ws_ping_interval_secs = parse_var(&lookup, "WS_PING_INTERVAL_SECS", 30u64)?;
        if ws_ping_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "WS_PING_INTERVAL_SECS",
                value: "0".into(),
            });
        }
        let event_bus_capacity = parse_var(
            &lookup,
            "EVENT_BUS_CAPACITY",
            partbridge_events::bus::DEFAULT_CAPACITY,
        )?;

        let converter_program = lookup("CONVERTER_PROGRAM")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| partbridge_converter::cli::DEFAULT_PROGRAM.into());

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            ws_ping_interval_secs,
            event_bus_capacity,
            converter_program,
        })
    }

    pub fn ws_ping_interval(&self) -> Duration {
        Duration::from_secs(self.ws_ping_interval_secs)
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
