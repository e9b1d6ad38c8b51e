use std::{env, net::SocketAddr};

use chrono::NaiveTime;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub listen_addr: SocketAddr,
    /// Local time of day at which the daily sweep runs.
    pub sweep_at: NaiveTime,
    pub sweep_on_startup: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://tripj.db".to_string());

        let max_connections: u32 = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid DATABASE_MAX_CONNECTIONS: {err}")))?;
        if max_connections == 0 {
            return Err(AppError::Config(
                "DATABASE_MAX_CONNECTIONS must be at least 1".into(),
            ));
        }

        let listen_addr: SocketAddr = lookup("APP_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let sweep_at = lookup("SWEEP_AT")
            .map(|raw| {
                NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                    .map_err(|err| AppError::Config(format!("invalid SWEEP_AT {raw:?}: {err}")))
            })
            .transpose()?
            .unwrap_or(NaiveTime::MIN);

        let sweep_on_startup = match lookup("SWEEP_ON_STARTUP") {
            None => true,
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| AppError::Config(format!("invalid SWEEP_ON_STARTUP: {raw:?}")))?,
        };

        Ok(Self {
            database_url,
            max_connections,
            listen_addr,
            sweep_at,
            sweep_on_startup,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite://tripj.db");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.sweep_at, NaiveTime::MIN);
        assert!(config.sweep_on_startup);
    }

    #[test]
    fn reads_sweep_settings() {
        let config = config_from(&[("SWEEP_AT", "03:30"), ("SWEEP_ON_STARTUP", "off")]).unwrap();
        assert_eq!(config.sweep_at, NaiveTime::from_hms_opt(3, 30, 0).unwrap());
        assert!(!config.sweep_on_startup);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config_from(&[("SWEEP_AT", "25:00")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("APP_LISTEN_ADDR", "nowhere")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("DATABASE_MAX_CONNECTIONS", "0")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("SWEEP_ON_STARTUP", "maybe")]),
            Err(AppError::Config(_))
        ));
    }
}
