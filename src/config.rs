use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database; unset only in dev, where the in-memory store is used
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Redis event relay
    pub redis_url: Option<String>,
    pub redis_events_channel: String,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Auth
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,

    // Realtime
    pub ws_broadcast_capacity: usize,
    pub ws_ping_interval_seconds: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database
        let database_url = non_empty("DATABASE_URL");
        if database_url.is_none() && !env.is_dev() {
            bail!("DATABASE_URL must be set");
        }
        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        // Redis
        let redis_url = non_empty("REDIS_URL");
        let redis_events_channel = env::var("REDIS_EVENTS_CHANNEL")
            .unwrap_or_else(|_| "homeservices:events".to_string());

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Auth
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = non_empty("JWT_ISSUER");

        // Realtime
        let ws_broadcast_capacity = env::var("WS_BROADCAST_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1024);
        let ws_ping_interval_seconds = env::var("WS_PING_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            redis_url,
            redis_events_channel,
            cors_allow_origins,
            jwt_secret,
            jwt_issuer,
            ws_broadcast_capacity,
            ws_ping_interval_seconds,
        })
    }

    /// Dev settings with no database or relay, used by tests and local runs
    pub fn local(jwt_secret: impl Into<String>) -> Self {
        Self {
            env: Environment::Dev,
            server_addr: "127.0.0.1:0".to_string(),
            database_url: None,
            database_max_connections: 10,
            redis_url: None,
            redis_events_channel: "homeservices:events".to_string(),
            cors_allow_origins: vec!["http://localhost:3000".to_string()],
            jwt_secret: jwt_secret.into(),
            jwt_issuer: None,
            ws_broadcast_capacity: 1024,
            ws_ping_interval_seconds: 30,
        }
    }

    pub fn ws_ping_interval(&self) -> Duration {
        Duration::from_secs(self.ws_ping_interval_seconds.max(1))
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing() {
        assert_eq!(Environment::from_str("production"), Environment::Prod);
        assert_eq!(Environment::from_str("PROD"), Environment::Prod);
        assert_eq!(Environment::from_str("staging"), Environment::Staging);
        assert_eq!(Environment::from_str("anything"), Environment::Dev);
    }

    #[test]
    fn local_settings_use_memory_store() {
        let settings = Settings::local("secret");
        assert!(settings.env.is_dev());
        assert!(settings.database_url.is_none());
        assert!(settings.redis_url.is_none());
        assert_eq!(settings.ws_ping_interval(), Duration::from_secs(30));
    }
}
