use std::{env, fmt, net::SocketAddr};

use super::{
    env_non_empty, server_bind_address, DEFAULT_DATABASE_URL, DEFAULT_FRONTEND_URL,
    DEFAULT_LAN_ORIGIN,
};

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    /// Only the exact value `production` selects the production policy branch.
    pub fn from_node_env(value: Option<&str>) -> Self {
        match value {
            Some("production") => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns the canonical name used for logging and the liveness payload.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }
}

/// Credentials for the administrative account created at boot.
#[derive(Clone)]
pub struct AdminSeedConfig {
    pub email: String,
    pub name: String,
    /// `None` when `ADMIN_PASSWORD` is unset; a random one is generated at seed time.
    pub password: Option<String>,
}

impl fmt::Debug for AdminSeedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSeedConfig")
            .field("email", &self.email)
            .field("name", &self.name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Runtime configuration resolved from environment variables.
///
/// Resolved once at process start and then passed by reference; nothing
/// downstream reads the environment again.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub frontend_url: String,
    pub railway_static_url: Option<String>,
    pub lan_origin_prefix: String,
    pub database_url: String,
    pub admin: AdminSeedConfig,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let node_env = env::var("NODE_ENV").ok();
        let environment = Environment::from_node_env(node_env.as_deref());
        let bind_addr = server_bind_address()?;

        Ok(Self {
            bind_addr,
            environment,
            frontend_url: env_non_empty("FRONTEND_URL")
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            railway_static_url: env_non_empty("RAILWAY_STATIC_URL"),
            lan_origin_prefix: env_non_empty("DEV_LAN_ORIGIN")
                .unwrap_or_else(|| DEFAULT_LAN_ORIGIN.to_string()),
            database_url: env_non_empty("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            admin: AdminSeedConfig {
                email: env_non_empty("ADMIN_EMAIL")
                    .unwrap_or_else(|| "admin@boneandbone.app".to_string()),
                name: env_non_empty("ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string()),
                password: env_non_empty("ADMIN_PASSWORD"),
            },
        })
    }

    /// Externally reachable URL when deployed behind the platform hostname.
    pub fn service_url(&self) -> Option<String> {
        self.railway_static_url
            .as_deref()
            .map(|host| format!("https://{host}"))
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidPort(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPort(value) => {
                write!(f, "PORT must be a number between 0 and 65535 (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
