pub mod config;

use std::{env, net::SocketAddr};

pub use config::{AdminSeedConfig, AppConfig, ConfigError, Environment};

pub const DEFAULT_PORT: u16 = 5801;
pub const DEFAULT_FRONTEND_URL: &str = "https://boneandbone.netlify.app";
pub const DEFAULT_LAN_ORIGIN: &str = "http://192.168.18.118";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://bone-gateway.db?mode=rwc";

/// Loads environment variables from `.env` when available.
///
/// Missing files are ignored so the function is safe in production builds
/// where dotenv files are not deployed.
pub fn load_env_file() {
    let _ = dotenvy::dotenv();
}

/// Returns the address the HTTP server should bind to.
///
/// The listener always binds every interface; only the port is taken from
/// `PORT`, falling back to [`DEFAULT_PORT`] when the variable is not set.
pub fn server_bind_address() -> Result<SocketAddr, ConfigError> {
    let port = match env_non_empty("PORT") {
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(raw))?,
        None => DEFAULT_PORT,
    };
    Ok(SocketAddr::from(([0, 0, 0, 0], port)))
}

#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));

/// Reads an environment variable, treating empty values as unset.
pub(crate) fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
