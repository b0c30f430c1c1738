use crate::app_config::{AppConfig, BasicCredentials, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so tests can drive it with a
/// plain `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    // Empty strings count as unset so `FOO=` in a .env file does not enable a feature.
    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        match or_default(var, default).trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got '{other}'"))),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("GLOWCART_ENV", "development"))?;
    let bind_addr = parse_addr("GLOWCART_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("GLOWCART_LOG_LEVEL", "info");

    let webhook_secret = optional("GLOWCART_WEBHOOK_SECRET");
    let webhook_basic_auth = match (
        optional("GLOWCART_WEBHOOK_BASIC_USER"),
        optional("GLOWCART_WEBHOOK_BASIC_PASSWORD"),
    ) {
        (Some(username), Some(password)) => Some(BasicCredentials { username, password }),
        (None, None) => None,
        (Some(_), None) => {
            return Err(invalid(
                "GLOWCART_WEBHOOK_BASIC_PASSWORD",
                "must be set when GLOWCART_WEBHOOK_BASIC_USER is set".to_string(),
            ))
        }
        (None, Some(_)) => {
            return Err(invalid(
                "GLOWCART_WEBHOOK_BASIC_USER",
                "must be set when GLOWCART_WEBHOOK_BASIC_PASSWORD is set".to_string(),
            ))
        }
    };

    let paymongo_secret_key = optional("GLOWCART_PAYMONGO_SECRET_KEY");
    let paymongo_base_url = or_default("GLOWCART_PAYMONGO_BASE_URL", "https://api.paymongo.com");
    let paymongo_live_mode = parse_bool("GLOWCART_PAYMONGO_LIVE_MODE", "false")?;

    let db_max_connections = parse_u32("GLOWCART_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("GLOWCART_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("GLOWCART_DB_ACQUIRE_TIMEOUT_SECS", "10")?;
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "GLOWCART_DB_MIN_CONNECTIONS",
            format!(
                "min connections ({db_min_connections}) exceeds max connections ({db_max_connections})"
            ),
        ));
    }

    let gateway_timeout_secs = parse_u64("GLOWCART_GATEWAY_TIMEOUT_SECS", "30")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        webhook_secret,
        webhook_basic_auth,
        paymongo_secret_key,
        paymongo_base_url,
        paymongo_live_mode,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        gateway_timeout_secs,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for anything other than
/// `development`, `test` or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "GLOWCART_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
