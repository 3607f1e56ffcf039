use crate::app_config::{AppConfig, Environment};
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
/// Decoupled from the process environment so tests can drive it from a
/// plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let api_base_url = require("BULKOPS_API_BASE_URL")?;
    if api_base_url.trim().is_empty() {
        return Err(ConfigError::InvalidEnvVar {
            var: "BULKOPS_API_BASE_URL".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    let api_token = lookup("BULKOPS_API_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty());

    let env = parse_environment(&or_default("BULKOPS_ENV", "development"))?;
    let log_level = or_default("BULKOPS_LOG_LEVEL", "info");

    let request_timeout_secs = parse_u64("BULKOPS_REQUEST_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("BULKOPS_USER_AGENT", "bulkops/0.1 (bulk-coordinator)");

    let bulk_concurrency = parse_usize("BULKOPS_CONCURRENCY", "1")?;
    let bulk_item_delay_ms = match lookup("BULKOPS_ITEM_DELAY_MS") {
        Ok(raw) if !raw.trim().is_empty() => {
            Some(
                raw.trim()
                    .parse::<u64>()
                    .map_err(|e| ConfigError::InvalidEnvVar {
                        var: "BULKOPS_ITEM_DELAY_MS".to_string(),
                        reason: e.to_string(),
                    })?,
            )
        }
        _ => None,
    };
    let bulk_max_pages = parse_usize("BULKOPS_MAX_PAGES", "100")?;
    if bulk_max_pages == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "BULKOPS_MAX_PAGES".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    Ok(AppConfig {
        api_base_url,
        api_token,
        env,
        log_level,
        request_timeout_secs,
        user_agent,
        bulk_concurrency,
        bulk_item_delay_ms,
        bulk_max_pages,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "BULKOPS_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
