use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::backend::forward::RetryPolicy;
use crate::backend::{BackendRoute, Engine};
use crate::error::AppError;

const DEFAULT_TOKEN_TTL_HOURS: u64 = 24;
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
const RETRY_MAX_DELAY_SECS: u64 = 10;

/// All gateway configuration, loaded once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    /// When false, protected actions skip token validation. Defaults to true.
    pub require_auth: bool,
    pub routes: HashMap<Engine, BackendRoute>,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::build(|key| env::var(key).ok())
    }

    fn build(get: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&get, "PORT", 3000u16)?;

        let jwt_secret = get("JWT_SECRET_KEY")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::Config("JWT_SECRET_KEY must be set to a non-empty secret".to_string())
            })?;

        let require_auth = match get("REQUIRE_AUTH") {
            None => true,
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                AppError::Config(format!("REQUIRE_AUTH must be a boolean, got '{raw}'"))
            })?,
        };

        let token_ttl_hours = parse_or(&get, "TOKEN_TTL_HOURS", DEFAULT_TOKEN_TTL_HOURS)?;
        let timeout_secs = parse_or(&get, "BACKEND_TIMEOUT_SECS", DEFAULT_BACKEND_TIMEOUT_SECS)?;
        let max_attempts = parse_or(&get, "BACKEND_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(AppError::Config(
                "BACKEND_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        let base_delay_ms = parse_or(&get, "RETRY_BASE_DELAY_MS", DEFAULT_RETRY_BASE_DELAY_MS)?;

        let timeout = Duration::from_secs(timeout_secs);
        let mut routes = HashMap::new();
        for (engine, var) in [
            (Engine::Kokkoro, "KOKKORO_ENDPOINT"),
            (Engine::Chatterbox, "CHATTERBOX_ENDPOINT"),
        ] {
            if let Some(base_url) = get(var).filter(|s| !s.is_empty()) {
                routes.insert(engine, BackendRoute { base_url, timeout });
            }
        }

        Ok(Self {
            host,
            port,
            jwt_secret,
            token_ttl: Duration::from_secs(token_ttl_hours * 3600),
            require_auth,
            routes,
            max_attempts,
            retry_base_delay: Duration::from_millis(base_delay_ms),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.retry_base_delay,
            max_delay: Duration::from_secs(RETRY_MAX_DELAY_SECS),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    get: impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{key} must be a number, got '{raw}'"))),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::GatewayConfig;
    use crate::backend::Engine;
    use crate::error::AppError;

    fn build(vars: &[(&str, &str)]) -> Result<GatewayConfig, AppError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::build(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = build(&[
            ("JWT_SECRET_KEY", "secret"),
            ("KOKKORO_ENDPOINT", "http://kokkoro:8001/run"),
        ])
        .unwrap();

        assert_eq!(config.port, 3000);
        assert!(config.require_auth);
        assert_eq!(config.token_ttl, Duration::from_secs(24 * 3600));
        assert_eq!(config.max_attempts, 3);
        assert!(config.routes.contains_key(&Engine::Kokkoro));
        assert!(!config.routes.contains_key(&Engine::Chatterbox));
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let result = build(&[("KOKKORO_ENDPOINT", "http://kokkoro:8001/run")]);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_auth_can_be_disabled() {
        let config = build(&[("JWT_SECRET_KEY", "secret"), ("REQUIRE_AUTH", "false")]).unwrap();
        assert!(!config.require_auth);
    }

    #[test]
    fn test_bad_boolean_rejected() {
        let result = build(&[("JWT_SECRET_KEY", "secret"), ("REQUIRE_AUTH", "maybe")]);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let result = build(&[("JWT_SECRET_KEY", "secret"), ("BACKEND_MAX_ATTEMPTS", "0")]);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_overrides() {
        let config = build(&[
            ("JWT_SECRET_KEY", "secret"),
            ("PORT", "8080"),
            ("TOKEN_TTL_HOURS", "1"),
            ("BACKEND_TIMEOUT_SECS", "5"),
            ("CHATTERBOX_ENDPOINT", "http://chatterbox:8002/run"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.token_ttl, Duration::from_secs(3600));
        let route = &config.routes[&Engine::Chatterbox];
        assert_eq!(route.base_url, "http://chatterbox:8002/run");
        assert_eq!(route.timeout, Duration::from_secs(5));
    }
}
