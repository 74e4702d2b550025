//! # Configuration
//!
//! Process configuration read from environment variables once at startup.
//! Every variable has a default except the admin bootstrap triple, which
//! is all-or-nothing.

use campus_crypto::password::{DEFAULT_ITERATIONS, DEFAULT_MEMORY_KIB};
use campus_crypto::token::DEFAULT_TOKEN_TTL_HOURS;
use thiserror::Error;
use zeroize::Zeroizing;

/// Default lifetime of a password-reset token.
pub const DEFAULT_RESET_TTL_HOURS: i64 = 24;

/// A configuration variable was set to an unusable value.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The value could not be parsed or is out of range.
    #[error("{var} is invalid: {reason}")]
    Invalid {
        /// Environment variable name.
        var: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Only part of the admin bootstrap triple was provided.
    #[error("CAMPUS_ADMIN_EMAIL, CAMPUS_ADMIN_SECRET and CAMPUS_ADMIN_NAME must be set together")]
    PartialAdminBootstrap,
}

/// Credentials of the first admin, created at startup if absent.
#[derive(Clone)]
pub struct AdminBootstrap {
    /// Admin login email.
    pub email: String,
    /// Initial admin secret.
    pub secret: Zeroizing<String>,
    /// Display name.
    pub name: String,
}

impl std::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("email", &self.email)
            .field("secret", &"[REDACTED]")
            .field("name", &self.name)
            .finish()
    }
}

/// Application configuration.
///
/// Custom `Debug` redacts the token signing key and the admin secret.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Hex-encoded 32-byte Ed25519 seed for bearer tokens. `None` generates
    /// an ephemeral key, invalidating all tokens on restart.
    pub token_key_hex: Option<Zeroizing<String>>,
    /// Bearer token lifetime.
    pub token_ttl_hours: i64,
    /// Password-reset token lifetime.
    pub reset_ttl_hours: i64,
    /// First admin to create at startup.
    pub admin: Option<AdminBootstrap>,
    /// Requests allowed per client per window on the public auth routes.
    pub rate_limit_max: u64,
    /// Rate limit window length.
    pub rate_limit_window_secs: u64,
    /// Key the rate limiter on `X-Forwarded-For`. Set only behind a reverse
    /// proxy that overwrites the header.
    pub trust_forwarded_for: bool,
    /// Argon2id memory cost in KiB.
    pub hash_memory_kib: u32,
    /// Argon2id iteration count.
    pub hash_iterations: u32,
    /// Whether `/metrics` and the metrics middleware are mounted.
    pub metrics_enabled: bool,
    /// Emit JSON log lines instead of human-readable ones.
    pub log_json: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "token_key_hex",
                &self.token_key_hex.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("reset_ttl_hours", &self.reset_ttl_hours)
            .field("admin", &self.admin)
            .field("rate_limit_max", &self.rate_limit_max)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("hash_memory_kib", &self.hash_memory_kib)
            .field("hash_iterations", &self.hash_iterations)
            .field("metrics_enabled", &self.metrics_enabled)
            .field("log_json", &self.log_json)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            token_key_hex: None,
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            reset_ttl_hours: DEFAULT_RESET_TTL_HOURS,
            admin: None,
            rate_limit_max: 300,
            rate_limit_window_secs: 60,
            trust_forwarded_for: false,
            hash_memory_kib: DEFAULT_MEMORY_KIB,
            hash_iterations: DEFAULT_ITERATIONS,
            metrics_enabled: true,
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let admin = match (
            get("CAMPUS_ADMIN_EMAIL"),
            get("CAMPUS_ADMIN_SECRET"),
            get("CAMPUS_ADMIN_NAME"),
        ) {
            (Some(email), Some(secret), Some(name)) => Some(AdminBootstrap {
                email,
                secret: Zeroizing::new(secret),
                name,
            }),
            (None, None, None) => None,
            _ => return Err(ConfigError::PartialAdminBootstrap),
        };

        let token_ttl_hours = parse_or(&get, "CAMPUS_TOKEN_TTL_HOURS", defaults.token_ttl_hours)?;
        let reset_ttl_hours = parse_or(&get, "CAMPUS_RESET_TTL_HOURS", defaults.reset_ttl_hours)?;
        for (var, hours) in [
            ("CAMPUS_TOKEN_TTL_HOURS", token_ttl_hours),
            ("CAMPUS_RESET_TTL_HOURS", reset_ttl_hours),
        ] {
            if hours <= 0 {
                return Err(ConfigError::Invalid {
                    var,
                    reason: "must be greater than 0".to_string(),
                });
            }
        }

        Ok(Self {
            port: parse_or(&get, "PORT", defaults.port)?,
            token_key_hex: get("CAMPUS_TOKEN_KEY_HEX").map(Zeroizing::new),
            token_ttl_hours,
            reset_ttl_hours,
            admin,
            rate_limit_max: parse_or(&get, "CAMPUS_RATE_LIMIT_MAX", defaults.rate_limit_max)?,
            rate_limit_window_secs: parse_or(
                &get,
                "CAMPUS_RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window_secs,
            )?,
            trust_forwarded_for: get("CAMPUS_TRUST_FORWARDED_FOR")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(defaults.trust_forwarded_for),
            hash_memory_kib: parse_or(&get, "CAMPUS_HASH_MEMORY_KIB", defaults.hash_memory_kib)?,
            hash_iterations: parse_or(&get, "CAMPUS_HASH_ITERATIONS", defaults.hash_iterations)?,
            metrics_enabled: get("CAMPUS_METRICS_ENABLED")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(defaults.metrics_enabled),
            log_json: get("CAMPUS_LOG_JSON")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(defaults.log_json),
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
