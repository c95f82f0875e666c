use std::{fmt, str::FromStr};

use anyhow::{bail, Context};
use jsonwebtoken::Algorithm;
use tracing::warn;

/// Secret used when `JWT_SECRET` is not set. Only acceptable outside production.
pub const DEV_FALLBACK_SECRET: &str = "fallback-secret-key-change-in-production";

/// Secrets that ship in sample env files and must never sign production tokens.
const PLACEHOLDER_SECRETS: &[&str] = &[
    DEV_FALLBACK_SECRET,
    "your-super-secret-key-change-this-in-production-minimum-32-characters",
    "dev-key-change-in-production-abc123def456ghi789jkl012mno345pqr",
    "changeme",
    "secret",
];

pub const MIN_PRODUCTION_SECRET_LEN: usize = 32;

/// One year.
pub const MAX_TTL_MINUTES: i64 = 525_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub ttl_minutes: i64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    /// `None` runs the service on in-memory stores (development only).
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub min_password_length: usize,
    pub rate_limit_per_minute: u32,
    /// Key rate limits on `x-forwarded-for` / `x-real-ip`. Only safe behind
    /// a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds and validates the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = Environment::parse(&var("APP_ENV").unwrap_or_default());

        let algorithm = match var("JWT_ALGORITHM") {
            Some(raw) => parse_algorithm(&raw)?,
            None => Algorithm::HS256,
        };

        let jwt = JwtConfig {
            secret: var("JWT_SECRET").unwrap_or_else(|| DEV_FALLBACK_SECRET.into()),
            algorithm,
            ttl_minutes: parse_or("JWT_TTL_MINUTES", var("JWT_TTL_MINUTES"), 30)?,
        };

        let config = Self {
            environment,
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or("APP_PORT", var("APP_PORT"), 8080)?,
            database_url: var("DATABASE_URL"),
            jwt,
            min_password_length: parse_or("MIN_PASSWORD_LENGTH", var("MIN_PASSWORD_LENGTH"), 8)?,
            rate_limit_per_minute: parse_or(
                "RATE_LIMIT_PER_MINUTE",
                var("RATE_LIMIT_PER_MINUTE"),
                60,
            )?,
            trust_proxy_headers: parse_or(
                "TRUST_PROXY_HEADERS",
                var("TRUST_PROXY_HEADERS").map(|v| v.to_ascii_lowercase()),
                false,
            )?,
            cors_origins: var("CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_secret()?;

        if self.min_password_length < 6 {
            bail!("MIN_PASSWORD_LENGTH must be at least 6");
        }
        if self.jwt.ttl_minutes < 1 {
            bail!("JWT_TTL_MINUTES must be positive");
        }
        if self.jwt.ttl_minutes > MAX_TTL_MINUTES {
            bail!("JWT_TTL_MINUTES must be at most {MAX_TTL_MINUTES}");
        }
        if self.rate_limit_per_minute == 0 {
            bail!("RATE_LIMIT_PER_MINUTE must be positive");
        }
        if self.environment.is_production() && self.database_url.is_none() {
            bail!("DATABASE_URL is required in production");
        }
        Ok(())
    }

    fn validate_secret(&self) -> anyhow::Result<()> {
        let secret = self.jwt.secret.as_str();
        let placeholder = PLACEHOLDER_SECRETS.contains(&secret);
        let too_short = secret.len() < MIN_PRODUCTION_SECRET_LEN;

        if self.environment.is_production() {
            if too_short {
                bail!("JWT_SECRET must be at least {MIN_PRODUCTION_SECRET_LEN} bytes in production");
            }
            if placeholder {
                bail!("JWT_SECRET is a known placeholder and must be changed in production");
            }
        } else if placeholder || too_short {
            warn!(
                secret_len = secret.len(),
                placeholder, "weak JWT secret; acceptable only outside production"
            );
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_algorithm(raw: &str) -> anyhow::Result<Algorithm> {
    let alg = Algorithm::from_str(raw.trim())
        .with_context(|| format!("JWT_ALGORITHM `{raw}` is not a known algorithm"))?;
    match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(alg),
        other => bail!("JWT_ALGORITHM must be an HMAC algorithm, got {other:?}"),
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has invalid value `{v}`")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const STRONG_SECRET: &str = "a-very-long-and-random-production-secret-0123456789";

    #[test]
    fn defaults_apply_in_development() {
        let cfg = AppConfig::from_lookup(lookup(&[])).expect("dev defaults are valid");
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.jwt.algorithm, Algorithm::HS256);
        assert_eq!(cfg.jwt.ttl_minutes, 30);
        assert_eq!(cfg.min_password_length, 8);
        assert_eq!(cfg.port, 8080);
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn production_rejects_placeholder_secret() {
        let err = AppConfig::from_lookup(lookup(&[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "postgres://localhost/todos"),
            ("JWT_SECRET", DEV_FALLBACK_SECRET),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("placeholder"));
    }

    #[test]
    fn production_rejects_short_secret() {
        let err = AppConfig::from_lookup(lookup(&[
            ("APP_ENV", "Production"),
            ("DATABASE_URL", "postgres://localhost/todos"),
            ("JWT_SECRET", "too-short"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("at least 32 bytes"));
    }

    #[test]
    fn production_accepts_strong_secret() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "postgres://localhost/todos"),
            ("JWT_SECRET", STRONG_SECRET),
            ("JWT_ALGORITHM", "HS512"),
            ("JWT_TTL_MINUTES", "15"),
        ]))
        .expect("strong production config");
        assert!(cfg.environment.is_production());
        assert_eq!(cfg.jwt.algorithm, Algorithm::HS512);
        assert_eq!(cfg.jwt.ttl_minutes, 15);
    }

    #[test]
    fn production_requires_database() {
        let err = AppConfig::from_lookup(lookup(&[
            ("APP_ENV", "production"),
            ("JWT_SECRET", STRONG_SECRET),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn asymmetric_algorithm_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("JWT_ALGORITHM", "RS256")])).unwrap_err();
        assert!(err.to_string().contains("HMAC"));
    }

    #[test]
    fn numeric_values_are_validated() {
        assert!(AppConfig::from_lookup(lookup(&[("JWT_TTL_MINUTES", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("JWT_TTL_MINUTES", "soon")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("MIN_PASSWORD_LENGTH", "4")])).is_err());
    }

    #[test]
    fn ttl_has_an_upper_bound() {
        let err = AppConfig::from_lookup(lookup(&[("JWT_TTL_MINUTES", "10000000000")]))
            .unwrap_err();
        assert!(err.to_string().contains("at most"));

        let max = MAX_TTL_MINUTES.to_string();
        let cfg = AppConfig::from_lookup(lookup(&[("JWT_TTL_MINUTES", max.as_str())])).unwrap();
        assert_eq!(cfg.jwt.ttl_minutes, MAX_TTL_MINUTES);
    }

    #[test]
    fn proxy_headers_are_opt_in() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert!(!cfg.trust_proxy_headers);

        let cfg = AppConfig::from_lookup(lookup(&[("TRUST_PROXY_HEADERS", "True")])).unwrap();
        assert!(cfg.trust_proxy_headers);

        assert!(AppConfig::from_lookup(lookup(&[("TRUST_PROXY_HEADERS", "maybe")])).is_err());
    }

    #[test]
    fn cors_origins_are_split() {
        let cfg = AppConfig::from_lookup(lookup(&[(
            "CORS_ORIGINS",
            "http://localhost:3000, http://127.0.0.1:8000,",
        )]))
        .unwrap();
        assert_eq!(
            cfg.cors_origins,
            vec!["http://localhost:3000", "http://127.0.0.1:8000"]
        );
    }

    #[test]
    fn debug_output_redacts_secret() {
        let cfg = AppConfig::from_lookup(lookup(&[("JWT_SECRET", STRONG_SECRET)])).unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains(STRONG_SECRET));
        assert!(rendered.contains("<redacted>"));
    }
}
