//! 配置模块
//!
//! Everything is read once at startup into an immutable [`GateConfig`]. Values come from
//! environment variables; the throttle rule table may additionally come from a TOML file.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::admission::{AccessFilter, RuleSet};
use crate::telemetry::LogFormat;

const MIN_SECRET_LEN: usize = 32;

/// Longest accepted lifetime, period or ban (100 years)
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 86_400;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid rules file: {0}")]
    Rules(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub url: String,
    pub namespace: String,
    pub op_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Take the client IP from `X-Forwarded-For` (only behind a trusted proxy)
    pub trust_forwarded_for: bool,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug)]
pub struct GateConfig {
    pub signing_secret: SecretString,
    pub issuer: String,
    pub token_lifetime: Duration,
    pub subject_revocation: Duration,
    pub environment: Environment,
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub rules: RuleSet,
    pub safelist: Vec<IpAddr>,
    pub blocklist: Vec<IpAddr>,
    pub log_format: LogFormat,
}

impl GateConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let secret = env
            .first(&["TOLLGATE_SIGNING_SECRET", "JWT_SECRET"])
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("TOLLGATE_SIGNING_SECRET"))?;
        let signing_secret = SecretString::from(secret);
        if signing_secret.expose_secret().len() < MIN_SECRET_LEN {
            warn!(min_len = MIN_SECRET_LEN, "Signing secret is shorter than recommended");
        }

        let mut rules = match env.get("TOLLGATE_RULES_FILE") {
            Some(path) => Self::load_rules_file(&path)?,
            None => RuleSet::default(),
        };
        env.apply_rule_overrides(&mut rules)?;

        Ok(Self {
            signing_secret,
            issuer: env.get("TOLLGATE_ISSUER").unwrap_or_else(|| "tollgate".to_string()),
            token_lifetime: env.secs("TOLLGATE_TOKEN_LIFETIME_SECS", 86_400)?,
            subject_revocation: env.secs("TOLLGATE_SUBJECT_REVOCATION_SECS", 86_400)?,
            environment: env.parse("TOLLGATE_ENV", Environment::Development)?,
            store: StoreConfig {
                url: env
                    .first(&["TOLLGATE_REDIS_URL", "REDIS_URL"])
                    .unwrap_or_else(|| "redis://localhost:6379/0".to_string()),
                namespace: env
                    .get("TOLLGATE_REDIS_NAMESPACE")
                    .unwrap_or_else(|| "tollgate".to_string()),
                op_timeout: Duration::from_millis(env.parse("TOLLGATE_STORE_TIMEOUT_MS", 250)?),
            },
            server: ServerConfig {
                listen_addr: env.parse(
                    "TOLLGATE_LISTEN_ADDR",
                    SocketAddr::from(([0, 0, 0, 0], 8080)),
                )?,
                trust_forwarded_for: env.parse("TOLLGATE_TRUST_FORWARDED_FOR", false)?,
                allowed_origins: env.list("TOLLGATE_ALLOWED_ORIGINS"),
            },
            rules,
            safelist: env.ip_list("TOLLGATE_SAFELIST")?,
            blocklist: env.ip_list("TOLLGATE_BLOCKLIST")?,
            log_format: env.parse("TOLLGATE_LOG_FORMAT", LogFormat::Pretty)?,
        })
    }

    /// Reads a TOML rule table
    pub fn load_rules_file(path: impl AsRef<Path>) -> Result<RuleSet, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(RuleSet::from_toml(&content)?)
    }

    /// Access filter derived from the lists and the environment
    pub fn access_filter(&self) -> AccessFilter {
        AccessFilter::new()
            .with_safelist(self.safelist.iter().copied())
            .with_blocklist(self.blocklist.iter().copied())
            .allow_loopback(!self.environment.is_production())
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.get(key))
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|err: T::Err| ConfigError::Invalid {
                key: key.to_string(),
                value: raw.clone(),
                reason: err.to_string(),
            }),
        }
    }

    /// A duration in whole seconds, bounded by [`MAX_DURATION_SECS`]
    fn secs(&self, key: &str, default: u64) -> Result<Duration, ConfigError> {
        let secs = self.parse(key, default)?;
        check_span(key, secs)?;
        Ok(Duration::from_secs(secs))
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn ip_list(&self, key: &str) -> Result<Vec<IpAddr>, ConfigError> {
        self.list(key)
            .into_iter()
            .map(|raw| {
                raw.parse().map_err(|err: std::net::AddrParseError| ConfigError::Invalid {
                    key: key.to_string(),
                    value: raw.clone(),
                    reason: err.to_string(),
                })
            })
            .collect()
    }

    fn apply_rule_overrides(&self, rules: &mut RuleSet) -> Result<(), ConfigError> {
        for rule in rules.rules.iter_mut() {
            let prefix = format!("TOLLGATE_RULE_{}", env_name(&rule.name));
            rule.limit = self.parse(&format!("{prefix}_LIMIT"), rule.limit)?;
            let period_key = format!("{prefix}_PERIOD_SECS");
            rule.period_secs = self.parse(&period_key, rule.period_secs)?.max(1);
            check_span(&period_key, rule.period_secs)?;
        }

        let defaults = rules.ban.unwrap_or_default();
        let max_violations = self.parse("TOLLGATE_BAN_MAX_VIOLATIONS", defaults.max_violations)?;
        let lookback_secs = self.parse("TOLLGATE_BAN_LOOKBACK_SECS", defaults.lookback_secs)?;
        let duration_secs = self.parse("TOLLGATE_BAN_DURATION_SECS", defaults.duration_secs)?;
        check_span("TOLLGATE_BAN_LOOKBACK_SECS", lookback_secs)?;
        check_span("TOLLGATE_BAN_DURATION_SECS", duration_secs)?;

        rules.ban = if max_violations == 0 {
            None
        } else if rules.ban.is_some() || self.get("TOLLGATE_BAN_MAX_VIOLATIONS").is_some() {
            Some(crate::admission::BanPolicy {
                max_violations,
                lookback_secs,
                duration_secs,
            })
        } else {
            None
        };
        Ok(())
    }
}

fn check_span(key: &str, secs: u64) -> Result<(), ConfigError> {
    if secs > MAX_DURATION_SECS {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            value: secs.to_string(),
            reason: format!("must not exceed {MAX_DURATION_SECS} seconds"),
        });
    }
    Ok(())
}

/// `auth/password-reset` -> `AUTH_PASSWORD_RESET`
fn env_name(rule: &str) -> String {
    rule.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
