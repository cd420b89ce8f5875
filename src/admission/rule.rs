//! 限流规则
//!
//! A [`ThrottleRule`] pairs a request matcher with a fixed-window ceiling and a scope
//! that decides which [`Discriminator`] the counter is keyed by.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Discriminator, RequestFacts};

/// Which caller identity a rule counts against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Client IP, always
    Ip,
    /// Authenticated subject; the rule is skipped for anonymous requests
    Subject,
    /// Subject when authenticated, otherwise client IP
    SubjectOrIp,
    /// Client IP, only for anonymous requests
    AnonymousIp,
}

impl Scope {
    pub fn needs_subject(&self) -> bool {
        !matches!(self, Scope::Ip)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
    Contains(String),
    ContainsAny(Vec<String>),
}

impl PathPattern {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(p) => path == p,
            PathPattern::Prefix(p) => path.starts_with(p.as_str()),
            PathPattern::Contains(p) => path.contains(p.as_str()),
            PathPattern::ContainsAny(ps) => ps.iter().any(|p| path.contains(p.as_str())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleRule {
    pub name: String,
    pub limit: u64,
    pub period_secs: u64,
    pub scope: Scope,
    pub path: PathPattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type_prefix: Option<String>,
}

impl ThrottleRule {
    pub fn new(
        name: impl Into<String>,
        limit: u64,
        period: Duration,
        scope: Scope,
        path: PathPattern,
    ) -> Self {
        Self {
            name: name.into(),
            limit,
            period_secs: period.as_secs().max(1),
            scope,
            path,
            method: None,
            content_type_prefix: None,
        }
    }

    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub fn content_type_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.content_type_prefix = Some(prefix.into());
        self
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs.max(1))
    }

    /// Method, path and content type match; scope is not considered
    pub fn matches(&self, req: &RequestFacts) -> bool {
        if let Some(method) = &self.method {
            if !req.method.as_str().eq_ignore_ascii_case(method) {
                return false;
            }
        }
        if let Some(prefix) = &self.content_type_prefix {
            let matched = req
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase()));
            if !matched {
                return false;
            }
        }
        self.path.matches(&req.path)
    }

    /// Counter key identity for this request, `None` when the scope does not apply
    pub fn discriminator(&self, req: &RequestFacts) -> Option<Discriminator> {
        match (self.scope, req.subject.as_deref()) {
            (Scope::Ip, _) | (Scope::SubjectOrIp, None) | (Scope::AnonymousIp, None) => {
                Some(Discriminator::Ip(req.ip))
            }
            (Scope::Subject, Some(sub)) | (Scope::SubjectOrIp, Some(sub)) => {
                Some(Discriminator::Subject(sub.to_string()))
            }
            (Scope::Subject, None) | (Scope::AnonymousIp, Some(_)) => None,
        }
    }
}

/// Repeat-offender escalation: `max_violations` throttles within `lookback_secs` ban the
/// discriminator for `duration_secs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanPolicy {
    pub max_violations: u64,
    pub lookback_secs: u64,
    pub duration_secs: u64,
}

impl BanPolicy {
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_secs.max(1))
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs.max(1))
    }
}

impl Default for BanPolicy {
    fn default() -> Self {
        Self {
            max_violations: 5,
            lookback_secs: 3_600,
            duration_secs: 86_400,
        }
    }
}

/// The configured rule table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<ThrottleRule>,
    #[serde(default)]
    pub ban: Option<BanPolicy>,
}

impl RuleSet {
    pub fn new(rules: Vec<ThrottleRule>) -> Self {
        Self { rules, ban: None }
    }

    #[must_use]
    pub fn with_ban(mut self, policy: BanPolicy) -> Self {
        self.ban = Some(policy);
        self
    }

    pub fn rule(&self, name: &str) -> Option<&ThrottleRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn matching<'a>(&'a self, req: &'a RequestFacts) -> impl Iterator<Item = &'a ThrottleRule> {
        self.rules.iter().filter(move |r| r.matches(req))
    }

    /// Whether any matching rule needs the caller's subject
    pub fn needs_subject(&self, req: &RequestFacts) -> bool {
        self.matching(req).any(|r| r.scope.needs_subject())
    }

    /// Parses a TOML rule table (`[[rules]]` entries and an optional `[ban]` table)
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        let hour = Duration::from_secs(3_600);
        let minute = Duration::from_secs(60);

        RuleSet::new(vec![
            ThrottleRule::new(
                "auth/login",
                5,
                minute,
                Scope::Ip,
                PathPattern::Exact("/api/v1/auth/login".into()),
            )
            .method("POST"),
            ThrottleRule::new(
                "auth/register",
                3,
                hour,
                Scope::Ip,
                PathPattern::Exact("/api/v1/auth/register".into()),
            )
            .method("POST"),
            ThrottleRule::new(
                "auth/password-reset",
                5,
                hour,
                Scope::Ip,
                PathPattern::Exact("/api/v1/auth/forgot-password".into()),
            )
            .method("POST"),
            ThrottleRule::new(
                "api/unauthenticated",
                100,
                hour,
                Scope::AnonymousIp,
                PathPattern::Prefix("/api/".into()),
            ),
            ThrottleRule::new(
                "api/authenticated",
                1_000,
                hour,
                Scope::Subject,
                PathPattern::Prefix("/api/".into()),
            ),
            ThrottleRule::new(
                "api/search",
                60,
                minute,
                Scope::SubjectOrIp,
                PathPattern::Contains("/search".into()),
            )
            .method("GET"),
            ThrottleRule::new(
                "api/uploads",
                20,
                hour,
                Scope::SubjectOrIp,
                PathPattern::ContainsAny(vec!["/meals".into(), "/foods".into()]),
            )
            .method("POST")
            .content_type_prefix("multipart/form-data"),
        ])
        .with_ban(BanPolicy::default())
    }
}
