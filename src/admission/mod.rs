//! 准入控制模块
//!
//! Multi-scope fixed-window throttling with repeat-offender bans, evaluated before any
//! credential is verified.

pub mod controller;
pub mod filter;
pub mod rule;

pub use controller::{Admission, AdmissionController, AdmissionOutcome};
pub use filter::{AccessFilter, BlockReason};
pub use rule::{BanPolicy, PathPattern, RuleSet, Scope, ThrottleRule};

use std::fmt;
use std::net::IpAddr;

use http::Method;

/// Identity a throttle counter or ban record is keyed by
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Discriminator {
    Ip(IpAddr),
    Subject(String),
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discriminator::Ip(ip) => write!(f, "ip:{ip}"),
            Discriminator::Subject(sub) => write!(f, "sub:{sub}"),
        }
    }
}

/// What admission control needs to know about a request
#[derive(Debug, Clone)]
pub struct RequestFacts {
    pub ip: IpAddr,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    /// Subject claimed by a well-signed credential, if any
    pub subject: Option<String>,
}

impl RequestFacts {
    pub fn new(ip: IpAddr, method: Method, path: impl Into<String>) -> Self {
        Self {
            ip,
            method,
            path: path.into(),
            query: None,
            content_type: None,
            subject: None,
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}
