use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use super::filter::AccessFilter;
use super::rule::{RuleSet, ThrottleRule};
use super::{Discriminator, RequestFacts};
use crate::auth::store::{KvStore, StoreError, StoreResult};
use crate::clock::Clock;
use crate::error::{RateLimitInfo, Rejection};

/// Rule name reported when a request is rejected by an existing ban
pub const BAN_RULE: &str = "repeat-offender-ban";

/// Result of a single rule for a single discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Admitted {
        limit: u64,
        remaining: u64,
        reset_at: i64,
    },
    Throttled {
        limit: u64,
        retry_after: i64,
        reset_at: i64,
    },
    Banned {
        until: i64,
    },
}

/// A request that passed admission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    /// The most constrained matching rule, if any rule matched
    pub rule: Option<String>,
    pub rate_limit: Option<RateLimitInfo>,
}

/// 准入控制器
///
/// Counters and ban records live only in the shared store. Every counter update is a
/// single atomic store increment; nothing is read, modified and written back here.
pub struct AdmissionController {
    store: Arc<dyn KvStore>,
    rules: RuleSet,
    filter: AccessFilter,
    clock: Arc<dyn Clock>,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn KvStore>, rules: RuleSet, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            rules,
            filter: AccessFilter::new(),
            clock,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: AccessFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn filter(&self) -> &AccessFilter {
        &self.filter
    }

    /// Ban check, then fixed-window count for one rule and discriminator
    pub async fn admit(
        &self,
        rule: &ThrottleRule,
        discriminator: &Discriminator,
    ) -> StoreResult<AdmissionOutcome> {
        let now = self.clock.unix_timestamp();
        if let Some(until) = self.active_ban(discriminator, now).await? {
            return Ok(AdmissionOutcome::Banned { until });
        }

        let outcome = self.count(rule, discriminator, now).await?;
        if matches!(outcome, AdmissionOutcome::Throttled { .. }) {
            if let Some(until) = self.record_violation(discriminator, now).await? {
                return Ok(AdmissionOutcome::Banned { until });
            }
        }
        Ok(outcome)
    }

    /// Applies the access filter, active bans and every matching rule to `req`.
    ///
    /// The most restrictive result wins: a ban, then the throttle with the longest
    /// retry-after. Admitted requests report the rule with the fewest requests left.
    pub async fn evaluate(&self, req: &RequestFacts) -> Result<Admission, Rejection> {
        self.evaluate_with(req.clone(), || None).await
    }

    /// Same as [`evaluate`](Self::evaluate), but the subject is only derived through
    /// `claim_subject` once the client address has passed the filter and its ban check,
    /// and only when a matching rule is scoped by subject.
    pub async fn evaluate_with<F>(
        &self,
        mut req: RequestFacts,
        claim_subject: F,
    ) -> Result<Admission, Rejection>
    where
        F: FnOnce() -> Option<String>,
    {
        if self.filter.is_safelisted(req.ip) {
            return Ok(Admission::default());
        }
        if let Some(reason) = self.filter.block_reason(&req) {
            error!(ip = %req.ip, path = %req.path, matched = reason.as_str(), "Request blocklisted");
            return Err(Rejection::blocked());
        }

        let now = self.clock.unix_timestamp();
        self.reject_if_banned(&Discriminator::Ip(req.ip), &req, now).await?;

        if req.subject.is_none() && self.rules.needs_subject(&req) {
            req.subject = claim_subject();
        }
        if let Some(subject) = req.subject.clone() {
            self.reject_if_banned(&Discriminator::Subject(subject), &req, now).await?;
        }

        let mut admitted: Option<(String, RateLimitInfo)> = None;
        let mut throttled: Option<Rejection> = None;
        // one violation per discriminator per request, however many rules it tripped
        let mut offenders: Vec<(Discriminator, String)> = Vec::new();

        for rule in self.rules.matching(&req) {
            let Some(discriminator) = rule.discriminator(&req) else {
                continue;
            };

            let outcome = self
                .count(rule, &discriminator, now)
                .await
                .map_err(|err| store_unavailable(&req, err))?;
            match outcome {
                AdmissionOutcome::Throttled {
                    limit,
                    retry_after,
                    reset_at,
                } => {
                    let longer = throttled
                        .as_ref()
                        .and_then(|r| r.rate_limit)
                        .is_none_or(|info| retry_after > info.retry_after);
                    if longer {
                        let info = RateLimitInfo {
                            limit,
                            remaining: 0,
                            reset_at,
                            retry_after,
                        };
                        throttled = Some(Rejection::throttled(&rule.name, info));
                    }
                    if !offenders.iter().any(|(d, _)| *d == discriminator) {
                        offenders.push((discriminator, rule.name.clone()));
                    }
                }
                AdmissionOutcome::Admitted {
                    limit,
                    remaining,
                    reset_at,
                } => {
                    let tighter = admitted
                        .as_ref()
                        .is_none_or(|(_, info)| remaining < info.remaining);
                    if tighter {
                        let info = RateLimitInfo {
                            limit,
                            remaining,
                            reset_at,
                            retry_after: reset_at - now,
                        };
                        admitted = Some((rule.name.clone(), info));
                    }
                }
                AdmissionOutcome::Banned { .. } => {}
            }
        }

        if let Some(rejection) = throttled {
            let mut banned: Option<Rejection> = None;
            for (discriminator, rule) in &offenders {
                let ban = self
                    .record_violation(discriminator, now)
                    .await
                    .map_err(|err| store_unavailable(&req, err))?;
                if let Some(until) = ban {
                    banned.get_or_insert_with(|| Rejection::banned(rule, self.ban_info(until, now)));
                }
            }
            return Err(banned.unwrap_or(rejection));
        }
        Ok(admitted
            .map(|(rule, info)| Admission {
                rule: Some(rule),
                rate_limit: Some(info),
            })
            .unwrap_or_default())
    }

    async fn reject_if_banned(
        &self,
        discriminator: &Discriminator,
        req: &RequestFacts,
        now: i64,
    ) -> Result<(), Rejection> {
        let ban = self
            .active_ban(discriminator, now)
            .await
            .map_err(|err| store_unavailable(req, err))?;
        match ban {
            Some(until) => {
                warn!(discriminator = %discriminator, until, path = %req.path, "Rejected banned discriminator");
                Err(Rejection::banned(BAN_RULE, self.ban_info(until, now)))
            }
            None => Ok(()),
        }
    }

    /// Fixed-window count only; violations are recorded by the caller
    async fn count(
        &self,
        rule: &ThrottleRule,
        discriminator: &Discriminator,
        now: i64,
    ) -> StoreResult<AdmissionOutcome> {
        let period = i64::try_from(rule.period_secs.max(1)).unwrap_or(i64::MAX);
        let window = now.div_euclid(period);
        let reset_at = window.saturating_add(1).saturating_mul(period);

        let key = format!("throttle:{}:{}:{}", rule.name, discriminator, window);
        let ttl = Duration::from_secs((reset_at - now).max(1) as u64);
        let count = self.store.incr_with_ttl(&key, ttl).await?;

        if count <= rule.limit {
            return Ok(AdmissionOutcome::Admitted {
                limit: rule.limit,
                remaining: rule.limit - count,
                reset_at,
            });
        }

        let retry_after = reset_at - now;
        warn!(
            rule = %rule.name,
            discriminator = %discriminator,
            count,
            limit = rule.limit,
            retry_after,
            "Throttled"
        );

        Ok(AdmissionOutcome::Throttled {
            limit: rule.limit,
            retry_after,
            reset_at,
        })
    }

    async fn active_ban(&self, discriminator: &Discriminator, now: i64) -> StoreResult<Option<i64>> {
        if self.rules.ban.is_none() {
            return Ok(None);
        }

        let key = ban_key(discriminator);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let until: i64 = raw.parse().map_err(|_| StoreError::Corrupt { key })?;
        Ok((until > now).then_some(until))
    }

    /// Counts a throttle against `discriminator`; returns the ban deadline if this
    /// violation crossed the threshold
    async fn record_violation(
        &self,
        discriminator: &Discriminator,
        now: i64,
    ) -> StoreResult<Option<i64>> {
        let Some(policy) = self.rules.ban else {
            return Ok(None);
        };

        let key = violations_key(discriminator);
        let violations = self.store.incr_with_ttl(&key, policy.lookback()).await?;
        if violations < policy.max_violations {
            return Ok(None);
        }

        let until = i64::try_from(policy.duration().as_secs())
            .map_or(i64::MAX, |secs| now.saturating_add(secs));
        self.store
            .set_ex(&ban_key(discriminator), &until.to_string(), policy.duration())
            .await?;
        // the next ban needs a fresh run of violations
        self.store.set_ex(&key, "0", policy.lookback()).await?;

        let lifted_at = DateTime::<Utc>::from_timestamp(until, 0)
            .map_or_else(|| until.to_string(), |at| at.to_rfc3339());
        error!(
            discriminator = %discriminator,
            violations,
            until = %lifted_at,
            "Banned for repeated rate limit violations"
        );
        Ok(Some(until))
    }

    /// Rate-limit figures for a ban: the limit reported is the violation threshold
    fn ban_info(&self, until: i64, now: i64) -> RateLimitInfo {
        RateLimitInfo {
            limit: self.rules.ban.map_or(0, |policy| policy.max_violations),
            remaining: 0,
            reset_at: until,
            retry_after: until.saturating_sub(now),
        }
    }
}

fn store_unavailable(req: &RequestFacts, err: StoreError) -> Rejection {
    error!(%err, ip = %req.ip, path = %req.path, "Admission store check failed");
    Rejection::store_unavailable()
}

fn ban_key(discriminator: &Discriminator) -> String {
    format!("ban:until:{discriminator}")
}

fn violations_key(discriminator: &Discriminator) -> String {
    format!("ban:violations:{discriminator}")
}
