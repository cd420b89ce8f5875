//! 配置加载测试

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::ExposeSecret;
use tollgate_core::admission::{BanPolicy, PathPattern, RuleSet, Scope};
use tollgate_core::config::{ConfigError, Environment, GateConfig, MAX_DURATION_SECS};
use tollgate_core::telemetry::LogFormat;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

fn load(vars: &[(&str, &str)]) -> Result<GateConfig, ConfigError> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    GateConfig::from_lookup(|key| vars.get(key).cloned())
}

#[test]
fn defaults_mirror_the_service() {
    let config = load(&[("TOLLGATE_SIGNING_SECRET", SECRET)]).unwrap();

    assert_eq!(config.signing_secret.expose_secret(), SECRET);
    assert_eq!(config.issuer, "tollgate");
    assert_eq!(config.token_lifetime, Duration::from_secs(86_400));
    assert_eq!(config.subject_revocation, Duration::from_secs(86_400));
    assert_eq!(config.environment, Environment::Development);
    assert_eq!(config.store.url, "redis://localhost:6379/0");
    assert_eq!(config.store.namespace, "tollgate");
    assert_eq!(config.store.op_timeout, Duration::from_millis(250));
    assert_eq!(
        config.server.listen_addr,
        "0.0.0.0:8080".parse::<SocketAddr>().unwrap()
    );
    assert!(!config.server.trust_forwarded_for);
    assert!(config.server.allowed_origins.is_empty());
    assert_eq!(config.rules, RuleSet::default());
    assert_eq!(config.rules.ban, Some(BanPolicy::default()));
    assert_eq!(config.log_format, LogFormat::Pretty);
}

#[test]
fn secret_is_required() {
    assert!(matches!(load(&[]), Err(ConfigError::Missing(_))));
    assert!(matches!(
        load(&[("TOLLGATE_SIGNING_SECRET", "  ")]),
        Err(ConfigError::Missing(_))
    ));

    let config = load(&[("JWT_SECRET", SECRET)]).unwrap();
    assert_eq!(config.signing_secret.expose_secret(), SECRET);
}

#[test]
fn explicit_values_override_defaults() {
    let config = load(&[
        ("TOLLGATE_SIGNING_SECRET", SECRET),
        ("TOLLGATE_ISSUER", "api.example.com"),
        ("TOLLGATE_TOKEN_LIFETIME_SECS", "900"),
        ("TOLLGATE_ENV", "production"),
        ("REDIS_URL", "redis://cache:6379/2"),
        ("TOLLGATE_STORE_TIMEOUT_MS", "100"),
        ("TOLLGATE_LISTEN_ADDR", "127.0.0.1:9000"),
        ("TOLLGATE_TRUST_FORWARDED_FOR", "true"),
        ("TOLLGATE_ALLOWED_ORIGINS", "https://app.example.com, https://admin.example.com"),
        ("TOLLGATE_LOG_FORMAT", "json"),
    ])
    .unwrap();

    assert_eq!(config.issuer, "api.example.com");
    assert_eq!(config.token_lifetime, Duration::from_secs(900));
    assert!(config.environment.is_production());
    assert_eq!(config.store.url, "redis://cache:6379/2");
    assert_eq!(config.store.op_timeout, Duration::from_millis(100));
    assert_eq!(config.server.listen_addr.port(), 9000);
    assert!(config.server.trust_forwarded_for);
    assert_eq!(
        config.server.allowed_origins,
        vec!["https://app.example.com", "https://admin.example.com"]
    );
    assert_eq!(config.log_format, LogFormat::Json);
}

#[test]
fn malformed_values_are_reported_with_their_key() {
    let err = load(&[
        ("TOLLGATE_SIGNING_SECRET", SECRET),
        ("TOLLGATE_TOKEN_LIFETIME_SECS", "a day"),
    ])
    .unwrap_err();
    match err {
        ConfigError::Invalid { key, value, .. } => {
            assert_eq!(key, "TOLLGATE_TOKEN_LIFETIME_SECS");
            assert_eq!(value, "a day");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(matches!(
        load(&[("TOLLGATE_SIGNING_SECRET", SECRET), ("TOLLGATE_BLOCKLIST", "1.2.3.4, nope")]),
        Err(ConfigError::Invalid { .. })
    ));
    assert!(matches!(
        load(&[("TOLLGATE_SIGNING_SECRET", SECRET), ("TOLLGATE_ENV", "staging")]),
        Err(ConfigError::Invalid { .. })
    ));
}

#[test]
fn rule_and_ban_overrides() {
    let config = load(&[
        ("TOLLGATE_SIGNING_SECRET", SECRET),
        ("TOLLGATE_RULE_AUTH_LOGIN_LIMIT", "10"),
        ("TOLLGATE_RULE_AUTH_PASSWORD_RESET_PERIOD_SECS", "600"),
        ("TOLLGATE_BAN_DURATION_SECS", "3600"),
    ])
    .unwrap();

    assert_eq!(config.rules.rule("auth/login").unwrap().limit, 10);
    assert_eq!(
        config.rules.rule("auth/password-reset").unwrap().period(),
        Duration::from_secs(600)
    );
    let ban = config.rules.ban.unwrap();
    assert_eq!(ban.duration_secs, 3_600);
    assert_eq!(ban.max_violations, 5);

    let config = load(&[
        ("TOLLGATE_SIGNING_SECRET", SECRET),
        ("TOLLGATE_BAN_MAX_VIOLATIONS", "0"),
    ])
    .unwrap();
    assert_eq!(config.rules.ban, None);
}

#[test]
fn durations_beyond_the_bound_are_rejected() {
    let too_long = (MAX_DURATION_SECS + 1).to_string();
    for key in [
        "TOLLGATE_TOKEN_LIFETIME_SECS",
        "TOLLGATE_SUBJECT_REVOCATION_SECS",
        "TOLLGATE_BAN_DURATION_SECS",
        "TOLLGATE_BAN_LOOKBACK_SECS",
        "TOLLGATE_RULE_AUTH_LOGIN_PERIOD_SECS",
    ] {
        match load(&[("TOLLGATE_SIGNING_SECRET", SECRET), (key, &too_long)]) {
            Err(ConfigError::Invalid { key: reported, .. }) => assert_eq!(reported, key),
            other => panic!("{key} was accepted: {other:?}"),
        }
    }

    let max = u64::MAX.to_string();
    assert!(matches!(
        load(&[("TOLLGATE_SIGNING_SECRET", SECRET), ("TOLLGATE_TOKEN_LIFETIME_SECS", &max)]),
        Err(ConfigError::Invalid { .. })
    ));

    let at_bound = MAX_DURATION_SECS.to_string();
    let config = load(&[
        ("TOLLGATE_SIGNING_SECRET", SECRET),
        ("TOLLGATE_BAN_DURATION_SECS", &at_bound),
    ])
    .unwrap();
    assert_eq!(config.rules.ban.unwrap().duration_secs, MAX_DURATION_SECS);
}

#[test]
fn access_filter_follows_environment() {
    let loopback: IpAddr = "127.0.0.1".parse().unwrap();
    let office: IpAddr = "10.1.2.3".parse().unwrap();

    let dev = load(&[
        ("TOLLGATE_SIGNING_SECRET", SECRET),
        ("TOLLGATE_SAFELIST", "10.1.2.3"),
    ])
    .unwrap();
    assert!(dev.access_filter().is_safelisted(loopback));
    assert!(dev.access_filter().is_safelisted(office));

    let prod = load(&[
        ("TOLLGATE_SIGNING_SECRET", SECRET),
        ("TOLLGATE_ENV", "prod"),
    ])
    .unwrap();
    assert!(!prod.access_filter().is_safelisted(loopback));
}

#[test]
fn rules_parse_from_toml() {
    let rules = RuleSet::from_toml(
        r#"
        [[rules]]
        name = "auth/login"
        limit = 3
        period_secs = 60
        scope = "ip"
        path = { exact = "/api/v1/auth/login" }
        method = "POST"

        [[rules]]
        name = "api/uploads"
        limit = 10
        period_secs = 3600
        scope = "subject_or_ip"
        path = { contains_any = ["/meals", "/foods"] }
        content_type_prefix = "multipart/form-data"

        [ban]
        max_violations = 3
        lookback_secs = 600
        duration_secs = 7200
        "#,
    )
    .unwrap();

    assert_eq!(rules.rules.len(), 2);
    let login = rules.rule("auth/login").unwrap();
    assert_eq!(login.scope, Scope::Ip);
    assert_eq!(login.path, PathPattern::Exact("/api/v1/auth/login".into()));
    assert_eq!(login.method.as_deref(), Some("POST"));
    assert_eq!(rules.rule("api/uploads").unwrap().scope, Scope::SubjectOrIp);
    assert_eq!(
        rules.ban,
        Some(BanPolicy {
            max_violations: 3,
            lookback_secs: 600,
            duration_secs: 7_200,
        })
    );
}

#[test]
fn rules_file_errors_are_surfaced() {
    let missing = std::env::temp_dir().join("tollgate-no-such-rules.toml");
    assert!(matches!(
        GateConfig::load_rules_file(&missing),
        Err(ConfigError::Io { .. })
    ));

    let broken = std::env::temp_dir().join(format!("tollgate-broken-{}.toml", std::process::id()));
    std::fs::write(&broken, "[[rules]]\nname = 3\n").unwrap();
    let result = GateConfig::load_rules_file(&broken);
    let _ = std::fs::remove_file(&broken);
    assert!(matches!(result, Err(ConfigError::Rules(_))));
}
