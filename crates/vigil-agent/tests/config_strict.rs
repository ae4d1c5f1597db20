#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashMap;
use std::time::Duration;

use vigil_agent::config::{self, FallbackPolicy, Protocol};

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |k: &str| map.get(k).cloned()
}

#[test]
fn empty_document_is_defaults() {
    let cfg = config::load_from_str("").unwrap();
    assert_eq!(cfg.collector.address, "localhost:8080");
    assert_eq!(cfg.poll_interval(), Duration::from_secs(2));
    assert_eq!(cfg.report_interval(), Duration::from_secs(10));
    assert_eq!(cfg.reporting.fallback, FallbackPolicy::RetryBatch);
    assert_eq!(cfg.collector.protocol, Protocol::Json);
    assert_eq!(cfg.backoff().max_attempts(), 4);
}

#[test]
fn unknown_fields_are_rejected() {
    let err = config::load_from_str("reporting:\n  poll_every: 3\n").unwrap_err();
    assert!(err.to_string().contains("poll_every"), "{err}");
}

#[test]
fn policies_parse_snake_case() {
    let cfg = config::load_from_str(
        "collector:\n  protocol: legacy\nreporting:\n  fallback: stay_degraded\n",
    )
    .unwrap();
    assert_eq!(cfg.collector.protocol, Protocol::Legacy);
    assert_eq!(cfg.reporting.fallback, FallbackPolicy::StayDegraded);
}

#[test]
fn environment_overrides_file() {
    let mut cfg = config::load_from_str("collector:\n  address: \"10.0.0.1:80\"\n").unwrap();
    cfg.apply_env(env(&[("ADDRESS", "127.0.0.1:9090"), ("REPORT_INTERVAL", "30"), ("KEY", "k")]))
        .unwrap();
    assert_eq!(cfg.collector.address, "127.0.0.1:9090");
    assert_eq!(cfg.reporting.report_interval_secs, 30);
    assert_eq!(cfg.reporting.poll_interval_secs, 2);
    assert_eq!(cfg.collector.key, "k");
}

#[test]
fn bad_environment_values_fail() {
    let mut cfg = config::load_from_str("").unwrap();
    assert!(cfg.apply_env(env(&[("POLL_INTERVAL", "soon")])).is_err());
    let mut cfg = config::load_from_str("").unwrap();
    assert!(cfg.apply_env(env(&[("POLL_INTERVAL", "0")])).is_err());
}

#[test]
fn missing_file_is_defaults() {
    let cfg = config::load_from_file("/nonexistent/vigil-agent.yaml").unwrap();
    assert_eq!(cfg.version, 1);
}
