use gov_domain::config::EngineConfig;

#[test]
fn defaults_match_spec_constants() {
    let cfg = EngineConfig::default();
    assert_eq!(cfg.policy.cache_ttl_secs, 10);
    assert_eq!(cfg.session.window_minutes, 60);
    assert_eq!(cfg.session.max_entries, 50);
    assert!(!cfg.fees.enabled);
    assert_eq!(cfg.fees.wallet_initial_balance.to_string(), "100.000");
    assert_eq!(cfg.escalation.block_threshold, 3);
    assert_eq!(cfg.escalation.window, 10);
    assert_eq!(cfg.escalation.risk_threshold, 82);
    assert_eq!(cfg.event_bus.subscriber_buffer_size, 64);
    assert_eq!(cfg.event_bus.heartbeat_interval_secs, 15);
    assert_eq!(cfg.verification.diff_size_limit_bytes, 10 * 1024);
    assert_eq!(cfg.verification.drift_baseline_depth, 500);
    assert_eq!(cfg.chain.soft_cap_ms, 100);
}

#[test]
fn round_trips_through_toml() {
    let cfg = EngineConfig::default();
    let text = toml::to_string(&cfg).expect("serialize");
    let parsed: EngineConfig = toml::from_str(&text).expect("deserialize");
    assert_eq!(parsed.session.max_entries, cfg.session.max_entries);
}
