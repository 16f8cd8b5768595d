use std::collections::HashMap;

use mnemo_core::config::{DEFAULT_MMR_LAMBDA, DEFAULT_WINDOW_SIZE};
use mnemo_core::MemoryConfig;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn defaults_apply_without_overrides() {
    let config = MemoryConfig::from_lookup(lookup(&[])).unwrap();
    assert_eq!(config, MemoryConfig::default());
    assert_eq!(config.window_size, DEFAULT_WINDOW_SIZE);
    assert_eq!(config.mmr_lambda, DEFAULT_MMR_LAMBDA);
}

#[test]
fn environment_overrides_defaults() {
    let config = MemoryConfig::from_lookup(lookup(&[
        ("MNEMO_WINDOW_SIZE", "4"),
        ("MNEMO_MMR_LAMBDA", "0.8"),
        ("MNEMO_TASK_CHUNK_SIZE", " 50 "),
    ]))
    .unwrap();

    assert_eq!(config.window_size, 4);
    assert_eq!(config.mmr_lambda, 0.8);
    assert_eq!(config.task_chunk_size, 50);
}

#[test]
fn invalid_values_are_rejected() {
    assert!(MemoryConfig::from_lookup(lookup(&[("MNEMO_WINDOW_SIZE", "lots")])).is_err());
    assert!(MemoryConfig::from_lookup(lookup(&[("MNEMO_WINDOW_SIZE", "0")])).is_err());
    assert!(MemoryConfig::from_lookup(lookup(&[("MNEMO_MMR_LAMBDA", "1.5")])).is_err());
}

#[test]
fn mmr_candidate_pool_has_a_floor() {
    let config = MemoryConfig::default();
    assert_eq!(config.mmr_candidate_limit(3), 10);
    assert_eq!(config.mmr_candidate_limit(8), 16);
}

#[test]
fn deserializes_partial_config() {
    let config: MemoryConfig = serde_json::from_str(r#"{"window_size": 6}"#).unwrap();
    assert_eq!(config.window_size, 6);
    assert_eq!(config.mmr_multiplier, 2);
}
