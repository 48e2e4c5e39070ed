use rmpv::Value;

use super::*;
use crate::config::EvictionPolicy;

#[test]
fn test_estimate_value_shapes() {
    assert_eq!(estimate_value(&Value::Nil), 0);
    assert_eq!(estimate_value(&Value::Boolean(true)), 1);
    assert_eq!(estimate_value(&Value::from(7i64)), 8);
    assert_eq!(estimate_value(&Value::from("hi")), 4);
    assert!(estimate_value(&Value::Array(vec![Value::from(1i64), Value::from(2i64)])) > 24);
}

#[test]
fn test_estimate_bytes_overhead() {
    assert_eq!(estimate_bytes(&[]), 24);
    assert_eq!(estimate_bytes(&[0u8; 10]), 34);
}

#[test]
fn test_account_tracks_heap_estimate() {
    let governor = Governor::new(MemoryConfig::default());
    governor.account(100);
    governor.account(50);
    assert_eq!(governor.heap_bytes(), 150);
    governor.account(-40);
    assert_eq!(governor.heap_bytes(), 110);
}

#[test]
fn test_account_does_not_underflow() {
    let governor = Governor::new(MemoryConfig::default());
    governor.account(10);
    governor.account(-1000);
    assert_eq!(governor.heap_bytes(), 0);
}

#[test]
fn test_can_allocate_respects_ceiling() {
    let mut cfg = MemoryConfig::default();
    cfg.max_rss_bytes = 1;
    cfg.max_heap_bytes = 1;
    let governor = Governor::new(cfg);
    assert!(!governor.can_allocate(1));

    let governor = Governor::new(MemoryConfig::default());
    assert!(governor.can_allocate(1));
}

#[test]
fn test_record_access_and_forget() {
    let governor = Governor::new(MemoryConfig::default());
    let key = ("docs".to_string(), 1u64);
    governor.record_access(key.clone(), 10);
    assert!(governor.contains_recency(&key));
    assert_eq!(governor.recency_len(), 1);
    governor.forget(&key);
    assert!(!governor.contains_recency(&key));
}

#[test]
fn test_evict_candidates_none_policy_is_empty() {
    let mut cfg = MemoryConfig::default();
    cfg.eviction_policy = EvictionPolicy::None;
    let governor = Governor::new(cfg);
    governor.record_access(("docs".to_string(), 1), 1000);
    assert!(governor.evict_candidates(1).is_empty());
}

#[test]
fn test_evict_candidates_recency_policy_orders_oldest_first() {
    let mut cfg = MemoryConfig::default();
    cfg.eviction_policy = EvictionPolicy::Recency;
    let governor = Governor::new(cfg);
    governor.record_access(("docs".to_string(), 1), 100);
    governor.record_access(("docs".to_string(), 2), 100);
    let candidates = governor.evict_candidates(100);
    assert_eq!(candidates, vec![("docs".to_string(), 1)]);
}

#[test]
fn test_monitoring_idempotent_start_stop() {
    let governor = Governor::new(MemoryConfig::default());
    assert!(!governor.is_monitoring());
    governor.stop_monitoring();
    assert!(!governor.is_monitoring());
}
