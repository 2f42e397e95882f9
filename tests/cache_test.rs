//! Response cache properties: TTL expiry, exact LRU eviction, key
//! idempotence, and stats accounting.

use std::time::Duration;

use modelmux::{CacheConfig, CachedResponse, ResponseCache, TaskCategory, Turn};

fn entry(text: &str) -> CachedResponse {
    CachedResponse {
        response_text: text.into(),
        input_tokens: 100,
        output_tokens: 200,
        category: TaskCategory::Coding,
        selection_reason: "ranked first for coding".into(),
    }
}

#[test]
fn stored_entry_returned_verbatim_within_ttl() {
    let cache = ResponseCache::new(CacheConfig::default());
    let key = ResponseCache::key("gpt-4o-mini", "is 7 prime?", &[]);

    cache.insert(key, entry("yes"));
    let hit = cache.get(&key).unwrap();
    assert_eq!(hit.response_text, "yes");
    assert_eq!(hit.input_tokens, 100);
    assert_eq!(hit.category, TaskCategory::Coding);
}

#[test]
fn ttl_expiry_is_a_miss_even_without_writes() {
    let cache = ResponseCache::new(CacheConfig::new().ttl(Duration::from_millis(20)));
    let key = ResponseCache::key("m", "prompt", &[]);
    cache.insert(key, entry("stale"));

    assert!(cache.get(&key).is_some());
    std::thread::sleep(Duration::from_millis(40));
    assert!(cache.get(&key).is_none());
}

#[test]
fn at_capacity_one_more_key_evicts_exactly_the_lru() {
    let cache = ResponseCache::new(CacheConfig::new().max_entries(100));
    let keys: Vec<_> = (0..101)
        .map(|i| ResponseCache::key("m", &format!("prompt {i}"), &[]))
        .collect();

    for key in keys.iter().take(100) {
        cache.insert(*key, entry("x"));
    }
    // Touch everything except entry 37, making it the oldest.
    for (i, key) in keys.iter().take(100).enumerate() {
        if i != 37 {
            assert!(cache.get(key).is_some());
        }
    }

    cache.insert(keys[100], entry("new"));

    let stats = cache.stats();
    assert_eq!(stats.size, 100);
    assert_eq!(stats.evictions, 1);
    assert!(cache.get(&keys[37]).is_none(), "only the LRU entry is gone");
    assert!(cache.get(&keys[100]).is_some());
    assert!(cache.get(&keys[0]).is_some());
}

#[test]
fn keys_are_whitespace_and_case_insensitive() {
    let history = vec![Turn::user("earlier question"), Turn::assistant("answer")];
    let a = ResponseCache::key("m", "Is 7 Prime?", &history);
    let b = ResponseCache::key("m", "  is 7 prime?  ", &history);
    let c = ResponseCache::key("m", "is 7 prime?", &history);
    assert_eq!(a, b);
    assert_eq!(b, c);

    // Different model or history must not alias.
    assert_ne!(a, ResponseCache::key("other", "is 7 prime?", &history));
    assert_ne!(a, ResponseCache::key("m", "is 7 prime?", &[]));
}

#[test]
fn hit_rate_and_savings_derive_from_counters() {
    let cache = ResponseCache::new(CacheConfig::default());
    let key = ResponseCache::key("m", "prompt", &[]);

    assert!(cache.get(&key).is_none()); // miss
    cache.insert(key, entry("x"));
    for _ in 0..3 {
        assert!(cache.get(&key).is_some()); // hits
    }

    let stats = cache.stats();
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.total_requests, 4);
    assert!((stats.hit_rate - 0.75).abs() < 1e-9);
    assert!((stats.estimated_savings - 3.0 * 0.002).abs() < 1e-9);
}

#[tokio::test]
async fn background_sweeper_drops_expired_entries() {
    let cache = std::sync::Arc::new(ResponseCache::new(
        CacheConfig::new()
            .ttl(Duration::from_millis(10))
            .sweep_interval(Duration::from_millis(30)),
    ));
    let key = ResponseCache::key("m", "prompt", &[]);
    cache.insert(key, entry("x"));

    let handle = cache.spawn_sweeper();
    tokio::time::sleep(Duration::from_millis(80)).await;

    // The sweeper removed the corpse without any read touching it.
    assert_eq!(cache.stats().size, 0);
    handle.abort();
}
