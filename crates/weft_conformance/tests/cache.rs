//! Checksum and buffer cache conformance.

use std::time::{Duration, Instant};

use weft_cache::{BufferCache, NoRemote};
use weft_common::{Buffer, Checksum};

fn cache_with_grace(temp: Duration, temp_small: Duration) -> BufferCache {
    BufferCache::with_lifetimes(Box::new(NoRemote), 100_000, temp, temp_small)
}

#[test]
fn digests_are_deterministic_and_content_addressed() {
    let a = Checksum::from_bytes(b"the same bytes");
    let b = Checksum::from_bytes(b"the same bytes");
    let c = Checksum::from_bytes(b"different bytes");
    assert_eq!(a, b);
    assert_ne!(a, c);
    // SHA-256 of the empty input, pinned so the hash can never silently change
    assert_eq!(
        Checksum::from_bytes(b"").hex(),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    let restored: Checksum = a.hex().parse().unwrap();
    assert_eq!(restored, a);
}

#[test]
fn caching_identical_content_is_idempotent() {
    let mut cache = BufferCache::new(Box::new(NoRemote));
    let buffer = Buffer::from_text("stable");
    let checksum = buffer.checksum();
    cache.cache_buffer(checksum, buffer.clone()).unwrap();
    cache.cache_buffer(checksum, buffer).unwrap();
    assert!(cache.is_resident(checksum));
}

#[test]
fn divergent_content_for_one_checksum_is_fatal() {
    let mut cache = BufferCache::new(Box::new(NoRemote));
    let buffer = Buffer::from_text("original");
    let checksum = buffer.checksum();
    cache.cache_buffer(checksum, buffer).unwrap();
    let err = cache
        .cache_buffer(checksum, Buffer::from_text("forged"))
        .unwrap_err();
    assert!(err.to_string().contains("different buffer content"));
}

#[test]
fn referenced_buffers_survive_the_sweep() {
    let mut cache = cache_with_grace(Duration::ZERO, Duration::ZERO);
    let buffer = Buffer::from_text("pinned");
    let checksum = buffer.checksum();
    cache.incref_buffer(checksum, buffer).unwrap();
    cache.tick(Instant::now());
    assert!(cache.is_resident(checksum));
    assert_eq!(cache.refcount(checksum), 1);
}

#[test]
fn unreferenced_buffers_are_evicted_after_the_grace_period() {
    let mut cache = cache_with_grace(Duration::ZERO, Duration::ZERO);
    let buffer = Buffer::from_text("transient");
    let checksum = buffer.checksum();
    cache.incref_buffer(checksum, buffer).unwrap();
    cache.decref(checksum);
    cache.tick(Instant::now());
    assert!(!cache.is_resident(checksum));
}

#[test]
fn grace_period_delays_eviction() {
    let mut cache = cache_with_grace(Duration::from_secs(3600), Duration::from_secs(3600));
    let buffer = Buffer::from_text("still in grace");
    let checksum = buffer.checksum();
    cache.incref_buffer(checksum, buffer).unwrap();
    cache.decref(checksum);
    cache.tick(Instant::now());
    assert!(cache.is_resident(checksum));
}
