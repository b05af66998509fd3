// ==============================================
// CACHE OPERATION TESTS (integration)
// ==============================================
//
// Single-threaded behavior of the public cache surface: round trips,
// expiry, the fetch protocol, and destroy semantics. Time is driven by a
// ManualClock so expiry transitions are exact.

use std::sync::Arc;

use shardcache::prelude::*;

fn cache_at(max_total: usize, start: i64) -> (Cache<String, i64>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start));
    let cache = CacheBuilder::new("ops", max_total)
        .purge_policy(PurgePolicy::FastInline)
        .clock(clock.clone())
        .build();
    (cache, clock)
}

// ==============================================
// Round trips
// ==============================================

mod round_trip {
    use super::*;

    #[test]
    fn get_put_ttl_round_trip() {
        let (cache, _clock) = cache_at(100, 1_000);
        let k = "k".to_string();

        assert_eq!(cache.get(&k).unwrap(), None);
        assert_eq!(cache.ttl(&k).unwrap(), None);

        cache.put(k.clone(), 1, 10).unwrap();
        assert_eq!(cache.get(&k).unwrap().as_deref(), Some(&1));
        assert_eq!(cache.ttl(&k).unwrap(), Some(10));

        // Replacement updates both value and expiry.
        cache.put(k.clone(), 2, 12).unwrap();
        assert_eq!(cache.get(&k).unwrap().as_deref(), Some(&2));
        assert_eq!(cache.ttl(&k).unwrap(), Some(12));
    }

    #[test]
    fn stale_put_is_visible_to_ttl_until_read() {
        let (cache, _clock) = cache_at(100, 1_000);
        let stale = "stale".to_string();

        cache.put(stale.clone(), 3, -10).unwrap();
        assert_eq!(cache.ttl(&stale).unwrap(), Some(-10));

        // First read deletes the expired entry...
        assert_eq!(cache.get(&stale).unwrap(), None);
        // ...after which even ttl sees nothing.
        assert_eq!(cache.ttl(&stale).unwrap(), None);
    }

    #[test]
    fn entries_live_exactly_until_expiry() {
        let (cache, clock) = cache_at(100, 1_000);
        let k = "k".to_string();

        cache.put(k.clone(), 1, 10).unwrap();

        clock.advance(9);
        assert_eq!(cache.get(&k).unwrap().as_deref(), Some(&1));

        clock.advance(1);
        assert_eq!(cache.get(&k).unwrap(), None);
    }

    #[test]
    fn del_is_unconditional() {
        let (cache, _clock) = cache_at(100, 1_000);
        let k = "k".to_string();

        // Deleting an absent key succeeds.
        cache.del(&k).unwrap();

        cache.put(k.clone(), 1, 100).unwrap();
        cache.del(&k).unwrap();
        assert_eq!(cache.get(&k).unwrap(), None);
    }

    #[test]
    fn take_returns_the_entry_regardless_of_expiry() {
        let (cache, clock) = cache_at(100, 1_000);
        let k = "k".to_string();

        cache.put(k.clone(), 7, 5).unwrap();
        clock.advance(50);

        let entry = cache.take(&k).unwrap().expect("entry should be present");
        assert_eq!(entry.key(), &k);
        assert_eq!(entry.value(), &7);
        assert_eq!(entry.expires_at(), 1_005);
        assert_eq!(entry.remaining(clock.now()), -45);

        assert!(cache.take(&k).unwrap().is_none());
        assert_eq!(cache.get(&k).unwrap(), None);
    }

    #[test]
    fn entry_never_deletes() {
        let (cache, clock) = cache_at(100, 1_000);
        let k = "k".to_string();

        cache.put(k.clone(), 9, 5).unwrap();
        clock.advance(100);

        // Expired, but entry() still reads the raw slot.
        let entry = cache.entry(&k).unwrap().expect("raw entry should remain");
        assert_eq!(entry.value(), &9);
        assert_eq!(cache.size().unwrap(), 1);
    }
}

// ==============================================
// Fetch protocol
// ==============================================

mod fetch {
    use super::*;

    #[test]
    fn hit_skips_the_producer() {
        let (cache, _clock) = cache_at(100, 1_000);
        let f = "f".to_string();

        cache.put(f.clone(), 4, 10).unwrap();
        let outcome = cache
            .fetch(f.clone(), 100, |_| -> Produced<i64, String> {
                panic!("producer must not run on a hit")
            })
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::Hit(v) if *v == 4));
    }

    #[test]
    fn expired_hit_runs_the_producer() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache: Cache<String, String> = CacheBuilder::new("fetch", 100)
            .clock(clock.clone())
            .build();
        let f = "f".to_string();

        cache.put(f.clone(), "5".to_string(), -10).unwrap();
        let value = cache
            .try_fetch(f.clone(), 100, |key| -> Produced<String, String> {
                Produced::Store(format!("{key}x"))
            })
            .unwrap();
        assert_eq!(*value, "fx");

        // The produced value was cached under the fetch TTL.
        assert_eq!(cache.ttl(&f).unwrap(), Some(100));
    }

    #[test]
    fn skip_passes_through_without_caching() {
        let (cache, _clock) = cache_at(100, 1_000);
        let f2 = "f2".to_string();

        let outcome = cache
            .fetch(f2.clone(), 100, |_| -> Produced<i64, String> {
                Produced::Skip(42)
            })
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Skipped(42));
        assert_eq!(cache.get(&f2).unwrap(), None);
    }

    #[test]
    fn fail_propagates_without_caching() {
        let (cache, _clock) = cache_at(100, 1_000);
        let f3 = "f3".to_string();

        let outcome = cache
            .fetch(f3.clone(), 100, |_| -> Produced<i64, String> {
                Produced::Fail("np2".to_string())
            })
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Failed("np2".to_string()));
        assert_eq!(cache.get(&f3).unwrap(), None);
    }

    #[test]
    fn producer_ttl_overrides_the_call_site() {
        let (cache, _clock) = cache_at(100, 1_000);
        let f4 = "f4".to_string();

        let outcome = cache
            .fetch(f4.clone(), 0, |_| -> Produced<i64, String> {
                Produced::StoreFor(11, 5)
            })
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::Stored(v) if *v == 11));
        assert_eq!(cache.ttl(&f4).unwrap(), Some(5));
    }

    #[test]
    fn try_fetch_surfaces_producer_errors() {
        let (cache, _clock) = cache_at(100, 1_000);

        let err = cache
            .try_fetch("fail".to_string(), 100, |_| -> Produced<i64, String> {
                Produced::Fail("x".to_string())
            })
            .unwrap_err();
        assert_eq!(err, FetchError::Producer("x".to_string()));
    }

    #[test]
    fn try_fetch_unwraps_skips() {
        let clock = Arc::new(ManualClock::new(0));
        let cache: Cache<String, String> =
            CacheBuilder::new("fetch2", 100).clock(clock).build();

        let value = cache
            .try_fetch("k3".to_string(), 100, |key| -> Produced<String, String> {
                Produced::Skip(format!("o:{key}"))
            })
            .unwrap();
        assert_eq!(*value, "o:k3");
        assert_eq!(cache.get(&"k3".to_string()).unwrap(), None);
    }

    #[test]
    fn producer_observes_its_key() {
        let (cache, _clock) = cache_at(100, 1_000);

        let seen = std::cell::RefCell::new(Vec::new());
        for key in ["a", "b", "c"] {
            cache
                .fetch(key.to_string(), 100, |k| -> Produced<i64, String> {
                    seen.borrow_mut().push(k.clone());
                    Produced::Skip(0)
                })
                .unwrap();
        }
        assert_eq!(*seen.borrow(), vec!["a", "b", "c"]);
    }
}

// ==============================================
// Destroy semantics
// ==============================================

mod destroy {
    use super::*;

    #[test]
    fn every_operation_fails_after_destroy() {
        let (cache, _clock) = cache_at(100, 1_000);
        let k = "k".to_string();

        cache.put(k.clone(), 1, 100).unwrap();
        cache.destroy().unwrap();

        assert_eq!(cache.get(&k), Err(CacheGone));
        assert_eq!(cache.ttl(&k), Err(CacheGone));
        assert_eq!(cache.put(k.clone(), 2, 100), Err(CacheGone));
        assert_eq!(cache.del(&k), Err(CacheGone));
        assert!(cache.take(&k).is_err());
        assert!(cache.entry(&k).is_err());
        assert_eq!(cache.size(), Err(CacheGone));
        assert_eq!(cache.clear(), Err(CacheGone));
        assert_eq!(cache.contains(&k), Err(CacheGone));
        assert_eq!(cache.destroy(), Err(CacheGone));
        assert!(cache.for_each_segment(|_| {}).is_err());

        let fetched = cache.fetch(k, 100, |_| -> Produced<i64, String> { Produced::Skip(0) });
        assert_eq!(fetched, Err(CacheGone));
    }

    #[test]
    fn destroy_invalidates_every_clone() {
        let (cache, _clock) = cache_at(100, 1_000);
        let other = cache.clone();

        other.destroy().unwrap();
        assert_eq!(cache.size(), Err(CacheGone));
    }

    #[test]
    fn try_fetch_reports_gone() {
        let (cache, _clock) = cache_at(100, 1_000);
        cache.destroy().unwrap();

        let err = cache
            .try_fetch("k".to_string(), 100, |_| -> Produced<i64, String> {
                Produced::Skip(0)
            })
            .unwrap_err();
        assert_eq!(err, FetchError::Gone);
    }
}

// ==============================================
// Routing stability
// ==============================================

mod routing {
    use super::*;

    #[test]
    fn keys_stay_on_their_segment() {
        let (cache, _clock) = cache_at(10_000, 1_000);

        // Record which segment holds each key, then check the assignment
        // never changes across repeated writes.
        let segment_of = |cache: &Cache<String, i64>, key: &str| {
            cache
                .fold_segments(None, |found: Option<String>, segment| {
                    let mut hit = found;
                    segment.for_each(|k, _, _| {
                        if k == key {
                            hit = Some(segment.name().to_string());
                        }
                    });
                    hit
                })
                .unwrap()
        };

        for i in 0..200 {
            cache.put(format!("key{i}"), i, 600).unwrap();
        }
        let first: Vec<_> = (0..200)
            .map(|i| segment_of(&cache, &format!("key{i}")))
            .collect();

        for i in 0..200 {
            cache.put(format!("key{i}"), i + 1, 600).unwrap();
        }
        let second: Vec<_> = (0..200)
            .map(|i| segment_of(&cache, &format!("key{i}")))
            .collect();

        assert_eq!(first, second);
        assert!(first.iter().all(|s| s.is_some()));
    }
}
