// tests/recovery.rs
//
// Crash/restart semantics: a snapshot taken mid-flight must restore into a
// state the scheduler can resume from, without double-posting and without
// forgetting the rate window.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{Duration, Utc};

use trendcast::config::AppConfig;
use trendcast::fingerprint::Fingerprint;
use trendcast::model::{CanonicalItem, Region};
use trendcast::policy::{self, DenyReason, PostGate};
use trendcast::queue::{EntryState, PostQueue};
use trendcast::scheduler::Engine;
use trendcast::store::{FileStore, PersistedState};

fn temp_store(tag: &str) -> FileStore {
    static SEQ: AtomicU32 = AtomicU32::new(0);
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    FileStore::new(std::env::temp_dir().join(format!(
        "trendcast-recovery-{tag}-{}-{n}.json",
        std::process::id()
    )))
}

fn canonical(fp: &str, score: f64) -> CanonicalItem {
    CanonicalItem {
        fingerprint: Fingerprint::from_hex(fp),
        title: format!("story {fp}"),
        url: format!("https://ex.com/{fp}"),
        provenance: vec![],
        first_seen: Utc::now(),
        last_seen: Utc::now(),
        score,
        region: Region::Global,
        content_hash: format!("hash-{fp}"),
    }
}

#[tokio::test]
async fn entry_persisted_mid_generation_restores_to_pending_with_retries_kept() {
    let cfg = AppConfig::default();
    let store = temp_store("midflight");
    let now = Utc::now();

    // First life: one failed attempt, then the process dies mid-generation.
    {
        let mut queue = PostQueue::new(cfg.queue.clone());
        let key = queue.enqueue(&canonical("aa", 1.0), now).unwrap();
        queue.mark_selected(&key).unwrap();
        queue.mark_failed(&key, "publish 503", now).unwrap();
        queue.mark_selected(&key).unwrap();
        queue.mark_generating(&key).unwrap();

        let state = PersistedState {
            entries: queue.snapshot(),
            window: Default::default(),
        };
        store.save(&state).await.unwrap();
    }

    // Second life.
    let persisted = store.load().await.unwrap();
    let engine = Engine::restore(&cfg, persisted);

    let queue = engine.queue.read().unwrap();
    assert_eq!(queue.len(), 1);
    let e = queue.entries().next().unwrap();
    assert_eq!(e.state, EntryState::Pending);
    assert_eq!(e.retry_count, 1, "failure history survives the restart");
    assert_eq!(e.last_error.as_deref(), Some("publish 503"));

    let _ = tokio::fs::remove_file(store.path()).await;
}

#[tokio::test]
async fn posted_entry_still_blocks_reposting_after_restart() {
    let cfg = AppConfig::default();
    let store = temp_store("cooldown");
    let now = Utc::now();

    {
        let mut queue = PostQueue::new(cfg.queue.clone());
        let key = queue.enqueue(&canonical("aa", 1.0), now).unwrap();
        queue.mark_selected(&key).unwrap();
        queue.mark_generating(&key).unwrap();
        queue
            .mark_ready(
                &key,
                trendcast::generate::PostContent {
                    text_tr: "tr".into(),
                    text_en: "en".into(),
                    hashtags: vec![],
                },
            )
            .unwrap();
        queue.mark_posted(&key, "post-1".into(), now).unwrap();

        let state = PersistedState {
            entries: queue.snapshot(),
            window: Default::default(),
        };
        store.save(&state).await.unwrap();
    }

    let persisted = store.load().await.unwrap();
    let engine = Engine::restore(&cfg, persisted);

    let mut queue = engine.queue.write().unwrap();
    // Same trend resurfaces a few hours later, inside the cool-down.
    let later = now + Duration::hours(3);
    assert!(queue.enqueue(&canonical("aa", 2.0), later).is_none());
    // Same content under a different fingerprint is blocked too.
    let mut variant = canonical("bb", 2.0);
    variant.content_hash = "hash-aa".into();
    assert!(queue.enqueue(&variant, later).is_none());
    assert!(queue.next_candidate(later).is_none());

    let _ = tokio::fs::remove_file(store.path()).await;
}

#[tokio::test]
async fn posting_window_counters_survive_restart() {
    let cfg = AppConfig::default();
    let store = temp_store("window");
    let now = Utc::now();

    {
        let mut window = trendcast::policy::PostingWindowState::default();
        for _ in 0..cfg.policy.max_posts_per_window {
            window.record_post(now, cfg.policy.window_secs);
        }
        let state = PersistedState {
            entries: vec![],
            window,
        };
        store.save(&state).await.unwrap();
    }

    let persisted = store.load().await.unwrap();
    let engine = Engine::restore(&cfg, persisted);

    // Quiet hours disabled so only the window can deny.
    let mut policy_cfg = cfg.policy.clone();
    policy_cfg.quiet_start_hour = 0;
    policy_cfg.quiet_end_hour = 0;

    let window = engine.window.read().unwrap();
    let shortly_after = now + Duration::minutes(5);
    match policy::may_post(shortly_after, &window, &policy_cfg) {
        PostGate::Denied { reason, next_eligible } => {
            assert_eq!(reason, DenyReason::RateLimited);
            assert_eq!(next_eligible, now + Duration::seconds(policy_cfg.window_secs));
        }
        PostGate::Allowed => panic!("restart must not reset the rate window"),
    }

    let _ = tokio::fs::remove_file(store.path()).await;
}
