use cc_statusline::cache::CacheStore;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// Writers racing on one key never leave a partial entry for readers
#[test]
fn test_concurrent_writers_never_expose_partial_entries() {
    let temp_dir = TempDir::new().unwrap();
    let store = CacheStore::new(temp_dir.path());
    let entry_path = temp_dir.path().join("shared.json");
    let blob = "x".repeat(64 * 1024);

    store
        .set("shared", json!({"writer": -1, "blob": blob}), Duration::from_secs(60), None)
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let done = Arc::clone(&done);
        let entry_path = entry_path.clone();
        let store = store.clone();
        let expected_len = blob.len();
        thread::spawn(move || {
            let mut reads = 0;
            while !done.load(Ordering::Relaxed) {
                let raw = std::fs::read(&entry_path).expect("entry disappeared");
                let parsed: Value = serde_json::from_slice(&raw).expect("partial entry observed");
                assert_eq!(parsed["data"]["blob"].as_str().unwrap().len(), expected_len);
                let hit = store.get("shared", None).expect("valid entry reported as miss");
                assert_eq!(hit["blob"].as_str().unwrap().len(), expected_len);
                reads += 1;
            }
            reads
        })
    };

    let writers: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            let blob = blob.clone();
            thread::spawn(move || {
                for n in 0..20 {
                    store
                        .set(
                            "shared",
                            json!({"writer": i, "n": n, "blob": blob}),
                            Duration::from_secs(60),
                            None,
                        )
                        .expect("cache write failed");
                }
            })
        })
        .collect();

    for w in writers {
        w.join().expect("writer panicked");
    }
    done.store(true, Ordering::Relaxed);
    let reads = reader.join().expect("reader panicked");
    assert!(reads > 0);

    // Last writer wins; no temp files are left behind.
    let last = store.get("shared", None).unwrap();
    assert!(last["writer"].as_i64().unwrap() >= 0);
    let leftovers = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn test_separate_keys_do_not_interfere() {
    let temp_dir = TempDir::new().unwrap();
    let store = CacheStore::new(temp_dir.path());

    let handles: Vec<_> = ["daily_cost", "burn_rate", "model_breakdown", "usage"]
        .into_iter()
        .enumerate()
        .map(|(i, key)| {
            let store = store.clone();
            thread::spawn(move || {
                store
                    .set(key, json!({"value": i}), Duration::from_secs(60), None)
                    .unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(store.get("daily_cost", None).unwrap()["value"], 0);
    assert_eq!(store.get("usage", None).unwrap()["value"], 3);
}
