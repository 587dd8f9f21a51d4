//! Several cache handles sharing one file, as separate processes would.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mcphub_core::EntityStatus;
use mcphub_store::{FileLock, StatusCache};

fn counting(calls: &AtomicUsize, status: EntityStatus) -> Result<EntityStatus, std::io::Error> {
    calls.fetch_add(1, Ordering::SeqCst);
    Ok(status)
}

#[test]
fn test_entries_written_by_one_handle_are_seen_by_another() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("status_cache.json");
    let writer = StatusCache::new(&path);
    let reader = StatusCache::new(&path);
    let calls = AtomicUsize::new(0);

    writer.get("boltz", || counting(&calls, EntityStatus::Both)).unwrap();
    let seen = reader
        .get("boltz", || counting(&calls, EntityStatus::NotInstalled))
        .unwrap();

    assert_eq!(seen, EntityStatus::Both);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(reader.invalidate("boltz").unwrap());
    assert_eq!(writer.lookup("boltz").unwrap(), None);
}

#[test]
fn test_ttl_is_judged_by_the_reader() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("status_cache.json");
    let long = StatusCache::new(&path);
    let short = StatusCache::new(&path).with_ttl(Duration::from_millis(30));

    long.store("esm", EntityStatus::Installed).unwrap();
    std::thread::sleep(Duration::from_millis(60));

    assert_eq!(long.lookup("esm").unwrap(), Some(EntityStatus::Installed));
    assert_eq!(short.lookup("esm").unwrap(), None);
}

#[test]
fn test_short_ttl_writer_keeps_entries_fresh_for_others() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("status_cache.json");
    let long = StatusCache::new(&path);
    let short = StatusCache::new(&path).with_ttl(Duration::from_millis(30));

    long.store("esm", EntityStatus::Installed).unwrap();
    std::thread::sleep(Duration::from_millis(60));
    short.store("boltz", EntityStatus::Both).unwrap();

    assert_eq!(long.lookup("esm").unwrap(), Some(EntityStatus::Installed));
    assert_eq!(long.lookup("boltz").unwrap(), Some(EntityStatus::Both));
    assert_eq!(short.lookup("esm").unwrap(), None);
}

#[test]
fn test_external_lock_holder_makes_cache_advisory() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("status_cache.json");
    let cache = StatusCache::new(&path).with_lock_timeout(Duration::from_millis(50));
    let calls = AtomicUsize::new(0);

    cache.store("msa", EntityStatus::Installed).unwrap();

    let lock = FileLock::acquire(&tmp.path().join("status_cache.json.lock"), Duration::from_secs(1)).unwrap();
    let status = cache
        .get("msa", || counting(&calls, EntityStatus::Both))
        .unwrap();
    assert_eq!(status, EntityStatus::Both);
    assert_eq!(cache.lookup("msa").unwrap_err().kind(), "cache_unavailable");
    drop(lock);

    assert_eq!(cache.lookup("msa").unwrap(), Some(EntityStatus::Installed));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_many_handles_racing_on_cold_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let path = Arc::new(tmp.path().join("status_cache.json"));
    let names = ["uniprot", "boltz", "esm", "msa"];

    let handles: Vec<_> = (0..names.len() * 2)
        .map(|i| {
            let path = Arc::clone(&path);
            let name = names[i % names.len()];
            std::thread::spawn(move || {
                let cache = StatusCache::new(path.as_path());
                cache
                    .get(name, || Ok::<_, std::io::Error>(EntityStatus::Installed))
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), EntityStatus::Installed);
    }

    let entries = StatusCache::new(path.as_path()).entries().unwrap();
    assert_eq!(entries.len(), names.len());
    let raw = std::fs::read_to_string(path.as_path()).unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&raw).is_ok());
}
