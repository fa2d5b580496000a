use chrono::{TimeDelta, Utc};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use upstream_stats::stats::{
    FileSnapshotStore, MemorySnapshotStore, PersistedSnapshot, RestoreOutcome, SnapshotStore,
    StatsCollector, StatsError, Window,
};
use upstream_stats::CollectorConfig;

const LP: &str = "https://api.launchpad.net/devel/ubuntu";
const NV: &str = "https://docs.nvidia.com/datacenter/tesla/drivers/releases.json";

fn file_collector(path: &std::path::Path) -> StatsCollector {
    let config = CollectorConfig::default().with_persist_path(path);
    StatsCollector::new(config, Box::new(FileSnapshotStore::new(path)))
}

fn window_with_traffic(start: chrono::DateTime<Utc>, span: TimeDelta) -> Window {
    let c = StatsCollector::new(CollectorConfig::default(), Box::new(MemorySnapshotStore::new()));
    c.record(LP, Duration::from_millis(120), 1, true);
    let mut window = c.current_window_info();
    window.start_time = start;
    window.end_time = start + span;
    window
}

#[test]
fn test_load_without_file_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileSnapshotStore::new(dir.path().join("missing.json"));
    assert!(store.load().expect("missing file is not an error").is_none());
}

#[test]
fn test_file_round_trip_reproduces_counters() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stats").join("statistics_data.json");

    // 1. Build some history and an open window
    let original = file_collector(&path);
    original.record(LP, Duration::from_millis(250), 0, true);
    original.record(NV, Duration::from_millis(800), 2, false);
    original.rotate();
    original.record(LP, Duration::from_millis(40), 0, true);
    original.rotate();
    original.record(NV, Duration::from_millis(75), 3, true);
    original.persist().expect("save should succeed");

    assert!(path.exists(), "Parent directory should be created on save");

    // 2. Restore into a new collector
    let restored = file_collector(&path);
    let outcome = restored.restore();
    assert_eq!(outcome, RestoreOutcome::Restored { windows: 2, resumed_current: true });

    // 3. Every window and domain matches
    let before = original.all_windows_snapshot();
    let after = restored.all_windows_snapshot();
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(**b, **a);
    }
    assert_eq!(original.current_window_info(), restored.current_window_info());
}

#[test]
fn test_save_leaves_no_temp_file_and_is_repeatable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("statistics_data.json");
    let store = FileSnapshotStore::new(&path);

    let c = file_collector(&path);
    c.record(LP, Duration::from_millis(10), 0, true);
    let snapshot = c.snapshot();

    store.save(&snapshot).expect("first save");
    store.save(&snapshot).expect("second save");

    assert!(!store.temp_path().exists(), "Temp file must be renamed away");
    let loaded = store.load().expect("load").expect("snapshot present");
    assert_eq!(loaded, snapshot);

    // Loading never mutates what is stored
    let again = store.load().expect("load").expect("snapshot present");
    assert_eq!(loaded, again);
}

#[test]
fn test_document_layout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("statistics_data.json");

    let c = file_collector(&path);
    c.record(LP, Duration::from_millis(250), 0, true);
    c.record(LP, Duration::from_millis(800), 2, false);
    c.persist().expect("save");

    let raw = fs::read_to_string(&path).expect("read saved file");
    let json: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert!(json["history"].is_array());
    assert!(json["saved_at"].is_string());
    let lp = &json["current_window"]["stats"]["launchpad"];
    assert_eq!(lp["domain"], "launchpad");
    assert_eq!(lp["total_requests"], 2);
    assert_eq!(lp["successful_requests"], 1);
    assert_eq!(lp["failed_requests"], 1);
    assert_eq!(lp["total_retries"], 2);
    assert_eq!(lp["average_response_ms"], 525.0);
    assert!(lp.get("total_response_time").is_none(), "Accumulator is not persisted raw");
}

#[test]
fn test_resumed_window_keeps_averaging() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("statistics_data.json");

    let c = file_collector(&path);
    c.record(LP, Duration::from_millis(100), 0, true);
    c.record(LP, Duration::from_millis(300), 0, true);
    c.persist().expect("save");

    let resumed = file_collector(&path);
    resumed.restore();
    resumed.record(LP, Duration::from_millis(600), 0, true);

    let lp = &resumed.current_window_snapshot()["launchpad"];
    assert_eq!(lp.total_requests, 3);
    assert!((lp.average_response_ms - 1000.0 / 3.0).abs() < 0.01, "got {}", lp.average_response_ms);
}

#[test]
fn test_stale_snapshot_is_ignored() {
    let now = Utc::now();
    let span = TimeDelta::minutes(10);
    let snapshot = PersistedSnapshot {
        history: vec![Arc::new(window_with_traffic(now - TimeDelta::hours(26), span))],
        current_window: window_with_traffic(now - TimeDelta::hours(25), span),
        saved_at: now - TimeDelta::hours(25),
    };

    let c = StatsCollector::new(CollectorConfig::default(), Box::new(MemorySnapshotStore::with_snapshot(snapshot)));
    assert_eq!(c.restore(), RestoreOutcome::Stale);
    assert_eq!(c.history_len(), 0);
    let current = c.current_window_info();
    assert!(current.stats.is_empty());
    assert!(!current.has_elapsed(Utc::now()));
}

#[test]
fn test_expired_current_window_is_discarded() {
    let now = Utc::now();
    let span = TimeDelta::minutes(10);
    let snapshot = PersistedSnapshot {
        history: vec![Arc::new(window_with_traffic(now - TimeDelta::minutes(40), span))],
        current_window: window_with_traffic(now - TimeDelta::minutes(30), span),
        saved_at: now - TimeDelta::minutes(21),
    };

    let c = StatsCollector::new(CollectorConfig::default(), Box::new(MemorySnapshotStore::with_snapshot(snapshot)));
    assert_eq!(c.restore_at(now), RestoreOutcome::Restored { windows: 1, resumed_current: false });

    let current = c.current_window_info();
    assert!(current.stats.is_empty(), "Elapsed window must not be resumed");
    assert_eq!(current.start_time, now);
    assert_eq!(c.all_windows_snapshot()[0].total_requests(), 1);
}

#[test]
fn test_open_current_window_is_resumed() {
    let now = Utc::now();
    let span = TimeDelta::minutes(10);
    let open = window_with_traffic(now - TimeDelta::minutes(2), span);
    let snapshot = PersistedSnapshot {
        history: Vec::new(),
        current_window: open.clone(),
        saved_at: now - TimeDelta::minutes(1),
    };

    let c = StatsCollector::new(CollectorConfig::default(), Box::new(MemorySnapshotStore::with_snapshot(snapshot)));
    assert_eq!(c.restore_at(now), RestoreOutcome::Restored { windows: 0, resumed_current: true });
    assert_eq!(c.current_window_info(), open);
}

#[test]
fn test_restored_history_respects_bound() {
    let now = Utc::now();
    let span = TimeDelta::minutes(10);
    let history: Vec<_> = (0..6)
        .map(|i| Arc::new(window_with_traffic(now - TimeDelta::minutes(70 - i * 10), span)))
        .collect();
    let newest = history[5].start_time;
    let snapshot = PersistedSnapshot {
        history,
        current_window: window_with_traffic(now, span),
        saved_at: now,
    };

    let config = CollectorConfig::default().with_max_windows(4);
    let c = StatsCollector::new(config, Box::new(MemorySnapshotStore::with_snapshot(snapshot)));
    assert_eq!(c.restore_at(now), RestoreOutcome::Restored { windows: 4, resumed_current: true });
    assert_eq!(c.all_windows_snapshot().last().map(|w| w.start_time), Some(newest));
}

#[test]
fn test_corrupt_file_starts_fresh() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("statistics_data.json");
    fs::write(&path, b"{ this is not json").expect("write garbage");

    let store = FileSnapshotStore::new(&path);
    assert!(matches!(store.load(), Err(StatsError::Malformed(_))));

    let c = StatsCollector::initialize(
        CollectorConfig::default().with_persist_path(&path),
        Box::new(store),
    );
    assert_eq!(c.history_len(), 0);

    // Still running: records and saves work, replacing the bad file
    c.record(LP, Duration::from_millis(1), 0, true);
    c.persist().expect("save over corrupt file");
    let fresh = file_collector(&path);
    assert!(matches!(fresh.restore(), RestoreOutcome::Restored { .. }));
}

#[test]
fn test_corrupt_file_restore_outcome() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("statistics_data.json");
    fs::write(&path, b"[]").expect("write wrong shape");

    let c = file_collector(&path);
    assert_eq!(c.restore(), RestoreOutcome::Corrupt);
}

#[test]
fn test_fresh_start_without_prior_state() {
    let c = StatsCollector::new(CollectorConfig::default(), Box::new(MemorySnapshotStore::new()));
    assert_eq!(c.restore(), RestoreOutcome::Fresh);
    assert_eq!(c.history_len(), 0);
}

#[test]
fn test_save_failure_is_reported_not_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    // The target path is an existing directory, so the final rename cannot succeed
    let path = dir.path().join("occupied");
    fs::create_dir(&path).expect("create dir");
    fs::write(path.join("keep"), b"x").expect("populate dir");

    let c = file_collector(&path);
    c.record(LP, Duration::from_millis(1), 0, true);
    assert!(matches!(c.persist(), Err(StatsError::Io { .. })));

    // In-memory state is still authoritative
    assert_eq!(c.current_window_snapshot()["launchpad"].total_requests, 1);
}

#[test]
fn test_memory_store_keeps_latest() {
    let store = MemorySnapshotStore::new();
    assert!(store.latest().is_none());

    let c = StatsCollector::new(CollectorConfig::default(), Box::new(MemorySnapshotStore::new()));
    c.record(LP, Duration::from_millis(1), 0, true);
    let snapshot = c.snapshot();
    store.save(&snapshot).expect("memory save");
    assert_eq!(store.latest(), Some(snapshot));
}

struct RecordingStore {
    saves: Arc<parking_lot::Mutex<Vec<PersistedSnapshot>>>,
}

impl SnapshotStore for RecordingStore {
    fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), StatsError> {
        // Widen the window in which an older save could overtake a newer one
        std::thread::sleep(Duration::from_millis(2));
        self.saves.lock().push(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedSnapshot>, StatsError> {
        Ok(self.saves.lock().last().cloned())
    }
}

#[test]
fn test_concurrent_saves_land_in_order() {
    let saves = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let config = CollectorConfig::default().with_max_windows(1_000);
    let c = Arc::new(StatsCollector::new(config, Box::new(RecordingStore { saves: Arc::clone(&saves) })));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let c = Arc::clone(&c);
            std::thread::spawn(move || {
                for _ in 0..10 {
                    c.rotate();
                    c.persist().expect("recording store never fails");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("saving thread panicked");
    }

    let saves = saves.lock();
    assert_eq!(saves.len(), 40);
    for pair in saves.windows(2) {
        assert!(pair[0].saved_at <= pair[1].saved_at, "Saves must land in the order they were taken");
        assert!(pair[0].history.len() <= pair[1].history.len(), "A later save must never hold older state");
    }
    assert_eq!(saves.last().map(|s| s.history.len()), Some(40));
}

fn saved_document(path: &std::path::Path) -> serde_json::Value {
    let c = file_collector(path);
    c.record(LP, Duration::from_millis(250), 0, true);
    c.record(LP, Duration::from_millis(800), 2, false);
    c.persist().expect("save");
    serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("valid json")
}

#[test]
fn test_inconsistent_counters_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("statistics_data.json");
    let mut doc = saved_document(&path);
    doc["current_window"]["stats"]["launchpad"]["total_requests"] = serde_json::json!(5);
    fs::write(&path, serde_json::to_vec(&doc).expect("encode")).expect("write");

    assert!(matches!(FileSnapshotStore::new(&path).load(), Err(StatsError::Malformed(_))));
    let c = file_collector(&path);
    assert_eq!(c.restore(), RestoreOutcome::Corrupt);
    assert!(c.current_window_snapshot().is_empty());
}

#[test]
fn test_mismatched_domain_key_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("statistics_data.json");
    let mut doc = saved_document(&path);
    let entry = doc["current_window"]["stats"]["launchpad"].clone();
    doc["current_window"]["stats"] = serde_json::json!({ "nvidia": entry });
    fs::write(&path, serde_json::to_vec(&doc).expect("encode")).expect("write");

    let c = file_collector(&path);
    assert_eq!(c.restore(), RestoreOutcome::Corrupt);
}
