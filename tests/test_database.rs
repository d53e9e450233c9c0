// SQLite alert store against a temporary database
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tempfile::TempDir;
use vigia::config::{Config, MetricsConfig};
use vigia::engine::MonitorEngine;
use vigia::filtering::{CandidateItem, Tier};
use vigia::metrics::MetricsAggregator;
use vigia::storage::{AlertStore, SqliteStore};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 18, 0, 0).unwrap()
}

fn store(dir: &TempDir) -> SqliteStore {
    SqliteStore::new(&dir.path().join("vigia.sqlite")).unwrap()
}

#[test]
fn test_engine_flush_and_restore_through_sqlite() {
    let temp_dir = TempDir::new().unwrap();
    let store = store(&temp_dir);
    let ids: Vec<String>;

    {
        let mut engine = MonitorEngine::new(Config::default()).unwrap();
        let texts = [
            "Se reporta un accidente grave en Cuautla",
            "Protesta en el congreso",
            "Hoy hace buen clima",
        ];
        ids = texts
            .iter()
            .map(|text| {
                let item = CandidateItem::new(*text, "diariodemorelos", t0());
                engine
                    .process_at(item, Some(40.0), t0())
                    .unwrap()
                    .record
                    .id
            })
            .collect();

        let report = engine.flush(&store);
        assert!(report.is_complete());
        assert_eq!(report.partitions_saved, 1);
        assert!(report.metrics_saved);
    }

    let stats = store.stats().unwrap();
    assert_eq!(stats.alert_count, 3);
    assert_eq!(stats.partition_count, 1);
    assert!(stats.metrics_saved_at.is_some());

    let mut engine = MonitorEngine::new(Config::default()).unwrap();
    let report = engine.restore_recent(&store, t0());
    assert!(report.failures.is_empty());
    assert_eq!(report.records_restored, 3);

    // Insertion order survives the round trip
    let date = engine.today(t0());
    let restored: Vec<&str> = engine
        .ledger()
        .partition(date)
        .unwrap()
        .iter()
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(restored, ids.iter().map(String::as_str).collect::<Vec<_>>());

    assert_eq!(engine.daily_summary(date).count(Tier::Urgent), 1);
    assert_eq!(engine.metrics().state().total_items, 3);
    assert!((engine.metrics().state().avg_latency_ms - 40.0).abs() < 1e-9);
}

#[test]
fn test_save_partition_replaces_previous_contents() {
    let temp_dir = TempDir::new().unwrap();
    let store = store(&temp_dir);
    let mut engine = MonitorEngine::new(Config::default()).unwrap();

    engine
        .process_at(CandidateItem::new("Balacera", "a", t0()), None, t0())
        .unwrap();
    engine.flush(&store);
    engine
        .process_at(CandidateItem::new("Incendio", "a", t0()), None, t0())
        .unwrap();
    engine.flush(&store);

    let date = engine.today(t0());
    assert_eq!(store.load_partition(date).unwrap().len(), 2);
    assert_eq!(store.stats().unwrap().alert_count, 2);
}

#[test]
fn test_purge_before_removes_old_partitions() {
    let temp_dir = TempDir::new().unwrap();
    let store = store(&temp_dir);
    let mut engine = MonitorEngine::new(Config::default()).unwrap();

    for days_ago in [40, 10, 0] {
        let at = t0() - Duration::days(days_ago);
        engine
            .process_at(CandidateItem::new(format!("nota {}", days_ago), "a", at), None, at)
            .unwrap();
    }
    engine.flush(&store);
    assert_eq!(store.partition_dates().unwrap().len(), 3);

    let report = engine.apply_retention(engine.today(t0()), &store);
    assert_eq!(report.purged_records, 1);
    assert!(report.failure.is_none());
    assert_eq!(store.partition_dates().unwrap().len(), 2);
    assert_eq!(
        report.cutoff,
        NaiveDate::from_ymd_opt(2026, 9, 17).unwrap()
    );
}

#[test]
fn test_metrics_snapshot_overwrites_single_row() {
    let temp_dir = TempDir::new().unwrap();
    let store = store(&temp_dir);

    let mut metrics = MetricsAggregator::new(MetricsConfig::default(), t0());
    store.save_metrics(metrics.state()).unwrap();

    let classification = vigia::filtering::Classification {
        tier: Tier::High,
        reason: "matched high terms: congreso".to_string(),
        matched_terms: ["congreso".to_string()].into_iter().collect(),
        classified_at: t0(),
    };
    metrics.ingest(&CandidateItem::new("congreso", "b", t0()), &classification, None);
    store.save_metrics(metrics.state()).unwrap();

    let loaded = store.load_metrics().unwrap().unwrap();
    assert_eq!(&loaded, metrics.state());

    let conn = store.get_conn().unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM metrics_snapshot", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
}
