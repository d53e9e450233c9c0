// End-to-end scenarios through the monitoring engine
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use vigia::config::Config;
use vigia::engine::{dispatch, Durability, MonitorEngine, FAILURE_PREFIX};
use vigia::filtering::{CandidateItem, Tier, DUPLICATE_REASON};
use vigia::storage::{AlertStore, MemoryStore};

fn t0() -> DateTime<Utc> {
    // 12:00 local time at the default UTC-6 offset
    Utc.with_ymd_and_hms(2026, 10, 17, 18, 0, 0).unwrap()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
}

fn engine() -> MonitorEngine {
    MonitorEngine::new(Config::default()).unwrap()
}

fn process(
    engine: &mut MonitorEngine,
    text: &str,
    source: &str,
    at: DateTime<Utc>,
) -> vigia::engine::ProcessOutcome {
    engine
        .process_at(CandidateItem::new(text, source, at), None, at)
        .unwrap()
}

#[test]
fn test_urgent_item_lands_in_todays_summary() {
    let mut engine = engine();
    let outcome = process(
        &mut engine,
        "Se reporta un accidente grave en Cuautla",
        "diariodemorelos",
        t0(),
    );

    assert_eq!(outcome.record.tier(), Tier::Urgent);
    assert!(!outcome.record.suppressed);
    assert!(outcome.alert_worthy);
    assert_eq!(outcome.durability, Durability::Pending);

    let summary = engine.daily_summary(today());
    assert_eq!(summary.count(Tier::Urgent), 1);
    assert_eq!(summary.total, 1);
}

#[test]
fn test_duplicate_within_cooldown_is_suppressed() {
    let mut engine = engine();
    let first = process(&mut engine, "¡Balacera en el centro de Cuernavaca!", "a", t0());
    let second = process(
        &mut engine,
        "balacera en el centro de cuernavaca",
        "b",
        t0() + Duration::minutes(10),
    );

    assert!(!first.record.suppressed);
    assert!(second.record.suppressed);
    assert_eq!(second.record.suppress_reason.as_deref(), Some(DUPLICATE_REASON));
    assert_eq!(first.record.fingerprint, second.record.fingerprint);
    assert!(!second.alert_worthy);

    let summary = engine.daily_summary(today());
    assert_eq!(summary.total, 2);
    assert_eq!(summary.suppressed, 1);
    assert_eq!(summary.alert_worthy, 1);
}

#[test]
fn test_duplicate_after_cooldown_alerts_again() {
    let mut engine = engine();
    process(&mut engine, "Balacera en el centro", "a", t0());
    let later = process(
        &mut engine,
        "Balacera en el centro",
        "a",
        t0() + Duration::milliseconds(3_600_000),
    );
    assert!(!later.record.suppressed);
    assert!(later.alert_worthy);
}

#[test]
fn test_low_tier_repeats_are_not_suppressed() {
    let mut engine = engine();
    for minute in 0..3 {
        let outcome = process(
            &mut engine,
            "Hoy hace buen clima",
            "a",
            t0() + Duration::minutes(minute),
        );
        assert!(!outcome.record.suppressed);
        assert_eq!(outcome.record.tier(), Tier::Low);
    }
}

#[test]
fn test_ranking_ties_follow_first_appearance() {
    let mut engine = engine();
    let mut at = t0();
    // Five mentions each, "diputado" first; distinct texts avoid suppression
    for i in 0..5 {
        process(&mut engine, &format!("El diputado habló {}", i), "x", at);
        at += Duration::seconds(1);
    }
    for i in 0..5 {
        process(&mut engine, &format!("Sesión en el congreso {}", i), "x", at);
        at += Duration::seconds(1);
    }

    let summary = engine.daily_summary(today());
    let terms: Vec<(&str, u64)> = summary
        .top_matched_terms
        .iter()
        .map(|r| (r.key.as_str(), r.count))
        .collect();
    assert_eq!(terms, vec![("diputado", 5), ("congreso", 5)]);
}

#[test]
fn test_partition_follows_local_midnight() {
    let mut engine = engine();
    // 05:30 UTC is still the previous day at UTC-6
    let early = Utc.with_ymd_and_hms(2026, 10, 18, 5, 30, 0).unwrap();
    process(&mut engine, "Incendio en bodega", "a", early);

    assert_eq!(engine.daily_summary(today()).total, 1);
    assert_eq!(
        engine
            .daily_summary(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap())
            .total,
        0
    );
}

#[test]
fn test_digests_render_after_processing() {
    let mut engine = engine();
    process(&mut engine, "Se reporta un accidente grave en Cuautla", "diariodemorelos", t0());
    process(&mut engine, "Protesta en el congreso", "noticias", t0());

    let daily = engine.daily_digest(today(), t0());
    assert!(daily.starts_with("📊 Daily digest 2026-10-17"));
    assert!(daily.contains("Items: 2 | Alerts: 2 | Suppressed: 0 | Sources: 2"));

    let weekly = engine.weekly_digest(today());
    assert!(weekly.contains("Week: 2 items, 2 alerts"));
    assert!(weekly.contains("2026-10-11"));
}

#[test]
fn test_operator_commands_against_engine() {
    let mut engine = engine();
    let outcome = process(&mut engine, "Sismo en Morelos", "sismologico", t0());

    let reply = dispatch(&engine, &format!("buscar {}", outcome.record.id), t0());
    assert!(reply.contains("[URGENT]"));

    let reply = dispatch(&engine, "nivel urgente", t0());
    assert!(reply.starts_with("URGENT on 2026-10-17: 1"));

    let reply = dispatch(&engine, "nivel", t0());
    assert!(reply.starts_with(FAILURE_PREFIX));
}

#[test]
fn test_store_outage_does_not_change_decisions() {
    let mut engine = engine();
    let store = MemoryStore::new();
    store.set_available(false);

    let first = process(&mut engine, "Balacera en el centro", "a", t0());
    assert!(!engine.flush(&store).is_complete());
    let second = process(&mut engine, "Balacera en el centro", "a", t0() + Duration::minutes(1));

    assert!(!first.record.suppressed);
    assert!(second.record.suppressed);

    store.set_available(true);
    let report = engine.flush(&store);
    assert!(report.is_complete());
    assert_eq!(store.load_partition(today()).unwrap().len(), 2);
}

#[test]
fn test_anomaly_check_uses_metrics_baseline() {
    let mut engine = engine();
    let start = engine.metrics().state().started_at;
    for i in 0..24 {
        process(&mut engine, &format!("nota {}", i), "a", start);
    }

    // 24 items over one active day: one per hour, threshold three
    let calm = engine.check_activity(3, start + Duration::hours(2));
    assert!(!calm.is_anomaly);
    let spike = engine.check_activity(4, start + Duration::hours(2));
    assert!(spike.is_anomaly);
    assert_eq!(spike.tier, Tier::High);
}
