//! Plain-text digests for notifiers
//!
//! Rendering is read-only over summaries. Section order and labels are fixed
//! so downstream notifiers can rely on them:
//!
//! Daily digest:
//! ```text
//! 📊 Daily digest YYYY-MM-DD
//! Items: N | Alerts: N | Suppressed: N | Sources: N
//! By tier:
//!   URGENT: N
//!   HIGH: N
//!   MEDIUM: N
//!   LOW: N
//! Top sources:
//!   1. handle (N)
//! Top terms:
//!   1. term (N)
//! Totals: N items from N sources, avg latency N.N ms
//! ```
//!
//! Empty rankings render as `  (none)`.

use crate::filtering::{RankedCount, Tier};
use crate::ledger::LedgerSummary;
use crate::metrics::{AnomalyReport, MetricsSummary, TrendReport};
use std::fmt::Write;

pub const DAILY_TITLE: &str = "📊 Daily digest";
pub const TREND_TITLE: &str = "📈 Trend digest";
pub const WEEKLY_TITLE: &str = "🗓️ Weekly digest";
pub const ANOMALY_TITLE: &str = "🚨 Activity spike";

const NONE_LINE: &str = "  (none)";

fn ranked_section(out: &mut String, label: &str, ranked: &[RankedCount]) {
    let _ = writeln!(out, "{}:", label);
    if ranked.is_empty() {
        let _ = writeln!(out, "{}", NONE_LINE);
        return;
    }
    for (idx, entry) in ranked.iter().enumerate() {
        let _ = writeln!(out, "  {}. {} ({})", idx + 1, entry.key, entry.count);
    }
}

fn trend_line(label: &str, report: &TrendReport) -> String {
    match report.change_pct {
        Some(pct) => format!("{}: {} ({:+.1}%)", label, report.direction, pct),
        None => format!("{}: {}", label, report.direction),
    }
}

pub fn render_daily_digest(ledger: &LedgerSummary, metrics: &MetricsSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", DAILY_TITLE, ledger.date);
    let _ = writeln!(
        out,
        "Items: {} | Alerts: {} | Suppressed: {} | Sources: {}",
        ledger.total, ledger.alert_worthy, ledger.suppressed, ledger.distinct_sources
    );

    let _ = writeln!(out, "By tier:");
    for tier in Tier::DESCENDING {
        let _ = writeln!(out, "  {}: {}", tier, ledger.count(tier));
    }

    ranked_section(&mut out, "Top sources", &ledger.by_source);
    ranked_section(&mut out, "Top terms", &ledger.top_matched_terms);

    let _ = write!(
        out,
        "Totals: {} items from {} sources, avg latency {:.1} ms",
        metrics.total_items, metrics.total_sources, metrics.avg_latency_ms
    );
    out
}

pub fn render_trend_digest(metrics: &MetricsSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}",
        TREND_TITLE,
        metrics.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(out, "{}", trend_line("Items", &metrics.items_trend));
    let _ = writeln!(out, "{}", trend_line("Sources", &metrics.sources_trend));
    let _ = writeln!(
        out,
        "Active for {} days | {} items | {} sources",
        metrics.days_active, metrics.total_items, metrics.total_sources
    );

    ranked_section(&mut out, "Top sources", &metrics.top_sources);
    ranked_section(&mut out, "Top keywords", &metrics.top_keywords);

    let _ = writeln!(out, "New sources:");
    if metrics.recent_new_sources.is_empty() {
        let _ = writeln!(out, "{}", NONE_LINE);
    }
    for event in &metrics.recent_new_sources {
        let _ = writeln!(
            out,
            "  {} (since {})",
            event.source,
            event.first_seen.format("%Y-%m-%d")
        );
    }

    match &metrics.last_spike {
        Some(spike) => {
            let _ = write!(
                out,
                "Spikes: {} (last {} with {} items, {:.1}x)",
                metrics.spike_count,
                spike.detected_at.format("%Y-%m-%d %H:%M"),
                spike.hour_count,
                spike.ratio
            );
        }
        None => {
            let _ = write!(out, "Spikes: 0");
        }
    }
    out
}

/// One block per day, in the order given, plus a combined tier line
pub fn render_weekly_digest(days: &[LedgerSummary]) -> String {
    let mut out = String::new();
    match (days.first(), days.last()) {
        (Some(first), Some(last)) => {
            let _ = writeln!(out, "{} {} to {}", WEEKLY_TITLE, first.date, last.date);
        }
        _ => {
            let _ = write!(out, "{}\n{}", WEEKLY_TITLE, NONE_LINE);
            return out;
        }
    }

    for day in days {
        let _ = writeln!(
            out,
            "  {}: {} items, {} alerts, {} suppressed",
            day.date, day.total, day.alert_worthy, day.suppressed
        );
    }

    let total: usize = days.iter().map(|d| d.total).sum();
    let alerts: usize = days.iter().map(|d| d.alert_worthy).sum();
    let _ = writeln!(out, "Week: {} items, {} alerts", total, alerts);

    let tiers: Vec<String> = Tier::DESCENDING
        .iter()
        .map(|tier| {
            let count: usize = days.iter().map(|d| d.count(*tier)).sum();
            format!("{} {}", tier, count)
        })
        .collect();
    let _ = write!(out, "By tier: {}", tiers.join(" | "));
    out
}

pub fn render_anomaly(report: &AnomalyReport) -> String {
    if !report.is_anomaly {
        return format!("✅ {}", report.message);
    }
    format!(
        "{} [{}]\n{}\nLast hour: {} | Average: {:.1}/h | Threshold: {:.1}",
        ANOMALY_TITLE,
        report.tier,
        report.message,
        report.last_hour_count,
        report.average_per_hour,
        report.threshold
    )
}
