//! Operator chat commands
//!
//! Commands are looked up in a static table. Every handler returns a reply
//! or an error; `dispatch` turns errors into a negative acknowledgment so a
//! bad command never takes the bot down.

use crate::engine::MonitorEngine;
use crate::error::{Result, VigiaError};
use crate::filtering::Tier;
use crate::ledger::{parse_date, AlertRecord};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt::Write;

/// Start of every reply to a failed command
pub const FAILURE_PREFIX: &str = "❌ operation failed: ";

const PREVIEW_CHARS: usize = 80;

pub type Handler = fn(&MonitorEngine, &[&str], DateTime<Utc>) -> Result<String>;

/// Name, usage and handler of every command
pub static COMMANDS: &[(&str, &str, Handler)] = &[
    ("resumen", "resumen [YYYY-MM-DD] - daily digest", cmd_summary),
    ("tendencias", "tendencias - trend digest", cmd_trends),
    ("semana", "semana [YYYY-MM-DD] - seven days ending at the date", cmd_week),
    ("buscar", "buscar <id|fingerprint> - show one alert", cmd_lookup),
    ("nivel", "nivel <TIER> [YYYY-MM-DD] - alerts of one tier", cmd_tier),
    ("ayuda", "ayuda - this help", cmd_help),
];

/// Run one command line, propagating errors
pub fn execute(engine: &MonitorEngine, line: &str, now: DateTime<Utc>) -> Result<String> {
    let line = line.trim().trim_start_matches('/');
    let mut words = line.split_whitespace();
    let name = words
        .next()
        .ok_or_else(|| VigiaError::invalid_argument("empty command"))?
        .to_lowercase();
    let args: Vec<&str> = words.collect();

    let (_, _, handler) = COMMANDS
        .iter()
        .find(|(command, _, _)| *command == name)
        .ok_or_else(|| {
            VigiaError::invalid_argument(format!("unknown command '{}', try 'ayuda'", name))
        })?;

    tracing::debug!("Running command {} {:?}", name, args);
    handler(engine, &args, now)
}

/// Run one command line; failures become a reply starting with `FAILURE_PREFIX`
pub fn dispatch(engine: &MonitorEngine, line: &str, now: DateTime<Utc>) -> String {
    match execute(engine, line, now) {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!("Command '{}' failed: {}", line.trim(), e);
            format!("{}{}", FAILURE_PREFIX, e)
        }
    }
}

fn date_arg(engine: &MonitorEngine, arg: Option<&&str>, now: DateTime<Utc>) -> Result<NaiveDate> {
    match arg {
        Some(s) => parse_date(s),
        None => Ok(engine.today(now)),
    }
}

fn cmd_summary(engine: &MonitorEngine, args: &[&str], now: DateTime<Utc>) -> Result<String> {
    let date = date_arg(engine, args.first(), now)?;
    Ok(engine.daily_digest(date, now))
}

fn cmd_trends(engine: &MonitorEngine, _args: &[&str], now: DateTime<Utc>) -> Result<String> {
    Ok(engine.trend_digest(now))
}

fn cmd_week(engine: &MonitorEngine, args: &[&str], now: DateTime<Utc>) -> Result<String> {
    let end = date_arg(engine, args.first(), now)?;
    Ok(engine.weekly_digest(end))
}

fn cmd_lookup(engine: &MonitorEngine, args: &[&str], _now: DateTime<Utc>) -> Result<String> {
    let key = args
        .first()
        .ok_or_else(|| VigiaError::invalid_argument("usage: buscar <id|fingerprint>"))?;
    let record = engine.ledger().lookup(key)?;
    Ok(describe(record))
}

fn cmd_tier(engine: &MonitorEngine, args: &[&str], now: DateTime<Utc>) -> Result<String> {
    let tier_name = args
        .first()
        .ok_or_else(|| VigiaError::invalid_argument("usage: nivel <TIER> [YYYY-MM-DD]"))?;
    let date = date_arg(engine, args.get(1), now)?;
    let records = engine.ledger().records_with_tier(date, tier_name)?;

    let tier: Tier = tier_name.parse()?;
    let mut out = format!("{} on {}: {}", tier, date, records.len());
    for record in records {
        let _ = write!(
            out,
            "\n  {} @{}: {}",
            record.id,
            record.item.source_handle,
            preview(&record.item.text)
        );
    }
    Ok(out)
}

fn cmd_help(_engine: &MonitorEngine, _args: &[&str], _now: DateTime<Utc>) -> Result<String> {
    let mut out = String::from("Commands:");
    for (_, usage, _) in COMMANDS {
        let _ = write!(out, "\n  {}", usage);
    }
    Ok(out)
}

fn describe(record: &AlertRecord) -> String {
    let mut out = format!(
        "🔎 {} [{}] @{}\n{}",
        record.id,
        record.tier(),
        record.item.source_handle,
        record.item.text
    );
    if let Some(url) = &record.item.url {
        let _ = write!(out, "\n{}", url);
    }
    let _ = write!(
        out,
        "\nReason: {}\nFingerprint: {}\nProcessed: {}",
        record.classification.reason,
        record.fingerprint,
        record.processed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if record.suppressed {
        let _ = write!(
            out,
            "\nSuppressed: {}",
            record.suppress_reason.as_deref().unwrap_or("yes")
        );
    }
    out
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}
