// Single-writer processing pipeline: one task owns the engine, requests arrive
// over a bounded channel, persistence runs on a timer and at shutdown

use crate::engine::{FlushReport, MonitorEngine, ProcessOutcome, RetentionReport};
use crate::error::{Result, VigiaError};
use crate::filtering::CandidateItem;
use crate::ledger::AlertRecord;
use crate::metrics::{AnomalyReport, DailyTotals};
use crate::storage::AlertStore;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};

enum Request {
    Process {
        item: CandidateItem,
        latency_ms: Option<f64>,
        reply: oneshot::Sender<Result<ProcessOutcome>>,
    },
    RollDaily {
        date: NaiveDate,
        reply: oneshot::Sender<DailyTotals>,
    },
    Cleanup {
        now: DateTime<Utc>,
        reply: oneshot::Sender<usize>,
    },
    Retention {
        today: NaiveDate,
        reply: oneshot::Sender<RetentionReport>,
    },
    Activity {
        now: DateTime<Utc>,
        reply: oneshot::Sender<AnomalyReport>,
    },
    Command {
        line: String,
        reply: oneshot::Sender<String>,
    },
    Flush {
        reply: oneshot::Sender<FlushReport>,
    },
}

/// Handle to the engine task
pub struct Pipeline {
    request_tx: mpsc::Sender<Request>,
    worker: Option<tokio::task::JoinHandle<MonitorEngine>>,
    flush_interval: Duration,
}

impl Pipeline {
    /// Spawn the engine task. Must be called from inside a tokio runtime.
    ///
    /// Alert-worthy records are forwarded on `alert_tx`; a full channel drops
    /// the notification (the record is still in the ledger).
    pub fn new(
        engine: MonitorEngine,
        store: Arc<dyn AlertStore>,
        alert_tx: mpsc::Sender<AlertRecord>,
        buffer_size: usize,
        flush_interval: Duration,
    ) -> Self {
        let (request_tx, request_rx) = mpsc::channel(buffer_size.max(1));

        let worker = Some(tokio::spawn(async move {
            engine_worker(engine, request_rx, store, alert_tx, flush_interval).await
        }));

        Self {
            request_tx,
            worker,
            flush_interval,
        }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.request_tx
            .send(build(reply))
            .await
            .map_err(|_| VigiaError::Pipeline("Pipeline channel closed".to_string()))?;
        rx.await
            .map_err(|_| VigiaError::Pipeline("Engine task dropped the reply".to_string()))
    }

    /// Process one item, waiting for queue space
    pub async fn submit(&self, item: CandidateItem) -> Result<ProcessOutcome> {
        self.submit_with_latency(item, None).await
    }

    pub async fn submit_with_latency(
        &self,
        item: CandidateItem,
        latency_ms: Option<f64>,
    ) -> Result<ProcessOutcome> {
        self.request(|reply| Request::Process {
            item,
            latency_ms,
            reply,
        })
        .await?
    }

    pub async fn roll_daily(&self, date: NaiveDate) -> Result<DailyTotals> {
        self.request(|reply| Request::RollDaily { date, reply }).await
    }

    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<usize> {
        self.request(|reply| Request::Cleanup { now, reply }).await
    }

    pub async fn apply_retention(&self, today: NaiveDate) -> Result<RetentionReport> {
        self.request(|reply| Request::Retention { today, reply }).await
    }

    pub async fn check_activity(&self, now: DateTime<Utc>) -> Result<AnomalyReport> {
        self.request(|reply| Request::Activity { now, reply }).await
    }

    /// Run an operator command; the reply is already formatted for chat
    pub async fn command(&self, line: impl Into<String>) -> Result<String> {
        let line = line.into();
        self.request(|reply| Request::Command { line, reply }).await
    }

    pub async fn flush(&self) -> Result<FlushReport> {
        self.request(|reply| Request::Flush { reply }).await
    }

    /// Stop accepting requests, drain the queue, flush, and hand the engine back
    pub async fn shutdown(mut self) -> Result<MonitorEngine> {
        drop(self.request_tx);

        let handle = self
            .worker
            .take()
            .ok_or_else(|| VigiaError::Pipeline("Pipeline already shut down".to_string()))?;

        tracing::info!("Waiting for pipeline to drain...");
        let engine = handle
            .await
            .map_err(|e| VigiaError::Pipeline(format!("Engine task failed: {}", e)))?;
        tracing::info!("Pipeline drained successfully");
        Ok(engine)
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }
}

async fn engine_worker(
    mut engine: MonitorEngine,
    mut request_rx: mpsc::Receiver<Request>,
    store: Arc<dyn AlertStore>,
    alert_tx: mpsc::Sender<AlertRecord>,
    flush_interval: Duration,
) -> MonitorEngine {
    let mut flush_timer = time::interval(flush_interval.max(Duration::from_millis(10)));
    flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = WorkerStats::default();

    loop {
        tokio::select! {
            request = request_rx.recv() => match request {
                Some(request) => {
                    handle(&mut engine, request, store.as_ref(), &alert_tx, &mut stats)
                }
                None => break,
            },

            _ = flush_timer.tick() => {
                if engine.has_pending() {
                    let report = engine.flush(store.as_ref());
                    if !report.is_complete() {
                        stats.flush_failures += 1;
                    }
                }
            }
        }
    }

    if engine.has_pending() {
        tracing::info!("Flushing pending state before exit");
        let report = engine.flush(store.as_ref());
        if !report.is_complete() {
            stats.flush_failures += 1;
        }
    }
    tracing::info!(
        "Engine worker finished: {} items processed, {} rejected, {} alerts forwarded, {} failed flushes",
        stats.processed,
        stats.rejected,
        stats.forwarded,
        stats.flush_failures
    );
    engine
}

fn handle(
    engine: &mut MonitorEngine,
    request: Request,
    store: &dyn AlertStore,
    alert_tx: &mpsc::Sender<AlertRecord>,
    stats: &mut WorkerStats,
) {
    match request {
        Request::Process {
            item,
            latency_ms,
            reply,
        } => {
            let result = engine.process(item, latency_ms);
            match &result {
                Ok(outcome) => {
                    stats.processed += 1;
                    if outcome.alert_worthy {
                        forward(alert_tx, &outcome.record, stats);
                    }
                }
                Err(e) => {
                    stats.rejected += 1;
                    tracing::warn!("Rejected item: {}", e);
                }
            }
            let _ = reply.send(result);
        }
        Request::RollDaily { date, reply } => {
            let _ = reply.send(engine.roll_daily(date));
        }
        Request::Cleanup { now, reply } => {
            let _ = reply.send(engine.cleanup(now));
        }
        Request::Retention { today, reply } => {
            let _ = reply.send(engine.apply_retention(today, store));
        }
        Request::Activity { now, reply } => {
            let _ = reply.send(engine.check_recent_activity(now));
        }
        Request::Command { line, reply } => {
            let _ = reply.send(super::dispatch(engine, &line, Utc::now()));
        }
        Request::Flush { reply } => {
            let report = engine.flush(store);
            if !report.is_complete() {
                stats.flush_failures += 1;
            }
            let _ = reply.send(report);
        }
    }
}

fn forward(alert_tx: &mpsc::Sender<AlertRecord>, record: &AlertRecord, stats: &mut WorkerStats) {
    match alert_tx.try_send(record.clone()) {
        Ok(()) => stats.forwarded += 1,
        Err(mpsc::error::TrySendError::Full(record)) => {
            tracing::warn!("Alert channel full, dropping notification for {}", record.id);
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!("Alert channel closed, notification not forwarded");
        }
    }
}

/// Statistics for the engine worker
#[derive(Default)]
struct WorkerStats {
    processed: u64,
    rejected: u64,
    forwarded: u64,
    flush_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::MemoryStore;

    fn pipeline(store: Arc<MemoryStore>) -> (Pipeline, mpsc::Receiver<AlertRecord>) {
        let engine = MonitorEngine::new(Config::default()).unwrap();
        let (alert_tx, alert_rx) = mpsc::channel(16);
        let pipeline = Pipeline::new(engine, store, alert_tx, 100, Duration::from_secs(60));
        (pipeline, alert_rx)
    }

    #[tokio::test]
    async fn test_pipeline_creation() {
        let (pipeline, _alerts) = pipeline(Arc::new(MemoryStore::new()));
        assert_eq!(pipeline.flush_interval(), Duration::from_secs(60));

        let engine = pipeline.shutdown().await.unwrap();
        assert!(engine.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_submit_returns_pending_outcome() {
        let (pipeline, mut alerts) = pipeline(Arc::new(MemoryStore::new()));

        let outcome = pipeline
            .submit(CandidateItem::new("Balacera en Yautepec", "fuente", Utc::now()))
            .await
            .unwrap();
        assert!(outcome.alert_worthy);
        assert_eq!(outcome.durability, crate::engine::Durability::Pending);

        let forwarded = alerts.recv().await.unwrap();
        assert_eq!(forwarded.id, outcome.record.id);

        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_item_is_rejected_without_stopping() {
        let (pipeline, _alerts) = pipeline(Arc::new(MemoryStore::new()));

        let err = pipeline
            .submit(CandidateItem::new("", "fuente", Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, VigiaError::InvalidInput(_)));

        assert!(pipeline
            .submit(CandidateItem::new("nota", "fuente", Utc::now()))
            .await
            .is_ok());
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_command_failure_is_a_reply() {
        let (pipeline, _alerts) = pipeline(Arc::new(MemoryStore::new()));
        let reply = pipeline.command("buscar inexistente").await.unwrap();
        assert!(reply.starts_with(crate::engine::FAILURE_PREFIX));
        pipeline.shutdown().await.unwrap();
    }
}
