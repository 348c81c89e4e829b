//! The Data Sync Worker (`spec.md` §4.F): the second long-lived background task, independent of
//! the Core Loop, keeping the bar store current for whichever `(symbol, timeframe)` pairs the UI
//! has asked about.

use super::error::DataSyncError;
use super::store::BarStore;
use crate::event::{MessageTransmitter, Tx};
use crate::gate::{TerminalAdapter, TerminalGate};
use crate::model::bar::Timeframe;
use crate::shutdown::StopSignal;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{instrument, warn};

/// Rate limit between `(symbol, timeframe)` pairs within one sync task (`spec.md` §5).
pub const RATE_LIMIT: Duration = Duration::from_millis(500);

fn default_from_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single().expect("2020-01-01 is a valid date")
}

/// One unit of sync work (`spec.md` §4.F "a simple task channel of
/// `{symbols[], timeframes[], fromDate?, toDate?}`").
#[derive(Debug, Clone, PartialEq)]
pub struct SyncTask {
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

/// Structured progress event published alongside the localized `"已下载 k/N"` log line
/// (SPEC_FULL §11.2), so a non-UI consumer can track sync progress without string-matching it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncProgress {
    pub symbol: String,
    pub timeframe: &'static str,
    pub done: usize,
    pub total: usize,
}

/// Consumes [`SyncTask`]s against one [`TerminalGate`], writing into one [`BarStore`]. Uses
/// `master1`'s credentials as its terminal login — the only fixed policy tying data sync to a
/// particular account (`spec.md` §4.F).
pub struct DataSyncWorker<A: TerminalAdapter> {
    gate: Arc<TerminalGate<A>>,
    store: Arc<BarStore>,
    tasks: mpsc::UnboundedReceiver<SyncTask>,
    log: Tx<String>,
}

impl<A: TerminalAdapter> DataSyncWorker<A> {
    pub fn new(gate: Arc<TerminalGate<A>>, store: Arc<BarStore>, tasks: mpsc::UnboundedReceiver<SyncTask>, log: Tx<String>) -> Self {
        Self { gate, store, tasks, log }
    }

    /// Runs until the task channel closes or the process-global stop signal fires
    /// (`spec.md` §5 "the Core Loop and Data Sync Worker exit at their next sleep boundary").
    pub async fn run(mut self, mut stop: StopSignal) {
        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                maybe_task = self.tasks.recv() => {
                    match maybe_task {
                        Some(task) => self.run_task(task, &mut stop).await,
                        None => break,
                    }
                }
            }
            if stop.is_stopped() {
                break;
            }
        }
    }

    #[instrument(skip(self, task, stop), fields(symbols = task.symbols.len(), timeframes = task.timeframes.len()))]
    async fn run_task(&mut self, task: SyncTask, stop: &mut StopSignal) {
        let total = task.symbols.len() * task.timeframes.len();
        let mut done = 0usize;

        for symbol in &task.symbols {
            for timeframe in &task.timeframes {
                if stop.is_stopped() {
                    return;
                }

                if let Err(err) = self.sync_one(symbol, *timeframe, task.from_date, task.to_date).await {
                    warn!(symbol, timeframe = timeframe.as_str(), %err, "data sync failed for pair");
                }

                done += 1;
                self.log.send(format!("已下载 {done}/{total}"));
                if let Ok(progress_json) = serde_json::to_string(&SyncProgress {
                    symbol: symbol.clone(),
                    timeframe: timeframe.as_str(),
                    done,
                    total,
                }) {
                    self.log.send(progress_json);
                }

                stop.sleep_or_stop(RATE_LIMIT).await;
            }
        }
    }

    async fn sync_one(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
    ) -> Result<(), DataSyncError> {
        self.store.ensure_table(symbol, timeframe)?;

        let to = to_date.unwrap_or_else(Utc::now);
        let from = match from_date {
            Some(explicit) => explicit,
            None => self
                .store
                .max_time(symbol, timeframe)?
                .map(|latest| latest + ChronoDuration::seconds(1))
                .unwrap_or_else(default_from_date),
        };

        if from >= to {
            return Ok(());
        }

        let bars = self.gate.copy_rates_range(symbol, timeframe, from, to).await?;
        self.store.insert_bars(symbol, timeframe, &bars)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::test_util::FakeTerminal;
    use crate::model::Bar;

    fn bar(time: DateTime<Utc>, close: f64) -> Bar {
        Bar {
            time,
            open: close,
            high: close,
            low: close,
            close,
            tick_volume: 1,
            spread: 0,
            real_volume: 0,
        }
    }

    #[tokio::test]
    async fn a_task_fetches_and_stores_bars_then_reports_progress() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap();
        let terminal = FakeTerminal::new().with_bars("EURUSD", Timeframe::H1, vec![bar(t0, 1.1), bar(t0 + ChronoDuration::hours(1), 1.2)]);
        let gate = Arc::new(TerminalGate::new(terminal));
        let store = Arc::new(BarStore::in_memory().unwrap());

        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (log_tx, mut log_rx) = mpsc::unbounded_channel();
        let worker = DataSyncWorker::new(gate, store.clone(), task_rx, Tx::new(log_tx));

        let (stop_handle, stop_signal) = crate::shutdown::stop_signal();
        let run = tokio::spawn(worker.run(stop_signal));

        task_tx
            .send(SyncTask {
                symbols: vec!["EURUSD".to_string()],
                timeframes: vec![Timeframe::H1],
                from_date: Some(t0),
                to_date: Some(t0 + ChronoDuration::hours(2)),
            })
            .unwrap();

        let mut saw_localized = false;
        let mut saw_structured = false;
        for _ in 0..2 {
            let line = log_rx.recv().await.unwrap();
            if line.starts_with("已下载") {
                saw_localized = true;
            } else if line.contains("\"done\"") {
                saw_structured = true;
            }
        }
        assert!(saw_localized && saw_structured);

        drop(task_tx);
        stop_handle.stop();
        run.await.unwrap();

        let stored = store.get_range("EURUSD", Timeframe::H1, t0, t0 + ChronoDuration::hours(2)).unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn a_fromdate_past_todate_is_skipped_without_calling_the_gate() {
        let terminal = FakeTerminal::new();
        let gate = Arc::new(TerminalGate::new(terminal));
        let store = Arc::new(BarStore::in_memory().unwrap());
        let (_task_tx, task_rx) = mpsc::unbounded_channel::<SyncTask>();
        let (log_tx, _log_rx) = mpsc::unbounded_channel();
        let worker = DataSyncWorker::new(gate, store, task_rx, Tx::new(log_tx));

        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap();
        let result = worker
            .sync_one("EURUSD", Timeframe::H1, Some(t0 + ChronoDuration::hours(1)), Some(t0))
            .await;
        assert!(result.is_ok());
    }
}
