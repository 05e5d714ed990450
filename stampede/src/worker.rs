//! Workers, the unit of isolated load generation.
//!
//! A worker owns everything it touches: its connection pool, its share of
//! the dispatch-loop and connection budgets, and its progress counters.
//! The only things that cross a worker boundary are messages on the
//! progress channel and the shutdown signal.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use bb8_postgres::PostgresConnectionManager;
use tokio::{
    sync::mpsc::UnboundedSender,
    task::JoinError,
    time::{Duration, Instant},
};
use tokio_postgres::NoTls;
use tracing::info;

use crate::report::{Message, Snapshot};

pub mod insert;
pub mod query;

/// The connection pool shared by one worker's dispatch loops.
pub type Pool = bb8::Pool<PostgresConnectionManager<NoTls>>;

/// Errors produced by workers.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The connection string did not parse or the pool could not be
    /// established.
    #[error("Connection pool error: {0}")]
    Pool(#[from] tokio_postgres::Error),
    /// Dataset generation failed.
    #[error("Dataset generation error: {0}")]
    DataSet(#[from] stampede_dataset::Error),
    /// Child sub-task error.
    #[error("Child join error: {0}")]
    Child(#[from] JoinError),
}

/// Build a worker's pool. Timeouts match the reference client settings:
/// idle connections are recycled after 30s and a checkout waits up to
/// 60s before counting as a failure.
///
/// # Errors
///
/// Returns an error if the connection string does not parse or the
/// initial connection cannot be established.
pub async fn build_pool(connection_string: &str, max_size: u32) -> Result<Pool, Error> {
    let manager = PostgresConnectionManager::new_from_stringlike(connection_string, NoTls)?;
    let pool = bb8::Pool::builder()
        .max_size(max_size)
        .idle_timeout(Some(Duration::from_secs(30)))
        .connection_timeout(Duration::from_secs(60))
        .build(manager)
        .await?;
    Ok(pool)
}

/// Shared progress counters, incremented by dispatch loops and read by
/// the progress ticker.
#[derive(Debug, Default)]
pub struct Counters {
    processed: AtomicU64,
    timeouts: AtomicU64,
}

impl Counters {
    /// Record one successful operation.
    pub fn record_ok(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one failed operation. Failures never abort a loop.
    pub fn record_failure(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative values as of now.
    #[must_use]
    pub fn snapshot(&self, started: Instant) -> Snapshot {
        Snapshot {
            processed: self.processed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            elapsed_seconds: started.elapsed().as_secs_f64(),
        }
    }
}

/// Send cumulative progress once a second until `done` fires, then send
/// the final [`Message::Done`]. Send failures mean the coordinator has
/// gone away and are ignored.
pub(crate) async fn progress_ticker(
    worker: String,
    counters: Arc<Counters>,
    started: Instant,
    progress: UnboundedSender<Message>,
    done: stampede_signal::Watcher,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;

    let done_wait = done.recv();
    tokio::pin!(done_wait);
    loop {
        tokio::select! {
            () = &mut done_wait => {
                break;
            }
            _ = ticker.tick() => {
                let _ = progress.send(Message::Progress {
                    worker: worker.clone(),
                    snapshot: counters.snapshot(started),
                });
            }
        }
    }

    let snapshot = counters.snapshot(started);
    info!(
        worker = %worker,
        processed = snapshot.processed,
        timeouts = snapshot.timeouts,
        "worker finished"
    );
    let _ = progress.send(Message::Done { worker, snapshot });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::Instant;

    use super::Counters;

    #[test]
    fn failures_are_counted_apart_from_successes() {
        let counters = Counters::default();
        counters.record_ok();
        counters.record_ok();
        counters.record_failure();

        let snapshot = counters.snapshot(Instant::now());
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.timeouts, 1);
    }

    #[tokio::test]
    async fn ticker_sends_done_on_signal() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let (watcher, broadcaster) = stampede_signal::signal();
        let counters = Arc::new(Counters::default());
        counters.record_ok();

        let ticker = tokio::spawn(super::progress_ticker(
            "0".to_string(),
            Arc::clone(&counters),
            Instant::now(),
            tx,
            watcher,
        ));
        broadcaster.signal();
        ticker.await.expect("ticker joins");

        let mut saw_done = false;
        while let Ok(message) = rx.try_recv() {
            if let super::Message::Done { worker, snapshot } = message {
                assert_eq!(worker, "0");
                assert_eq!(snapshot.processed, 1);
                saw_done = true;
            }
        }
        assert!(saw_done);
    }
}
