//! Progress aggregation and periodic throughput reporting.
//!
//! Workers send lifecycle and progress messages over a one-directional,
//! best-effort channel. The aggregator keeps one stat record per worker,
//! replacing it wholesale on each message since every message carries
//! fully cumulative values. A one-second timer merges the table into a
//! single structured report; a final report is emitted once every worker
//! has detached.

use rustc_hash::FxHashMap;
use tokio::{
    sync::mpsc::UnboundedReceiver,
    time::{self, Duration, Instant},
};
use tracing::info;

/// Cumulative progress values carried by [`Message::Progress`] and
/// [`Message::Done`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// Operations attempted so far.
    pub processed: u64,
    /// Operations that failed (timeout, refusal) so far.
    pub timeouts: u64,
    /// Seconds since the worker started its timed phase.
    pub elapsed_seconds: f64,
}

/// A worker-to-coordinator message.
#[derive(Debug, Clone)]
pub enum Message {
    /// The worker is live and about to start work.
    Init {
        /// Worker identity, `"{index}"` or `"{index}-{chunk}"`.
        worker: String,
        /// Operations this worker expects to perform.
        total_operations: u64,
        /// Dispatch loops the worker runs.
        concurrency: u32,
        /// Connection pool bound of the worker.
        max_db_connections: u32,
    },
    /// Periodic cumulative progress.
    Progress {
        /// Worker identity.
        worker: String,
        /// Cumulative values.
        snapshot: Snapshot,
    },
    /// Final cumulative values; the worker is finished.
    Done {
        /// Worker identity.
        worker: String,
        /// Cumulative values.
        snapshot: Snapshot,
    },
}

/// Per-worker stat record, replaced on every progress message.
#[derive(Debug, Clone, Copy)]
struct WorkerStat {
    done: bool,
    processed: u64,
    timeouts: u64,
    elapsed_seconds: f64,
}

/// One merged view across all currently-known workers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    /// Sum of worker processed counts.
    pub total_processed: u64,
    /// Sum of worker timeout counts.
    pub total_timeouts: u64,
    /// Sum of worker elapsed seconds, an approximation of parallel time
    /// spent.
    pub total_worker_seconds: f64,
    /// Fraction of the expected record total completed, in [0, 1].
    pub progress: f64,
    /// Rate between the last two samples, operations per second.
    pub current_rate: f64,
    /// Lifetime operations per second over the coordinator's wall clock.
    pub average_rate: f64,
    /// Wall clock seconds since the coordinator started.
    pub elapsed_seconds: f64,
    /// Workers seen so far.
    pub workers: usize,
    /// Workers that have sent [`Message::Done`].
    pub workers_done: usize,
}

/// Instantaneous rate from two `(processed, elapsed_seconds)` samples.
/// Zero when time has not advanced between samples.
#[must_use]
pub fn instantaneous_rate(previous: (u64, f64), current: (u64, f64)) -> f64 {
    let dt = current.1 - previous.1;
    if dt <= f64::EPSILON {
        return 0.0;
    }
    (current.0 as f64 - previous.0 as f64) / dt
}

/// Aggregates worker messages into a live merged view.
#[derive(Debug)]
pub struct Aggregator {
    stats: FxHashMap<String, WorkerStat>,
    total_expected: u64,
    started_at: Instant,
    last_sample: (u64, f64),
}

impl Aggregator {
    /// Create an aggregator expecting `total_expected` operations across
    /// the whole run.
    #[must_use]
    pub fn new(total_expected: u64) -> Self {
        Self {
            stats: FxHashMap::default(),
            total_expected,
            started_at: Instant::now(),
            last_sample: (0, 0.0),
        }
    }

    /// Fold one worker message into the stat table.
    pub fn apply(&mut self, message: Message) {
        match message {
            Message::Init {
                worker,
                total_operations,
                concurrency,
                max_db_connections,
            } => {
                info!(
                    worker = %worker,
                    total_operations, concurrency, max_db_connections, "worker joined"
                );
                self.stats.insert(
                    worker,
                    WorkerStat {
                        done: false,
                        processed: 0,
                        timeouts: 0,
                        elapsed_seconds: 0.0,
                    },
                );
            }
            Message::Progress { worker, snapshot } => {
                self.stats.insert(
                    worker,
                    WorkerStat {
                        done: false,
                        processed: snapshot.processed,
                        timeouts: snapshot.timeouts,
                        elapsed_seconds: snapshot.elapsed_seconds,
                    },
                );
            }
            Message::Done { worker, snapshot } => {
                info!(
                    worker = %worker,
                    processed = snapshot.processed,
                    timeouts = snapshot.timeouts,
                    elapsed_seconds = snapshot.elapsed_seconds,
                    "worker done"
                );
                self.stats.insert(
                    worker,
                    WorkerStat {
                        done: true,
                        processed: snapshot.processed,
                        timeouts: snapshot.timeouts,
                        elapsed_seconds: snapshot.elapsed_seconds,
                    },
                );
            }
        }
    }

    /// Whether any worker has reported yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Merge the stat table into a [`Report`] and advance the rate sample
    /// window.
    pub fn sample(&mut self) -> Report {
        let elapsed_seconds = self.started_at.elapsed().as_secs_f64();

        let mut total_processed = 0u64;
        let mut total_timeouts = 0u64;
        let mut total_worker_seconds = 0.0f64;
        let mut workers_done = 0usize;
        for stat in self.stats.values() {
            total_processed += stat.processed;
            total_timeouts += stat.timeouts;
            total_worker_seconds += stat.elapsed_seconds;
            if stat.done {
                workers_done += 1;
            }
        }

        let progress = if self.total_expected == 0 {
            1.0
        } else {
            (total_processed as f64 / self.total_expected as f64).min(1.0)
        };

        let current = (total_processed, elapsed_seconds);
        let current_rate = instantaneous_rate(self.last_sample, current);
        self.last_sample = current;

        let average_rate = if elapsed_seconds > f64::EPSILON {
            total_processed as f64 / elapsed_seconds
        } else {
            0.0
        };

        Report {
            total_processed,
            total_timeouts,
            total_worker_seconds,
            progress,
            current_rate,
            average_rate,
            elapsed_seconds,
            workers: self.stats.len(),
            workers_done,
        }
    }
}

fn emit(report: &Report, label: &str) {
    info!(
        total_processed = report.total_processed,
        total_timeouts = report.total_timeouts,
        total_worker_seconds = format_args!("{:.2}", report.total_worker_seconds),
        progress = format_args!("{:.4}", report.progress),
        current_rate = format_args!("{:.2}/s", report.current_rate),
        average_rate = format_args!("{:.2}/s", report.average_rate),
        elapsed_seconds = format_args!("{:.2}", report.elapsed_seconds),
        workers = report.workers,
        workers_done = report.workers_done,
        "{label}",
    );
}

/// Drain worker messages until every sender has dropped, emitting one
/// report per second and a final report at the end. Returns the final
/// merged view.
pub async fn run(mut messages: UnboundedReceiver<Message>, total_expected: u64) -> Report {
    let mut aggregator = Aggregator::new(total_expected);
    let mut ticker = time::interval(Duration::from_secs(1));
    // The first tick of a tokio interval fires immediately; consume it so
    // reports begin one second in.
    ticker.tick().await;

    loop {
        tokio::select! {
            message = messages.recv() => {
                match message {
                    Some(message) => aggregator.apply(message),
                    // All workers have detached.
                    None => break,
                }
            }
            _ = ticker.tick() => {
                // Quiet until the first worker joins; the stagger window
                // can run minutes and an empty report says nothing.
                if aggregator.is_empty() {
                    continue;
                }
                let report = aggregator.sample();
                emit(&report, "progress");
            }
        }
    }

    let report = aggregator.sample();
    emit(&report, "final");
    report
}

#[cfg(test)]
mod tests {
    use super::{Aggregator, Message, Snapshot, instantaneous_rate};

    fn progress(worker: &str, processed: u64, timeouts: u64, elapsed_seconds: f64) -> Message {
        Message::Progress {
            worker: worker.to_string(),
            snapshot: Snapshot {
                processed,
                timeouts,
                elapsed_seconds,
            },
        }
    }

    #[test]
    fn rate_between_two_samples() {
        let rate = instantaneous_rate((100, 10.0), (150, 15.0));
        assert!((rate - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rate_with_no_time_advance_is_zero() {
        assert!(instantaneous_rate((100, 10.0), (150, 10.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn messages_replace_rather_than_merge() {
        let mut aggregator = Aggregator::new(1_000);
        aggregator.apply(progress("0", 100, 1, 5.0));
        aggregator.apply(progress("0", 250, 2, 10.0));
        aggregator.apply(progress("1", 50, 0, 4.0));

        let report = aggregator.sample();
        assert_eq!(report.total_processed, 300);
        assert_eq!(report.total_timeouts, 2);
        assert_eq!(report.workers, 2);
        assert_eq!(report.workers_done, 0);
    }

    #[test]
    fn progress_is_monotone_and_clamped() {
        let mut aggregator = Aggregator::new(200);
        let mut last = 0.0f64;
        for (i, processed) in [10u64, 80, 150, 200, 250].iter().enumerate() {
            aggregator.apply(progress("0", *processed, 0, i as f64));
            let report = aggregator.sample();
            assert!(report.progress >= last);
            assert!(report.progress <= 1.0);
            last = report.progress;
        }
        assert!((last - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn done_marks_worker_complete() {
        let mut aggregator = Aggregator::new(100);
        aggregator.apply(Message::Init {
            worker: "0".to_string(),
            total_operations: 100,
            concurrency: 4,
            max_db_connections: 2,
        });
        aggregator.apply(Message::Done {
            worker: "0".to_string(),
            snapshot: Snapshot {
                processed: 100,
                timeouts: 3,
                elapsed_seconds: 12.5,
            },
        });

        let report = aggregator.sample();
        assert_eq!(report.workers_done, 1);
        assert_eq!(report.total_processed, 100);
        assert_eq!(report.total_timeouts, 3);
        assert!((report.total_worker_seconds - 12.5).abs() < f64::EPSILON);
    }

    // Before any worker joins, ticks are skipped rather than reported;
    // a fresh aggregator stays empty until the first message and a
    // sample of it carries no workers.
    #[test]
    fn aggregator_is_empty_until_first_message() {
        let mut aggregator = Aggregator::new(100);
        assert!(aggregator.is_empty());

        let report = aggregator.sample();
        assert_eq!(report.workers, 0);
        assert_eq!(report.total_processed, 0);

        aggregator.apply(Message::Init {
            worker: "0".to_string(),
            total_operations: 100,
            concurrency: 4,
            max_db_connections: 2,
        });
        assert!(!aggregator.is_empty());
    }

    #[test]
    fn zero_expected_total_is_complete() {
        let mut aggregator = Aggregator::new(0);
        aggregator.apply(progress("0", 0, 0, 0.0));
        let report = aggregator.sample();
        assert!((report.progress - 1.0).abs() < f64::EPSILON);
    }
}
