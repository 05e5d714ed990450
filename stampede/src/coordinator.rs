//! Run orchestration: budget division, ramp scheduling, worker spawning
//! and report collection.
//!
//! The coordinator never touches the store. It splits the run-wide
//! budgets fairly, schedules workers onto the ramp, then gets out of the
//! way: workers own their pools and counters, and the only traffic back
//! is the progress channel. A worker that fails is logged and the run
//! continues with the rest.

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinSet, time::Duration};
use tracing::{error, info, warn};

use stampede_dataset::fixtures;

use crate::{
    config::{self, Config},
    divide::divide_evenly,
    ramp,
    report::{self, Report},
    sql::read::QueryKind,
    worker::{insert, query},
};

/// Errors produced by [`Coordinator`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration rejected at run start.
    #[error("Configuration error: {0}")]
    Config(#[from] config::Error),
    /// The reporter task failed.
    #[error("Reporter join error: {0}")]
    Reporter(#[from] tokio::task::JoinError),
    /// Loading fixture files failed.
    #[error("Fixture error: {0}")]
    Fixtures(#[from] fixtures::Error),
}

/// Orchestrates one run, insert or query mode.
#[derive(Debug)]
pub struct Coordinator {
    config: Config,
    shutdown: stampede_signal::Watcher,
}

impl Coordinator {
    /// Create a new [`Coordinator`].
    #[must_use]
    pub fn new(config: Config, shutdown: stampede_signal::Watcher) -> Self {
        Self { config, shutdown }
    }

    /// Insert every assigned dataset, reporting throughput along the way.
    ///
    /// # Errors
    ///
    /// Returns an error when no connection string is available, fixture
    /// loading fails or the reporter task fails. Individual worker
    /// failures are logged, never propagated.
    pub async fn run_insert(self) -> Result<Report, Error> {
        let connection_string = self.config.connection_string()?;
        let workers = self.config.workers as usize;
        let concurrency = divide_evenly(self.config.concurrency, workers);
        let connections = divide_evenly(self.config.max_db_connections, workers);
        let data_sets = divide_evenly(self.config.data_sets, workers);
        let prebuilt = match &self.config.fixtures_dir {
            Some(dir) => {
                let set = fixtures::load(dir)?;
                info!(
                    fixtures_dir = %dir.display(),
                    records = set.total_records(),
                    "loaded fixtures"
                );
                Some(Arc::new(set))
            }
            None => None,
        };
        let records_per_set = prebuilt
            .as_ref()
            .map_or_else(|| self.config.dataset.total_records(), |set| set.total_records());
        let total_expected = u64::from(self.config.data_sets) * records_per_set;
        info!(
            workers,
            data_sets = self.config.data_sets,
            total_expected,
            "starting insert run"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = tokio::spawn(report::run(rx, total_expected));

        let mut handles = JoinSet::new();
        for index in 0..workers {
            let chunks = ramp::chunk_plan(data_sets[index], self.config.chunk_ceiling);
            let delay = ramp::stagger(index);
            // A budget share can round to zero when workers outnumber the
            // budget; a worker still needs one loop and one connection to
            // do anything at all.
            let loops = concurrency[index].max(1);
            let pool_size = connections[index].max(1);
            let dataset = self.config.dataset;
            let seed = self.config.seed.clone();
            let connection_string = connection_string.clone();
            let tx = tx.clone();
            let mut shutdown = self.shutdown.clone();
            let fixtures = prebuilt.clone();

            handles.spawn(async move {
                if !delay.is_zero() {
                    info!(worker = index, delay_seconds = delay.as_secs(), "staggered start");
                    tokio::time::sleep(delay).await;
                }
                for (chunk, &assigned) in chunks.iter().enumerate() {
                    // Between chunks is the cheap place to notice an
                    // interrupt; a chunk that has started will generate
                    // every one of its datasets before its dispatch loops
                    // first poll the signal.
                    if shutdown.try_recv().unwrap_or(true) {
                        info!(worker = index, chunk, "interrupted, remaining chunks skipped");
                        break;
                    }
                    let id = if chunks.len() == 1 {
                        index.to_string()
                    } else {
                        format!("{index}-{chunk}")
                    };
                    let config = insert::Config {
                        id: id.clone(),
                        connection_string: connection_string.clone(),
                        concurrency: loops,
                        max_db_connections: pool_size,
                        data_sets: assigned,
                        dataset,
                        seed: format!("{seed}-{id}"),
                        fixtures: fixtures.clone(),
                    };
                    let worker = insert::Insert::new(config, tx.clone(), shutdown.clone());
                    if let Err(err) = worker.spin().await {
                        error!(worker = %id, "insert worker failed: {err}");
                    }
                }
            });
        }
        // The reporter's channel closes once every worker has dropped its
        // sender.
        drop(tx);

        while let Some(res) = handles.join_next().await {
            if let Err(err) = res {
                error!("worker task failed: {err}");
            }
        }
        let report = reporter.await?;
        Ok(report)
    }

    /// Run the timed query phase, reporting throughput along the way.
    ///
    /// # Errors
    ///
    /// Returns an error when no connection string is available, the query
    /// selector is out of range or the reporter task fails. Individual
    /// worker failures are logged, never propagated.
    pub async fn run_query(self) -> Result<Report, Error> {
        let connection_string = self.config.connection_string()?;
        let workers = self.config.workers as usize;
        let concurrency = divide_evenly(self.config.concurrency, workers);
        let connections = divide_evenly(self.config.max_db_connections, workers);
        let workload = divide_evenly(
            u32::try_from(self.config.workload).unwrap_or(u32::MAX),
            workers,
        );
        let selector = match self.config.query {
            Some(index) => Some(
                QueryKind::from_index(index).ok_or(config::Error::QuerySelector(index))?,
            ),
            None => None,
        };
        let duration = Duration::from_secs(self.config.duration_seconds);
        let selector_label =
            selector.map_or_else(|| "mixed".to_string(), |kind| format!("{kind:?}"));
        info!(
            workers,
            duration_seconds = self.config.duration_seconds,
            selector = %selector_label,
            "starting query run"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = tokio::spawn(report::run(rx, self.config.workload as u64));

        // One stop signal covers the whole fleet; it fires at the deadline
        // or on interrupt, whichever comes first.
        let (stop, stop_broadcaster) = stampede_signal::signal();
        let shutdown = self.shutdown;
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(duration) => {
                    info!("query deadline reached");
                }
                () = shutdown.recv() => {
                    warn!("interrupted before the deadline");
                }
            }
            stop_broadcaster.signal();
        });

        let mut handles = JoinSet::new();
        for index in 0..workers {
            let config = query::Config {
                id: index.to_string(),
                connection_string: connection_string.clone(),
                concurrency: concurrency[index].max(1),
                max_db_connections: connections[index].max(1),
                workload: workload[index],
                selector,
                seed: format!("{seed}-{index}", seed = self.config.seed),
            };
            let worker = query::Query::new(config, tx.clone(), stop.clone());
            handles.spawn(async move {
                if let Err(err) = worker.spin().await {
                    error!(worker = index, "query worker failed: {err}");
                }
            });
        }
        drop(tx);
        drop(stop);

        while let Some(res) = handles.join_next().await {
            if let Err(err) = res {
                error!("worker task failed: {err}");
            }
        }
        let report = reporter.await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use stampede_dataset::Spec;

    use super::Coordinator;
    use crate::{config::Config, divide::divide_evenly, ramp};

    // The coordinator's budget arithmetic, checked end to end for the
    // documented defaults: 4 workers sharing 2000 loops, 40 connections
    // and 2000 datasets, chunked at 1000.
    #[test]
    fn default_budgets_divide_cleanly() {
        let concurrency = divide_evenly(2_000, 4);
        let connections = divide_evenly(40, 4);
        let data_sets = divide_evenly(2_000, 4);
        assert_eq!(concurrency, vec![500, 500, 500, 500]);
        assert_eq!(connections, vec![10, 10, 10, 10]);
        for assigned in data_sets {
            let chunks = ramp::chunk_plan(assigned, Some(ramp::DEFAULT_CHUNK_CEILING));
            assert_eq!(chunks, vec![500]);
        }
    }

    #[test]
    fn oversized_worker_assignment_ramps_in_chunks() {
        let data_sets = divide_evenly(2_500, 1);
        let chunks = ramp::chunk_plan(data_sets[0], Some(ramp::DEFAULT_CHUNK_CEILING));
        assert_eq!(chunks, vec![1_000, 1_000, 500]);
    }

    // An interrupt received before a chunk starts must stop the ramp
    // before that chunk generates its datasets or opens a pool. With the
    // signal already fired, no chunk runs and no worker ever joins the
    // reporter.
    #[tokio::test]
    async fn interrupt_before_start_skips_every_chunk() {
        let config = Config {
            connection_string: Some("host=localhost user=bench".to_string()),
            workers: 1,
            concurrency: 4,
            max_db_connections: 2,
            data_sets: 2_500,
            dataset: Spec {
                companies: 1,
                ..Spec::default()
            },
            ..Config::default()
        };
        let (shutdown, broadcaster) = stampede_signal::signal();
        broadcaster.signal();

        let report = Coordinator::new(config, shutdown)
            .run_insert()
            .await
            .expect("run completes");
        assert_eq!(report.workers, 0);
        assert_eq!(report.total_processed, 0);
    }
}
