//! The query worker.
//!
//! ## Metrics
//!
//! `requests_queried`: Read round trips completed successfully
//! `query_failure`: Failed read round trips
//!
//! The timed phase is duration-bounded: a deadline task fires the stop
//! signal and every dispatch loop checks its watcher at iteration
//! boundaries, so in-flight round trips complete but no new one starts.
//! Parameter lists are generated ahead of time and partitioned per loop;
//! loops cycle through their own list and never touch another's.

use std::sync::Arc;

use metrics::counter;
use rand::{SeedableRng, rngs::SmallRng};
use tokio::{sync::mpsc::UnboundedSender, task::JoinSet, time::Instant};
use tracing::{debug, info};

use stampede_dataset::seed_to_u64;

use super::{Counters, Error, Pool};
use crate::{
    divide::divide_evenly,
    report::Message,
    sql::{Value, borrow_params, read::QueryKind},
};

/// Every eighth dispatch loop runs the heavy mix, with a floor of one.
const HEAVY_LOOP_DIVISOR: u32 = 8;

/// Configuration of this worker.
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker identity.
    pub id: String,
    /// Store connection string.
    pub connection_string: String,
    /// Dispatch loops to run.
    pub concurrency: u32,
    /// Connection pool bound.
    pub max_db_connections: u32,
    /// Parameter tuples to pre-generate across this worker's loops.
    pub workload: u32,
    /// Run only this shape instead of the mixed assignment.
    pub selector: Option<QueryKind>,
    /// Seed for parameter generation.
    pub seed: String,
}

/// The query worker.
#[derive(Debug)]
pub struct Query {
    config: Config,
    progress: UnboundedSender<Message>,
    /// Fired at deadline expiry or interrupt.
    stop: stampede_signal::Watcher,
}

/// The read shape assigned to dispatch loop `index` when no single-shape
/// selector is given. The first `max(1, concurrency / 8)` loops run the
/// heavy shapes round-robin; the rest rotate through the light shapes.
fn assign_shape(index: u32, concurrency: u32, selector: Option<QueryKind>) -> QueryKind {
    if let Some(kind) = selector {
        return kind;
    }
    let heavy_loops = (concurrency / HEAVY_LOOP_DIVISOR).max(1);
    if index < heavy_loops {
        QueryKind::HEAVY[index as usize % QueryKind::HEAVY.len()]
    } else {
        QueryKind::LIGHT[(index - heavy_loops) as usize % QueryKind::LIGHT.len()]
    }
}

impl Query {
    /// Create a new [`Query`] worker.
    #[must_use]
    pub fn new(
        config: Config,
        progress: UnboundedSender<Message>,
        stop: stampede_signal::Watcher,
    ) -> Self {
        Self {
            config,
            progress,
            stop,
        }
    }

    /// Run this worker until the stop signal fires.
    ///
    /// # Errors
    ///
    /// Function will return an error if pool construction fails.
    /// Per-operation failures are counted, never returned.
    pub async fn spin(self) -> Result<(), Error> {
        let Config {
            id,
            connection_string,
            concurrency,
            max_db_connections,
            workload,
            selector,
            seed,
        } = self.config;

        let mut rng = SmallRng::seed_from_u64(seed_to_u64(&seed));
        let shares = divide_evenly(workload, concurrency as usize);
        let mut assignments = Vec::with_capacity(concurrency as usize);
        for (index, share) in shares.into_iter().enumerate() {
            let kind = assign_shape(
                u32::try_from(index).expect("loop count fits in u32"),
                concurrency,
                selector,
            );
            assignments.push((kind, kind.param_list(&mut rng, share as usize)));
        }
        debug!(worker = %id, concurrency, workload, "parameters generated");

        let pool = super::build_pool(&connection_string, max_db_connections).await?;
        let counters = Arc::new(Counters::default());
        let labels = vec![("worker".to_string(), id.clone())];

        let _ = self.progress.send(Message::Init {
            worker: id.clone(),
            total_operations: u64::from(workload),
            concurrency,
            max_db_connections,
        });
        let started = Instant::now();

        let (done_watcher, done) = stampede_signal::signal();
        let ticker = tokio::spawn(super::progress_ticker(
            id.clone(),
            Arc::clone(&counters),
            started,
            self.progress.clone(),
            done_watcher,
        ));

        let mut handles = JoinSet::new();
        for (kind, params) in assignments {
            let loop_ = DispatchLoop {
                pool: pool.clone(),
                kind,
                params,
                counters: Arc::clone(&counters),
                labels: labels.clone(),
                stop: self.stop.clone(),
            };
            handles.spawn(loop_.spin());
        }
        while let Some(res) = handles.join_next().await {
            res?;
        }

        done.signal();
        ticker.await?;
        info!(worker = %id, "query worker complete");
        drop(pool);
        Ok(())
    }
}

struct DispatchLoop {
    pool: Pool,
    kind: QueryKind,
    params: Vec<Vec<Value>>,
    counters: Arc<Counters>,
    labels: Vec<(String, String)>,
    stop: stampede_signal::Watcher,
}

impl DispatchLoop {
    async fn spin(mut self) {
        if self.params.is_empty() {
            return;
        }
        let sql = self.kind.sql();
        let mut cursor = 0usize;
        loop {
            if self.stop.try_recv().unwrap_or(true) {
                return;
            }
            let params = &self.params[cursor % self.params.len()];
            cursor = cursor.wrapping_add(1);

            match self.pool.get().await {
                Ok(conn) => match conn.query(sql, &borrow_params(params)).await {
                    Ok(_rows) => {
                        self.counters.record_ok();
                        counter!("requests_queried", &self.labels).increment(1);
                    }
                    Err(err) => {
                        debug!("query failed: {err}");
                        self.counters.record_failure();
                        counter!("query_failure", &self.labels).increment(1);
                    }
                },
                Err(err) => {
                    debug!("connection checkout failed: {err}");
                    self.counters.record_failure();
                    counter!("query_failure", &self.labels).increment(1);
                }
            }
        }
    }
}
