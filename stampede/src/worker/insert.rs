//! The insert worker.
//!
//! ## Metrics
//!
//! `records_inserted`: Rows inserted successfully
//! `insert_failure`: Failed insert round trips
//! `subtrees_completed`: Company-rooted subtrees fully walked
//!
//! Datasets are generated, or loaded from fixtures, up front so the
//! timed phase measures the store, not the RNG. Work is handed out as
//! company-rooted subtrees: one
//! company and every campaign, ad, click and impression beneath it. A
//! dispatch loop owns a subtree from the parent insert to the last
//! impression, so parent ids are always in hand when a child row needs
//! them; unrelated subtrees proceed on other loops without ordering.

use std::sync::{Arc, Mutex};

use metrics::counter;
use tokio::{sync::mpsc::UnboundedSender, task::JoinSet, time::Instant};
use tracing::{debug, info};

use stampede_dataset::DataSet;

use super::{Counters, Error, Pool};
use crate::{
    report::Message,
    sql::{
        borrow_params,
        write::{
            INSERT_AD, INSERT_CAMPAIGN, INSERT_CLICK, INSERT_COMPANY, INSERT_IMPRESSION, ad_params,
            campaign_params, click_params, company_params, impression_params, returned_id,
        },
    },
};

/// Configuration of this worker.
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker identity, `"{index}"` or `"{index}-{chunk}"`.
    pub id: String,
    /// Store connection string.
    pub connection_string: String,
    /// Dispatch loops to run.
    pub concurrency: u32,
    /// Connection pool bound.
    pub max_db_connections: u32,
    /// Dataset copies to generate and insert.
    pub data_sets: u32,
    /// Shape of each dataset.
    pub dataset: stampede_dataset::Spec,
    /// Seed prefix; copy `i` is generated from `"{seed}-{i}"`.
    pub seed: String,
    /// Pre-loaded dataset inserted for every copy in place of
    /// generation.
    pub fixtures: Option<Arc<DataSet>>,
}

/// One unit of claimable work: a company and everything beneath it.
#[derive(Debug, Clone)]
struct Subtree {
    set: Arc<DataSet>,
    company: usize,
}

/// The insert worker.
#[derive(Debug)]
pub struct Insert {
    config: Config,
    progress: UnboundedSender<Message>,
    shutdown: stampede_signal::Watcher,
}

impl Insert {
    /// Create a new [`Insert`] worker.
    #[must_use]
    pub fn new(
        config: Config,
        progress: UnboundedSender<Message>,
        shutdown: stampede_signal::Watcher,
    ) -> Self {
        Self {
            config,
            progress,
            shutdown,
        }
    }

    /// Run this worker to completion or until a shutdown signal is
    /// received.
    ///
    /// # Errors
    ///
    /// Function will return an error if dataset generation or pool
    /// construction fails. Per-operation failures are counted, never
    /// returned.
    pub async fn spin(self) -> Result<(), Error> {
        let Config {
            id,
            connection_string,
            concurrency,
            max_db_connections,
            data_sets,
            dataset,
            seed,
            fixtures,
        } = self.config;

        let sets = collect_sets(data_sets, &dataset, &seed, fixtures.as_ref())?;
        let mut total_operations = 0u64;
        let mut subtrees = Vec::new();
        for set in sets {
            total_operations += set.total_records();
            for company in 0..set.companies.len() {
                subtrees.push(Subtree {
                    set: Arc::clone(&set),
                    company,
                });
            }
        }
        debug!(
            worker = %id,
            data_sets,
            subtrees = subtrees.len(),
            total_operations,
            "datasets prepared"
        );

        let pool = super::build_pool(&connection_string, max_db_connections).await?;
        let work = Arc::new(Mutex::new(subtrees));
        let counters = Arc::new(Counters::default());
        let labels = vec![("worker".to_string(), id.clone())];

        let _ = self.progress.send(Message::Init {
            worker: id.clone(),
            total_operations,
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
        for _ in 0..concurrency {
            let loop_ = DispatchLoop {
                pool: pool.clone(),
                work: Arc::clone(&work),
                counters: Arc::clone(&counters),
                labels: labels.clone(),
                shutdown: self.shutdown.clone(),
            };
            handles.spawn(loop_.spin());
        }
        while let Some(res) = handles.join_next().await {
            res?;
        }

        done.signal();
        ticker.await?;
        info!(worker = %id, "insert worker complete");
        // Dropping the pool releases this worker's connections.
        drop(pool);
        Ok(())
    }
}

/// Assemble the dataset copies to insert: clones of the pre-loaded
/// fixture set when one is given, otherwise one generated set per copy
/// with seeds `"{seed}-0"` through `"{seed}-{n-1}"`.
fn collect_sets(
    data_sets: u32,
    dataset: &stampede_dataset::Spec,
    seed: &str,
    fixtures: Option<&Arc<DataSet>>,
) -> Result<Vec<Arc<DataSet>>, stampede_dataset::Error> {
    (0..data_sets)
        .map(|i| match fixtures {
            Some(set) => Ok(Arc::clone(set)),
            None => DataSet::generate(&format!("{seed}-{i}"), dataset).map(Arc::new),
        })
        .collect()
}

struct DispatchLoop {
    pool: Pool,
    work: Arc<Mutex<Vec<Subtree>>>,
    counters: Arc<Counters>,
    labels: Vec<(String, String)>,
    shutdown: stampede_signal::Watcher,
}

impl DispatchLoop {
    async fn spin(mut self) {
        loop {
            if self.shutdown.try_recv().unwrap_or(true) {
                return;
            }
            let Some(subtree) = self.claim() else {
                return;
            };
            self.insert_subtree(&subtree).await;
            counter!("subtrees_completed", &self.labels).increment(1);
        }
    }

    fn claim(&self) -> Option<Subtree> {
        self.work.lock().expect("work lock poisoned").pop()
    }

    /// Walk one company-rooted subtree, parents before children. A failed
    /// parent insert skips its descendants: a child row with no real
    /// parent id is worth less than the referential integrity of the
    /// rows that do land.
    async fn insert_subtree(&self, subtree: &Subtree) {
        let set = &subtree.set;
        let campaigns_per_company = set.campaigns_per_company();
        let ads_per_campaign = set.ads_per_campaign();
        let clicks_per_ad = set.clicks_per_ad();
        let impressions_per_ad = set.impressions_per_ad();

        let company = &set.companies[subtree.company];
        let Some(company_id) = self
            .execute_returning(INSERT_COMPANY, &company_params(company))
            .await
        else {
            return;
        };

        for i in 0..campaigns_per_company {
            let pos1 = subtree.company * campaigns_per_company + i;
            let campaign = &set.campaigns[pos1];
            let Some(campaign_id) = self
                .execute_returning(INSERT_CAMPAIGN, &campaign_params(company_id, campaign))
                .await
            else {
                continue;
            };

            for j in 0..ads_per_campaign {
                let pos2 = pos1 * ads_per_campaign + j;
                let ad = &set.ads[pos2];
                let Some(ad_id) = self
                    .execute_returning(INSERT_AD, &ad_params(company_id, campaign_id, ad))
                    .await
                else {
                    continue;
                };

                for k in 0..clicks_per_ad {
                    let click = &set.clicks[pos2 * clicks_per_ad + k];
                    let params = click_params(company_id, ad_id, click);
                    self.execute_returning(INSERT_CLICK, &params).await;
                }

                for k in 0..impressions_per_ad {
                    let impression = &set.impressions[pos2 * impressions_per_ad + k];
                    let params = impression_params(company_id, ad_id, impression);
                    self.execute_returning(INSERT_IMPRESSION, &params).await;
                }
            }
        }
    }

    /// One insert round trip through the shared pool. `None` means the
    /// operation failed and was counted.
    async fn execute_returning(&self, sql: &str, params: &[crate::sql::Value]) -> Option<i64> {
        let conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(err) => {
                debug!("connection checkout failed: {err}");
                self.counters.record_failure();
                counter!("insert_failure", &self.labels).increment(1);
                return None;
            }
        };

        let result = conn.query_one(sql, &borrow_params(params)).await;
        match result.and_then(|row| returned_id(&row)) {
            Ok(id) => {
                self.counters.record_ok();
                counter!("records_inserted", &self.labels).increment(1);
                Some(id)
            }
            Err(err) => {
                debug!("insert failed: {err}");
                self.counters.record_failure();
                counter!("insert_failure", &self.labels).increment(1);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stampede_dataset::{DataSet, Spec};

    use super::{Subtree, collect_sets};

    #[test]
    fn subtree_claims_cover_every_company_once() {
        let spec = Spec {
            companies: 4,
            ..Spec::default()
        };
        let set = Arc::new(DataSet::generate("claim-test", &spec).expect("valid spec"));

        let mut subtrees: Vec<Subtree> = (0..set.companies.len())
            .map(|company| Subtree {
                set: Arc::clone(&set),
                company,
            })
            .collect();

        let mut seen = Vec::new();
        while let Some(subtree) = subtrees.pop() {
            seen.push(subtree.company);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn fixture_set_is_reused_for_every_copy() {
        let spec = Spec {
            companies: 1,
            ..Spec::default()
        };
        let fixture =
            Arc::new(DataSet::generate("fixture-reuse", &spec).expect("valid spec"));

        let sets = collect_sets(3, &spec, "ignored", Some(&fixture)).expect("sets assemble");
        assert_eq!(sets.len(), 3);
        for set in &sets {
            assert!(Arc::ptr_eq(set, &fixture));
        }
    }

    #[test]
    fn generated_copies_use_distinct_seeds() {
        let spec = Spec {
            companies: 1,
            ..Spec::default()
        };
        let sets = collect_sets(2, &spec, "0", None).expect("sets assemble");
        assert_eq!(sets.len(), 2);
        assert_ne!(sets[0], sets[1]);
    }

    #[test]
    fn subtree_index_arithmetic_stays_in_bounds() {
        let spec = Spec {
            companies: 3,
            ..Spec::default()
        };
        let set = DataSet::generate("bounds-test", &spec).expect("valid spec");

        let campaigns_per_company = set.campaigns_per_company();
        let ads_per_campaign = set.ads_per_campaign();
        let clicks_per_ad = set.clicks_per_ad();
        let impressions_per_ad = set.impressions_per_ad();

        let company = set.companies.len() - 1;
        let pos1 = company * campaigns_per_company + (campaigns_per_company - 1);
        let pos2 = pos1 * ads_per_campaign + (ads_per_campaign - 1);
        assert_eq!(pos1, set.campaigns.len() - 1);
        assert_eq!(pos2, set.ads.len() - 1);
        assert_eq!(
            pos2 * clicks_per_ad + (clicks_per_ad - 1),
            set.clicks.len() - 1
        );
        assert_eq!(
            pos2 * impressions_per_ad + (impressions_per_ad - 1),
            set.impressions.len() - 1
        );
    }
}
