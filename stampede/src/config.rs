//! This module controls configuration parsing from the end user, providing a
//! convenience mechanism for the rest of the program. Crashes are most likely
//! to originate from this code, intentionally.

use std::{io, net::SocketAddr, num::NonZeroU32, path::PathBuf};

use serde::Deserialize;

use crate::ramp;

/// Environment variable consulted for the store connection string when
/// the config file does not carry one.
pub const CONNECTION_STRING_VAR: &str = "PGCONNECTIONSTRING";

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// No connection string in the config file or the environment
    #[error("no connection string: set `connection_string` or the {CONNECTION_STRING_VAR} environment variable")]
    MissingConnectionString,
    /// A query selector outside the supported range
    #[error("query selector {0} is out of range, valid selectors are 0 through 5")]
    QuerySelector(u8),
    /// A zero value where at least one is required
    #[error("`{0}` must be at least 1")]
    Zero(&'static str),
}

fn default_workers() -> u32 {
    4
}

fn default_concurrency() -> u32 {
    2_000
}

fn default_max_db_connections() -> u32 {
    40
}

fn default_data_sets() -> u32 {
    2_000
}

fn default_duration_seconds() -> u64 {
    60
}

fn default_seed() -> String {
    "1".to_string()
}

fn default_chunk_ceiling() -> Option<NonZeroU32> {
    Some(ramp::DEFAULT_CHUNK_CEILING)
}

fn default_workload() -> usize {
    3_000_000
}

/// Main configuration struct for this program
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Store connection string; the `PGCONNECTIONSTRING` environment
    /// variable is consulted when absent.
    pub connection_string: Option<String>,
    /// Workers to spawn.
    #[serde(default = "default_workers")]
    pub workers: u32,
    /// Dispatch loops across the whole run, divided among workers.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    /// Store connections across the whole run, divided among workers.
    #[serde(default = "default_max_db_connections")]
    pub max_db_connections: u32,
    /// Datasets to insert across the whole run, divided among workers.
    #[serde(default = "default_data_sets")]
    pub data_sets: u32,
    /// Shape of each generated dataset.
    #[serde(default)]
    pub dataset: stampede_dataset::Spec,
    /// Length of the timed query phase.
    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: u64,
    /// Run a single read shape (selector 0 through 5) instead of the
    /// mixed heavy and light assignment.
    #[serde(default)]
    pub query: Option<u8>,
    /// Base seed; worker seeds derive from it.
    #[serde(default = "default_seed")]
    pub seed: String,
    /// Largest per-chunk dataset assignment during ramp. Explicit null
    /// disables chunking.
    #[serde(default = "default_chunk_ceiling")]
    pub chunk_ceiling: Option<NonZeroU32>,
    /// Pre-generated query parameter tuples across the whole run.
    #[serde(default = "default_workload")]
    pub workload: usize,
    /// Directory of fixture files, as written by the `dataset`
    /// subcommand, inserted in place of generated datasets.
    #[serde(default)]
    pub fixtures_dir: Option<PathBuf>,
    /// Address to expose prometheus metrics on, if any.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        serde_yaml::from_str("{}").expect("defaults deserialize")
    }
}

impl Config {
    /// Parse a config from yaml.
    ///
    /// # Errors
    ///
    /// Returns an error if the yaml does not parse or names out-of-range
    /// values.
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if let Some(query) = self.query {
            if usize::from(query) >= crate::sql::read::QueryKind::ALL.len() {
                return Err(Error::QuerySelector(query));
            }
        }
        if self.workers == 0 {
            return Err(Error::Zero("workers"));
        }
        if self.concurrency == 0 {
            return Err(Error::Zero("concurrency"));
        }
        if self.max_db_connections == 0 {
            return Err(Error::Zero("max_db_connections"));
        }
        Ok(())
    }

    /// The connection string, from the config file or the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if neither source provides one.
    pub fn connection_string(&self) -> Result<String, Error> {
        if let Some(cs) = &self.connection_string {
            return Ok(cs.clone());
        }
        std::env::var(CONNECTION_STRING_VAR).map_err(|_| Error::MissingConnectionString)
    }
}
