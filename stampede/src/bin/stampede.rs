use std::{env, io::Read, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use stampede::{config::Config, coordinator::Coordinator, worker};
use stampede_dataset::{DataSet, fixtures};
use time::OffsetDateTime;
use tokio::{runtime::Builder, signal};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] stampede::config::Error),
    #[error("Coordinator returned an error: {0}")]
    Coordinator(#[from] stampede::coordinator::Error),
    #[error("Dataset generation error: {0}")]
    DataSet(#[from] stampede_dataset::Error),
    #[error("Fixture error: {0}")]
    Fixtures(#[from] fixtures::Error),
    #[error("Store error: {0}")]
    Store(#[from] worker::Error),
    #[error("Ping query failed: {0}")]
    Ping(#[from] tokio_postgres::Error),
    #[error("Ping connection checkout failed: {0}")]
    Checkout(#[from] bb8::RunError<tokio_postgres::Error>),
    #[error("Parsing prometheus address failed: {0}")]
    PrometheusAddr(#[from] std::net::AddrParseError),
}

fn default_config_path() -> String {
    "/etc/stampede/stampede.yaml".to_string()
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// path on disk to read configuration from
    #[clap(long, default_value_t = default_config_path())]
    config_path: String,
    /// store connection string, overriding the config file and environment
    #[clap(long)]
    connection_string: Option<String>,
    /// workers to spawn, overriding the config file
    #[clap(long)]
    workers: Option<u32>,
    /// dispatch loops across the run, overriding the config file
    #[clap(long)]
    concurrency: Option<u32>,
    /// store connections across the run, overriding the config file
    #[clap(long)]
    max_db_connections: Option<u32>,
    /// base seed, overriding the config file
    #[clap(long)]
    seed: Option<String>,
    /// address to bind the prometheus exporter to
    #[clap(long)]
    prometheus_addr: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate datasets and insert them into the store
    Insert {
        #[clap(flatten)]
        args: CommonArgs,
        /// dataset copies across the run, overriding the config file
        #[clap(long)]
        data_sets: Option<u32>,
        /// directory of fixture files to insert in place of generated
        /// datasets
        #[clap(long)]
        fixtures: Option<PathBuf>,
    },
    /// Run the timed read benchmark
    Query {
        #[clap(flatten)]
        args: CommonArgs,
        /// length of the timed phase in seconds, overriding the config file
        #[clap(long)]
        duration_seconds: Option<u64>,
        /// run a single read shape, selector 0 through 5
        #[clap(long)]
        query: Option<u8>,
    },
    /// Write one dataset's fixtures to disk as JSON
    Dataset {
        #[clap(flatten)]
        args: CommonArgs,
        /// directory to write fixture files into
        #[clap(long, default_value = "data")]
        out_dir: PathBuf,
        /// companies per dataset, overriding the config file
        #[clap(long)]
        companies: Option<u32>,
    },
    /// Check connectivity to the store
    Ping {
        #[clap(flatten)]
        args: CommonArgs,
    },
    /// Validate the configuration file and exit
    ConfigCheck {
        /// path on disk to read configuration from
        #[clap(long, default_value_t = default_config_path())]
        config_path: String,
    },
}

fn load_config_contents(config_path: &str) -> Result<String, Error> {
    if let Ok(env_var_value) = env::var("STAMPEDE_CONFIG") {
        debug!("Using config from env var 'STAMPEDE_CONFIG'");
        Ok(env_var_value)
    } else {
        debug!("Attempting to open configuration file at: {}", config_path);
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .open(config_path)
            .map_err(|err| {
                error!("Could not read config file '{}': {}", config_path, err);
                err
            })?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(contents)
    }
}

fn get_config(args: &CommonArgs) -> Result<Config, Error> {
    let contents = match load_config_contents(&args.config_path) {
        Ok(contents) => contents,
        // A missing config file is not fatal; every knob has a default or
        // a CLI override.
        Err(Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("No config file found, using defaults");
            String::from("{}")
        }
        Err(err) => return Err(err),
    };
    let mut config = Config::from_yaml(&contents)?;

    if args.connection_string.is_some() {
        config.connection_string.clone_from(&args.connection_string);
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(max_db_connections) = args.max_db_connections {
        config.max_db_connections = max_db_connections;
    }
    if let Some(ref seed) = args.seed {
        config.seed.clone_from(seed);
    }
    if let Some(ref addr) = args.prometheus_addr {
        config.prometheus_addr = Some(addr.parse()?);
    }
    Ok(config)
}

fn install_telemetry(config: &Config) {
    if let Some(addr) = config.prometheus_addr {
        let builder = PrometheusBuilder::new().with_http_listener(addr);
        tokio::spawn(async move {
            builder
                .install()
                .expect("failed to install prometheus recorder");
        });
    }
}

/// Fire the returned broadcaster's signal on interrupt.
fn spawn_interrupt_watcher() -> stampede_signal::Watcher {
    let (watcher, broadcaster) = stampede_signal::signal();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received");
                broadcaster.signal();
            }
            Err(err) => {
                error!("unable to listen for interrupt: {err}");
                // Dropping the broadcaster would fire the signal; hold it
                // instead.
                std::future::pending::<()>().await;
            }
        }
    });
    watcher
}

async fn inner_insert(config: Config) -> Result<(), Error> {
    install_telemetry(&config);
    let shutdown = spawn_interrupt_watcher();
    let report = Coordinator::new(config, shutdown).run_insert().await?;
    info!(
        total_processed = report.total_processed,
        total_timeouts = report.total_timeouts,
        average_rate = format_args!("{:.2}/s", report.average_rate),
        "insert run complete"
    );
    Ok(())
}

async fn inner_query(config: Config) -> Result<(), Error> {
    install_telemetry(&config);
    let shutdown = spawn_interrupt_watcher();
    let report = Coordinator::new(config, shutdown).run_query().await?;
    info!(
        total_processed = report.total_processed,
        total_timeouts = report.total_timeouts,
        average_rate = format_args!("{:.2}/s", report.average_rate),
        "query run complete"
    );
    Ok(())
}

async fn inner_dataset(config: Config, out_dir: PathBuf) -> Result<(), Error> {
    let seed = format!("{}-0", config.seed);
    let set = DataSet::generate(&seed, &config.dataset)?;
    info!(
        seed = %seed,
        companies = set.companies.len(),
        total_records = set.total_records(),
        out_dir = %out_dir.display(),
        "writing fixtures"
    );

    fixtures::write(&out_dir, &set)?;
    info!("fixtures written");
    Ok(())
}

async fn inner_ping(config: Config) -> Result<(), Error> {
    let connection_string = config.connection_string()?;
    let pool = worker::build_pool(&connection_string, 1).await?;
    let conn = pool.get().await?;
    let row = conn.query_one("SELECT NOW();", &[]).await?;
    let now: OffsetDateTime = row.try_get(0)?;
    info!(store_time = %now, "store is reachable");
    Ok(())
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .finish()
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting stampede {version} run.");

    let cli = Cli::parse();
    let runtime = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;

    let res = match cli.command {
        Commands::Insert {
            args,
            data_sets,
            fixtures,
        } => {
            let mut config = get_config(&args)?;
            if let Some(data_sets) = data_sets {
                config.data_sets = data_sets;
            }
            if fixtures.is_some() {
                config.fixtures_dir = fixtures;
            }
            runtime.block_on(inner_insert(config))
        }
        Commands::Query {
            args,
            duration_seconds,
            query,
        } => {
            let mut config = get_config(&args)?;
            if let Some(duration_seconds) = duration_seconds {
                config.duration_seconds = duration_seconds;
            }
            if query.is_some() {
                config.query = query;
            }
            runtime.block_on(inner_query(config))
        }
        Commands::Dataset {
            args,
            out_dir,
            companies,
        } => {
            let mut config = get_config(&args)?;
            if let Some(companies) = companies {
                config.dataset.companies = companies;
            }
            runtime.block_on(inner_dataset(config, out_dir))
        }
        Commands::Ping { args } => {
            let config = get_config(&args)?;
            runtime.block_on(inner_ping(config))
        }
        Commands::ConfigCheck { config_path } => {
            let contents = load_config_contents(&config_path)?;
            match Config::from_yaml(&contents) {
                Ok(_) => {
                    info!("Configuration is valid");
                    std::process::exit(0);
                }
                Err(err) => {
                    error!("Configuration is invalid: {err}");
                    std::process::exit(1);
                }
            }
        }
    };

    info!("Shutting down runtime.");
    runtime.shutdown_background();
    info!("Bye. :)");
    res
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands};

    #[test]
    fn insert_subcommand_parses_overrides() {
        let cli = Cli::parse_from([
            "stampede",
            "insert",
            "--workers",
            "2",
            "--data-sets",
            "10",
            "--connection-string",
            "postgres://localhost/bench",
            "--fixtures",
            "/var/lib/stampede/data",
        ]);
        match cli.command {
            Commands::Insert {
                args,
                data_sets,
                fixtures,
            } => {
                assert_eq!(args.workers, Some(2));
                assert_eq!(data_sets, Some(10));
                assert_eq!(
                    args.connection_string.as_deref(),
                    Some("postgres://localhost/bench")
                );
                assert_eq!(
                    fixtures,
                    Some(std::path::PathBuf::from("/var/lib/stampede/data"))
                );
            }
            _ => panic!("expected the insert subcommand"),
        }
    }

    #[test]
    fn query_subcommand_parses_selector() {
        let cli = Cli::parse_from(["stampede", "query", "--query", "3", "--duration-seconds", "5"]);
        match cli.command {
            Commands::Query {
                duration_seconds,
                query,
                ..
            } => {
                assert_eq!(duration_seconds, Some(5));
                assert_eq!(query, Some(3));
            }
            _ => panic!("expected the query subcommand"),
        }
    }

    #[test]
    fn dataset_subcommand_has_a_default_out_dir() {
        let cli = Cli::parse_from(["stampede", "dataset"]);
        match cli.command {
            Commands::Dataset { out_dir, .. } => {
                assert_eq!(out_dir, std::path::PathBuf::from("data"));
            }
            _ => panic!("expected the dataset subcommand"),
        }
    }
}
