//! JSON fixture files for one dataset, one file per hierarchy level.
//!
//! The `dataset` subcommand writes these files and insert mode can load
//! them back instead of generating, so the same records can be replayed
//! against a rebuilt store or inspected by hand.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};

use crate::DataSet;

/// Fixture file names, companies down through impressions.
pub const FILE_NAMES: [&str; 5] = [
    "company.json",
    "campaign.json",
    "ads.json",
    "click.json",
    "impression.json",
];

/// Errors produced by fixture reading and writing.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Reading or writing a fixture file failed.
    #[error("{path:?}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },
    /// A fixture file did not hold the expected JSON.
    #[error("{path:?}: {source}")]
    Json {
        /// File path
        path: PathBuf,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },
    /// The loaded record counts do not form a walkable hierarchy.
    #[error(transparent)]
    DataSet(#[from] crate::Error),
}

/// Write a dataset as five JSON fixture files under `dir`, creating the
/// directory if needed.
///
/// # Errors
///
/// Returns an error when the directory or a file cannot be written.
pub fn write(dir: &Path, set: &DataSet) -> Result<(), Error> {
    fs::create_dir_all(dir).map_err(|source| Error::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    write_level(&dir.join(FILE_NAMES[0]), &set.companies)?;
    write_level(&dir.join(FILE_NAMES[1]), &set.campaigns)?;
    write_level(&dir.join(FILE_NAMES[2]), &set.ads)?;
    write_level(&dir.join(FILE_NAMES[3]), &set.clicks)?;
    write_level(&dir.join(FILE_NAMES[4]), &set.impressions)?;
    Ok(())
}

/// Load a dataset previously written by [`write`].
///
/// # Errors
///
/// Returns an error when a file is missing or malformed, or when the
/// loaded record counts do not form a walkable hierarchy.
pub fn load(dir: &Path) -> Result<DataSet, Error> {
    let companies = read_level(&dir.join(FILE_NAMES[0]))?;
    let campaigns = read_level(&dir.join(FILE_NAMES[1]))?;
    let ads = read_level(&dir.join(FILE_NAMES[2]))?;
    let clicks = read_level(&dir.join(FILE_NAMES[3]))?;
    let impressions = read_level(&dir.join(FILE_NAMES[4]))?;
    Ok(DataSet::from_parts(
        companies,
        campaigns,
        ads,
        clicks,
        impressions,
    )?)
}

fn write_level<T: Serialize>(path: &Path, records: &[T]) -> Result<(), Error> {
    let body = serde_json::to_vec_pretty(records).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, body).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_level<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, Error> {
    let body = fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&body).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::{DataSet, Ratios, Spec};

    use super::{Error, load, write};

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("stampede-{name}-{pid}", pid = std::process::id()))
    }

    #[test]
    fn written_fixtures_load_back_identically() {
        let spec = Spec {
            companies: 2,
            ratios: Ratios::default(),
        };
        let set = DataSet::generate("fixture-roundtrip", &spec).expect("valid spec");

        let dir = scratch_dir("roundtrip");
        write(&dir, &set).expect("fixtures write");
        let loaded = load(&dir).expect("fixtures load");
        std::fs::remove_dir_all(&dir).expect("scratch dir removed");

        assert_eq!(loaded, set);
        assert_eq!(loaded.total_records(), 2_242);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = scratch_dir("absent");
        assert!(matches!(load(&dir), Err(Error::Io { .. })));
    }

    #[test]
    fn truncated_fixture_is_refused() {
        let spec = Spec {
            companies: 2,
            ratios: Ratios::default(),
        };
        let set = DataSet::generate("fixture-truncated", &spec).expect("valid spec");

        let dir = scratch_dir("truncated");
        write(&dir, &set).expect("fixtures write");
        // Drop one campaign so the fan-out no longer divides evenly.
        let mut campaigns = set.campaigns;
        campaigns.pop();
        super::write_level(&dir.join(super::FILE_NAMES[1]), &campaigns)
            .expect("fixture overwritten");

        let result = load(&dir);
        std::fs::remove_dir_all(&dir).expect("scratch dir removed");
        assert!(matches!(result, Err(Error::DataSet(_))));
    }
}
