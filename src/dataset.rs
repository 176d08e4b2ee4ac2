//! Per-request materialization of a country's dataset.
//!
//! Each request downloads `{country}.db`, writes it to its own file under the
//! snapshot directory and opens it read-only. The [`Dataset`] owns both the
//! connection and the file; the file is removed when the dataset is closed or
//! dropped, whichever comes first.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rusqlite::{Connection, OpenFlags};
use uuid::Uuid;

use crate::{
    attractions::register_functions,
    error::{ApiError, Result},
    sqlite::SharedConnection,
    storage::SharedObjectStore,
};

pub const MAX_COUNTRY_CODE_LEN: usize = 64;

/// Check that a country code is safe to embed in object keys and file names.
///
/// # Errors
///
/// Returns [`ApiError::InvalidInput`] for empty, overlong or non
/// `[A-Za-z0-9_-]` codes.
pub fn validate_country(country: &str) -> Result<()> {
    let valid = !country.is_empty()
        && country.len() <= MAX_COUNTRY_CODE_LEN
        && country
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_');

    if valid {
        Ok(())
    } else {
        Err(ApiError::InvalidInput(format!(
            "invalid country code '{country}'"
        )))
    }
}

/// Object key of a country's database snapshot.
#[must_use]
pub fn snapshot_key(country: &str) -> String {
    format!("{country}.db")
}

/// Downloads and opens country datasets.
#[derive(Clone)]
pub struct DatasetMaterializer {
    store: SharedObjectStore,
    data_dir: PathBuf,
    retain_snapshots: bool,
}

impl DatasetMaterializer {
    #[must_use]
    pub fn new(store: SharedObjectStore, data_dir: PathBuf, retain_snapshots: bool) -> Self {
        Self {
            store,
            data_dir,
            retain_snapshots,
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Fetch, write and open the dataset for `country`.
    ///
    /// # Errors
    ///
    /// - [`ApiError::InvalidInput`] for a malformed country code
    /// - [`ApiError::UpstreamUnavailable`] when the snapshot cannot be fetched
    /// - [`ApiError::Io`] when the snapshot cannot be written locally
    /// - [`ApiError::QueryFailed`] when SQLite cannot open the file
    pub async fn open(&self, country: &str) -> Result<Dataset> {
        validate_country(country)?;

        let key = snapshot_key(country);
        let bytes = self
            .store
            .fetch(&key)
            .await
            .ok_or_else(|| ApiError::UpstreamUnavailable(country.to_string()))?;

        tokio::fs::create_dir_all(&self.data_dir).await?;
        let snapshot = Snapshot {
            path: self
                .data_dir
                .join(format!("{country}-{}.db", Uuid::new_v4())),
            retain: self.retain_snapshots,
            released: false,
        };
        tokio::fs::write(&snapshot.path, &bytes).await?;
        debug!(
            "Wrote {} bytes of {key} to {}",
            bytes.len(),
            snapshot.path.display()
        );

        let path = snapshot.path.clone();
        let connection = tokio::task::spawn_blocking(move || open_read_only(&path)).await??;

        info!("Opened dataset for {country}");
        Ok(Dataset {
            country: country.to_string(),
            connection: SharedConnection::new(connection),
            snapshot,
        })
    }
}

fn open_read_only(path: &Path) -> Result<Connection> {
    let connection = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    register_functions(&connection)?;
    Ok(connection)
}

/// An open, request-scoped country dataset.
///
/// Field order matters: the connection drops before the snapshot file is removed.
pub struct Dataset {
    country: String,
    connection: SharedConnection,
    snapshot: Snapshot,
}

impl Dataset {
    #[must_use]
    pub fn country(&self) -> &str {
        &self.country
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.snapshot.path
    }

    /// Run a query against the dataset on a blocking thread.
    ///
    /// # Errors
    ///
    /// Returns the query's own error or [`ApiError::Internal`] if it panicked.
    pub async fn run<T, F>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.connection.run(query).await
    }

    /// Close the connection and delete the snapshot file.
    ///
    /// Failures are logged, never returned: the request outcome is already decided.
    pub async fn close(self) {
        let Self {
            country,
            connection,
            snapshot,
        } = self;

        if let Err(err) = connection.close().await {
            warn!("Failed to close dataset for {country}: {err}");
        }
        snapshot.release().await;
        debug!("Closed dataset for {country}");
    }
}

/// Local snapshot file, removed on release or drop.
struct Snapshot {
    path: PathBuf,
    retain: bool,
    released: bool,
}

impl Snapshot {
    async fn release(mut self) {
        self.released = true;
        if self.retain {
            debug!("Retaining snapshot {}", self.path.display());
            return;
        }
        if let Err(err) = tokio::fs::remove_file(&self.path).await {
            warn!("Failed to remove snapshot {}: {err}", self.path.display());
        }
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        if self.released || self.retain {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed abandoned snapshot {}", self.path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!("Failed to remove snapshot {}: {err}", self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::attractions::{
        distinct_regions,
        test_support::{create_schema, insert, sample},
    };
    use crate::storage::MemoryObjectStore;

    fn snapshot_bytes(dir: &Path) -> Result<Vec<u8>> {
        let path = dir.join("fixture.db");
        let conn = Connection::open(&path)?;
        create_schema(&conn, true)?;
        insert(&conn, &sample(), true)?;
        conn.close().map_err(|(_, err)| err)?;
        Ok(std::fs::read(&path)?)
    }

    async fn materializer(
        retain: bool,
    ) -> Result<(TempDir, Arc<MemoryObjectStore>, DatasetMaterializer)> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(MemoryObjectStore::new());
        store.insert("jp.db", snapshot_bytes(dir.path())?).await;
        let materializer =
            DatasetMaterializer::new(store.clone(), dir.path().join("snapshots"), retain);
        Ok((dir, store, materializer))
    }

    fn snapshot_count(materializer: &DatasetMaterializer) -> usize {
        std::fs::read_dir(materializer.data_dir()).map_or(0, Iterator::count)
    }

    #[test]
    fn country_codes_are_validated() {
        assert!(validate_country("jp").is_ok());
        assert!(validate_country("new_zealand-2").is_ok());
        assert!(validate_country("").is_err());
        assert!(validate_country("../etc/passwd").is_err());
        assert!(validate_country("jp.db").is_err());
        assert!(validate_country(&"x".repeat(MAX_COUNTRY_CODE_LEN + 1)).is_err());
    }

    #[tokio::test]
    async fn open_query_close_removes_the_snapshot() -> Result<()> {
        let (_dir, _store, materializer) = materializer(false).await?;

        let dataset = materializer.open("jp").await?;
        assert_eq!(dataset.country(), "jp");
        assert!(dataset.path().exists());

        let regions = dataset.run(|conn| distinct_regions(conn, None)).await?;
        assert!(!regions.is_empty());

        let path = dataset.path().to_path_buf();
        dataset.close().await;
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn dropped_datasets_clean_up() -> Result<()> {
        let (_dir, _store, materializer) = materializer(false).await?;

        let dataset = materializer.open("jp").await?;
        let path = dataset.path().to_path_buf();
        drop(dataset);

        assert!(!path.exists());
        assert_eq!(snapshot_count(&materializer), 0);
        Ok(())
    }

    #[tokio::test]
    async fn retained_snapshots_stay_on_disk() -> Result<()> {
        let (_dir, _store, materializer) = materializer(true).await?;

        let dataset = materializer.open("jp").await?;
        let path = dataset.path().to_path_buf();
        dataset.close().await;

        assert!(path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_opens_use_distinct_files() -> Result<()> {
        let (_dir, store, materializer) = materializer(false).await?;

        let (first, second) = tokio::join!(materializer.open("jp"), materializer.open("jp"));
        let (first, second) = (first?, second?);
        assert_ne!(first.path(), second.path());
        assert_eq!(store.fetch_count(), 2);

        first.close().await;
        let still_there = second.run(|conn| distinct_regions(conn, None)).await?;
        assert!(!still_there.is_empty());
        second.close().await;
        assert_eq!(snapshot_count(&materializer), 0);
        Ok(())
    }

    #[tokio::test]
    async fn missing_snapshot_is_upstream_unavailable() -> Result<()> {
        let (_dir, _store, materializer) = materializer(false).await?;

        let err = materializer.open("fr").await.err();
        assert!(matches!(err, Some(ApiError::UpstreamUnavailable(country)) if country == "fr"));
        assert_eq!(snapshot_count(&materializer), 0);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_snapshot_fails_at_query_time() -> Result<()> {
        let (_dir, store, materializer) = materializer(false).await?;
        store.insert("xx.db", b"definitely not sqlite".to_vec()).await;

        let dataset = materializer.open("xx").await?;
        let result = dataset.run(|conn| distinct_regions(conn, None)).await;
        dataset.close().await;

        assert!(matches!(result, Err(ApiError::QueryFailed(_))));
        assert_eq!(snapshot_count(&materializer), 0);
        Ok(())
    }
}
