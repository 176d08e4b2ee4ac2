//! Shared SQLite connection whose work runs on the blocking thread pool.

use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use rusqlite::Connection;

use crate::error::{ApiError, Result};

#[derive(Debug, Clone)]
pub struct SharedConnection(Arc<Mutex<Connection>>);

impl SharedConnection {
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self(Arc::new(Mutex::new(connection)))
    }

    /// Run `work` against the connection on a blocking thread.
    ///
    /// # Errors
    ///
    /// Returns whatever `work` returns, or [`ApiError::Internal`] if the
    /// blocking task panicked.
    pub async fn run<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.0);
        tokio::task::spawn_blocking(move || {
            let guard = connection.lock().unwrap_or_else(PoisonError::into_inner);
            work(&guard)
        })
        .await?
    }

    /// Close the connection if this is the last handle to it.
    ///
    /// A handle still held by an abandoned blocking task closes the connection
    /// when that task finishes.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::QueryFailed`] if SQLite refuses to close.
    pub async fn close(self) -> Result<()> {
        let Ok(mutex) = Arc::try_unwrap(self.0) else {
            debug!("Connection still in use, it will close on last drop");
            return Ok(());
        };
        let connection = mutex.into_inner().unwrap_or_else(PoisonError::into_inner);

        tokio::task::spawn_blocking(move || {
            connection.close().map_err(|(_, err)| ApiError::from(err))
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_queries_off_the_async_thread() -> Result<()> {
        let shared = SharedConnection::new(Connection::open_in_memory()?);
        let answer: i64 = shared
            .run(|conn| Ok(conn.query_row("SELECT 6 * 7", [], |row| row.get(0))?))
            .await?;
        assert_eq!(answer, 42);
        shared.close().await
    }

    #[tokio::test]
    async fn close_with_outstanding_clone_is_deferred() -> Result<()> {
        let shared = SharedConnection::new(Connection::open_in_memory()?);
        let other = shared.clone();
        shared.close().await?;

        let still_open: i64 = other
            .run(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get(0))?))
            .await?;
        assert_eq!(still_open, 1);
        Ok(())
    }
}
