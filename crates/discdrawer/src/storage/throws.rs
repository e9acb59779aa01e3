//! The throw store consumed by measurement sessions.
//!
//! A session only ever creates records; it never reads, updates or deletes
//! them. [`ThrowStore`] is that one capability, so sessions can run against
//! the `SQLite` catalog or against any other backend.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::catalog::{DiscRef, MeasuredThrow};
use crate::error::{Error, StoreError};

use super::Storage;

/// Creates measured throw records.
#[async_trait]
pub trait ThrowStore: Send + Sync + std::fmt::Debug {
    /// Persist a throw of `distance_m` meters for `disc`, measured at `timestamp`.
    ///
    /// The disc reference is passed through unchanged; the store decides
    /// whether it is valid.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownEntry`] if the disc does not exist,
    /// [`StoreError::Rejected`] for an invalid distance, and
    /// [`StoreError::Unavailable`] or [`StoreError::Backend`] when the store
    /// itself fails.
    async fn create_measurement_record(
        &self,
        distance_m: f64,
        timestamp: DateTime<Utc>,
        disc: DiscRef,
    ) -> Result<MeasuredThrow, StoreError>;
}

/// [`ThrowStore`] backed by the catalog database.
#[derive(Debug, Clone)]
pub struct SqliteThrowStore {
    storage: Arc<Mutex<Storage>>,
}

impl SqliteThrowStore {
    /// Wrap a storage handle.
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self::shared(Arc::new(Mutex::new(storage)))
    }

    /// Use a storage handle that is also used elsewhere.
    #[must_use]
    pub fn shared(storage: Arc<Mutex<Storage>>) -> Self {
        Self { storage }
    }

    /// The underlying storage handle.
    #[must_use]
    pub fn storage(&self) -> Arc<Mutex<Storage>> {
        Arc::clone(&self.storage)
    }
}

#[async_trait]
impl ThrowStore for SqliteThrowStore {
    async fn create_measurement_record(
        &self,
        distance_m: f64,
        timestamp: DateTime<Utc>,
        disc: DiscRef,
    ) -> Result<MeasuredThrow, StoreError> {
        if !distance_m.is_finite() || distance_m < 0.0 {
            return Err(StoreError::Rejected(format!(
                "distance must be a non-negative number of meters, got {distance_m}"
            )));
        }

        let storage = Arc::clone(&self.storage);
        let outcome = tokio::task::spawn_blocking(move || {
            let storage = storage
                .lock()
                .map_err(|_| StoreError::Unavailable("storage lock poisoned".to_string()))?;
            storage
                .insert_throw(disc, distance_m, timestamp)
                .map_err(|e| match e {
                    Error::NotFound { .. } => StoreError::UnknownEntry(disc),
                    other => StoreError::Backend(other.to_string()),
                })
        })
        .await;

        match outcome {
            Ok(Ok(record)) => {
                debug!(throw = record.id, %disc, distance_m, "Measurement record created");
                Ok(record)
            }
            Ok(Err(e)) => {
                warn!(%disc, error = %e, "Failed to create measurement record");
                Err(e)
            }
            Err(e) => Err(StoreError::Unavailable(format!("storage task failed: {e}"))),
        }
    }
}
