//! Redb-backed durable driver store.
//!
//! One table mapping driver id to a CBOR-encoded profile. The relay only
//! reads; `put` exists for the operator seeding path (`add-driver`
//! subcommand) and for the admin backend that owns the records. Redb's ACID
//! copy-on-write transactions make reads safe while a seed is in flight.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use buswatch_core::{DriverProfile, DriverStore, StoreError};
use buswatch_proto::DriverId;
use redb::{Database, TableDefinition};

/// Table: drivers
/// Key: driver id
/// Value: CBOR-encoded `DriverProfile`
const DRIVERS: TableDefinition<u64, &[u8]> = TableDefinition::new("drivers");

/// Durable driver store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Debug, Clone)]
pub struct RedbDriverStore {
    db: Arc<Database>,
}

impl RedbDriverStore {
    /// Open or create a Redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(|e| StoreError::Io(e.to_string()))?;

        // Touch the table so first reads don't race table creation.
        let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(DRIVERS).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Insert or replace a driver record.
    pub fn put(&self, profile: &DriverProfile) -> Result<(), StoreError> {
        let mut value = Vec::new();
        ciborium::ser::into_writer(profile, &mut value)
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(DRIVERS).map_err(|e| StoreError::Io(e.to_string()))?;
            table
                .insert(profile.id, value.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(())
    }

    fn get(&self, driver_id: DriverId) -> Result<Option<DriverProfile>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(DRIVERS).map_err(|e| StoreError::Io(e.to_string()))?;

        let Some(guard) = table.get(driver_id).map_err(|e| StoreError::Io(e.to_string()))?
        else {
            return Ok(None);
        };

        let profile = ciborium::de::from_reader(guard.value())
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(Some(profile))
    }
}

#[async_trait]
impl DriverStore for RedbDriverStore {
    async fn load(&self, driver_id: DriverId) -> Result<Option<DriverProfile>, StoreError> {
        // Redb reads are memory-mapped and short; no offload needed.
        self.get(driver_id)
    }
}
