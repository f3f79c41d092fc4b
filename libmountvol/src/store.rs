//! Record store: one SQLite file holding one bincode-encoded record per
//! volume name.
//!
//! Every read and write happens inside a [`StoreTxn`]. A transaction that is
//! dropped without [`StoreTxn::commit`] is rolled back, so an early `?`
//! return from the engine never leaves a partial write behind.
//!
//! # On-disk layout
//!
//! ```text
//! <state_dir>/<driver>.db
//!   volumes(name TEXT PRIMARY KEY, record BLOB)
//! ```

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::VolumeError;
use crate::types::VolumeRecord;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS volumes (
    name   TEXT PRIMARY KEY NOT NULL,
    record BLOB NOT NULL
)";

/// Embedded transactional key/value store for [`VolumeRecord`]s.
pub struct VolumeStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl VolumeStore {
    /// Open (or create) the store file at `path` and ensure the schema exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, VolumeError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                VolumeError::Store(format!("create dir {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| VolumeError::Store(format!("chmod {}: {e}", path.display())))?;

        debug!(path = %path.display(), "volume store opened");
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a transaction. Writable transactions take SQLite's reserved lock
    /// up front so a commit can never fail on lock upgrade.
    pub async fn begin(&self, writable: bool) -> Result<StoreTxn<'_>, VolumeError> {
        let conn = self.conn.lock().await;
        conn.execute_batch(if writable {
            "BEGIN IMMEDIATE"
        } else {
            "BEGIN DEFERRED"
        })?;
        Ok(StoreTxn {
            conn,
            writable,
            finished: false,
        })
    }
}

/// An open transaction on a [`VolumeStore`].
pub struct StoreTxn<'a> {
    conn: MutexGuard<'a, Connection>,
    writable: bool,
    finished: bool,
}

impl StoreTxn<'_> {
    fn ensure_writable(&self) -> Result<(), VolumeError> {
        if self.writable {
            Ok(())
        } else {
            Err(VolumeError::Store("transaction is read-only".into()))
        }
    }

    /// Serialize `record` and store it under `record.name`, replacing any
    /// existing value.
    pub fn put(&self, record: &VolumeRecord) -> Result<(), VolumeError> {
        self.ensure_writable()?;
        let bytes = bincode::serialize(record)?;
        self.conn.execute(
            "INSERT INTO volumes (name, record) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET record = excluded.record",
            params![record.name, bytes],
        )?;
        Ok(())
    }

    /// Fetch the record stored under `name`. Absence is `Ok(None)`.
    pub fn get(&self, name: &str) -> Result<Option<VolumeRecord>, VolumeError> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT record FROM volumes WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        match bytes {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every stored record. Order is unspecified.
    pub fn list_all(&self) -> Result<Vec<VolumeRecord>, VolumeError> {
        let mut stmt = self.conn.prepare("SELECT record FROM volumes")?;
        let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
        let mut records = Vec::new();
        for bytes in rows {
            records.push(bincode::deserialize(&bytes?)?);
        }
        Ok(records)
    }

    /// Remove the record stored under `name`. Callers check existence first.
    pub fn delete(&self, name: &str) -> Result<(), VolumeError> {
        self.ensure_writable()?;
        self.conn
            .execute("DELETE FROM volumes WHERE name = ?1", params![name])?;
        Ok(())
    }

    /// Make every write in this transaction durable.
    pub fn commit(mut self) -> Result<(), VolumeError> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    /// Discard every write in this transaction.
    pub fn rollback(mut self) -> Result<(), VolumeError> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for StoreTxn<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!(error = %e, "failed to roll back volume store transaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(name: &str, mount_point: &str) -> VolumeRecord {
        let mut record = VolumeRecord::new(
            name,
            HashMap::from([("device".to_owned(), "/dev/sdb1".to_owned())]),
            vec!["test".into(), "foo".into()],
        );
        if !mount_point.is_empty() {
            record.mark_mounted(mount_point);
        }
        record
    }

    #[tokio::test]
    async fn put_overwrites_and_get_reads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VolumeStore::open(tmp.path().join("gfs3.db")).unwrap();

        let txn = store.begin(true).await.unwrap();
        txn.put(&record("test", "hello")).unwrap();
        txn.commit().unwrap();

        let txn = store.begin(true).await.unwrap();
        txn.put(&record("test", "hello-again")).unwrap();
        txn.commit().unwrap();

        let txn = store.begin(false).await.unwrap();
        let found = txn.get("test").unwrap().expect("record should exist");
        assert_eq!(found.mount_point, "hello-again");
        assert_eq!(found.args, vec!["test".to_owned(), "foo".to_owned()]);
        assert!(txn.get("missing").unwrap().is_none());
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VolumeStore::open(tmp.path().join("v.db")).unwrap();

        {
            let txn = store.begin(true).await.unwrap();
            txn.put(&record("vol1", "")).unwrap();
        }

        let txn = store.begin(false).await.unwrap();
        assert!(txn.get("vol1").unwrap().is_none());
    }

    #[tokio::test]
    async fn explicit_rollback_discards_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VolumeStore::open(tmp.path().join("v.db")).unwrap();

        let txn = store.begin(true).await.unwrap();
        txn.put(&record("vol1", "")).unwrap();
        txn.commit().unwrap();

        let txn = store.begin(true).await.unwrap();
        txn.delete("vol1").unwrap();
        assert!(txn.get("vol1").unwrap().is_none());
        txn.rollback().unwrap();

        let txn = store.begin(false).await.unwrap();
        assert!(txn.get("vol1").unwrap().is_some());
    }

    #[tokio::test]
    async fn read_transaction_rejects_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VolumeStore::open(tmp.path().join("v.db")).unwrap();

        let txn = store.begin(false).await.unwrap();
        assert!(matches!(
            txn.put(&record("vol1", "")),
            Err(VolumeError::Store(_))
        ));
        assert!(matches!(txn.delete("vol1"), Err(VolumeError::Store(_))));
    }

    #[tokio::test]
    async fn list_all_and_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state").join("nfs.db");

        {
            let store = VolumeStore::open(&path).unwrap();
            let txn = store.begin(true).await.unwrap();
            txn.put(&record("a", "")).unwrap();
            txn.put(&record("b", "/mnt/b")).unwrap();
            txn.commit().unwrap();
        }

        let store = VolumeStore::open(&path).unwrap();
        let txn = store.begin(false).await.unwrap();
        let mut names: Vec<String> = txn
            .list_all()
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a".to_owned(), "b".to_owned()]);

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn corrupt_record_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VolumeStore::open(tmp.path().join("v.db")).unwrap();

        let txn = store.begin(true).await.unwrap();
        txn.conn
            .execute(
                "INSERT INTO volumes (name, record) VALUES ('bad', x'ff')",
                [],
            )
            .unwrap();
        assert!(matches!(txn.get("bad"), Err(VolumeError::Store(_))));
        assert!(matches!(txn.list_all(), Err(VolumeError::Store(_))));
    }
}
