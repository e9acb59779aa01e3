//! Storage layer for discdrawer.
//!
//! This module provides `SQLite`-based persistent storage for the disc catalog
//! and the throws measured with each disc. Deleting a disc deletes its
//! throws with it.

pub mod migrations;
pub mod schema;
pub mod throws;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::catalog::{Disc, DiscRef, MeasuredThrow, NewDisc};
use crate::error::{Error, Result};

pub use throws::{SqliteThrowStore, ThrowStore};

const DISC_COLUMNS: &str = "id, name, manufacturer, plastic, disc_type, speed, glide, turn, fade, \
                            weight, condition, stability, in_bag, created_at";

const THROW_COLUMNS: &str = "id, disc_id, distance_m, thrown_at";

/// Storage engine for the catalog and measured throws.
#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes or migrates the schema as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // === Discs ===

    /// Add a disc to the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_disc(&self, disc: &NewDisc) -> Result<Disc> {
        let created_at = Utc::now();
        self.conn.execute(
            r"
            INSERT INTO discs (name, manufacturer, plastic, disc_type, speed, glide, turn, fade,
                               weight, condition, stability, in_bag, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ",
            params![
                disc.name,
                disc.manufacturer,
                disc.plastic,
                disc.disc_type,
                disc.speed,
                disc.glide,
                disc.turn,
                disc.fade,
                disc.weight,
                disc.condition,
                disc.stability,
                disc.in_bag,
                created_at.to_rfc3339(),
            ],
        )?;

        let id = DiscRef::new(self.conn.last_insert_rowid());
        debug!(disc = %id, name = %disc.name, "Inserted disc");
        Ok(Disc {
            id,
            created_at,
            fields: disc.clone(),
        })
    }

    /// Look up a disc.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_disc(&self, id: DiscRef) -> Result<Option<Disc>> {
        let sql = format!("SELECT {DISC_COLUMNS} FROM discs WHERE id = ?1");
        let disc = self
            .conn
            .query_row(&sql, [id.id()], row_to_disc)
            .optional()?;
        Ok(disc)
    }

    /// Check if a disc exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn disc_exists(&self, id: DiscRef) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM discs WHERE id = ?1",
            [id.id()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List catalog entries ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_discs(&self, in_bag_only: bool) -> Result<Vec<Disc>> {
        let sql = format!(
            "SELECT {DISC_COLUMNS} FROM discs WHERE (?1 = 0 OR in_bag = 1) \
             ORDER BY name COLLATE NOCASE, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let discs = stmt
            .query_map([in_bag_only], row_to_disc)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(discs)
    }

    /// Replace the fields of an existing disc.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the disc does not exist, or an error if
    /// the database operation fails.
    pub fn update_disc(&self, id: DiscRef, disc: &NewDisc) -> Result<Disc> {
        let affected = self.conn.execute(
            r"
            UPDATE discs SET name = ?2, manufacturer = ?3, plastic = ?4, disc_type = ?5,
                             speed = ?6, glide = ?7, turn = ?8, fade = ?9, weight = ?10,
                             condition = ?11, stability = ?12, in_bag = ?13
            WHERE id = ?1
            ",
            params![
                id.id(),
                disc.name,
                disc.manufacturer,
                disc.plastic,
                disc.disc_type,
                disc.speed,
                disc.glide,
                disc.turn,
                disc.fade,
                disc.weight,
                disc.condition,
                disc.stability,
                disc.in_bag,
            ],
        )?;
        if affected == 0 {
            return Err(Error::not_found("disc", id.id()));
        }
        self.get_disc(id)?
            .ok_or_else(|| Error::not_found("disc", id.id()))
    }

    /// Remove a disc and all of its measured throws.
    ///
    /// Returns `true` if a disc was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_disc(&self, id: DiscRef) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM discs WHERE id = ?1", [id.id()])?;
        if affected > 0 {
            info!(disc = %id, "Deleted disc and its throws");
        }
        Ok(affected > 0)
    }

    // === Throws ===

    /// Persist a measured throw for an existing disc.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the disc does not exist, or an error if
    /// the database operation fails (including a negative distance).
    pub fn insert_throw(
        &self,
        disc: DiscRef,
        distance_m: f64,
        thrown_at: DateTime<Utc>,
    ) -> Result<MeasuredThrow> {
        if !self.disc_exists(disc)? {
            return Err(Error::not_found("disc", disc.id()));
        }
        self.conn.execute(
            "INSERT INTO measured_throws (disc_id, distance_m, thrown_at) VALUES (?1, ?2, ?3)",
            params![disc.id(), distance_m, thrown_at.to_rfc3339()],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(throw = id, %disc, distance_m, "Inserted measured throw");
        Ok(MeasuredThrow {
            id,
            disc,
            distance_m,
            thrown_at,
        })
    }

    /// Look up a measured throw.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_throw(&self, id: i64) -> Result<Option<MeasuredThrow>> {
        let sql = format!("SELECT {THROW_COLUMNS} FROM measured_throws WHERE id = ?1");
        let throw = self.conn.query_row(&sql, [id], row_to_throw).optional()?;
        Ok(throw)
    }

    /// All throws measured with a disc, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn throws_for_disc(&self, disc: DiscRef) -> Result<Vec<MeasuredThrow>> {
        let sql = format!(
            "SELECT {THROW_COLUMNS} FROM measured_throws WHERE disc_id = ?1 \
             ORDER BY thrown_at DESC, id DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let throws = stmt
            .query_map([disc.id()], row_to_throw)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(throws)
    }

    /// Measured throws, longest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_throws(&self, limit: Option<usize>) -> Result<Vec<MeasuredThrow>> {
        let sql = format!(
            "SELECT {THROW_COLUMNS} FROM measured_throws \
             ORDER BY distance_m DESC, id ASC LIMIT ?1"
        );
        // a negative LIMIT means no limit in SQLite
        let limit_i64 = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let mut stmt = self.conn.prepare(&sql)?;
        let throws = stmt
            .query_map([limit_i64], row_to_throw)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(throws)
    }

    /// Delete a measured throw.
    ///
    /// Returns `true` if a throw was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_throw(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM measured_throws WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let (total_discs, discs_in_bag): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(in_bag), 0) FROM discs",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let total_throws: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM measured_throws", [], |row| row.get(0))?;
        let longest_throw = self.list_throws(Some(1))?.into_iter().next();

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_discs,
            discs_in_bag,
            total_throws,
            longest_throw,
            db_size_bytes,
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

fn row_to_disc(row: &rusqlite::Row) -> rusqlite::Result<Disc> {
    let created_at: String = row.get(13)?;
    Ok(Disc {
        id: DiscRef::new(row.get(0)?),
        created_at: parse_timestamp(&created_at),
        fields: NewDisc {
            name: row.get(1)?,
            manufacturer: row.get(2)?,
            plastic: row.get(3)?,
            disc_type: row.get(4)?,
            speed: row.get(5)?,
            glide: row.get(6)?,
            turn: row.get(7)?,
            fade: row.get(8)?,
            weight: row.get(9)?,
            condition: row.get(10)?,
            stability: row.get(11)?,
            in_bag: row.get(12)?,
        },
    })
}

fn row_to_throw(row: &rusqlite::Row) -> rusqlite::Result<MeasuredThrow> {
    let thrown_at: String = row.get(3)?;
    Ok(MeasuredThrow {
        id: row.get(0)?,
        disc: DiscRef::new(row.get(1)?),
        distance_m: row.get(2)?,
        thrown_at: parse_timestamp(&thrown_at),
    })
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageStats {
    /// Number of discs in the catalog.
    pub total_discs: i64,
    /// Number of discs currently in the bag.
    pub discs_in_bag: i64,
    /// Number of measured throws.
    pub total_throws: i64,
    /// The longest measured throw, if any.
    pub longest_throw: Option<MeasuredThrow>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn new_disc(name: &str) -> NewDisc {
        NewDisc {
            name: name.to_string(),
            manufacturer: Some("Innova".to_string()),
            speed: 5.0,
            glide: 5.0,
            turn: -1.0,
            fade: 1.0,
            ..NewDisc::default()
        }
    }

    #[test]
    fn test_open_in_memory() {
        let storage = create_test_storage();
        assert_eq!(storage.path(), Path::new(":memory:"));
    }

    #[test]
    fn test_insert_and_get_disc() {
        let storage = create_test_storage();
        let disc = storage.insert_disc(&new_disc("Roc3")).unwrap();

        let loaded = storage.get_disc(disc.id).unwrap().unwrap();
        assert_eq!(loaded.fields, disc.fields);
        assert_eq!(loaded.fields.name, "Roc3");
        assert_eq!(loaded.manufacturer_or_na(), "Innova");
    }

    #[test]
    fn test_get_missing_disc() {
        let storage = create_test_storage();
        assert!(storage.get_disc(DiscRef::new(42)).unwrap().is_none());
        assert!(!storage.disc_exists(DiscRef::new(42)).unwrap());
    }

    #[test]
    fn test_list_discs_in_bag_filter() {
        let storage = create_test_storage();
        let mut teebird = new_disc("Teebird");
        teebird.in_bag = true;
        storage.insert_disc(&teebird).unwrap();
        storage.insert_disc(&new_disc("aviar")).unwrap();

        let all = storage.list_discs(false).unwrap();
        let names: Vec<_> = all.iter().map(|d| d.fields.name.as_str()).collect();
        assert_eq!(names, ["aviar", "Teebird"]);

        let bag = storage.list_discs(true).unwrap();
        assert_eq!(bag.len(), 1);
        assert_eq!(bag[0].fields.name, "Teebird");
    }

    #[test]
    fn test_update_disc() {
        let storage = create_test_storage();
        let disc = storage.insert_disc(&new_disc("Buzzz")).unwrap();

        let mut fields = disc.fields.clone();
        fields.plastic = Some("ESP".to_string());
        fields.weight = Some(177);
        let updated = storage.update_disc(disc.id, &fields).unwrap();
        assert_eq!(updated.plastic_or_na(), "ESP");
        assert_eq!(updated.fields.weight, Some(177));
        assert_eq!(updated.created_at, disc.created_at);
    }

    #[test]
    fn test_update_missing_disc() {
        let storage = create_test_storage();
        let err = storage
            .update_disc(DiscRef::new(9), &new_disc("Ghost"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_insert_throw_requires_disc() {
        let storage = create_test_storage();
        let err = storage
            .insert_throw(DiscRef::new(7), 50.0, Utc::now())
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(storage.stats().unwrap().total_throws, 0);
    }

    #[test]
    fn test_negative_distance_rejected_by_schema() {
        let storage = create_test_storage();
        let disc = storage.insert_disc(&new_disc("Zone")).unwrap();
        let err = storage.insert_throw(disc.id, -1.0, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::DatabaseQuery(_)));
    }

    #[test]
    fn test_throws_for_disc() {
        let storage = create_test_storage();
        let a = storage.insert_disc(&new_disc("A")).unwrap();
        let b = storage.insert_disc(&new_disc("B")).unwrap();
        let now = Utc::now();

        storage.insert_throw(a.id, 40.0, now - Duration::minutes(5)).unwrap();
        storage.insert_throw(a.id, 60.0, now).unwrap();
        storage.insert_throw(b.id, 90.0, now).unwrap();

        let throws = storage.throws_for_disc(a.id).unwrap();
        assert_eq!(throws.len(), 2);
        assert!(throws.iter().all(|t| t.disc == a.id));
        assert_eq!(throws[0].distance_m, 60.0);
    }

    #[test]
    fn test_list_throws_longest_first() {
        let storage = create_test_storage();
        let disc = storage.insert_disc(&new_disc("Wraith")).unwrap();
        for d in [55.0, 120.5, 88.7] {
            storage.insert_throw(disc.id, d, Utc::now()).unwrap();
        }

        let distances: Vec<f64> = storage
            .list_throws(None)
            .unwrap()
            .iter()
            .map(|t| t.distance_m)
            .collect();
        assert_eq!(distances, [120.5, 88.7, 55.0]);

        assert_eq!(storage.list_throws(Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_get_and_delete_throw() {
        let storage = create_test_storage();
        let disc = storage.insert_disc(&new_disc("Firebird")).unwrap();
        let throw = storage.insert_throw(disc.id, 70.0, Utc::now()).unwrap();

        let loaded = storage.get_throw(throw.id).unwrap().unwrap();
        assert_eq!(loaded.disc, disc.id);
        assert_eq!(loaded.distance_m, 70.0);

        assert!(storage.delete_throw(throw.id).unwrap());
        assert!(!storage.delete_throw(throw.id).unwrap());
        assert!(storage.get_throw(throw.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_disc_cascades_to_throws() {
        let storage = create_test_storage();
        let disc = storage.insert_disc(&new_disc("Leopard")).unwrap();
        storage.insert_throw(disc.id, 61.0, Utc::now()).unwrap();
        storage.insert_throw(disc.id, 64.0, Utc::now()).unwrap();

        assert!(storage.delete_disc(disc.id).unwrap());
        assert!(storage.list_throws(None).unwrap().is_empty());
        assert!(!storage.delete_disc(disc.id).unwrap());
    }

    #[test]
    fn test_stats() {
        let storage = create_test_storage();
        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_discs, 0);
        assert!(stats.longest_throw.is_none());

        let mut disc = new_disc("Thunderbird");
        disc.in_bag = true;
        let disc = storage.insert_disc(&disc).unwrap();
        storage.insert_disc(&new_disc("Spare")).unwrap();
        storage.insert_throw(disc.id, 95.0, Utc::now()).unwrap();
        storage.insert_throw(disc.id, 101.0, Utc::now()).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_discs, 2);
        assert_eq!(stats.discs_in_bag, 1);
        assert_eq!(stats.total_throws, 2);
        assert_eq!(stats.longest_throw.map(|t| t.distance_m), Some(101.0));
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_open_file_database() {
        let dir = std::env::temp_dir().join(format!("discdrawer-storage-{}", std::process::id()));
        let path = dir.join("nested").join("discs.db");
        {
            let storage = Storage::open(&path).unwrap();
            storage.insert_disc(&new_disc("Persist")).unwrap();
        }
        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.list_discs(false).unwrap().len(), 1);
        assert!(storage.stats().unwrap().db_size_bytes > 0);
        drop(storage);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
