//! `SQLite` schema definitions for discdrawer.

/// SQL statement to create the discs table.
pub const CREATE_DISCS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS discs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    manufacturer TEXT,
    plastic TEXT,
    disc_type TEXT,
    speed REAL NOT NULL DEFAULT 0,
    glide REAL NOT NULL DEFAULT 0,
    turn REAL NOT NULL DEFAULT 0,
    fade REAL NOT NULL DEFAULT 0,
    weight INTEGER,
    condition TEXT,
    stability TEXT,
    in_bag INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the measured throws table.
///
/// Throws belong to exactly one disc and go away with it.
pub const CREATE_THROWS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS measured_throws (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    disc_id INTEGER NOT NULL REFERENCES discs(id) ON DELETE CASCADE,
    distance_m REAL NOT NULL CHECK (distance_m >= 0),
    thrown_at TEXT NOT NULL
)
";

/// Index for the disc-to-throws traversal.
pub const CREATE_THROWS_DISC_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_throws_disc ON measured_throws(disc_id)
";

/// Index for listing throws longest first.
pub const CREATE_THROWS_DISTANCE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_throws_distance ON measured_throws(distance_m DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_DISCS_TABLE,
    CREATE_THROWS_TABLE,
    CREATE_THROWS_DISC_INDEX,
    CREATE_THROWS_DISTANCE_INDEX,
    CREATE_METADATA_TABLE,
];
