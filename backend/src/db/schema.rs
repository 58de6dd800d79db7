use rusqlite::Connection;

pub(super) fn apply_pragmas(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout=5000;",
    )
}

/// Three append-only relations. Triggers reject anything but inserts, except
/// for the verification flag on contributions.
pub(super) fn apply_schema(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "PRAGMA foreign_keys=ON;
         CREATE TABLE IF NOT EXISTS predictions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            image_path TEXT NOT NULL,
            prediction TEXT NOT NULL,
            confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
            timestamp TEXT NOT NULL,
            location_name TEXT,
            latitude REAL,
            longitude REAL
         );
         CREATE INDEX IF NOT EXISTS idx_predictions_prediction_id
            ON predictions (prediction, id);
         CREATE TABLE IF NOT EXISTS feedback (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            prediction_id INTEGER,
            is_correct INTEGER NOT NULL,
            corrected_disease TEXT,
            timestamp TEXT NOT NULL,
            FOREIGN KEY (prediction_id) REFERENCES predictions(id)
         );
         CREATE TABLE IF NOT EXISTS contributions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            image_path TEXT NOT NULL,
            disease TEXT NOT NULL,
            contributor_identifier TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            location_name TEXT,
            latitude REAL,
            longitude REAL,
            verified INTEGER NOT NULL DEFAULT 0
         );
         CREATE INDEX IF NOT EXISTS idx_contributions_verified_timestamp
            ON contributions (verified, timestamp);
         CREATE TRIGGER IF NOT EXISTS predictions_no_update
            BEFORE UPDATE ON predictions
            BEGIN SELECT RAISE(ABORT, 'predictions are append-only'); END;
         CREATE TRIGGER IF NOT EXISTS predictions_no_delete
            BEFORE DELETE ON predictions
            BEGIN SELECT RAISE(ABORT, 'predictions are append-only'); END;
         CREATE TRIGGER IF NOT EXISTS feedback_no_update
            BEFORE UPDATE ON feedback
            BEGIN SELECT RAISE(ABORT, 'feedback is append-only'); END;
         CREATE TRIGGER IF NOT EXISTS feedback_no_delete
            BEFORE DELETE ON feedback
            BEGIN SELECT RAISE(ABORT, 'feedback is append-only'); END;
         CREATE TRIGGER IF NOT EXISTS contributions_no_update
            BEFORE UPDATE OF id, image_path, disease, contributor_identifier, timestamp,
                             location_name, latitude, longitude ON contributions
            BEGIN SELECT RAISE(ABORT, 'only the verified flag of a contribution may change'); END;
         CREATE TRIGGER IF NOT EXISTS contributions_no_delete
            BEFORE DELETE ON contributions
            BEGIN SELECT RAISE(ABORT, 'contributions are append-only'); END;",
    )
}
