use rusqlite::{OptionalExtension, params};

use super::models::{ContributionRecord, NewContribution, encode_timestamp, now};
use super::{Database, StoreError};

/// Append-only log of community-contributed labeled images.
///
/// Rows are created unverified. Only the external verification process flips
/// the flag, through [`ContributionStore::set_verified`].
#[derive(Clone)]
pub struct ContributionStore {
    db: Database,
}

impl ContributionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn append(&self, contribution: &NewContribution) -> Result<ContributionRecord, StoreError> {
        let created_at = now();
        let record = self.db.with_connection(|conn| {
            let location = &contribution.location;
            conn.prepare_cached(
                "INSERT INTO contributions (
                    image_path, disease, contributor_identifier, timestamp,
                    location_name, latitude, longitude, verified
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            )?
            .execute(params![
                contribution.image_path,
                contribution.label,
                contribution.contributor,
                encode_timestamp(created_at),
                location.name,
                location.latitude,
                location.longitude,
            ])?;
            Ok(ContributionRecord {
                id: conn.last_insert_rowid(),
                image_path: contribution.image_path.clone(),
                label: contribution.label.clone(),
                contributor: contribution.contributor.clone(),
                created_at,
                location: location.clone(),
                verified: false,
            })
        })?;
        log::info!(
            "Stored contribution {} labeled {} from {}",
            record.id,
            record.label,
            record.contributor
        );
        Ok(record)
    }

    pub fn get(&self, id: i64) -> Result<ContributionRecord, StoreError> {
        self.db
            .with_connection(|conn| {
                conn.query_row(
                    &format!("SELECT {} FROM contributions WHERE id = ?1", ContributionRecord::COLUMNS),
                    params![id],
                    ContributionRecord::from_row,
                )
                .optional()
            })?
            .ok_or(StoreError::NotFound(id))
    }

    pub fn set_verified(&self, id: i64, verified: bool) -> Result<(), StoreError> {
        let changed = self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE contributions SET verified = ?1 WHERE id = ?2",
                params![verified, id],
            )
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Newest verified contributions first.
    pub fn recent_verified(&self, limit: usize) -> Result<Vec<ContributionRecord>, StoreError> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM contributions
                 WHERE verified = 1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1",
                ContributionRecord::COLUMNS
            ))?;
            let rows = stmt.query_map(params![limit as i64], ContributionRecord::from_row)?;
            rows.collect()
        })
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM contributions", [], |row| row.get(0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GeoLocation;

    fn contribution(label: &str) -> NewContribution {
        NewContribution {
            image_path: format!("/static/contributions/{label}.jpg"),
            label: label.to_string(),
            contributor: "127.0.0.1".into(),
            location: GeoLocation {
                name: Some("Nashik".into()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn new_contributions_start_unverified() {
        let store = ContributionStore::new(Database::open_in_memory().unwrap());
        let record = store.append(&contribution("Tomato__leaf_mold")).unwrap();
        assert!(!record.verified);
        assert!(!store.get(record.id).unwrap().verified);
        assert!(store.recent_verified(5).unwrap().is_empty());
    }

    #[test]
    fn recent_verified_returns_newest_five() {
        let store = ContributionStore::new(Database::open_in_memory().unwrap());
        let mut ids = Vec::new();
        for i in 0..7 {
            ids.push(store.append(&contribution(&format!("L{i}"))).unwrap().id);
        }
        for id in &ids {
            store.set_verified(*id, true).unwrap();
        }
        store.set_verified(ids[6], false).unwrap();

        let recent = store.recent_verified(5).unwrap();
        let labels: Vec<&str> = recent.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["L5", "L4", "L3", "L2", "L1"]);
        assert_eq!(recent[0].location.name.as_deref(), Some("Nashik"));
    }

    #[test]
    fn only_verification_flag_is_mutable() {
        let db = Database::open_in_memory().unwrap();
        let store = ContributionStore::new(db.clone());
        let record = store.append(&contribution("A")).unwrap();

        let relabel = db.with_connection(|conn| {
            conn.execute("UPDATE contributions SET disease = 'B' WHERE id = ?1", params![record.id])
        });
        assert!(relabel.is_err());
        let delete = db.with_connection(|conn| conn.execute("DELETE FROM contributions", []));
        assert!(delete.is_err());

        store.set_verified(record.id, true).unwrap();
        assert!(store.get(record.id).unwrap().verified);
        assert!(matches!(store.set_verified(999, true), Err(StoreError::NotFound(999))));
    }
}
