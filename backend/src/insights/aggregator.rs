use chrono::{Datelike, Local};
use shared::{DiseaseCount, InsightsSummary, RecentSubmission, Season, SeasonalTrend};

use crate::db::models::encode_timestamp;
use crate::db::{ContributionStore, PredictionStore, StoreError};
use crate::service::ErrorKind;

pub const REGION_LIMIT: usize = 10;
pub const SEASONAL_LIMIT: usize = 5;
pub const RECENT_LIMIT: usize = 5;

/// Read-only, on-demand aggregation over the prediction and contribution logs.
#[derive(Clone)]
pub struct InsightsAggregator {
    predictions: PredictionStore,
    contributions: ContributionStore,
}

impl InsightsAggregator {
    pub fn new(predictions: PredictionStore, contributions: ContributionStore) -> Self {
        Self {
            predictions,
            contributions,
        }
    }

    pub fn compute(&self) -> InsightsSummary {
        self.compute_for_month(Local::now().month())
    }

    /// Best effort: a failing query yields an empty summary instead of an error.
    pub fn compute_for_month(&self, month: u32) -> InsightsSummary {
        match self.try_compute(month) {
            Ok(summary) => summary,
            Err(e) => {
                log::error!("{:?}: failed to aggregate insights: {}", ErrorKind::AggregationFailure, e);
                InsightsSummary::default()
            }
        }
    }

    fn try_compute(&self, month: u32) -> Result<InsightsSummary, StoreError> {
        let region_diseases = self
            .predictions
            .top_k(REGION_LIMIT)?
            .into_iter()
            .map(|c| DiseaseCount {
                name: c.label,
                count: c.count,
            })
            .collect();

        // The season only labels the rows; counts span every prediction.
        let season = Season::from_month(month);
        let seasonal_trends = self
            .predictions
            .top_k(SEASONAL_LIMIT)?
            .into_iter()
            .map(|c| SeasonalTrend {
                season,
                disease: c.label,
                count: c.count,
            })
            .collect();

        let recent_submissions = self
            .contributions
            .recent_verified(RECENT_LIMIT)?
            .into_iter()
            .map(|c| RecentSubmission {
                disease: c.label,
                thumbnail: Some(c.image_path),
                timestamp: encode_timestamp(c.created_at),
                location: c.location.name,
            })
            .collect();

        Ok(InsightsSummary {
            region_diseases,
            seasonal_trends,
            recent_submissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, GeoLocation, NewContribution, NewPrediction};

    fn aggregator(db: &Database) -> InsightsAggregator {
        InsightsAggregator::new(PredictionStore::new(db.clone()), ContributionStore::new(db.clone()))
    }

    #[test]
    fn region_diseases_rank_labels_by_frequency() {
        let db = Database::open_in_memory().unwrap();
        let predictions = PredictionStore::new(db.clone());
        for label in ["A", "A", "B"] {
            predictions.append(&NewPrediction::new("/p.jpg", label, 0.9)).unwrap();
        }

        let summary = aggregator(&db).compute_for_month(7);
        assert_eq!(
            summary.region_diseases,
            vec![
                DiseaseCount { name: "A".into(), count: 2 },
                DiseaseCount { name: "B".into(), count: 1 },
            ]
        );
        assert!(summary.seasonal_trends.iter().all(|t| t.season == Season::Summer));
        assert_eq!(summary.seasonal_trends.len(), 2);
    }

    #[test]
    fn region_counts_cover_every_prediction() {
        let db = Database::open_in_memory().unwrap();
        let predictions = PredictionStore::new(db.clone());
        let labels = ["C", "A", "B", "C", "D", "A", "C", "E"];
        for label in labels {
            predictions.append(&NewPrediction::new("/p.jpg", label, 0.5)).unwrap();
        }

        let summary = aggregator(&db).compute_for_month(1);
        let total: i64 = summary.region_diseases.iter().map(|d| d.count).sum();
        assert_eq!(total, labels.len() as i64);
        assert!(summary.region_diseases.windows(2).all(|w| w[0].count >= w[1].count));
        assert_eq!(summary.region_diseases[0].name, "C");
        assert_eq!(summary.region_diseases[1].name, "A");
    }

    #[test]
    fn seasonal_trends_ignore_the_season_filter() {
        let db = Database::open_in_memory().unwrap();
        let predictions = PredictionStore::new(db.clone());
        for label in ["A", "B", "C", "D", "E", "F", "F"] {
            predictions.append(&NewPrediction::new("/p.jpg", label, 0.5)).unwrap();
        }
        let aggregator = aggregator(&db);

        let winter = aggregator.compute_for_month(12).seasonal_trends;
        let spring = aggregator.compute_for_month(4).seasonal_trends;
        assert_eq!(winter.len(), SEASONAL_LIMIT);
        assert_eq!(winter[0].disease, "F");
        assert_eq!(winter[0].season, Season::Winter);
        let winter_diseases: Vec<_> = winter.iter().map(|t| t.disease.clone()).collect();
        let spring_diseases: Vec<_> = spring.iter().map(|t| t.disease.clone()).collect();
        assert_eq!(winter_diseases, spring_diseases);
    }

    #[test]
    fn recent_submissions_list_only_verified_contributions() {
        let db = Database::open_in_memory().unwrap();
        let contributions = ContributionStore::new(db.clone());
        let verified = contributions
            .append(&NewContribution {
                image_path: "/static/contributions/a.jpg".into(),
                label: "Tomato__leaf_mold".into(),
                contributor: "10.0.0.1".into(),
                location: GeoLocation {
                    name: Some("Pune".into()),
                    ..Default::default()
                },
            })
            .unwrap();
        contributions
            .append(&NewContribution {
                image_path: "/static/contributions/b.jpg".into(),
                label: "Potato__healthy".into(),
                contributor: "10.0.0.2".into(),
                location: GeoLocation::default(),
            })
            .unwrap();
        contributions.set_verified(verified.id, true).unwrap();

        let recent = aggregator(&db).compute_for_month(6).recent_submissions;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].disease, "Tomato__leaf_mold");
        assert_eq!(recent[0].thumbnail.as_deref(), Some("/static/contributions/a.jpg"));
        assert_eq!(recent[0].location.as_deref(), Some("Pune"));
        assert_eq!(recent[0].timestamp, encode_timestamp(verified.created_at));
    }

    #[test]
    fn empty_stores_give_empty_summary() {
        let db = Database::open_in_memory().unwrap();
        assert!(aggregator(&db).compute().is_empty());
    }

    #[test]
    fn query_failure_degrades_to_empty_summary() {
        let db = Database::open_in_memory().unwrap();
        PredictionStore::new(db.clone())
            .append(&NewPrediction::new("/p.jpg", "A", 0.9))
            .unwrap();
        db.with_connection(|conn| conn.execute_batch("DROP TABLE contributions;"))
            .unwrap();

        let summary = aggregator(&db).compute_for_month(3);
        assert_eq!(summary, InsightsSummary::default());
    }
}
