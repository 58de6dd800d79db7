pub mod aggregator;

pub use aggregator::{InsightsAggregator, REGION_LIMIT, SEASONAL_LIMIT, RECENT_LIMIT};
