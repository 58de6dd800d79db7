use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// One ranked diagnosis, enriched with display metadata for the requested language.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DiagnosisResult {
    #[serde(rename = "class")]
    pub class: String,
    /// Probability scaled to 0-100.
    pub probability: f32,
    pub name: String,
    pub prevention: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictResponse {
    pub results: Vec<DiagnosisResult>,
    pub low_confidence: bool,
    pub image_path: String,
    pub processed_image_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl Season {
    /// Maps a calendar month (1-12) to its season. Out-of-range months count as winter.
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Fall,
            _ => Season::Winter,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DiseaseCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SeasonalTrend {
    pub season: Season,
    pub disease: String,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RecentSubmission {
    pub disease: String,
    pub thumbnail: Option<String>,
    pub timestamp: String,
    pub location: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InsightsSummary {
    pub region_diseases: Vec<DiseaseCount>,
    pub seasonal_trends: Vec<SeasonalTrend>,
    pub recent_submissions: Vec<RecentSubmission>,
}

impl InsightsSummary {
    pub fn is_empty(&self) -> bool {
        self.region_diseases.is_empty()
            && self.seasonal_trends.is_empty()
            && self.recent_submissions.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FeedbackResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub insights: InsightsSummary,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub error: String,
}
