use serde::{Deserialize, Serialize};

use crate::model::StartupCandidate;

/// Name-addressed startup ID (blake3 hex hash of the startup name).
pub type StartupId = String;

pub fn startup_id(name: &str) -> StartupId {
    blake3::hash(name.trim().as_bytes()).to_hex().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorRecord {
    pub name: String,
    pub created_at: i64,
}

/// A startup row. `name` is unique; re-saving the same name overwrites the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupRecord {
    pub id: StartupId,
    pub name: String,
    pub description: String,
    pub sector: String,
    pub sub_sector: String,
    #[serde(default)]
    pub funding: Option<f64>,
    pub technology: String,
    pub updated_at: i64,
}

impl StartupRecord {
    pub fn from_candidate(candidate: &StartupCandidate, sector: &str, sub_sector: &str) -> Self {
        Self {
            id: startup_id(&candidate.name),
            name: candidate.name.clone(),
            description: candidate.description.clone(),
            sector: sector.to_string(),
            sub_sector: sub_sector.to_string(),
            funding: candidate.funding,
            technology: candidate.technology.clone(),
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn to_candidate(&self) -> StartupCandidate {
        StartupCandidate {
            name: self.name.clone(),
            description: self.description.clone(),
            funding: self.funding,
            technology: self.technology.clone(),
        }
    }
}

/// Latest assessment of a startup. One per startup; later saves replace earlier ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub startup_id: StartupId,
    #[serde(default)]
    pub risk_score: Option<f32>,
    pub comments: String,
    pub assessed_at: i64,
}

/// A startup joined with its assessment, as listed by the curated view.
#[derive(Debug, Clone, PartialEq)]
pub struct CuratedStartup {
    pub startup: StartupRecord,
    pub assessment: AssessmentRecord,
}
