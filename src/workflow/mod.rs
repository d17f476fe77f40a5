pub mod controller;
pub mod session;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use controller::{AssessmentReport, Controller, Services, StageOutcome, StageView};
pub use session::{rewind, Session};

/// The fixed, linear wizard stages. Ordering follows the workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[default]
    SectorSelection,
    StartupDiscovery,
    RiskAssessment,
    DealSummary,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::SectorSelection,
        Stage::StartupDiscovery,
        Stage::RiskAssessment,
        Stage::DealSummary,
    ];

    /// Progress shown to the user; a pure function of the stage.
    pub fn progress(self) -> f32 {
        match self {
            Stage::SectorSelection => 0.25,
            Stage::StartupDiscovery => 0.5,
            Stage::RiskAssessment => 0.75,
            Stage::DealSummary => 1.0,
        }
    }

    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::SectorSelection => Some(Stage::StartupDiscovery),
            Stage::StartupDiscovery => Some(Stage::RiskAssessment),
            Stage::RiskAssessment => Some(Stage::DealSummary),
            Stage::DealSummary => None,
        }
    }

    pub fn previous(self) -> Option<Stage> {
        match self {
            Stage::SectorSelection => None,
            Stage::StartupDiscovery => Some(Stage::SectorSelection),
            Stage::RiskAssessment => Some(Stage::StartupDiscovery),
            Stage::DealSummary => Some(Stage::RiskAssessment),
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Stage::SectorSelection => "Sector Selection",
            Stage::StartupDiscovery => "Startup Discovery",
            Stage::RiskAssessment => "Risk Assessment",
            Stage::DealSummary => "Deal Summary",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "sector" | "sectorselection" | "sectorselector" => Ok(Stage::SectorSelection),
            "discovery" | "startupdiscovery" | "startups" | "startupfinder" => {
                Ok(Stage::StartupDiscovery)
            }
            "risk" | "riskassessment" | "techriskassessor" => Ok(Stage::RiskAssessment),
            "summary" | "dealsummary" | "dealsourcer" => Ok(Stage::DealSummary),
            _ => Err(format!("Unknown stage '{}'", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_monotonic() {
        let progress: Vec<f32> = Stage::ALL.iter().map(|s| s.progress()).collect();
        assert_eq!(progress, vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_next_and_previous_are_inverse() {
        for stage in Stage::ALL {
            if let Some(next) = stage.next() {
                assert_eq!(next.previous(), Some(stage));
                assert!(next > stage);
            }
        }
        assert_eq!(Stage::DealSummary.next(), None);
        assert_eq!(Stage::SectorSelection.previous(), None);
    }

    #[test]
    fn test_parse_stage_names() {
        assert_eq!("sector".parse::<Stage>(), Ok(Stage::SectorSelection));
        assert_eq!("Startup Discovery".parse::<Stage>(), Ok(Stage::StartupDiscovery));
        assert_eq!("risk-assessment".parse::<Stage>(), Ok(Stage::RiskAssessment));
        assert_eq!("Deal Summary".parse::<Stage>(), Ok(Stage::DealSummary));
        assert!("nowhere".parse::<Stage>().is_err());
    }
}
