use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Parsed sector briefing. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub name: String,
    pub summary: String,
    pub trends: String,
    /// Ordered as the model listed them.
    pub sub_sectors: Vec<SubSector>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubSector {
    pub name: String,
    pub description: String,
}

impl Sector {
    /// Case-insensitive lookup returning the canonical sub-sector.
    pub fn find_sub_sector(&self, name: &str) -> Option<&SubSector> {
        let wanted = name.trim();
        self.sub_sectors
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(wanted))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupCandidate {
    pub name: String,
    pub description: String,
    pub funding: Option<f64>,
    pub technology: String,
}

impl StartupCandidate {
    /// Plain-text profile embedded in assessment and memo prompts.
    pub fn profile(&self) -> String {
        format!(
            "Name: {}\nDescription: {}\nTechnology: {}\nFunding: {}",
            self.name,
            non_empty(&self.description, "No description available"),
            non_empty(&self.technology, "No technology information available"),
            format_funding(self.funding),
        )
    }
}

fn non_empty<'a>(s: &'a str, fallback: &'a str) -> &'a str {
    if s.trim().is_empty() {
        fallback
    } else {
        s
    }
}

pub fn format_funding(funding: Option<f64>) -> String {
    match funding {
        Some(f) if f >= 1_000_000_000.0 => format!("${:.1}B", f / 1_000_000_000.0),
        Some(f) if f >= 1_000_000.0 => format!("${:.1}M", f / 1_000_000.0),
        Some(f) if f >= 1_000.0 => format!("${:.0}K", f / 1_000.0),
        Some(f) => format!("${:.0}", f),
        None => "N/A".to_string(),
    }
}

/// Qualitative level used for category risk and confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Low,
    Medium,
    High,
    Unknown,
}

impl Level {
    /// Reads the first recognizable level word; anything else is `Unknown`.
    pub fn parse(text: &str) -> Self {
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            match word.to_lowercase().as_str() {
                "low" => return Level::Low,
                "medium" | "moderate" | "med" => return Level::Medium,
                "high" => return Level::High,
                _ => {}
            }
        }
        Level::Unknown
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Low => "Low",
            Level::Medium => "Medium",
            Level::High => "High",
            Level::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub level: Level,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub startup_name: String,
    /// Keyed by category label, always holds every scorecard category.
    pub category_scores: BTreeMap<String, CategoryScore>,
    /// Absent when the model's score could not be read as a number in [1, 10].
    pub overall_score: Option<f32>,
    pub summary: String,
    pub confidence: Level,
}
