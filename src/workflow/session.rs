use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::Stage;
use crate::model::{RiskAssessment, Sector, StartupCandidate};

/// Per-user wizard state. Only [`super::Controller`] mutates it.
///
/// Invariant: `deal_memos` keys ⊆ `assessments` keys ⊆ `selected_candidate_names`
/// ⊆ names in `candidates`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Session {
    pub current_stage: Stage,
    pub selected_sector: Option<String>,
    pub sector: Option<Sector>,
    pub selected_sub_sector: Option<String>,
    pub candidates: Vec<StartupCandidate>,
    pub selected_candidate_names: BTreeSet<String>,
    pub assessments: BTreeMap<String, RiskAssessment>,
    /// Latest portfolio narrative; regenerated on demand.
    pub insights: Option<String>,
    pub deal_memos: BTreeMap<String, String>,
}

impl Session {
    pub fn progress(&self) -> f32 {
        self.current_stage.progress()
    }

    pub fn candidate(&self, name: &str) -> Option<&StartupCandidate> {
        self.candidates.iter().find(|c| c.name == name)
    }

    /// Canonical candidate name for a user-typed name (case-insensitive).
    pub fn resolve_candidate(&self, name: &str) -> Option<&str> {
        let wanted = name.trim();
        self.candidates
            .iter()
            .find(|c| c.name == wanted)
            .or_else(|| {
                self.candidates
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(wanted))
            })
            .map(|c| c.name.as_str())
    }

    /// Selected candidates in discovery order.
    pub fn selected_candidates(&self) -> Vec<&StartupCandidate> {
        self.candidates
            .iter()
            .filter(|c| self.selected_candidate_names.contains(&c.name))
            .collect()
    }

    /// Selected names that have no assessment yet.
    pub fn pending_assessments(&self) -> Vec<&str> {
        self.selected_candidate_names
            .iter()
            .filter(|n| !self.assessments.contains_key(*n))
            .map(String::as_str)
            .collect()
    }

    pub fn all_selected_assessed(&self) -> bool {
        !self.selected_candidate_names.is_empty() && self.pending_assessments().is_empty()
    }

    pub fn invariants_hold(&self) -> bool {
        let candidate_names: BTreeSet<&str> =
            self.candidates.iter().map(|c| c.name.as_str()).collect();
        self.selected_candidate_names
            .iter()
            .all(|n| candidate_names.contains(n.as_str()))
            && self
                .assessments
                .keys()
                .all(|n| self.selected_candidate_names.contains(n))
            && self.deal_memos.keys().all(|n| self.assessments.contains_key(n))
    }
}

/// Move the session back to `target`, zeroing everything produced after it.
///
/// Rewinding to sector selection starts the wizard over: the sector briefing itself is
/// discarded along with everything derived from it.
pub fn rewind(mut session: Session, target: Stage) -> Session {
    match target {
        Stage::SectorSelection => return Session::default(),
        Stage::StartupDiscovery => {
            session.assessments.clear();
            session.insights = None;
            session.deal_memos.clear();
        }
        Stage::RiskAssessment => {
            session.insights = None;
            session.deal_memos.clear();
        }
        Stage::DealSummary => {}
    }
    session.current_stage = target;
    session
}
