use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::session::{rewind, Session};
use super::Stage;
use crate::contracts::narrative::{self, PortfolioRow};
use crate::contracts::sector as sector_contract;
use crate::discovery;
use crate::error::ScoutError;
use crate::llm::CompletionClient;
use crate::model::{RiskAssessment, Sector, StartupCandidate};
use crate::risk::{PortfolioStats, RiskEngine};
use crate::state::ScoutConfig;
use crate::store::DealStore;

/// Shared handles every per-user controller is built from.
#[derive(Clone)]
pub struct Services {
    pub general: CompletionClient,
    pub search: CompletionClient,
    pub config: Arc<RwLock<ScoutConfig>>,
    pub store: Option<Arc<DealStore>>,
}

/// Result of one assessment pass over the confirmed shortlist.
#[derive(Debug)]
pub struct AssessmentReport {
    pub newly_assessed: Vec<String>,
    pub cached: Vec<String>,
    pub failed: Vec<(String, ScoutError)>,
    pub stats: PortfolioStats,
    /// Generated once every selected startup has an assessment.
    pub insights: Option<Result<String, ScoutError>>,
}

#[derive(Debug)]
pub enum StageOutcome {
    Discovered { count: usize },
    Assessed(AssessmentReport),
    Summarized {
        memos: usize,
        fallbacks: usize,
        insights_available: bool,
    },
}

pub struct CandidateRow<'a> {
    pub candidate: &'a StartupCandidate,
    pub selected: bool,
    pub assessment: Option<&'a RiskAssessment>,
    pub memo: Option<&'a str>,
}

/// Read model of the current stage for presentation.
pub struct StageView<'a> {
    pub stage: Stage,
    pub progress: f32,
    pub selected_sector: Option<&'a str>,
    pub sector: Option<&'a Sector>,
    pub sub_sector: Option<&'a str>,
    pub candidates: Vec<CandidateRow<'a>>,
    /// Only from the risk assessment stage onwards.
    pub stats: Option<PortfolioStats>,
    pub insights: Option<&'a str>,
}

pub struct Controller {
    session: Session,
    general: CompletionClient,
    search: CompletionClient,
    risk: RiskEngine,
    config: Arc<RwLock<ScoutConfig>>,
    store: Option<Arc<DealStore>>,
}

impl Controller {
    pub fn new(services: &Services) -> Self {
        Self {
            session: Session::default(),
            general: services.general.clone(),
            search: services.search.clone(),
            risk: RiskEngine::new(services.general.clone()),
            config: services.config.clone(),
            store: services.store.clone(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stage(&self) -> Stage {
        self.session.current_stage
    }

    async fn settings(&self) -> ScoutConfig {
        self.config.read().await.clone()
    }

    fn require_stage(&self, allowed: &[Stage], reason: &str) -> Result<(), ScoutError> {
        if allowed.contains(&self.session.current_stage) {
            Ok(())
        } else {
            Err(ScoutError::precondition(self.session.current_stage, reason))
        }
    }

    // ── Sector selection ──────────────────────────────────────────────

    /// Choose a sector and fetch its briefing. Re-selecting the current sector is free
    /// unless its briefing listed no sub-sectors.
    pub async fn select_sector(&mut self, name: &str) -> Result<&Sector, ScoutError> {
        self.require_stage(
            &[Stage::SectorSelection],
            "sectors can only be chosen during sector selection",
        )?;
        let settings = self.settings().await;
        let wanted = name.trim();
        let canonical = settings
            .sectors
            .iter()
            .find(|s| s.eq_ignore_ascii_case(wanted))
            .cloned()
            .ok_or_else(|| {
                ScoutError::InvalidSelection(format!(
                    "Unknown sector '{}'. Choose one of: {}",
                    wanted,
                    settings.sectors.join(", ")
                ))
            })?;

        let cached = self.session.selected_sector.as_deref() == Some(canonical.as_str())
            && self
                .session
                .sector
                .as_ref()
                .is_some_and(|s| !s.sub_sectors.is_empty());
        if cached {
            debug!(sector = %canonical, "Sector briefing already loaded");
        } else {
            info!(sector = %canonical, "Fetching sector briefing");
            let prompt = sector_contract::render(&canonical);
            let text = self.general.complete(&prompt, settings.max_tokens).await?;
            let sector = sector_contract::parse(&canonical, &text)?;
            info!(
                sector = %canonical,
                sub_sectors = sector.sub_sectors.len(),
                "Sector briefing ready"
            );
            self.session.selected_sector = Some(canonical);
            self.session.sector = Some(sector);
            self.session.selected_sub_sector = None;
        }

        self.session.sector.as_ref().ok_or_else(|| {
            ScoutError::precondition(Stage::SectorSelection, "no sector briefing loaded")
        })
    }

    /// Returns the canonical sub-sector name.
    pub fn select_sub_sector(&mut self, name: &str) -> Result<String, ScoutError> {
        self.require_stage(
            &[Stage::SectorSelection],
            "sub-sectors can only be chosen during sector selection",
        )?;
        let sector = self.session.sector.as_ref().ok_or_else(|| {
            ScoutError::precondition(Stage::SectorSelection, "choose a sector first")
        })?;
        let sub_sector = sector.find_sub_sector(name).ok_or_else(|| {
            let options: Vec<&str> = sector.sub_sectors.iter().map(|s| s.name.as_str()).collect();
            ScoutError::InvalidSelection(format!(
                "Unknown sub-sector '{}'. Choose one of: {}",
                name.trim(),
                options.join(", ")
            ))
        })?;

        let canonical = sub_sector.name.clone();
        info!(sub_sector = %canonical, "Sub-sector selected");
        self.session.selected_sub_sector = Some(canonical.clone());
        Ok(canonical)
    }

    // ── Transitions ───────────────────────────────────────────────────

    pub async fn advance_stage(&mut self) -> Result<StageOutcome, ScoutError> {
        match self.session.current_stage {
            Stage::SectorSelection => self.enter_discovery().await,
            Stage::StartupDiscovery => self.enter_risk_assessment().await,
            Stage::RiskAssessment => self.enter_deal_summary().await,
            Stage::DealSummary => Err(ScoutError::precondition(
                Stage::DealSummary,
                "this is the final stage; rewind or reset to start over",
            )),
        }
    }

    async fn enter_discovery(&mut self) -> Result<StageOutcome, ScoutError> {
        let stage = Stage::SectorSelection;
        let sector = self
            .session
            .selected_sector
            .clone()
            .ok_or_else(|| ScoutError::precondition(stage, "choose a sector first"))?;
        let sub_sector = self
            .session
            .selected_sub_sector
            .clone()
            .ok_or_else(|| ScoutError::precondition(stage, "choose a sub-sector first"))?;

        // Nothing is written to the session until discovery succeeds.
        let candidates = self.run_discovery(&sector, &sub_sector).await?;
        let count = candidates.len();
        self.session.candidates = candidates;
        self.session.current_stage = Stage::StartupDiscovery;
        info!(sector = %sector, sub_sector = %sub_sector, count, "Entered startup discovery");

        self.persist_candidates(&sector, &sub_sector).await;
        Ok(StageOutcome::Discovered { count })
    }

    async fn enter_risk_assessment(&mut self) -> Result<StageOutcome, ScoutError> {
        if self.session.selected_candidate_names.is_empty() {
            return Err(ScoutError::precondition(
                Stage::StartupDiscovery,
                "confirm at least one startup first",
            ));
        }
        self.session.current_stage = Stage::RiskAssessment;
        info!(
            selected = self.session.selected_candidate_names.len(),
            "Entered risk assessment"
        );
        Ok(StageOutcome::Assessed(self.run_assessment_pass().await))
    }

    async fn enter_deal_summary(&mut self) -> Result<StageOutcome, ScoutError> {
        let pending: Vec<String> = self
            .session
            .pending_assessments()
            .into_iter()
            .map(str::to_string)
            .collect();
        if !pending.is_empty() {
            return Err(ScoutError::precondition(
                Stage::RiskAssessment,
                format!(
                    "still missing assessments for {}; run assess again",
                    pending.join(", ")
                ),
            ));
        }

        self.session.current_stage = Stage::DealSummary;
        let settings = self.settings().await;
        let max_tokens = settings.max_tokens;

        let memos: Vec<(String, Result<String, ScoutError>)> = {
            let jobs: Vec<(&StartupCandidate, &RiskAssessment)> = self
                .session
                .selected_candidates()
                .into_iter()
                .filter_map(|c| self.session.assessments.get(&c.name).map(|a| (c, a)))
                .collect();
            let risk = &self.risk;
            stream::iter(jobs)
                .map(|(candidate, assessment)| async move {
                    let memo = risk.deal_memo(candidate, assessment, max_tokens).await;
                    (candidate.name.clone(), memo)
                })
                .buffered(settings.max_parallel_assessments.max(1) as usize)
                .collect::<Vec<_>>()
                .boxed()
                .await
        };

        let mut fallbacks = 0;
        for (name, memo) in memos {
            let text = match memo {
                Ok(text) => text,
                Err(e) => {
                    warn!(startup = %name, error = %e, "Deal memo unavailable, using fallback");
                    fallbacks += 1;
                    format!(
                        "A deal summary for {} could not be generated right now. \
                         Its risk assessment is still available.",
                        name
                    )
                }
            };
            self.session.deal_memos.insert(name, text);
        }

        let insights_available = self.refresh_insights(max_tokens).await.is_ok();
        info!(
            memos = self.session.deal_memos.len(),
            fallbacks, insights_available, "Entered deal summary"
        );
        Ok(StageOutcome::Summarized {
            memos: self.session.deal_memos.len(),
            fallbacks,
            insights_available,
        })
    }

    // ── Stage actions ─────────────────────────────────────────────────

    /// Re-run discovery for the current sub-sector, replacing the candidate list.
    pub async fn discover(&mut self) -> Result<usize, ScoutError> {
        self.require_stage(
            &[Stage::StartupDiscovery],
            "discovery can only be re-run during startup discovery",
        )?;
        let stage = Stage::StartupDiscovery;
        let sector = self
            .session
            .selected_sector
            .clone()
            .ok_or_else(|| ScoutError::precondition(stage, "no sector selected"))?;
        let sub_sector = self
            .session
            .selected_sub_sector
            .clone()
            .ok_or_else(|| ScoutError::precondition(stage, "no sub-sector selected"))?;

        let candidates = self.run_discovery(&sector, &sub_sector).await?;
        let count = candidates.len();
        self.session = rewind(std::mem::take(&mut self.session), stage);
        self.session.candidates = candidates;
        self.session.selected_candidate_names.clear();
        self.persist_candidates(&sector, &sub_sector).await;
        Ok(count)
    }

    /// Replace the shortlist. Every name must come from the discovered list.
    pub fn confirm_candidates(&mut self, names: &[String]) -> Result<Vec<String>, ScoutError> {
        let stage = Stage::StartupDiscovery;
        self.require_stage(&[stage], "startups can only be confirmed during startup discovery")?;

        let requested: Vec<&str> = names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect();
        if requested.is_empty() {
            return Err(ScoutError::precondition(stage, "select at least one startup"));
        }

        let mut chosen: BTreeSet<String> = BTreeSet::new();
        let mut unknown: Vec<&str> = Vec::new();
        for name in requested {
            match self.session.resolve_candidate(name) {
                Some(canonical) => {
                    chosen.insert(canonical.to_string());
                }
                None => unknown.push(name),
            }
        }
        if !unknown.is_empty() {
            return Err(ScoutError::InvalidSelection(format!(
                "Not in the discovered list: {}",
                unknown.join(", ")
            )));
        }

        self.session
            .assessments
            .retain(|name, _| chosen.contains(name));
        self.session
            .deal_memos
            .retain(|name, _| chosen.contains(name));
        self.session.selected_candidate_names = chosen;
        info!(
            selected = self.session.selected_candidate_names.len(),
            "Shortlist confirmed"
        );
        Ok(self
            .session
            .selected_candidates()
            .iter()
            .map(|c| c.name.clone())
            .collect())
    }

    /// Assess the selected startups that have no assessment yet.
    pub async fn assess(&mut self) -> Result<AssessmentReport, ScoutError> {
        self.require_stage(
            &[Stage::RiskAssessment],
            "assessments run during the risk assessment stage",
        )?;
        Ok(self.run_assessment_pass().await)
    }

    pub async fn regenerate_insights(&mut self) -> Result<String, ScoutError> {
        self.require_stage(
            &[Stage::RiskAssessment, Stage::DealSummary],
            "insights need completed risk assessments",
        )?;
        let pending = self.session.pending_assessments().len();
        if pending > 0 {
            return Err(ScoutError::precondition(
                self.session.current_stage,
                format!("{} startup(s) still need an assessment", pending),
            ));
        }
        let max_tokens = self.settings().await.max_tokens;
        self.refresh_insights(max_tokens).await
    }

    /// Answer a follow-up question about one assessed startup. Not cached.
    pub async fn deep_dive(&self, name: &str, question: &str) -> Result<String, ScoutError> {
        self.require_stage(
            &[Stage::RiskAssessment, Stage::DealSummary],
            "deep dives need a risk assessment",
        )?;
        let question = question.trim();
        if question.is_empty() {
            return Err(ScoutError::InvalidSelection(
                "Ask a question for the deep dive".to_string(),
            ));
        }

        let canonical = self
            .session
            .resolve_candidate(name)
            .ok_or_else(|| ScoutError::InvalidSelection(format!("Unknown startup '{}'", name.trim())))?;
        let assessment = self.session.assessments.get(canonical).ok_or_else(|| {
            ScoutError::InvalidSelection(format!("{} has not been assessed", canonical))
        })?;
        let candidate = self.session.candidate(canonical).ok_or_else(|| {
            ScoutError::InvalidSelection(format!("Unknown startup '{}'", canonical))
        })?;

        let max_tokens = self.settings().await.max_tokens;
        self.risk
            .deep_dive(candidate, assessment, question, max_tokens)
            .await
    }

    /// Three prompts to help pick a sector. Available at any stage.
    pub async fn sector_questions(&self) -> Result<String, ScoutError> {
        let max_tokens = self.settings().await.max_tokens;
        let text = self
            .general
            .complete(&narrative::render_sector_questions(), max_tokens)
            .await?;
        Ok(narrative::parse(&text))
    }

    /// Names already tracked in the deal store for the current sub-sector.
    pub async fn tracked_startups(&self) -> Vec<String> {
        let (Some(store), Some(sector), Some(sub_sector)) = (
            &self.store,
            self.session.selected_sector.as_deref(),
            self.session.selected_sub_sector.as_deref(),
        ) else {
            return Vec::new();
        };
        match store
            .startups_by_sector(sector, sub_sector)
            .await
            .map_err(ScoutError::from)
        {
            Ok(records) => records.into_iter().map(|r| r.name).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to read tracked startups");
                Vec::new()
            }
        }
    }

    // ── Navigation ────────────────────────────────────────────────────

    /// Step back one stage. At sector selection this clears the sector choice.
    pub fn go_back(&mut self) -> Result<Stage, ScoutError> {
        match self.session.current_stage.previous() {
            Some(previous) => {
                self.rewind_to(previous)?;
                Ok(previous)
            }
            None if self.session.selected_sector.is_some() => {
                self.rewind_to(Stage::SectorSelection)?;
                Ok(Stage::SectorSelection)
            }
            None => Err(ScoutError::precondition(
                Stage::SectorSelection,
                "already at the first stage",
            )),
        }
    }

    pub fn rewind_to(&mut self, target: Stage) -> Result<(), ScoutError> {
        let current = self.session.current_stage;
        if target > current {
            return Err(ScoutError::precondition(
                current,
                format!("cannot rewind forward to {}", target),
            ));
        }
        self.session = rewind(std::mem::take(&mut self.session), target);
        info!(from = %current, to = %target, "Rewound session");
        debug_assert!(self.session.invariants_hold());
        Ok(())
    }

    pub fn reset(&mut self) {
        self.session = Session::default();
        info!("Session reset");
    }

    pub fn view(&self) -> StageView<'_> {
        let session = &self.session;
        let candidates = session
            .candidates
            .iter()
            .map(|c| CandidateRow {
                candidate: c,
                selected: session.selected_candidate_names.contains(&c.name),
                assessment: session.assessments.get(&c.name),
                memo: session.deal_memos.get(&c.name).map(String::as_str),
            })
            .collect();
        let stats = (session.current_stage >= Stage::RiskAssessment).then(|| self.portfolio_stats());

        StageView {
            stage: session.current_stage,
            progress: session.progress(),
            selected_sector: session.selected_sector.as_deref(),
            sector: session.sector.as_ref(),
            sub_sector: session.selected_sub_sector.as_deref(),
            candidates,
            stats,
            insights: session.insights.as_deref(),
        }
    }

    // ── Internals ─────────────────────────────────────────────────────

    async fn run_discovery(
        &self,
        sector: &str,
        sub_sector: &str,
    ) -> Result<Vec<StartupCandidate>, ScoutError> {
        let settings = self.settings().await;
        discovery::discover(
            &self.search,
            sector,
            sub_sector,
            settings.num_startups as usize,
            settings.discovery_max_tokens,
        )
        .await
    }

    async fn run_assessment_pass(&mut self) -> AssessmentReport {
        let settings = self.settings().await;
        let batch = {
            let selected = self.session.selected_candidates();
            self.risk
                .assess_pending(
                    &selected,
                    &self.session.assessments,
                    settings.max_parallel_assessments as usize,
                    settings.max_tokens,
                )
                .await
        };

        let newly_assessed: Vec<String> =
            batch.completed.iter().map(|a| a.startup_name.clone()).collect();
        for assessment in batch.completed {
            self.session
                .assessments
                .insert(assessment.startup_name.clone(), assessment);
        }
        self.persist_assessments(&newly_assessed).await;

        let insights = if self.session.all_selected_assessed() {
            Some(self.refresh_insights(settings.max_tokens).await)
        } else {
            None
        };

        AssessmentReport {
            newly_assessed,
            cached: batch.cached,
            failed: batch.failed,
            stats: self.portfolio_stats(),
            insights,
        }
    }

    async fn refresh_insights(&mut self, max_tokens: u32) -> Result<String, ScoutError> {
        let result = {
            let sector = self.session.selected_sector.as_deref().unwrap_or("");
            let sub_sector = self.session.selected_sub_sector.as_deref().unwrap_or("");
            let rows = self.portfolio_rows();
            self.risk.insights(sector, sub_sector, &rows, max_tokens).await
        };
        match &result {
            Ok(text) => self.session.insights = Some(text.clone()),
            Err(e) => warn!(error = %e, "Portfolio insights unavailable"),
        }
        result
    }

    fn portfolio_rows(&self) -> Vec<PortfolioRow<'_>> {
        self.session
            .selected_candidates()
            .into_iter()
            .filter_map(|candidate| {
                self.session
                    .assessments
                    .get(&candidate.name)
                    .map(|assessment| PortfolioRow {
                        candidate,
                        assessment,
                    })
            })
            .collect()
    }

    fn portfolio_stats(&self) -> PortfolioStats {
        PortfolioStats::from_assessments(self.portfolio_rows().iter().map(|r| r.assessment))
    }

    async fn persist_candidates(&self, sector: &str, sub_sector: &str) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store
            .save_startups(sector, sub_sector, &self.session.candidates)
            .await
            .map_err(ScoutError::from)
        {
            warn!(error = %e, "Failed to persist discovered startups");
        }
    }

    async fn persist_assessments(&self, names: &[String]) {
        let Some(store) = &self.store else { return };
        if names.is_empty() {
            return;
        }
        let Some(sector) = self.session.selected_sector.as_deref() else {
            return;
        };
        let sub_sector = self.session.selected_sub_sector.as_deref().unwrap_or("");
        let candidates: Vec<StartupCandidate> = names
            .iter()
            .filter_map(|n| self.session.candidate(n).cloned())
            .collect();

        let saved = async {
            store.save_startups(sector, sub_sector, &candidates).await?;
            store
                .save_assessments(names.iter().filter_map(|n| self.session.assessments.get(n)))
                .await
        }
        .await
        .map_err(ScoutError::from);
        match saved {
            Ok(count) => debug!(count, "Assessments persisted"),
            Err(e) => warn!(error = %e, "Failed to persist assessments"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompletionError, ParseError};
    use crate::llm::testing::ScriptedProvider;
    use crate::llm::retry::RetryPolicy;

    const SECTOR_BRIEFING: &str = "Summary: Clean power generation and storage.\n\
        Trends: Falling solar costs and grid-scale batteries.\n\
        Sub-sectors:\n\
        1. Solar Energy: Photovoltaics and solar thermal.\n\
        2. Wind Energy: Onshore and offshore turbines.\n";

    const SOLAR_ONLY: &str = r#"Here you go: [{"name": "SolarTech", "description": "Solar panel manufacturer", "funding": 1000000, "technology": "Advanced photovoltaic cells"}]"#;

    const TWO_STARTUPS: &str = r#"[{"name": "SolarTech", "description": "Solar panel manufacturer", "funding": 1000000, "technology": "Advanced photovoltaic cells"}, {"name": "Broken", "description": "Flaky", "funding": "unknown", "technology": "Perovskite"}]"#;

    const SCORECARD: &str = "1. Technology Novelty\nLevel: Medium\nExplanation: Incremental.\n\
        Overall Risk Score: 4\nSummary: Mature technology.\nConfidence: High\n";

    fn general() -> Arc<ScriptedProvider> {
        Arc::new(
            ScriptedProvider::new()
                .on("Provide a briefing on the", SECTOR_BRIEFING)
                .on("Overall Risk Score", SCORECARD)
                .on("Create a concise deal summary", "Solid team, modest risk.")
                .on("insight report", "Low-risk shortlist.")
                .on("deep dive", "Costs are falling.")
                .on("identify promising deeptech sectors", "1. Q1\n2. Q2\n3. Q3"),
        )
    }

    fn search(reply: &str) -> Arc<ScriptedProvider> {
        Arc::new(ScriptedProvider::new().on("JSON array", reply))
    }

    fn controller(general: &Arc<ScriptedProvider>, search: &Arc<ScriptedProvider>) -> Controller {
        Controller::new(&Services {
            general: general.client(),
            search: search.client(),
            config: Arc::new(RwLock::new(ScoutConfig::default())),
            store: None,
        })
    }

    async fn at_discovery(c: &mut Controller) {
        c.select_sector("renewable energy").await.unwrap();
        c.select_sub_sector("solar energy").unwrap();
        c.advance_stage().await.unwrap();
    }

    #[tokio::test]
    async fn test_end_to_end_solar_flow() {
        let general = general();
        let search = search(SOLAR_ONLY);
        let mut c = controller(&general, &search);

        let sector = c.select_sector("renewable energy").await.unwrap();
        assert_eq!(sector.name, "Renewable Energy");
        assert_eq!(sector.sub_sectors.len(), 2);
        assert_eq!(c.select_sub_sector("solar energy").unwrap(), "Solar Energy");

        let outcome = c.advance_stage().await.unwrap();
        assert!(matches!(outcome, StageOutcome::Discovered { count: 1 }));
        assert_eq!(c.stage(), Stage::StartupDiscovery);
        assert_eq!(c.session().candidates[0].funding, Some(1_000_000.0));

        let confirmed = c.confirm_candidates(&["solartech".to_string()]).unwrap();
        assert_eq!(confirmed, vec!["SolarTech".to_string()]);

        let StageOutcome::Assessed(report) = c.advance_stage().await.unwrap() else {
            panic!("expected an assessment report");
        };
        assert_eq!(report.newly_assessed, vec!["SolarTech".to_string()]);
        assert!(report.failed.is_empty());
        assert_eq!(report.stats.average, Some(4.0));
        assert!(matches!(report.insights, Some(Ok(_))));

        // Assessing again hits the cache.
        let again = c.assess().await.unwrap();
        assert_eq!(again.cached, vec!["SolarTech".to_string()]);
        assert_eq!(general.calls_matching("Assess the technology risk"), 1);

        let outcome = c.advance_stage().await.unwrap();
        assert!(matches!(
            outcome,
            StageOutcome::Summarized { memos: 1, fallbacks: 0, insights_available: true }
        ));
        assert_eq!(c.stage(), Stage::DealSummary);
        assert_eq!(c.session().progress(), 1.0);
        assert_eq!(
            c.session().deal_memos.get("SolarTech").map(String::as_str),
            Some("Solid team, modest risk.")
        );
        assert!(c.session().invariants_hold());

        let view = c.view();
        assert_eq!(view.candidates.len(), 1);
        assert_eq!(view.candidates[0].memo, Some("Solid team, modest risk."));
        assert_eq!(view.insights, Some("Low-risk shortlist."));
    }

    #[tokio::test]
    async fn test_discovery_failure_leaves_session_unchanged() {
        let general = general();
        let search = Arc::new(
            ScriptedProvider::new().fail_on("JSON array", CompletionError::Fatal("401".into())),
        );
        let mut c = controller(&general, &search);
        c.select_sector("Renewable Energy").await.unwrap();
        c.select_sub_sector("Solar Energy").unwrap();
        let before = c.session().clone();

        let err = c.advance_stage().await.unwrap_err();
        assert!(matches!(err, ScoutError::Completion(CompletionError::Fatal(_))));
        assert_eq!(c.session(), &before);
        assert_eq!(c.stage(), Stage::SectorSelection);
    }

    #[tokio::test]
    async fn test_malformed_discovery_leaves_session_unchanged() {
        let general = general();
        let search = search("\"no startups\"");
        let mut c = controller(&general, &search);
        c.select_sector("Renewable Energy").await.unwrap();
        c.select_sub_sector("Solar Energy").unwrap();

        let err = c.advance_stage().await.unwrap_err();
        assert!(matches!(err, ScoutError::Parse(ParseError::MalformedShape(_))));
        assert_eq!(c.stage(), Stage::SectorSelection);
        assert!(c.session().candidates.is_empty());
        assert_eq!(c.session().selected_sub_sector.as_deref(), Some("Solar Energy"));
    }

    #[tokio::test]
    async fn test_empty_briefing_is_refetched() {
        let general = general();
        general.push(
            "Provide a briefing on the",
            Ok("Summary: Clean power.\nTrends: Storage.\n".to_string()),
        );
        let search = search(SOLAR_ONLY);
        let mut c = controller(&general, &search);

        let sector = c.select_sector("Renewable Energy").await.unwrap();
        assert!(sector.sub_sectors.is_empty());
        assert!(matches!(
            c.select_sub_sector("Solar Energy"),
            Err(ScoutError::InvalidSelection(_))
        ));

        general.push("Provide a briefing on the", Ok(SECTOR_BRIEFING.to_string()));
        let sector = c.select_sector("Renewable Energy").await.unwrap();
        assert_eq!(sector.sub_sectors.len(), 2);
        assert_eq!(general.calls_matching("Provide a briefing on the"), 2);
        assert_eq!(c.select_sub_sector("Solar Energy").unwrap(), "Solar Energy");

        // A usable briefing is reused.
        c.select_sector("Renewable Energy").await.unwrap();
        assert_eq!(general.calls_matching("Provide a briefing on the"), 2);
    }

    #[tokio::test]
    async fn test_guards_leave_session_untouched() {
        let general = general();
        let search = search(SOLAR_ONLY);
        let mut c = controller(&general, &search);

        let err = c.advance_stage().await.unwrap_err();
        assert!(matches!(err, ScoutError::PreconditionNotMet { .. }));
        assert_eq!(c.session(), &Session::default());

        assert!(matches!(
            c.select_sector("Underwater Basket Weaving").await,
            Err(ScoutError::InvalidSelection(_))
        ));
        assert!(matches!(
            c.select_sub_sector("Solar Energy"),
            Err(ScoutError::PreconditionNotMet { .. })
        ));

        c.select_sector("Renewable Energy").await.unwrap();
        assert!(matches!(
            c.advance_stage().await,
            Err(ScoutError::PreconditionNotMet { .. })
        ));
        assert!(matches!(
            c.select_sub_sector("Geothermal"),
            Err(ScoutError::InvalidSelection(_))
        ));

        c.select_sub_sector("Solar Energy").unwrap();
        c.advance_stage().await.unwrap();
        let before = c.session().clone();
        assert!(matches!(
            c.confirm_candidates(&[]),
            Err(ScoutError::PreconditionNotMet { .. })
        ));
        assert!(matches!(
            c.confirm_candidates(&["Nope".to_string()]),
            Err(ScoutError::InvalidSelection(_))
        ));
        assert!(matches!(
            c.advance_stage().await,
            Err(ScoutError::PreconditionNotMet { .. })
        ));
        assert_eq!(c.session(), &before);
    }

    #[tokio::test]
    async fn test_partial_failure_enters_stage_and_retries_remainder() {
        let general = Arc::new(
            ScriptedProvider::new()
                .on("Provide a briefing on the", SECTOR_BRIEFING)
                .on("Overall Risk Score", SCORECARD)
                .on("insight report", "Mixed shortlist.")
                .fail_on("Name: Broken", CompletionError::Fatal("400".into())),
        );
        let search = search(TWO_STARTUPS);
        let mut c = controller(&general, &search);
        at_discovery(&mut c).await;
        c.confirm_candidates(&["SolarTech".to_string(), "Broken".to_string()])
            .unwrap();

        let StageOutcome::Assessed(report) = c.advance_stage().await.unwrap() else {
            panic!("expected an assessment report");
        };
        assert_eq!(c.stage(), Stage::RiskAssessment);
        assert_eq!(report.newly_assessed, vec!["SolarTech".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.insights.is_none());

        let before = c.session().clone();
        assert!(matches!(
            c.advance_stage().await,
            Err(ScoutError::PreconditionNotMet { .. })
        ));
        assert_eq!(c.session(), &before);

        general.push("Name: Broken", Ok(SCORECARD.to_string()));
        let retry = c.assess().await.unwrap();
        assert_eq!(retry.newly_assessed, vec!["Broken".to_string()]);
        assert_eq!(retry.cached, vec!["SolarTech".to_string()]);
        assert_eq!(general.calls_matching("Name: SolarTech"), 1);
        assert!(c.session().all_selected_assessed());
    }

    #[tokio::test]
    async fn test_memo_failure_uses_fallback() {
        let general = general();
        general.push(
            "Create a concise deal summary",
            Err(CompletionError::Fatal("500".into())),
        );
        let search = search(SOLAR_ONLY);
        let mut c = controller(&general, &search);
        at_discovery(&mut c).await;
        c.confirm_candidates(&["SolarTech".to_string()]).unwrap();
        c.advance_stage().await.unwrap();

        let outcome = c.advance_stage().await.unwrap();
        assert!(matches!(outcome, StageOutcome::Summarized { fallbacks: 1, .. }));
        let memo = c.session().deal_memos.get("SolarTech").unwrap();
        assert!(memo.contains("could not be generated"));
    }

    #[tokio::test]
    async fn test_navigation_rewinds_downstream_state() {
        let general = general();
        let search = search(SOLAR_ONLY);
        let mut c = controller(&general, &search);

        assert!(c.go_back().is_err());

        at_discovery(&mut c).await;
        c.confirm_candidates(&["SolarTech".to_string()]).unwrap();
        c.advance_stage().await.unwrap();
        c.advance_stage().await.unwrap();

        assert!(matches!(
            c.deep_dive("SolarTech", "How fast are costs falling?").await.as_deref(),
            Ok("Costs are falling.")
        ));
        assert!(c.deep_dive("Unknown", "Why?").await.is_err());

        assert_eq!(c.go_back().unwrap(), Stage::RiskAssessment);
        assert!(c.session().deal_memos.is_empty());
        assert_eq!(c.session().assessments.len(), 1);

        assert!(c.rewind_to(Stage::DealSummary).is_err());
        c.rewind_to(Stage::StartupDiscovery).unwrap();
        assert!(c.session().assessments.is_empty());
        assert_eq!(c.session().selected_candidate_names.len(), 1);

        c.go_back().unwrap();
        assert_eq!(c.session(), &Session::default());

        let questions = c.sector_questions().await.unwrap();
        assert!(questions.starts_with("1. Q1"));
    }

    #[tokio::test]
    async fn test_rediscovery_replaces_shortlist() {
        let general = general();
        let search = search(TWO_STARTUPS);
        let mut c = controller(&general, &search);
        at_discovery(&mut c).await;
        c.confirm_candidates(&["SolarTech".to_string(), "Broken".to_string()])
            .unwrap();
        c.advance_stage().await.unwrap();
        assert_eq!(c.session().assessments.len(), 2);

        c.rewind_to(Stage::StartupDiscovery).unwrap();
        c.confirm_candidates(&["Broken".to_string()]).unwrap();
        assert!(c.session().invariants_hold());
        assert_eq!(c.session().selected_candidate_names.len(), 1);

        let count = c.discover().await.unwrap();
        assert_eq!(count, 2);
        assert!(c.session().selected_candidate_names.is_empty());

        c.reset();
        assert_eq!(c.session(), &Session::default());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_assessments_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            DealStore::open(dir.path(), &RetryPolicy::immediate(1))
                .await
                .unwrap(),
        );
        let general = general();
        let search = search(SOLAR_ONLY);
        let mut c = Controller::new(&Services {
            general: general.client(),
            search: search.client(),
            config: Arc::new(RwLock::new(ScoutConfig::default())),
            store: Some(store.clone()),
        });
        at_discovery(&mut c).await;
        c.confirm_candidates(&["SolarTech".to_string()]).unwrap();
        c.advance_stage().await.unwrap();

        assert_eq!(c.tracked_startups().await, vec!["SolarTech".to_string()]);
        let curated = store.curated(10).await.unwrap();
        assert_eq!(curated.len(), 1);
        assert_eq!(curated[0].startup.sub_sector, "Solar Energy");
        assert_eq!(curated[0].assessment.risk_score, Some(4.0));
    }
}
