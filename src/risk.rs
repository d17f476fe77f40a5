use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tracing::{info, warn};

use crate::contracts::narrative::{self, PortfolioRow};
use crate::contracts::scorecard;
use crate::error::ScoutError;
use crate::llm::CompletionClient;
use crate::model::{RiskAssessment, StartupCandidate};

/// Portfolio-level aggregate over a set of assessments.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioStats {
    pub assessed: usize,
    /// Assessments whose overall score parsed.
    pub scored: usize,
    /// Mean over scored assessments only; `None` when nothing was scored.
    pub average: Option<f32>,
    pub highest: Option<(String, f32)>,
    pub lowest: Option<(String, f32)>,
}

impl PortfolioStats {
    pub fn from_assessments<'a>(assessments: impl IntoIterator<Item = &'a RiskAssessment>) -> Self {
        let mut assessed = 0;
        let mut scores: Vec<(&str, f32)> = Vec::new();
        for a in assessments {
            assessed += 1;
            if let Some(score) = a.overall_score.filter(|s| s.is_finite()) {
                scores.push((a.startup_name.as_str(), score));
            }
        }

        let average = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().map(|(_, s)| s).sum::<f32>() / scores.len() as f32)
        };
        let by_score = |a: &&(&str, f32), b: &&(&str, f32)| a.1.total_cmp(&b.1);
        let owned = |(name, score): &(&str, f32)| (name.to_string(), *score);

        Self {
            assessed,
            scored: scores.len(),
            average,
            highest: scores.iter().max_by(by_score).map(owned),
            lowest: scores.iter().min_by(by_score).map(owned),
        }
    }
}

/// Outcome of one assessment pass over the selected candidates.
#[derive(Debug, Default)]
pub struct AssessmentBatch {
    /// Newly produced assessments, in candidate order.
    pub completed: Vec<RiskAssessment>,
    /// Candidates already assessed earlier in the session; no call was made for them.
    pub cached: Vec<String>,
    pub failed: Vec<(String, ScoutError)>,
}

pub struct RiskEngine {
    client: CompletionClient,
}

impl RiskEngine {
    pub fn new(client: CompletionClient) -> Self {
        Self { client }
    }

    pub async fn assess_one(
        &self,
        candidate: &StartupCandidate,
        max_tokens: u32,
    ) -> Result<RiskAssessment, ScoutError> {
        info!(startup = %candidate.name, "Assessing technology risk");
        let prompt = scorecard::render(candidate);
        let text = self.client.complete(&prompt, max_tokens).await?;
        let assessment = scorecard::parse(&candidate.name, &text)?;
        info!(
            startup = %candidate.name,
            score = ?assessment.overall_score,
            confidence = %assessment.confidence,
            "Risk assessment complete"
        );
        Ok(assessment)
    }

    /// Assess every candidate missing from `existing`, at most `parallelism` at a time.
    ///
    /// Returns only after every in-flight call has finished or failed. One candidate's
    /// failure does not affect the others.
    pub async fn assess_pending(
        &self,
        candidates: &[&StartupCandidate],
        existing: &BTreeMap<String, RiskAssessment>,
        parallelism: usize,
        max_tokens: u32,
    ) -> AssessmentBatch {
        let mut batch = AssessmentBatch::default();
        let mut pending: Vec<&StartupCandidate> = Vec::new();
        for &candidate in candidates {
            if existing.contains_key(&candidate.name) {
                batch.cached.push(candidate.name.clone());
            } else {
                pending.push(candidate);
            }
        }

        info!(
            pending = pending.len(),
            cached = batch.cached.len(),
            parallelism,
            "Starting assessment batch"
        );

        let mut results: Vec<(usize, String, Result<RiskAssessment, ScoutError>)> =
            stream::iter(pending.into_iter().enumerate())
                .map(|(order, candidate)| async move {
                    let result = self.assess_one(candidate, max_tokens).await;
                    (order, candidate.name.clone(), result)
                })
                .buffer_unordered(parallelism.max(1))
                .collect::<Vec<_>>()
                .boxed()
                .await;
        results.sort_by_key(|(order, _, _)| *order);

        for (_, name, result) in results {
            match result {
                Ok(assessment) => batch.completed.push(assessment),
                Err(e) => {
                    warn!(startup = %name, error = %e, "Risk assessment failed");
                    batch.failed.push((name, e));
                }
            }
        }
        batch
    }

    /// GP-facing narrative over the whole shortlist. Never cached.
    pub async fn insights(
        &self,
        sector: &str,
        sub_sector: &str,
        rows: &[PortfolioRow<'_>],
        max_tokens: u32,
    ) -> Result<String, ScoutError> {
        let stats = PortfolioStats::from_assessments(rows.iter().map(|r| r.assessment));
        info!(
            sector,
            sub_sector,
            assessed = stats.assessed,
            average = ?stats.average,
            "Generating portfolio insights"
        );
        let prompt = narrative::render_insights(sector, sub_sector, rows, &stats);
        let text = self.client.complete(&prompt, max_tokens).await?;
        Ok(narrative::parse(&text))
    }

    pub async fn deal_memo(
        &self,
        candidate: &StartupCandidate,
        assessment: &RiskAssessment,
        max_tokens: u32,
    ) -> Result<String, ScoutError> {
        let prompt = narrative::render_deal_memo(candidate, assessment);
        let text = self.client.complete(&prompt, max_tokens).await?;
        Ok(narrative::parse(&text))
    }

    pub async fn deep_dive(
        &self,
        candidate: &StartupCandidate,
        assessment: &RiskAssessment,
        question: &str,
        max_tokens: u32,
    ) -> Result<String, ScoutError> {
        info!(startup = %candidate.name, "Deep dive requested");
        let prompt = narrative::render_deep_dive(candidate, assessment, question);
        let text = self.client.complete(&prompt, max_tokens).await?;
        Ok(narrative::parse(&text))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::CompletionError;
    use crate::llm::testing::ScriptedProvider;
    use crate::model::Level;

    fn assessment(name: &str, score: Option<f32>) -> RiskAssessment {
        RiskAssessment {
            startup_name: name.into(),
            category_scores: BTreeMap::new(),
            overall_score: score,
            summary: String::new(),
            confidence: Level::Unknown,
        }
    }

    fn candidate(name: &str) -> StartupCandidate {
        StartupCandidate {
            name: name.into(),
            description: format!("{} description", name),
            funding: None,
            technology: "tech".into(),
        }
    }

    const SCORECARD: &str = "Technology Novelty\nLevel: High\nExplanation: New.\nOverall Risk Score: 7\nSummary: Ok.\nConfidence: High\n";

    #[test]
    fn test_average_skips_unknown_scores() {
        let list = [
            assessment("A", Some(7.0)),
            assessment("B", None),
            assessment("C", Some(9.0)),
        ];
        let stats = PortfolioStats::from_assessments(&list);
        assert_eq!(stats.assessed, 3);
        assert_eq!(stats.scored, 2);
        assert_eq!(stats.average, Some(8.0));
        assert_eq!(stats.highest, Some(("C".to_string(), 9.0)));
        assert_eq!(stats.lowest, Some(("A".to_string(), 7.0)));
    }

    #[test]
    fn test_average_unavailable_without_scores() {
        let list = [assessment("A", None)];
        let stats = PortfolioStats::from_assessments(&list);
        assert_eq!(stats.average, None);
        assert_eq!(stats.scored, 0);

        let empty = PortfolioStats::from_assessments(Vec::<RiskAssessment>::new().iter());
        assert_eq!(empty.average, None);
        assert_eq!(empty.assessed, 0);
    }

    #[tokio::test]
    async fn test_cached_candidates_make_no_calls() {
        let provider = Arc::new(ScriptedProvider::new().on("Overall Risk Score", SCORECARD));
        let engine = RiskEngine::new(provider.client());

        let a = candidate("A");
        let b = candidate("B");
        let mut existing = BTreeMap::new();
        existing.insert("A".to_string(), assessment("A", Some(3.0)));

        let batch = engine.assess_pending(&[&a, &b], &existing, 4, 1000).await;
        assert_eq!(batch.cached, vec!["A".to_string()]);
        assert_eq!(batch.completed.len(), 1);
        assert_eq!(batch.completed[0].startup_name, "B");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_sink_siblings() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .on("Overall Risk Score", SCORECARD)
                .fail_on("Name: Broken", CompletionError::Fatal("400".into())),
        );
        let engine = RiskEngine::new(provider.client());

        let a = candidate("Alpha");
        let broken = candidate("Broken");
        let c = candidate("Gamma");
        let batch = engine
            .assess_pending(&[&a, &broken, &c], &BTreeMap::new(), 2, 1000)
            .await;

        let done: Vec<_> = batch.completed.iter().map(|a| a.startup_name.as_str()).collect();
        assert_eq!(done, vec!["Alpha", "Gamma"]);
        assert_eq!(batch.failed.len(), 1);
        assert_eq!(batch.failed[0].0, "Broken");
    }
}
