//! Free-form narrative prompts. Responses are passed through verbatim (trimmed).

use crate::model::{RiskAssessment, StartupCandidate};
use crate::risk::PortfolioStats;

/// One row of the portfolio table handed to the insights prompt.
pub struct PortfolioRow<'a> {
    pub candidate: &'a StartupCandidate,
    pub assessment: &'a RiskAssessment,
}

fn score_cell(score: Option<f32>) -> String {
    score
        .map(|s| format!("{:.1}", s))
        .unwrap_or_else(|| "Unknown".to_string())
}

pub fn render_portfolio_table(rows: &[PortfolioRow<'_>]) -> String {
    let mut table = String::from("| Startup | Risk Score | Confidence | Technology |\n|---|---|---|---|\n");
    for row in rows {
        table.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            row.candidate.name,
            score_cell(row.assessment.overall_score),
            row.assessment.confidence,
            row.candidate.technology.replace('|', "/"),
        ));
    }
    table
}

pub fn render_insights(
    sector: &str,
    sub_sector: &str,
    rows: &[PortfolioRow<'_>],
    stats: &PortfolioStats,
) -> String {
    let average = stats
        .average
        .map(|a| format!("{:.2}", a))
        .unwrap_or_else(|| "unavailable (no startup produced a valid score)".to_string());

    let mut details = String::new();
    for row in rows {
        details.push_str(&format!(
            "- {}: {}\n",
            row.candidate.name,
            if row.assessment.summary.is_empty() {
                "No summary provided."
            } else {
                row.assessment.summary.as_str()
            }
        ));
    }

    format!(
        "You are advising a venture-capital general partner on a shortlist of {sector} \
         startups in the {sub_sector} sub-sector.\n\n\
         Technology risk summary:\n{table}\n\
         Average risk score (1 = lowest risk, 10 = highest): {average}\n\
         Startups assessed: {assessed}, with a valid score: {scored}\n\n\
         Assessment summaries:\n{details}\n\
         Write a concise insight report for the GP: the overall risk profile of this \
         shortlist, which startups stand out and why, the key risks to diligence next, and a \
         recommended next step.",
        table = render_portfolio_table(rows),
        assessed = stats.assessed,
        scored = stats.scored,
    )
}

pub fn render_deal_memo(candidate: &StartupCandidate, assessment: &RiskAssessment) -> String {
    let mut categories = String::new();
    for (label, score) in &assessment.category_scores {
        categories.push_str(&format!("- {}: {} ({})\n", label, score.level, score.explanation));
    }

    format!(
        "Create a concise deal summary for the following startup, including its potential \
         and risk assessment.\n\n\
         Startup Information:\n{profile}\n\n\
         Risk Assessment:\n{categories}\
         Overall Risk Score: {score}\n\
         Summary: {summary}\n\n\
         Provide a summary in 3-4 sentences, highlighting key points for a GP to consider.",
        profile = candidate.profile(),
        score = score_cell(assessment.overall_score),
        summary = assessment.summary,
    )
}

pub fn render_deep_dive(
    candidate: &StartupCandidate,
    assessment: &RiskAssessment,
    question: &str,
) -> String {
    let mut categories = String::new();
    for (label, score) in &assessment.category_scores {
        categories.push_str(&format!("- {}: {} ({})\n", label, score.level, score.explanation));
    }

    format!(
        "A venture-capital general partner is doing a deep dive on one startup.\n\n\
         Startup Information:\n{profile}\n\n\
         Technology risk scorecard:\n{categories}\
         Overall Risk Score: {score}\n\
         Confidence: {confidence}\n\n\
         Question from the GP: {question}\n\n\
         Answer the question directly and specifically. State clearly when the answer goes \
         beyond the information above.",
        profile = candidate.profile(),
        score = score_cell(assessment.overall_score),
        confidence = assessment.confidence,
    )
}

pub fn render_sector_questions() -> String {
    "Generate 3 questions to help a GP identify promising deeptech sectors for investment. \
     Number them 1 to 3 and keep each to one sentence."
        .to_string()
}

/// Narratives carry no grammar; only surrounding whitespace is removed.
pub fn parse(text: &str) -> String {
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::Level;

    fn fixture() -> (StartupCandidate, RiskAssessment) {
        (
            StartupCandidate {
                name: "SolarTech".into(),
                description: "Solar panel manufacturer".into(),
                funding: Some(1_000_000.0),
                technology: "PV | perovskite".into(),
            },
            RiskAssessment {
                startup_name: "SolarTech".into(),
                category_scores: BTreeMap::new(),
                overall_score: None,
                summary: "Early.".into(),
                confidence: Level::Low,
            },
        )
    }

    #[test]
    fn test_table_marks_unknown_scores() {
        let (candidate, assessment) = fixture();
        let rows = [PortfolioRow {
            candidate: &candidate,
            assessment: &assessment,
        }];
        let table = render_portfolio_table(&rows);
        assert!(table.contains("| SolarTech | Unknown | Low | PV / perovskite |"));
    }

    #[test]
    fn test_insights_reports_unavailable_average() {
        let (candidate, assessment) = fixture();
        let rows = [PortfolioRow {
            candidate: &candidate,
            assessment: &assessment,
        }];
        let stats = PortfolioStats::from_assessments([&assessment]);
        let prompt = render_insights("Renewable Energy", "Solar Energy", &rows, &stats);
        assert!(prompt.contains("unavailable"));
        assert!(!prompt.contains("NaN"));
    }

    #[test]
    fn test_parse_trims_only() {
        assert_eq!(parse("\n  Strong pipeline.\n\nWatch costs. \n"), "Strong pipeline.\n\nWatch costs.");
    }
}
