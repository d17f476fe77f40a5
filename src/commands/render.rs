//! Discord markdown for stage views and action outcomes.

use crate::model::{format_funding, Sector};
use crate::risk::PortfolioStats;
use crate::store::types::CuratedStartup;
use crate::workflow::controller::CandidateRow;
use crate::workflow::{AssessmentReport, Stage, StageOutcome, StageView};

pub fn progress_bar(progress: f32) -> String {
    let filled = (progress * 4.0).round().clamp(0.0, 4.0) as usize;
    format!(
        "{}{} {:.0}%",
        "▰".repeat(filled),
        "▱".repeat(4 - filled),
        progress * 100.0
    )
}

fn header(view: &StageView<'_>) -> String {
    format!("**{}** {}\n", view.stage, progress_bar(view.progress))
}

fn score(value: Option<f32>) -> String {
    value
        .map(|s| format!("{:.1}/10", s))
        .unwrap_or_else(|| "Unknown".to_string())
}

pub fn sector_briefing(sector: &Sector) -> String {
    let mut out = format!("**{}**\n{}\n\n**Trends:** {}\n\n**Sub-sectors:**\n", sector.name, sector.summary, sector.trends);
    if sector.sub_sectors.is_empty() {
        out.push_str("_The briefing listed no sub-sectors. Pick the sector again to refresh it._\n");
    }
    for sub in &sector.sub_sectors {
        out.push_str(&format!("- **{}**: {}\n", sub.name, sub.description));
    }
    out.push_str("\nChoose one with `/scout subsector <name>`.");
    out
}

fn candidate_line(row: &CandidateRow<'_>) -> String {
    let mark = if row.selected { "☑" } else { "☐" };
    let c = row.candidate;
    format!(
        "{} **{}** ({}): {}\n    Technology: {}\n",
        mark,
        c.name,
        format_funding(c.funding),
        if c.description.is_empty() { "No description" } else { c.description.as_str() },
        if c.technology.is_empty() { "Unknown" } else { c.technology.as_str() },
    )
}

pub fn candidates(view: &StageView<'_>) -> String {
    let mut out = header(view);
    out.push_str(&format!(
        "Startups in **{}** / **{}**:\n",
        view.selected_sector.unwrap_or("?"),
        view.sub_sector.unwrap_or("?")
    ));
    for row in &view.candidates {
        out.push_str(&candidate_line(row));
    }
    out.push_str(
        "\nConfirm a shortlist with `/scout confirm <names, comma separated>`, then `/scout advance`.",
    );
    out
}

/// Footer listing startups the deal store already knows for this sub-sector.
pub fn tracked(names: &[String]) -> String {
    if names.is_empty() {
        String::new()
    } else {
        format!("\n\nAlready in the deal store: {}", names.join(", "))
    }
}

fn stats_block(stats: &PortfolioStats) -> String {
    let mut out = format!(
        "**Portfolio:** {} assessed, {} scored, average risk {}\n",
        stats.assessed,
        stats.scored,
        stats
            .average
            .map(|a| format!("{:.2}", a))
            .unwrap_or_else(|| "unavailable".to_string())
    );
    if let (Some((hi, hs)), Some((lo, ls))) = (&stats.highest, &stats.lowest) {
        out.push_str(&format!(
            "Highest risk: {} ({:.1}) | Lowest risk: {} ({:.1})\n",
            hi, hs, lo, ls
        ));
    }
    out
}

fn scorecards(view: &StageView<'_>) -> String {
    let mut out = String::new();
    for row in view.candidates.iter().filter(|r| r.selected) {
        match row.assessment {
            Some(a) => {
                out.push_str(&format!(
                    "\n**{}**: risk {} (confidence {})\n",
                    row.candidate.name,
                    score(a.overall_score),
                    a.confidence
                ));
                for (label, category) in &a.category_scores {
                    out.push_str(&format!("- {}: {}\n", label, category.level));
                }
                if !a.summary.is_empty() {
                    out.push_str(&format!("> {}\n", a.summary));
                }
            }
            None => out.push_str(&format!("\n**{}**: _pending_\n", row.candidate.name)),
        }
    }
    out
}

pub fn assessment_report(view: &StageView<'_>, report: &AssessmentReport) -> String {
    let mut out = header(view);
    if !report.newly_assessed.is_empty() {
        out.push_str(&format!("Assessed: {}\n", report.newly_assessed.join(", ")));
    }
    if !report.cached.is_empty() {
        out.push_str(&format!("Already assessed: {}\n", report.cached.join(", ")));
    }
    for (name, err) in &report.failed {
        let hint = if err.is_retryable() { " (run `/scout assess` to retry)" } else { "" };
        out.push_str(&format!("⚠ {} could not be assessed{}\n", name, hint));
    }
    out.push_str(&scorecards(view));
    out.push('\n');
    out.push_str(&stats_block(&report.stats));

    match &report.insights {
        Some(Ok(text)) => out.push_str(&format!("\n**Insights**\n{}\n", text)),
        Some(Err(_)) => out.push_str(
            "\n_Portfolio insights are unavailable right now. Try `/scout insights`._\n",
        ),
        None => {}
    }
    if report.failed.is_empty() {
        out.push_str("\nContinue to the deal summary with `/scout advance`.");
    }
    out
}

pub fn deal_summary(view: &StageView<'_>) -> String {
    let mut out = header(view);
    out.push_str(&format!(
        "**{}** / **{}**\n",
        view.selected_sector.unwrap_or("?"),
        view.sub_sector.unwrap_or("?")
    ));
    for row in view.candidates.iter().filter(|r| r.selected) {
        out.push_str(&format!(
            "\n**{}** ({}), risk {}\n{}\n",
            row.candidate.name,
            format_funding(row.candidate.funding),
            score(row.assessment.and_then(|a| a.overall_score)),
            row.memo.unwrap_or("_No deal memo._")
        ));
    }
    if let Some(stats) = &view.stats {
        out.push('\n');
        out.push_str(&stats_block(stats));
    }
    match view.insights {
        Some(text) => out.push_str(&format!("\n**Insights**\n{}\n", text)),
        None => out.push_str("\n_Portfolio insights are unavailable right now. Try `/scout insights`._\n"),
    }
    out
}

pub fn outcome(view: &StageView<'_>, outcome: &StageOutcome) -> String {
    match outcome {
        StageOutcome::Discovered { .. } => candidates(view),
        StageOutcome::Assessed(report) => assessment_report(view, report),
        StageOutcome::Summarized { fallbacks, .. } => {
            let mut out = deal_summary(view);
            if *fallbacks > 0 {
                out.push_str(&format!(
                    "\n_{} deal memo(s) could not be generated._",
                    fallbacks
                ));
            }
            out
        }
    }
}

pub fn status(view: &StageView<'_>) -> String {
    match view.stage {
        Stage::SectorSelection => {
            let mut out = header(view);
            match view.sector {
                Some(sector) => {
                    out.push_str(&sector_briefing(sector));
                    if let Some(sub) = view.sub_sector {
                        out.push_str(&format!(
                            "\n\nSelected sub-sector: **{}**. Run `/scout advance` to discover startups.",
                            sub
                        ));
                    }
                }
                None => out.push_str("No sector chosen yet. Start with `/scout sector <name>`."),
            }
            out
        }
        Stage::StartupDiscovery => candidates(view),
        Stage::RiskAssessment => {
            let mut out = header(view);
            out.push_str(&scorecards(view));
            if let Some(stats) = &view.stats {
                out.push('\n');
                out.push_str(&stats_block(stats));
            }
            if let Some(text) = view.insights {
                out.push_str(&format!("\n**Insights**\n{}\n", text));
            }
            out
        }
        Stage::DealSummary => deal_summary(view),
    }
}

pub fn curated(list: &[CuratedStartup]) -> String {
    let mut out = String::from("**Curated Startups** (highest risk first)\n\n");
    for (i, entry) in list.iter().enumerate() {
        let s = &entry.startup;
        out.push_str(&format!(
            "{}. **{}** ({} / {}): risk {}, funding {}\n",
            i + 1,
            s.name,
            s.sector,
            s.sub_sector,
            score(entry.assessment.risk_score),
            format_funding(s.funding),
        ));
        if !entry.assessment.comments.is_empty() {
            out.push_str(&format!("    {}\n", entry.assessment.comments));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_footer() {
        assert_eq!(tracked(&[]), "");
        assert!(tracked(&["SolarTech".to_string()]).ends_with("SolarTech"));
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0.25), "▰▱▱▱ 25%");
        assert_eq!(progress_bar(1.0), "▰▰▰▰ 100%");
    }
}
