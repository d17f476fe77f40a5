//! Technology-risk scorecard contract.
//!
//! Grammar requested from the model:
//!
//! ```text
//! 1. Technology Novelty
//! Level: <Low|Medium|High>
//! Explanation: <text>
//! ... (one block per category)
//! Overall Risk Score: <1-10>
//! Summary: <text>
//! Confidence: <Low|Medium|High>
//! ```
//!
//! The parser is line-oriented: it remembers the category heading it saw last and
//! attaches `Level:` / `Explanation:` lines (and explanation continuation lines) to it.

use std::collections::BTreeMap;

use tracing::debug;

use super::{clean_line, labeled};
use crate::error::ParseError;
use crate::model::{CategoryScore, Level, RiskAssessment, StartupCandidate};

pub const CATEGORIES: [&str; 5] = [
    "Technology Novelty",
    "Development Stage",
    "Market Potential",
    "Competition",
    "Regulatory Risk",
];

pub const INSUFFICIENT_INFORMATION: &str = "Insufficient information";

const SCORE_LABELS: &[&str] = &["Overall Risk Score", "Overall Score", "Risk Score"];

pub fn render(candidate: &StartupCandidate) -> String {
    let mut category_blocks = String::new();
    for (i, category) in CATEGORIES.iter().enumerate() {
        category_blocks.push_str(&format!(
            "{}. {}\nLevel: <Low, Medium or High>\nExplanation: <one or two sentences>\n",
            i + 1,
            category
        ));
    }

    format!(
        "You are a deeptech due-diligence analyst. Assess the technology risk of the \
         following startup.\n\n\
         Startup Information:\n{profile}\n\n\
         Respond in exactly this format and add no other text:\n\
         {category_blocks}\
         Overall Risk Score: <a single number from 1 to 10, 1 being lowest risk and 10 highest>\n\
         Summary: <two or three sentences>\n\
         Confidence: <Low, Medium or High>",
        profile = candidate.profile(),
        category_blocks = category_blocks,
    )
}

#[derive(Debug, Clone, Copy)]
enum Cursor {
    None,
    Category(usize),
    Summary,
}

#[derive(Debug, Default)]
struct Draft {
    level: Option<Level>,
    explanation: String,
}

/// Case-insensitively strip a leading `word` followed by a word boundary.
fn strip_word<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let head = text.get(..word.len())?;
    if !head.eq_ignore_ascii_case(word) {
        return None;
    }
    let rest = &text[word.len()..];
    if rest.starts_with(|c: char| c.is_alphanumeric()) {
        return None;
    }
    Some(rest.trim_start())
}

/// Match a category heading such as `Technology Novelty`, `Competition: High`,
/// `Market Potential Risk - Medium` or `Regulatory Risk Level: Low`.
/// Returns the category index and the remainder.
fn match_category(line: &str) -> Option<(usize, &str)> {
    CATEGORIES.iter().enumerate().find_map(|(idx, label)| {
        let mut rest = strip_word(line, label)?;
        if let Some(r) = strip_word(rest, "risk") {
            rest = r;
        }
        if let Some(r) = strip_word(rest, "level") {
            rest = r;
        }
        if rest.is_empty() {
            return Some((idx, rest));
        }
        let rest = rest.strip_prefix([':', '-', '(', '–'])?;
        Some((idx, rest.trim().trim_end_matches(')').trim()))
    })
}

/// Match the overall score line, tolerating a scale between the label and the colon:
/// `Overall Risk Score (1-10): 7`, `Overall Risk Score /10: 7`.
fn match_score(line: &str) -> Option<&str> {
    SCORE_LABELS.iter().find_map(|label| {
        let mut rest = strip_word(line, label)?;
        if let Some(inner) = rest.strip_prefix('(') {
            rest = inner.split_once(')')?.1.trim_start();
        } else if let Some(r) = rest.strip_prefix("/10") {
            rest = r.trim_start();
        }
        rest.strip_prefix(':').map(str::trim)
    })
}

/// A short `Label:` head that no rule above claimed. Never glued onto a previous field.
fn looks_like_marker(line: &str) -> bool {
    let Some((head, _)) = line.split_once(':') else {
        return false;
    };
    let head = head.trim();
    !head.is_empty()
        && head.split_whitespace().count() <= 5
        && head
            .chars()
            .all(|c| c.is_alphanumeric() || c.is_whitespace() || "()/-&".contains(c))
}

/// First number in `text`, accepted only inside [1, 10].
fn parse_score(text: &str) -> Option<f32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let number: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let score: f32 = number.trim_end_matches('.').parse().ok()?;
    (1.0..=10.0).contains(&score).then_some(score)
}

fn append(target: &mut String, line: &str) {
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(line);
}

pub fn parse(startup_name: &str, text: &str) -> Result<RiskAssessment, ParseError> {
    let mut drafts: [Option<Draft>; 5] = Default::default();
    let mut cursor = Cursor::None;
    let mut overall_score = None;
    let mut score_seen = false;
    let mut summary = String::new();
    let mut confidence: Option<Level> = None;

    for raw in text.lines() {
        let line = clean_line(raw);
        if line.is_empty() {
            continue;
        }

        if let Some((idx, rest)) = match_category(&line) {
            let draft = drafts[idx].get_or_insert_with(Draft::default);
            let inline = Level::parse(rest);
            if inline != Level::Unknown {
                draft.level = Some(inline);
            }
            cursor = Cursor::Category(idx);
            continue;
        }

        if let Some(rest) = match_score(&line) {
            score_seen = true;
            overall_score = parse_score(rest);
            if overall_score.is_none() {
                debug!(startup = startup_name, raw = rest, "Overall score not numeric");
            }
            cursor = Cursor::None;
            continue;
        }

        if let Some(rest) = labeled(&line, "Summary") {
            append(&mut summary, rest);
            cursor = Cursor::Summary;
            continue;
        }

        if let Some(rest) =
            labeled(&line, "Confidence Level").or_else(|| labeled(&line, "Confidence"))
        {
            confidence = Some(Level::parse(rest));
            cursor = Cursor::None;
            continue;
        }

        if let Some(rest) = labeled(&line, "Level").or_else(|| labeled(&line, "Risk Level")) {
            if let Cursor::Category(idx) = cursor {
                if let Some(draft) = drafts[idx].as_mut() {
                    draft.level = Some(Level::parse(rest));
                }
            }
            continue;
        }

        if let Some(rest) = labeled(&line, "Explanation") {
            if let Cursor::Category(idx) = cursor {
                if let Some(draft) = drafts[idx].as_mut() {
                    append(&mut draft.explanation, rest);
                }
            }
            continue;
        }

        if looks_like_marker(&line) {
            debug!(startup = startup_name, line = %line, "Unrecognized scorecard marker");
            continue;
        }

        match cursor {
            Cursor::Category(idx) => {
                if let Some(draft) = drafts[idx].as_mut() {
                    if !draft.explanation.is_empty() {
                        append(&mut draft.explanation, &line);
                    }
                }
            }
            Cursor::Summary => append(&mut summary, &line),
            Cursor::None => debug!(startup = startup_name, line = %line, "Unrecognized scorecard line"),
        }
    }

    let categories_seen = drafts.iter().filter(|d| d.is_some()).count();
    if categories_seen == 0 && !score_seen && summary.is_empty() && confidence.is_none() {
        return Err(ParseError::MalformedShape(
            "no scorecard markers found".into(),
        ));
    }

    let mut category_scores = BTreeMap::new();
    for (label, draft) in CATEGORIES.iter().zip(drafts) {
        let score = match draft {
            Some(draft) => CategoryScore {
                level: draft.level.unwrap_or(Level::Unknown),
                explanation: if draft.explanation.is_empty() {
                    INSUFFICIENT_INFORMATION.to_string()
                } else {
                    draft.explanation
                },
            },
            None => {
                debug!(startup = startup_name, category = label, "Category missing from scorecard");
                CategoryScore {
                    level: Level::Unknown,
                    explanation: INSUFFICIENT_INFORMATION.to_string(),
                }
            }
        };
        category_scores.insert(label.to_string(), score);
    }

    Ok(RiskAssessment {
        startup_name: startup_name.to_string(),
        category_scores,
        overall_score,
        summary,
        confidence: confidence.unwrap_or(Level::Unknown),
    })
}
