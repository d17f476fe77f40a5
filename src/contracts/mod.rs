//! Prompt/response contracts: one `render` + `parse` pair per LLM task.
//!
//! Model output is treated as untrusted text. Parsers default missing optional fields
//! (soft failure, logged) and reject only responses with a fundamentally wrong shape
//! (hard failure, [`crate::error::ParseError`]).

pub mod discovery;
pub mod narrative;
pub mod scorecard;
pub mod sector;

/// Strip heading hashes, quote markers, bullets, list numbering and bold markers.
pub(crate) fn clean_line(line: &str) -> String {
    let mut s = line.trim();
    s = s.trim_start_matches(['#', '>']).trim_start();

    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = s.strip_prefix(bullet) {
            s = rest.trim_start();
            break;
        }
    }

    let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if (1..=2).contains(&digits) {
        let rest = &s[digits..];
        if let Some(r) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            s = r.trim_start();
        }
    }

    s.replace("**", "").trim().to_string()
}

/// `Label: value` matching, case-insensitive on the label. Returns the trimmed value.
pub(crate) fn labeled<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    line[label.len()..]
        .trim_start()
        .strip_prefix(':')
        .map(str::trim)
}
