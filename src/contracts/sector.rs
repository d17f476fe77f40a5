//! Sector briefing contract.
//!
//! Grammar requested from the model:
//!
//! ```text
//! Summary: <overview>
//! Trends: <trends>
//! Sub-sectors:
//! 1. <Name>: <Description>
//! ...
//! ```

use tracing::debug;

use super::{clean_line, labeled};
use crate::error::ParseError;
use crate::model::{Sector, SubSector};

pub const SUB_SECTOR_COUNT: usize = 5;

pub fn render(sector: &str) -> String {
    format!(
        "You are a deeptech investment analyst briefing a venture-capital general partner.\n\
         Provide a briefing on the {sector} sector.\n\n\
         Respond in exactly this format and add no other text:\n\
         Summary: <two or three sentences describing the sector>\n\
         Trends: <two or three sentences on key technology and market trends>\n\
         Sub-sectors:\n\
         1. <Sub-sector name>: <one sentence description>\n\
         2. <Sub-sector name>: <one sentence description>\n\
         (continue until exactly {count} sub-sectors are listed)",
        sector = sector,
        count = SUB_SECTOR_COUNT,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    Trends,
    SubSectors,
}

const SUB_SECTOR_LABELS: &[&str] = &["Sub-sectors", "Subsectors", "Sub sectors", "Sub-sector"];

fn section_marker(line: &str) -> Option<(Section, &str)> {
    let candidates = [
        (Section::Summary, &["Summary", "Overview"][..]),
        (Section::Trends, &["Trends", "Key Trends"][..]),
        (Section::SubSectors, SUB_SECTOR_LABELS),
    ];
    for (section, labels) in candidates {
        for label in labels {
            if let Some(rest) = labeled(line, label) {
                return Some((section, rest));
            }
            if line.eq_ignore_ascii_case(label) {
                return Some((section, ""));
            }
        }
    }
    None
}

/// Parse a sector briefing. Only a blank response is a hard failure.
pub fn parse(sector: &str, text: &str) -> Result<Sector, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::MissingSection("Summary"));
    }

    let mut section: Option<Section> = None;
    let mut preamble: Vec<String> = Vec::new();
    let mut summary: Vec<String> = Vec::new();
    let mut trends: Vec<String> = Vec::new();
    let mut sub_sectors: Vec<SubSector> = Vec::new();

    for raw in text.lines() {
        let line = clean_line(raw);
        if line.is_empty() {
            continue;
        }

        if let Some((next, rest)) = section_marker(&line) {
            section = Some(next);
            match next {
                Section::Summary if !rest.is_empty() => summary.push(rest.to_string()),
                Section::Trends if !rest.is_empty() => trends.push(rest.to_string()),
                _ => {}
            }
            continue;
        }

        match section {
            None => preamble.push(line),
            Some(Section::Summary) => summary.push(line),
            Some(Section::Trends) => trends.push(line),
            Some(Section::SubSectors) => {
                let Some((name, description)) = line.split_once(':') else {
                    debug!(line = %line, "Skipping sub-sector line without separator");
                    continue;
                };
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                if sub_sectors.iter().any(|s| s.name.eq_ignore_ascii_case(name)) {
                    debug!(name, "Skipping repeated sub-sector");
                    continue;
                }
                sub_sectors.push(SubSector {
                    name: name.to_string(),
                    description: description.trim().to_string(),
                });
            }
        }
    }

    if summary.is_empty() {
        debug!(sector, "No Summary marker, falling back to first line");
        if let Some(first) = preamble.into_iter().next() {
            summary.push(first);
        }
    }
    if trends.is_empty() {
        debug!(sector, "No Trends section");
    }
    if sub_sectors.len() != SUB_SECTOR_COUNT {
        debug!(
            sector,
            count = sub_sectors.len(),
            "Unexpected number of sub-sectors"
        );
    }

    Ok(Sector {
        name: sector.to_string(),
        summary: summary.join(" "),
        trends: trends.join(" "),
        sub_sectors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = "Summary: Renewable energy covers power from naturally replenished sources.\n\
        Trends: Storage costs are falling fast.\n\
        Sub-sectors:\n\
        1. Solar Energy: Photovoltaic and solar thermal generation.\n\
        2. Wind Energy: Onshore and offshore turbines.\n\
        3. Hydropower: Generation from moving water.\n\
        4. Bioenergy: Fuels from organic matter.\n\
        5. Geothermal Energy: Heat from the earth's crust.\n";

    #[test]
    fn test_parse_well_formed() {
        let sector = parse("Renewable Energy", WELL_FORMED).unwrap();
        assert_eq!(sector.name, "Renewable Energy");
        assert!(sector.summary.starts_with("Renewable energy covers"));
        assert_eq!(sector.trends, "Storage costs are falling fast.");
        assert_eq!(sector.sub_sectors.len(), 5);
        assert_eq!(sector.sub_sectors[0].name, "Solar Energy");
        assert_eq!(sector.sub_sectors[4].name, "Geothermal Energy");
        assert_eq!(
            sector.sub_sectors[1].description,
            "Onshore and offshore turbines."
        );
    }

    #[test]
    fn test_missing_trends_is_empty() {
        let text = "Summary: Quantum.\nSub-sectors:\n1. Quantum Hardware: Qubits.\n";
        let sector = parse("Quantum Computing", text).unwrap();
        assert_eq!(sector.trends, "");
        assert_eq!(sector.sub_sectors.len(), 1);
    }

    #[test]
    fn test_lines_without_separator_are_skipped() {
        let text = "Summary: AI.\nSub-sectors:\n1. NLP: Language models.\nsome stray prose\n2. Vision: Images.\n";
        let sector = parse("Artificial Intelligence", text).unwrap();
        let names: Vec<_> = sector.sub_sectors.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["NLP", "Vision"]);
    }

    #[test]
    fn test_markdown_decorations() {
        let text = "**Summary:** Biotech is broad.\n\n### Trends\nGene editing.\n\n**Sub-sectors:**\n- **Genetic Engineering**: CRISPR.\n- **Synthetic Biology**: Engineered organisms.\n";
        let sector = parse("Biotechnology", text).unwrap();
        assert_eq!(sector.summary, "Biotech is broad.");
        assert_eq!(sector.trends, "Gene editing.");
        assert_eq!(sector.sub_sectors.len(), 2);
        assert_eq!(sector.sub_sectors[0].name, "Genetic Engineering");
    }

    #[test]
    fn test_summary_falls_back_to_first_line() {
        let text = "Nanotech manipulates matter at the nanoscale.\nSub-sectors:\n1. Nanomedicine: Drug delivery.\n";
        let sector = parse("Nanotechnology", text).unwrap();
        assert_eq!(sector.summary, "Nanotech manipulates matter at the nanoscale.");
    }

    #[test]
    fn test_zero_sub_sectors_is_not_fatal() {
        let sector = parse("AI", "Summary: Only a summary.").unwrap();
        assert!(sector.sub_sectors.is_empty());
    }

    #[test]
    fn test_blank_response_is_hard_failure() {
        assert_eq!(
            parse("AI", "  \n "),
            Err(ParseError::MissingSection("Summary"))
        );
    }

    #[test]
    fn test_render_mentions_markers() {
        let prompt = render("Quantum Computing");
        assert!(prompt.contains("Quantum Computing"));
        assert!(prompt.contains("Summary:"));
        assert!(prompt.contains("Trends:"));
        assert!(prompt.contains("Sub-sectors:"));
    }
}
